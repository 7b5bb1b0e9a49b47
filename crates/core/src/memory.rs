//! Long-term memory seam.
//!
//! The reasoning loop consults memory once at turn start (context fetch)
//! and hands the finished turn back for a possible durable write. What
//! "durable" means is the backend's business.

use crate::error::Result;
use crate::message::{SessionId, Turn};
use async_trait::async_trait;

/// Backend-agnostic long-term memory.
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// Fetch remembered context relevant to the new user message.
    /// Returns `None` when nothing useful is stored.
    async fn fetch_context(&self, session_id: &SessionId, user_message: &str)
    -> Result<Option<String>>;

    /// Offer a completed turn for durable storage. The backend decides
    /// what, if anything, to keep.
    async fn update(&self, turn: &Turn) -> Result<()>;
}

/// A memory backend that remembers nothing. Used when long-term memory
/// is disabled in config.
pub struct NoopMemory;

#[async_trait]
impl LongTermMemory for NoopMemory {
    async fn fetch_context(
        &self,
        _session_id: &SessionId,
        _user_message: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn update(&self, _turn: &Turn) -> Result<()> {
        Ok(())
    }
}
