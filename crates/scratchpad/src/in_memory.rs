//! In-memory backend — useful for testing and ephemeral sessions.

use crate::{EntrySummary, ScratchpadEntry, ScratchpadStore, generated_key};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use turnstone_core::{ScratchpadError, SessionId};

#[derive(Default)]
struct SessionData {
    entries: HashMap<String, ScratchpadEntry>,
    // Insertion order, for a stable list()
    order: Vec<String>,
    counter: u64,
}

/// An in-memory store keyed by session. Nothing survives process exit.
pub struct InMemoryScratchpad {
    sessions: Arc<RwLock<HashMap<SessionId, SessionData>>>,
}

impl InMemoryScratchpad {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryScratchpad {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScratchpadStore for InMemoryScratchpad {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn put(
        &self,
        session_id: &SessionId,
        key: Option<&str>,
        content: &str,
        description: &str,
        domain: &str,
    ) -> Result<String, ScratchpadError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.clone()).or_default();

        let key = match key {
            Some(k) => k.to_string(),
            None => {
                session.counter += 1;
                generated_key(domain, session.counter)
            }
        };

        if !session.entries.contains_key(&key) {
            session.order.push(key.clone());
        }
        session.entries.insert(
            key.clone(),
            ScratchpadEntry::new(&key, description, content.to_string()),
        );
        Ok(key)
    }

    async fn get(&self, session_id: &SessionId, key: &str) -> Result<String, ScratchpadError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .and_then(|s| s.entries.get(key))
            .map(|e| e.content.clone())
            .ok_or_else(|| ScratchpadError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list(&self, session_id: &SessionId) -> Result<Vec<EntrySummary>, ScratchpadError> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        Ok(session
            .order
            .iter()
            .filter_map(|k| session.entries.get(k))
            .map(EntrySummary::from)
            .collect())
    }

    async fn search(
        &self,
        session_id: &SessionId,
        query: &str,
    ) -> Result<Vec<String>, ScratchpadError> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let query_lower = query.to_lowercase();
        Ok(session
            .order
            .iter()
            .filter_map(|k| session.entries.get(k))
            .filter(|e| {
                e.content.to_lowercase().contains(&query_lower)
                    || e.description.to_lowercase().contains(&query_lower)
            })
            .map(|e| e.key.clone())
            .collect())
    }

    async fn purge(&self, session_id: &SessionId) -> Result<(), ScratchpadError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}
