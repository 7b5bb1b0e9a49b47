//! # Turnstone Core
//!
//! Core domain types and traits for the Turnstone agent orchestration
//! engine: messages and turns, the Provider and Tool abstractions, the
//! long-term memory seam, error types, and the event bus.
//!
//! This crate has no I/O of its own; concrete providers, stores, and the
//! reasoning loop live in sibling crates and meet here at the trait seams.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

pub use error::{Error, ProviderError, Result, RoutingError, ScratchpadError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use memory::{LongTermMemory, NoopMemory};
pub use message::{
    META_ARCHIVED, META_SUMMARY, Message, MessageToolCall, Role, SessionId, Turn, TurnStatus,
};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{TOOL_ERROR_PREFIX, Tool, ToolCall, ToolRegistry, ToolResult};
