//! LLM provider implementations.
//!
//! One concrete transport — any OpenAI-compatible `/chat/completions`
//! endpoint — plus a retry decorator that wraps any `Provider` with
//! exponential backoff on transient failures.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;
