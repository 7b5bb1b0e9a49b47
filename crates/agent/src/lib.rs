//! The Turnstone reasoning loop.
//!
//! [`TurnRunner`] orchestrates one turn end to end: the gatekeeper
//! offloads oversized input, the router picks tool domains, then the
//! loop alternates model steps and gateway-validated tool dispatches —
//! compressing the working context, assessing each tool result, and
//! enforcing step and tool budgets — until the model answers in plain
//! text or the self-assessment protocol closes the turn.

pub mod assess;
pub mod compressor;
pub mod policy;
pub mod runner;
pub mod token;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assess::{assess_tool_result, build_reflection_note, AssessmentStatus, StepAssessment};
pub use compressor::ContextCompressor;
pub use policy::{DurabilityPolicy, KeywordDurabilityPolicy, NeverDurable};
pub use runner::{CancelHandle, TurnLimits, TurnOutcome, TurnRunner};
pub use token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
pub use trace::{TraceRecord, TurnTrace};
