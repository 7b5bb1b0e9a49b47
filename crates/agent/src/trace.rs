//! Machine-readable execution traces.
//!
//! The loop emits one trace record per notable event (routing, step
//! start, tool dispatch, assessment, terminal transition). The core
//! never stores these itself; the caller persists or discards them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use turnstone_core::SessionId;

/// One recorded event within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    /// 1-based sequence number within the trace
    pub seq: usize,

    /// Event kind (e.g. "routing", "step_started", "tool_result")
    pub kind: String,

    /// Milliseconds since the turn opened
    pub elapsed_ms: u64,

    /// Event payload
    pub data: Value,
}

/// The full execution trace for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnTrace {
    pub session_id: SessionId,
    pub records: Vec<TraceRecord>,
    pub domains: Vec<String>,
    pub total_tool_calls: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TurnTrace {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            records: Vec::new(),
            domains: Vec::new(),
            total_tool_calls: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append an event record.
    pub fn record(&mut self, kind: impl Into<String>, data: Value) {
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds().max(0) as u64;
        self.records.push(TraceRecord {
            seq: self.records.len() + 1,
            kind: kind.into(),
            elapsed_ms,
            data,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_are_sequenced() {
        let mut trace = TurnTrace::new(SessionId::new());
        trace.record("routing", json!({"domains": ["WEB_TOOLS"]}));
        trace.record("step_started", json!({"step": 1}));

        assert_eq!(trace.records[0].seq, 1);
        assert_eq!(trace.records[1].seq, 2);
        assert_eq!(trace.records[1].kind, "step_started");
    }

    #[test]
    fn trace_serializes_to_json() {
        let mut trace = TurnTrace::new(SessionId::new());
        trace.record("final_answer", json!({"length": 42}));
        trace.finish();

        let json = serde_json::to_string(&trace).unwrap();
        assert!(json.contains("final_answer"));
        assert!(trace.finished_at.is_some());
    }
}
