//! Per-tool result assessment.
//!
//! After each step's tool results are folded into history, the loop
//! derives one compact structured assessment per tool and injects the
//! list as a single system-role reflection note. The next model step
//! then reasons from distilled findings instead of only raw tool text.

use serde::{Deserialize, Serialize};
use turnstone_core::tool::TOOL_ERROR_PREFIX;
use turnstone_gateway::GATEWAY_ERROR_PREFIX;

/// Outcome classification for one tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentStatus {
    Ok,
    Partial,
    Error,
    Blocked,
}

/// Compact, model-friendly verdict on one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAssessment {
    pub tool: String,
    pub status: AssessmentStatus,
    /// Up to two evidence snippets from the output
    pub finding: String,
    /// What the model should do with this outcome
    pub next_action: String,
}

/// Assess a folded tool observation.
pub fn assess_tool_result(tool_name: &str, result: &str) -> StepAssessment {
    let text = result.trim();
    let lowered = text.to_lowercase();

    let (mut status, next_action) = if text.starts_with(TOOL_ERROR_PREFIX) {
        (
            AssessmentStatus::Error,
            "Use an alternative tool or fix arguments and retry.",
        )
    } else if text.starts_with(GATEWAY_ERROR_PREFIX) {
        (
            AssessmentStatus::Error,
            "Repair tool-call schema/refs and retry.",
        )
    } else {
        (
            AssessmentStatus::Ok,
            "Proceed with synthesis or call next required tool.",
        )
    };

    // Evidence snippets: first two substantial non-decorative lines.
    let snippets: Vec<&str> = text
        .lines()
        .map(|l| l.trim().trim_start_matches('•').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('[') && l.len() > 2)
        .take(2)
        .collect();

    let finding: String = if snippets.is_empty() {
        if text.is_empty() {
            "No output.".into()
        } else {
            text.chars().take(260).collect()
        }
    } else {
        snippets.join(" | ").chars().take(260).collect()
    };

    let mut next_action = next_action.to_string();
    if lowered.contains("not found") && status == AssessmentStatus::Ok {
        status = AssessmentStatus::Partial;
        next_action = "Validate input/query and retry with adjusted parameters.".into();
    }

    StepAssessment {
        tool: tool_name.to_string(),
        status,
        finding,
        next_action,
    }
}

/// Format a step's assessments as the system-role note injected before
/// the next model call.
pub fn build_reflection_note(step: usize, assessments: &[StepAssessment]) -> String {
    let mut lines = vec![
        "[TOOL REFLECTION]".to_string(),
        format!("Step: {step}"),
        "Use this to continue reasoning from validated tool outcomes.".to_string(),
    ];
    for (i, a) in assessments.iter().enumerate() {
        let status = match a.status {
            AssessmentStatus::Ok => "ok",
            AssessmentStatus::Partial => "partial",
            AssessmentStatus::Error => "error",
            AssessmentStatus::Blocked => "blocked",
        };
        lines.push(format!(
            "{}. tool={}; status={}; finding={}; next={}",
            i + 1,
            a.tool,
            status,
            a.finding,
            a.next_action
        ));
    }
    let note = lines.join("\n");
    note.chars().take(1800).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_output_is_ok() {
        let a = assess_tool_result("web_fetch", "Page title: Rust Blog\nLatest release: 1.80");
        assert_eq!(a.status, AssessmentStatus::Ok);
        assert!(a.finding.contains("Rust Blog"));
        assert!(a.finding.contains('|'));
    }

    #[test]
    fn tool_error_prefix_classified() {
        let a = assess_tool_result("web_fetch", "[TOOL ERROR] connection timed out");
        assert_eq!(a.status, AssessmentStatus::Error);
        assert!(a.next_action.contains("alternative tool"));
    }

    #[test]
    fn gateway_error_prefix_classified() {
        let a = assess_tool_result(
            "send_email",
            "[GATEWAY ERROR] Missing required field 'body'. [HINT]: This field is mandatory.",
        );
        assert_eq!(a.status, AssessmentStatus::Error);
        assert!(a.next_action.contains("schema"));
    }

    #[test]
    fn not_found_downgrades_to_partial() {
        let a = assess_tool_result("scratchpad_get", "Key 'ghost' not found in scratchpad.");
        assert_eq!(a.status, AssessmentStatus::Partial);
    }

    #[test]
    fn empty_output_has_placeholder_finding() {
        let a = assess_tool_result("noop", "");
        assert_eq!(a.finding, "No output.");
    }

    #[test]
    fn reflection_note_lists_all_assessments() {
        let assessments = vec![
            assess_tool_result("a", "result one"),
            assess_tool_result("b", "[TOOL ERROR] boom"),
        ];
        let note = build_reflection_note(3, &assessments);
        assert!(note.starts_with("[TOOL REFLECTION]"));
        assert!(note.contains("Step: 3"));
        assert!(note.contains("tool=a; status=ok"));
        assert!(note.contains("tool=b; status=error"));
    }
}
