//! The reasoning loop.
//!
//! One call to [`TurnRunner::run`] drives a full turn: route the intent,
//! assemble the working context, then alternate model steps and tool
//! dispatches until the model answers in plain text or a budget runs out.
//!
//! Failure philosophy: tool- and gateway-level problems are folded back
//! into the conversation as observations the model can react to. Only
//! transport exhaustion escalates out of a turn as an error.

use crate::assess::{assess_tool_result, build_reflection_note, AssessmentStatus, StepAssessment};
use crate::compressor::ContextCompressor;
use crate::policy::{DurabilityPolicy, KeywordDurabilityPolicy};
use crate::token::estimate_tokens;
use crate::trace::TurnTrace;
use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use turnstone_core::tool::TOOL_ERROR_PREFIX;
use turnstone_core::{
    DomainEvent, EventBus, LongTermMemory, Message, MessageToolCall, NoopMemory, Provider,
    ProviderRequest, Result, SessionId, ToolDefinition, ToolRegistry, Turn, TurnStatus,
};
use turnstone_gateway::{ExecutionGateway, GATEWAY_ERROR_PREFIX};
use turnstone_router::{IntentRouter, RouteMode};
use turnstone_scratchpad::{sandwich_preview, ScratchpadStore};

/// Domain of the built-in scratchpad tools, always offered alongside
/// whatever domains the router selects for a tooling turn.
const SCRATCHPAD_DOMAIN: &str = "SESSION_SCRATCHPAD";

/// Scratchpad key holding the rolling step ledger.
const STEP_LEDGER_KEY: &str = "run_step_ledger";
const STEP_LEDGER_LEN: usize = 12;

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a capable assistant that completes tasks step by step using the tools offered to you.

Working rules:
- Large data is passed by reference: a `ref:<key>` value stands for content stored in the \
session scratchpad. Pass the reference itself as a tool argument and it will be expanded \
before the tool runs.
- Save large intermediate results to the scratchpad instead of pasting them into the \
conversation.
- When a tool call is rejected or fails, read the hint in the observation and repair the \
call instead of repeating it unchanged.";

const LOOP_GUARD_OBSERVATION: &str = "Not executed: this exact call already ran twice in a \
row with the same arguments. Change your approach.";

const LOOP_GUARD_NOTICE: &str = "[SYSTEM NOTICE] You are repeating the same tool call with \
identical arguments. The repeated calls were not executed. Use the results you already \
have, or try a different tool or different arguments.";

const BUDGET_NOTICE: &str = "[SYSTEM NOTICE] The total tool-call budget for this turn is \
exhausted. No further tools will be offered. Provide your best final answer from the \
results gathered so far.";

const SELF_ASSESSMENT_FALLBACK: &str = "PARTIALLY ACHIEVED: the step limit was reached \
before the goal could be confirmed, and the wrap-up assessment did not complete. The tool \
results above show the verified work so far; ask to continue to resume the remaining steps.";

// ── Limits ──

/// Hard budgets for one turn. Defaults mirror the shipped configuration.
#[derive(Debug, Clone)]
pub struct TurnLimits {
    pub max_steps: usize,
    pub max_tool_calls_per_step: usize,
    pub max_total_tool_calls: usize,
    /// Token budget for the working context (compressor trigger).
    pub context_limit_tokens: usize,
    /// User input above this is offloaded by the gatekeeper.
    pub user_input_limit_tokens: usize,
    /// Tool output above this is archived with a sandwich preview.
    pub tool_output_limit_tokens: usize,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_tool_calls_per_step: 5,
            max_total_tool_calls: 30,
            context_limit_tokens: 6000,
            user_input_limit_tokens: 2000,
            tool_output_limit_tokens: 1500,
        }
    }
}

// ── Cancellation ──

/// Cooperative cancellation flag, checked between steps. A cancelled
/// turn finishes with [`TurnStatus::Cancelled`]; in-flight tool calls
/// are never interrupted mid-execution.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Outcome ──

/// Everything a frontend needs from a finished turn.
pub struct TurnOutcome {
    pub final_response: String,
    pub turn: Turn,
    pub trace: TurnTrace,
    /// Whether the repeated-call guard fired during this turn.
    pub loop_detected: bool,
}

// ── Runner ──

pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    router: Arc<IntentRouter>,
    compressor: Arc<ContextCompressor>,
    registry: Arc<ToolRegistry>,
    gateway: Arc<ExecutionGateway>,
    scratchpad: Arc<dyn ScratchpadStore>,
    memory: Arc<dyn LongTermMemory>,
    policy: Arc<dyn DurabilityPolicy>,
    event_bus: Option<Arc<EventBus>>,
    limits: TurnLimits,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl TurnRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        router: Arc<IntentRouter>,
        compressor: Arc<ContextCompressor>,
        registry: Arc<ToolRegistry>,
        gateway: Arc<ExecutionGateway>,
        scratchpad: Arc<dyn ScratchpadStore>,
    ) -> Self {
        Self {
            provider,
            router,
            compressor,
            registry,
            gateway,
            scratchpad,
            memory: Arc::new(NoopMemory),
            policy: Arc::new(KeywordDurabilityPolicy),
            event_bus: None,
            limits: TurnLimits::default(),
            model: "gpt-4o".into(),
            temperature: 0.4,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn LongTermMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_durability_policy(mut self, policy: Arc<dyn DurabilityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_limits(mut self, limits: TurnLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run one full turn for the given user input.
    pub async fn run(
        &self,
        session_id: SessionId,
        user_input: &str,
        cancel: &CancelHandle,
    ) -> Result<TurnOutcome> {
        let mut trace = TurnTrace::new(session_id.clone());
        let mut turn = Turn::new(session_id.clone());
        self.publish(DomainEvent::TurnStarted {
            session_id: session_id.clone(),
            timestamp: Utc::now(),
        });

        let effective_input = self.gatekeep(&session_id, user_input).await;

        // Routing.
        let mut decision = self.router.classify(&effective_input, None).await;
        if decision.mode == RouteMode::Tooling
            && self.registry.domains().iter().any(|d| d == SCRATCHPAD_DOMAIN)
            && !decision.domains.iter().any(|d| d == SCRATCHPAD_DOMAIN)
        {
            decision.domains.push(SCRATCHPAD_DOMAIN.to_string());
        }
        let tooling = decision.mode == RouteMode::Tooling;
        trace.domains = decision.domains.clone();
        trace.record(
            "routing",
            json!({
                "mode": if tooling { "tooling" } else { "conversational" },
                "domains": decision.domains.clone(),
                "confidence": decision.confidence,
                "tool_probability": decision.tool_probability,
                "reasoning": decision.reasoning,
            }),
        );
        self.publish(DomainEvent::IntentRouted {
            mode: if tooling { "tooling" } else { "conversational" }.into(),
            domains: decision.domains.clone(),
            timestamp: Utc::now(),
        });
        info!(tooling, domains = ?decision.domains, "Turn routed");

        let tool_defs: Vec<ToolDefinition> = if tooling {
            self.registry.definitions_for_domains(&decision.domains)
        } else {
            Vec::new()
        };

        // Working context: identity + scratchpad index, memory, user input.
        let index = self.scratchpad_index(&session_id).await;
        turn.push(Message::system(format!(
            "{}\n\nScratchpad index (session task context):\n{index}",
            self.system_prompt
        )));
        if tooling {
            match self.memory.fetch_context(&session_id, user_input).await {
                Ok(Some(context)) => turn.push(Message::system(format!("[MEMORY CONTEXT]\n{context}"))),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Long-term memory fetch failed"),
            }
        }
        turn.push(Message::user(effective_input));

        // Step loop.
        let mut ledger: Vec<Value> = Vec::new();
        let mut loop_detected = false;
        let mut halted_by_guard = false;
        let mut budget_notice_sent = false;
        let mut last_signature: Option<String> = None;
        let mut repeat_count = 0usize;
        let mut final_response: Option<String> = None;

        while turn.steps < self.limits.max_steps {
            if cancel.is_cancelled() {
                turn.status = TurnStatus::Cancelled;
                final_response = Some("Turn cancelled before completion.".into());
                trace.record("cancelled", json!({"step": turn.steps}));
                break;
            }

            turn.steps += 1;
            self.publish(DomainEvent::StepStarted {
                step: turn.steps,
                timestamp: Utc::now(),
            });
            trace.record("step_started", json!({"step": turn.steps}));

            // Keep the working context inside budget before every call.
            let before = turn.messages.len();
            turn.messages = self
                .compressor
                .optimize(&session_id, std::mem::take(&mut turn.messages))
                .await;
            if turn.messages.len() != before {
                trace.record(
                    "context_compressed",
                    json!({"before": before, "after": turn.messages.len()}),
                );
                self.publish(DomainEvent::ContextCompressed {
                    messages_before: before,
                    messages_after: turn.messages.len(),
                    timestamp: Utc::now(),
                });
            }

            let remaining = self
                .limits
                .max_total_tool_calls
                .saturating_sub(turn.total_tool_calls);
            let offer_tools =
                tooling && remaining > 0 && !halted_by_guard && !tool_defs.is_empty();

            let mut request =
                ProviderRequest::text(&self.model, turn.messages.clone(), self.temperature);
            if offer_tools {
                request.tools = tool_defs.clone();
            }

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    turn.status = TurnStatus::Failed;
                    trace.record("provider_failed", json!({"error": e.to_string()}));
                    trace.finish();
                    self.publish(DomainEvent::TurnCompleted {
                        session_id: session_id.clone(),
                        steps: turn.steps,
                        timestamp: Utc::now(),
                    });
                    return Err(e.into());
                }
            };

            let assistant = response.message;
            let calls = assistant.tool_calls.clone();
            turn.push(assistant);

            if calls.is_empty() {
                turn.status = TurnStatus::Completed;
                let content = turn.messages.last().map(|m| m.content.clone()).unwrap_or_default();
                trace.record("final_answer", json!({"chars": content.len()}));
                final_response = Some(content);
                break;
            }

            // Repeated-call guard: an identical call set across steps is
            // refused before its third dispatch.
            let signature = call_signature(&calls);
            if last_signature.as_deref() == Some(signature.as_str()) {
                repeat_count += 1;
            } else {
                repeat_count = 0;
            }
            last_signature = Some(signature.clone());
            if repeat_count >= 2 {
                warn!(signature, "Repeated identical tool calls, halting dispatch");
                loop_detected = true;
                halted_by_guard = true;
                for call in &calls {
                    turn.push(Message::tool_result(&call.id, LOOP_GUARD_OBSERVATION));
                }
                turn.push(Message::system(LOOP_GUARD_NOTICE));
                trace.record("loop_guard", json!({"signature": signature}));
                continue;
            }

            // Per-step and total-budget clamps. Excess calls are answered
            // with an explicit deferral, never silently dropped.
            let allowed = remaining.min(self.limits.max_tool_calls_per_step);
            let (kept, deferred) = calls.split_at(calls.len().min(allowed));

            let observations =
                join_all(kept.iter().map(|call| self.dispatch_call(&session_id, call))).await;

            let mut assessments: Vec<StepAssessment> = Vec::with_capacity(kept.len());
            for (call, observation) in kept.iter().zip(observations) {
                trace.record(
                    "tool_result",
                    json!({
                        "tool": call.name,
                        "arguments": call.arguments,
                        "result": excerpt(&observation, TRACE_RESULT_EXCERPT_CHARS),
                        "chars": observation.len(),
                    }),
                );
                assessments.push(assess_tool_result(&call.name, &observation));
                turn.push(Message::tool_result(&call.id, observation));
                turn.total_tool_calls += 1;
            }
            // Name the limit that actually clamped the step.
            let deferral = if remaining < self.limits.max_tool_calls_per_step {
                format!(
                    "Deferred: only {} tool calls remained in this turn's total budget. \
                     Re-issue this call in the next step if it is still needed.",
                    allowed
                )
            } else {
                format!(
                    "Deferred: the per-step tool-call limit of {} was reached. \
                     Re-issue this call in the next step if it is still needed.",
                    allowed
                )
            };
            for call in deferred {
                turn.push(Message::tool_result(&call.id, deferral.clone()));
            }
            if !deferred.is_empty() {
                trace.record(
                    "calls_deferred",
                    json!({"count": deferred.len(), "allowed": allowed}),
                );
            }

            trace.record("assessments", json!(&assessments));
            turn.push(Message::system(build_reflection_note(
                turn.steps,
                &assessments,
            )));

            self.append_ledger(&session_id, &mut ledger, turn.steps, kept, &assessments)
                .await;

            if tooling
                && turn.total_tool_calls >= self.limits.max_total_tool_calls
                && !budget_notice_sent
            {
                turn.push(Message::system(BUDGET_NOTICE));
                budget_notice_sent = true;
                trace.record("budget_exhausted", json!({"total": turn.total_tool_calls}));
            }
        }

        let final_response = match final_response {
            Some(text) => text,
            // Step limit hit with no final answer: self-assessment protocol.
            None => self.self_assessment(&mut turn, &mut trace).await,
        };

        self.finalize(&turn, &mut trace, user_input, &final_response)
            .await;
        Ok(TurnOutcome {
            final_response,
            turn,
            trace,
            loop_detected,
        })
    }

    // ── Internals ──

    /// Offload oversized user input before it enters the conversation.
    async fn gatekeep(&self, session_id: &SessionId, input: &str) -> String {
        if estimate_tokens(input) <= self.limits.user_input_limit_tokens {
            return input.to_string();
        }
        match self
            .scratchpad
            .put(session_id, None, input, "Oversized user input", "user_input")
            .await
        {
            Ok(key) => {
                debug!(key, "Gatekeeper offloaded oversized user input");
                format!(
                    "[Large input offloaded to scratchpad]\nReference: ref:{key}\n\nPreview:\n{}",
                    sandwich_preview(input)
                )
            }
            Err(e) => {
                warn!(error = %e, "Gatekeeper offload failed, passing input through");
                input.to_string()
            }
        }
    }

    async fn scratchpad_index(&self, session_id: &SessionId) -> String {
        match self.scratchpad.list(session_id).await {
            Ok(entries) if !entries.is_empty() => entries
                .iter()
                .map(|e| format!("• ref:{} — {} ({} chars)", e.key, e.description, e.size_chars))
                .collect::<Vec<_>>()
                .join("\n"),
            Ok(_) => "(empty — no task context stored yet)".into(),
            Err(e) => {
                warn!(error = %e, "Scratchpad index unavailable");
                "(empty — no task context stored yet)".into()
            }
        }
    }

    /// Validate, resolve, execute one call; always returns an observation
    /// string for the history, never an error.
    async fn dispatch_call(&self, session_id: &SessionId, call: &MessageToolCall) -> String {
        let arguments: Value = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(_) => {
                return format!(
                    "{GATEWAY_ERROR_PREFIX} Invalid JSON arguments. [HINT]: Correct the JSON syntax."
                );
            }
        };

        let prepared = match self
            .gateway
            .prepare(session_id, &call.id, &call.name, &arguments)
            .await
        {
            Ok(prepared) => prepared,
            Err(e) => return e.observation(),
        };

        match self.registry.execute(&prepared).await {
            Ok(result) => {
                if result.success {
                    self.archive_if_oversized(session_id, &call.name, result.output)
                        .await
                } else {
                    result.output
                }
            }
            Err(e) => format!("{TOOL_ERROR_PREFIX} {e}"),
        }
    }

    /// Replace an oversized tool output with a sandwich preview plus a
    /// reference to the archived full content.
    async fn archive_if_oversized(
        &self,
        session_id: &SessionId,
        tool_name: &str,
        output: String,
    ) -> String {
        if estimate_tokens(&output) <= self.limits.tool_output_limit_tokens
            || output.contains("[Full result saved as ref:")
        {
            return output;
        }
        match self
            .scratchpad
            .put(
                session_id,
                None,
                &output,
                &format!("Output of {tool_name}"),
                "tool_output",
            )
            .await
        {
            Ok(key) => {
                self.publish(DomainEvent::OutputArchived {
                    key: key.clone(),
                    tool_name: tool_name.to_string(),
                    timestamp: Utc::now(),
                });
                format!(
                    "{}\n\n[Full result saved as ref:{key}]",
                    sandwich_preview(&output)
                )
            }
            Err(e) => {
                warn!(error = %e, "Tool-output archival failed, keeping full output");
                output
            }
        }
    }

    /// Append a ledger row and persist the rolling tail to the scratchpad.
    async fn append_ledger(
        &self,
        session_id: &SessionId,
        ledger: &mut Vec<Value>,
        step: usize,
        calls: &[MessageToolCall],
        assessments: &[StepAssessment],
    ) {
        ledger.push(json!({
            "step": step,
            "tools": calls.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
            "statuses": assessments
                .iter()
                .map(|a| match a.status {
                    AssessmentStatus::Ok => "ok",
                    AssessmentStatus::Partial => "partial",
                    AssessmentStatus::Error => "error",
                    AssessmentStatus::Blocked => "blocked",
                })
                .collect::<Vec<_>>(),
        }));
        let start = ledger.len().saturating_sub(STEP_LEDGER_LEN);
        let tail = match serde_json::to_string_pretty(&ledger[start..]) {
            Ok(json) => json,
            Err(_) => return,
        };
        if let Err(e) = self
            .scratchpad
            .put(
                session_id,
                Some(STEP_LEDGER_KEY),
                &tail,
                "Recent reasoning-step ledger",
                "ledger",
            )
            .await
        {
            warn!(error = %e, "Step ledger persistence failed");
        }
    }

    /// One tools-free completion at low temperature asking for an honest
    /// FULLY / PARTIALLY / NOT ACHIEVED verdict.
    async fn self_assessment(&self, turn: &mut Turn, trace: &mut TurnTrace) -> String {
        turn.status = TurnStatus::BudgetExhausted;
        turn.push(Message::system(format!(
            "[SYSTEM NOTICE] You have reached the maximum step limit of {}. Provide your \
             final answer now. State whether the goal was FULLY ACHIEVED, PARTIALLY \
             ACHIEVED, or NOT ACHIEVED, summarize the verified results so far, and tell \
             the user what to say to resume the remaining work. Do NOT invent results \
             for steps that did not run.",
            self.limits.max_steps
        )));
        trace.record("self_assessment", json!({"max_steps": self.limits.max_steps}));

        let request = ProviderRequest::text(&self.model, turn.messages.clone(), 0.1);
        match self.provider.complete(request).await {
            Ok(response) => {
                let text = response.message.content.clone();
                turn.push(response.message);
                text
            }
            Err(e) => {
                warn!(error = %e, "Self-assessment call failed, using fallback");
                SELF_ASSESSMENT_FALLBACK.to_string()
            }
        }
    }

    async fn finalize(
        &self,
        turn: &Turn,
        trace: &mut TurnTrace,
        user_input: &str,
        final_response: &str,
    ) {
        if matches!(
            turn.status,
            TurnStatus::Completed | TurnStatus::BudgetExhausted
        ) {
            let durable = self.policy.is_durable(user_input);
            if durable {
                if let Err(e) = self.memory.update(turn).await {
                    warn!(error = %e, "Long-term memory update failed");
                }
            }
            if durable || turn.total_tool_calls > 0 {
                let snapshot = format!(
                    "USER_REQUEST:\n{user_input}\n\nASSISTANT_RESPONSE:\n{final_response}"
                );
                if let Err(e) = self
                    .scratchpad
                    .put(
                        &turn.session_id,
                        None,
                        &snapshot,
                        "Completed turn snapshot",
                        "turn_memory",
                    )
                    .await
                {
                    warn!(error = %e, "Turn snapshot write failed");
                }
            }
        }

        trace.total_tool_calls = turn.total_tool_calls;
        trace.finish();
        self.publish(DomainEvent::TurnCompleted {
            session_id: turn.session_id.clone(),
            steps: turn.steps,
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

const TRACE_RESULT_EXCERPT_CHARS: usize = 400;

/// Bounded excerpt for trace records; never splits a multi-byte char.
fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

/// Order-insensitive fingerprint of a step's requested call set.
fn call_signature(calls: &[MessageToolCall]) -> String {
    let mut parts: Vec<String> = calls
        .iter()
        .map(|c| format!("{}({})", c.name, c.arguments))
        .collect();
    parts.sort();
    parts.join("|")
}
