//! Intent Router — decides, per turn, whether tools are needed and which
//! domains to expose to the model.
//!
//! Evaluation order for a new turn:
//! 1. An explicit leading `#domain` tag pins the domain set and skips
//!    everything else.
//! 2. A fast-path shortcut: short messages with a low estimated tool
//!    probability route straight to conversational, no model call.
//! 3. A temperature-zero classification call against the closed domain
//!    label set, in JSON mode.
//! 4. A calibration pass: if the keyword-estimated tool probability is
//!    below the configured threshold, the result is downgraded to
//!    conversational regardless of the raw label.
//! 5. If the classification call fails or returns garbage, the full
//!    domain set is exposed — misrouting costs one wasted schema block,
//!    misclassifying to a wrong subset costs the whole turn.
//!
//! The router only selects which tool schemas the model sees; it never
//! invokes a tool itself.

mod probability;

pub use probability::estimate_tool_probability;

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use turnstone_core::{Message, Provider, ProviderRequest, RoutingError};

/// The sentinel label meaning "no tools needed".
pub const CONVERSATIONAL_LABEL: &str = "CONVERSATIONAL";

const SYSTEM_TEMPLATE: &str = "\
You are the intent classifier for a multi-tool AI agent.
Read the user's request and return the most relevant tool domains.

Available domains:
{domain_list}

Respond ONLY with valid JSON:
{\"domains\": [\"DOMAIN1\", \"DOMAIN2\"], \"confidence\": 0.9, \"reasoning\": \"brief\"}

Guidance (not hard rules — use your judgment):
- Prefer 2-3 focused domains over listing everything
- Use CONVERSATIONAL when no external data or action is needed
- Avoid domains that are not in the list above";

/// Whether the turn gets tool schemas at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// No tools exposed; the model answers from the conversation alone.
    ConversationalOnly,
    /// Tool schemas for the selected domains are exposed.
    Tooling,
}

/// The router's verdict for one turn.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub mode: RouteMode,
    /// Selected domains; empty when conversational.
    pub domains: Vec<String>,
    pub confidence: f64,
    /// Keyword-estimated probability that tools are needed.
    pub tool_probability: f64,
    pub reasoning: String,
}

impl RouteDecision {
    fn conversational(tool_probability: f64, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            mode: RouteMode::ConversationalOnly,
            domains: Vec::new(),
            confidence,
            tool_probability,
            reasoning: reasoning.into(),
        }
    }
}

#[derive(Deserialize)]
struct ClassifierOutput {
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Classifies user intent against the registered tool domains.
/// Runs at temperature 0.0 for determinism.
pub struct IntentRouter {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    /// `(name, description)` pairs for the classification prompt.
    domains: Vec<(String, String)>,
    calibration_threshold: f64,
    fast_path_max_chars: usize,
    classify_max_chars: usize,
}

impl IntentRouter {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        domains: Vec<(String, String)>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            domains,
            calibration_threshold: 0.2,
            fast_path_max_chars: 220,
            classify_max_chars: 2000,
        }
    }

    pub fn with_calibration_threshold(mut self, threshold: f64) -> Self {
        self.calibration_threshold = threshold;
        self
    }

    pub fn with_fast_path_max_chars(mut self, max_chars: usize) -> Self {
        self.fast_path_max_chars = max_chars;
        self
    }

    pub fn with_classify_max_chars(mut self, max_chars: usize) -> Self {
        self.classify_max_chars = max_chars;
        self
    }

    fn domain_names(&self) -> Vec<String> {
        self.domains.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Classify a user message into a routing decision.
    ///
    /// `context_digest` is an optional short summary of prior session
    /// context, appended to the classification prompt for follow-up turns
    /// whose intent only makes sense against earlier ones.
    pub async fn classify(&self, user_text: &str, context_digest: Option<&str>) -> RouteDecision {
        // 1. Explicit tag pin skips fast-path and calibration alike.
        if let Some(pinned) = self.pinned_domains(user_text) {
            debug!(domains = ?pinned, "Routing pinned by explicit tag");
            return RouteDecision {
                mode: RouteMode::Tooling,
                domains: pinned,
                confidence: 1.0,
                tool_probability: 1.0,
                reasoning: "Pinned by explicit user tag.".into(),
            };
        }

        // 2. Fast path for short, clearly conversational turns.
        let tool_probability = estimate_tool_probability(user_text);
        if tool_probability < self.calibration_threshold
            && user_text.trim().chars().count() <= self.fast_path_max_chars
        {
            debug!(tool_probability, "Fast-path conversational routing");
            return RouteDecision::conversational(
                tool_probability,
                0.9,
                "Fast-path conversational routing (low tool-need probability).",
            );
        }

        // 3. Model classification at temperature zero.
        let mut decision = match self.classify_with_model(user_text, context_digest).await {
            Ok(decision) => decision,
            Err(e) => {
                // 5. Full-set fallback: expose everything rather than guess
                // a subset and starve the turn of the tool it needed. This
                // bypasses the calibration downgrade: a blind turn must stay
                // tool-capable.
                warn!(error = %e, "Classification failed, exposing full domain set");
                return RouteDecision {
                    mode: RouteMode::Tooling,
                    domains: self.domain_names(),
                    confidence: 0.0,
                    tool_probability,
                    reasoning: format!("Full-set fallback (classification failed: {e})."),
                };
            }
        };
        decision.tool_probability = tool_probability;

        // 4. Calibration downgrade.
        if decision.tool_probability < self.calibration_threshold {
            return RouteDecision::conversational(
                decision.tool_probability,
                decision.confidence,
                "Calibrated to conversational-only (low tool-need probability).",
            );
        }
        decision
    }

    /// A leading `#domain` tag (e.g. `#web_tools fetch that page`) pins
    /// the domain set. Unknown tags are ignored and classification runs
    /// normally.
    fn pinned_domains(&self, user_text: &str) -> Option<Vec<String>> {
        let tag = user_text.trim().strip_prefix('#')?;
        let token: String = tag
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        self.domains
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&token))
            .map(|(name, _)| vec![name.clone()])
    }

    /// Head/tail truncation for very long inputs: the opening usually
    /// states the intent and the closing usually states the ask.
    fn truncate_for_classification(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.classify_max_chars {
            return text.to_string();
        }
        let head: String = chars[..800].iter().collect();
        let tail: String = chars[chars.len() - 400..].iter().collect();
        format!("{head}\n...[TRUNCATED]...\n{tail}")
    }

    async fn classify_with_model(
        &self,
        user_text: &str,
        context_digest: Option<&str>,
    ) -> Result<RouteDecision, RoutingError> {
        let domain_list = self
            .domains
            .iter()
            .map(|(name, desc)| format!("- {name}: {desc}"))
            .chain(std::iter::once(format!(
                "- {CONVERSATIONAL_LABEL}: Simple chat, opinions, greetings — no tools needed"
            )))
            .collect::<Vec<_>>()
            .join("\n");
        let system = SYSTEM_TEMPLATE.replace("{domain_list}", &domain_list);

        let prompt = self.truncate_for_classification(user_text);
        let user = match context_digest {
            Some(digest) => {
                format!("Prior session context: {digest}\n\nClassify this request: {prompt}")
            }
            None => format!("Classify this request: {prompt}"),
        };

        let mut request =
            ProviderRequest::text(&self.model, vec![Message::system(system), Message::user(user)], self.temperature);
        request.json_mode = true;
        request.max_tokens = Some(200);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| RoutingError::ClassificationFailed(e.to_string()))?;

        self.parse_output(&response.message.content)
    }

    fn parse_output(&self, content: &str) -> Result<RouteDecision, RoutingError> {
        // Some models wrap the JSON in prose despite the instruction.
        let start = content.find('{');
        let end = content.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if e > s => &content[s..=e],
            _ => return Err(RoutingError::Unparseable(content.chars().take(120).collect())),
        };

        let parsed: ClassifierOutput = serde_json::from_str(json)
            .map_err(|e| RoutingError::Unparseable(e.to_string()))?;

        let known = self.domain_names();
        let conversational = parsed
            .domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(CONVERSATIONAL_LABEL));
        let valid: Vec<String> = parsed
            .domains
            .iter()
            .filter(|d| known.iter().any(|k| k.eq_ignore_ascii_case(d)))
            .map(|d| d.to_uppercase())
            .collect();

        let confidence = parsed.confidence.unwrap_or(0.5);
        let reasoning = parsed.reasoning.unwrap_or_default();

        // tool_probability is overwritten by the caller's keyword estimate.
        if conversational && valid.is_empty() {
            return Ok(RouteDecision::conversational(1.0, confidence, reasoning));
        }

        // Nothing recognized: expose everything rather than nothing.
        let domains = if valid.is_empty() { known } else { valid };
        Ok(RouteDecision {
            mode: RouteMode::Tooling,
            domains,
            confidence,
            tool_probability: 1.0,
            reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use turnstone_core::{ProviderError, ProviderResponse};

    /// Scripted provider: returns canned responses in order, or an error.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<String, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let next = self
                .responses
                .lock()
                .unwrap()
                .remove(0);
            next.map(|content| ProviderResponse {
                message: Message::assistant(content),
                usage: None,
                model: "scripted".into(),
            })
        }
    }

    fn domains() -> Vec<(String, String)> {
        vec![
            ("WEB_TOOLS".into(), "Scrape or read a specific URL".into()),
            ("SEARCH_TOOLS".into(), "Web research and fact-finding".into()),
            ("SESSION_SCRATCHPAD".into(), "Store or retrieve large session data".into()),
        ]
    }

    fn router(responses: Vec<Result<String, ProviderError>>) -> IntentRouter {
        IntentRouter::new(Arc::new(ScriptedProvider::new(responses)), "test-model", domains())
    }

    #[tokio::test]
    async fn tag_pin_bypasses_classification() {
        // No scripted responses: any model call would panic.
        let router = router(vec![]);
        let decision = router.classify("#web_tools grab this page", None).await;
        assert_eq!(decision.mode, RouteMode::Tooling);
        assert_eq!(decision.domains, vec!["WEB_TOOLS".to_string()]);
        assert!((decision.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unknown_tag_falls_through_to_classification() {
        let router = router(vec![Ok(
            r#"{"domains": ["SEARCH_TOOLS"], "confidence": 0.8, "reasoning": "research request"}"#.into(),
        )]);
        let decision = router
            .classify("#nonexistent search the web for rust news", None)
            .await;
        assert_eq!(decision.domains, vec!["SEARCH_TOOLS".to_string()]);
    }

    #[tokio::test]
    async fn short_conceptual_message_takes_fast_path() {
        let router = router(vec![]);
        let decision = router.classify("why is the sky blue?", None).await;
        assert_eq!(decision.mode, RouteMode::ConversationalOnly);
        assert!(decision.domains.is_empty());
        assert!(decision.tool_probability < 0.2);
    }

    #[tokio::test]
    async fn actiony_message_is_classified() {
        let router = router(vec![Ok(
            r#"{"domains": ["WEB_TOOLS"], "confidence": 0.9, "reasoning": "scrape a url"}"#.into(),
        )]);
        let decision = router
            .classify("scrape https://example.com and summarize it", None)
            .await;
        assert_eq!(decision.mode, RouteMode::Tooling);
        assert_eq!(decision.domains, vec!["WEB_TOOLS".to_string()]);
    }

    #[tokio::test]
    async fn classification_failure_exposes_full_set() {
        let router = router(vec![Err(ProviderError::Network("connection refused".into()))]);
        let decision = router
            .classify("search for the latest rust release notes", None)
            .await;
        assert_eq!(decision.mode, RouteMode::Tooling);
        assert_eq!(decision.domains.len(), 3);
        assert!(decision.reasoning.contains("Full-set fallback"));
    }

    #[tokio::test]
    async fn failure_fallback_is_not_calibrated_away() {
        // A raised threshold would otherwise downgrade the fallback to
        // conversational-only and strand the turn without tools.
        let router = router(vec![Err(ProviderError::Network("connection refused".into()))])
            .with_calibration_threshold(0.3);
        let text = "could you tell me what the difference is between the borrow \
                    checker rules for mutable and shared references, and how that \
                    interacts with non-lexical lifetimes when a reference is created \
                    inside a loop body but only used on the first iteration?";
        assert!(text.chars().count() > 220);
        let decision = router.classify(text, None).await;
        assert_eq!(decision.mode, RouteMode::Tooling);
        assert_eq!(decision.domains.len(), 3);
        assert!(decision.reasoning.contains("Full-set fallback"));
    }

    #[tokio::test]
    async fn unparseable_output_exposes_full_set() {
        let router = router(vec![Ok("I think you want web tools!".into())]);
        let decision = router
            .classify("search for the latest rust release notes", None)
            .await;
        assert_eq!(decision.domains.len(), 3);
    }

    #[tokio::test]
    async fn conversational_label_yields_no_tools() {
        let router = router(vec![Ok(
            r#"{"domains": ["CONVERSATIONAL"], "confidence": 0.95, "reasoning": "just chatting"}"#.into(),
        )]);
        // Long enough to miss the fast path
        let text = "tell me a long and winding story about a lighthouse keeper \
                    who collected maps of places that do not exist and what that \
                    hobby meant to the people around him over the years of his life";
        let decision = router.classify(text, None).await;
        assert_eq!(decision.mode, RouteMode::ConversationalOnly);
    }

    #[tokio::test]
    async fn long_input_is_head_tail_truncated() {
        let router = router(vec![]);
        let text = "x".repeat(5000);
        let truncated = router.truncate_for_classification(&text);
        assert!(truncated.contains("...[TRUNCATED]..."));
        assert!(truncated.chars().count() < 1400);
    }
}
