//! Keyword-based tool-need estimation.
//!
//! A deliberately cheap heuristic that runs before (and independently of)
//! the model classifier. It gates the fast path and calibrates the final
//! decision: when this score is low, a raw TOOLING label is downgraded to
//! conversational, trading recall for latency and noise reduction.

/// Action-oriented terms that strongly suggest a tool is wanted.
const ACTION_TERMS: &[&str] = &[
    // Search & info
    "search", "find", "look up", "who is", "what is", "where is", "when did", "latest", "today",
    "current", "news", "weather", "forecast", "temperature", "price", "stock", "crypto",
    "exchange rate", "calculate", "convert", "map", "location", "address",
    // Web & communication
    "scrape", "crawl", "website", "url", "extract", "fetch", "send", "email", "mail", "message",
    "post", "tweet", "slack", "telegram", "browse", "visit", "link", "http://", "https://",
    // Creation & files
    "create", "generate", "build", "write", "save", "store", "file", "document", "pdf", "docx",
    "xlsx", "csv", "json", "scratchpad", "remember", "note",
    // Productivity
    "schedule", "book", "calendar", "event", "meeting", "reminder", "task", "todo",
    // Media
    "image", "picture", "photo", "draw", "video", "youtube", "audio", "transcribe", "chart",
    "diagram",
];

/// Estimate the probability that a message needs tools, in `[0, 1]`.
///
/// Tiers:
/// - contains an action term: 0.75
/// - short pure question: 0.12 (below the default calibration threshold,
///   so these take the conversational fast path)
/// - long pure question: 0.25
/// - everything else: 0.4
pub fn estimate_tool_probability(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let has_action = ACTION_TERMS.iter().any(|t| lower.contains(t));
    if has_action {
        return 0.75;
    }
    let questiony = text.contains('?');
    let long_turn = text.chars().count() > 180;
    match (questiony, long_turn) {
        (true, false) => 0.12,
        (true, true) => 0.25,
        _ => 0.4,
    }
}
