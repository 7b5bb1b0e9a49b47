//! Scripted provider for loop tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use turnstone_core::{
    Message, MessageToolCall, Provider, ProviderError, ProviderRequest, ProviderResponse,
};

/// A provider that replays a fixed script of responses in order and
/// records every request it receives, so tests can assert on what the
/// loop actually sent (temperature, tools offered, message shape).
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A plain assistant text response.
    pub fn text(content: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant(content),
            usage: None,
            model: "mock".into(),
        }
    }

    /// An assistant response requesting the given tool calls.
    pub fn tool_calls(calls: Vec<(&str, &str, &str)>) -> ProviderResponse {
        let mut message = Message::assistant("");
        message.tool_calls = calls
            .into_iter()
            .map(|(id, name, arguments)| MessageToolCall {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            })
            .collect();
        ProviderResponse {
            message,
            usage: None,
            model: "mock".into(),
        }
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "mock script exhausted".into(),
            })
    }
}
