use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::LlmProvider;
use flowline_core::types::{GenerationRequest, TokenEvent};

/// Scripted LLM provider.
///
/// Streams its canned response one word at a time, so callers exercise the
/// default `generate` collection path.
pub struct MockLlmProvider {
    name: String,
    response: String,
    failure: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockLlmProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: "mock plan".to_string(),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Fail every request with an `LlmRequest` error carrying `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, TokenEvent>>> {
        self.requests.lock().unwrap().push(request);
        Box::pin(async move {
            if let Some(message) = &self.failure {
                return Err(FlowlineError::LlmRequest(message.clone()));
            }
            let mut events: Vec<TokenEvent> = self
                .response
                .split_inclusive(' ')
                .map(|t| TokenEvent::Token(t.to_string()))
                .collect();
            events.push(TokenEvent::Done);
            Ok(stream::iter(events).boxed())
        })
    }
}
