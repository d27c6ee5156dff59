use futures::future::BoxFuture;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use flowline_core::config::ProviderConfig;
use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::LlmProvider;
use flowline_core::types::*;

use crate::streaming::SseEvent;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider, registered as `claude`.
pub struct ClaudeProvider {
    http: Client,
    config: ProviderConfig,
}

impl ClaudeProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum SseData {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaInfo },
    #[serde(rename = "message_delta")]
    MessageDelta { delta: MessageDeltaInfo },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum DeltaInfo {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct MessageDeltaInfo {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

/// Split out system messages; Anthropic takes them as a top-level field.
fn convert_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ApiMessage>) {
    let mut system: Vec<String> = Vec::new();
    let mut api_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.content),
            Role::User => api_msgs.push(ApiMessage {
                role: "user",
                content: msg.content,
            }),
            Role::Assistant => api_msgs.push(ApiMessage {
                role: "assistant",
                content: msg.content,
            }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, api_msgs)
}

fn build_request(config: &ProviderConfig, request: &GenerationRequest) -> AnthropicRequest {
    let (system, messages) = convert_messages(request.conversation());
    AnthropicRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens.unwrap_or(config.max_tokens),
        temperature: request.temperature.or(config.temperature),
        messages,
        system,
        stream: true,
    }
}

pub(crate) fn parse_event(event: SseEvent) -> Vec<TokenEvent> {
    match serde_json::from_str::<SseData>(&event.data) {
        Ok(SseData::ContentBlockDelta {
            delta: DeltaInfo::TextDelta { text },
        }) => vec![TokenEvent::Token(text)],
        Ok(SseData::MessageDelta { delta }) => {
            if let Some(reason) = delta.stop_reason {
                debug!(stop_reason = %reason, "Claude stream stopping");
            }
            vec![]
        }
        Ok(SseData::MessageStop) => vec![TokenEvent::Done],
        Ok(SseData::Error { error }) => vec![TokenEvent::Error(error.message)],
        Ok(_) => vec![],
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse Claude SSE event");
            vec![]
        }
    }
}

impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, TokenEvent>>> {
        Box::pin(async move {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| FlowlineError::Config("Claude API key not set".into()))?;
            let url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);
            let body = build_request(&self.config, &request);

            let req = self
                .http
                .post(url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body);

            debug!(model = %body.model, "Claude request");
            let response = super::send(req, &request.cancel).await?;
            Ok(super::token_stream(response, request.cancel.clone(), parse_event))
        })
    }
}
