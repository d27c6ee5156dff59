use futures::future::BoxFuture;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use flowline_core::config::ProviderConfig;
use flowline_core::error::Result;
use flowline_core::traits::LlmProvider;
use flowline_core::types::*;

use crate::streaming::SseEvent;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat completions provider. Works with OpenAI, Ollama,
/// vLLM, Groq, OpenRouter, etc. via `base_url`.
pub struct OpenAiProvider {
    http: Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|m| OaiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content,
        })
        .collect()
}

fn build_request(config: &ProviderConfig, request: &GenerationRequest) -> ChatRequest {
    ChatRequest {
        model: request.model.clone(),
        messages: convert_messages(request.conversation()),
        max_tokens: request.max_tokens.unwrap_or(config.max_tokens),
        temperature: request.temperature.or(config.temperature),
        stream: true,
    }
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<TokenEvent> {
    if event.is_done_marker() {
        return vec![TokenEvent::Done];
    }

    match serde_json::from_str::<StreamChunk>(&event.data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return vec![TokenEvent::Error(error.message)];
            }
            let Some(choice) = chunk.choices.into_iter().next() else {
                return vec![];
            };

            let mut events = Vec::new();
            if let Some(text) = choice.delta.and_then(|d| d.content) {
                if !text.is_empty() {
                    events.push(TokenEvent::Token(text));
                }
            }
            if let Some(reason) = choice.finish_reason {
                debug!(finish_reason = %reason, "OpenAI stream finished");
                events.push(TokenEvent::Done);
            }
            events
        }
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse OpenAI SSE chunk");
            vec![]
        }
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, TokenEvent>>> {
        Box::pin(async move {
            let url = self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            let body = build_request(&self.config, &request);

            let mut req = self.http.post(url).json(&body);
            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            debug!(model = %body.model, url, "OpenAI request");
            let response = super::send(req, &request.cancel).await?;
            Ok(super::token_stream(response, request.cancel.clone(), parse_chunk))
        })
    }
}
