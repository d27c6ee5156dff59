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

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini native API provider.
pub struct GeminiProvider {
    http: Client,
    config: ProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn url(&self, model: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_BASE)
            .trim_end_matches('/');
        format!("{}/v1beta/models/{}:streamGenerateContent?alt=sse", base, model)
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

fn text_content(role: Option<&str>, text: String) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart { text: Some(text) }],
    }
}

fn build_request(config: &ProviderConfig, request: &GenerationRequest) -> GeminiRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    for msg in request.conversation() {
        match msg.role {
            Role::System => system.push(msg.content),
            Role::User => contents.push(text_content(Some("user"), msg.content)),
            Role::Assistant => contents.push(text_content(Some("model"), msg.content)),
        }
    }

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| text_content(None, system.join("\n\n"))),
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens.unwrap_or(config.max_tokens),
            temperature: request.temperature.or(config.temperature),
        },
    }
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<TokenEvent> {
    match serde_json::from_str::<GeminiStreamChunk>(&event.data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return vec![TokenEvent::Error(error.message)];
            }
            let Some(candidate) = chunk.candidates.into_iter().next() else {
                return vec![];
            };

            // The final chunk carries both text and the finish reason.
            let mut events: Vec<TokenEvent> = candidate
                .content
                .map(|c| c.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| p.text)
                .filter(|t| !t.is_empty())
                .map(TokenEvent::Token)
                .collect();
            if let Some(reason) = candidate.finish_reason {
                debug!(finish_reason = %reason, "Gemini stream finished");
                events.push(TokenEvent::Done);
            }
            events
        }
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse Gemini SSE chunk");
            vec![]
        }
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
                .ok_or_else(|| FlowlineError::Config("Gemini: api_key is required".into()))?;
            let body = build_request(&self.config, &request);

            let req = self
                .http
                .post(self.url(&request.model))
                .header("x-goog-api-key", api_key)
                .json(&body);

            debug!(model = %request.model, "Gemini request");
            let response = super::send(req, &request.cancel).await?;
            Ok(super::token_stream(response, request.cancel.clone(), parse_chunk))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_text_with_finish() {
        let events = parse_chunk(event(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Done."}]},"finishReason":"STOP"}]}"#,
        ));
        assert_eq!(events, vec![TokenEvent::Token("Done.".into()), TokenEvent::Done]);
    }

    #[test]
    fn test_parse_error() {
        let events = parse_chunk(event(r#"{"error":{"code":400,"message":"API key not valid"}}"#));
        assert_eq!(events, vec![TokenEvent::Error("API key not valid".into())]);
    }

    #[test]
    fn test_request_shape() {
        let config = ProviderConfig {
            base_url: Some("http://localhost:9999/".into()),
            max_tokens: 256,
            ..Default::default()
        };
        let provider = GeminiProvider::new(config.clone());
        assert_eq!(
            provider.url("gemini-pro"),
            "http://localhost:9999/v1beta/models/gemini-pro:streamGenerateContent?alt=sse"
        );

        let mut request = GenerationRequest::new("plan", "gemini-pro");
        request.messages.push(ChatMessage::assistant("ok"));
        let body = serde_json::to_value(build_request(&config, &request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!(body.get("systemInstruction").is_none());
    }
}
