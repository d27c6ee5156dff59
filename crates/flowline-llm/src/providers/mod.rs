pub mod anthropic;
pub mod gemini;
pub mod openai;

use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{RequestBuilder, Response};
use tokio_util::sync::CancellationToken;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::types::TokenEvent;

use crate::streaming::{SseEvent, SseStream};

/// Send a request, giving up early if the caller cancels.
pub(crate) async fn send(req: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FlowlineError::Cancelled),
        response = req.send() => response.map_err(|e| FlowlineError::LlmRequest(e.to_string()))?,
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(FlowlineError::LlmRequest(format!("HTTP {}: {}", status, body)));
    }
    Ok(response)
}

/// Turn an SSE response into token events, ending with `Done`.
pub(crate) fn token_stream(
    response: Response,
    cancel: CancellationToken,
    parse: fn(SseEvent) -> Vec<TokenEvent>,
) -> BoxStream<'static, TokenEvent> {
    SseStream::new(response.bytes_stream())
        .flat_map(move |item| {
            let events = match item {
                Ok(event) => parse(event),
                Err(e) => vec![TokenEvent::Error(e)],
            };
            stream::iter(events)
        })
        .chain(stream::once(async { TokenEvent::Done }))
        .take_until(cancel.cancelled_owned())
        .boxed()
}
