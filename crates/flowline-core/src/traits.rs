use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;

use crate::error::{FlowlineError, Result};
use crate::types::*;

/// The output sink that Log and PlanGeneration steps write to.
pub trait FlowLogger: Send + Sync + 'static {
    /// Emit a message at the given level with optional structured metadata.
    fn log(&self, level: LogLevel, message: &str, metadata: Option<&Value>);

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, None);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }
}

/// A single named text generation backend.
pub trait LlmProvider: Send + Sync + 'static {
    /// Provider name as used in flow declarations (e.g., "openai").
    fn name(&self) -> &str;

    /// Start a generation and receive a stream of token events.
    fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, TokenEvent>>>;

    /// Generate the full text, honouring the request's cancellation token.
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let cancel = request.cancel.clone();
            let collect = async {
                let mut stream = self.generate_stream(request).await?;
                let mut text = String::new();
                while let Some(event) = stream.next().await {
                    match event {
                        TokenEvent::Token(t) => text.push_str(&t),
                        TokenEvent::Error(e) => return Err(FlowlineError::LlmStream(e)),
                        TokenEvent::Done => break,
                    }
                }
                Ok(text)
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FlowlineError::Cancelled),
                result = collect => result,
            }
        })
    }
}

/// Fetches an issue and its comment thread.
pub trait IssueTracker: Send + Sync + 'static {
    /// Fetch an issue with its comments. `token`, when given, replaces the
    /// client's configured credentials for this call.
    fn get_issue_with_comments(
        &self,
        issue: IssueRef,
        token: Option<String>,
    ) -> BoxFuture<'_, Result<IssueWithComments>>;
}

/// Where declarative flow definitions live.
pub trait FlowStorage: Send + Sync + 'static {
    /// Names of all stored flows.
    fn list_flows(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Raw definition of a flow. `Ok(None)` means the flow does not exist.
    fn read_flow(&self, name: &str) -> BoxFuture<'_, Result<Option<String>>>;
}
