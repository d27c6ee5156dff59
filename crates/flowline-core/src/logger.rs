use serde_json::Value;

use crate::traits::FlowLogger;
use crate::types::LogLevel;

/// Forwards flow output to `tracing` under the `flowline::flow` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl FlowLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, metadata: Option<&Value>) {
        let metadata = metadata.map(|m| m.to_string()).unwrap_or_default();
        match level {
            LogLevel::Error => tracing::error!(target: "flowline::flow", metadata = %metadata, "{}", message),
            LogLevel::Warn => tracing::warn!(target: "flowline::flow", metadata = %metadata, "{}", message),
            LogLevel::Info => tracing::info!(target: "flowline::flow", metadata = %metadata, "{}", message),
            LogLevel::Debug => tracing::debug!(target: "flowline::flow", metadata = %metadata, "{}", message),
        }
    }
}
