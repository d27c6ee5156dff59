use std::sync::Mutex;

use serde_json::Value;

use flowline_core::traits::FlowLogger;
use flowline_core::types::LogLevel;

/// One captured log call.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub metadata: Option<Value>,
}

/// Logger that records every call for later assertions.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Messages logged at exactly `level`, in order.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Whether any message at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

impl FlowLogger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str, metadata: Option<&Value>) {
        self.entries.lock().unwrap().push(LogEntry {
            level,
            message: message.to_string(),
            metadata: metadata.cloned(),
        });
    }
}
