//! Mocks and fixtures shared by the Flowline test suites.

mod fixtures;
mod issues;
mod llm;
mod logger;
mod storage;

pub use fixtures::{sample_issue, write_flows};
pub use issues::MockIssueTracker;
pub use llm::MockLlmProvider;
pub use logger::{LogEntry, RecordingLogger};
pub use storage::MemoryFlowStorage;
