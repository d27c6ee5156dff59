pub mod config;
pub mod error;
pub mod logger;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, FlowlineError, Result};
pub use logger::TracingLogger;
pub use types::*;
