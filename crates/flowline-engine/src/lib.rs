//! Flow execution engine.
//!
//! A flow is a directed graph of typed steps. Each step mutates a shared
//! [`Context`], then names its successor through a label-keyed routing table.
//! Declarations are validated as a whole before any step is built, the
//! [`StepFactory`] turns each declaration into a concrete step, and a
//! [`Session`] walks the resulting [`Flow`] one step at a time.

pub mod context;
pub mod definition;
pub mod factory;
pub mod flow;
pub mod manager;
pub mod routing;
pub mod session;
pub mod steps;
pub mod storage;
pub mod template;
pub mod validation;

pub use context::Context;
pub use definition::{FlowDefinition, StepDeclaration, StepKind};
pub use factory::StepFactory;
pub use flow::Flow;
pub use manager::FlowManager;
pub use routing::Routes;
pub use session::{Session, SessionStatus};
pub use steps::Step;
pub use storage::FsFlowStorage;
