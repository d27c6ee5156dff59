//! Concrete step variants.
//!
//! Every step exposes its id and routing table and is executed against the
//! session's [`Context`]. Execution returns the id of the next step, or
//! `None` when the flow ends on this branch.

pub mod action;
pub mod decision;
pub mod log;
pub mod plan;
pub mod read_issue;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use flowline_core::error::Result;

use crate::context::Context;
use crate::routing::Routes;

pub use action::{ActionOperation, ActionStep};
pub use decision::{Condition, DecisionStep};
pub use log::LogStep;
pub use plan::PlanGenerationStep;
pub use read_issue::ReadIssueStep;

/// A single unit of work in a flow.
pub trait Step: Send + Sync + 'static {
    /// Unique id within the owning flow.
    fn id(&self) -> &str;

    /// Outcome label -> next step id.
    fn routes(&self) -> &Routes;

    /// Run the step, returning the next step id (or `None` when terminal).
    ///
    /// `cancel` is only observed by steps that perform a cancellable external
    /// call.
    fn execute<'a>(
        &'a self,
        ctx: &'a mut Context,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<String>>>;
}
