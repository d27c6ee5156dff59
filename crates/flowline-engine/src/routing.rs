use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::Context;

/// Context key an upstream step can set to pick a downstream route label.
pub const NEXT_STEP_KEY: &str = "nextStep";

/// Fallback label used when no selector matches.
pub const DEFAULT_LABEL: &str = "default";

/// A step-local routing table: outcome label -> next step id.
///
/// Declarations may give a plain string instead of a table; it is the
/// reduced case of a table with a single `"default"` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRoutes", into = "BTreeMap<String, String>")]
pub struct Routes(BTreeMap<String, String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRoutes {
    Single(String),
    Table(BTreeMap<String, String>),
}

impl From<RawRoutes> for Routes {
    fn from(raw: RawRoutes) -> Self {
        match raw {
            RawRoutes::Single(id) => Routes::single(id),
            RawRoutes::Table(table) => Routes(table),
        }
    }
}

impl From<Routes> for BTreeMap<String, String> {
    fn from(routes: Routes) -> Self {
        routes.0
    }
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with only a `"default"` route.
    pub fn single(next: impl Into<String>) -> Self {
        Self::new().with(DEFAULT_LABEL, next)
    }

    /// Add a route.
    pub fn with(mut self, label: impl Into<String>, next: impl Into<String>) -> Self {
        self.0.insert(label.into(), next.into());
        self
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    /// All (label, target) pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, t)| (l.as_str(), t.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Shared next-step resolution for steps without branching logic.
    ///
    /// 1. A context selector at [`NEXT_STEP_KEY`] naming one of our labels wins.
    /// 2. Otherwise the `"default"` label.
    /// 3. Otherwise `None`: the flow ends on this branch.
    pub fn resolve(&self, ctx: &Context) -> Option<String> {
        if let Some(selector) = ctx.get_text(NEXT_STEP_KEY) {
            if let Some(next) = self.0.get(&selector) {
                return Some(next.clone());
            }
        }
        self.0.get(DEFAULT_LABEL).cloned()
    }
}
