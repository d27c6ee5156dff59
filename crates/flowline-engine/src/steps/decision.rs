use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::FlowLogger;

use super::Step;
use crate::context::Context;
use crate::routing::Routes;

/// Comparison applied to the context value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Empty,
    NotEmpty,
    /// A condition name the engine does not know; compared as `Equals`.
    Other(String),
}

impl Condition {
    pub fn parse(s: &str) -> Self {
        // `not_empty`, `notEmpty` and `not-empty` are the same condition.
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "equals" => Self::Equals,
            "notequals" => Self::NotEquals,
            "contains" => Self::Contains,
            "notcontains" => Self::NotContains,
            "empty" => Self::Empty,
            "notempty" => Self::NotEmpty,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Evaluate against `value`, using `expected` where the condition needs it.
    pub fn evaluate(&self, value: &str, expected: &str) -> bool {
        match self {
            Self::Equals | Self::Other(_) => value == expected,
            Self::NotEquals => value != expected,
            Self::Contains => value.contains(expected),
            Self::NotContains => !value.contains(expected),
            Self::Empty => value.is_empty(),
            Self::NotEmpty => !value.is_empty(),
        }
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(Self::parse(&s))
    }
}

/// Declared fields of a `decision` step.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionFields {
    pub condition: Condition,
    pub context_key: String,
    #[serde(default)]
    pub true_value: Option<String>,
    /// Accepted but unused: the outcome only compares against `true_value`.
    #[serde(default)]
    pub false_value: Option<String>,
}

/// Branches on a context value to the `"true"` or `"false"` route.
pub struct DecisionStep {
    id: String,
    routes: Routes,
    condition: Condition,
    context_key: String,
    true_value: String,
    logger: Arc<dyn FlowLogger>,
}

impl DecisionStep {
    pub fn new(
        id: impl Into<String>,
        routes: Routes,
        condition: Condition,
        context_key: impl Into<String>,
        true_value: impl Into<String>,
        logger: Arc<dyn FlowLogger>,
    ) -> Self {
        Self {
            id: id.into(),
            routes,
            condition,
            context_key: context_key.into(),
            true_value: true_value.into(),
            logger,
        }
    }

    pub fn from_fields(
        id: impl Into<String>,
        routes: Routes,
        fields: DecisionFields,
        logger: Arc<dyn FlowLogger>,
    ) -> Self {
        Self::new(
            id,
            routes,
            fields.condition,
            fields.context_key,
            fields.true_value.unwrap_or_default(),
            logger,
        )
    }

    fn outcome(&self, ctx: &Context) -> bool {
        let Some(value) = ctx.get(&self.context_key) else {
            self.logger.warn(&format!(
                "Step '{}': context key '{}' not found, treating condition as false",
                self.id, self.context_key
            ));
            return false;
        };

        let text = ctx
            .get_text(&self.context_key)
            .unwrap_or_else(|| value.to_string());

        if let Condition::Other(name) = &self.condition {
            self.logger.warn(&format!(
                "Step '{}': unknown condition '{}', falling back to equals",
                self.id, name
            ));
        }

        self.condition.evaluate(&text, &self.true_value)
    }
}

impl Step for DecisionStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn routes(&self) -> &Routes {
        &self.routes
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut Context,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        let outcome = self.outcome(ctx);
        let label = if outcome { "true" } else { "false" };
        debug!(step_id = %self.id, key = %self.context_key, outcome, "Decision evaluated");

        let result = match self.routes.get(label) {
            Some(next) => Ok(Some(next.to_string())),
            None => {
                let err = FlowlineError::step(
                    &self.id,
                    format!("no next step for condition result '{}'", label),
                );
                self.logger.error(&err.to_string());
                Err(err)
            }
        };
        Box::pin(async move { result })
    }
}
