use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use flowline_core::error::{FlowlineError, Result};

use crate::context::Context;
use crate::definition::FlowDefinition;
use crate::factory::StepFactory;
use crate::steps::Step;
use crate::validation;

/// An immutable graph of steps.
///
/// Routing lives entirely in each step's table; the flow only indexes steps
/// by id. A `Flow` is read-only after construction and can back any number
/// of concurrent sessions.
pub struct Flow {
    id: String,
    name: Option<String>,
    description: Option<String>,
    steps: Vec<Arc<dyn Step>>,
    index: HashMap<String, usize>,
    initial_step_id: Option<String>,
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("id", &self.id)
            .field("steps", &self.step_ids())
            .field("initial_step_id", &self.initial_step_id)
            .finish()
    }
}

impl Flow {
    /// Build a flow from already-constructed steps.
    ///
    /// Fails on duplicate ids, an unknown initial step, or any routing entry
    /// that names a step outside this flow. An empty step list is allowed.
    pub fn new(
        id: impl Into<String>,
        steps: Vec<Arc<dyn Step>>,
        initial_step_id: Option<String>,
    ) -> Result<Self> {
        let id = id.into();
        let mut problems = Vec::new();
        let mut index = HashMap::with_capacity(steps.len());

        for (pos, step) in steps.iter().enumerate() {
            if index.insert(step.id().to_string(), pos).is_some() {
                problems.push(format!("duplicate step id '{}'", step.id()));
            }
        }

        for step in &steps {
            for (label, target) in step.routes().iter() {
                if !index.contains_key(target) {
                    problems.push(validation::dangling_route(step.id(), label, target));
                }
            }
        }

        if let Some(initial) = &initial_step_id {
            if !index.contains_key(initial) {
                problems.push(format!("initialStepId '{}' is not a declared step", initial));
            }
        }

        if !problems.is_empty() {
            return Err(FlowlineError::InvalidFlow { flow: id, problems });
        }

        Ok(Self {
            id,
            name: None,
            description: None,
            steps,
            index,
            initial_step_id,
        })
    }

    /// Build every step of a validated definition. All-or-nothing.
    pub fn from_definition(def: &FlowDefinition, factory: &StepFactory) -> Result<Self> {
        let steps = def
            .steps
            .iter()
            .map(|decl| factory.create(decl))
            .collect::<Result<Vec<_>>>()?;

        let mut flow = Self::new(def.id.clone(), steps, def.initial_step_id.clone())?;
        flow.name = def.name.clone();
        flow.description = def.description.clone();
        Ok(flow)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step ids in declaration order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    pub fn step(&self, id: &str) -> Option<&Arc<dyn Step>> {
        self.index.get(id).map(|&pos| &self.steps[pos])
    }

    /// The explicit initial step, else the first declared step.
    pub fn first_step_id(&self) -> Option<&str> {
        self.initial_step_id
            .as_deref()
            .or_else(|| self.steps.first().map(|s| s.id()))
    }

    /// Execute one step by id, returning its chosen successor.
    pub async fn execute(
        &self,
        step_id: &str,
        ctx: &mut Context,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let step = self
            .step(step_id)
            .ok_or_else(|| FlowlineError::StepNotFound(step_id.to_string()))?;
        step.execute(ctx, cancel).await
    }
}
