use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::FlowStorage;

use crate::definition::FlowDefinition;
use crate::factory::StepFactory;
use crate::flow::Flow;
use crate::session::Session;
use crate::validation;

/// Loads flows by name and opens sessions on them.
///
/// Every load goes through the same pipeline: read the raw definition,
/// validate it as a whole, then build every step through the factory.
pub struct FlowManager {
    storage: Arc<dyn FlowStorage>,
    factory: StepFactory,
    max_steps: Option<usize>,
}

impl FlowManager {
    pub fn new(storage: Arc<dyn FlowStorage>, factory: StepFactory) -> Self {
        Self {
            storage,
            factory,
            max_steps: None,
        }
    }

    /// Step cap applied to every session this manager creates.
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub async fn list_flows(&self) -> Result<Vec<String>> {
        self.storage.list_flows().await
    }

    /// Read and validate a stored flow without building its steps.
    pub async fn validate(&self, name: &str) -> Result<FlowDefinition> {
        let raw = self.read(name).await?;
        parse_definition(name, &raw)
    }

    /// Load, validate, and build a stored flow.
    pub async fn load_flow(&self, name: &str) -> Result<Arc<Flow>> {
        let def = self.validate(name).await?;
        let flow = Flow::from_definition(&def, &self.factory)?;
        info!(flow = %name, flow_id = %flow.id(), steps = flow.len(), "Flow loaded");
        Ok(Arc::new(flow))
    }

    /// Validate and build a flow from an inline JSON definition.
    pub fn load_from_str(&self, json: &str) -> Result<Flow> {
        let def = parse_definition("<inline>", json)?;
        Flow::from_definition(&def, &self.factory)
    }

    /// Load a stored flow and open a fresh session on it.
    pub async fn create_session(&self, name: &str) -> Result<Session> {
        let flow = self.load_flow(name).await?;
        Ok(Session::new(flow).with_max_steps(self.max_steps))
    }

    async fn read(&self, name: &str) -> Result<String> {
        match self.storage.read_flow(name).await? {
            Some(raw) => Ok(raw),
            None => {
                let available = self.storage.list_flows().await?;
                debug!(flow = %name, available = available.len(), "Flow not found");
                Err(FlowlineError::FlowNotFound {
                    name: name.to_string(),
                    available,
                })
            }
        }
    }
}

fn parse_definition(name: &str, raw: &str) -> Result<FlowDefinition> {
    let value: Value = serde_json::from_str(raw).map_err(|e| FlowlineError::InvalidFlow {
        flow: name.to_string(),
        problems: vec![format!("malformed JSON: {}", e)],
    })?;
    validation::validate(&value)
}
