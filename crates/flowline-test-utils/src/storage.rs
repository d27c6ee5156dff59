use std::collections::BTreeMap;

use futures::future::BoxFuture;

use flowline_core::error::Result;
use flowline_core::traits::FlowStorage;

/// In-memory flow storage keyed by flow name.
#[derive(Debug, Default, Clone)]
pub struct MemoryFlowStorage {
    flows: BTreeMap<String, String>,
}

impl MemoryFlowStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.flows.insert(name.into(), definition.into());
        self
    }
}

impl FlowStorage for MemoryFlowStorage {
    fn list_flows(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move { Ok(self.flows.keys().cloned().collect()) })
    }

    fn read_flow(&self, name: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let found = self.flows.get(name).cloned();
        Box::pin(async move { Ok(found) })
    }
}
