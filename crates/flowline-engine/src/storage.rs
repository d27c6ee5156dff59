use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::debug;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::FlowStorage;

const FLOW_EXTENSION: &str = "json";

/// Flow definitions stored as `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FsFlowStorage {
    root: PathBuf,
}

impl FsFlowStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\']);
        valid.then(|| self.root.join(format!("{}.{}", name, FLOW_EXTENSION)))
    }
}

impl FlowStorage for FsFlowStorage {
    fn list_flows(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(root = %self.root.display(), "Flows directory does not exist");
                    return Ok(vec![]);
                }
                Err(e) => {
                    return Err(FlowlineError::Storage(format!(
                        "{}: {}",
                        self.root.display(),
                        e
                    )))
                }
            };

            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| FlowlineError::Storage(e.to_string()))?
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(FLOW_EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
            names.sort();
            Ok(names)
        })
    }

    fn read_flow(&self, name: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let path = self.path_for(name);
        Box::pin(async move {
            let Some(path) = path else {
                return Ok(None);
            };
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(FlowlineError::Storage(format!("{}: {}", path.display(), e))),
            }
        })
    }
}
