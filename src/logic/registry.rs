use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde_json::Value;
use walkdir::WalkDir;

use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};
use crate::logic::validate::{parse_operation, SchemaValidator};
use crate::model::{DescriptorFile, Operation};

/// Looks up operations declared in the descriptor files of the workspace.
#[derive(Debug, Clone)]
pub struct Registry {
    workspace: Arc<Workspace>,
}

impl Registry {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    /// Raw declaration of the operation addressed by `target`: the descriptor
    /// file of its parent directory, entry named after the final segment.
    pub fn find(&self, target: &Path) -> ResolveResult<Option<Value>> {
        let (Some(dir), Some(name)) = (
            target.parent(),
            target.file_name().and_then(|name| name.to_str()),
        ) else {
            return Ok(None);
        };

        let descriptor = self.workspace.descriptor_path(dir);
        if !descriptor.is_file() {
            return Ok(None);
        }

        let file = DescriptorFile::read(&descriptor)?;
        let found = file.find(name).cloned();
        if found.is_some() {
            debug!("Found operation '{}' in {}", name, descriptor.display());
        }
        Ok(found)
    }

    pub fn is_declared(&self, target: &Path) -> ResolveResult<bool> {
        Ok(self.find(target)?.is_some())
    }

    /// Like [`find`](Self::find), but validated and typed.
    pub fn find_operation(
        &self,
        validator: &dyn SchemaValidator,
        target: &Path,
    ) -> ResolveResult<Option<Operation>> {
        self.find(target)?
            .map(|raw| parse_operation(validator, &raw))
            .transpose()
    }

    /// Every descriptor file below the root, in stable lexical order.
    pub fn descriptor_files(&self) -> ResolveResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in WalkDir::new(self.workspace.root())
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry
                .map_err(|e| ResolveError::Internal(format!("workspace scan failed: {e}")))?;
            if entry.file_type().is_file() && self.workspace.is_descriptor(entry.path()) {
                found.push(entry.into_path());
            }
        }
        Ok(found)
    }
}
