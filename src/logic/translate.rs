use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Workspace;
use crate::logic::sandbox::normalize;

/// Maps workspace paths to the identifiers clients use to address them, and back.
pub trait PathTranslator: Send + Sync {
    fn to_api_path(&self, target: &Path) -> String;

    /// Inverse of [`to_api_path`](Self::to_api_path); `None` when the value does
    /// not address this workspace.
    fn to_local_path(&self, api_path: &str) -> Option<PathBuf>;
}

/// Workspace-relative identifiers (`/lib/op`), used when no request context exists.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    workspace: Arc<Workspace>,
}

impl WorkspacePaths {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

impl PathTranslator for WorkspacePaths {
    fn to_api_path(&self, target: &Path) -> String {
        self.workspace
            .relative(target)
            .unwrap_or_else(|| target.display().to_string())
    }

    fn to_local_path(&self, api_path: &str) -> Option<PathBuf> {
        local_under(&self.workspace, api_path)
    }
}

/// Absolute URLs below a public base, e.g. `http://host:3000/lib/op`.
#[derive(Debug, Clone)]
pub struct PublicPaths {
    workspace: Arc<Workspace>,
    base: String,
}

impl PublicPaths {
    pub fn new(workspace: Arc<Workspace>, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { workspace, base }
    }
}

impl PathTranslator for PublicPaths {
    fn to_api_path(&self, target: &Path) -> String {
        match self.workspace.relative(target) {
            Some(rel) => format!("{}{}", self.base, rel),
            None => target.display().to_string(),
        }
    }

    fn to_local_path(&self, api_path: &str) -> Option<PathBuf> {
        let rest = api_path.strip_prefix(&self.base)?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        local_under(&self.workspace, rest)
    }
}

fn local_under(workspace: &Workspace, rel: &str) -> Option<PathBuf> {
    if rel.contains("://") {
        return None;
    }
    let path = normalize(&workspace.root().join(rel.trim_start_matches('/')));
    workspace.contains(&path).then_some(path)
}
