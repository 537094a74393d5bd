use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};

/// Turns reference strings into canonical paths that never leave the workspace.
#[derive(Debug, Clone)]
pub struct Sandbox {
    workspace: Arc<Workspace>,
}

impl Sandbox {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    /// Resolve `value` against `base_dir`.
    ///
    /// Values already carrying the workspace root are kept, other absolute
    /// values are rooted at the workspace, relative ones at `base_dir`. The
    /// lexically normalised result must stay under the root.
    pub fn resolve(&self, base_dir: &Path, value: &str) -> ResolveResult<PathBuf> {
        let root = self.workspace.root();
        let candidate = Path::new(value);

        let joined = if candidate.starts_with(root) {
            candidate.to_path_buf()
        } else if candidate.has_root() {
            root.join(value.trim_start_matches('/'))
        } else {
            base_dir.join(candidate)
        };

        let resolved = normalize(&joined);
        if !self.workspace.contains(&resolved) {
            return Err(ResolveError::Forbidden { path: resolved });
        }
        Ok(resolved)
    }
}

/// Lexical normalisation: drops `.` and folds `..` without touching the file system.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
