use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use log::debug;

use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};
use crate::logic::registry::Registry;
use crate::logic::sandbox::Sandbox;
use crate::logic::translate::PathTranslator;
use crate::model::{Href, Resolved};

/// `true` for absolute web URLs (`http`/`https` with a host).
pub fn is_external(value: &str) -> bool {
    url::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

/// Turns raw hrefs into dereferenceable resources.
#[derive(Clone)]
pub struct Resolver {
    workspace: Arc<Workspace>,
    sandbox: Sandbox,
    registry: Registry,
    translator: Arc<dyn PathTranslator>,
}

impl Resolver {
    pub fn new(workspace: Arc<Workspace>, translator: Arc<dyn PathTranslator>) -> Self {
        Self {
            sandbox: Sandbox::new(workspace.clone()),
            registry: Registry::new(workspace.clone()),
            workspace,
            translator,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Resolve an href to exactly one resource: an external URL, an existing
    /// workspace path, or the public identifier of a declared operation.
    pub fn to_single(&self, base_dir: &Path, href: &Href) -> ResolveResult<Resolved> {
        let value = match href {
            Href::Resolved(resolved) => return Ok(resolved.clone()),
            Href::Raw(value) => value,
        };

        if is_external(value) {
            return Ok(Resolved::External(value.clone()));
        }

        let target = self.sandbox.resolve(base_dir, value)?;
        if target.exists() {
            return Ok(Resolved::File(target));
        }

        if self.registry.is_declared(&target)? {
            return Ok(Resolved::Virtual(self.translator.to_api_path(&target)));
        }

        Err(ResolveError::NotFound {
            href: value.clone(),
            searched: base_dir.to_path_buf(),
        })
    }

    /// Resolve an href to one or more resources. Glob patterns expand to the
    /// matching files (descriptor files excluded) in lexical order.
    pub fn to_many(&self, base_dir: &Path, href: &Href) -> ResolveResult<Vec<Resolved>> {
        let value = match href {
            Href::Resolved(resolved) => return Ok(vec![resolved.clone()]),
            Href::Raw(value) => value,
        };

        if is_external(value) {
            return Ok(vec![Resolved::External(value.clone())]);
        }

        let target = self.sandbox.resolve(base_dir, value)?;
        let matches = self.glob_files(&target)?;
        if !matches.is_empty() {
            debug!("'{}' matched {} file(s)", value, matches.len());
            return Ok(matches.into_iter().map(Resolved::File).collect());
        }

        if self.registry.is_declared(&target)? {
            return Ok(vec![Resolved::Virtual(self.translator.to_api_path(&target))]);
        }

        if !target.exists() {
            return Err(ResolveError::NotFound {
                href: value.clone(),
                searched: base_dir.to_path_buf(),
            });
        }

        if target.is_dir() {
            return Err(ResolveError::BadRequest {
                path: target,
                reason: "is a directory".to_string(),
            });
        }

        Err(ResolveError::Internal(format!(
            "unhandled reference {}",
            target.display()
        )))
    }

    fn glob_files(&self, target: &Path) -> ResolveResult<Vec<PathBuf>> {
        let root = self.workspace.root();
        let rest = target
            .strip_prefix(root)
            .map_err(|_| ResolveError::Forbidden {
                path: target.to_path_buf(),
            })?;
        let pattern = format!(
            "{}/{}",
            Pattern::escape(&root.to_string_lossy()),
            rest.to_string_lossy()
        );

        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let paths = glob::glob_with(&pattern, options).map_err(|e| {
            ResolveError::bad_descriptor(format!("invalid pattern '{}': {}", rest.display(), e))
        })?;

        let mut files = Vec::new();
        for path in paths.flatten() {
            if path.is_file() && !self.workspace.is_descriptor(&path) && self.workspace.contains(&path)
            {
                files.push(path);
            }
        }
        Ok(files)
    }
}
