use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HOST, request::Parts, HeaderMap},
};
use percent_encoding::percent_decode_str;

use crate::api::handlers::SharedState;
use crate::api::render::{error_response, ApiError};
use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};
use crate::logic::{PathTranslator, PublicPaths, Sandbox, WorkspacePaths};
use crate::model::OperationId;

/// Where a request points: the public base URL and the decoded workspace path.
///
/// `path` is `/a/b` style with no trailing slash; the workspace root is `""`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    base: String,
    path: String,
}

impl RequestContext {
    pub fn new(base: impl Into<String>, path: &str) -> Self {
        let trimmed = path.trim_matches('/');
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            path: if trimmed.is_empty() {
                String::new()
            } else {
                format!("/{trimmed}")
            },
        }
    }

    pub fn local_href(&self) -> &str {
        &self.path
    }

    /// Public URL of the addressed resource.
    pub fn current_path(&self) -> String {
        format!("{}{}", self.base, self.path)
    }

    pub fn operation_id(&self) -> Option<OperationId> {
        (!self.path.is_empty()).then(|| OperationId::parse(&self.path))
    }

    pub fn local_path(&self, workspace: &Arc<Workspace>) -> ResolveResult<PathBuf> {
        Sandbox::new(workspace.clone()).resolve(workspace.root(), &self.path)
    }

    pub fn public_paths(&self, workspace: &Arc<Workspace>) -> PublicPaths {
        PublicPaths::new(workspace.clone(), self.base.clone())
    }

    pub fn resource_url(&self, workspace: &Arc<Workspace>, path: &Path) -> String {
        self.public_paths(workspace).to_api_path(path)
    }

    /// Map an identifier sent by a client (public URL or `/a/b` path) into the workspace.
    pub fn to_local_path(&self, workspace: &Arc<Workspace>, value: &str) -> Option<PathBuf> {
        if value.starts_with(&self.base) {
            self.public_paths(workspace).to_local_path(value)
        } else if value.starts_with('/') {
            WorkspacePaths::new(workspace.clone()).to_local_path(value)
        } else {
            None
        }
    }
}

#[async_trait]
impl FromRequestParts<SharedState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let base = match &state.config.server.public_url {
            Some(url) => url.clone(),
            None => {
                let host = extract_host(&parts.headers)
                    .or_else(|| parts.uri.authority().map(|a| a.to_string()))
                    .unwrap_or_else(|| state.config.server_address());
                format!("http://{host}")
            }
        };

        let raw = parts.uri.path();
        let path = percent_decode_str(raw).decode_utf8().map_err(|_| {
            error_response(ResolveError::BadRequest {
                path: PathBuf::from(raw),
                reason: "path is not valid UTF-8".to_string(),
            })
        })?;

        Ok(RequestContext::new(base, &path))
    }
}

fn extract_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_workspace::TestWorkspace;

    #[test]
    fn paths_are_normalised() {
        let ctx = RequestContext::new("http://localhost:3000/", "/lib/op/");
        assert_eq!(ctx.local_href(), "/lib/op");
        assert_eq!(ctx.current_path(), "http://localhost:3000/lib/op");
        assert_eq!(ctx.operation_id().unwrap().as_str(), "/lib/op");

        let root = RequestContext::new("http://localhost:3000", "/");
        assert_eq!(root.local_href(), "");
        assert!(root.operation_id().is_none());
    }

    #[test]
    fn local_paths_stay_in_the_workspace() {
        let ws = TestWorkspace::new();
        let ctx = RequestContext::new("http://h", "/lib/op");
        assert_eq!(ctx.local_path(&ws.workspace).unwrap(), ws.path("lib/op"));

        let root = RequestContext::new("http://h", "");
        assert_eq!(root.local_path(&ws.workspace).unwrap(), ws.root());

        let escape = RequestContext::new("http://h", "/../etc");
        assert_eq!(escape.local_path(&ws.workspace).unwrap_err().kind(), "Forbidden");
    }

    #[test]
    fn client_identifiers_map_into_the_workspace() {
        let ws = TestWorkspace::new();
        let ctx = RequestContext::new("http://h:1", "/app/new");

        assert_eq!(
            ctx.to_local_path(&ws.workspace, "http://h:1/lib/op"),
            Some(ws.path("lib/op"))
        );
        assert_eq!(
            ctx.to_local_path(&ws.workspace, "/lib/op"),
            Some(ws.path("lib/op"))
        );
        assert_eq!(ctx.to_local_path(&ws.workspace, "http://other/lib/op"), None);
        assert_eq!(
            ctx.resource_url(&ws.workspace, &ws.path("data/a.n3")),
            "http://h:1/data/a.n3"
        );
    }
}
