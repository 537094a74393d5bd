use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use sha2::{Digest, Sha256};

use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};
use crate::model::{HrefSet, Inference, Resolved};
use crate::store::descriptor_store::write_atomic;

/// Content-addressed files under the workspace temp folder.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    workspace: Arc<Workspace>,
}

impl ScratchSpace {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn file_name(body: &str) -> String {
        format!("{}.n3", hex::encode(Sha256::digest(body.as_bytes())))
    }

    /// Path of a file holding `body`, written only if not already present.
    pub async fn materialize(&self, body: &str) -> ResolveResult<PathBuf> {
        let dir = self.workspace.tmp_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ResolveError::io(&dir, e))?;

        let path = dir.join(Self::file_name(body));
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| ResolveError::io(&path, e))?;
        if !exists {
            write_atomic(&path, body.as_bytes()).await?;
            debug!("Wrote scratch file {}", path.display());
        }
        Ok(path)
    }

    /// Swap an inline query body for the file that holds it. An inline body
    /// takes precedence over a declared query href.
    pub async fn prepare(&self, mut inference: Inference) -> ResolveResult<Inference> {
        if let Some(body) = inference.query.raw.take() {
            let path = self.materialize(&body).await?;
            inference.query.href = Some(HrefSet::One(Resolved::File(path).into()));
        }
        Ok(inference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataTarget, QueryTarget};
    use crate::test_workspace::TestWorkspace;

    #[tokio::test]
    async fn same_body_same_file() {
        let ws = TestWorkspace::new();
        let scratch = ScratchSpace::new(ws.workspace.clone());

        let first = scratch.materialize("{ ?s ?p ?o } => { ?s ?p ?o }.").await.unwrap();
        let second = scratch.materialize("{ ?s ?p ?o } => { ?s ?p ?o }.").await.unwrap();
        let other = scratch.materialize("{ ?a ?b ?c } => { ?a ?b ?c }.").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.starts_with(ws.workspace.tmp_dir()));
        assert_eq!(first.extension().unwrap(), "n3");
        assert_eq!(
            std::fs::read_to_string(&first).unwrap(),
            "{ ?s ?p ?o } => { ?s ?p ?o }."
        );
    }

    #[tokio::test]
    async fn inline_query_replaces_href() {
        let ws = TestWorkspace::new();
        let scratch = ScratchSpace::new(ws.workspace.clone());
        let inference = Inference {
            query: QueryTarget {
                href: Some("ignored.n3".into()),
                raw: Some("{ ?s ?p ?o } => { ?s ?p ?o }.".to_string()),
            },
            data: DataTarget {
                href: "data.n3".into(),
            },
            proof: None,
            options: None,
            flags: None,
        };

        let prepared = scratch.prepare(inference).await.unwrap();
        assert!(prepared.query.raw.is_none());
        let href = prepared.query.href.unwrap();
        assert!(href.iter().all(|h| h.to_string().ends_with(".n3")));
        assert!(!href.iter().any(|h| h.to_string() == "ignored.n3"));
    }
}
