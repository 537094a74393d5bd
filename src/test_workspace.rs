//! Throwaway workspaces for unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Workspace;
use crate::logic::{
    Expander, GraphBuilder, JsonSchemaValidator, PathTranslator, Registry, Resolver, Sandbox,
    SchemaValidator, WorkspacePaths,
};

pub struct TestWorkspace {
    _dir: TempDir,
    pub workspace: Arc<Workspace>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let workspace = Workspace::at(dir.path()).expect("workspace");
        Self {
            _dir: dir,
            workspace: Arc::new(workspace),
        }
    }

    pub fn root(&self) -> &Path {
        self.workspace.root()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel.trim_start_matches('/'))
    }

    pub fn dir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn file(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, body).expect("write file");
        path
    }

    /// Write `{"meta": entries}` as the descriptor file of `rel_dir`.
    pub fn descriptor(&self, rel_dir: &str, entries: Value) -> PathBuf {
        let dir = self.dir(rel_dir);
        let body = serde_json::to_string_pretty(&json!({ "meta": entries })).expect("json");
        let path = self.workspace.descriptor_path(&dir);
        fs::write(&path, body).expect("write descriptor");
        path
    }

    pub fn validator(&self) -> Arc<dyn SchemaValidator> {
        Arc::new(JsonSchemaValidator::new().expect("schemas compile"))
    }

    pub fn translator(&self) -> Arc<dyn PathTranslator> {
        Arc::new(WorkspacePaths::new(self.workspace.clone()))
    }

    pub fn sandbox(&self) -> Sandbox {
        Sandbox::new(self.workspace.clone())
    }

    pub fn registry(&self) -> Registry {
        Registry::new(self.workspace.clone())
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.workspace.clone(), self.translator())
    }

    pub fn expander(&self) -> Expander {
        Expander::new(self.workspace.clone(), self.validator(), self.translator())
    }

    pub fn graph_builder(&self) -> GraphBuilder {
        GraphBuilder::new(self.workspace.clone(), self.validator(), self.translator())
    }
}
