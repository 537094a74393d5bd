use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Workspace;
use crate::model::{Href, HrefSet};

/// Identifier of a declared operation: `<directory relative to the workspace>/<name>`.
///
/// A root-level operation `x` is `/x`; the same string is used as graph key,
/// in listings and as the request path that addresses the operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(relative_dir: &str, name: &str) -> Self {
        Self(format!("{}/{}", relative_dir.trim_end_matches('/'), name))
    }

    /// Normalise a request-style path (`lib/op`, `/lib/op/`) into an identifier.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim_matches('/');
        Self(format!("/{trimmed}"))
    }

    pub fn from_path(workspace: &Workspace, path: &Path) -> Option<Self> {
        workspace.relative(path).filter(|rel| !rel.is_empty()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Relative directory part, `""` for root-level operations.
    pub fn parent(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default()
    }

    pub fn dir(&self, workspace: &Workspace) -> PathBuf {
        workspace.root().join(self.parent().trim_start_matches('/'))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a descriptor file's `meta` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Content-Type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub kind: OperationKind,
}

/// The closed set of operation shapes; exactly one tag per declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Raw(Value),
    Href(Href),
    Query(EndpointQuery),
    Inference(Inference),
    Imports(Imports),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointQuery {
    pub endpoint: String,
    pub raw: String,
    #[serde(rename = "default-graph-uri", default, skip_serializing_if = "Option::is_none")]
    pub default_graph_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    pub query: QueryTarget,
    pub data: DataTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, alias = "eye:flags", skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<HrefSet>,
    /// Inline query body, written to the temp folder before invoking the reasoner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTarget {
    pub href: HrefSet,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProofTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<HrefSet>,
}

/// Inheritance from another declared operation, with field overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imports {
    pub href: Href,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, alias = "eye:flags", skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataTarget>,
    #[serde(rename = "addData", default, skip_serializing_if = "Option::is_none")]
    pub add_data: Option<DataTarget>,
}

impl Operation {
    pub fn new(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            content_type: None,
            kind,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn tag(&self) -> &'static str {
        match self.kind {
            OperationKind::Raw(_) => "raw",
            OperationKind::Href(_) => "href",
            OperationKind::Query(_) => "query",
            OperationKind::Inference(_) => "inference",
            OperationKind::Imports(_) => "imports",
        }
    }

    /// Every `href` the unexpanded declaration mentions, in declaration order.
    pub fn references(&self) -> Vec<&Href> {
        fn query_refs(query: Option<&QueryTarget>) -> impl Iterator<Item = &Href> {
            query.and_then(|q| q.href.as_ref()).into_iter().flat_map(HrefSet::iter)
        }
        fn data_refs(data: Option<&DataTarget>) -> impl Iterator<Item = &Href> {
            data.into_iter().flat_map(|d| d.href.iter())
        }

        match &self.kind {
            OperationKind::Raw(_) | OperationKind::Query(_) => Vec::new(),
            OperationKind::Href(href) => vec![href],
            OperationKind::Inference(inference) => query_refs(Some(&inference.query))
                .chain(data_refs(Some(&inference.data)))
                .collect(),
            OperationKind::Imports(imports) => std::iter::once(&imports.href)
                .chain(query_refs(imports.query.as_ref()))
                .chain(data_refs(imports.data.as_ref()))
                .chain(data_refs(imports.add_data.as_ref()))
                .collect(),
        }
    }
}
