use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{ResolveError, ResolveResult};

/// The per-directory descriptor file (`index.json` by default).
///
/// Operation entries stay untyped here: they are validated and parsed one by
/// one so a single bad entry reports its own schema errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<Value>>,
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DescriptorFile {
    pub fn read(path: &Path) -> ResolveResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ResolveError::io(path, e))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> ResolveResult<Self> {
        serde_json::from_str(text).map_err(|e| ResolveError::BadDescriptor {
            message: format!("{} is not a valid descriptor file", path.display()),
            errors: vec![e.to_string()],
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &Value> {
        self.meta.iter().flatten()
    }

    /// First entry declared under `name`.
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.entries().find(|entry| entry_name(entry) == Some(name))
    }
}

pub fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}
