use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// A reference after resolution: something the reasoner or a client can dereference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    /// An external URL, passed through untouched.
    External(String),
    /// An existing file inside the workspace.
    File(PathBuf),
    /// A declared operation without a backing file, by its externally addressable path.
    Virtual(String),
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::External(url) => f.write_str(url),
            Resolved::File(path) => write!(f, "{}", path.display()),
            Resolved::Virtual(api_path) => f.write_str(api_path),
        }
    }
}

/// An `href` value as it moves through expansion.
///
/// Everything read from a descriptor file starts out as `Raw`; the resolver
/// turns it into `Resolved`, and resolving a `Resolved` value is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Href {
    Raw(String),
    Resolved(Resolved),
}

impl Href {
    pub fn raw(value: impl Into<String>) -> Self {
        Href::Raw(value.into())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Href::Resolved(_))
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Href::Raw(value) => f.write_str(value),
            Href::Resolved(resolved) => resolved.fmt(f),
        }
    }
}

impl From<&str> for Href {
    fn from(value: &str) -> Self {
        Href::Raw(value.to_string())
    }
}

impl From<String> for Href {
    fn from(value: String) -> Self {
        Href::Raw(value)
    }
}

impl From<Resolved> for Href {
    fn from(value: Resolved) -> Self {
        Href::Resolved(value)
    }
}

impl Serialize for Href {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Href {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Href::Raw)
    }
}

/// "A string or a list of strings", the shape every `href` field accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HrefSet {
    One(Href),
    Many(Vec<Href>),
}

impl HrefSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Href> {
        match self {
            HrefSet::One(href) => std::slice::from_ref(href).iter(),
            HrefSet::Many(hrefs) => hrefs.iter(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HrefSet::One(_) => 1,
            HrefSet::Many(hrefs) => hrefs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Href> {
        match self {
            HrefSet::One(href) => vec![href],
            HrefSet::Many(hrefs) => hrefs,
        }
    }
}

impl From<&str> for HrefSet {
    fn from(value: &str) -> Self {
        HrefSet::One(value.into())
    }
}

impl From<Vec<&str>> for HrefSet {
    fn from(values: Vec<&str>) -> Self {
        HrefSet::Many(values.into_iter().map(Href::from).collect())
    }
}
