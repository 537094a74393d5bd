use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{ResolveError, ResolveResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub reasoner: ReasonerConfig,
    pub upstream: UpstreamConfig,
    pub processor: ProcessorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL used to address virtual operations. Derived from the
    /// `Host` header of each request when unset.
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub descriptor_file: String,
    pub tmp_folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    pub program: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub show_files: bool,
    pub show_directories: bool,
    /// HTTP verbs served on the workspace routes.
    pub operations: Vec<String>,
    pub href_content_type: String,
    pub raw_content_type: String,
    pub sparql_query_content_type: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            workspace: WorkspaceConfig::default(),
            reasoner: ReasonerConfig::default(),
            upstream: UpstreamConfig::default(),
            processor: ProcessorConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_url: None,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./workspace"),
            descriptor_file: "index.json".to_string(),
            tmp_folder: "tmp".to_string(),
        }
    }
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            program: "eye".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            show_files: true,
            show_directories: true,
            operations: ["GET", "POST", "PUT", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            href_content_type: "text/turtle".to_string(),
            raw_content_type: "text/turtle".to_string(),
            sparql_query_content_type: "text/turtle".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "HES", e.g. HES__WORKSPACE__ROOT
        config = config.add_source(
            config::Environment::with_prefix("HES")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("processor.operations"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn allows(&self, verb: &str) -> bool {
        self.processor
            .operations
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(verb))
    }
}

/// The sandboxed directory tree every resolution happens in.
///
/// Built once at startup from [`WorkspaceConfig`] and shared read-only by
/// every component; nothing mutates it for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    descriptor_file: String,
    tmp_folder: String,
}

impl Workspace {
    pub fn open(config: &WorkspaceConfig) -> ResolveResult<Self> {
        let root = config
            .root
            .canonicalize()
            .map_err(|e| ResolveError::io(&config.root, e))?;
        if !root.is_dir() {
            return Err(ResolveError::BadRequest {
                path: root,
                reason: "workspace root is not a directory".to_string(),
            });
        }
        Ok(Self {
            root,
            descriptor_file: config.descriptor_file.clone(),
            tmp_folder: config.tmp_folder.clone(),
        })
    }

    /// Open `root` with the default descriptor file name and temp folder.
    pub fn at(root: impl Into<PathBuf>) -> ResolveResult<Self> {
        Self::open(&WorkspaceConfig {
            root: root.into(),
            ..WorkspaceConfig::default()
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(&self.tmp_folder)
    }

    pub fn descriptor_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.descriptor_file)
    }

    pub fn is_descriptor(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name == self.descriptor_file.as_str())
            .unwrap_or(false)
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Workspace-relative form of `path` with a leading `/`; the root itself is `""`.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rest = path.strip_prefix(&self.root).ok()?;
        let mut out = String::new();
        for component in rest.components() {
            if let Component::Normal(part) = component {
                out.push('/');
                out.push_str(&part.to_string_lossy());
            }
        }
        Some(out)
    }
}
