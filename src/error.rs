use std::path::PathBuf;
use thiserror::Error;

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Every failure the resolution core can report.
///
/// The variants carry enough detail for the HTTP layer to pick a status code
/// and render a diagnostic body; see `api::render::status_for`.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid descriptor: {message}")]
    BadDescriptor { message: String, errors: Vec<String> },

    #[error("403 [{}] is outside the workspace", .path.display())]
    Forbidden { path: PathBuf },

    #[error("404 [{href}] not found from {}", .searched.display())]
    NotFound { href: String, searched: PathBuf },

    #[error("400 [{}] {reason}", .path.display())]
    BadRequest { path: PathBuf, reason: String },

    #[error("500 {0}")]
    Internal(String),

    #[error("dependency cycle between operations: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("cannot handle multiple queries ({0} given)")]
    MultipleQueriesNotSupported(usize),

    #[error("href for proof not specified")]
    ProofHrefMissing,

    #[error("reasoner failed: {message}")]
    ProcessFailure { message: String, stderr: String },

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("i/o failure on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    pub fn bad_descriptor(message: impl Into<String>) -> Self {
        ResolveError::BadDescriptor {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResolveError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::BadDescriptor { .. } => "BadDescriptor",
            ResolveError::Forbidden { .. } => "Forbidden",
            ResolveError::NotFound { .. } => "NotFound",
            ResolveError::BadRequest { .. } => "BadRequest",
            ResolveError::Internal(_) => "Internal",
            ResolveError::CycleDetected { .. } => "CycleDetected",
            ResolveError::MultipleQueriesNotSupported(_) => "MultipleQueriesNotSupported",
            ResolveError::ProofHrefMissing => "ProofHrefMissing",
            ResolveError::ProcessFailure { .. } => "ProcessFailure",
            ResolveError::Upstream(_) => "Upstream",
            ResolveError::Io { .. } => "Io",
        }
    }

    /// Structured diagnostics attached to the error, if any.
    pub fn details(&self) -> Vec<String> {
        match self {
            ResolveError::BadDescriptor { errors, .. } => errors.clone(),
            ResolveError::CycleDetected { cycle } => cycle.clone(),
            ResolveError::ProcessFailure { stderr, .. } if !stderr.is_empty() => {
                stderr.lines().map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizer_errors_render_contract_messages() {
        assert!(ResolveError::MultipleQueriesNotSupported(2)
            .to_string()
            .contains("cannot handle multiple queries"));
        assert_eq!(
            ResolveError::ProofHrefMissing.to_string(),
            "href for proof not specified"
        );
    }

    #[test]
    fn cycle_lists_participants_in_order() {
        let err = ResolveError::CycleDetected {
            cycle: vec!["/a".into(), "/b".into(), "/a".into()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle between operations: /a -> /b -> /a"
        );
        assert_eq!(err.kind(), "CycleDetected");
        assert_eq!(err.details().len(), 3);
    }
}
