//! Error taxonomy shared by the devkit library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = DevkitError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DevkitError {
    /// Malformed manifest or run request. Caller-facing, never retried.
    #[error("{0}")]
    Validation(String),

    /// Unknown module or run id.
    #[error("{0}")]
    NotFound(String),

    /// A configured path escapes its base directory. Fatal at startup.
    #[error("Path traversal detected: {}", path.display())]
    PathTraversal { path: PathBuf },

    /// The advisory lock for a state document could not be acquired in time.
    #[error("timed out after {}s waiting for lock {}", timeout.as_secs_f64(), path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    /// A downstream dependency did not answer its health check.
    #[error("{service} unavailable: {message}")]
    DownstreamUnavailable {
        service: &'static str,
        message: String,
    },

    /// Startup credentials match the insecure deny-list. Fatal at startup.
    #[error("Insecure {key} detected. Run scripts/init-dev.sh")]
    InsecureConfiguration { key: &'static str },

    /// A state document exists but does not parse (strict state policy only).
    #[error("corrupt state document {}: {source}", path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize json: {0}")]
    Json(#[from] serde_json::Error),
}

impl DevkitError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Stable, caller-visible name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFoundError",
            Self::PathTraversal { .. } => "PathTraversalError",
            Self::LockTimeout { .. } => "LockTimeoutError",
            Self::DownstreamUnavailable { .. } => "DownstreamUnavailable",
            Self::InsecureConfiguration { .. } => "InsecureConfiguration",
            Self::CorruptState { .. } => "CorruptStateError",
            Self::Config(_) => "ConfigError",
            Self::Io { .. } | Self::Json(_) => "InternalError",
        }
    }
}
