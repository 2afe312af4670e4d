use thiserror::Error;
use workbench_core::path_validation::PathError;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error(transparent)]
    PathEscape(#[from] PathError),

    #[error("sandbox I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("lost track of process: {0}")]
    ProcessLost(String),
}

impl SandboxError {
    /// Map an I/O error on `path`, keeping "not found" distinguishable.
    pub fn io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
