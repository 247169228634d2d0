//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The Docker daemon is unreachable or not installed.
    #[error("docker is not available: {message}")]
    DockerUnavailable { message: String },

    /// The requested ingress port is already bound on the host.
    #[error("port {port} is not available: {message}")]
    PortUnavailable { port: u16, message: String },

    /// The cluster's existence could not be determined. Nothing is created
    /// or modified on an indeterminate query.
    #[error("unable to determine status of cluster '{name}': {message}")]
    ClusterIndeterminate { name: String, message: String },

    /// Cluster creation failed. Never retried internally; the operator
    /// resolves the cause and re-invokes.
    #[error("cluster creation: cluster '{name}' could not be created: {message}")]
    ClusterCreate { name: String, message: String },

    /// The external installer failed.
    #[error("install failed: {message}")]
    Install { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },

    /// The operation was cancelled before it completed.
    #[error("cancelled: {message}")]
    Cancelled { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    pub fn docker_unavailable(message: impl Into<String>) -> Self {
        Error::DockerUnavailable {
            message: message.into(),
        }
    }

    pub fn cluster_indeterminate(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ClusterIndeterminate {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn cluster_create(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ClusterCreate {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn install(message: impl Into<String>) -> Self {
        Error::Install {
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled {
            message: message.into(),
        }
    }

    /// Whether this error is the cancellation kind.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}
