use thiserror::Error;

/// Error taxonomy for the environment layer.
///
/// Cloneable so the memoized boot future can hand the same outcome to
/// every concurrent caller.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("sandbox boot failed: {0}")]
    Boot(String),
    #[error("the sandbox is not booted yet")]
    NotBooted,
    #[error("invalid path '{0}': escapes the sandbox root")]
    InvalidPath(String),
    #[error("filesystem error on '{path}': {message}")]
    Io { path: String, message: String },
    #[error("failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },
    #[error("process exited without reporting a status")]
    ProcessLost,
    #[error("dependency installation failed with exit code {0}")]
    InstallFailed(i32),
    #[error("no template registered for project kind '{0}'")]
    UnknownTemplate(String),
}

impl SandboxError {
    pub fn io(path: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }
}
