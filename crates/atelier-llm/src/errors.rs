use thiserror::Error;

/// Error taxonomy for the model-provider layer.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing API credential")]
    MissingCredential,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// True for HTTP 400-class provider rejections. The agent loop uses
    /// this to surface the history-continuity hint: a 400 on a tool-call
    /// follow-up almost always means the model's prior turn (with its
    /// continuation signatures) was not echoed back intact.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Api { status, .. } => (400..500).contains(status),
            Self::Http(error) => error
                .status()
                .is_some_and(|status| status.is_client_error()),
            _ => false,
        }
    }
}
