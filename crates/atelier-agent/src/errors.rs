use atelier_llm::LlmError;
use atelier_sandbox::SandboxError;
use thiserror::Error;

/// Top-level error type for the atelier-agent crate.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("stopped after {limit} tool rounds without a final reply")]
    ToolRoundsExhausted { limit: usize },
}
