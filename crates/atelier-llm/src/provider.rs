//! Provider adapter contract.

use async_trait::async_trait;

use crate::errors::LlmError;
use crate::types::{GenerateRequest, GenerateResponse};

/// Contract between the agent loop and a concrete model provider.
///
/// Must support returning zero or more function-call parts per turn and
/// accepting a tool-role message of function responses in the next
/// request.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;
}
