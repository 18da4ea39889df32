//! Gemini `generateContent` client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::LlmError;
use crate::provider::ModelProvider;
use crate::types::{GenerateRequest, GenerateResponse, Message, ThinkingConfig, ToolDefinition};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body<'a>(&self, request: &'a GenerateRequest) -> WireRequest<'a> {
        WireRequest {
            contents: &request.contents,
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(|text| WireSystemInstruction {
                    parts: vec![WireTextPart { text }],
                }),
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(vec![WireToolGroup {
                    function_declarations: &request.tools,
                }])
            },
            generation_config: request.thinking.map(|thinking| WireGenerationConfig {
                thinking_config: WireThinkingConfig::from(thinking),
            }),
        }
    }
}

#[async_trait]
impl ModelProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingCredential);
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, turns = request.contents.len(), "calling model provider");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: WireResponse = response.json().await?;
        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no candidates".to_string()))?;

        Ok(GenerateResponse { content })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystemInstruction<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolGroup<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize)]
struct WireSystemInstruction<'a> {
    parts: Vec<WireTextPart<'a>>,
}

#[derive(Serialize)]
struct WireTextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolGroup<'a> {
    function_declarations: &'a [ToolDefinition],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    thinking_config: WireThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireThinkingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_level: Option<&'static str>,
    include_thoughts: bool,
}

impl From<ThinkingConfig> for WireThinkingConfig {
    fn from(thinking: ThinkingConfig) -> Self {
        Self {
            thinking_level: thinking.level.map(|level| level.as_str()),
            include_thoughts: thinking.include_thoughts,
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: Option<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Part, ThinkingLevel};
    use serde_json::json;

    fn request_with_tools() -> GenerateRequest {
        GenerateRequest {
            system_instruction: Some("be helpful".to_string()),
            contents: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "readFile".to_string(),
                description: "read".to_string(),
                parameters: json!({ "type": "object" }),
            }],
            thinking: Some(ThinkingConfig::deep()),
        }
    }

    #[test]
    fn body_carries_system_instruction_tools_and_thinking() {
        let client = GeminiClient::new("key");
        let request = request_with_tools();
        let body = serde_json::to_value(client.build_body(&request)).expect("serialize");

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be helpful");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "readFile"
        );
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["thinkingLevel"],
            "high"
        );
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["includeThoughts"],
            true
        );
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn body_omits_empty_sections() {
        let client = GeminiClient::new("key");
        let request = GenerateRequest {
            system_instruction: None,
            contents: vec![Message::user("hi")],
            tools: Vec::new(),
            thinking: None,
        };
        let body = serde_json::to_value(client.build_body(&request)).expect("serialize");

        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn candidate_content_parses_into_parts() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "thinking it over", "thought": true },
                        { "functionCall": { "name": "writeFile", "args": { "path": "a.txt" } },
                          "thoughtSignature": "sig-1" }
                    ]
                }
            }]
        });

        let parsed: WireResponse = serde_json::from_value(payload).expect("deserialize");
        let content = parsed.candidates[0].content.clone().expect("content");
        assert_eq!(content.parts.len(), 2);
        assert!(content.parts[0].is_thought());
        let calls = content.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "writeFile");
        match &content.parts[1] {
            Part::FunctionCall { signature, .. } => {
                assert_eq!(signature.as_deref(), Some("sig-1"));
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_credential_short_circuits_before_any_request() {
        let client = GeminiClient::new("");
        let request = GenerateRequest {
            system_instruction: None,
            contents: vec![Message::user("hi")],
            tools: Vec::new(),
            thinking: None,
        };
        let error = client
            .generate(request)
            .await
            .expect_err("generate should fail without a credential");
        assert!(matches!(error, LlmError::MissingCredential));
    }

    #[test]
    fn low_thinking_level_serializes() {
        let wire = WireThinkingConfig::from(ThinkingConfig {
            level: Some(ThinkingLevel::Low),
            include_thoughts: false,
        });
        let body = serde_json::to_value(wire).expect("serialize");
        assert_eq!(body["thinkingLevel"], "low");
        assert_eq!(body["includeThoughts"], false);
    }
}
