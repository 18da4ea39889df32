use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// A structured request, emitted by the model, to invoke one named
/// capability with arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub content: String,
}

/// One content part of a message.
///
/// The optional `signature` is the provider's opaque continuation token.
/// It must be echoed back verbatim on subsequent requests; the serde
/// round-trip through [`WirePart`] preserves it untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WirePart", into = "WirePart")]
pub enum Part {
    Text {
        text: String,
        thought: bool,
        signature: Option<String>,
    },
    FunctionCall {
        call: FunctionCall,
        signature: Option<String>,
    },
    FunctionResponse {
        response: FunctionResponse,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            thought: false,
            signature: None,
        }
    }

    pub fn function_response(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::FunctionResponse {
            response: FunctionResponse {
                name: name.into(),
                content: content.into(),
            },
        }
    }

    pub fn is_thought(&self) -> bool {
        matches!(self, Self::Text { thought: true, .. })
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Self::FunctionCall { call, .. } => Some(call),
            _ => None,
        }
    }
}

/// Provider wire shape of a part (camelCase keys, optional fields).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    thought: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    #[serde(default)]
    response: Value,
}

impl From<WirePart> for Part {
    fn from(wire: WirePart) -> Self {
        if let Some(call) = wire.function_call {
            return Part::FunctionCall {
                call,
                signature: wire.thought_signature,
            };
        }
        if let Some(response) = wire.function_response {
            let content = match response.response.get("content").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => response.response.to_string(),
            };
            return Part::FunctionResponse {
                response: FunctionResponse {
                    name: response.name,
                    content,
                },
            };
        }
        Part::Text {
            text: wire.text.unwrap_or_default(),
            thought: wire.thought,
            signature: wire.thought_signature,
        }
    }
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text {
                text,
                thought,
                signature,
            } => WirePart {
                text: Some(text),
                thought,
                thought_signature: signature,
                ..WirePart::default()
            },
            Part::FunctionCall { call, signature } => WirePart {
                function_call: Some(call),
                thought_signature: signature,
                ..WirePart::default()
            },
            Part::FunctionResponse { response } => WirePart {
                function_response: Some(WireFunctionResponse {
                    name: response.name,
                    response: serde_json::json!({ "content": response.content }),
                }),
                ..WirePart::default()
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    pub fn tool(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Tool,
            parts,
        }
    }

    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.parts
            .iter()
            .filter_map(Part::as_function_call)
            .cloned()
            .collect()
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts.iter().any(|part| part.as_function_call().is_some())
    }

    /// First text part that is not internal-thought narration.
    pub fn reply_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text {
                text,
                thought: false,
                ..
            } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThinkingLevel {
    Low,
    High,
}

impl ThinkingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThinkingConfig {
    pub level: Option<ThinkingLevel>,
    pub include_thoughts: bool,
}

impl ThinkingConfig {
    /// Deep reasoning with visible thought narration.
    pub fn deep() -> Self {
        Self {
            level: Some(ThinkingLevel::High),
            include_thoughts: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerateResponse {
    pub content: Message,
}

impl GenerateResponse {
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.content.function_calls()
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.content.reply_text()
    }
}
