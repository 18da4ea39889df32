//! The event stream emitted during one `send_message` invocation.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// One step of a conversation turn, in emission order. Exactly one
/// `Result` terminates every invocation, success or error; consumers
/// match exhaustively.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    Init,
    UserMessage { text: String },
    ToolUse { name: String, summary: String },
    ToolResult { name: String, status: ToolStatus },
    AssistantMessage { text: String },
    Error { message: String },
    Result { outcome: Outcome },
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. })
    }
}

pub type AgentEventSender = mpsc::UnboundedSender<AgentEvent>;
pub type AgentEventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

pub fn agent_event_channel() -> (AgentEventSender, AgentEventReceiver) {
    mpsc::unbounded_channel()
}
