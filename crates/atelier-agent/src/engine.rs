//! The agent conversation loop.
//!
//! One `send_message` call drives the model to completion through zero
//! or more tool rounds and emits the full event stream for that
//! invocation. The loop runs in its own task: a consumer that stops
//! draining the channel abandons the stream, but already-started side
//! effects run to completion and no lock is left held.

use atelier_llm::{GeminiClient, GenerateRequest, Message, ModelProvider, Part, ThinkingConfig};
use atelier_sandbox::StatusSink;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::errors::AgentError;
use crate::events::{
    AgentEvent, AgentEventReceiver, AgentEventSender, Outcome, ToolStatus, agent_event_channel,
};
use crate::instructions::system_instruction;
use crate::state::{StateStore, UserInput, WorkingTask};
use crate::tools::{declarations, execute_tool, is_error_output, working_task_summary};

const PLACEHOLDER_REPLY: &str = "Action completed without a verbal reply.";
const THINKING_STATUS: &str = "The agent is thinking...";
const READY_STATUS: &str = "The agent is awaiting instructions.";
const ERROR_STATUS: &str = "Error: the agent could not finish the request.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    /// Tool rounds allowed per input before the loop gives up.
    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 24,
        }
    }
}

/// Builds a provider for the credential active at call time.
pub type ProviderFactory = Arc<dyn Fn(&str) -> Arc<dyn ModelProvider> + Send + Sync>;

pub struct Agent {
    store: Arc<StateStore>,
    providers: ProviderFactory,
    config: AgentConfig,
}

impl Agent {
    pub fn new(store: Arc<StateStore>, providers: ProviderFactory) -> Self {
        Self {
            store,
            providers,
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Agent backed by the Gemini client, the default outside of tests.
    pub fn gemini(store: Arc<StateStore>, model: Option<String>) -> Self {
        let factory: ProviderFactory = Arc::new(move |api_key: &str| {
            let mut client = GeminiClient::new(api_key);
            if let Some(model) = &model {
                client = client.with_model(model.clone());
            }
            Arc::new(client) as Arc<dyn ModelProvider>
        });
        Self::new(store, factory)
    }

    pub fn store(&self) -> Arc<StateStore> {
        self.store.clone()
    }

    /// Start one conversation turn. Events arrive on the returned
    /// channel in emission order; exactly one `Result` event terminates
    /// the stream. Dropping the receiver abandons the stream without
    /// interrupting work already in flight.
    pub fn send_message(&self, input: UserInput) -> AgentEventReceiver {
        let (tx, rx) = agent_event_channel();
        let store = self.store.clone();
        let providers = self.providers.clone();
        let config = self.config.clone();
        let span = info_span!("conversation", run = %Uuid::new_v4(), input = input.id);
        tokio::spawn(
            async move {
                run_conversation(store, providers, config, input, tx).await;
            }
            .instrument(span),
        );
        rx
    }
}

async fn run_conversation(
    store: Arc<StateStore>,
    providers: ProviderFactory,
    config: AgentConfig,
    input: UserInput,
    tx: AgentEventSender,
) {
    let _ = tx.send(AgentEvent::Init);

    let result = drive(&store, &providers, &config, &input, &tx).await;
    store.set_working_task(None);

    match result {
        Ok(reply) => {
            store.set_status(READY_STATUS);
            let _ = tx.send(AgentEvent::AssistantMessage { text: reply });
            let _ = tx.send(AgentEvent::Result {
                outcome: Outcome::Success,
            });
        }
        Err(error) => {
            warn!(%error, "conversation turn failed");
            store.set_status(ERROR_STATUS);
            let _ = tx.send(AgentEvent::Error {
                message: error.to_string(),
            });
            let apology = apology_for(&error);
            store.push_message(Message::model(apology.clone()));
            let _ = tx.send(AgentEvent::AssistantMessage { text: apology });
            let _ = tx.send(AgentEvent::Result {
                outcome: Outcome::Error,
            });
        }
    }
}

async fn drive(
    store: &StateStore,
    providers: &ProviderFactory,
    config: &AgentConfig,
    input: &UserInput,
    tx: &AgentEventSender,
) -> Result<String, AgentError> {
    let api_key = store
        .api_key()
        .ok_or_else(|| AgentError::Configuration("no API credential is set".to_string()))?;
    let kind = store
        .project()
        .ok_or_else(|| AgentError::Configuration("no active project type".to_string()))?;

    // Re-entrant delivery of an input already folded into history is a
    // no-op; the turn continues from the existing history.
    if store.last_applied_input() != Some(input.id) {
        store.push_message(Message::user(input.text.clone()));
        store.mark_input_applied(input.id);
        let _ = tx.send(AgentEvent::UserMessage {
            text: input.text.clone(),
        });
    }

    let provider = (providers.as_ref())(&api_key);
    let instruction = system_instruction(kind);
    let tools = declarations();

    store.set_status(THINKING_STATUS);
    let mut response = provider
        .generate(build_request(store, &instruction, &tools))
        .await?;

    let mut rounds = 0usize;
    loop {
        let calls = response.function_calls();
        if calls.is_empty() {
            break;
        }
        if rounds >= config.max_tool_rounds {
            return Err(AgentError::ToolRoundsExhausted {
                limit: config.max_tool_rounds,
            });
        }
        rounds += 1;
        debug!(round = rounds, calls = calls.len(), "executing tool round");

        // The model's full content, thought parts and continuation
        // signatures included, must land in history before the tool
        // results; the next request fails validation otherwise.
        store.push_message(response.content.clone());

        let sandbox = store.sandbox();
        let mut result_parts = Vec::with_capacity(calls.len());
        for call in &calls {
            let summary = working_task_summary(call);
            let _ = tx.send(AgentEvent::ToolUse {
                name: call.name.clone(),
                summary: summary.clone(),
            });
            store.set_working_task(Some(WorkingTask {
                name: call.name.clone(),
                summary,
            }));
            store.set_status(&format!("Executing {}...", call.name));

            // Strictly sequential: a later call in the same turn may
            // depend on a file an earlier call just wrote.
            let output = execute_tool(call, sandbox.clone()).await;
            let status = if is_error_output(&output) {
                ToolStatus::Error
            } else {
                ToolStatus::Success
            };
            let _ = tx.send(AgentEvent::ToolResult {
                name: call.name.clone(),
                status,
            });
            store.set_working_task(None);
            result_parts.push(Part::function_response(call.name.clone(), output));
        }
        store.push_message(Message::tool(result_parts));

        store.set_status(THINKING_STATUS);
        response = provider
            .generate(build_request(store, &instruction, &tools))
            .await?;
    }

    let reply = response
        .reply_text()
        .map(str::to_string)
        .unwrap_or_else(|| PLACEHOLDER_REPLY.to_string());
    store.push_message(response.content);
    Ok(reply)
}

fn build_request(store: &StateStore, instruction: &str, tools: &[atelier_llm::ToolDefinition]) -> GenerateRequest {
    GenerateRequest {
        system_instruction: Some(instruction.to_string()),
        contents: store.messages(),
        tools: tools.to_vec(),
        thinking: Some(ThinkingConfig::deep()),
    }
}

fn apology_for(error: &AgentError) -> String {
    if let AgentError::Model(model_error) = error {
        if model_error.is_client_error() {
            return "The provider rejected the request (HTTP 4xx). This usually means the \
reasoning continuity was broken: my previous turn, including its continuation \
signatures, must be echoed back unchanged. Please try again."
                .to_string();
        }
    }
    "I apologize, but I encountered an error while working with my tools and could not \
finish this request."
        .to_string()
}
