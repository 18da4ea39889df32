//! Conversation/environment state store.
//!
//! The single owner of message history, the environment handle, the
//! status string, the working-task indicator, and the bounded log
//! buffer. The engine and the orchestrator mutate state only through
//! these accessors; the lock is never held across an await.

use atelier_llm::Message;
use atelier_sandbox::{ProjectKind, Sandbox, StatusSink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Entries retained in the environment log, FIFO.
pub const LOG_CAPACITY: usize = 100;

/// The tool currently executing, for progress UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkingTask {
    pub name: String,
    pub summary: String,
}

/// One user submission. The id makes re-delivery detectable without
/// comparing message text, so two identical consecutive inputs stay
/// distinct while a re-entrant delivery of the same input is dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInput {
    pub id: u64,
    pub text: String,
}

struct StoreInner {
    messages: Vec<Message>,
    status: String,
    working_task: Option<WorkingTask>,
    preview_url: Option<String>,
    logs: VecDeque<String>,
    sandbox: Option<Arc<dyn Sandbox>>,
    project: Option<ProjectKind>,
    api_key: Option<String>,
    input_counter: u64,
    last_applied_input: Option<u64>,
}

pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                messages: vec![Message::model(greeting)],
                status: "Initializing systems...".to_string(),
                working_task: None,
                preview_url: None,
                logs: VecDeque::new(),
                sandbox: None,
                project: None,
                api_key: None,
                input_counter: 0,
                last_applied_input: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("state store mutex poisoned")
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn push_message(&self, message: Message) {
        self.lock().messages.push(message);
    }

    /// Reset history to a single greeting. Input ids stay monotonic.
    pub fn clear_history(&self, greeting: impl Into<String>) {
        let mut inner = self.lock();
        inner.messages = vec![Message::model(greeting)];
        inner.last_applied_input = None;
    }

    /// Allocate the next user input.
    pub fn next_input(&self, text: impl Into<String>) -> UserInput {
        let mut inner = self.lock();
        inner.input_counter += 1;
        UserInput {
            id: inner.input_counter,
            text: text.into(),
        }
    }

    pub fn last_applied_input(&self) -> Option<u64> {
        self.lock().last_applied_input
    }

    pub fn mark_input_applied(&self, id: u64) {
        self.lock().last_applied_input = Some(id);
    }

    pub fn status(&self) -> String {
        self.lock().status.clone()
    }

    pub fn working_task(&self) -> Option<WorkingTask> {
        self.lock().working_task.clone()
    }

    pub fn set_working_task(&self, task: Option<WorkingTask>) {
        self.lock().working_task = task;
    }

    pub fn preview_url(&self) -> Option<String> {
        self.lock().preview_url.clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.lock().logs.iter().cloned().collect()
    }

    pub fn sandbox(&self) -> Option<Arc<dyn Sandbox>> {
        self.lock().sandbox.clone()
    }

    pub fn set_sandbox(&self, sandbox: Arc<dyn Sandbox>) {
        self.lock().sandbox = Some(sandbox);
    }

    pub fn project(&self) -> Option<ProjectKind> {
        self.lock().project
    }

    pub fn set_project(&self, kind: ProjectKind) {
        self.lock().project = Some(kind);
    }

    pub fn api_key(&self) -> Option<String> {
        self.lock().api_key.clone()
    }

    pub fn set_api_key(&self, key: impl Into<String>) {
        self.lock().api_key = Some(key.into());
    }
}

impl StatusSink for StateStore {
    fn set_status(&self, status: &str) {
        self.lock().status = status.to_string();
    }

    fn append_log(&self, line: &str) {
        let mut inner = self.lock();
        if inner.logs.len() == LOG_CAPACITY {
            inner.logs.pop_front();
        }
        inner.logs.push_back(line.to_string());
    }

    fn set_preview_url(&self, url: &str) {
        self.lock().preview_url = Some(url.to_string());
    }
}
