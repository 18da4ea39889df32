//! Sandbox provider contract.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::errors::SandboxError;
use crate::tree::FileTree;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Emitted when a spawned process binds a network port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyEvent {
    pub port: u16,
    pub url: String,
}

/// Handle to a spawned sandbox process: a merged line-oriented output
/// channel plus an awaitable exit code.
///
/// Dropping the handle does not stop the process; an already-started
/// command runs to completion.
#[derive(Debug)]
pub struct SandboxProcess {
    output: mpsc::UnboundedReceiver<String>,
    exit: oneshot::Receiver<i32>,
}

impl SandboxProcess {
    pub fn from_parts(
        output: mpsc::UnboundedReceiver<String>,
        exit: oneshot::Receiver<i32>,
    ) -> Self {
        Self { output, exit }
    }

    /// Next output line; `None` once the process has closed both streams.
    pub async fn next_line(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// Await process exit. Call after draining the output channel.
    pub async fn wait(self) -> Result<i32, SandboxError> {
        self.exit.await.map_err(|_| SandboxError::ProcessLost)
    }
}

/// The isolated, disposable execution context: a rooted filesystem, a
/// process spawner, and the ready signal for long-lived servers.
#[async_trait]
pub trait Sandbox: Send + Sync + std::fmt::Debug {
    /// Replace the sandbox filesystem contents with `tree`.
    async fn mount(&self, tree: &FileTree) -> Result<(), SandboxError>;

    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError>;

    async fn spawn(&self, program: &str, args: &[String]) -> Result<SandboxProcess, SandboxError>;

    /// Subscribe to ready signals from spawned servers.
    fn subscribe_ready(&self) -> broadcast::Receiver<ReadyEvent>;
}

/// Boots sandbox instances. The memoization that makes boot a singleton
/// lives in [`crate::EnvironmentManager`], not here.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

/// Where the orchestrator reports progress: a status line, the bounded
/// environment log, and the preview URL. Implemented by the agent-side
/// state store.
pub trait StatusSink: Send + Sync {
    fn set_status(&self, status: &str);
    fn append_log(&self, line: &str);
    fn set_preview_url(&self, url: &str);
}
