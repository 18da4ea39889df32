//! Directory-rooted sandbox implementation.
//!
//! Filesystem access is confined to the root directory; processes spawn
//! with the root as their working directory and stream merged
//! stdout/stderr lines through the process handle. A line announcing a
//! local http URL doubles as the server-ready signal.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::SandboxError;
use crate::provider::{DirEntry, ReadyEvent, Sandbox, SandboxProcess, SandboxRuntime, StatusSink};
use crate::tree::{FileNode, FileTree};

#[derive(Debug)]
pub struct LocalSandbox {
    root: PathBuf,
    ready_tx: broadcast::Sender<ReadyEvent>,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self {
            root: root.into(),
            ready_tx,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a sandbox path against the root. One leading separator is
    /// stripped (the sandbox filesystem is rooted); `..` resolves
    /// logically and may not climb above the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(SandboxError::InvalidPath(path.to_string()));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::InvalidPath(path.to_string()));
                }
            }
        }
        Ok(resolved)
    }

    async fn clear_root(&self) -> Result<(), SandboxError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|error| SandboxError::io(self.root.display().to_string(), error))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| SandboxError::io(self.root.display().to_string(), error))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|error| SandboxError::io(path.display().to_string(), error))?;
            let removal = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            removal.map_err(|error| SandboxError::io(path.display().to_string(), error))?;
        }
        Ok(())
    }

    async fn write_tree(&self, tree: &FileTree) -> Result<(), SandboxError> {
        let mut stack: Vec<(PathBuf, &FileTree)> = vec![(self.root.clone(), tree)];
        while let Some((dir, tree)) = stack.pop() {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|error| SandboxError::io(dir.display().to_string(), error))?;
            for (name, node) in tree {
                let path = dir.join(name);
                match node {
                    FileNode::File { contents } => {
                        tokio::fs::write(&path, contents)
                            .await
                            .map_err(|error| SandboxError::io(path.display().to_string(), error))?;
                    }
                    FileNode::Directory { children } => stack.push((path, children)),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn mount(&self, tree: &FileTree) -> Result<(), SandboxError> {
        debug!(root = %self.root.display(), entries = tree.len(), "mounting file tree");
        self.clear_root().await?;
        self.write_tree(tree).await
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|error| SandboxError::io(path, error))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| SandboxError::io(path, error))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|error| SandboxError::io(path, error))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError> {
        let resolved = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|error| SandboxError::io(path, error))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|error| SandboxError::io(path, error))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|error| SandboxError::io(path, error))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn spawn(&self, program: &str, args: &[String]) -> Result<SandboxProcess, SandboxError> {
        debug!(program, ?args, "spawning sandbox process");
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| SandboxError::Spawn {
                program: program.to_string(),
                message: error.to_string(),
            })?;

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone(), self.ready_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx, self.ready_tx.clone()));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let program = program.to_string();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(error) => {
                    warn!(program, %error, "failed to await sandbox process");
                    -1
                }
            };
            let _ = exit_tx.send(code);
        });

        Ok(SandboxProcess::from_parts(line_rx, exit_rx))
    }

    fn subscribe_ready(&self) -> broadcast::Receiver<ReadyEvent> {
        self.ready_tx.subscribe()
    }
}

async fn forward_lines<R>(
    stream: R,
    lines: mpsc::UnboundedSender<String>,
    ready: broadcast::Sender<ReadyEvent>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(event) = scan_for_local_url(&line) {
            let _ = ready.send(event);
        }
        // Keep reading even if the consumer is gone, so the child never
        // blocks on a full pipe.
        let _ = lines.send(line);
    }
}

/// Extract a ready signal from a server log line mentioning a local URL.
pub(crate) fn scan_for_local_url(line: &str) -> Option<ReadyEvent> {
    for host in ["http://localhost:", "http://127.0.0.1:"] {
        let Some(start) = line.find(host) else {
            continue;
        };
        let rest = &line[start..];
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ','))
            .unwrap_or(rest.len());
        let url = rest[..end].trim_end_matches('/');
        let port: String = url[host.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(port) = port.parse::<u16>() {
            return Some(ReadyEvent {
                port,
                url: url.to_string(),
            });
        }
    }
    None
}

/// Boots [`LocalSandbox`] instances under a fixed root directory.
pub struct LocalRuntime {
    root: PathBuf,
}

impl LocalRuntime {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| SandboxError::Boot(error.to_string()))?;
        Ok(Arc::new(LocalSandbox::new(self.root.clone())))
    }
}

/// No-op sink for callers that do not observe progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn set_status(&self, _status: &str) {}
    fn append_log(&self, _line: &str) {}
    fn set_preview_url(&self, _url: &str) {}
}
