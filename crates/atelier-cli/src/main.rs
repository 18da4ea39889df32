//! Line-oriented host for the Atelier agent.
//!
//! Stands in for the visual UI: resolves the credential, boots the
//! environment, triggers the project load, and drains the agent's event
//! stream for each line of input.

use clap::{ArgAction, Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use atelier_agent::{Agent, AgentEvent, Outcome, StateStore, ToolStatus};
use atelier_sandbox::{
    EnvironmentManager, LocalRuntime, ProjectKind, StarterTemplates, StatusSink,
};

const GREETING: &str = "Hello. Pick a direction and I will start building.";

#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(about = "Conversational coding agent with a sandboxed live preview")]
struct Cli {
    /// Project kind to mount into the sandbox.
    #[arg(long, value_enum, default_value_t = ProjectArg::Website)]
    project: ProjectArg,
    /// Sandbox root directory; a temporary directory by default.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Model identifier override.
    #[arg(long)]
    model: Option<String>,
    /// API key; falls back to GEMINI_API_KEY, then the credential file.
    #[arg(long)]
    api_key: Option<String>,
    /// Where the credential is persisted between runs.
    #[arg(long, default_value = ".atelier-credential")]
    credential_file: PathBuf,
    /// Persist --api-key to the credential file.
    #[arg(long, action = ArgAction::SetTrue)]
    save_key: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProjectArg {
    Video,
    Website,
    Mobile,
    Charts,
    Document,
    Presentation,
}

impl From<ProjectArg> for ProjectKind {
    fn from(arg: ProjectArg) -> Self {
        match arg {
            ProjectArg::Video => ProjectKind::Video,
            ProjectArg::Website => ProjectKind::Website,
            ProjectArg::Mobile => ProjectKind::Mobile,
            ProjectArg::Charts => ProjectKind::Charts,
            ProjectArg::Document => ProjectKind::Document,
            ProjectArg::Presentation => ProjectKind::Presentation,
        }
    }
}

fn resolve_credential(cli: &Cli) -> Option<String> {
    if let Some(key) = &cli.api_key {
        if cli.save_key {
            if let Err(error) = std::fs::write(&cli.credential_file, key) {
                warn!(%error, "could not persist the credential file");
            }
        }
        return Some(key.clone());
    }
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            return Some(key);
        }
    }
    std::fs::read_to_string(&cli.credential_file)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(StateStore::new(GREETING));

    let Some(key) = resolve_credential(&cli) else {
        eprintln!(
            "No API credential. Pass --api-key once (add --save-key to persist it) or set \
GEMINI_API_KEY."
        );
        return ExitCode::FAILURE;
    };
    store.set_api_key(key);

    let kind = ProjectKind::from(cli.project);
    store.set_project(kind);

    let (root, _root_guard) = match &cli.root {
        Some(root) => (root.clone(), None),
        None => match tempfile::tempdir() {
            Ok(dir) => (dir.path().to_path_buf(), Some(dir)),
            Err(error) => {
                eprintln!("Could not create a sandbox directory: {error}");
                return ExitCode::FAILURE;
            }
        },
    };

    let manager = Arc::new(EnvironmentManager::new(
        Arc::new(LocalRuntime::new(root)),
        Arc::new(StarterTemplates),
    ));

    // Boot and load in the background; the chat is usable immediately and
    // the status line reports progress.
    {
        let manager = manager.clone();
        let store = store.clone();
        tokio::spawn(async move {
            match manager.boot().await {
                Ok(sandbox) => store.set_sandbox(sandbox),
                Err(error) => {
                    warn!(%error, "sandbox boot failed");
                    return;
                }
            }
            let sink = store.clone() as Arc<dyn StatusSink>;
            if let Err(error) = manager.load_project(kind, sink).await {
                warn!(%error, "project load failed");
            }
        });
    }

    let agent = Agent::gemini(store.clone(), cli.model.clone());
    println!("atelier — {kind} project. Type a direction, or :status, :logs, :clear, :quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                eprintln!("stdin error: {error}");
                return ExitCode::FAILURE;
            }
        };

        match line.trim() {
            "" => {}
            ":quit" => break,
            ":status" => {
                println!("status: {}", store.status());
                match store.preview_url() {
                    Some(url) => println!("preview: {url}"),
                    None => println!("preview: (not ready)"),
                }
            }
            ":logs" => {
                for line in store.logs() {
                    println!("{line}");
                }
            }
            ":clear" => {
                store.clear_history(GREETING);
                println!("History cleared.");
            }
            text => run_turn(&agent, &store, text).await,
        }
    }

    ExitCode::SUCCESS
}

async fn run_turn(agent: &Agent, store: &Arc<StateStore>, text: &str) {
    let mut events = agent.send_message(store.next_input(text));
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Init | AgentEvent::UserMessage { .. } => {}
            AgentEvent::ToolUse { name, summary } => println!("  [tool] {name}: {summary}"),
            AgentEvent::ToolResult { name, status } => {
                let status = match status {
                    ToolStatus::Success => "ok",
                    ToolStatus::Error => "error",
                };
                println!("  [tool] {name} -> {status}");
            }
            AgentEvent::AssistantMessage { text } => println!("{text}"),
            AgentEvent::Error { message } => eprintln!("  [error] {message}"),
            AgentEvent::Result { outcome } => {
                if outcome == Outcome::Error {
                    eprintln!("  The turn ended with an error; :logs has details.");
                }
            }
        }
    }
}
