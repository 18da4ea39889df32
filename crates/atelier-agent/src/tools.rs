//! Tool declarations and the executor.
//!
//! The executor never fails outward: every problem comes back as a
//! string beginning with an error sentinel, so the conversation loop can
//! classify results without exception handling and the model can read
//! the error text and adapt.

use atelier_llm::{FunctionCall, ToolDefinition};
use atelier_sandbox::{Sandbox, SandboxError};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

pub const READ_FILE_TOOL: &str = "readFile";
pub const LIST_DIR_TOOL: &str = "listDir";
pub const WRITE_FILE_TOOL: &str = "writeFile";
pub const RUN_COMMAND_TOOL: &str = "runCommand";

pub const EXECUTION_ERROR_PREFIX: &str = "Execution Error:";
const NOT_BOOTED: &str = "Error: The sandbox is not booted yet.";

/// Fixed reply for commands the policy rejects. Advisory, not an error:
/// the model is expected to change strategy, not retry.
pub const COMMAND_ADVISORY: &str = "Notice: The project is already initialized and the \
development server is running. Do not recreate the project or start another server; \
edit the project files directly.";

/// Tool declarations sent to the model, in a fixed order.
pub fn declarations() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: READ_FILE_TOOL.to_string(),
            description: "Reads the full content of a file in the project workspace."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path to the file, e.g. 'src/data.json'."
                    }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: LIST_DIR_TOOL.to_string(),
            description: "Lists files and directories at a path.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory to list, e.g. 'src' or '.'."
                    }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: WRITE_FILE_TOOL.to_string(),
            description: "Writes content to a file, overwriting any existing content."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to write to." },
                    "content": { "type": "string", "description": "Full file content." }
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: RUN_COMMAND_TOOL.to_string(),
            description: "Runs a shell command such as 'npm install lodash' in the \
workspace. The development server is managed for you and must not be started here."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The command to run." }
                },
                "required": ["command"]
            }),
        },
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ToolName {
    ReadFile,
    ListDir,
    WriteFile,
    RunCommand,
}

impl ToolName {
    fn parse(name: &str) -> Option<Self> {
        match name {
            READ_FILE_TOOL => Some(Self::ReadFile),
            LIST_DIR_TOOL => Some(Self::ListDir),
            WRITE_FILE_TOOL => Some(Self::WriteFile),
            RUN_COMMAND_TOOL => Some(Self::RunCommand),
            _ => None,
        }
    }
}

/// True when a tool result string carries one of the error sentinels.
pub fn is_error_output(output: &str) -> bool {
    output.starts_with("Error:") || output.starts_with(EXECUTION_ERROR_PREFIX)
}

/// Human summary of a call, shown while the tool executes.
pub fn working_task_summary(call: &FunctionCall) -> String {
    let path = call.args.get("path").and_then(Value::as_str);
    match ToolName::parse(&call.name) {
        Some(ToolName::RunCommand) => call
            .args
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or("(no command)")
            .to_string(),
        Some(ToolName::ReadFile) => format!("Reading {}", path.unwrap_or("a file")),
        Some(ToolName::ListDir) => format!("Listing {}", path.unwrap_or(".")),
        Some(ToolName::WriteFile) => format!("Writing {}", path.unwrap_or("a file")),
        None => call.name.clone(),
    }
}

/// Execute one tool call against the sandbox. Always resolves to a
/// string; see the sentinel constants above.
pub async fn execute_tool(call: &FunctionCall, sandbox: Option<Arc<dyn Sandbox>>) -> String {
    let Some(sandbox) = sandbox else {
        return NOT_BOOTED.to_string();
    };
    let Some(tool) = ToolName::parse(&call.name) else {
        return format!("Error: Tool '{}' is not available.", call.name);
    };

    debug!(tool = %call.name, "executing tool call");
    match run_tool(tool, &call.args, sandbox.as_ref()).await {
        Ok(output) => output,
        Err(message) => format!("{EXECUTION_ERROR_PREFIX} {message}"),
    }
}

async fn run_tool(
    tool: ToolName,
    args: &Map<String, Value>,
    sandbox: &dyn Sandbox,
) -> Result<String, String> {
    match tool {
        ToolName::ReadFile => {
            let path = required_str(args, "path")?;
            sandbox.read_file(path).await.map_err(stringify)
        }
        ToolName::ListDir => {
            let path = args
                .get("path")
                .and_then(Value::as_str)
                .filter(|path| !path.is_empty())
                .unwrap_or(".");
            let entries = sandbox.read_dir(path).await.map_err(stringify)?;
            Ok(entries
                .iter()
                .map(|entry| {
                    let tag = if entry.is_dir { "[DIR] " } else { "[FILE] " };
                    format!("{tag}{}", entry.name)
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        ToolName::WriteFile => {
            let path = required_str(args, "path")?;
            let content = required_str(args, "content")?;
            sandbox.write_file(path, content).await.map_err(stringify)?;
            Ok(format!("Successfully wrote {path}."))
        }
        ToolName::RunCommand => {
            let command = required_str(args, "command")?.trim();
            if command.is_empty() {
                return Err("command is empty".to_string());
            }
            if is_denied(command) {
                return Ok(COMMAND_ADVISORY.to_string());
            }

            let tokens = split_command(command)?;
            let (program, rest) = tokens
                .split_first()
                .ok_or_else(|| "command is empty".to_string())?;
            let mut process = sandbox.spawn(program, rest).await.map_err(stringify)?;

            let mut output = String::new();
            while let Some(line) = process.next_line().await {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&line);
            }
            let code = process.wait().await.map_err(stringify)?;
            if output.is_empty() {
                output.push_str("(no output)");
            }
            Ok(format!("Exit Code: {code}\nOutput: {output}"))
        }
    }
}

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required argument '{key}'"))
}

fn stringify(error: SandboxError) -> String {
    error.to_string()
}

/// Commands that would re-scaffold the project or double-bind the
/// preview port. Matched against the trimmed command string.
const DENIED_PREFIXES: &[&str] = &[
    "npm run dev",
    "npm start",
    "npm run start",
    "npm run web",
    "next dev",
    "expo start",
    "vite",
];
const DENIED_FRAGMENTS: &[&str] = &[
    "create-next-app",
    "create-expo-app",
    "create-vite",
    "npm init",
    "npm create",
    "npx create",
];

fn is_denied(command: &str) -> bool {
    DENIED_PREFIXES
        .iter()
        .any(|prefix| command.starts_with(prefix))
        || DENIED_FRAGMENTS
            .iter()
            .any(|fragment| command.contains(fragment))
}

/// Split a command string into program + argv.
///
/// Understands single quotes, double quotes, and backslash escapes.
/// Pipes, redirection, and expansions are not interpreted; the tokens
/// are handed to the sandbox spawner as-is.
pub fn split_command(command: &str) -> Result<Vec<String>, String> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote = Quote::None;
    let mut chars = command.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Quote::Single => {
                if ch == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(ch);
                }
            }
            Quote::Double => match ch {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(escaped @ ('"' | '\\' | '$' | '`')) => current.push(escaped),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => return Err("unterminated escape in command".to_string()),
                },
                _ => current.push(ch),
            },
            Quote::None => match ch {
                '\'' => {
                    quote = Quote::Single;
                    in_token = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_token = true;
                }
                '\\' => match chars.next() {
                    Some(escaped) => {
                        current.push(escaped);
                        in_token = true;
                    }
                    None => return Err("unterminated escape in command".to_string()),
                },
                ch if ch.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                ch => {
                    current.push(ch);
                    in_token = true;
                }
            },
        }
    }

    if quote != Quote::None {
        return Err("unbalanced quote in command".to_string());
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
