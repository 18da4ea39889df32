//! System-instruction assembly.
//!
//! Configuration, not logic: a fixed base instruction plus the active
//! project profile's template body.

use atelier_sandbox::ProjectKind;

const BASE_INSTRUCTION: &str = "You are an autonomous coding agent working inside an \
isolated project workspace with a live preview. You have four tools: readFile, listDir, \
writeFile, and runCommand. Inspect files before editing them, write complete file \
contents (writeFile overwrites), and run commands only for one-off work such as adding \
a dependency. The development server and the project scaffold are managed for you; \
never start a server or re-initialize the project. Tool calls execute in the order you \
request them. When the work is done, reply with a short summary of what changed.";

pub fn system_instruction(kind: ProjectKind) -> String {
    format!("{BASE_INSTRUCTION}\n\n{}", kind.profile().instruction)
}
