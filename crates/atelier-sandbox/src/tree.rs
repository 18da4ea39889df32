//! Static file trees mounted into the sandbox.

use std::collections::BTreeMap;

use crate::errors::SandboxError;
use crate::project::ProjectKind;

/// Nested path -> node map, the shape the sandbox mounts verbatim.
pub type FileTree = BTreeMap<String, FileNode>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileNode {
    File { contents: String },
    Directory { children: FileTree },
}

impl FileNode {
    pub fn file(contents: impl Into<String>) -> Self {
        Self::File {
            contents: contents.into(),
        }
    }

    pub fn dir(children: FileTree) -> Self {
        Self::Directory { children }
    }
}

/// Supplier of project templates, one static file tree per project kind.
///
/// Contract: the tree must include a `package.json` whose scripts match
/// the serve script named by the kind's [`crate::ProjectProfile`].
pub trait TemplateSource: Send + Sync {
    fn template(&self, kind: ProjectKind) -> Result<FileTree, SandboxError>;
}

/// Built-in minimal starter trees.
///
/// Each is just enough of a project for the install/serve sequence to
/// run: a manifest with the expected scripts and a placeholder entry
/// point. Real deployments swap in richer trees behind [`TemplateSource`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StarterTemplates;

impl TemplateSource for StarterTemplates {
    fn template(&self, kind: ProjectKind) -> Result<FileTree, SandboxError> {
        Ok(starter_tree(kind))
    }
}

fn starter_tree(kind: ProjectKind) -> FileTree {
    let profile = kind.profile();
    let mut scripts = serde_json::Map::new();
    scripts.insert(
        profile.serve_script.to_string(),
        serde_json::Value::String(profile.serve_program.to_string()),
    );
    let manifest = serde_json::json!({
        "name": format!("atelier-{}", kind.as_str()),
        "version": "0.1.0",
        "private": true,
        "scripts": scripts,
    });
    let manifest = serde_json::to_string_pretty(&manifest).unwrap_or_default();

    let mut src = FileTree::new();
    src.insert(
        "index.jsx".to_string(),
        FileNode::file("export default function App() {\n  return null;\n}\n"),
    );

    let mut tree = FileTree::new();
    tree.insert("package.json".to_string(), FileNode::file(manifest));
    tree.insert("src".to_string(), FileNode::dir(src));
    tree
}
