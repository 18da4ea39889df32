//! Project kinds and their configuration records.
//!
//! Everything that varies by project type — the serve script, the
//! instruction template for the agent, the display name — lives in one
//! record looked up once, instead of string switches scattered through
//! the orchestration code.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Fixed install argv. Tuned for a disposable sandbox: no lockfile
/// writes, no audit/funding chatter, no optional dependencies, relaxed
/// peer resolution.
pub const INSTALL_PROGRAM: &str = "npm";
pub const INSTALL_ARGS: &[&str] = &[
    "install",
    "--no-audit",
    "--no-fund",
    "--omit=optional",
    "--legacy-peer-deps",
    "--package-lock=false",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Video,
    Website,
    Mobile,
    Charts,
    Document,
    Presentation,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 6] = [
        ProjectKind::Video,
        ProjectKind::Website,
        ProjectKind::Mobile,
        ProjectKind::Charts,
        ProjectKind::Document,
        ProjectKind::Presentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Website => "website",
            Self::Mobile => "mobile",
            Self::Charts => "charts",
            Self::Document => "document",
            Self::Presentation => "presentation",
        }
    }

    pub fn profile(&self) -> &'static ProjectProfile {
        match self {
            Self::Video => &VIDEO,
            Self::Website => &WEBSITE,
            Self::Mobile => &MOBILE,
            Self::Charts => &CHARTS,
            Self::Document => &DOCUMENT,
            Self::Presentation => &PRESENTATION,
        }
    }
}

impl Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind configuration record.
pub struct ProjectProfile {
    pub kind: ProjectKind,
    pub display_name: &'static str,
    /// Script name in the template manifest that starts the dev server.
    pub serve_script: &'static str,
    /// What that script runs, for template manifests.
    pub serve_program: &'static str,
    /// Project-specific body of the agent's system instruction.
    pub instruction: &'static str,
}

impl ProjectProfile {
    /// Argv for the persistent dev-server process.
    pub fn serve_args(&self) -> Vec<String> {
        vec!["run".to_string(), self.serve_script.to_string()]
    }
}

static VIDEO: ProjectProfile = ProjectProfile {
    kind: ProjectKind::Video,
    display_name: "video studio",
    serve_script: "start",
    serve_program: "remotion preview src/index.jsx",
    instruction: "The workspace is a Remotion video project. Compositions live under \
src/; src/index.jsx registers them. Express animation through frame-based \
interpolation, keep every composition registered, and never change the \
composition ids the preview depends on.",
};

static WEBSITE: ProjectProfile = ProjectProfile {
    kind: ProjectKind::Website,
    display_name: "website workshop",
    serve_script: "dev",
    serve_program: "next dev",
    instruction: "The workspace is a Next.js site using the app/ directory and Tailwind \
classes for styling. Pages are server components unless a file starts with \
'use client'. Prefer editing existing routes over inventing new ones.",
};

static MOBILE: ProjectProfile = ProjectProfile {
    kind: ProjectKind::Mobile,
    display_name: "mobile studio",
    serve_script: "start",
    serve_program: "expo start --web",
    instruction: "The workspace is an Expo app previewed through its web target. Screens \
live under app/; use React Native primitives (View, Text, Pressable) rather \
than DOM elements, and style with StyleSheet objects.",
};

static CHARTS: ProjectProfile = ProjectProfile {
    kind: ProjectKind::Charts,
    display_name: "data studio",
    serve_script: "dev",
    serve_program: "vite",
    instruction: "The workspace is a Vite + React dashboard with chart.js via \
react-chartjs-2. Place datasets in plain modules under src/data/ and keep \
chart options alongside the component that renders them.",
};

static DOCUMENT: ProjectProfile = ProjectProfile {
    kind: ProjectKind::Document,
    display_name: "document studio",
    serve_script: "dev",
    serve_program: "vite",
    instruction: "The workspace is a Vite + React document editor that can export through \
the docx package. Keep document content as structured data under src/ so the \
on-screen preview and the export stay in sync.",
};

static PRESENTATION: ProjectProfile = ProjectProfile {
    kind: ProjectKind::Presentation,
    display_name: "presentation studio",
    serve_script: "dev",
    serve_program: "vite",
    instruction: "The workspace is a Vite + React slide deck that can export through \
pptxgenjs. Each slide is a component under src/slides/; keep the slide order \
in one index module.",
};
