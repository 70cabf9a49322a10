use std::fmt::Display;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

pub(crate) mod defaults;
pub mod dotenv;
pub mod gitignore;
pub mod launch;
pub mod logger;
pub mod mcp;
pub mod secrets;

pub use launch::{DotenvSetting, LaunchConfiguration, LaunchEntry, LaunchJson};
pub use mcp::{McpJson, McpServer};

/// Debug type registered for FastEdge launch configurations
pub const DEBUG_TYPE: &str = "fastedge";

/// Port the runtime CLI listens on when none is configured
pub const DEFAULT_PORT: u16 = 8181;

/// Directory (relative to the workspace root) holding editor configuration
pub const VSCODE_DIR: &str = ".vscode";

/// Selects whether compilation targets the active file or the whole workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugContext {
    File,
    Workspace,
}

impl DebugContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugContext::File => "file",
            DebugContext::Workspace => "workspace",
        }
    }
}

impl Display for DebugContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source language of an edge function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Rust,
}

impl Language {
    const JAVASCRIPT_IDS: [&'static str; 4] = [
        "javascript",
        "typescript",
        "javascriptreact",
        "typescriptreact",
    ];

    /// Maps an editor language identifier onto a supported language
    pub fn from_language_id(id: &str) -> Option<Self> {
        if Self::JAVASCRIPT_IDS.contains(&id) {
            Some(Language::Javascript)
        } else if id == "rust" {
            Some(Language::Rust)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Rust => "rust",
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Editor language identifier for a source file, based on its extension
pub fn language_id_for_path(path: &camino::Utf8Path) -> Option<&'static str> {
    match path.extension()? {
        "rs" => Some("rust"),
        "js" | "mjs" | "cjs" => Some("javascript"),
        "jsx" => Some("javascriptreact"),
        "ts" | "mts" | "cts" => Some("typescript"),
        "tsx" => Some("typescriptreact"),
        _ => None,
    }
}

/// A compiled WebAssembly artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryInfo {
    pub path: Utf8PathBuf,
    pub lang: Language,
}

impl BinaryInfo {
    pub fn new(path: impl Into<Utf8PathBuf>, lang: Language) -> Self {
        Self {
            path: path.into(),
            lang,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    #[test]
    fn test_language_from_language_id() {
        for id in [
            "javascript",
            "typescript",
            "javascriptreact",
            "typescriptreact",
        ] {
            assert_eq!(Language::from_language_id(id), Some(Language::Javascript));
        }
        assert_eq!(Language::from_language_id("rust"), Some(Language::Rust));
        assert_eq!(Language::from_language_id("python"), None);
        assert_eq!(Language::from_language_id(""), None);
        assert_eq!(Language::from_language_id("Rust"), None);
    }

    #[test]
    fn test_language_id_for_path() {
        assert_eq!(
            language_id_for_path(Utf8Path::new("src/lib.rs")),
            Some("rust")
        );
        assert_eq!(
            language_id_for_path(Utf8Path::new("src/index.tsx")),
            Some("typescriptreact")
        );
        assert_eq!(
            language_id_for_path(Utf8Path::new("src/index.mjs")),
            Some("javascript")
        );
        assert_eq!(language_id_for_path(Utf8Path::new("README.md")), None);
        assert_eq!(language_id_for_path(Utf8Path::new("Makefile")), None);
    }

    #[test]
    fn test_debug_context_serde() {
        let ctx: DebugContext = serde_json::from_str("\"workspace\"").unwrap();
        assert_eq!(ctx, DebugContext::Workspace);
        assert_eq!(serde_json::to_string(&DebugContext::File).unwrap(), "\"file\"");
    }

    #[test]
    fn test_binary_info_serde() {
        let info: BinaryInfo =
            serde_json::from_str(r#"{"path":"/tmp/out.wasm","lang":"rust"}"#).unwrap();
        assert_eq!(info, BinaryInfo::new("/tmp/out.wasm", Language::Rust));
    }
}
