use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use tracing::debug;

use crate::VSCODE_DIR;

/// Name of the FastEdge assistant entry in `mcp.json`
pub const ASSISTANT_SERVER: &str = "fastedge-assistant";

pub const DEFAULT_API_URL: &str = "https://api.gcore.com";

const ASSISTANT_IMAGE: &str = "ghcr.io/g-core/fastedge-mcp-server:latest";

/// An MCP server definition as understood by the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    #[serde(rename = "type")]
    pub transport: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

impl McpServer {
    /// Containerized FastEdge assistant, credentials are handed over through `env`
    pub fn fastedge_assistant(api_key: &str, api_url: &str) -> Self {
        let docker = format!(
            "docker run --user $(id -u):$(id -g) --rm -i \
-v \"$WORKSPACE_ROOT:/workspace\" \
-e \"WORKSPACE_ROOT=/workspace\" \
-e \"FASTEDGE_API_KEY=$FASTEDGE_API_KEY\" \
-e \"FASTEDGE_API_URL=$FASTEDGE_API_URL\" \
{ASSISTANT_IMAGE}"
        );

        let mut env = IndexMap::new();
        env.insert("WORKSPACE_ROOT".into(), "${workspaceFolder}".into());
        env.insert("FASTEDGE_API_KEY".into(), api_key.into());
        env.insert("FASTEDGE_API_URL".into(), api_url.into());

        Self {
            transport: "stdio".into(),
            command: "bash".into(),
            args: vec!["-c".into(), docker],
            env,
        }
    }
}

/// The editor's `mcp.json` file.
///
/// Servers and top level keys this crate does not know about are preserved as raw json.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpJson {
    #[serde(skip)]
    path: Option<Utf8PathBuf>,

    #[serde(default)]
    pub servers: IndexMap<String, Value>,

    #[serde(flatten)]
    pub other: IndexMap<String, Value>,
}

impl McpJson {
    /// `<workspace>/.vscode/mcp.json`
    pub fn default_path(workspace: &Utf8Path) -> Utf8PathBuf {
        workspace.join(VSCODE_DIR).join("mcp.json")
    }

    #[must_use]
    pub fn with_path(mut self, path: &Utf8Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Loads `mcp.json`, an absent file yields an empty configuration
    ///
    /// # Errors
    ///
    /// This function will return an error if the file exists but can not be read or parsed
    pub fn load_or_default(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            debug!("No MCP configuration at {path}");
            return Ok(Self::default().with_path(path));
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed reading MCP config: {path}"))?;
        let mut cfg: Self = serde_json::from_str(&contents)
            .context(format!("Failed loading MCP config: {path}"))?;
        cfg.path = Some(path.to_path_buf());

        Ok(cfg)
    }

    /// Saves `mcp.json`, creating the parent directory if needed
    ///
    /// # Errors
    ///
    /// This function will error if no path is set or it fails writing the file
    pub fn save(&self) -> Result<()> {
        let dest = self
            .path
            .as_ref()
            .context("MCP config has no destination path")?;
        debug!("Saving MCP config to {dest}");

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).context(format!("Failed creating {parent}"))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(dest, contents).context(format!("Failed writing MCP config: {dest}"))?;

        Ok(())
    }

    pub fn has_server(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Adds (or replaces) a server, keeping the position of an existing entry
    ///
    /// # Errors
    ///
    /// This function will return an error if the server can not be serialized
    pub fn add_server(&mut self, name: &str, server: &McpServer) -> Result<()> {
        self.servers
            .insert(name.to_string(), serde_json::to_value(server)?);
        Ok(())
    }
}
