use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::Parser;
use fastedge_config::{
    McpJson, McpServer, VSCODE_DIR, gitignore,
    mcp::{ASSISTANT_SERVER, DEFAULT_API_URL},
};
use tracing::{info, warn};

use crate::utils::{
    prompts,
    styles::{fmt_bold, fmt_dimmed, fmt_success, fmt_warning},
};

#[derive(Debug, Clone, Default, Parser)]
pub struct McpJsonCmd {
    /// FastEdge API key, prompted for when omitted
    #[arg(long, env = "FASTEDGE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// FastEdge API url, prompted for when omitted
    #[arg(long)]
    pub api_url: Option<String>,

    /// Add mcp.json to .gitignore without asking
    #[arg(long)]
    pub gitignore: bool,
}

impl McpJsonCmd {
    pub(crate) fn handle(&self, workspace: &Utf8Path) -> Result<()> {
        let path = McpJson::default_path(workspace);
        let mut mcp = McpJson::load_or_default(&path)?;

        if mcp.has_server(ASSISTANT_SERVER) {
            info!(
                "{} is already configured in {}",
                fmt_bold(ASSISTANT_SERVER),
                fmt_dimmed(path.as_str())
            );
            return Ok(());
        }

        let api_key = match &self.api_key {
            Some(key) if key.trim().is_empty() => anyhow::bail!("The API key must not be empty"),
            Some(key) => key.clone(),
            None => prompts::prompt_secret("FastEdge API key:", None)?,
        };
        let api_url = match &self.api_url {
            Some(api_url) => {
                url::Url::parse(api_url).context(format!("Invalid API url: {api_url}"))?;
                api_url.clone()
            }
            None => prompts::prompt_url("FastEdge API url:", DEFAULT_API_URL)?,
        };

        mcp.add_server(
            ASSISTANT_SERVER,
            &McpServer::fastedge_assistant(&api_key, &api_url),
        )?;
        mcp.save()?;
        info!(
            "{}",
            fmt_success(&format!(
                "{} added to {}",
                fmt_bold(ASSISTANT_SERVER),
                fmt_dimmed(path.as_str())
            ))
        );

        self.protect_credentials(workspace)
    }

    fn protect_credentials(&self, workspace: &Utf8Path) -> Result<()> {
        let entry = format!("{VSCODE_DIR}/mcp.json");
        warn!(
            "{}",
            fmt_warning(&format!("{entry} contains your API key, do not commit it"))
        );

        if gitignore::is_ignored(workspace, &entry)? {
            return Ok(());
        }

        let add = self.gitignore
            || inquire::Confirm::new(&format!("Add {entry} to .gitignore?"))
                .with_default(true)
                .prompt()?;
        if add && gitignore::add_entry(workspace, &entry)? {
            info!("{}", fmt_success(&format!("{entry} added to .gitignore")));
        }

        Ok(())
    }
}
