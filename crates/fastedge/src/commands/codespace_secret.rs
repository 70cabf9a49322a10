use std::process::Stdio;

use anyhow::{Context, Result};
use clap::Parser;
use fastedge_config::secrets::{
    API_KEY_ENTRY, read_from_keychain, remove_from_keychain, write_to_keychain,
};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, info, warn};

use crate::{
    commands::USER_CANCELLED,
    utils::{
        prompts,
        spinner::Spinner,
        styles::{fmt_bold, fmt_success, fmt_warning},
    },
};

/// Codespace secret the FastEdge tooling reads its token from
pub const SECRET_NAME: &str = "GCORE_API_TOKEN";

const TOKEN_ENV_VARS: [&str; 2] = [SECRET_NAME, "FASTEDGE_API_KEY"];

#[derive(Debug, Clone, Default, Parser)]
pub struct CodespaceSecretCmd {
    /// Remove the token stored in the system keychain instead
    #[arg(long)]
    pub forget: bool,

    /// GitHub CLI executable
    #[arg(long, value_name = "PATH")]
    pub gh: Option<String>,
}

impl CodespaceSecretCmd {
    fn gh(&self) -> &str {
        self.gh.as_deref().unwrap_or("gh")
    }

    pub(crate) async fn handle(&self) -> Result<()> {
        if self.forget {
            remove_from_keychain(API_KEY_ENTRY)?;
            info!("{}", fmt_success("API token removed from the system keychain"));
            return Ok(());
        }

        let env = |key: &str| std::env::var(key).ok();
        if !in_codespace(env) {
            warn!(
                "{}",
                fmt_warning("Not running inside a GitHub Codespace, no secret was set")
            );
            return Ok(());
        }

        if let Some(var) = existing_token(env) {
            let overwrite = inquire::Confirm::new(&format!(
                "{} is already set in this Codespace, overwrite the secret?",
                fmt_bold(var)
            ))
            .with_default(false)
            .prompt()?;
            if !overwrite {
                anyhow::bail!(USER_CANCELLED)
            }
        }

        let stored = read_from_keychain(API_KEY_ENTRY).unwrap_or_else(|e| {
            debug!("Keychain unavailable: {e:#}");
            None
        });
        let token = prompts::prompt_secret("FastEdge API token:", stored.as_deref())?;
        if token.trim().is_empty() {
            anyhow::bail!("The API token must not be empty");
        }

        check_gh(self.gh()).await?;

        let mut sp = Spinner::new("Setting Codespace secret...");
        if let Err(e) = set_secret(self.gh(), &token).await {
            sp.stop_error("Failed setting Codespace secret");
            return Err(e);
        }
        sp.stop_success(format!("{SECRET_NAME} stored as a Codespace secret"));

        if let Err(e) = write_to_keychain(API_KEY_ENTRY, &token) {
            warn!("Failed storing the API token in the system keychain: {e:#}");
        }

        info!(
            "Rebuild the Codespace ({}) so the new secret is picked up",
            fmt_bold("Codespaces: Rebuild Container")
        );

        Ok(())
    }
}

pub(crate) fn in_codespace(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup("CODESPACES").is_some_and(|v| v == "true") || lookup("CODESPACE_NAME").is_some()
}

/// Name of the first token variable that is already set
pub(crate) fn existing_token(lookup: impl Fn(&str) -> Option<String>) -> Option<&'static str> {
    TOKEN_ENV_VARS
        .into_iter()
        .find(|var| lookup(var).is_some_and(|v| !v.is_empty()))
}

async fn check_gh(gh: &str) -> Result<()> {
    let output = Command::new(gh)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .context("GitHub CLI (gh) is not installed or not on PATH")?;

    if !output.status.success() {
        anyhow::bail!(
            "GitHub CLI (gh) is not usable: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    debug!("{}", String::from_utf8_lossy(&output.stdout).trim());

    Ok(())
}

/// Pipes the token into `gh codespace secret set`, it never appears in argv
async fn set_secret(gh: &str, token: &str) -> Result<()> {
    let mut child = Command::new(gh)
        .args(["codespace", "secret", "set", SECRET_NAME])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context(format!("Failed running {gh}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(token.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        anyhow::bail!(
            "Setting the Codespace secret failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}
