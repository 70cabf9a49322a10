use std::{ffi::OsStr, io::ErrorKind, time::Duration};

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use fastedge_config::VSCODE_DIR;
use fastedge_debug::Registry;
use notify::{RecursiveMode, Watcher, recommended_watcher};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    extension::{
        self, ExtensionContext, GENERATE_LAUNCH_JSON, GENERATE_MCP_JSON, RUN_FILE, RUN_WORKSPACE,
        SETUP_CODESPACE_SECRET,
    },
    utils::styles::{fmt_bold, fmt_error, fmt_success},
};

pub const TRIGGER_FILE: &str = ".fastedge-run-command";

/// Commands a trigger file may run
pub const ALLOWED_COMMANDS: [&str; 5] = [
    SETUP_CODESPACE_SECRET,
    GENERATE_LAUNCH_JSON,
    GENERATE_MCP_JSON,
    RUN_FILE,
    RUN_WORKSPACE,
];

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Writers create the file and then fill it, events are coalesced over this delay
const SETTLE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default, Parser)]
pub struct AutorunCmd {
    /// Process an existing trigger file and exit instead of watching for new ones
    #[arg(long)]
    pub once: bool,
}

impl AutorunCmd {
    pub(crate) async fn handle(&self, ctx: &ExtensionContext) -> Result<()> {
        let registry = extension::activate(ctx);
        let trigger = trigger_path(ctx.workspace_root());

        if trigger.exists() {
            info!("Found trigger file at {trigger}");
            execute_trigger_file(&registry, &trigger, COMMAND_TIMEOUT).await;
        } else {
            debug!("No trigger file found at {trigger}");
        }

        if self.once {
            return Ok(());
        }

        let watch_dir = ctx.workspace_root().join(VSCODE_DIR);
        std::fs::create_dir_all(&watch_dir).context(format!("Failed creating {watch_dir}"))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let is_trigger = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(OsStr::new(TRIGGER_FILE)));
                if is_trigger && (event.kind.is_create() || event.kind.is_modify()) {
                    let _ = tx.send(());
                }
            }
            Err(e) => error!("File watch error: {e:?}"),
        })
        .context("Failed to create file watcher")?;
        watcher
            .watch(watch_dir.as_std_path(), RecursiveMode::NonRecursive)
            .context(format!("Failed to watch {watch_dir}"))?;

        info!(
            "Watching {} for commands, press Ctrl-C to stop",
            fmt_bold(trigger.as_str())
        );

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    if event.is_none() {
                        break;
                    }
                    tokio::time::sleep(SETTLE_DELAY).await;
                    while rx.try_recv().is_ok() {}

                    // our own delete also shows up as a modification of the directory
                    if trigger.exists() {
                        execute_trigger_file(&registry, &trigger, COMMAND_TIMEOUT).await;
                    }
                }
                _ = &mut ctrl_c => {
                    info!("Stopping autorun");
                    break;
                }
            }
        }

        drop(watcher);
        Ok(())
    }
}

/// `<workspace>/.vscode/.fastedge-run-command`
pub fn trigger_path(workspace: &Utf8Path) -> Utf8PathBuf {
    workspace.join(VSCODE_DIR).join(TRIGGER_FILE)
}

/// Content of a trigger file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trigger {
    pub command: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Trigger {
    /// Either `{"command": id, "args": [...]}` or a bare command id, `None` when blank
    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }

        match serde_json::from_str::<Self>(content) {
            Ok(trigger) => {
                debug!("Parsed json command {} with args {:?}", trigger.command, trigger.args);
                Some(trigger)
            }
            Err(_) => Some(Self {
                command: content.to_string(),
                args: vec![],
            }),
        }
    }

    fn ensure_allowed(&self) -> Result<()> {
        if ALLOWED_COMMANDS.contains(&self.command.as_str()) {
            Ok(())
        } else {
            Err(anyhow!(
                "Command '{}' is not in the allowlist. Allowed commands: {}",
                self.command,
                ALLOWED_COMMANDS.join(", ")
            ))
        }
    }
}

/// Runs the command held by the trigger file and deletes the file whatever the outcome.
///
/// Returns `true` when the command ran successfully.
pub(crate) async fn execute_trigger_file(
    registry: &Registry,
    path: &Utf8Path,
    timeout: Duration,
) -> bool {
    let result = run_trigger(registry, path, timeout).await;
    match &result {
        Ok(Some(command)) => info!(
            "{}",
            fmt_success(&format!("Auto-executed '{}'", fmt_bold(command)))
        ),
        Ok(None) => info!("Trigger file is empty, ignoring"),
        Err(e) => error!(
            "{}",
            fmt_error(&format!("FastEdge autorun failed: {e:#}"))
        ),
    }

    match std::fs::remove_file(path) {
        Ok(()) => debug!("Deleted trigger file {path}"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not delete trigger file {path}: {e}"),
    }

    result.is_ok()
}

async fn run_trigger(
    registry: &Registry,
    path: &Utf8Path,
    timeout: Duration,
) -> Result<Option<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context(format!("Failed reading trigger file {path}"))?;
    let Some(trigger) = Trigger::parse(&content) else {
        return Ok(None);
    };
    trigger.ensure_allowed()?;

    info!("Executing command: {}", trigger.command);
    tokio::time::timeout(timeout, registry.execute(&trigger.command, trigger.args))
        .await
        .map_err(|_| anyhow!("Command execution timeout"))??;

    Ok(Some(trigger.command))
}
