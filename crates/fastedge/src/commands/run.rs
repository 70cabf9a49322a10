use std::{io::Write, sync::Arc};

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use fastedge_config::{DEBUG_TYPE, DebugContext, LaunchConfiguration, LaunchJson};
use fastedge_debug::{
    ContextPrompt, DebugSession, NoPrompt, SessionHandle, SessionOptions, SessionState,
    protocol::{ClientRequest, Event, OutgoingMessage, OutputEventCategory, error_message},
    session::CLEAR_CONSOLE,
};
use serde_json::{Value, json};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    extension::ExtensionContext,
    utils::{
        prompts::InquirePrompt,
        styles::{fmt_dimmed, fmt_error, fmt_primary},
    },
};

#[derive(Debug, Clone, Default, Parser)]
pub struct RunCmd {
    /// Build the whole workspace instead of a single file
    #[arg(long, conflicts_with = "file")]
    pub workspace: bool,

    /// Source file to build, relative paths are resolved against the workspace root
    pub file: Option<Utf8PathBuf>,
}

impl RunCmd {
    pub(crate) async fn handle(&self, ctx: &ExtensionContext) -> Result<()> {
        let config = self.launch_configuration(ctx.workspace_root())?;
        info!(
            "{} {}",
            fmt_primary("FastEdge"),
            fmt_dimmed("starting, press Ctrl-C to stop")
        );

        let run = TerminalRun::start(ctx.session_options(Arc::new(InquirePrompt)), &config)?;
        run.wait(true).await
    }

    /// Starts the session in the background, returns once it is initialized
    pub(crate) async fn spawn(&self, ctx: &ExtensionContext) -> Result<()> {
        let config = self.launch_configuration(ctx.workspace_root())?;
        let prompt: Arc<dyn ContextPrompt> = Arc::new(NoPrompt);

        let mut run = TerminalRun::start(ctx.session_options(prompt), &config)?;
        run.wait_initialized().await?;
        tokio::spawn(async move {
            if let Err(e) = run.wait(false).await {
                warn!("FastEdge app failed: {e:#}");
            }
        });

        Ok(())
    }

    fn debug_context(&self) -> Option<DebugContext> {
        if self.workspace {
            Some(DebugContext::Workspace)
        } else if self.file.is_some() {
            Some(DebugContext::File)
        } else {
            None
        }
    }

    /// The `fastedge` entry of launch.json (or the default entry) with the editor
    /// variables filled in for this run
    pub(crate) fn launch_configuration(&self, workspace: &Utf8Path) -> Result<LaunchConfiguration> {
        let path = LaunchJson::default_path(workspace);
        let stored = if path.exists() {
            LaunchJson::load(&path)?.fastedge_launch()?
        } else {
            None
        };
        let mut config = stored.unwrap_or_else(|| {
            debug!("No fastedge launch configuration, using defaults");
            LaunchConfiguration::template()
        });

        config.program = Some("${file}".into());
        config.debug_context = self.debug_context().or(config.debug_context);

        let file = self.file.as_ref().map(|file| {
            if file.is_absolute() {
                file.clone()
            } else {
                workspace.join(file)
            }
        });
        let mut config = config.substitute_variables(file.as_deref(), workspace);

        if config.cwd.is_none() {
            config.cwd = Some(workspace.to_path_buf());
        }
        if config.program.is_none() && config.language_id.is_none() {
            config.language_id = workspace_language_id(workspace).map(String::from);
        }

        Ok(config)
    }
}

/// Language of a workspace without an active file, from its manifest
fn workspace_language_id(workspace: &Utf8Path) -> Option<&'static str> {
    if workspace.join("Cargo.toml").is_file() {
        Some("rust")
    } else if workspace.join("package.json").is_file() {
        Some("javascript")
    } else {
        None
    }
}

/// A debug session driven from the terminal instead of an editor
struct TerminalRun {
    requests: mpsc::UnboundedSender<ClientRequest>,
    outgoing: mpsc::UnboundedReceiver<OutgoingMessage>,
    task: JoinHandle<SessionState>,
    seq: i64,
    disconnecting: bool,
    exited: bool,
    failure: Option<String>,
}

impl TerminalRun {
    fn start(options: SessionOptions, config: &LaunchConfiguration) -> Result<Self> {
        let SessionHandle {
            requests,
            outgoing,
            task,
        } = DebugSession::new(options).start();

        let mut run = Self {
            requests,
            outgoing,
            task,
            seq: 0,
            disconnecting: false,
            exited: false,
            failure: None,
        };
        run.send(
            "initialize",
            Some(json!({ "clientID": "fastedge-cli", "adapterID": DEBUG_TYPE })),
        )?;
        run.send("launch", Some(serde_json::to_value(config)?))?;
        run.send("configurationDone", None)?;

        Ok(run)
    }

    fn send(&mut self, command: &str, arguments: Option<Value>) -> Result<()> {
        self.seq += 1;
        self.requests
            .send(ClientRequest::new(self.seq, command, arguments))
            .map_err(|_| anyhow!("Debug session has already finished"))
    }

    fn disconnect(&mut self) {
        if self.disconnecting {
            return;
        }
        self.disconnecting = true;
        if let Err(e) = self.send("disconnect", Some(json!({}))) {
            debug!("{e}");
        }
    }

    async fn wait_initialized(&mut self) -> Result<()> {
        while let Some(message) = self.outgoing.recv().await {
            let initialized = matches!(message, OutgoingMessage::Event(Event::Initialized));
            self.handle_message(message);
            if initialized {
                return Ok(());
            }
        }
        anyhow::bail!("Debug session ended before it was initialized")
    }

    fn handle_message(&mut self, message: OutgoingMessage) {
        match message {
            OutgoingMessage::Event(Event::Output(body)) => {
                print_output(body.category.as_ref(), &body.output);
            }
            OutgoingMessage::Event(Event::Exited(body)) => {
                self.exited = true;
                if body.exit_code != 0 && !self.disconnecting {
                    self.failure = Some(format!("FastEdge app exited with code {}", body.exit_code));
                }
            }
            OutgoingMessage::Event(Event::Terminated(_)) => {
                if !self.exited && !self.disconnecting && self.failure.is_none() {
                    self.failure = Some("FastEdge app did not start".into());
                }
                self.disconnect();
            }
            OutgoingMessage::Event(Event::Initialized) => debug!("Debug session initialized"),
            OutgoingMessage::Event(event) => debug!("Ignoring event {event:?}"),
            OutgoingMessage::Response { command, response } if !response.success => {
                let message = error_message(&response).unwrap_or_default();
                debug!("`{command}` failed: {message}");
                if command == "launch" && !self.disconnecting {
                    self.failure = Some(message);
                }
            }
            OutgoingMessage::Response { command, .. } => debug!("`{command}` succeeded"),
        }
    }

    /// Prints session output until it finishes, Ctrl-C disconnects when `handle_ctrl_c` is set
    async fn wait(mut self, handle_ctrl_c: bool) -> Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut watch_ctrl_c = handle_ctrl_c;

        loop {
            tokio::select! {
                message = self.outgoing.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
                result = &mut ctrl_c, if watch_ctrl_c => {
                    watch_ctrl_c = false;
                    match result {
                        Ok(()) => self.disconnect(),
                        Err(e) => warn!("Failed listening for Ctrl-C: {e}"),
                    }
                }
            }
        }

        let state = self.task.await.context("Debug session task failed")?;
        debug!("Debug session finished in state {state:?}");

        match self.failure {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

fn print_output(category: Option<&OutputEventCategory>, output: &str) {
    if output == CLEAR_CONSOLE {
        return;
    }
    match category {
        Some(OutputEventCategory::Stderr) => eprint!("{output}"),
        Some(OutputEventCategory::Important) => eprintln!("{}", fmt_error(output.trim_end())),
        _ => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout
                .write_all(output.as_bytes())
                .and_then(|()| stdout.flush())
            {
                debug!("Failed writing to stdout: {e}");
            }
        }
    }
}
