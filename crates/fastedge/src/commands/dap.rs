use anyhow::{Context, Result};
use clap::Parser;
use fastedge_config::DEBUG_TYPE;
use fastedge_debug::{DapServer, DebugAdapterDescriptor};
use tracing::{debug, info};

use crate::extension::{self, ExtensionContext};

#[derive(Debug, Clone, Default, Parser)]
pub struct DapCmd {}

impl DapCmd {
    pub(crate) async fn handle(&self, ctx: &ExtensionContext) -> Result<()> {
        let registry = extension::activate(ctx);
        let factory = registry.descriptor_factory(DEBUG_TYPE)?;

        match factory.create_descriptor() {
            DebugAdapterDescriptor::Inline(session) => {
                info!("FastEdge debug adapter listening on stdio");
                let state = DapServer::new(session)
                    .run(tokio::io::stdin(), tokio::io::stdout())
                    .await?;
                debug!("Debug session finished in state {state:?}");
                Ok(())
            }
            DebugAdapterDescriptor::Executable { command, args } => {
                run_executable(&command, &args).await
            }
        }
    }
}

/// Hands stdio over to an external adapter
async fn run_executable(command: &str, args: &[String]) -> Result<()> {
    info!("Starting debug adapter {command}");
    let status = tokio::process::Command::new(command)
        .args(args)
        .status()
        .await
        .context(format!("Failed starting debug adapter {command}"))?;

    if !status.success() {
        anyhow::bail!("Debug adapter {command} exited with {status}");
    }
    Ok(())
}
