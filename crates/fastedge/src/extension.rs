//! Start-up bindings: the `fastedge` debug type and the workspace commands.
//!
//! Everything is registered once into a [`Registry`] which the `dap` and `autorun`
//! commands look handlers up in.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use fastedge_config::DEBUG_TYPE;
use fastedge_debug::{
    BreakpointStore, Compiler, ContextPrompt, FastEdgeDescriptorFactory, NoPrompt, Registry,
    Resolver, ResolverEnv, SessionOptions, SharedBreakpoints,
};
use serde_json::Value;

use crate::commands::{
    codespace_secret::CodespaceSecretCmd, launch_json::LaunchJsonCmd, mcp_json::McpJsonCmd,
    run::RunCmd,
};

pub const SETUP_CODESPACE_SECRET: &str = "fastedge.setup-codespace-secret";
pub const GENERATE_LAUNCH_JSON: &str = "fastedge.generate-launch-json";
pub const GENERATE_MCP_JSON: &str = "fastedge.generate-mcp-json";
pub const RUN_FILE: &str = "fastedge.run-file";
pub const RUN_WORKSPACE: &str = "fastedge.run-workspace";

/// Host facts shared by every command of one process
#[derive(Debug, Clone)]
pub struct ExtensionContext {
    pub workspace_root: Utf8PathBuf,
    pub resolver_env: ResolverEnv,
    pub breakpoints: SharedBreakpoints,
}

impl ExtensionContext {
    pub fn new(workspace_root: impl Into<Utf8PathBuf>, resolver_env: ResolverEnv) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            resolver_env,
            breakpoints: BreakpointStore::shared(),
        }
    }

    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    pub fn session_options(&self, prompt: Arc<dyn ContextPrompt>) -> SessionOptions {
        SessionOptions {
            resolver: Resolver::new(self.resolver_env.clone(), prompt),
            compiler: Compiler::default(),
            breakpoints: self.breakpoints.clone(),
        }
    }
}

/// Builds the registry for this process.
///
/// Sessions created through the registered factory never prompt: their stdin carries
/// the debug protocol.
pub fn activate(ctx: &ExtensionContext) -> Registry {
    let mut registry = Registry::new();

    registry.register_debug_type(
        DEBUG_TYPE,
        Arc::new(FastEdgeDescriptorFactory::new(
            ctx.session_options(Arc::new(NoPrompt)),
        )),
    );

    registry.register_command(SETUP_CODESPACE_SECRET, |_args| async move {
        CodespaceSecretCmd::default().handle().await
    });

    let workspace = ctx.workspace_root.clone();
    registry.register_command(GENERATE_LAUNCH_JSON, move |_args| {
        let workspace = workspace.clone();
        async move { LaunchJsonCmd::default().handle(&workspace) }
    });

    let workspace = ctx.workspace_root.clone();
    registry.register_command(GENERATE_MCP_JSON, move |_args| {
        let workspace = workspace.clone();
        async move { McpJsonCmd::default().handle(&workspace) }
    });

    let run_ctx = ctx.clone();
    registry.register_command(RUN_FILE, move |args| {
        let ctx = run_ctx.clone();
        async move {
            let cmd = RunCmd {
                workspace: false,
                file: file_argument(&args),
            };
            cmd.spawn(&ctx).await
        }
    });

    let run_ctx = ctx.clone();
    registry.register_command(RUN_WORKSPACE, move |_args| {
        let ctx = run_ctx.clone();
        async move {
            let cmd = RunCmd {
                workspace: true,
                file: None,
            };
            cmd.spawn(&ctx).await
        }
    });

    registry
}

/// First string argument of a command, used as the file to run
fn file_argument(args: &[Value]) -> Option<Utf8PathBuf> {
    args.first()
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(Utf8PathBuf::from)
}
