pub mod commands;
pub mod extension;
pub mod utils;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use fastedge_config::logger::LoggerConfig;
use fastedge_debug::ResolverEnv;

use crate::{
    commands::{
        autorun::AutorunCmd, codespace_secret::CodespaceSecretCmd, dap::DapCmd,
        launch_json::LaunchJsonCmd, mcp_json::McpJsonCmd, run::RunCmd,
    },
    extension::ExtensionContext,
    utils::logger::init_cli_logger,
};

#[derive(Parser)]
#[command(name = "fastedge")]
#[command(version)]
#[command(about = "FastEdge - debug edge functions locally")]
#[command(
    long_about = "Compiles FastEdge edge functions written in Rust or Javascript to WebAssembly and serves \
them locally through the FastEdge runtime CLI.\n\n\
Editors talk to the debug adapter with `fastedge dap`, the remaining commands set up a workspace \
(launch.json, mcp.json, Codespace secrets) or run an app straight from the terminal."
)]
#[command(after_help = "EXAMPLES:\n  \
    fastedge launch-json\n  \
    fastedge run src/lib.rs\n  \
    fastedge run --workspace\n  \
    fastedge mcp-json --api-url https://api.gcore.com\n  \
    fastedge dap --log-file /tmp/fastedge-dap.log\n\
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root, defaults to the current directory
    #[arg(long, short = 'C', global = true, env = "FASTEDGE_WORKSPACE")]
    pub workspace_root: Option<Utf8PathBuf>,

    /// Directory holding the bundled runtime CLIs, defaults to the directory of this executable
    #[arg(long, global = true, env = "FASTEDGE_EXTENSION_DIR")]
    pub extension_dir: Option<Utf8PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<Utf8PathBuf>,

    /// No logging except for errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Verbose logging (-v) or trace logging (-vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    pub fn logger_config(&self) -> LoggerConfig {
        let mut cfg = LoggerConfig::from_verbosity(self.verbose, self.quiet);
        cfg.file.clone_from(&self.log_file);
        // adapter stderr ends up in the editor's output panel
        cfg.colors = !matches!(self.command, Commands::Dap(_));
        cfg
    }

    /// Absolute workspace root
    ///
    /// # Errors
    ///
    /// This function will return an error if the current directory is not valid UTF-8
    pub fn workspace_root(&self) -> Result<Utf8PathBuf> {
        let cwd = Utf8PathBuf::try_from(std::env::current_dir()?)
            .context("Current directory is not valid UTF-8")?;
        Ok(match &self.workspace_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => cwd.join(root),
            None => cwd,
        })
    }

    fn resolver_env(&self) -> ResolverEnv {
        let mut env = ResolverEnv::current();
        if let Some(dir) = &self.extension_dir {
            env.extension_dir.clone_from(dir);
        }
        env
    }

    #[allow(clippy::missing_errors_doc)]
    pub async fn handle(&self) -> Result<()> {
        init_cli_logger(&self.logger_config());

        let ctx = ExtensionContext::new(self.workspace_root()?, self.resolver_env());

        match &self.command {
            Commands::Dap(cmd) => cmd.handle(&ctx).await?,
            Commands::LaunchJson(cmd) => cmd.handle(&ctx.workspace_root)?,
            Commands::McpJson(cmd) => cmd.handle(&ctx.workspace_root)?,
            Commands::CodespaceSecret(cmd) => cmd.handle().await?,
            Commands::Run(cmd) => cmd.handle(&ctx).await?,
            Commands::Autorun(cmd) => cmd.handle(&ctx).await?,
        }

        Ok(())
    }
}

#[derive(Debug, Subcommand)]
#[command(styles=utils::styles::get_styles())]
pub enum Commands {
    /// Serve the debug adapter over stdio
    #[command(
        long_about = "Runs the FastEdge debug adapter, speaking the Debug Adapter Protocol over stdin/stdout. \
Logs are written to stderr or to --log-file."
    )]
    Dap(DapCmd),

    /// Generate .vscode/launch.json
    #[command(long_about = "Writes a launch.json holding the default FastEdge launch configuration.")]
    LaunchJson(LaunchJsonCmd),

    /// Add the FastEdge assistant to .vscode/mcp.json
    #[command(
        long_about = "Adds the containerized FastEdge assistant MCP server to mcp.json, keeping any other servers."
    )]
    McpJson(McpJsonCmd),

    /// Store the API token as a Codespace secret
    #[command(
        long_about = "Stores the FastEdge API token as the GCORE_API_TOKEN Codespace secret through the GitHub CLI. \
Only available inside a GitHub Codespace."
    )]
    CodespaceSecret(CodespaceSecretCmd),

    /// Compile and serve a file or the workspace
    #[command(
        long_about = "Compiles the given file (or the whole workspace) and serves it through the FastEdge runtime CLI \
until Ctrl-C is pressed. Settings are taken from the fastedge entry of launch.json when present."
    )]
    Run(RunCmd),

    /// Execute commands written to the trigger file
    #[command(
        long_about = "Watches .vscode/.fastedge-run-command and executes the command written to it. \
The file holds either a command id or {\"command\": id, \"args\": [...]}."
    )]
    Autorun(AutorunCmd),
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastedge_config::logger::LogLevel;

    #[test]
    fn test_dap_logger_config() {
        let cli = Cli::parse_from(["fastedge", "dap", "-vv", "--log-file", "/tmp/dap.log"]);
        let cfg = cli.logger_config();
        assert_eq!(cfg.level, LogLevel::Trace);
        assert!(!cfg.colors);
        assert_eq!(cfg.file, Some(Utf8PathBuf::from("/tmp/dap.log")));

        let cli = Cli::parse_from(["fastedge", "-q", "launch-json"]);
        let cfg = cli.logger_config();
        assert_eq!(cfg.level, LogLevel::Warn);
        assert!(cfg.colors);
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_workspace_root() {
        let cli = Cli::parse_from(["fastedge", "-C", "/srv/app", "run"]);
        assert_eq!(cli.workspace_root().unwrap(), Utf8PathBuf::from("/srv/app"));

        let cli = Cli::parse_from(["fastedge", "run", "--workspace-root", "app"]);
        assert!(cli.workspace_root().unwrap().is_absolute());
        assert!(cli.workspace_root().unwrap().ends_with("app"));
    }

    #[test]
    fn test_run_file_conflicts_with_workspace() {
        assert!(Cli::try_parse_from(["fastedge", "run", "--workspace", "src/lib.rs"]).is_err());
    }
}
