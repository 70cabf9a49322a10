use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use fastedge_config::{DebugContext, LaunchConfiguration};
use tracing::debug;

use crate::error::DebugError;

/// Directory under the extension root holding the bundled runtime CLIs
const CLI_DIR: &str = "fastedge-cli";

/// Asks the user which context to debug when the configuration does not say
pub trait ContextPrompt: Send + Sync {
    /// `None` when the user dismisses the choice
    fn choose_debug_context(&self) -> Option<DebugContext>;
}

/// Prompt for non-interactive use, every question is dismissed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl ContextPrompt for NoPrompt {
    fn choose_debug_context(&self) -> Option<DebugContext> {
        None
    }
}

/// Host facts the resolver depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverEnv {
    pub extension_dir: Utf8PathBuf,
    pub os: String,
}

impl ResolverEnv {
    pub fn new(extension_dir: impl Into<Utf8PathBuf>, os: impl Into<String>) -> Self {
        Self {
            extension_dir: extension_dir.into(),
            os: os.into(),
        }
    }

    /// Directory of the running executable and the compile-time OS
    pub fn current() -> Self {
        let extension_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| Utf8PathBuf::from_path_buf(exe).ok())
            .and_then(|exe| exe.parent().map(Utf8Path::to_path_buf))
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        Self::new(extension_dir, std::env::consts::OS)
    }

    /// Bundled runtime CLI for this platform
    ///
    /// # Errors
    ///
    /// This function will return an error on platforms without a bundled CLI
    pub fn cli_path(&self) -> Result<Utf8PathBuf, DebugError> {
        let binary = match self.os.as_str() {
            "macos" => "cli-darwin-arm64",
            "linux" => "cli-linux-x64",
            other => return Err(DebugError::UnsupportedPlatform(other.to_string())),
        };
        Ok(self.extension_dir.join(CLI_DIR).join(binary))
    }
}

/// Fills the launch configuration defaults that depend on the host
#[derive(Clone)]
pub struct Resolver {
    env: ResolverEnv,
    prompt: Arc<dyn ContextPrompt>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("env", &self.env).finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(env: ResolverEnv, prompt: Arc<dyn ContextPrompt>) -> Self {
        Self { env, prompt }
    }

    /// Completes `debugContext` and `cliPath`, every other field passes through
    ///
    /// # Errors
    ///
    /// This function will return an error if the user dismisses the context
    /// prompt or the platform has no bundled CLI
    pub fn resolve(&self, mut config: LaunchConfiguration) -> Result<LaunchConfiguration, DebugError> {
        if config.debug_context.is_none() {
            config.debug_context = Some(self.debug_context(config.entrypoint.as_deref())?);
        }

        if config.cli_path.is_none() {
            config.cli_path = Some(self.env.cli_path()?);
        }

        debug!(
            "Resolved launch: context={:?} cli={:?}",
            config.debug_context, config.cli_path
        );
        Ok(config)
    }

    fn debug_context(&self, entrypoint: Option<&str>) -> Result<DebugContext, DebugError> {
        match entrypoint.map(str::to_lowercase).as_deref() {
            None | Some("file") => Ok(DebugContext::File),
            Some("workspace") => Ok(DebugContext::Workspace),
            Some(_) => self
                .prompt
                .choose_debug_context()
                .ok_or(DebugError::NoDebugTarget),
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ResolverEnv::current(), Arc::new(NoPrompt))
    }
}
