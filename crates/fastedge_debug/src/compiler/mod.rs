//! Builds edge-function sources into a WebAssembly binary.
//!
//! The build tools themselves are external processes, only their exit status and
//! (for cargo) their json message stream are inspected.

mod javascript;
mod rust;
mod rust_config;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use fastedge_config::{BinaryInfo, DebugContext, Language};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use crate::{error::DebugError, protocol::OutputEventCategory};

pub use rust::find_wasm_artifact;
pub use rust_config::{DEFAULT_WASI_TARGET, find_cargo_config, wasi_target};

/// Receives console output produced while building
pub type ConsoleSink = Arc<dyn Fn(String, OutputEventCategory) + Send + Sync>;

/// Programs used to build sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub cargo: String,
    pub npx: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            cargo: "cargo".into(),
            npx: "npx".into(),
        }
    }
}

/// What the client currently has open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceContext {
    pub active_file: Option<Utf8PathBuf>,
    pub language_id: Option<String>,
    pub workspace_root: Option<Utf8PathBuf>,
}

impl SourceContext {
    /// Language of the active file, from the explicit id or the file extension
    ///
    /// # Errors
    ///
    /// This function will return an error if the language is neither Rust nor Javascript
    pub fn language(&self) -> Result<Language, DebugError> {
        let id = self.language_id.clone().or_else(|| {
            self.active_file
                .as_deref()
                .and_then(fastedge_config::language_id_for_path)
                .map(String::from)
        });

        id.as_deref()
            .and_then(Language::from_language_id)
            .ok_or(DebugError::UnsupportedLanguage(id))
    }

    fn workspace(&self) -> Result<&Utf8Path, DebugError> {
        self.workspace_root
            .as_deref()
            .ok_or(DebugError::NoActiveSource)
    }

    fn active_file(&self) -> Result<&Utf8Path, DebugError> {
        self.active_file.as_deref().ok_or(DebugError::NoActiveSource)
    }

    /// Directory the build runs in
    ///
    /// # Errors
    ///
    /// This function will return an error if the context has no usable path
    pub fn source_dir(&self, context: DebugContext) -> Result<Utf8PathBuf, DebugError> {
        match context {
            DebugContext::Workspace => Ok(self.workspace()?.to_path_buf()),
            DebugContext::File => self
                .active_file()?
                .parent()
                .map(Utf8Path::to_path_buf)
                .ok_or(DebugError::NoActiveSource),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    toolchain: Toolchain,
}

impl Compiler {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    /// Builds the active source and returns the produced binary
    ///
    /// # Errors
    ///
    /// This function will return an error if the language is unsupported, the
    /// build tool fails, or no artifact is produced
    pub async fn compile(
        &self,
        context: DebugContext,
        source: &SourceContext,
        sink: &ConsoleSink,
    ) -> Result<BinaryInfo, DebugError> {
        let lang = source.language()?;
        debug!("Compiling {lang} sources for {context} context");

        let path = match lang {
            Language::Rust => {
                let dir = source.source_dir(context)?;
                rust::build(&self.toolchain.cargo, &dir, sink).await?
            }
            Language::Javascript => {
                javascript::build(&self.toolchain.npx, context, source, sink).await?
            }
        };

        Ok(BinaryInfo::new(path, lang))
    }
}

/// Forwards each line of a build tool's stream to the console and returns everything read.
///
/// Lines are decoded one by one, invalid UTF-8 in one line does not stop the relay.
pub(crate) async fn relay_lines<R>(
    stream: R,
    sink: ConsoleSink,
    category: OutputEventCategory,
) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut collected = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                sink(text.to_string(), category.clone());
                collected.push_str(&text);
            }
            Err(e) => {
                debug!("Stopped reading build output: {e}");
                break;
            }
        }
    }

    collected
}
