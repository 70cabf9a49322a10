use camino::Utf8PathBuf;

/// Failures of the debug-session pipeline.
///
/// None of these are retried, the session reports them to the console and terminates.
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error(
        "Unsupported language {}, only Rust or Javascript files are supported",
        .0.as_deref().unwrap_or("(none)")
    )]
    UnsupportedLanguage(Option<String>),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("No program specified for debugging")]
    NoDebugTarget,

    #[error("No active file or workspace found")]
    NoActiveSource,

    #[error("Build exited with code {}: {stderr}", fmt_exit_code(*.exit_code))]
    BuildFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to parse build output: {0}")]
    BuildOutputParse(#[source] serde_json::Error),

    #[error("Build finished without producing a .wasm artifact")]
    NoArtifactFound,

    #[error("Failed to spawn `{program}`: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing launch configuration value: {0}")]
    MissingConfiguration(&'static str),

    #[error("Invalid project manifest {path}: {reason}")]
    Manifest { path: Utf8PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn fmt_exit_code(code: Option<i32>) -> String {
    code.map_or_else(|| "(signal)".to_string(), |c| c.to_string())
}
