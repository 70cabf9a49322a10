use std::process::Stdio;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tokio::{io::AsyncReadExt, process::Command};
use tracing::{debug, info};

use super::{ConsoleSink, relay_lines, rust_config};
use crate::{error::DebugError, protocol::OutputEventCategory};

const COMPILER_ARTIFACT: &str = "compiler-artifact";

/// The part of a cargo json message needed to locate the binary
#[derive(Debug, Deserialize)]
struct CargoMessage {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    filenames: Option<Vec<Utf8PathBuf>>,
}

/// Scans cargo's `--message-format=json` output for the produced `.wasm` file.
///
/// Blank lines are skipped, the first unparsable line aborts the scan. The first
/// `compiler-artifact` message with exactly one `.wasm` filename wins.
///
/// # Errors
///
/// This function will return an error if a line is not json or no artifact is found
pub fn find_wasm_artifact(stdout: &str) -> Result<Utf8PathBuf, DebugError> {
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let message: CargoMessage =
            serde_json::from_str(line).map_err(DebugError::BuildOutputParse)?;

        if message.reason.as_deref() != Some(COMPILER_ARTIFACT) {
            continue;
        }
        if let Some([filename]) = message.filenames.as_deref()
            && filename.extension() == Some("wasm")
        {
            return Ok(filename.clone());
        }
    }

    Err(DebugError::NoArtifactFound)
}

/// Runs `cargo build` in `dir` and returns the path of the produced binary
pub(super) async fn build(
    cargo: &str,
    dir: &Utf8Path,
    sink: &ConsoleSink,
) -> Result<Utf8PathBuf, DebugError> {
    sink("Compiling Rust binary...\n".into(), OutputEventCategory::Stdout);

    let (target, config_err) = rust_config::wasi_target(dir).await;
    if let Some(e) = config_err {
        debug!("Cargo config lookup failed: {e}");
        sink(
            format!("Failed to read or parse config.toml (fallback target: {target})\n"),
            OutputEventCategory::Stderr,
        );
    }
    sink(format!("wasm build target: {target}\n"), OutputEventCategory::Stderr);

    let mut child = Command::new(cargo)
        .args(["build", "--message-format=json"])
        .arg(format!("--target={target}"))
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DebugError::ProcessSpawn {
            program: cargo.to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        DebugError::Io(std::io::Error::other("cargo stdout was not captured"))
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        DebugError::Io(std::io::Error::other("cargo stderr was not captured"))
    })?;

    let stderr_task = tokio::spawn(relay_lines(stderr, sink.clone(), OutputEventCategory::Stdout));

    let mut output = Vec::new();
    stdout.read_to_end(&mut output).await?;
    let status = child.wait().await?;
    let stderr_output = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(DebugError::BuildFailed {
            exit_code: status.code(),
            stderr: stderr_output,
        });
    }

    let artifact = find_wasm_artifact(&String::from_utf8_lossy(&output))?;
    info!("Built {artifact}");
    Ok(artifact)
}
