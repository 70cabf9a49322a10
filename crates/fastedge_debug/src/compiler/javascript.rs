use std::process::Stdio;

use camino::{Utf8Path, Utf8PathBuf};
use fastedge_config::{DebugContext, VSCODE_DIR};
use serde::Deserialize;
use tokio::process::Command;
use tracing::info;

use super::{ConsoleSink, SourceContext, relay_lines};
use crate::{error::DebugError, protocol::OutputEventCategory};

const BINARY_NAME: &str = "debugger.wasm";

#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(default)]
    main: Option<String>,
}

/// `main` entry of the workspace `package.json`, empty when unset
async fn package_entry_point(workspace: &Utf8Path) -> Result<String, DebugError> {
    let path = workspace.join("package.json");
    let contents = tokio::fs::read_to_string(&path).await.map_err(|e| DebugError::Manifest {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let package: PackageJson = serde_json::from_str(&contents).map_err(|e| DebugError::Manifest {
        path,
        reason: e.to_string(),
    })?;
    Ok(package.main.unwrap_or_default())
}

pub(super) async fn entry_point(
    context: DebugContext,
    source: &SourceContext,
) -> Result<Utf8PathBuf, DebugError> {
    match context {
        DebugContext::File => Ok(source.active_file()?.to_path_buf()),
        DebugContext::Workspace => {
            let workspace = source.workspace()?;
            Ok(workspace.join(package_entry_point(workspace).await?))
        }
    }
}

/// Runs `npx fastedge-build` and returns `<workspace>/.vscode/bin/debugger.wasm`
pub(super) async fn build(
    npx: &str,
    context: DebugContext,
    source: &SourceContext,
    sink: &ConsoleSink,
) -> Result<Utf8PathBuf, DebugError> {
    let workspace = source.workspace()?;
    let bin_dir = workspace.join(VSCODE_DIR).join("bin");
    tokio::fs::create_dir_all(&bin_dir).await?;

    let entry = entry_point(context, source).await?;
    let output = bin_dir.join(BINARY_NAME);

    let mut child = Command::new(npx)
        .arg("fastedge-build")
        .arg(entry.as_str())
        .arg(output.as_str())
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DebugError::ProcessSpawn {
            program: npx.to_string(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        DebugError::Io(std::io::Error::other("build stdout was not captured"))
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        DebugError::Io(std::io::Error::other("build stderr was not captured"))
    })?;

    let stdout_task = tokio::spawn(relay_lines(stdout, sink.clone(), OutputEventCategory::Stdout));
    let stderr_task = tokio::spawn(relay_lines(stderr, sink.clone(), OutputEventCategory::Stderr));

    let status = child.wait().await?;
    let _ = stdout_task.await;
    let stderr_output = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(DebugError::BuildFailed {
            exit_code: status.code(),
            stderr: stderr_output,
        });
    }

    info!("Built {output}");
    Ok(output)
}
