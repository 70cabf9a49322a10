use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::DebugError;

pub const DEFAULT_WASI_TARGET: &str = "wasm32-wasip1";

#[derive(Debug, Default, Deserialize)]
struct CargoConfig {
    #[serde(default)]
    build: Option<BuildSection>,
}

#[derive(Debug, Default, Deserialize)]
struct BuildSection {
    #[serde(default)]
    target: Option<String>,
}

/// Nearest `.cargo/config.toml`, searched upward from `start`
pub fn find_cargo_config(start: &Utf8Path) -> Option<Utf8PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".cargo").join("config.toml"))
        .find(|candidate| candidate.is_file())
}

async fn read_target(path: &Utf8Path) -> Result<Option<String>, DebugError> {
    let contents = tokio::fs::read_to_string(path).await?;
    let config: CargoConfig = toml::from_str(&contents).map_err(|e| DebugError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(config.build.and_then(|b| b.target))
}

/// WASI target for a build started in `start`.
///
/// Falls back to [`DEFAULT_WASI_TARGET`] when no config file exists or it can not
/// be read, the error is returned alongside so it can be reported.
pub async fn wasi_target(start: &Utf8Path) -> (String, Option<DebugError>) {
    let Some(path) = find_cargo_config(start) else {
        return (
            DEFAULT_WASI_TARGET.into(),
            Some(DebugError::Manifest {
                path: start.join(".cargo").join("config.toml"),
                reason: "No .cargo/config.toml found".into(),
            }),
        );
    };

    match read_target(&path).await {
        Ok(target) => (target.unwrap_or_else(|| DEFAULT_WASI_TARGET.into()), None),
        Err(e) => (DEFAULT_WASI_TARGET.into(), Some(e)),
    }
}
