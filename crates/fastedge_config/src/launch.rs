use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use tracing::debug;

use crate::{BinaryInfo, DEBUG_TYPE, DEFAULT_PORT, DebugContext, VSCODE_DIR};

const LAUNCH_REQUEST: &str = "launch";

/// `RUST_LOG` handed to the runtime CLI
const LOG_LEVEL: &str = "info";
const TRACE_LOG_LEVEL: &str = "info,http_service=trace";

/// `dotenv` accepts either a flag or a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DotenvSetting {
    Enabled(bool),
    Path(Utf8PathBuf),
}

/// Options of a single FastEdge debug launch.
///
/// Deserialized from launch request arguments (or a `launch.json` entry), unknown
/// keys are ignored so host-specific fields such as `__sessionId` pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfiguration {
    /// Runtime CLI executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<Utf8PathBuf>,

    /// Entry-point hint, "file" or "workspace"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    /// Anything other than "file" or "workspace" counts as unset
    #[serde(
        default,
        deserialize_with = "lenient_debug_context",
        skip_serializing_if = "Option::is_none"
    )]
    pub debug_context: Option<DebugContext>,

    /// Filled in after compilation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Extra arguments passed verbatim to the runtime CLI
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dotenv: Option<DotenvSetting>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<IndexMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<IndexMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<IndexMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<IndexMap<String, String>>,

    #[serde(default)]
    pub geo_ip_headers: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,

    #[serde(default)]
    pub trace_logging: bool,

    /// Active source file, usually `${file}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<Utf8PathBuf>,

    /// Workspace root, usually `${workspaceFolder}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<Utf8PathBuf>,

    /// Editor language identifier of the active file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,

    /// Disable all breakpoints for the duration of the session
    #[serde(default = "crate::defaults::default_true")]
    pub disable_breakpoints: bool,
}

impl Default for LaunchConfiguration {
    fn default() -> Self {
        Self {
            cli_path: None,
            entrypoint: None,
            debug_context: None,
            binary: None,
            port: None,
            args: vec![],
            dotenv: None,
            env: None,
            secrets: None,
            headers: None,
            response_headers: None,
            geo_ip_headers: false,
            memory_limit: None,
            trace_logging: false,
            program: None,
            cwd: None,
            language_id: None,
            disable_breakpoints: true,
        }
    }
}

impl LaunchConfiguration {
    /// Configuration written into freshly generated launch files
    pub fn template() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            dotenv: Some(DotenvSetting::Enabled(false)),
            env: Some(IndexMap::new()),
            secrets: Some(IndexMap::new()),
            headers: Some(IndexMap::new()),
            response_headers: Some(IndexMap::new()),
            program: Some("${file}".into()),
            cwd: Some("${workspaceFolder}".into()),
            ..Self::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Value of `RUST_LOG` for the runtime CLI
    pub fn rust_log(&self) -> &'static str {
        if self.trace_logging {
            TRACE_LOG_LEVEL
        } else {
            LOG_LEVEL
        }
    }

    /// Replaces the `${file}` and `${workspaceFolder}` placeholders an editor
    /// would substitute before launching
    #[must_use]
    pub fn substitute_variables(mut self, file: Option<&Utf8Path>, workspace: &Utf8Path) -> Self {
        let expand = |value: &str| -> Option<String> {
            let mut out = value.replace("${workspaceFolder}", workspace.as_str());
            if out.contains("${file}") {
                out = out.replace("${file}", file?.as_str());
            }
            Some(out)
        };
        let expand_path = |path: Option<Utf8PathBuf>| {
            path.and_then(|p| expand(p.as_str()).map(Utf8PathBuf::from))
        };

        self.program = expand_path(self.program.take());
        self.cwd = expand_path(self.cwd.take());
        self.cli_path = expand_path(self.cli_path.take());
        if let Some(DotenvSetting::Path(path)) = &self.dotenv {
            self.dotenv = expand(path.as_str()).map(|p| DotenvSetting::Path(p.into()));
        }
        self.args = self.args.iter().filter_map(|a| expand(a)).collect();
        self
    }

    /// Builds the configuration from DAP launch arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if the arguments do not match the schema
    pub fn from_arguments(args: Option<Value>) -> Result<Self> {
        match args {
            Some(v) => serde_json::from_value(v).context("Invalid launch configuration"),
            None => Ok(Self::default()),
        }
    }
}

fn lenient_debug_context<'de, D>(deserializer: D) -> Result<Option<DebugContext>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match serde_json::from_value(v.clone()) {
        Ok(context) => Some(context),
        Err(_) => {
            debug!("Ignoring unknown debugContext {v}");
            None
        }
    }))
}

/// Single entry of `launch.json`'s `configurations` list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchEntry {
    #[serde(rename = "type")]
    pub debug_type: String,
    pub name: String,
    pub request: String,
    #[serde(flatten)]
    pub config: LaunchConfiguration,
}

impl LaunchEntry {
    pub fn fastedge(name: &str, config: LaunchConfiguration) -> Self {
        Self {
            debug_type: DEBUG_TYPE.into(),
            name: name.into(),
            request: LAUNCH_REQUEST.into(),
            config,
        }
    }

    fn is_fastedge_launch(value: &Value) -> bool {
        value.get("type").and_then(Value::as_str) == Some(DEBUG_TYPE)
            && value.get("request").and_then(Value::as_str) == Some(LAUNCH_REQUEST)
    }
}

/// The editor's `launch.json` file.
///
/// Entries of other debug types are kept as raw json so they survive a round trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchJson {
    #[serde(skip)]
    path: Option<Utf8PathBuf>,

    #[serde(default = "crate::defaults::default_launch_version")]
    pub version: String,

    #[serde(default)]
    pub configurations: Vec<Value>,
}

impl Default for LaunchJson {
    fn default() -> Self {
        Self {
            path: None,
            version: crate::defaults::default_launch_version(),
            configurations: vec![],
        }
    }
}

impl LaunchJson {
    /// Launch file containing only the default FastEdge entry
    ///
    /// # Errors
    ///
    /// This function will return an error if the entry can not be serialized
    pub fn generate() -> Result<Self> {
        let entry = LaunchEntry::fastedge("FastEdge App", LaunchConfiguration::template());
        Ok(Self {
            configurations: vec![serde_json::to_value(entry)?],
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_path(mut self, path: &Utf8Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    /// `<workspace>/.vscode/launch.json`
    pub fn default_path(workspace: &Utf8Path) -> Utf8PathBuf {
        workspace.join(VSCODE_DIR).join("launch.json")
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Loads the launch file
    ///
    /// # Errors
    ///
    /// This function will return an error if the file does not exist or the content is invalid
    pub fn load(path: &Utf8Path) -> Result<Self> {
        debug!("Loading launch configuration from {path}");

        if !path.exists() {
            anyhow::bail!("Launch file does not exist: {path}");
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed reading launch file: {path}"))?;
        let mut launch: Self = serde_json::from_str(&contents)
            .context(format!("Failed loading launch file: {path}"))?;
        launch.path = Some(path.to_path_buf());

        Ok(launch)
    }

    /// Saves the launch file, creating the `.vscode` directory if needed
    ///
    /// # Errors
    ///
    /// This function will error if no path is set or it fails writing the file
    pub fn save(&self) -> Result<()> {
        let dest = self
            .path
            .as_ref()
            .context("Launch file has no destination path")?;
        debug!("Saving launch configuration to {dest}");

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).context(format!("Failed creating {parent}"))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(dest, contents).context(format!("Failed writing launch file: {dest}"))?;

        Ok(())
    }

    /// First `fastedge` launch configuration, if any
    ///
    /// # Errors
    ///
    /// This function will return an error if the matching entry does not match the schema
    pub fn fastedge_launch(&self) -> Result<Option<LaunchConfiguration>> {
        self.configurations
            .iter()
            .find(|c| LaunchEntry::is_fastedge_launch(c))
            .map(|c| {
                serde_json::from_value::<LaunchEntry>(c.clone())
                    .map(|entry| entry.config)
                    .context("Invalid fastedge launch configuration")
            })
            .transpose()
    }
}
