use anyhow::Result;
use camino::Utf8Path;
use clap::Parser;
use fastedge_config::LaunchJson;
use tracing::info;

use crate::{
    commands::USER_CANCELLED,
    utils::styles::{fmt_bold, fmt_dimmed, fmt_success},
};

#[derive(Debug, Clone, Default, Parser)]
pub struct LaunchJsonCmd {
    /// Overwrite an existing launch.json without asking
    #[arg(long, short)]
    pub yes: bool,
}

impl LaunchJsonCmd {
    pub(crate) fn handle(&self, workspace: &Utf8Path) -> Result<()> {
        let path = LaunchJson::default_path(workspace);

        if path.exists() {
            let overwrite = self.yes
                || inquire::Confirm::new(&format!(
                    "A launch configuration already exists at {}, overwrite it?",
                    fmt_dimmed(path.as_str())
                ))
                .with_default(false)
                .prompt()?;
            if !overwrite {
                anyhow::bail!(USER_CANCELLED)
            }
        }

        LaunchJson::generate()?.with_path(&path).save()?;
        info!(
            "{}",
            fmt_success(&format!(
                "{} written to {}",
                fmt_bold("launch.json"),
                fmt_dimmed(path.as_str())
            ))
        );

        Ok(())
    }
}
