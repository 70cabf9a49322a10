use std::{fs::OpenOptions, io::Write};

use env_logger::{Target, WriteStyle};
use fastedge_config::logger::{LogLevel, LoggerConfig};

const WHITELISTED_CRATES: &[&str] = &["fastedge", "fastedge_config", "fastedge_debug"];

pub(crate) fn default_env_filter(level: &str) -> String {
    let mut filters: Vec<String> = WHITELISTED_CRATES
        .iter()
        .map(|crate_name| format!("{crate_name}={level}"))
        .collect();

    // Set default level for all other crates to warn
    filters.insert(0, "warn".to_string());

    filters.join(",")
}

/// Initializes `env_logger`, logs go to stderr or the configured file and never to stdout
pub(crate) fn init_cli_logger(cfg: &LoggerConfig) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_env_filter(cfg.level.as_str())),
    );
    builder.target(Target::Stderr);

    if let Some(path) = &cfg.file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("fastedge: Failed opening log file {path}: {e}"),
        }
    }

    if !cfg.colors || cfg.file.is_some() {
        builder.write_style(WriteStyle::Never);
    }

    // For INFO and below on a terminal, only include/colorize WARN and ERROR levels
    if cfg.level >= LogLevel::Info && cfg.file.is_none() {
        builder.format(|buf, record| {
            if record.level() == tracing::log::Level::Info {
                writeln!(buf, "{}", record.args())
            } else {
                let log_style = buf.default_level_style(record.level());
                writeln!(
                    buf,
                    "{log_style}[{}]{log_style:#} {}",
                    record.level(),
                    record.args()
                )
            }
        });
    }

    if let Err(e) = builder.try_init() {
        eprintln!("fastedge: Failed initializing env_logger: {e:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_env_filter() {
        assert_eq!(
            default_env_filter("debug"),
            "warn,fastedge=debug,fastedge_config=debug,fastedge_debug=debug"
        );
    }
}
