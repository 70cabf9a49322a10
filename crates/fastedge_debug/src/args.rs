use camino::Utf8Path;
use fastedge_config::{BinaryInfo, Language, LaunchConfiguration};
use indexmap::IndexMap;

fn push_pairs(args: &mut Vec<String>, flag: &str, pairs: Option<&IndexMap<String, String>>) {
    for (key, value) in pairs.into_iter().flatten() {
        args.push(flag.to_string());
        args.push(format!("{key}={value}"));
    }
}

/// Argument vector for the runtime CLI's `http` subcommand.
///
/// The CLI is spawned without a shell, so `key=value` pairs are passed as
/// single unquoted arguments. Map flags keep the configured key order.
pub fn build_cli_args(
    config: &LaunchConfiguration,
    binary: &BinaryInfo,
    dotenv: Option<&Utf8Path>,
) -> Vec<String> {
    let mut args = vec![
        "http".to_string(),
        "-p".to_string(),
        config.port().to_string(),
        "-w".to_string(),
        binary.path.to_string(),
    ];
    args.extend(config.args.iter().cloned());

    if config.geo_ip_headers {
        args.push("--geo".into());
    }
    if let Some(limit) = config.memory_limit {
        args.push("-m".into());
        args.push(limit.to_string());
    }
    if binary.lang == Language::Javascript {
        args.push("--wasi-http".into());
        args.push("true".into());
    }

    push_pairs(&mut args, "--env", config.env.as_ref());
    push_pairs(&mut args, "--headers", config.headers.as_ref());
    push_pairs(&mut args, "--secret", config.secrets.as_ref());
    push_pairs(&mut args, "--response-headers", config.response_headers.as_ref());

    if let Some(dir) = dotenv {
        args.push("--dotenv".into());
        args.push(dir.to_string());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rust_binary() -> BinaryInfo {
        BinaryInfo::new("/tmp/out.wasm", Language::Rust)
    }

    #[test]
    fn test_minimal_args() {
        let args = build_cli_args(&LaunchConfiguration::default(), &rust_binary(), None);
        assert_eq!(args, vec!["http", "-p", "8181", "-w", "/tmp/out.wasm"]);
    }

    #[test]
    fn test_port_and_env() {
        let config = LaunchConfiguration {
            port: Some(9090),
            env: Some(IndexMap::from([("A".to_string(), "1".to_string())])),
            ..Default::default()
        };
        let args = build_cli_args(&config, &rust_binary(), None);
        assert_eq!(
            args,
            vec!["http", "-p", "9090", "-w", "/tmp/out.wasm", "--env", "A=1"]
        );
    }

    #[test]
    fn test_full_order() {
        let config = LaunchConfiguration {
            args: vec!["--verbose".into()],
            geo_ip_headers: true,
            memory_limit: Some(128),
            env: Some(IndexMap::from([
                ("Z".to_string(), "last".to_string()),
                ("A".to_string(), "first".to_string()),
            ])),
            headers: Some(IndexMap::from([(
                "x-test".to_string(),
                "a b".to_string(),
            )])),
            secrets: Some(IndexMap::from([("TOKEN".to_string(), "s".to_string())])),
            response_headers: Some(IndexMap::from([(
                "cache-control".to_string(),
                "no-store".to_string(),
            )])),
            ..Default::default()
        };
        let binary = BinaryInfo::new("/ws/.vscode/bin/debugger.wasm", Language::Javascript);
        let args = build_cli_args(&config, &binary, Some(Utf8Path::new("/ws")));

        assert_eq!(
            args,
            vec![
                "http",
                "-p",
                "8181",
                "-w",
                "/ws/.vscode/bin/debugger.wasm",
                "--verbose",
                "--geo",
                "-m",
                "128",
                "--wasi-http",
                "true",
                "--env",
                "Z=last",
                "--env",
                "A=first",
                "--headers",
                "x-test=a b",
                "--secret",
                "TOKEN=s",
                "--response-headers",
                "cache-control=no-store",
                "--dotenv",
                "/ws",
            ]
        );
    }

    #[test]
    fn test_deterministic() {
        let config = LaunchConfiguration {
            headers: Some(IndexMap::from([
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
            ])),
            ..Default::default()
        };
        let first = build_cli_args(&config, &rust_binary(), None);
        let second = build_cli_args(&config, &rust_binary(), None);
        assert_eq!(first, second);
    }
}
