#![cfg(unix)]

use std::{fs, os::unix::fs::PermissionsExt, sync::Arc, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use fastedge_debug::{
    Breakpoint, BreakpointStore, Compiler, DebugSession, NoPrompt, Resolver, ResolverEnv,
    SessionHandle, SessionOptions, SharedBreakpoints, Toolchain,
    protocol::ClientRequest,
};
use serde_json::{Value, json};

struct Workspace {
    _dir: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("tools")).unwrap();
        Self { _dir: dir, root }
    }

    fn script(&self, name: &str, body: &str) -> Utf8PathBuf {
        let path = self.root.join("tools").join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn session(&self, cargo: &Utf8Path, npx: &Utf8Path) -> (SessionHandle, SharedBreakpoints) {
        let breakpoints = BreakpointStore::shared();
        let options = SessionOptions {
            resolver: Resolver::new(ResolverEnv::new(&self.root, "linux"), Arc::new(NoPrompt)),
            compiler: Compiler::new(Toolchain {
                cargo: cargo.to_string(),
                npx: npx.to_string(),
            }),
            breakpoints: breakpoints.clone(),
        };
        (DebugSession::new(options).start(), breakpoints)
    }
}

fn cargo_emitting(ws: &Workspace, artifact: &str) -> Utf8PathBuf {
    ws.script(
        "cargo",
        &format!(
            "echo 'Compiling app' >&2\n\
             echo '{{\"reason\":\"compiler-artifact\",\"filenames\":[\"/tmp/deps/libapp.rlib\"]}}'\n\
             echo '{{\"reason\":\"compiler-artifact\",\"filenames\":[\"{artifact}\"]}}'\n\
             echo '{{\"reason\":\"build-finished\",\"success\":true}}'"
        ),
    )
}

/// Next message from the session, as the client would see it on the wire
async fn next(handle: &mut SessionHandle) -> Value {
    tokio::time::timeout(Duration::from_secs(20), handle.outgoing.recv())
        .await
        .expect("timed out waiting for the session")
        .expect("session closed")
        .to_json(0)
        .unwrap()
}

/// Collects messages up to and including the first one matching `done`
async fn collect_until(handle: &mut SessionHandle, done: impl Fn(&Value) -> bool) -> Vec<Value> {
    let mut messages = vec![];
    loop {
        let message = next(handle).await;
        let finished = done(&message);
        messages.push(message);
        if finished {
            return messages;
        }
    }
}

fn is_response(command: &'static str) -> impl Fn(&Value) -> bool {
    move |m| m["type"] == "response" && m["command"] == command
}

fn is_event(m: &Value, event: &str) -> bool {
    m["type"] == "event" && m["event"] == event
}

fn is_terminated(m: &Value) -> bool {
    is_event(m, "terminated")
}

fn response<'a>(messages: &'a [Value], command: &'static str) -> &'a Value {
    messages
        .iter()
        .find(|m| is_response(command)(m))
        .unwrap_or_else(|| panic!("missing {command} response"))
}

fn output_text(messages: &[Value], wanted: &str) -> String {
    messages
        .iter()
        .filter(|m| is_event(m, "output") && m["body"]["category"] == wanted)
        .filter_map(|m| m["body"]["output"].as_str())
        .collect()
}

fn send(handle: &SessionHandle, seq: i64, command: &str, arguments: Value) {
    handle
        .requests
        .send(ClientRequest::new(seq, command, Some(arguments)))
        .unwrap();
}

async fn initialize(handle: &mut SessionHandle) {
    send(handle, 1, "initialize", json!({ "adapterID": "fastedge" }));
    collect_until(handle, |m| is_event(m, "initialized")).await;
}

fn launch(handle: &SessionHandle, args: Value) {
    send(handle, 2, "launch", args);
}

#[tokio::test]
async fn test_rust_launch_runs_cli_with_configured_args() {
    let ws = Workspace::new();
    fs::write(ws.root.join("src/lib.rs"), "").unwrap();
    let cargo = cargo_emitting(&ws, "/tmp/out.wasm");
    let cli = ws.script(
        "cli",
        "for arg in \"$@\"; do echo \"$arg\"; done\necho \"RUST_LOG=$RUST_LOG\"\nexit 0",
    );
    let (mut handle, _) = ws.session(&cargo, Utf8Path::new("npx"));

    initialize(&mut handle).await;
    launch(
        &handle,
        json!({
            "type": "fastedge",
            "request": "launch",
            "debugContext": "file",
            "cliPath": cli,
            "program": ws.root.join("src/lib.rs"),
            "cwd": ws.root,
            "port": 9090,
            "env": { "A": "1" }
        }),
    );

    let messages = collect_until(&mut handle, is_terminated).await;

    assert_eq!(response(&messages, "launch")["success"], true);

    let stdout = output_text(&messages, "stdout");
    assert!(stdout.contains("Compiling Rust binary...\n"));
    assert!(
        stdout.contains("http\n-p\n9090\n-w\n/tmp/out.wasm\n--env\nA=1\nRUST_LOG=info\n"),
        "unexpected cli output: {stdout}"
    );
    assert!(output_text(&messages, "stderr").contains("wasm build target: wasm32-wasip1"));

    let exited = messages
        .iter()
        .position(|m| is_event(m, "exited") && m["body"]["exitCode"] == 0)
        .expect("missing exited event");
    assert_eq!(exited, messages.len() - 2, "exited must directly precede terminated");
}

#[tokio::test]
async fn test_build_failure_never_spawns_cli() {
    let ws = Workspace::new();
    let cargo = ws.script("cargo", "echo 'error[E0000]: broken' >&2\nexit 101");
    let marker = ws.root.join("spawned");
    let cli = ws.script("cli", &format!("touch {marker}"));
    let (mut handle, _) = ws.session(&cargo, Utf8Path::new("npx"));

    initialize(&mut handle).await;
    launch(
        &handle,
        json!({
            "cliPath": cli,
            "program": ws.root.join("src/lib.rs"),
            "cwd": ws.root,
            "languageId": "rust"
        }),
    );

    let messages = collect_until(&mut handle, is_response("launch")).await;
    assert!(messages.iter().any(is_terminated));

    let stderr = output_text(&messages, "stderr");
    assert!(stderr.contains("Compile Error: Build exited with code 101: error[E0000]: broken"));
    assert!(stderr.ends_with("Compilation failed. Stopping debug session.\n"));
    assert_eq!(
        output_text(&messages, "important"),
        "Compile Error: View Debug Console"
    );

    send(&handle, 3, "disconnect", json!({}));
    collect_until(&mut handle, is_response("disconnect")).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_missing_artifact_is_reported() {
    let ws = Workspace::new();
    let cargo = ws.script("cargo", "echo '{\"reason\":\"build-finished\",\"success\":true}'");
    let (mut handle, _) = ws.session(&cargo, Utf8Path::new("npx"));

    initialize(&mut handle).await;
    launch(
        &handle,
        json!({ "cliPath": "/bin/true", "program": ws.root.join("src/lib.rs") }),
    );

    let messages = collect_until(&mut handle, is_response("launch")).await;
    assert!(
        output_text(&messages, "stderr")
            .contains("Compile Error: Build finished without producing a .wasm artifact")
    );
}

#[tokio::test]
async fn test_javascript_launch_adds_wasi_http() {
    let ws = Workspace::new();
    fs::write(ws.root.join("package.json"), r#"{"main":"src/index.js"}"#).unwrap();
    let npx = ws.script("npx", "echo \"$1 $2 $3\"");
    let cli = ws.script("cli", "echo \"$@\"");
    let (mut handle, _) = ws.session(Utf8Path::new("cargo"), &npx);

    initialize(&mut handle).await;
    launch(
        &handle,
        json!({
            "cliPath": cli,
            "entrypoint": "workspace",
            "program": ws.root.join("src/other.ts"),
            "cwd": ws.root,
            "geoIpHeaders": true
        }),
    );

    let messages = collect_until(&mut handle, is_terminated).await;
    let stdout = output_text(&messages, "stdout");
    let binary = ws.root.join(".vscode/bin/debugger.wasm");

    assert!(stdout.contains(&format!(
        "fastedge-build {} {binary}\n",
        ws.root.join("src/index.js")
    )));
    assert!(stdout.contains(&format!(
        "http -p 8181 -w {binary} --geo --wasi-http true\n"
    )));
    assert!(ws.root.join(".vscode/bin").is_dir());
}

#[tokio::test]
async fn test_disconnect_kills_runtime_and_restores_breakpoints() {
    let ws = Workspace::new();
    let cargo = cargo_emitting(&ws, "/tmp/out.wasm");
    let pid_file = ws.root.join("cli.pid");
    let cli = ws.script("cli", &format!("echo $$ > {pid_file}\necho ready\nexec sleep 30"));
    let (mut handle, breakpoints) = ws.session(&cargo, Utf8Path::new("npx"));

    BreakpointStore::lock(&breakpoints).set_source_breakpoints(
        ws.root.join("src/lib.rs"),
        vec![Breakpoint::Source {
            source: ws.root.join("src/lib.rs"),
            line: 12,
            column: None,
            condition: None,
            hit_condition: None,
            log_message: Some("hit".into()),
            enabled: true,
        }],
    );
    let before = BreakpointStore::lock(&breakpoints).all();

    initialize(&mut handle).await;
    launch(
        &handle,
        json!({ "cliPath": cli, "program": ws.root.join("src/lib.rs"), "cwd": ws.root }),
    );

    collect_until(&mut handle, |m| {
        is_event(m, "output") && m["body"]["output"].as_str().is_some_and(|o| o.contains("ready"))
    })
    .await;
    assert!(BreakpointStore::lock(&breakpoints).all().iter().all(|bp| !bp.enabled()));

    let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();

    send(&handle, 3, "disconnect", json!({}));
    let messages = collect_until(&mut handle, is_response("disconnect")).await;
    assert!(output_text(&messages, "stdout").contains("FastEdge App stopping...\n"));
    assert_eq!(BreakpointStore::lock(&breakpoints).all(), before);

    let mut gone = false;
    for _ in 0..50 {
        if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(gone, "runtime process {pid} is still alive");
}

#[tokio::test]
async fn test_spawn_failure_terminates() {
    let ws = Workspace::new();
    let cargo = cargo_emitting(&ws, "/tmp/out.wasm");
    let (mut handle, _) = ws.session(&cargo, Utf8Path::new("npx"));

    initialize(&mut handle).await;
    launch(
        &handle,
        json!({
            "cliPath": ws.root.join("tools/missing-cli"),
            "program": ws.root.join("src/lib.rs")
        }),
    );

    let messages = collect_until(&mut handle, is_response("launch")).await;
    assert!(messages.iter().any(is_terminated));
    assert!(output_text(&messages, "stderr").contains("Launch Error: Failed to spawn"));
    assert_eq!(messages.last().unwrap()["success"], false);
}

#[tokio::test]
async fn test_unsupported_platform_stops_before_compiling() {
    let ws = Workspace::new();
    let marker = ws.root.join("compiled");
    let cargo = ws.script("cargo", &format!("touch {marker}"));

    let options = SessionOptions {
        resolver: Resolver::new(ResolverEnv::new(&ws.root, "freebsd"), Arc::new(NoPrompt)),
        compiler: Compiler::new(Toolchain {
            cargo: cargo.to_string(),
            npx: "npx".into(),
        }),
        breakpoints: BreakpointStore::shared(),
    };
    let mut handle = DebugSession::new(options).start();

    initialize(&mut handle).await;
    launch(&handle, json!({ "program": ws.root.join("src/lib.rs") }));

    let messages = collect_until(&mut handle, is_response("launch")).await;
    assert!(
        output_text(&messages, "stderr")
            .contains("Compile Error: Unsupported platform: freebsd")
    );
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_disconnect_while_compiling() {
    let ws = Workspace::new();
    let cargo = ws.script(
        "cargo",
        "sleep 1\necho '{\"reason\":\"compiler-artifact\",\"filenames\":[\"/tmp/out.wasm\"]}'",
    );
    let marker = ws.root.join("spawned");
    let cli = ws.script("cli", &format!("touch {marker}"));
    let (mut handle, _) = ws.session(&cargo, Utf8Path::new("npx"));

    initialize(&mut handle).await;
    launch(
        &handle,
        json!({ "cliPath": cli, "program": ws.root.join("src/lib.rs"), "cwd": ws.root }),
    );
    collect_until(&mut handle, |m| {
        m["body"]["output"] == "Compiling Rust binary...\n"
    })
    .await;

    send(&handle, 3, "disconnect", json!({}));
    let messages = collect_until(&mut handle, is_response("disconnect")).await;

    let launch = response(&messages, "launch");
    assert_eq!(launch["success"], false);
    assert_eq!(launch["message"], "Debug session stopped");
    assert_eq!(messages.last().unwrap()["success"], true);

    // the build outlives the session, its result must be dropped
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_breakpoints_changed_while_running_are_reverted() {
    let ws = Workspace::new();
    let cargo = cargo_emitting(&ws, "/tmp/out.wasm");
    let cli = ws.script("cli", "echo ready\nexec sleep 30");
    let (mut handle, breakpoints) = ws.session(&cargo, Utf8Path::new("npx"));

    let lib = ws.root.join("src/lib.rs");
    BreakpointStore::lock(&breakpoints).set_function_breakpoints(vec![Breakpoint::Function {
        name: "handle_request".into(),
        condition: Some("x > 1".into()),
        hit_condition: None,
        enabled: true,
    }]);
    let before = BreakpointStore::lock(&breakpoints).all();

    initialize(&mut handle).await;
    launch(&handle, json!({ "cliPath": cli, "program": lib, "cwd": ws.root }));
    collect_until(&mut handle, |m| {
        m["body"]["output"].as_str().is_some_and(|o| o.contains("ready"))
    })
    .await;

    send(
        &handle,
        3,
        "setBreakpoints",
        json!({ "source": { "path": lib }, "breakpoints": [{ "line": 4 }, { "line": 9 }] }),
    );
    collect_until(&mut handle, is_response("setBreakpoints")).await;
    send(
        &handle,
        4,
        "setFunctionBreakpoints",
        json!({ "breakpoints": [{ "name": "main" }] }),
    );
    collect_until(&mut handle, is_response("setFunctionBreakpoints")).await;
    assert_eq!(BreakpointStore::lock(&breakpoints).len(), 3);

    send(&handle, 5, "disconnect", json!({}));
    collect_until(&mut handle, is_response("disconnect")).await;
    assert_eq!(BreakpointStore::lock(&breakpoints).all(), before);
}
