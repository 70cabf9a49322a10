//! The FastEdge debug session.
//!
//! A session is an actor: one task owns the state and reacts to client requests,
//! compile results and runtime process events in arrival order.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use dap::{
    responses::{
        BreakpointLocationsResponse, SetBreakpointsResponse, SetDataBreakpointsResponse,
        SetExceptionBreakpointsResponse, SetFunctionBreakpointsResponse,
        SetInstructionBreakpointsResponse, ThreadsResponse,
    },
    types::Capabilities,
};
use fastedge_config::{DebugContext, LaunchConfiguration};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    args::build_cli_args,
    breakpoints::{BreakpointSnapshot, BreakpointStore, SharedBreakpoints},
    capabilities::FastEdgeCapabilities,
    compiler::{Compiler, ConsoleSink, SourceContext},
    error::DebugError,
    process::{ProcessEvent, RuntimeProcess},
    protocol::{
        ClientRequest, Command, Event, OutgoingMessage, OutputEventCategory, ResponseBody,
        exited_event, output_event, terminated_event,
    },
    resolver::Resolver,
};

/// ANSI sequence clearing the debug console
pub const CLEAR_CONSOLE: &str = "\x1b[2J\x1b[0f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    AwaitingLaunch,
    Compiling,
    Running,
    Terminating,
    Terminated,
}

/// Collaborators shared by the sessions of one adapter process
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub resolver: Resolver,
    pub compiler: Compiler,
    pub breakpoints: SharedBreakpoints,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            resolver: Resolver::default(),
            compiler: Compiler::default(),
            breakpoints: BreakpointStore::shared(),
        }
    }
}

/// A launch that compiled and is ready to spawn
#[derive(Debug)]
struct PreparedLaunch {
    config: LaunchConfiguration,
    dotenv: Option<Utf8PathBuf>,
}

enum SessionInput {
    Compiled(Result<PreparedLaunch, DebugError>),
    Process(ProcessEvent),
}

/// Channels connecting a started session to its transport
#[derive(Debug)]
pub struct SessionHandle {
    pub requests: mpsc::UnboundedSender<ClientRequest>,
    pub outgoing: mpsc::UnboundedReceiver<OutgoingMessage>,
    pub task: JoinHandle<SessionState>,
}

#[derive(Debug)]
pub struct DebugSession {
    options: SessionOptions,
}

impl DebugSession {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }

    /// Spawns the session actor on the current runtime
    pub fn start(self) -> SessionHandle {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(req_rx, out_tx));
        SessionHandle {
            requests: req_tx,
            outgoing: out_rx,
            task,
        }
    }

    /// Processes requests until `disconnect` or until the request stream ends.
    ///
    /// Returns the final state, which is always `Terminated`.
    pub async fn run(
        self,
        requests: mpsc::UnboundedReceiver<ClientRequest>,
        outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    ) -> SessionState {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let mut actor = Actor {
            options: self.options,
            state: SessionState::Idle,
            outgoing,
            inbox_tx,
            child: None,
            snapshot: None,
            pending_launch: None,
        };
        actor.run(requests, inbox_rx).await
    }
}

struct Actor {
    options: SessionOptions,
    state: SessionState,
    outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    inbox_tx: mpsc::UnboundedSender<SessionInput>,
    child: Option<RuntimeProcess>,
    snapshot: Option<BreakpointSnapshot>,
    pending_launch: Option<ClientRequest>,
}

impl Actor {
    async fn run(
        &mut self,
        mut requests: mpsc::UnboundedReceiver<ClientRequest>,
        mut inbox: mpsc::UnboundedReceiver<SessionInput>,
    ) -> SessionState {
        loop {
            tokio::select! {
                biased;
                input = inbox.recv() => {
                    // the actor holds a sender, the inbox never closes
                    if let Some(input) = input {
                        self.handle_input(input);
                    }
                }
                req = requests.recv() => {
                    let Some(req) = req else {
                        debug!("Request stream closed");
                        self.shutdown();
                        break;
                    };
                    if self.handle_request(req) {
                        break;
                    }
                }
            }
        }

        self.state = SessionState::Terminated;
        self.state
    }

    fn send(&self, message: impl Into<OutgoingMessage>) {
        if self.outgoing.send(message.into()).is_err() {
            debug!("Client channel closed, dropping message");
        }
    }

    fn output(&self, category: OutputEventCategory, text: impl Into<String>) {
        self.send(output_event(category, text));
    }

    fn console_sink(&self) -> ConsoleSink {
        let outgoing = self.outgoing.clone();
        Arc::new(move |text, category| {
            let _ = outgoing.send(output_event(category, text).into());
        })
    }

    /// Returns `true` when the session is finished
    fn handle_request(&mut self, req: ClientRequest) -> bool {
        debug!("Request {} `{}` in state {:?}", req.seq, req.command, self.state);

        let request = match &req.request {
            Ok(request) => request,
            Err(e) => {
                warn!("Unreadable request `{}`: {e}", req.command);
                self.send(req.error(format!("Invalid `{}` request: {e}", req.command)));
                return false;
            }
        };

        match &request.command {
            Command::Initialize(_) => self.initialize(&req),
            Command::Launch(args) => {
                let arguments = args.additional_data.clone();
                self.launch(req, arguments);
            }
            Command::ConfigurationDone => self.send(req.success(ResponseBody::ConfigurationDone)),
            Command::Threads => self.send(req.success(ResponseBody::Threads(ThreadsResponse {
                threads: vec![],
            }))),
            // recorded breakpoints are never verified, the client is told none were set
            Command::SetBreakpoints(args) => {
                let count = BreakpointStore::lock(&self.options.breakpoints).apply_set_breakpoints(args);
                debug!("Recorded {count} source breakpoints");
                self.send(req.success(ResponseBody::SetBreakpoints(SetBreakpointsResponse {
                    breakpoints: vec![],
                })));
            }
            Command::SetFunctionBreakpoints(args) => {
                let count = BreakpointStore::lock(&self.options.breakpoints)
                    .apply_set_function_breakpoints(args);
                debug!("Recorded {count} function breakpoints");
                self.send(req.success(ResponseBody::SetFunctionBreakpoints(
                    SetFunctionBreakpointsResponse {
                        breakpoints: vec![],
                    },
                )));
            }
            Command::SetExceptionBreakpoints(_) => {
                self.send(req.success(ResponseBody::SetExceptionBreakpoints(
                    SetExceptionBreakpointsResponse { breakpoints: None },
                )));
            }
            Command::SetInstructionBreakpoints(_) => {
                self.send(req.success(ResponseBody::SetInstructionBreakpoints(
                    SetInstructionBreakpointsResponse {
                        breakpoints: vec![],
                    },
                )));
            }
            Command::SetDataBreakpoints(_) => {
                self.send(req.success(ResponseBody::SetDataBreakpoints(
                    SetDataBreakpointsResponse {
                        breakpoints: vec![],
                    },
                )));
            }
            Command::BreakpointLocations(_) => {
                self.send(req.success(ResponseBody::BreakpointLocations(
                    BreakpointLocationsResponse {
                        breakpoints: vec![],
                    },
                )));
            }
            Command::Terminate(_) => self.terminate(&req),
            Command::Disconnect(_) => {
                self.disconnect(&req);
                return true;
            }
            _ => {
                warn!("Unsupported request `{}`", req.command);
                self.send(req.error(format!("Unsupported command: {}", req.command)));
            }
        }
        false
    }

    fn initialize(&mut self, req: &ClientRequest) {
        if self.state != SessionState::Idle {
            self.send(req.error("Session is already initialized"));
            return;
        }
        self.state = SessionState::Initializing;
        self.send(req.success(ResponseBody::Initialize(Capabilities::fastedge())));
        self.send(Event::Initialized);
        self.state = SessionState::AwaitingLaunch;
    }

    fn launch(&mut self, req: ClientRequest, arguments: Option<Value>) {
        if self.state != SessionState::AwaitingLaunch {
            self.send(req.error(format!("Launch is not allowed in state {:?}", self.state)));
            return;
        }

        let config = match LaunchConfiguration::from_arguments(arguments) {
            Ok(config) => config,
            Err(e) => {
                error!("{e:#}");
                self.output(OutputEventCategory::Important, "Launch Error: View Debug Console");
                self.output(OutputEventCategory::Stderr, format!("Launch Error: {e:#}\n"));
                self.send(terminated_event());
                self.send(req.error(format!("{e:#}")));
                self.state = SessionState::Terminated;
                return;
            }
        };

        self.output(OutputEventCategory::Console, CLEAR_CONSOLE);

        if config.disable_breakpoints {
            let snapshot = BreakpointStore::lock(&self.options.breakpoints).snapshot_and_disable();
            self.snapshot = Some(snapshot);
        }

        self.state = SessionState::Compiling;
        self.pending_launch = Some(req);

        let options = self.options.clone();
        let sink = self.console_sink();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = prepare_launch(options, config, sink).await;
            let _ = inbox.send(SessionInput::Compiled(result));
        });
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Compiled(result) => self.compiled(result),
            SessionInput::Process(ProcessEvent::Output { category, data }) => {
                self.output(category, data);
            }
            SessionInput::Process(ProcessEvent::Exited { code }) => {
                info!("FastEdge app exited with code {code}");
                self.child = None;
                if self.state != SessionState::Terminated {
                    self.send(exited_event(i64::from(code)));
                    self.send(terminated_event());
                    self.state = SessionState::Terminated;
                }
            }
        }
    }

    fn compiled(&mut self, result: Result<PreparedLaunch, DebugError>) {
        if self.state != SessionState::Compiling {
            debug!("Discarding compile result in state {:?}", self.state);
            return;
        }
        let Some(req) = self.pending_launch.take() else {
            return;
        };

        let prepared = match result {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Compilation failed: {e}");
                self.output(OutputEventCategory::Important, "Compile Error: View Debug Console");
                self.output(OutputEventCategory::Stderr, format!("Compile Error: {e}\n"));
                self.output(
                    OutputEventCategory::Stderr,
                    "Compilation failed. Stopping debug session.\n",
                );
                self.send(terminated_event());
                self.send(req.success(ResponseBody::Launch));
                self.state = SessionState::Terminated;
                return;
            }
        };

        match self.spawn_runtime(&prepared) {
            Ok(child) => {
                self.child = Some(child);
                self.state = SessionState::Running;
                self.send(req.success(ResponseBody::Launch));
            }
            Err(e) => {
                error!("Failed to start FastEdge app: {e}");
                self.output(OutputEventCategory::Stderr, format!("Launch Error: {e}\n"));
                self.send(terminated_event());
                self.send(req.error(e.to_string()));
                self.state = SessionState::Terminated;
            }
        }
    }

    fn spawn_runtime(&self, prepared: &PreparedLaunch) -> Result<RuntimeProcess, DebugError> {
        let config = &prepared.config;
        let cli = config
            .cli_path
            .as_deref()
            .ok_or(DebugError::MissingConfiguration("cliPath"))?;
        let binary = config
            .binary
            .as_ref()
            .ok_or(DebugError::MissingConfiguration("binary"))?;

        let args = build_cli_args(config, binary, prepared.dotenv.as_deref());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let child = RuntimeProcess::spawn(cli, &args, config.rust_log(), tx)?;

        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if inbox.send(SessionInput::Process(event)).is_err() {
                    break;
                }
            }
        });

        Ok(child)
    }

    fn terminate(&mut self, req: &ClientRequest) {
        match &self.child {
            // the exit event reports termination
            Some(child) => child.kill_tree(),
            None => {
                if self.state != SessionState::Terminated {
                    self.send(terminated_event());
                    self.state = SessionState::Terminated;
                }
            }
        }
        self.send(req.success(ResponseBody::Terminate));
    }

    /// Kills the child and puts breakpoints back
    fn cleanup(&mut self) {
        self.state = SessionState::Terminating;

        if let Some(child) = self.child.take() {
            child.kill_tree();
        }
        if let Some(snapshot) = self.snapshot.take() {
            BreakpointStore::lock(&self.options.breakpoints).restore(snapshot);
        }
    }

    fn disconnect(&mut self, req: &ClientRequest) {
        self.cleanup();

        if let Some(launch) = self.pending_launch.take() {
            self.send(launch.error("Debug session stopped"));
        }
        self.output(OutputEventCategory::Stdout, "FastEdge App stopping...\n");
        self.send(req.success(ResponseBody::Disconnect));
        self.state = SessionState::Terminated;
    }

    fn shutdown(&mut self) {
        self.cleanup();
        self.pending_launch = None;
        self.state = SessionState::Terminated;
    }
}

impl Drop for Actor {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            child.kill_tree();
        }
    }
}

/// Source files the launch refers to, unresolved `${...}` placeholders are ignored
fn source_context(config: &LaunchConfiguration) -> SourceContext {
    let concrete = |p: &Utf8PathBuf| !p.as_str().contains("${");

    let active_file = config.program.clone().filter(concrete);
    let workspace_root = config
        .cwd
        .clone()
        .filter(concrete)
        .or_else(|| {
            active_file
                .as_deref()
                .and_then(Utf8Path::parent)
                .map(Utf8Path::to_path_buf)
        });

    SourceContext {
        active_file,
        language_id: config.language_id.clone(),
        workspace_root,
    }
}

fn locate_dotenv(
    config: &LaunchConfiguration,
    source: &SourceContext,
    context: DebugContext,
    sink: &ConsoleSink,
) -> Option<Utf8PathBuf> {
    let setting = config.dotenv.as_ref()?;
    let workspace = source.workspace_root.as_deref()?;
    let start = source
        .source_dir(context)
        .unwrap_or_else(|_| workspace.to_path_buf());

    match setting.locate(workspace, &start) {
        Ok(dir) => dir,
        Err(e) => {
            sink(format!("Failed to locate .env files: {e:#}\n"), OutputEventCategory::Stderr);
            None
        }
    }
}

async fn prepare_launch(
    options: SessionOptions,
    config: LaunchConfiguration,
    sink: ConsoleSink,
) -> Result<PreparedLaunch, DebugError> {
    let resolver = options.resolver.clone();
    let mut config = tokio::task::spawn_blocking(move || resolver.resolve(config))
        .await
        .map_err(|e| DebugError::Io(std::io::Error::other(e)))??;

    let context = config.debug_context.unwrap_or(DebugContext::File);
    let source = source_context(&config);
    let binary = options.compiler.compile(context, &source, &sink).await?;
    config.binary = Some(binary);

    let dotenv = locate_dotenv(&config, &source, context, &sink);
    Ok(PreparedLaunch { config, dotenv })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{breakpoints::Breakpoint, resolver::{NoPrompt, ResolverEnv}};
    use serde_json::json;
    use std::time::Duration;

    fn options() -> SessionOptions {
        SessionOptions {
            resolver: Resolver::new(ResolverEnv::new("/ext", "linux"), Arc::new(NoPrompt)),
            compiler: Compiler::default(),
            breakpoints: BreakpointStore::shared(),
        }
    }

    async fn next(handle: &mut SessionHandle) -> Value {
        let message = tokio::time::timeout(Duration::from_secs(10), handle.outgoing.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("session closed");
        message.to_json(0).unwrap()
    }

    fn request(seq: i64, command: &str, arguments: Option<Value>) -> ClientRequest {
        ClientRequest::new(seq, command, arguments)
    }

    fn output(category: &str, text: &str) -> Value {
        json!({ "seq": 0, "type": "event", "event": "output", "body": { "category": category, "output": text } })
    }

    #[tokio::test]
    async fn test_initialize() {
        let mut handle = DebugSession::new(options()).start();
        handle.requests.send(request(1, "initialize", Some(json!({ "adapterID": "fastedge" })))).unwrap();

        let res = next(&mut handle).await;
        assert_eq!(res["command"], "initialize");
        assert_eq!(res["success"], true);
        assert_eq!(res["body"]["supportsTerminateRequest"], true);
        assert_eq!(next(&mut handle).await["event"], "initialized");

        handle.requests.send(request(2, "initialize", Some(json!({ "adapterID": "fastedge" })))).unwrap();
        assert_eq!(next(&mut handle).await["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let mut handle = DebugSession::new(options()).start();
        handle.requests.send(request(1, "stackTrace", Some(json!({ "threadId": 1 })))).unwrap();
        let res = next(&mut handle).await;
        assert_eq!(res["success"], false);
        assert_eq!(res["command"], "stackTrace");
        assert_eq!(res["message"], "Unsupported command: stackTrace");

        handle.requests.send(request(2, "hotReload", None)).unwrap();
        let res = next(&mut handle).await;
        assert_eq!(res["success"], false);
        assert_eq!(res["request_seq"], 2);
        assert!(res["message"].as_str().unwrap().starts_with("Invalid `hotReload` request"));
    }

    #[tokio::test]
    async fn test_launch_before_initialize() {
        let mut handle = DebugSession::new(options()).start();
        handle.requests.send(request(1, "launch", Some(json!({})))).unwrap();
        let res = next(&mut handle).await;
        assert_eq!(res["command"], "launch");
        assert_eq!(res["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_launch_arguments_end_the_session() {
        let mut handle = DebugSession::new(options()).start();
        handle.requests.send(request(1, "initialize", Some(json!({ "adapterID": "fastedge" })))).unwrap();
        next(&mut handle).await;
        next(&mut handle).await;

        handle
            .requests
            .send(request(2, "launch", Some(json!({ "port": "not-a-port" }))))
            .unwrap();

        assert_eq!(
            next(&mut handle).await,
            output("important", "Launch Error: View Debug Console")
        );
        let detail = next(&mut handle).await;
        assert_eq!(detail["body"]["category"], "stderr");
        assert!(detail["body"]["output"].as_str().unwrap().starts_with("Launch Error: Invalid launch configuration"));
        assert_eq!(next(&mut handle).await["event"], "terminated");
        let res = next(&mut handle).await;
        assert_eq!(res["command"], "launch");
        assert_eq!(res["success"], false);

        handle.requests.send(request(3, "disconnect", Some(json!({})))).unwrap();
        next(&mut handle).await;
        assert_eq!(next(&mut handle).await["success"], true);
        assert_eq!(handle.task.await.unwrap(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_unsupported_language_terminates() {
        let opts = options();
        let breakpoints = opts.breakpoints.clone();
        BreakpointStore::lock(&breakpoints).set_function_breakpoints(vec![Breakpoint::Function {
            name: "main".into(),
            condition: None,
            hit_condition: None,
            enabled: true,
        }]);

        let mut handle = DebugSession::new(opts).start();
        handle.requests.send(request(1, "initialize", Some(json!({ "adapterID": "fastedge" })))).unwrap();
        next(&mut handle).await;
        next(&mut handle).await;

        handle
            .requests
            .send(request(
                2,
                "launch",
                Some(json!({ "program": "/ws/main.py", "cwd": "/ws" })),
            ))
            .unwrap();

        assert_eq!(next(&mut handle).await, output("console", CLEAR_CONSOLE));
        assert_eq!(
            next(&mut handle).await,
            output("important", "Compile Error: View Debug Console")
        );
        assert!(BreakpointStore::lock(&breakpoints).all().iter().all(|bp| !bp.enabled()));
        let detail = next(&mut handle).await;
        assert!(detail["body"]["output"].as_str().unwrap().starts_with("Compile Error: Unsupported language"));
        assert_eq!(
            next(&mut handle).await,
            output("stderr", "Compilation failed. Stopping debug session.\n")
        );
        assert_eq!(next(&mut handle).await["event"], "terminated");
        assert_eq!(next(&mut handle).await["command"], "launch");

        handle.requests.send(request(3, "disconnect", Some(json!({})))).unwrap();
        assert_eq!(next(&mut handle).await, output("stdout", "FastEdge App stopping...\n"));
        let res = next(&mut handle).await;
        assert_eq!(res["command"], "disconnect");
        assert_eq!(res["success"], true);
        assert_eq!(handle.task.await.unwrap(), SessionState::Terminated);
        assert!(BreakpointStore::lock(&breakpoints).all()[0].enabled());
    }

    #[tokio::test]
    async fn test_breakpoint_requests_report_none() {
        let opts = options();
        let breakpoints = opts.breakpoints.clone();
        let mut handle = DebugSession::new(opts).start();
        handle
            .requests
            .send(request(
                1,
                "setBreakpoints",
                Some(json!({ "source": { "path": "/ws/src/lib.rs" }, "breakpoints": [{ "line": 3 }] })),
            ))
            .unwrap();
        let res = next(&mut handle).await;
        assert_eq!(res["success"], true);
        assert_eq!(res["body"]["breakpoints"], json!([]));
        assert_eq!(BreakpointStore::lock(&breakpoints).len(), 1);

        handle
            .requests
            .send(request(2, "setExceptionBreakpoints", Some(json!({ "filters": [] }))))
            .unwrap();
        assert_eq!(next(&mut handle).await["success"], true);
    }

    #[tokio::test]
    async fn test_terminate_without_child() {
        let mut handle = DebugSession::new(options()).start();
        handle.requests.send(request(1, "terminate", Some(json!({})))).unwrap();
        assert_eq!(next(&mut handle).await["event"], "terminated");
        let res = next(&mut handle).await;
        assert_eq!(res["command"], "terminate");
        assert_eq!(res["success"], true);
    }

    #[tokio::test]
    async fn test_end_of_stream_stops_session() {
        let handle = DebugSession::new(options()).start();
        drop(handle.requests);
        assert_eq!(handle.task.await.unwrap(), SessionState::Terminated);
    }

    #[test]
    fn test_source_context_ignores_placeholders() {
        let config = LaunchConfiguration {
            program: Some("${file}".into()),
            cwd: Some("${workspaceFolder}".into()),
            ..Default::default()
        };
        assert_eq!(source_context(&config), SourceContext::default());

        let config = LaunchConfiguration {
            program: Some("/ws/src/lib.rs".into()),
            ..Default::default()
        };
        let ctx = source_context(&config);
        assert_eq!(ctx.workspace_root.as_deref().map(|p| p.as_str()), Some("/ws/src"));
    }
}
