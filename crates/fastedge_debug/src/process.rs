//! Supervision of the runtime CLI child process.
//!
//! The child runs in its own process group so that everything it starts can be
//! torn down together.

use std::{
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use camino::Utf8Path;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{error::DebugError, protocol::OutputEventCategory};

const READ_CHUNK: usize = 8 * 1024;

/// Something observed on the child
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Output {
        category: OutputEventCategory,
        data: String,
    },
    /// Sent once, after all output has been relayed
    Exited { code: i32 },
}

/// Handle to a running runtime CLI
#[derive(Debug)]
pub struct RuntimeProcess {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
}

impl RuntimeProcess {
    /// Spawns `program` directly (no shell) and starts relaying its output to `events`
    ///
    /// # Errors
    ///
    /// This function will return an error if the process can not be started
    pub fn spawn(
        program: &Utf8Path,
        args: &[String],
        rust_log: &str,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Result<Self, DebugError> {
        let mut cmd = Command::new(program.as_std_path());
        cmd.args(args)
            .env("RUST_LOG", rust_log)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| DebugError::ProcessSpawn {
            program: program.to_string(),
            source,
        })?;
        let pid = child.id();
        info!("Started {program} (pid {pid:?}) with args {args:?}");

        let stdout = child
            .stdout
            .take()
            .map(|s| tokio::spawn(relay(s, OutputEventCategory::Stdout, events.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|s| tokio::spawn(relay(s, OutputEventCategory::Stderr, events.clone())));

        let exited = Arc::new(AtomicBool::new(false));
        let exited_flag = exited.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!("Failed waiting for runtime process: {e}");
                    -1
                }
            };
            exited_flag.store(true, Ordering::SeqCst);

            // pipes close once the whole group is gone, flush before reporting the exit
            for relay in [stdout, stderr].into_iter().flatten() {
                let _ = relay.await;
            }
            debug!("Runtime process exited with code {code}");
            let _ = events.send(ProcessEvent::Exited { code });
        });

        Ok(Self { pid, exited })
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Kills the child and its whole process group.
    ///
    /// Safe to call repeatedly, a group that is already gone is not an error.
    /// Failures are logged and otherwise ignored.
    pub fn kill_tree(&self) {
        let Some(pid) = self.pid else {
            return;
        };
        if self.has_exited() {
            debug!("Runtime process {pid} already exited");
        }
        kill_process_group(pid);
    }
}

/// Decodes a byte stream read in chunks.
///
/// A character split across two reads is held back until its remaining bytes
/// arrive, only bytes that are invalid on their own become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut text = String::new();
        let mut rest: &[u8] = &self.pending;
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        // incomplete character at the end of the chunk
                        None => {
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        text
    }

    /// Whatever is still held back once the stream ended
    fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

async fn relay<R>(
    mut stream: R,
    category: OutputEventCategory,
    events: mpsc::UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut decoder = Utf8Decoder::default();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let data = decoder.decode(&buf[..n]);
                if data.is_empty() {
                    continue;
                }
                let event = ProcessEvent::Output {
                    category: category.clone(),
                    data,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("Stopped relaying {category:?}: {e}");
                break;
            }
        }
    }

    let data = decoder.finish();
    if !data.is_empty() {
        let _ = events.send(ProcessEvent::Output { category, data });
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!("Killed process group {pid}"),
        Err(Errno::ESRCH) => debug!("Process group {pid} already gone"),
        Err(e) => warn!("Failed to kill process group {pid}: {e}"),
    }
}

#[cfg(windows)]
fn kill_process_group(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!("Killed process tree {pid}"),
        Ok(status) => debug!("taskkill for {pid} exited with {status}"),
        Err(e) => warn!("Failed to run taskkill for {pid}: {e}"),
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_process_group(pid: u32) {
    warn!("Killing process {pid} is not supported on this platform");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn collect(mut rx: mpsc::UnboundedReceiver<ProcessEvent>) -> (String, String, i32) {
        let (mut out, mut err) = (String::new(), String::new());
        while let Some(event) = rx.recv().await {
            match event {
                ProcessEvent::Output {
                    category: OutputEventCategory::Stderr,
                    data,
                } => err.push_str(&data),
                ProcessEvent::Output { data, .. } => out.push_str(&data),
                ProcessEvent::Exited { code } => return (out, err, code),
            }
        }
        panic!("event stream closed without an exit");
    }

    #[tokio::test]
    async fn test_relays_output_then_exit() {
        let (tx, rx) = mpsc::unbounded_channel();
        let args = vec![
            "-c".to_string(),
            "echo \"log=$RUST_LOG\"; echo oops >&2; exit 3".to_string(),
        ];
        let _proc = RuntimeProcess::spawn(Utf8Path::new("/bin/sh"), &args, "info", tx).unwrap();

        let (out, err, code) = tokio::time::timeout(Duration::from_secs(10), collect(rx))
            .await
            .unwrap();
        assert_eq!(out, "log=info\n");
        assert_eq!(err, "oops\n");
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn test_kill_tree_is_idempotent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let args = vec!["-c".to_string(), "sleep 30 & sleep 30".to_string()];
        let proc = RuntimeProcess::spawn(Utf8Path::new("/bin/sh"), &args, "info", tx).unwrap();

        proc.kill_tree();
        let (_, _, code) = tokio::time::timeout(Duration::from_secs(10), collect(rx))
            .await
            .unwrap();
        assert_eq!(code, -1);
        assert!(proc.has_exited());

        // second kill targets a group that no longer exists
        proc.kill_tree();
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let res = RuntimeProcess::spawn(Utf8Path::new("/definitely/not/a/cli"), &[], "info", tx);
        assert!(matches!(res, Err(DebugError::ProcessSpawn { .. })));
    }

    #[test]
    fn test_decoder_joins_split_characters() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "aé\n".as_bytes();

        assert_eq!(decoder.decode(&bytes[..2]), "a");
        assert_eq!(decoder.decode(&bytes[2..]), "é\n");
        assert_eq!(decoder.decode(b"x\xffy"), "x\u{fffd}y");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }

    #[tokio::test]
    async fn test_multibyte_output_across_reads() {
        let (tx, rx) = mpsc::unbounded_channel();
        // the accent straddles the first 8 KiB read
        let script = format!("printf '%s' {}; printf '\\303\\251\\n'", "a".repeat(READ_CHUNK - 1));
        let args = vec!["-c".to_string(), script];
        let _proc = RuntimeProcess::spawn(Utf8Path::new("/bin/sh"), &args, "info", tx).unwrap();

        let (out, _, code) = tokio::time::timeout(Duration::from_secs(10), collect(rx))
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert!(out.ends_with("aé\n"));
        assert!(!out.contains(char::REPLACEMENT_CHARACTER));
    }
}
