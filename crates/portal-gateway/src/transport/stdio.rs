//! stdio carrier: spawns the normalized command, frames `stdout` as
//! newline-delimited JSON-RPC, and tails `stderr` into a rolling 4 KiB
//! buffer retained on the session.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portal_core::command_normalizer::NormalizedCommand;
use portal_core::GatewayError;
use rmcp::ServiceExt;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Transport, TransportConnectResult, TransportKind};
use crate::session::handler::{McpClientHandler, SessionSignal};

const STDERR_TAIL_CAPACITY: usize = 4 * 1024;
const GRACEFUL_EXIT_GRACE: Duration = Duration::from_secs(5);
const SIGTERM_GRACE: Duration = Duration::from_secs(2);

/// Apply platform-specific flags to a spawned child.
///
/// Windows: `CREATE_NO_WINDOW` so the child doesn't pop a console.
/// Unix: `process_group(0)` so terminal signals sent to the gateway don't
/// propagate into the MCP server child processes.
pub fn configure_child_process_platform(cmd: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
}

fn command_hint(command: &str) -> &'static str {
    let cmd = command.rsplit(['/', '\\']).next().unwrap_or(command);
    if cmd == "docker" || cmd == "docker.exe" || cmd.starts_with("docker-") {
        " Ensure Docker Desktop is installed and running."
    } else {
        ""
    }
}

/// A shared, bounded tail of a child's stderr. Cloning is cheap; every
/// clone sees the same rolling buffer.
#[derive(Clone, Default)]
pub struct StderrTail(Arc<Mutex<Vec<u8>>>);

impl StderrTail {
    fn push(&self, chunk: &[u8]) {
        let mut buf = self.0.lock();
        buf.extend_from_slice(chunk);
        if buf.len() > STDERR_TAIL_CAPACITY {
            let excess = buf.len() - STDERR_TAIL_CAPACITY;
            buf.drain(0..excess);
        }
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

pub struct StdioTransport {
    server_name: String,
    command: NormalizedCommand,
    handshake_timeout: Duration,
    stderr_tail: StderrTail,
}

impl StdioTransport {
    pub fn new(server_name: String, command: NormalizedCommand, handshake_timeout: Duration) -> Self {
        Self { server_name, command, handshake_timeout, stderr_tail: StderrTail::default() }
    }

    pub fn stderr_tail(&self) -> StderrTail {
        self.stderr_tail.clone()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn connect(
        &self,
        signal_tx: tokio::sync::mpsc::UnboundedSender<SessionSignal>,
        cancel: CancellationToken,
    ) -> TransportConnectResult {
        info!(server_name = %self.server_name, program = %self.command.program, "spawning stdio server");

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .envs(&self.command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        configure_child_process_platform(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let hint = command_hint(&self.command.program);
                let message = format!("failed to spawn `{}`: {err}.{hint}", self.command.program);
                error!(server_name = %self.server_name, "{message}");
                return TransportConnectResult::Failed(GatewayError::spawn_failed(message));
            }
        };

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let tail = self.stderr_tail.clone();
        let server_name = self.server_name.clone();
        tokio::spawn(async move {
            let mut stderr = stderr;
            let mut buf = [0u8; 1024];
            loop {
                match stderr.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        tail.push(&buf[..n]);
                        debug!(server_name = %server_name, "{}", String::from_utf8_lossy(&buf[..n]));
                    }
                }
            }
        });

        // `child` is kept alive by moving it into the spawned reaper below;
        // its stdin/stdout were already taken for the transport. The reaper
        // either notices the child exiting on its own (an unplanned crash,
        // reported back as `Disconnected` so the session doesn't have to
        // wait for the next scheduled ping) or, once `cancel` fires, stages
        // its teardown: a graceful wait, then `SIGTERM`, then `SIGKILL`.
        let reaper_signal_tx = signal_tx.clone();
        let reaper_server_name = self.server_name.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    info!(server_name = %reaper_server_name, ?status, "child process exited");
                    let _ = reaper_signal_tx.send(SessionSignal::Disconnected);
                }
                _ = cancel.cancelled() => {
                    terminate_child(&reaper_server_name, &mut child).await;
                }
            }
        });

        let handler = McpClientHandler::new(&self.server_name, signal_tx);

        let connect_future = handler.serve((stdout, stdin));
        match tokio::time::timeout(self.handshake_timeout, connect_future).await {
            Ok(Ok(client)) => {
                info!(server_name = %self.server_name, "stdio server connected");
                TransportConnectResult::Connected(client)
            }
            Ok(Err(err)) => {
                let hint = command_hint(&self.command.program);
                let message = format!("mcp handshake failed: {err}.{hint}");
                error!(server_name = %self.server_name, "{message}");
                TransportConnectResult::Failed(GatewayError::handshake_failed(message))
            }
            Err(_) => {
                let message = format!("handshake timed out after {:?}", self.handshake_timeout);
                error!(server_name = %self.server_name, "{message}");
                TransportConnectResult::Failed(GatewayError::handshake_failed(message))
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command.program)
    }
}

/// Gives the child up to [`GRACEFUL_EXIT_GRACE`] to exit on its own (stdin
/// is already closed by this point), then `SIGTERM` plus
/// [`SIGTERM_GRACE`], then `SIGKILL`.
async fn terminate_child(server_name: &str, child: &mut Child) {
    if tokio::time::timeout(GRACEFUL_EXIT_GRACE, child.wait()).await.is_ok() {
        return;
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            warn!(server_name, pid, "sending SIGTERM after graceful exit window elapsed");
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        if tokio::time::timeout(SIGTERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }

    warn!(server_name, "force-killing child process");
    let _ = child.start_kill();
    let _ = child.wait().await;
}
