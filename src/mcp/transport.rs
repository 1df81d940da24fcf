// ABOUTME: Stdio transport for MCP communication.
// ABOUTME: Spawns a subprocess and speaks newline-delimited JSON-RPC over stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{RpcIncoming, RpcNotification, RpcRequest, RpcResponse};
use crate::error::McpError;

/// Stdio transport - owns one child process and exchanges newline-delimited
/// JSON-RPC 2.0 messages over its stdin/stdout.
///
/// One reader task per transport. Responses are routed to the caller whose
/// request id matches; notifications are forwarded on a channel to whoever
/// holds the receiver returned from [`StdioTransport::connect`].
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<tokio::process::ChildStdin>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>,
    alive: Arc<AtomicBool>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the subprocess and start the reader task.
    ///
    /// Returns the transport and the notification receiver for the session.
    pub async fn connect(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RpcNotification>), McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Connection(format!("{command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Connection("failed to open stdin".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Connection("failed to open stdout".into()))?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();

        let pending_clone = pending.clone();
        let alive_clone = alive.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<RpcIncoming>(line) {
                            Ok(RpcIncoming::Response(response)) => {
                                let mut pending = pending_clone.lock().await;
                                match pending.remove(&response.id) {
                                    Some(tx) => {
                                        let _ = tx.send(response);
                                    }
                                    // A timed-out caller has already abandoned
                                    // this id; the late response is dropped.
                                    None => debug!(id = response.id, "dropping unmatched response"),
                                }
                            }
                            Ok(RpcIncoming::Notification(notification)) => {
                                let _ = notif_tx.send(notification);
                            }
                            Err(e) => {
                                warn!(error = %e, "skipping unparsable JSON-RPC line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
            // Process exited or pipe closed: wake every waiter by dropping
            // its sender, and mark the session dead.
            alive_clone.store(false, Ordering::SeqCst);
            pending_clone.lock().await.clear();
        });

        Ok((
            Self {
                child: Mutex::new(Some(child)),
                stdin: Mutex::new(Some(stdin)),
                next_id: AtomicU64::new(1),
                pending,
                alive,
                reader_handle: Mutex::new(Some(reader_handle)),
            },
            notif_rx,
        ))
    }

    /// Whether the child process is still being read from.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response, up to `timeout`.
    ///
    /// On timeout the pending entry is removed and a late response for that
    /// id is silently discarded by the reader. No cancel is sent to the
    /// server; whatever work it started is its own to finish.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<RpcResponse, McpError> {
        if !self.is_alive() {
            return Err(McpError::Connection("server process exited".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        if let Err(e) = self.write_line(&serde_json::to_string(&request)?).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::Connection(
                "connection closed before response".into(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, notification: RpcNotification) -> Result<(), McpError> {
        self.write_line(&serde_json::to_string(&notification)?)
            .await
    }

    /// Writes are serialized per session: two callers may issue requests
    /// concurrently on the same transport.
    async fn write_line(&self, line: &str) -> Result<(), McpError> {
        let mut stdin = self.stdin.lock().await;
        let stdin_ref = stdin
            .as_mut()
            .ok_or_else(|| McpError::Connection("server connection closed".into()))?;
        stdin_ref.write_all(line.as_bytes()).await?;
        stdin_ref.write_all(b"\n").await?;
        stdin_ref.flush().await?;
        Ok(())
    }

    /// Terminate the child: close stdin, wait with a grace period, then
    /// force-kill. Idempotent.
    pub async fn shutdown(&self) -> Result<(), McpError> {
        self.alive.store(false, Ordering::SeqCst);
        self.stdin.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(Duration::from_millis(500), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    let _ = child.kill().await;
                }
            }
        }

        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }

        self.pending.lock().await.clear();
        Ok(())
    }
}
