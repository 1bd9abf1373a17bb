//! Subprocess transport over standard streams
//!
//! Spawns the server as a child process and exchanges newline-delimited JSON
//! over its stdin/stdout. Stderr is inherited so server diagnostics reach the
//! operator unchanged.

use super::Transport;
use crate::error::BridgeError;
use crate::protocol::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

/// How long to wait for the child to exit after stdin EOF before killing it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct StdioTransport {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    line_buffer: String,
    connected: bool,
}

impl StdioTransport {
    /// Spawn the server process with the given environment
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, BridgeError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::connection(format!("failed to spawn server '{}': {}", command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::connection("failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::connection("failed to get stdout handle"))?;

        debug!(command, "spawned stdio server");

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
            line_buffer: String::new(),
            connected: true,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Message) -> Result<(), BridgeError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BridgeError::connection("stdio channel closed"))?;

        let json = serde_json::to_string(&message)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<Message, BridgeError> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| BridgeError::connection("stdio channel closed"))?;

        self.line_buffer.clear();
        let bytes_read = stdout.read_line(&mut self.line_buffer).await?;

        if bytes_read == 0 {
            self.connected = false;
            return Err(BridgeError::connection("server closed its stdout"));
        }

        let message: Message = serde_json::from_str(self.line_buffer.trim())?;
        Ok(message)
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.connected = false;

        // Dropping stdin signals EOF, the conventional shutdown request
        self.stdin.take();
        self.stdout.take();

        if let Some(mut child) = self.child.take() {
            tokio::select! {
                result = child.wait() => {
                    result.map_err(|e| BridgeError::connection(e.to_string()))?;
                }
                _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                    child.kill().await.ok();
                }
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}
