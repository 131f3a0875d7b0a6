//! Child process transport: newline-delimited JSON-RPC on stdin/stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::client::{Inbound, McpClient, McpClientError, Outbound};
use crate::launch::LaunchSpec;

struct StdioOutbound {
    server_name: String,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

#[async_trait]
impl Outbound for StdioOutbound {
    async fn send(&self, message: String) -> Result<(), McpClientError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(McpClientError::NotConnected)?;
        stdin.write_all(message.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Close stdin, then kill the process.
    async fn close(&self) {
        self.stdin.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(server_name = %self.server_name, error = %e, "MCP server already exited");
            }
        }
    }
}

impl McpClient {
    /// Spawn the server process and complete the MCP handshake.
    pub async fn spawn(
        server_name: &str,
        launch: &LaunchSpec,
        request_timeout: Duration,
    ) -> Result<Self, McpClientError> {
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .env_clear()
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &launch.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            McpClientError::SpawnFailed(format!(
                "Failed to spawn '{}': {e}\nArgs: {:?}\nCwd: {:?}",
                launch.program, launch.args, launch.cwd
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpClientError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpClientError::SpawnFailed("Failed to get stdout".to_string()))?;
        let stderr = child.stderr.take();

        let inbound = Inbound::new(server_name);
        let mut tasks = vec![tokio::spawn(read_stdout(inbound.clone(), stdout))];
        if let Some(stderr) = stderr {
            tasks.push(tokio::spawn(forward_stderr(server_name.to_string(), stderr)));
        }

        let outbound = StdioOutbound {
            server_name: server_name.to_string(),
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
        };

        Self::start(Box::new(outbound), inbound, tasks, request_timeout).await
    }
}

/// Route stdout lines to waiting requests until EOF.
async fn read_stdout(inbound: Inbound, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => inbound.deliver(&line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(server_name = %inbound.server_name(), error = %e, "MCP stdout read failed");
                break;
            }
        }
    }

    tracing::debug!(server_name = %inbound.server_name(), "MCP server closed stdout");
    inbound.finish();
}

async fn forward_stderr(server_name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(server_name = %server_name, line = %line, "MCP server stderr");
    }
}
