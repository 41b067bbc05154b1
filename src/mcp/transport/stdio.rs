use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{ClientMessage, ServerMessage};
use rust_mcp_schema::RequestId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::McpSession;

const STDIO_REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// A server process spawned for the lifetime of one session.
pub struct StdioSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioSession {
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Self, String> {
        debug!(command = %command, args = ?args, "Starting MCP stdio server");
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| format!("Failed to start {command}: {err}"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "Unable to retrieve stdin.".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Unable to retrieve stdout.".to_string())?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn write_message(&mut self, message: &ClientMessage) -> Result<(), String> {
        let mut payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
        payload.push('\n');
        self.stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|err| err.to_string())?;
        self.stdin.flush().await.map_err(|err| err.to_string())
    }

    /// Reads lines until the response for `id` arrives. Notifications, server
    /// requests, and unparsable lines are skipped.
    async fn read_response(&mut self, id: &RequestId) -> Result<ServerMessage, String> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|err| err.to_string())?
                .ok_or_else(|| "MCP server closed its output.".to_string())?;

            let Ok(message) = serde_json::from_str::<ServerMessage>(&line) else {
                continue;
            };
            match &message {
                ServerMessage::Response(response) if &response.id == id => return Ok(message),
                ServerMessage::Error(error) if error.id.as_ref() == Some(id) => {
                    return Ok(message)
                }
                _ => debug!("Skipping unrelated MCP stdio message"),
            }
        }
    }
}

#[async_trait]
impl McpSession for StdioSession {
    async fn request(
        &mut self,
        id: RequestId,
        message: ClientMessage,
    ) -> Result<ServerMessage, String> {
        debug!(request_id = ?id, "Sending MCP stdio request");
        self.write_message(&message).await?;
        tokio::time::timeout(
            Duration::from_secs(STDIO_REQUEST_TIMEOUT_SECONDS),
            self.read_response(&id),
        )
        .await
        .map_err(|_| "Timed out waiting for MCP server response.".to_string())?
    }

    async fn notify(&mut self, message: ClientMessage) -> Result<(), String> {
        self.write_message(&message).await
    }

    async fn close(mut self: Box<Self>) {
        let _ = self.child.kill().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::mcp::transport::send_request;
    use rust_mcp_schema::schema_utils::RequestFromClient;

    #[tokio::test]
    async fn reads_matching_response_and_skips_noise() {
        let script = r#"read line
echo 'not json'
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"hi"}}'
echo '{"jsonrpc":"2.0","id":7,"result":{}}'
"#;
        let mut session = StdioSession::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            &BTreeMap::new(),
        )
        .expect("sh should spawn");

        let response = send_request(&mut session, 7, RequestFromClient::PingRequest(None))
            .await
            .expect("ping answered");
        assert!(matches!(response, ServerMessage::Response(_)));
        Box::new(session).close().await;
    }

    #[tokio::test]
    async fn closed_output_is_an_error() {
        let mut session = StdioSession::spawn("true", &[], &BTreeMap::new()).expect("spawn");
        let err = send_request(&mut session, 1, RequestFromClient::PingRequest(None))
            .await
            .expect_err("no response");
        assert!(
            err == "MCP server closed its output." || err.contains("Broken pipe"),
            "unexpected error: {err}"
        );
    }
}
