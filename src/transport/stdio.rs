//! Subprocess stdio transport (spec §4.1).
//!
//! Primary framing is newline-delimited JSON. A fallback parser accepts
//! LSP-style `Content-Length: N\r\n\r\n<body>` framing for servers that
//! emit it. Child stderr is drained and logged, never parsed as protocol.
//! Built as an `rmcp` [`Worker`], the same seam the teacher uses for its
//! legacy-SSE transport.

use super::sanitize_env;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::worker::{Worker, WorkerConfig, WorkerContext, WorkerQuitReason, WorkerSendRequest};
use rmcp::RoleClient;
use std::collections::HashMap;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum StdioTransportError {
    #[error("failed to spawn child process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("child process stdio pipe unavailable")]
    NoPipe,
    #[error("child process exited")]
    ChildExited,
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("tokio join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

/// One line of framed input, classified by [`classify_frame_start`].
enum FrameKind {
    /// A complete JSON-RPC message on a single line.
    Line(String),
    /// The first header line of a Content-Length-framed block; caller
    /// must keep reading headers until a blank line, then read exactly
    /// `len` bytes as the body.
    ContentLengthHeader(usize),
}

/// Parse one line of input to decide which framing style is in play.
/// Pure and unit-testable independent of any IO.
fn classify_frame_start(line: &str) -> Option<FrameKind> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return None;
    }
    if let Some(len) = parse_content_length_header(trimmed) {
        return Some(FrameKind::ContentLengthHeader(len));
    }
    Some(FrameKind::Line(trimmed.to_string()))
}

/// Parse a `Content-Length: N` header line (case-insensitive field name),
/// per the LSP wire convention.
fn parse_content_length_header(line: &str) -> Option<usize> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    value.trim().parse::<usize>().ok()
}

pub struct StdioWorker {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<String>,
}

impl StdioWorker {
    pub fn new(command: String, args: Vec<String>, env: HashMap<String, String>, cwd: Option<String>) -> Self {
        Self { command, args, env, cwd }
    }

    fn spawn_child(&self) -> Result<Child, StdioTransportError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(sanitize_env(&self.env))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        Ok(cmd.spawn()?)
    }
}

impl Worker for StdioWorker {
    type Role = RoleClient;
    type Error = StdioTransportError;

    fn err_closed() -> Self::Error {
        StdioTransportError::ChannelClosed
    }

    fn err_join(e: tokio::task::JoinError) -> Self::Error {
        StdioTransportError::JoinError(e)
    }

    fn config(&self) -> WorkerConfig {
        WorkerConfig {
            name: Some(format!("StdioWorker({})", self.command)),
            channel_buffer_capacity: 16,
        }
    }

    async fn run(self, mut context: WorkerContext<Self>) -> Result<(), WorkerQuitReason<Self::Error>> {
        let ct = context.cancellation_token.clone();

        let mut child = self.spawn_child().map_err(|e| {
            WorkerQuitReason::fatal(e, "spawn child process")
        })?;

        let stdin = child.stdin.take().ok_or(StdioTransportError::NoPipe);
        let mut stdin = stdin.map_err(|e| WorkerQuitReason::fatal(e, "take child stdin"))?;
        let stdout = child.stdout.take().ok_or(StdioTransportError::NoPipe);
        let stdout = stdout.map_err(|e| WorkerQuitReason::fatal(e, "take child stdout"))?;
        let stderr = child.stderr.take();

        let (msg_tx, mut msg_rx) = tokio::sync::mpsc::channel::<ServerJsonRpcMessage>(16);

        // Drain stderr to tracing::debug — never parsed as protocol.
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "hatago_hub::downstream_stderr", "{}", line);
                }
            });
        }

        // Reader task: newline JSON primary, Content-Length fallback.
        let reader_ct = ct.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                if reader_ct.is_cancelled() {
                    break;
                }
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("stdio transport read error: {}", e);
                        break;
                    }
                }

                match classify_frame_start(&line) {
                    None => continue,
                    Some(FrameKind::Line(body)) => {
                        match serde_json::from_str::<ServerJsonRpcMessage>(&body) {
                            Ok(msg) => {
                                if msg_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("stdio transport: malformed line, skipping: {} ({})", e, body);
                            }
                        }
                    }
                    Some(FrameKind::ContentLengthHeader(len)) => {
                        // Consume remaining headers until the blank line.
                        loop {
                            let mut header_line = String::new();
                            match reader.read_line(&mut header_line).await {
                                Ok(0) => break,
                                Ok(_) => {
                                    if header_line.trim().is_empty() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                        let mut body = vec![0u8; len];
                        if tokio::io::AsyncReadExt::read_exact(&mut reader, &mut body).await.is_err() {
                            break;
                        }
                        match serde_json::from_slice::<ServerJsonRpcMessage>(&body) {
                            Ok(msg) => {
                                if msg_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("stdio transport: malformed Content-Length body, skipping: {}", e);
                            }
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = ct.cancelled() => {
                    let _ = child.start_kill();
                    return Err(WorkerQuitReason::Cancelled);
                }
                handler_msg = context.recv_from_handler() => {
                    let WorkerSendRequest { message, responder }: WorkerSendRequest<ClientJsonRpcMessage, _> = handler_msg?;
                    let result = write_message(&mut stdin, &message).await;
                    let _ = responder.send(result);
                }
                server_msg = msg_rx.recv() => {
                    match server_msg {
                        Some(msg) => {
                            context.send_to_handler(msg).await?;
                        }
                        None => {
                            return Err(WorkerQuitReason::fatal(
                                StdioTransportError::ChildExited,
                                "child process stdout closed",
                            ));
                        }
                    }
                }
            }
        }
    }
}

async fn write_message(
    stdin: &mut tokio::process::ChildStdin,
    message: &ClientJsonRpcMessage,
) -> Result<(), StdioTransportError> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    stdin.write_all(&line).await.map_err(StdioTransportError::Spawn)?;
    stdin.flush().await.map_err(StdioTransportError::Spawn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_plain_newline_json_as_a_line() {
        match classify_frame_start("{\"jsonrpc\":\"2.0\"}\n") {
            Some(FrameKind::Line(l)) => assert_eq!(l, "{\"jsonrpc\":\"2.0\"}"),
            _ => panic!("expected a line frame"),
        }
    }

    #[test]
    fn classifies_content_length_header() {
        match classify_frame_start("Content-Length: 42\r\n") {
            Some(FrameKind::ContentLengthHeader(len)) => assert_eq!(len, 42),
            _ => panic!("expected a content-length header"),
        }
    }

    #[test]
    fn content_length_header_name_is_case_insensitive() {
        assert_eq!(parse_content_length_header("content-length: 7"), Some(7));
        assert_eq!(parse_content_length_header("CONTENT-LENGTH: 7"), Some(7));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(classify_frame_start("\n").is_none());
        assert!(classify_frame_start("\r\n").is_none());
    }

    #[test]
    fn non_header_lines_are_not_misclassified() {
        match classify_frame_start("not-a-header: value") {
            Some(FrameKind::Line(_)) => {}
            _ => panic!("expected a plain line"),
        }
    }
}
