//! Stdio frontend of the Upstream Gateway (spec §4.8, §6): newline-delimited
//! JSON-RPC in both directions, nothing else written to stdout. Also
//! serves as the notification sink ("stdio surface... additionally serve
//! as the notification sink").
//!
//! Grounded in the teacher's `bin/mcp-hub-bridge.rs` line-reading loop,
//! generalized from a stdio↔HTTP relay into a direct stdio↔Dispatcher
//! frontend since this binary owns the Hub itself.

use crate::dispatcher;
use crate::hub::Hub;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Run the stdio gateway until stdin closes or ctrl-c is received. There
/// is no notion of a session over stdio (spec §4.7 sessions are an HTTP
/// concept), so every dispatched call passes `session_id = None`.
pub async fn serve(hub: Arc<Hub>) -> anyhow::Result<()> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();

    hub.relay
        .set_stdio_sink(Some(Arc::new({
            let out_tx = out_tx.clone();
            move |notification: Value| {
                let _ = out_tx.send(notification);
            }
        })))
        .await;

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(value) = out_rx.recv().await {
            if write_line(&mut stdout, &value).await.is_err() {
                break;
            }
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Some(response) = handle_line(&hub, &line).await {
                            let _ = out_tx.send(response);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("stdin read error: {e}");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stdio gateway interrupted");
                break;
            }
        }
    }

    hub.relay.set_stdio_sink(None).await;
    drop(out_tx);
    let _ = writer.await;
    hub.shutdown().await;
    Ok(())
}

async fn handle_line(hub: &Arc<Hub>, line: &str) -> Option<Value> {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("malformed JSON-RPC line: {e}");
            return Some(serde_json::json!({
                "jsonrpc": "2.0",
                "id": Value::Null,
                "error": { "code": -32700, "message": format!("parse error: {e}") },
            }));
        }
    };

    let method = request.get("method").and_then(Value::as_str)?;
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let id = request.get("id").cloned();

    dispatcher::dispatch(hub, method, params, id, None).await
}

async fn write_line(stdout: &mut tokio::io::Stdout, value: &Value) -> std::io::Result<()> {
    let mut bytes =
        serde_json::to_vec(value).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    bytes.push(b'\n');
    stdout.write_all(&bytes).await?;
    stdout.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;

    #[tokio::test]
    async fn malformed_line_yields_a_parse_error_response() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = handle_line(&hub, "{ not json").await.unwrap();
        assert_eq!(response["error"]["code"], serde_json::json!(-32700));
    }

    #[tokio::test]
    async fn ping_request_round_trips_through_the_dispatcher() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = handle_line(&hub, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn notification_without_id_yields_no_response() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = handle_line(&hub, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert!(response.is_none());
    }
}
