//! Legacy SSE transport (spec §4.1, §6.2): GET `/sse` opens an event
//! stream whose first event carries the `endpoint` to POST subsequent
//! JSON-RPC messages to, keyed by `sessionId`. Grounded in the teacher's
//! own hand-rolled legacy-SSE worker (it needed one too, for the same
//! reason: `rmcp`'s built-in SSE client only speaks the newer framing).

use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::worker::{Worker, WorkerConfig, WorkerContext, WorkerQuitReason, WorkerSendRequest};
use rmcp::RoleClient;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::StreamExt;

#[derive(Debug, Error)]
pub enum LegacySseError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sse stream ended before an endpoint event arrived")]
    NoEndpointEvent,
    #[error("invalid endpoint event data: {0}")]
    InvalidEndpoint(String),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("tokio join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

pub struct LegacySseWorker {
    sse_url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl LegacySseWorker {
    pub fn new(sse_url: String, headers: HashMap<String, String>) -> Self {
        Self {
            sse_url,
            headers,
            client: reqwest::Client::new(),
        }
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        let mut map = reqwest::header::HeaderMap::new();
        for (k, v) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                map.insert(name, value);
            }
        }
        map
    }

    /// Resolve the base origin (scheme + host + port) the `endpoint`
    /// event's path is relative to.
    fn origin(&self) -> Result<String, LegacySseError> {
        let parsed = reqwest::Url::parse(&self.sse_url)
            .map_err(|e| LegacySseError::InvalidEndpoint(e.to_string()))?;
        Ok(format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            parsed.port().map(|p| format!(":{p}")).unwrap_or_default()
        ))
    }
}

impl Worker for LegacySseWorker {
    type Role = RoleClient;
    type Error = LegacySseError;

    fn err_closed() -> Self::Error {
        LegacySseError::ChannelClosed
    }

    fn err_join(e: tokio::task::JoinError) -> Self::Error {
        LegacySseError::JoinError(e)
    }

    fn config(&self) -> WorkerConfig {
        WorkerConfig {
            name: Some(format!("LegacySseWorker({})", self.sse_url)),
            channel_buffer_capacity: 16,
        }
    }

    async fn run(self, mut context: WorkerContext<Self>) -> Result<(), WorkerQuitReason<Self::Error>> {
        let ct = context.cancellation_token.clone();
        let origin = self.origin().map_err(|e| WorkerQuitReason::fatal(e, "resolve SSE origin"))?;

        let response = self
            .client
            .get(&self.sse_url)
            .headers(self.build_headers())
            .send()
            .await
            .map_err(|e| WorkerQuitReason::fatal(LegacySseError::Http(e), "open SSE stream"))?;

        let mut events = sse_stream::SseStream::from_byte_stream(response.bytes_stream());

        let (msg_tx, mut msg_rx) = tokio::sync::mpsc::channel::<ServerJsonRpcMessage>(16);
        let (endpoint_tx, mut endpoint_rx) = tokio::sync::oneshot::channel::<String>();

        let sse_ct = ct.clone();
        tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            loop {
                tokio::select! {
                    _ = sse_ct.cancelled() => break,
                    next = events.next() => {
                        let Some(event) = next else { break };
                        let Ok(event) = event else { continue };
                        match event.event.as_deref() {
                            Some("endpoint") => {
                                if let Some(tx) = endpoint_tx.take() {
                                    let _ = tx.send(event.data);
                                }
                            }
                            _ => {
                                match serde_json::from_str::<ServerJsonRpcMessage>(&event.data) {
                                    Ok(msg) => {
                                        if msg_tx.send(msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("legacy sse: malformed message, skipping: {}", e);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });

        let endpoint_path = tokio::time::timeout(Duration::from_secs(10), endpoint_rx)
            .await
            .map_err(|_| WorkerQuitReason::fatal(LegacySseError::NoEndpointEvent, "wait for endpoint event"))?
            .map_err(|_| WorkerQuitReason::fatal(LegacySseError::NoEndpointEvent, "endpoint channel closed"))?;

        let post_url = if endpoint_path.starts_with("http://") || endpoint_path.starts_with("https://") {
            endpoint_path
        } else {
            format!("{origin}{endpoint_path}")
        };

        let client = self.client.clone();
        let headers = self.build_headers();

        loop {
            tokio::select! {
                _ = ct.cancelled() => {
                    return Err(WorkerQuitReason::Cancelled);
                }
                handler_msg = context.recv_from_handler() => {
                    let WorkerSendRequest { message, responder }: WorkerSendRequest<ClientJsonRpcMessage, _> = handler_msg?;
                    let result = post_message(&client, &post_url, headers.clone(), &message).await;
                    let _ = responder.send(result);
                }
                server_msg = msg_rx.recv() => {
                    match server_msg {
                        Some(msg) => {
                            context.send_to_handler(msg).await?;
                        }
                        None => {
                            return Err(WorkerQuitReason::fatal(
                                LegacySseError::NoEndpointEvent,
                                "sse stream ended",
                            ));
                        }
                    }
                }
            }
        }
    }
}

async fn post_message(
    client: &reqwest::Client,
    url: &str,
    headers: reqwest::header::HeaderMap,
    message: &ClientJsonRpcMessage,
) -> Result<(), LegacySseError> {
    let body = serde_json::to_vec(message)?;
    client
        .post(url)
        .headers(headers)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path_and_keeps_scheme_host_port() {
        let worker = LegacySseWorker::new("http://localhost:8080/sse".to_string(), HashMap::new());
        assert_eq!(worker.origin().unwrap(), "http://localhost:8080");
    }

    #[test]
    fn origin_omits_port_when_default() {
        let worker = LegacySseWorker::new("https://example.com/sse".to_string(), HashMap::new());
        assert_eq!(worker.origin().unwrap(), "https://example.com");
    }
}
