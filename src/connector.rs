//! Connector & Retry (spec §4.2 "Connection policy"): builds the right
//! transport for a `ServerSpec` and connects with bounded retries and
//! exponential backoff. Grounded in the teacher's `connect_stdio` /
//! `connect_sse` / `connect_http` dispatch inside `McpConnection::connect`.

use crate::downstream::{DownstreamClient, HubClientHandler};
use crate::error::HubError;
use crate::transport::{sse::LegacySseWorker, stdio::StdioWorker, streamable_http};
use crate::types::{RemoteTransportKind, ServerSpec};
use rmcp::transport::worker::WorkerTransport;
use rmcp::ServiceExt;
use std::time::Duration;

/// Default bounded-retry policy (spec §4.2): `maxRetries` attempts,
/// `500·2^i` ms between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub connect_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            connect_timeout: None,
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt))
}

/// Attempt to connect to `spec` for `server_id`, retrying per `policy`.
/// `sink` is forwarded unchanged into the `HubClientHandler` bound to
/// the new connection.
pub async fn connect_with_retry(
    server_id: &str,
    spec: &ServerSpec,
    policy: RetryPolicy,
    sink: crate::downstream::EventSink,
) -> Result<DownstreamClient, HubError> {
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..policy.max_retries {
        let attempt_fut = connect_once(server_id, spec, sink.clone());
        let result = match policy.connect_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, attempt_fut).await {
                Ok(r) => r,
                Err(_) => Err(anyhow::anyhow!("connect timed out after {:?}", timeout)),
            },
            None => attempt_fut.await,
        };

        match result {
            Ok(client) => return Ok(client),
            Err(e) => {
                tracing::warn!(server_id, attempt, "connect attempt failed: {:#}", e);
                last_err = Some(e);
                if attempt + 1 < policy.max_retries {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }

    Err(HubError::ConnectFailed {
        server_id: server_id.to_string(),
        reason: last_err.map(|e| format!("{e:#}")).unwrap_or_default(),
    })
}

async fn connect_once(
    server_id: &str,
    spec: &ServerSpec,
    sink: crate::downstream::EventSink,
) -> anyhow::Result<DownstreamClient> {
    let handler = HubClientHandler::new(sink);

    match spec {
        ServerSpec::Subprocess { command, args, env, cwd } => {
            let worker = StdioWorker::new(command.clone(), args.clone(), env.clone(), cwd.clone());
            let transport = WorkerTransport::spawn(worker);
            let service = handler.serve(transport).await?;
            Ok(DownstreamClient::new(server_id.to_string(), service))
        }
        ServerSpec::Remote { url, transport_kind, headers } => match transport_kind {
            RemoteTransportKind::Sse => {
                let worker = LegacySseWorker::new(url.clone(), headers.clone());
                let transport = WorkerTransport::spawn(worker);
                let service = handler.serve(transport).await?;
                Ok(DownstreamClient::new(server_id.to_string(), service))
            }
            RemoteTransportKind::Http | RemoteTransportKind::StreamableHttp => {
                let transport = streamable_http::build_transport(url, headers)?;
                let service = handler.serve(transport).await?;
                Ok(DownstreamClient::new(server_id.to_string(), service))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_from_500ms() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn default_policy_matches_spec_default_retry_count() {
        assert_eq!(RetryPolicy::default().max_retries, 3);
    }
}
