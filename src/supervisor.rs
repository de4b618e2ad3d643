//! Server Supervisor (spec §4.2): the per-server state machine, discovery
//! sequencing, health checks, and auto-restart budgeting. Grounded in the
//! teacher's `McpConnection` (connect → fetch_capabilities → periodic
//! `health_check_cycle` in `manager.rs`), generalized from the teacher's
//! single implicit "retry forever" policy into the budgeted state machine
//! the spec requires.

use crate::connector::{connect_with_retry, RetryPolicy};
use crate::downstream::{DownstreamClient, EventSink};
use crate::error::HubError;
use crate::types::{OriginalPrompt, OriginalResource, OriginalTool, ServerOptions, ServerSpec, ServerStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

const MAX_CONSECUTIVE_RESOURCE_FAILURES: u32 = 3;

/// Result of a full discovery pass (spec §4.2 "sequentially invokes
/// tools/list, resources/list, prompts/list").
#[derive(Debug, Default, Clone)]
pub struct Discovery {
    pub tools: Vec<OriginalTool>,
    pub resources: Vec<OriginalResource>,
    pub resources_unsupported: bool,
    pub prompts: Vec<OriginalPrompt>,
    pub prompts_unsupported: bool,
}

/// `restarting` backoff schedule: `0s, 5s, 15s` capped at 30s (spec §4.2).
fn restart_backoff(attempt: u32) -> Duration {
    match attempt {
        0 => Duration::from_secs(0),
        1 => Duration::from_secs(5),
        2 => Duration::from_secs(15),
        _ => Duration::from_secs(30),
    }
}

fn is_method_not_found(err: &rmcp::ServiceError) -> bool {
    match err {
        rmcp::ServiceError::McpError(data) => i32::from(data.code) == -32601,
        _ => false,
    }
}

/// One configured downstream server and its lifecycle state. Owned
/// exclusively by the Hub Coordinator's server map (spec §3 "Ownership").
pub struct Supervisor {
    pub id: String,
    spec: ServerSpec,
    options: ServerOptions,
    client: Mutex<Option<DownstreamClient>>,
    status: Mutex<ServerStatus>,
    last_error: Mutex<Option<String>>,
    health_check_failures: AtomicU32,
    auto_restart_attempts: AtomicU32,
    resource_failures: AtomicU32,
    resource_circuit_open: std::sync::atomic::AtomicBool,
    last_restart_at: Mutex<Option<SystemTime>>,
    max_health_check_failures: u32,
    max_auto_restart_attempts: u32,
    auto_reconnect: bool,
}

impl Supervisor {
    pub fn new(
        id: String,
        spec: ServerSpec,
        options: ServerOptions,
        max_health_check_failures: u32,
        max_auto_restart_attempts: u32,
        auto_reconnect: bool,
    ) -> Self {
        Self {
            id,
            spec,
            options,
            client: Mutex::new(None),
            status: Mutex::new(ServerStatus::Stopped),
            last_error: Mutex::new(None),
            health_check_failures: AtomicU32::new(0),
            auto_restart_attempts: AtomicU32::new(0),
            resource_failures: AtomicU32::new(0),
            resource_circuit_open: std::sync::atomic::AtomicBool::new(false),
            last_restart_at: Mutex::new(None),
            max_health_check_failures,
            max_auto_restart_attempts,
            auto_reconnect,
        }
    }

    pub async fn status(&self) -> ServerStatus {
        *self.status.lock().await
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.options.start_mode, crate::types::StartMode::Lazy)
    }

    /// `"remote"` or `"local"`, and the identifying url/command, for the
    /// `hatago://servers` resource (spec §6).
    pub fn kind_and_address(&self) -> (&'static str, Option<String>, Option<String>) {
        match &self.spec {
            ServerSpec::Subprocess { command, .. } => ("local", None, Some(command.clone())),
            ServerSpec::Remote { url, .. } => ("remote", Some(url.clone()), None),
        }
    }

    async fn set_status(&self, status: ServerStatus) {
        *self.status.lock().await = status;
    }

    /// Connect with bounded retries; on success, run discovery once.
    /// (spec §4.2 "On success, the supervisor sequentially invokes...")
    pub async fn connect(&self, sink: EventSink) -> Result<Discovery, HubError> {
        self.set_status(ServerStatus::Connecting).await;

        let policy = RetryPolicy {
            max_retries: 3,
            connect_timeout: self.options.connect_timeout_ms.map(Duration::from_millis),
        };

        let client = connect_with_retry(&self.id, &self.spec, policy, sink).await;
        let client = match client {
            Ok(c) => c,
            Err(e) => {
                *self.last_error.lock().await = Some(e.to_string());
                self.set_status(ServerStatus::Error).await;
                return Err(e);
            }
        };

        let discovery = self.discover(&client).await;
        *self.client.lock().await = Some(client);
        self.set_status(ServerStatus::Connected).await;
        self.health_check_failures.store(0, Ordering::SeqCst);
        Ok(discovery)
    }

    /// Benign probe used both as a health check and, transitively, as the
    /// capability-discovery entry point (spec §4.2 "the probe is a benign
    /// MCP request that all servers must support, e.g. tools/list").
    pub async fn health_check(&self) -> bool {
        if self.status().await != ServerStatus::Connected {
            return true; // skipped, not failed (spec §4.2)
        }
        let guard = self.client.lock().await;
        let Some(client) = guard.as_ref() else {
            return false;
        };
        match client.list_tools().await {
            Ok(_) => {
                self.health_check_failures.store(0, Ordering::SeqCst);
                true
            }
            Err(e) => {
                tracing::debug!(server_id = %self.id, "health check failed: {}", e);
                self.health_check_failures.fetch_add(1, Ordering::SeqCst);
                false
            }
        }
    }

    pub fn health_check_failures(&self) -> u32 {
        self.health_check_failures.load(Ordering::SeqCst)
    }

    pub fn auto_restart_attempts(&self) -> u32 {
        self.auto_restart_attempts.load(Ordering::SeqCst)
    }

    pub async fn last_restart_at(&self) -> Option<SystemTime> {
        *self.last_restart_at.lock().await
    }

    /// Whether enough consecutive health-check failures have accrued to
    /// warrant entering `restarting` (spec §4.2).
    pub fn should_restart(&self) -> bool {
        self.auto_reconnect && self.health_check_failures() >= self.max_health_check_failures
    }

    /// Attempt one restart cycle: drop the old client, reconnect, and
    /// either return to `connected` (resetting counters) or, once the
    /// restart budget is exhausted, settle into `crashed` (spec §4.2).
    pub async fn restart(&self, sink: EventSink) -> Result<Discovery, HubError> {
        self.set_status(ServerStatus::Restarting).await;
        *self.last_restart_at.lock().await = Some(SystemTime::now());

        let attempt = self.auto_restart_attempts.load(Ordering::SeqCst);
        if attempt > 0 {
            tokio::time::sleep(restart_backoff(attempt)).await;
        }

        if let Some(old) = self.client.lock().await.take() {
            let _ = old.cancel().await;
        }

        match self.connect(sink).await {
            Ok(discovery) => {
                self.auto_restart_attempts.store(0, Ordering::SeqCst);
                self.resource_failures.store(0, Ordering::SeqCst);
                self.resource_circuit_open.store(false, Ordering::SeqCst);
                Ok(discovery)
            }
            Err(e) => {
                let next = self.auto_restart_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if next >= self.max_auto_restart_attempts {
                    self.set_status(ServerStatus::Crashed).await;
                } else {
                    self.set_status(ServerStatus::Error).await;
                }
                Err(e)
            }
        }
    }

    pub async fn stop(&self) {
        if let Some(client) = self.client.lock().await.take() {
            let _ = client.cancel().await;
        }
        self.set_status(ServerStatus::Stopped).await;
    }

    /// Record one `resources/list` failure; trip the circuit breaker
    /// after `MAX_CONSECUTIVE_RESOURCE_FAILURES` (spec §4.2).
    fn record_resource_failure(&self) {
        let failures = self.resource_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= MAX_CONSECUTIVE_RESOURCE_FAILURES {
            self.resource_circuit_open.store(true, Ordering::SeqCst);
        }
    }

    pub fn resource_circuit_open(&self) -> bool {
        self.resource_circuit_open.load(Ordering::SeqCst)
    }

    pub async fn call_tool(
        &self,
        params: rmcp::model::CallToolRequestParams,
    ) -> Result<rmcp::model::CallToolResult, HubError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| HubError::TransportClosed {
            server_id: self.id.clone(),
        })?;
        client.call_tool(params).await.map_err(|e| HubError::DownstreamError {
            server_id: self.id.clone(),
            code: -32603,
            message: e.to_string(),
            data: None,
        })
    }

    pub async fn read_resource(
        &self,
        params: rmcp::model::ReadResourceRequestParams,
    ) -> Result<rmcp::model::ReadResourceResult, HubError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| HubError::TransportClosed {
            server_id: self.id.clone(),
        })?;
        client.read_resource(params).await.map_err(|e| HubError::DownstreamError {
            server_id: self.id.clone(),
            code: -32603,
            message: e.to_string(),
            data: None,
        })
    }

    /// The per-server `requestTimeout` clamped to the hub-wide default of 30s
    /// (spec §4.5 "whichever is smaller of the spec's requestTimeout and the
    /// hub default").
    pub fn request_timeout(&self) -> Duration {
        const HUB_DEFAULT: Duration = Duration::from_secs(30);
        match self.options.request_timeout_ms {
            Some(millis) => Duration::from_millis(millis).min(HUB_DEFAULT),
            None => HUB_DEFAULT,
        }
    }

    pub async fn get_prompt(
        &self,
        params: rmcp::model::GetPromptRequestParams,
    ) -> Result<rmcp::model::GetPromptResult, HubError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| HubError::TransportClosed {
            server_id: self.id.clone(),
        })?;
        client.get_prompt(params).await.map_err(|e| HubError::DownstreamError {
            server_id: self.id.clone(),
            code: -32603,
            message: e.to_string(),
            data: None,
        })
    }

    /// Re-run discovery against the currently connected client, used when
    /// a downstream `*/list_changed` notification arrives outside of the
    /// initial connect (spec §4.6: per-server mutations emit their own
    /// `tools/list_changed` outside startup).
    pub async fn rediscover(&self) -> Option<Discovery> {
        let guard = self.client.lock().await;
        let client = guard.as_ref()?;
        Some(self.discover(client).await)
    }

    /// Sequential `tools/list` → `resources/list` → `prompts/list`, treating
    /// `-32601` on the latter two as capability-unsupported rather than a
    /// connect failure (spec §4.2, §7 `CapabilityUnsupported`). Resource
    /// discovery respects the circuit breaker tripped by
    /// `record_resource_failure`.
    async fn discover(&self, client: &DownstreamClient) -> Discovery {
        let mut discovery = Discovery::default();

        match client.list_tools().await {
            Ok(result) => {
                discovery.tools = result
                    .tools
                    .into_iter()
                    .map(|t| OriginalTool {
                        name: t.name.to_string(),
                        description: t.description.map(|d| d.to_string()),
                        input_schema: serde_json::to_value(&t.input_schema).unwrap_or_default(),
                    })
                    .collect();
            }
            Err(e) => tracing::warn!(server_id = %self.id, "tools/list failed: {}", e),
        }

        if self.resource_circuit_open() {
            discovery.resources_unsupported = true;
        } else {
            match client.list_resources().await {
                Ok(result) => {
                    self.resource_failures.store(0, Ordering::SeqCst);
                    discovery.resources = result
                        .resources
                        .into_iter()
                        .map(|r| OriginalResource {
                            uri: r.uri.to_string(),
                            name: Some(r.name.to_string()),
                            description: r.description.map(|d| d.to_string()),
                            mime_type: r.mime_type.map(|m| m.to_string()),
                        })
                        .collect();
                }
                Err(e) if is_method_not_found(&e) => {
                    discovery.resources_unsupported = true;
                }
                Err(e) => {
                    tracing::debug!(server_id = %self.id, "resources/list failed: {}", e);
                    self.record_resource_failure();
                }
            }
        }

        match client.list_prompts().await {
            Ok(result) => {
                discovery.prompts = result
                    .prompts
                    .into_iter()
                    .map(|p| OriginalPrompt {
                        name: p.name.to_string(),
                        description: p.description.map(|d| d.to_string()),
                        arguments: serde_json::to_value(&p.arguments).unwrap_or_default(),
                    })
                    .collect();
            }
            Err(e) if is_method_not_found(&e) => {
                discovery.prompts_unsupported = true;
            }
            Err(e) => tracing::debug!(server_id = %self.id, "prompts/list failed: {}", e),
        }

        discovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_backoff_follows_spec_schedule_capped_at_30s() {
        assert_eq!(restart_backoff(0), Duration::from_secs(0));
        assert_eq!(restart_backoff(1), Duration::from_secs(5));
        assert_eq!(restart_backoff(2), Duration::from_secs(15));
        assert_eq!(restart_backoff(3), Duration::from_secs(30));
        assert_eq!(restart_backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn request_timeout_falls_back_to_hub_default_when_unset() {
        let sup = Supervisor::new(
            "fs".to_string(),
            ServerSpec::Subprocess {
                command: "mcp-fs".to_string(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            ServerOptions::default(),
            3,
            3,
            true,
        );
        assert_eq!(sup.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn request_timeout_uses_the_smaller_of_override_and_hub_default() {
        let sup = Supervisor::new(
            "fs".to_string(),
            ServerSpec::Subprocess {
                command: "mcp-fs".to_string(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            ServerOptions { request_timeout_ms: Some(5_000), ..ServerOptions::default() },
            3,
            3,
            true,
        );
        assert_eq!(sup.request_timeout(), Duration::from_secs(5));

        let sup_over_default = Supervisor::new(
            "fs".to_string(),
            ServerSpec::Subprocess {
                command: "mcp-fs".to_string(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            ServerOptions { request_timeout_ms: Some(60_000), ..ServerOptions::default() },
            3,
            3,
            true,
        );
        assert_eq!(sup_over_default.request_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn fresh_supervisor_starts_stopped_with_zero_failures() {
        let sup = Supervisor::new(
            "fs".to_string(),
            ServerSpec::Subprocess {
                command: "mcp-fs".to_string(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            ServerOptions::default(),
            3,
            3,
            true,
        );
        assert_eq!(sup.status().await, ServerStatus::Stopped);
        assert_eq!(sup.health_check_failures(), 0);
        assert!(!sup.resource_circuit_open());
    }

    #[tokio::test]
    async fn should_restart_once_failures_reach_threshold() {
        let sup = Supervisor::new(
            "fs".to_string(),
            ServerSpec::Subprocess {
                command: "mcp-fs".to_string(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            ServerOptions::default(),
            3,
            3,
            true,
        );
        for _ in 0..3 {
            sup.health_check_failures.fetch_add(1, Ordering::SeqCst);
        }
        assert!(sup.should_restart());
    }

    #[test]
    fn resource_circuit_trips_after_three_consecutive_failures() {
        let sup = Supervisor::new(
            "fs".to_string(),
            ServerSpec::Subprocess {
                command: "mcp-fs".to_string(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            ServerOptions::default(),
            3,
            3,
            true,
        );
        sup.record_resource_failure();
        assert!(!sup.resource_circuit_open());
        sup.record_resource_failure();
        sup.record_resource_failure();
        assert!(sup.resource_circuit_open());
    }
}
