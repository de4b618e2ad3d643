//! Hub Coordinator (spec §2 component table, §3 "Ownership"): owns the
//! server map and the three capability registries, batches startup
//! notifications, and exposes the toolset revision/hash. This is the one
//! place that holds a `Server → Client` edge; everything downstream talks
//! back to it only through the callback captured at connect time (spec
//! §9), never a back-pointer.

use crate::config::HubConfig;
use crate::downstream::DownstreamEvent;
use crate::registry::prompts::PromptRegistry;
use crate::registry::resources::{ResourceRegistry, SERVERS_RESOURCE_URI};
use crate::registry::tools::ToolRegistry;
use crate::relay::NotificationRelay;
use crate::session::SessionManager;
use crate::supervisor::Supervisor;
use crate::types::{
    PendingProgress, ServerOptions, ServerSnapshot, ServerSpec, ServerStatus, ServersResource,
    ServersResourceEntry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub struct Hub {
    config: HubConfig,
    servers: RwLock<HashMap<String, Arc<Supervisor>>>,
    pub tools: ToolRegistry,
    pub resources: ResourceRegistry,
    pub prompts: PromptRegistry,
    pub revision: crate::revision::RevisionTracker,
    pub relay: Arc<NotificationRelay>,
    pub sessions: SessionManager,
    pending_progress: Mutex<HashMap<String, PendingProgress>>,
    registry_mutation_lock: Mutex<()>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let strategy = config.naming_strategy;
        let separator = config.separator.clone();
        Self {
            servers: RwLock::new(HashMap::new()),
            tools: ToolRegistry::new(strategy, separator.clone()),
            resources: ResourceRegistry::new(strategy, separator.clone()),
            prompts: PromptRegistry::new(strategy, separator),
            revision: crate::revision::RevisionTracker::new(),
            relay: Arc::new(NotificationRelay::new()),
            sessions: SessionManager::new(Duration::from_secs(config.session_ttl_secs)),
            pending_progress: Mutex::new(HashMap::new()),
            registry_mutation_lock: Mutex::new(()),
            config,
        }
    }

    fn event_sink_for(self: &Arc<Self>, server_id: String) -> crate::downstream::EventSink {
        let hub = Arc::clone(self);
        Arc::new(move |event: DownstreamEvent| {
            let hub = Arc::clone(&hub);
            let server_id = server_id.clone();
            tokio::spawn(async move {
                hub.handle_downstream_event(&server_id, event).await;
            });
        })
    }

    async fn handle_downstream_event(&self, server_id: &str, event: DownstreamEvent) {
        match event {
            DownstreamEvent::Progress(params) => {
                self.relay_progress(server_id, params).await;
            }
            DownstreamEvent::ToolListChanged
            | DownstreamEvent::ResourceListChanged
            | DownstreamEvent::PromptListChanged => {
                if let Err(e) = self.refresh_server(server_id).await {
                    tracing::warn!(server_id, "failed to refresh after list_changed: {}", e);
                }
            }
        }
    }

    async fn relay_progress(&self, server_id: &str, params: rmcp::model::ProgressNotificationParam) {
        let token_str = progress_token_to_string(&params.progress_token);
        let pending = self.pending_progress.lock().await;
        let Some(entry) = pending.get(&token_str) else {
            tracing::debug!(server_id, "progress with no pending upstream token, dropping");
            return;
        };
        if entry.server_id != server_id {
            return;
        }
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {
                "progressToken": entry.upstream_progress_token,
                "progress": params.progress,
                "total": params.total,
                "message": params.message,
            }
        });
        drop(pending);
        self.relay.forward(notification).await;
    }

    /// Register a server definition without connecting it (used for both
    /// eager and lazy servers at startup, and for `addServer` calls later).
    pub async fn register_server(
        self: &Arc<Self>,
        id: String,
        spec: ServerSpec,
        options: ServerOptions,
    ) -> Arc<Supervisor> {
        let supervisor = Arc::new(Supervisor::new(
            id.clone(),
            spec,
            options,
            self.config.max_health_check_failures,
            self.config.max_auto_restart_attempts,
            self.config.auto_reconnect,
        ));
        self.servers.write().await.insert(id, Arc::clone(&supervisor));
        supervisor
    }

    pub async fn get_server(&self, id: &str) -> Option<Arc<Supervisor>> {
        self.servers.read().await.get(id).cloned()
    }

    pub async fn server_ids(&self) -> Vec<String> {
        self.servers.read().await.keys().cloned().collect()
    }

    /// Connect one server and publish its discovered capabilities into the
    /// registries (spec §4.2 discovery, §4.3 registration).
    pub async fn connect_and_register(
        self: &Arc<Self>,
        id: &str,
        suppress_notification: bool,
    ) -> anyhow::Result<()> {
        let supervisor = self.get_server(id).await.ok_or_else(|| anyhow::anyhow!("unknown server '{id}'"))?;
        let sink = self.event_sink_for(id.to_string());
        let discovery = supervisor.connect(sink).await?;
        self.publish_discovery(id, discovery).await;
        self.relay.notify_tools_changed(suppress_notification).await;
        Ok(())
    }

    async fn refresh_server(&self, id: &str) -> anyhow::Result<()> {
        let supervisor = self.get_server(id).await.ok_or_else(|| anyhow::anyhow!("unknown server '{id}'"))?;
        if supervisor.status().await != ServerStatus::Connected {
            return Ok(());
        }
        if let Some(discovery) = supervisor.rediscover().await {
            self.publish_discovery(id, discovery).await;
            self.relay.notify_tools_changed(false).await;
        }
        Ok(())
    }

    async fn publish_discovery(&self, id: &str, discovery: crate::supervisor::Discovery) {
        let _guard = self.registry_mutation_lock.lock().await;
        self.tools.register_server(id, discovery.tools).await;
        self.resources.register_server(id, discovery.resources).await;
        self.prompts.register_server(id, discovery.prompts).await;
        let tools = self.tools.get_all().await;
        self.revision.bump(&tools).await;
    }

    /// Connect every eager server concurrently, batching the resulting
    /// `tools/list_changed` into exactly one emission (spec §4.6, §8
    /// scenario 5).
    pub async fn start_eager_servers(self: &Arc<Self>) {
        self.relay.begin_startup_batch().await;

        let eager_ids: Vec<String> = {
            let servers = self.servers.read().await;
            let mut ids = Vec::new();
            for (id, _) in servers.iter() {
                ids.push(id.clone());
            }
            ids
        };

        let mut handles = Vec::new();
        for id in eager_ids {
            let Some(supervisor) = self.get_server(&id).await else { continue };
            if supervisor.is_lazy() {
                continue;
            }
            let hub = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                if let Err(e) = hub.connect_and_register(&id, true).await {
                    tracing::error!(server_id = %id, "eager connect failed: {:#}", e);
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        self.relay.finish_startup_batch().await;
    }

    /// Resolve a public tool name, connecting lazily on demand if needed
    /// (spec §4.5).
    pub async fn resolve_and_ensure_connected(
        self: &Arc<Self>,
        public_name: &str,
    ) -> Result<(String, String), crate::error::HubError> {
        let Some((server_id, original_name)) = self.tools.resolve(public_name).await else {
            return Err(crate::error::HubError::UnknownMethod {
                method: format!("tools/call:{public_name}"),
            });
        };

        let supervisor = self
            .get_server(&server_id)
            .await
            .ok_or_else(|| crate::error::HubError::TransportClosed { server_id: server_id.clone() })?;

        if supervisor.status().await != ServerStatus::Connected && supervisor.is_lazy() {
            self.connect_and_register(&server_id, false)
                .await
                .map_err(|e| crate::error::HubError::ConnectFailed {
                    server_id: server_id.clone(),
                    reason: format!("{e:#}"),
                })?;
        }

        Ok((server_id, original_name))
    }

    /// Mint a fresh downstream progress token and remember the mapping so
    /// a later downstream progress notification can be translated back
    /// (spec §4.5, §9 "always mint a fresh downstream token").
    pub async fn begin_progress(&self, server_id: &str, upstream_token: Option<serde_json::Value>) -> Option<String> {
        let upstream_token = upstream_token?;
        let downstream_token = Uuid::new_v4().to_string();
        self.pending_progress.lock().await.insert(
            downstream_token.clone(),
            PendingProgress {
                upstream_progress_token: upstream_token,
                downstream_progress_token: downstream_token.clone(),
                server_id: server_id.to_string(),
                created_at: SystemTime::now(),
            },
        );
        Some(downstream_token)
    }

    pub async fn end_progress(&self, downstream_token: &str) {
        self.pending_progress.lock().await.remove(downstream_token);
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Content for the internal `hatago://servers` resource (spec §4.3,
    /// §6).
    pub async fn servers_resource(&self) -> ServersResource {
        let mut entries = Vec::new();
        for (id, supervisor) in self.servers.read().await.iter() {
            let status = supervisor.status().await;
            let tools = self.tools.server_keys(id).await;
            let resources = self.resources.server_keys(id).await;
            let prompts = self.prompts.server_keys(id).await;
            let (kind, url, command) = supervisor.kind_and_address();
            entries.push(ServersResourceEntry {
                id: id.clone(),
                status,
                kind,
                url,
                command,
                tools,
                resources,
                prompts,
                error: supervisor.last_error().await,
            });
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        ServersResource { total: entries.len(), servers: entries }
    }

    pub async fn server_snapshot(&self, id: &str) -> Option<ServerSnapshot> {
        let supervisor = self.get_server(id).await?;
        Some(ServerSnapshot {
            id: id.to_string(),
            status: supervisor.status().await,
            last_error: supervisor.last_error().await,
            tools: self.tools.server_keys(id).await.len(),
            resources: self.resources.server_keys(id).await.len(),
            prompts: self.prompts.server_keys(id).await.len(),
            health_check_failures: supervisor.health_check_failures(),
            auto_restart_attempts: supervisor.auto_restart_attempts(),
            is_restarting: supervisor.status().await == ServerStatus::Restarting,
            last_restart_at: supervisor.last_restart_at().await.map(crate::types::format_system_time),
            transport_summary: {
                let (kind, url, command) = supervisor.kind_and_address();
                match (url, command) {
                    (Some(u), _) => format!("{kind}:{u}"),
                    (_, Some(c)) => format!("{kind}:{c}"),
                    _ => kind.to_string(),
                }
            },
        })
    }

    /// Start (or restart, per the supervisor's own budgeting) every
    /// connected server's health check once, returning the ids that
    /// transitioned into `restarting` this cycle (spec §4.2, §5 "health
    /// checks... launched concurrently and awaited with allSettled").
    pub async fn health_check_cycle(self: &Arc<Self>) {
        let ids: Vec<String> = self.server_ids().await;
        let mut handles = Vec::new();
        for id in ids {
            let hub = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let Some(supervisor) = hub.get_server(&id).await else { return };
                if supervisor.status().await != ServerStatus::Connected {
                    return;
                }
                supervisor.health_check().await;
                if supervisor.should_restart() {
                    let sink = hub.event_sink_for(id.clone());
                    match supervisor.restart(sink).await {
                        Ok(discovery) => {
                            hub.publish_discovery(&id, discovery).await;
                            hub.relay.notify_tools_changed(false).await;
                            hub.relay.emit_local(
                                "server:auto-restart-success",
                                serde_json::json!({ "serverId": id }),
                            );
                        }
                        Err(e) => tracing::error!(server_id = %id, "auto-restart failed: {:#}", e),
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub async fn shutdown(&self) {
        for (_, supervisor) in self.servers.read().await.iter() {
            supervisor.stop().await;
        }
    }
}

fn progress_token_to_string(token: &rmcp::model::ProgressToken) -> String {
    match &token.0 {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a hub from config, registering (but not connecting) every
/// non-disabled server (spec §6 tag filtering, §3 Server lifecycle).
pub async fn build_from_config(config: HubConfig) -> Arc<Hub> {
    let hub = Arc::new(Hub::new(config.clone()));
    for entry in config.filtered_servers() {
        if entry.disabled {
            continue;
        }
        hub.register_server(entry.id.clone(), entry.spec.clone(), entry.options()).await;
    }
    hub
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;

    #[tokio::test]
    async fn registering_a_server_makes_it_visible_in_server_ids() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        hub.register_server(
            "fs".to_string(),
            ServerSpec::Subprocess {
                command: "mcp-fs".to_string(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            ServerOptions::default(),
        )
        .await;
        assert_eq!(hub.server_ids().await, vec!["fs".to_string()]);
    }

    #[tokio::test]
    async fn unresolved_public_tool_name_is_reported_as_unknown_method() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let err = hub.resolve_and_ensure_connected("nonexistent").await.unwrap_err();
        assert_eq!(err.jsonrpc_code(), -32601);
    }

    #[tokio::test]
    async fn begin_progress_returns_none_without_an_upstream_token() {
        let hub = Hub::new(HubConfig::default());
        assert!(hub.begin_progress("fs", None).await.is_none());
    }

    #[tokio::test]
    async fn begin_progress_mints_a_fresh_token_distinct_from_upstream() {
        let hub = Hub::new(HubConfig::default());
        let upstream = serde_json::json!("U1");
        let downstream = hub.begin_progress("fs", Some(upstream.clone())).await.unwrap();
        assert_ne!(downstream, "U1");
    }
}
