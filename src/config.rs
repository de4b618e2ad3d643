//! Consumed (not parsed-for-the-user) configuration shape and a loader,
//! grounded in the teacher's `ConfigManager` (`config.rs`). File-watching
//! and CLI argument semantics are external collaborators per spec §1/§7D;
//! this module only loads, validates, and saves a fully-resolved value.

use crate::naming::NamingStrategy;
use crate::types::{RemoteTransportKind, ServerOptions, ServerSpec, StartMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_gateway_port() -> u16 {
    3100
}

fn default_connect_ms() -> u64 {
    10_000
}

fn default_request_ms() -> u64 {
    30_000
}

fn default_keep_alive_ms() -> u64 {
    30_000
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_max_health_check_failures() -> u32 {
    3
}

fn default_max_auto_restart_attempts() -> u32 {
    3
}

fn default_session_ttl_secs() -> u64 {
    3600
}

/// One entry of `mcpServers` in the configuration object (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerEntry {
    pub id: String,
    #[serde(flatten)]
    pub spec: ServerSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_timeout_ms: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, rename = "hatagoOptions")]
    pub hatago_options: Option<HatagoOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HatagoOptions {
    #[serde(default)]
    pub start: Option<StartMode>,
}

impl McpServerEntry {
    pub fn start_mode(&self) -> StartMode {
        self.hatago_options
            .as_ref()
            .and_then(|o| o.start)
            .unwrap_or(StartMode::Eager)
    }

    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            connect_timeout_ms: self.connect_timeout_ms,
            request_timeout_ms: self.request_timeout_ms,
            keep_alive_timeout_ms: self.keep_alive_timeout_ms,
            tags: self.tags.clone(),
            start_mode: self.start_mode(),
            disabled: self.disabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_connect_ms", rename = "connectMs")]
    pub connect_ms: u64,
    #[serde(default = "default_request_ms", rename = "requestMs")]
    pub request_ms: u64,
    #[serde(default = "default_keep_alive_ms", rename = "keepAliveMs")]
    pub keep_alive_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            request_ms: default_request_ms(),
            keep_alive_ms: default_keep_alive_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub suppress_list_changed_on_startup: Option<bool>,
}

/// Top-level hub configuration (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: HashMap<String, McpServerEntry>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default, rename = "namingStrategy")]
    pub naming_strategy: NamingStrategy,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_health_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_max_health_check_failures")]
    pub max_health_check_failures: u32,
    #[serde(default = "default_max_auto_restart_attempts")]
    pub max_auto_restart_attempts: u32,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mcp_servers: HashMap::new(),
            timeouts: TimeoutsConfig::default(),
            notifications: NotificationsConfig::default(),
            naming_strategy: NamingStrategy::default(),
            separator: default_separator(),
            tags: Vec::new(),
            auto_reconnect: true,
            max_retries: default_max_retries(),
            health_check_interval_secs: default_health_interval_secs(),
            max_health_check_failures: default_max_health_check_failures(),
            max_auto_restart_attempts: default_max_auto_restart_attempts(),
            session_ttl_secs: default_session_ttl_secs(),
            gateway_port: default_gateway_port(),
        }
    }
}

impl HubConfig {
    /// Servers that pass the configured tag filter (spec §6: "a server is
    /// included only if its tags intersect").
    pub fn filtered_servers(&self) -> Vec<&McpServerEntry> {
        self.mcp_servers
            .values()
            .filter(|entry| {
                if self.tags.is_empty() {
                    return true;
                }
                entry.tags.iter().any(|t| self.tags.contains(t))
            })
            .collect()
    }
}

/// Loads/saves/validates a [`HubConfig`] from a JSON file on disk.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Resolve the default config path via the platform's app-data
    /// convention (`directories`), the way the teacher resolves it from
    /// the Tauri app handle.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("dev", "hatago", "hatago-hub")
            .context("could not resolve a home directory for the default config path")?;
        Ok(dirs.config_dir().join("config.json"))
    }

    pub fn load(&self) -> Result<HubConfig> {
        if !self.config_path.exists() {
            tracing::info!("config file not found at {:?}, using defaults", self.config_path);
            return Ok(HubConfig::default());
        }

        let data = std::fs::read_to_string(&self.config_path).context("failed to read config file")?;
        let config: HubConfig = serde_json::from_str(&data).context("failed to parse config file")?;

        tracing::info!(
            "loaded config with {} servers from {:?}",
            config.mcp_servers.len(),
            self.config_path
        );

        Self::validate(&config).map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn save(&self, config: &HubConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        let data = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        std::fs::write(&self.config_path, data).context("failed to write config file")?;
        tracing::info!("saved config to {:?}", self.config_path);
        Ok(())
    }

    /// Validate a configuration structure (spec §7 `ConfigInvalid`).
    pub fn validate(config: &HubConfig) -> Result<(), String> {
        if config.health_check_interval_secs < 1 {
            return Err("health_check_interval_secs must be >= 1".to_string());
        }

        for (id, entry) in &config.mcp_servers {
            if id.is_empty() {
                return Err("server id cannot be empty".to_string());
            }
            if entry.id != *id {
                return Err(format!(
                    "server '{}': entry.id ('{}') must match its map key",
                    id, entry.id
                ));
            }
            match &entry.spec {
                ServerSpec::Subprocess { command, .. } => {
                    if command.trim().is_empty() {
                        return Err(format!("server '{}': subprocess requires a command", id));
                    }
                }
                ServerSpec::Remote { url, transport_kind, .. } => {
                    if url.trim().is_empty() {
                        return Err(format!("server '{}': remote transport requires a url", id));
                    }
                    let _ = transport_kind;
                }
            }
        }

        Ok(())
    }
}

/// Convenience used by the stdio bridge's `--transport-kind` style flags
/// and tests; maps a `ServerSpec::Remote`'s transport kind to the string
/// the gateway/connectors expect.
pub fn transport_kind_label(kind: RemoteTransportKind) -> &'static str {
    match kind {
        RemoteTransportKind::Sse => "sse",
        RemoteTransportKind::Http => "http",
        RemoteTransportKind::StreamableHttp => "streamable-http",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_default_when_file_missing() {
        let dir = tempdir().unwrap();
        let mgr = ConfigManager::new(dir.path().join("missing.json"));
        let config = mgr.load().unwrap();
        assert!(config.mcp_servers.is_empty());
        assert_eq!(config.gateway_port, default_gateway_port());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mgr = ConfigManager::new(dir.path().join("config.json"));
        let mut config = HubConfig::default();
        config.mcp_servers.insert(
            "fs".to_string(),
            McpServerEntry {
                id: "fs".to_string(),
                spec: ServerSpec::Subprocess {
                    command: "mcp-fs".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                    cwd: None,
                },
                connect_timeout_ms: None,
                request_timeout_ms: None,
                keep_alive_timeout_ms: None,
                tags: vec![],
                disabled: false,
                hatago_options: None,
            },
        );

        mgr.save(&config).unwrap();
        let loaded = mgr.load().unwrap();
        assert_eq!(loaded.mcp_servers.len(), 1);
        assert!(loaded.mcp_servers.contains_key("fs"));
    }

    #[test]
    fn validate_rejects_empty_subprocess_command() {
        let mut config = HubConfig::default();
        config.mcp_servers.insert(
            "fs".to_string(),
            McpServerEntry {
                id: "fs".to_string(),
                spec: ServerSpec::Subprocess {
                    command: "".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                    cwd: None,
                },
                connect_timeout_ms: None,
                request_timeout_ms: None,
                keep_alive_timeout_ms: None,
                tags: vec![],
                disabled: false,
                hatago_options: None,
            },
        );
        assert!(ConfigManager::validate(&config).is_err());
    }

    #[test]
    fn tag_filtering_keeps_only_intersecting_servers() {
        let mut config = HubConfig::default();
        config.tags = vec!["prod".to_string()];
        config.mcp_servers.insert(
            "fs".to_string(),
            McpServerEntry {
                id: "fs".to_string(),
                spec: ServerSpec::Subprocess {
                    command: "mcp-fs".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                    cwd: None,
                },
                connect_timeout_ms: None,
                request_timeout_ms: None,
                keep_alive_timeout_ms: None,
                tags: vec!["dev".to_string()],
                disabled: false,
                hatago_options: None,
            },
        );
        config.mcp_servers.insert(
            "web".to_string(),
            McpServerEntry {
                id: "web".to_string(),
                spec: ServerSpec::Subprocess {
                    command: "mcp-web".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                    cwd: None,
                },
                connect_timeout_ms: None,
                request_timeout_ms: None,
                keep_alive_timeout_ms: None,
                tags: vec!["prod".to_string()],
                disabled: false,
                hatago_options: None,
            },
        );

        let filtered = config.filtered_servers();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "web");
    }
}
