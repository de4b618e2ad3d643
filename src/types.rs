//! Core data model — `ServerSpec`, `Server`, public capability records,
//! `Session`, `PendingProgress`, `ToolsetRevision`.
//!
//! Shapes mirror spec §3; field names follow the teacher's `types.rs`
//! conventions (snake_case wire rename, `Option` + `skip_serializing_if`
//! for optional fields).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// How a downstream server is started relative to hub boot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    Eager,
    Lazy,
}

impl Default for StartMode {
    fn default() -> Self {
        StartMode::Eager
    }
}

/// Transport kind for a remote (non-subprocess) downstream server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteTransportKind {
    Sse,
    Http,
    StreamableHttp,
}

/// Declarative description of one downstream server (spec §3 `ServerSpec`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerSpec {
    Subprocess {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    Remote {
        url: String,
        transport_kind: RemoteTransportKind,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Fields common to either `ServerSpec` variant, carried on `McpServerEntry`
/// (the config-level wrapper, see `config.rs`) rather than on the spec
/// itself, mirroring spec §3's "plus optional ..." phrasing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_timeout_ms: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub start_mode: StartMode,
    #[serde(default)]
    pub disabled: bool,
}

/// Runtime lifecycle state of a downstream server (spec §4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Connecting,
    Connected,
    Error,
    Restarting,
    Crashed,
    Stopped,
}

/// Public-facing description of a tool as discovered from a downstream
/// server — kept close to what the server returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginalTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginalResource {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginalPrompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A tool entity as exposed to the upstream client — union-of-servers,
/// keyed by its namespaced public name (spec §3 `PublicTool`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTool {
    pub name: String,
    pub server_id: String,
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicResource {
    pub uri: String,
    pub server_id: String,
    pub original_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPrompt {
    pub name: String,
    pub server_id: String,
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Runtime record for one configured downstream server (spec §3 `Server`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub id: String,
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
    pub health_check_failures: u32,
    pub auto_restart_attempts: u32,
    pub is_restarting: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restart_at: Option<String>,
    pub transport_summary: String,
}

/// `hatago://servers` entry shape (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServersResourceEntry {
    pub id: String,
    pub status: ServerStatus,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub tools: Vec<String>,
    pub resources: Vec<String>,
    pub prompts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServersResource {
    pub total: usize,
    pub servers: Vec<ServersResourceEntry>,
}

/// An upstream client session (spec §3 `Session`).
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub created_at: SystemTime,
    pub last_touched_at: SystemTime,
    pub client_capabilities: Option<serde_json::Value>,
}

/// Correlates an upstream progress token with the fresh downstream token
/// minted for one in-flight `tools/call` (spec §3 `PendingProgress`).
#[derive(Debug, Clone)]
pub struct PendingProgress {
    pub upstream_progress_token: serde_json::Value,
    pub downstream_progress_token: String,
    pub server_id: String,
    pub created_at: SystemTime,
}

/// Monotonic revision counter plus a content digest of the toolset
/// (spec §3 `ToolsetRevision`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolsetRevision {
    pub revision: u64,
    pub hash: [u8; 8],
}

impl ToolsetRevision {
    pub fn hash_hex(&self) -> String {
        self.hash.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

pub fn format_system_time(time: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.to_rfc3339()
}
