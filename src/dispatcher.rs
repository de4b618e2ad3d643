//! JSON-RPC Dispatcher (spec §4.4, §4.5): the method table and the
//! `tools/call` pipeline with progress-token translation and per-call
//! timeout. A pure function of `(hub, params, id, sessionId?)` — it does
//! no I/O except through the registries and the Downstream Client, as
//! required by spec §4.4.

use crate::error::HubError;
use crate::hub::Hub;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Dispatch one JSON-RPC request (or notification, if `id` is `None`)
/// and return the response body to write back, or `None` for
/// notifications (spec §4.4: "notifications/initialized — no
/// response").
pub async fn dispatch(
    hub: &Arc<Hub>,
    method: &str,
    params: Value,
    id: Option<Value>,
    session_id: Option<&str>,
) -> Option<Value> {
    if method == "notifications/initialized" {
        return None;
    }

    let id = id.unwrap_or(Value::Null);
    let result = handle_method(hub, method, params, session_id).await;

    match result {
        Ok(value) => Some(json!({ "jsonrpc": "2.0", "id": id, "result": value })),
        Err(err) => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": err.to_jsonrpc_error(),
        })),
    }
}

async fn handle_method(
    hub: &Arc<Hub>,
    method: &str,
    params: Value,
    session_id: Option<&str>,
) -> Result<Value, HubError> {
    match method {
        "initialize" => initialize(hub, params, session_id).await,
        "tools/list" => tools_list(hub).await,
        "tools/call" => tools_call(hub, params).await,
        "resources/list" => resources_list(hub).await,
        "resources/read" => resources_read(hub, params).await,
        "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
        "prompts/list" => prompts_list(hub).await,
        "prompts/get" => prompts_get(hub, params).await,
        "ping" => Ok(json!({})),
        other => Err(HubError::UnknownMethod { method: other.to_string() }),
    }
}

async fn initialize(hub: &Arc<Hub>, params: Value, session_id: Option<&str>) -> Result<Value, HubError> {
    if let Some(session_id) = session_id {
        let capabilities = params.get("capabilities").cloned().unwrap_or(Value::Null);
        hub.sessions.set_client_capabilities(session_id, capabilities).await;
    }
    Ok(json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": "hatago-hub", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": {
            "tools": {},
            "resources": {},
            "prompts": {},
        }
    }))
}

async fn tools_list(hub: &Arc<Hub>) -> Result<Value, HubError> {
    let tools = hub.tools.get_all().await;
    let revision = hub.revision.current().await;
    Ok(json!({
        "tools": tools,
        "_meta": {
            "toolset_hash": revision.hash_hex(),
            "revision": revision.revision,
        }
    }))
}

async fn resources_list(hub: &Arc<Hub>) -> Result<Value, HubError> {
    let mut resources: Vec<Value> = hub
        .resources
        .get_all()
        .await
        .into_iter()
        .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
        .collect();

    let servers_resource = hub.servers_resource().await;
    resources.push(json!({
        "uri": crate::registry::resources::SERVERS_RESOURCE_URI,
        "name": "hatago servers",
        "mimeType": "application/json",
        "description": format!("{} connected downstream servers", servers_resource.total),
    }));

    Ok(json!({ "resources": resources }))
}

async fn resources_read(hub: &Arc<Hub>, params: Value) -> Result<Value, HubError> {
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::internal("resources/read requires a 'uri' parameter"))?;

    if uri == crate::registry::resources::SERVERS_RESOURCE_URI {
        let resource = hub.servers_resource().await;
        let text = serde_json::to_string(&resource).unwrap_or_default();
        return Ok(json!({
            "contents": [{ "uri": uri, "mimeType": "application/json", "text": text }]
        }));
    }

    let Some((server_id, original_uri)) = hub.resources.resolve(uri).await else {
        return Err(HubError::UnknownMethod { method: format!("resources/read:{uri}") });
    };
    let supervisor = hub
        .get_server(&server_id)
        .await
        .ok_or_else(|| HubError::TransportClosed { server_id: server_id.clone() })?;

    let result = with_timeout(
        DEFAULT_TIMEOUT,
        supervisor.read_resource(rmcp::model::ReadResourceRequestParams {
            meta: None,
            uri: original_uri,
        }),
    )
    .await?;

    serde_json::to_value(result).map_err(|e| HubError::internal(e.to_string()))
}

async fn prompts_list(hub: &Arc<Hub>) -> Result<Value, HubError> {
    let prompts = hub.prompts.get_all().await;
    Ok(json!({ "prompts": prompts }))
}

async fn prompts_get(hub: &Arc<Hub>, params: Value) -> Result<Value, HubError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::internal("prompts/get requires a 'name' parameter"))?;

    let Some((server_id, original_name)) = hub.prompts.resolve(name).await else {
        return Err(HubError::UnknownMethod { method: format!("prompts/get:{name}") });
    };
    let supervisor = hub
        .get_server(&server_id)
        .await
        .ok_or_else(|| HubError::TransportClosed { server_id: server_id.clone() })?;

    let arguments = params
        .get("arguments")
        .and_then(|v| v.as_object().cloned());

    let result = with_timeout(
        DEFAULT_TIMEOUT,
        supervisor.get_prompt(rmcp::model::GetPromptRequestParams {
            meta: None,
            name: original_name,
            arguments,
        }),
    )
    .await?;

    serde_json::to_value(result).map_err(|e| HubError::internal(e.to_string()))
}

/// `tools/call` pipeline (spec §4.5): resolve public name, lazily connect
/// if needed, mint+rewrite the progress token, and enforce the per-call
/// timeout.
async fn tools_call(hub: &Arc<Hub>, params: Value) -> Result<Value, HubError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::internal("tools/call requires a 'name' parameter"))?;
    let arguments = params.get("arguments").cloned();
    let upstream_token = params
        .get("_meta")
        .and_then(|m| m.get("progressToken"))
        .cloned();

    let (server_id, original_name) = hub.resolve_and_ensure_connected(name).await?;
    let supervisor = hub
        .get_server(&server_id)
        .await
        .ok_or_else(|| HubError::TransportClosed { server_id: server_id.clone() })?;

    // Mint the fresh downstream token now so it is already registered in
    // the pending-progress map before the call goes out — a progress
    // notification racing the call's own response must still resolve
    // (spec §9 "always mint a fresh downstream token").
    let downstream_token = hub.begin_progress(&server_id, upstream_token).await;

    // Attach the minted token as `_meta.progressToken` on the outbound call
    // (spec §4.5) so the downstream server's progress notifications are
    // addressed to it rather than to the upstream client's own token.
    let meta = downstream_token.as_ref().map(|token| {
        let mut meta = serde_json::Map::new();
        meta.insert("progressToken".to_string(), Value::String(token.clone()));
        meta
    });

    let call_params = rmcp::model::CallToolRequestParams {
        meta,
        name: original_name.into(),
        arguments: arguments.and_then(|v| v.as_object().cloned()),
        task: None,
    };

    let timeout = supervisor.request_timeout();
    let result = with_timeout(timeout, supervisor.call_tool(call_params)).await;

    if let Some(token) = &downstream_token {
        hub.end_progress(token).await;
    }

    let result = result?;
    serde_json::to_value(result).map_err(|e| HubError::internal(e.to_string()))
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Enforce `timeout` around `fut`, the smaller of the hub default (30s) and
/// any server-specific `requestTimeout` (spec §4.5) — the caller picks
/// `timeout` via `Supervisor::request_timeout` for calls with a per-server
/// override, or `DEFAULT_TIMEOUT` otherwise.
async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, HubError>
where
    F: std::future::Future<Output = Result<T, HubError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(HubError::DownstreamTimeout { millis: timeout.as_millis() as u64 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;

    #[tokio::test]
    async fn unknown_method_dispatches_to_method_not_found() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = dispatch(&hub, "frobnicate", json!({}), Some(json!(1)), None)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn initialized_notification_yields_no_response() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = dispatch(&hub, "notifications/initialized", json!({}), None, None).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = dispatch(&hub, "ping", json!({}), Some(json!(1)), None).await.unwrap();
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn tools_list_includes_toolset_metadata() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = dispatch(&hub, "tools/list", json!({}), Some(json!(1)), None).await.unwrap();
        assert!(response["result"]["_meta"]["toolset_hash"].is_string());
        assert_eq!(response["result"]["tools"], json!([]));
    }

    #[tokio::test]
    async fn resources_templates_list_is_always_empty() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = dispatch(&hub, "resources/templates/list", json!({}), Some(json!(1)), None)
            .await
            .unwrap();
        assert_eq!(response["result"]["resourceTemplates"], json!([]));
    }

    #[tokio::test]
    async fn tools_call_on_unresolvable_name_is_method_not_found() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let response = dispatch(
            &hub,
            "tools/call",
            json!({ "name": "nonexistent" }),
            Some(json!(1)),
            None,
        )
        .await
        .unwrap();
        assert_eq!(response["error"]["code"], json!(-32601));
    }
}
