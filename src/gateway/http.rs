//! HTTP frontend of the Upstream Gateway (spec §4.8, exact shapes in §6):
//! `POST /` dispatches one JSON-RPC message, `GET /` opens an SSE stream
//! for server-initiated notifications, `DELETE /` destroys a session.
//!
//! Grounded in the teacher's `proxy/server.rs` (axum router, CORS layer,
//! `Json`/`StatusCode` handler shapes) but re-routed through the single
//! Dispatcher instead of per-connection `McpConnection::execute_request`.

use crate::dispatcher;
use crate::hub::Hub;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
struct GatewayState {
    hub: Arc<Hub>,
    notifications: broadcast::Sender<Value>,
}

/// Build the axum router and wire the Hub's HTTP notification sink to a
/// broadcast channel every `GET /` subscribes to (spec §4.6 two-sink
/// design: this is the "HTTP sink" half).
pub fn build_router(hub: Arc<Hub>) -> Router {
    let (tx, _rx) = broadcast::channel(256);
    let sink_tx = tx.clone();
    let relay = Arc::clone(&hub.relay);
    tokio::spawn(async move {
        relay
            .set_http_sink(Some(Arc::new(move |v: Value| {
                let _ = sink_tx.send(v);
            })))
            .await;
    });

    let state = GatewayState { hub, notifications: tx };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(get_stream).post(post_message).delete(delete_session))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP gateway on `port` until the process is asked to shut down
/// (spec §4.8: "HTTP surface"). Binds on all interfaces the way the
/// teacher's `start_proxy_server` binds 127.0.0.1, generalized since the
/// hub may be reached from other hosts.
pub async fn serve(hub: Arc<Hub>, port: u16) -> anyhow::Result<()> {
    let app = build_router(hub);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("upstream HTTP gateway listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn internal_error_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": Value::Null,
        "error": { "code": -32603, "message": "internal error" },
    })
}

/// `POST /` (spec §6): parse the body as a single JSON-RPC message,
/// dispatch it, and attach `mcp-session-id` to the response headers. A
/// missing `mcp-session-id` header creates a fresh session (spec §4.7).
async fn post_message(State(state): State<GatewayState>, headers: HeaderMap, body: Bytes) -> Response {
    let session_id = resolve_session(&state, &headers).await;

    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("malformed JSON-RPC body: {e}");
            return internal_error_response(session_id);
        }
    };

    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return internal_error_response(session_id);
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let id = request.get("id").cloned();

    let response = dispatcher::dispatch(&state.hub, method, params, id, Some(&session_id)).await;

    let mut resp = match response {
        Some(value) => Json(value).into_response(),
        None => Json(Value::Null).into_response(),
    };
    resp.headers_mut().insert("mcp-session-id", session_id.parse().unwrap());
    resp
}

fn internal_error_response(session_id: String) -> Response {
    let mut resp = (StatusCode::INTERNAL_SERVER_ERROR, Json(internal_error_body())).into_response();
    if let Ok(value) = session_id.parse() {
        resp.headers_mut().insert("mcp-session-id", value);
    }
    resp
}

/// `GET /` (spec §6): open an SSE stream, emitting `{"type":"ready"}`
/// immediately and then every notification the Hub forwards.
async fn get_stream(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let session_id = header_session_id(&headers).ok_or(StatusCode::BAD_REQUEST)?;
    state.hub.sessions.touch(&session_id).await;

    let ready = futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().data(json!({ "type": "ready" }).to_string()))
    });

    let rx = state.notifications.subscribe();
    let rest = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|item| async move { item.ok() })
        .map(|v| Ok::<_, Infallible>(Event::default().data(v.to_string())));

    let stream = ready.chain(rest);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `DELETE /` (spec §6): destroy a session, 204 on success, 400 if no
/// session id header was supplied.
async fn delete_session(State(state): State<GatewayState>, headers: HeaderMap) -> StatusCode {
    let Some(session_id) = header_session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    state.hub.sessions.destroy(&session_id).await;
    StatusCode::NO_CONTENT
}

fn header_session_id(headers: &HeaderMap) -> Option<String> {
    headers.get(SESSION_HEADER)?.to_str().ok().map(str::to_string)
}

async fn resolve_session(state: &GatewayState, headers: &HeaderMap) -> String {
    if let Some(id) = header_session_id(headers) {
        if let Some(session) = state.hub.sessions.touch(&id).await {
            return session.session_id;
        }
    }
    state.hub.sessions.create().await.session_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;

    #[tokio::test]
    async fn post_without_session_header_mints_a_fresh_one() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let state = GatewayState { hub, notifications: broadcast::channel(4).0 };
        let session_id = resolve_session(&state, &HeaderMap::new()).await;
        assert!(uuid::Uuid::parse_str(&session_id).is_ok());
    }

    #[tokio::test]
    async fn header_session_id_extracts_the_value() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, "abc-123".parse().unwrap());
        assert_eq!(header_session_id(&headers), Some("abc-123".to_string()));
    }

    #[tokio::test]
    async fn header_session_id_is_none_when_absent() {
        assert_eq!(header_session_id(&HeaderMap::new()), None);
    }
}
