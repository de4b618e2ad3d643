//! Crate-wide error taxonomy.
//!
//! Internal plumbing (config loading, process spawn, transport IO) uses
//! `anyhow::Result` the way the teacher's `config.rs`/`connection.rs` do.
//! Anything that crosses the JSON-RPC boundary is normalized into a
//! [`HubError`] so the dispatcher can map it to a wire error code.

use thiserror::Error;

/// The error kinds from the hub's error-handling design. Each variant maps
/// to exactly one JSON-RPC error surface.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("transport closed for server '{server_id}'")]
    TransportClosed { server_id: String },

    #[error("failed to connect to server '{server_id}': {reason}")]
    ConnectFailed { server_id: String, reason: String },

    #[error("tool call timed out after {millis}ms")]
    DownstreamTimeout { millis: u64 },

    #[error("capability unsupported by server '{server_id}': {method}")]
    CapabilityUnsupported { server_id: String, method: String },

    #[error("downstream error from '{server_id}': {message}")]
    DownstreamError {
        server_id: String,
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("method not found: {method}")]
    UnknownMethod { method: String },

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl HubError {
    /// The JSON-RPC 2.0 error code this kind surfaces as, per spec §4.4/§7.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            HubError::UnknownMethod { .. } => -32601,
            HubError::DownstreamError { code, .. } => *code,
            HubError::TransportClosed { .. }
            | HubError::ConnectFailed { .. }
            | HubError::DownstreamTimeout { .. }
            | HubError::CapabilityUnsupported { .. }
            | HubError::InternalError(_)
            | HubError::ConfigInvalid(_) => -32603,
        }
    }

    /// Render as a JSON-RPC error object `{code, message, data?}`.
    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        if let HubError::DownstreamError { message, data, .. } = self {
            let mut obj = serde_json::json!({
                "code": self.jsonrpc_code(),
                "message": message,
            });
            if let Some(data) = data {
                obj["data"] = data.clone();
            }
            return obj;
        }
        serde_json::json!({
            "code": self.jsonrpc_code(),
            "message": self.to_string(),
        })
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HubError::InternalError(msg.into())
    }
}

impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        HubError::InternalError(format!("{:#}", err))
    }
}

/// Redact an `Authorization` header value for logs and error messages,
/// per spec §6/§7 ("redaction of authorization headers is mandatory").
pub fn redact_header(name: &str, value: &str) -> String {
    if !name.eq_ignore_ascii_case("authorization") {
        return value.to_string();
    }
    if let Some(rest) = value.strip_prefix("Bearer ") {
        let _ = rest;
        "Bearer ***".to_string()
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bearer_tokens() {
        assert_eq!(
            redact_header("Authorization", "Bearer abc123"),
            "Bearer ***"
        );
        assert_eq!(redact_header("Authorization", "Basic xyz"), "***");
        assert_eq!(redact_header("X-Other", "plain"), "plain");
    }

    #[test]
    fn unknown_method_maps_to_32601() {
        let e = HubError::UnknownMethod {
            method: "foo/bar".into(),
        };
        assert_eq!(e.jsonrpc_code(), -32601);
    }

    #[test]
    fn downstream_error_preserves_original_code() {
        let e = HubError::DownstreamError {
            server_id: "fs".into(),
            code: -32000,
            message: "boom".into(),
            data: None,
        };
        assert_eq!(e.jsonrpc_code(), -32000);
    }
}
