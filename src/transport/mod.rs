//! Transport Adapter (spec §4.1).
//!
//! The spec describes a uniform `{start, send, close, onMessage}` contract.
//! Concretely we implement each concrete transport as an `rmcp`
//! [`rmcp::transport::worker::Worker`] — the same seam the teacher uses
//! for its legacy-SSE transport (`mcp/legacy_sse.rs`) — which `rmcp`
//! wraps into exactly that `{start, send, close, onMessage}` shape via
//! `WorkerTransport::spawn`. `rmcp`'s built-in subprocess and
//! streamable-HTTP transports already satisfy the same contract
//! natively, so only stdio (for the Content-Length fallback framing) and
//! legacy SSE need a hand-written `Worker`.

pub mod sse;
pub mod stdio;
pub mod streamable_http;

use std::collections::HashMap;

/// Environment variables forced onto every spawned subprocess so that
/// downstream CLIs never emit ANSI color, update-notifier banners, or
/// progress bars onto a channel we parse as protocol (spec §4.1).
pub fn sanitize_env(base: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env = base.clone();
    env.insert("NO_COLOR".to_string(), "1".to_string());
    env.insert("FORCE_COLOR".to_string(), "0".to_string());
    env.insert("CI".to_string(), "1".to_string());
    env.insert("NPM_CONFIG_UPDATE_NOTIFIER".to_string(), "false".to_string());
    env.insert("NPM_CONFIG_FUND".to_string(), "false".to_string());
    env.insert("NPM_CONFIG_PROGRESS".to_string(), "false".to_string());
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_env_preserves_caller_vars_and_adds_suppressions() {
        let mut base = HashMap::new();
        base.insert("API_KEY".to_string(), "secret".to_string());
        let env = sanitize_env(&base);
        assert_eq!(env.get("API_KEY").map(String::as_str), Some("secret"));
        assert_eq!(env.get("NO_COLOR").map(String::as_str), Some("1"));
        assert_eq!(
            env.get("NPM_CONFIG_UPDATE_NOTIFIER").map(String::as_str),
            Some("false")
        );
    }
}
