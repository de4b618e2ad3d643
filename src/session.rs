//! Session Manager (spec §4.7): UUID v4 session IDs, TTL eviction on
//! access. No background sweep is required by the spec ("permitted, not
//! required"); this implementation reaps lazily on `touch`/`get`.

use crate::types::Session;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, session: &Session, now: SystemTime) -> bool {
        now.duration_since(session.last_touched_at).unwrap_or_default() > self.ttl
    }

    /// Create a fresh session with a v4 UUID id (spec §4.7: "An HTTP POST
    /// without an mcp-session-id header creates a fresh session").
    pub async fn create(&self) -> Session {
        let now = SystemTime::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            last_touched_at: now,
            client_capabilities: None,
        };
        self.sessions.write().await.insert(session.session_id.clone(), session.clone());
        session
    }

    /// Look up a session by id, reaping it first if expired. Touches
    /// `last_touched_at` on a hit.
    pub async fn touch(&self, session_id: &str) -> Option<Session> {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().await;
        let expired = sessions.get(session_id).map(|s| self.is_expired(s, now)).unwrap_or(false);
        if expired {
            sessions.remove(session_id);
            return None;
        }
        if let Some(session) = sessions.get_mut(session_id) {
            session.last_touched_at = now;
            return Some(session.clone());
        }
        None
    }

    pub async fn set_client_capabilities(&self, session_id: &str, capabilities: serde_json::Value) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.client_capabilities = Some(capabilities);
        }
    }

    pub async fn destroy(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_yields_a_valid_v4_uuid() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        let session = mgr.create().await;
        let parsed = Uuid::parse_str(&session.session_id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[tokio::test]
    async fn touch_returns_none_for_unknown_session() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        assert!(mgr.touch("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_reaped_on_touch() {
        let mgr = SessionManager::new(Duration::from_millis(1));
        let session = mgr.create().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(mgr.touch(&session.session_id).await.is_none());
        assert_eq!(mgr.len().await, 0);
    }

    #[tokio::test]
    async fn destroy_removes_the_session() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        let session = mgr.create().await;
        assert!(mgr.destroy(&session.session_id).await);
        assert!(mgr.touch(&session.session_id).await.is_none());
    }

    #[tokio::test]
    async fn successive_touches_within_ttl_keep_session_alive() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        let session = mgr.create().await;
        assert!(mgr.touch(&session.session_id).await.is_some());
        assert!(mgr.touch(&session.session_id).await.is_some());
    }
}
