//! Toolset revision/hash tracking (spec §3 `ToolsetRevision`, §4.3, §8).

use crate::types::{PublicTool, ToolsetRevision};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Monotonic counter plus content digest, recomputed on every tool
/// registry mutation. A plain `Mutex` is enough — updates happen under
/// the same serialized path as registry replacement (spec §5, "tool
/// registration is serialized per hub").
pub struct RevisionTracker {
    state: Mutex<ToolsetRevision>,
}

impl Default for RevisionTracker {
    fn default() -> Self {
        Self {
            state: Mutex::new(ToolsetRevision::default()),
        }
    }
}

impl RevisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the hash from the current toolset and bump the revision.
    /// Hash is stable under reordering because the `(name, description)`
    /// pairs are sorted before hashing (spec §8).
    pub async fn bump(&self, tools: &[PublicTool]) -> ToolsetRevision {
        let mut pairs: Vec<(String, String)> = tools
            .iter()
            .map(|t| (t.name.clone(), t.description.clone().unwrap_or_default()))
            .collect();
        pairs.sort();

        let mut hasher = Sha256::new();
        for (name, desc) in &pairs {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(desc.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let mut truncated = [0u8; 8];
        truncated.copy_from_slice(&digest[..8]);

        let mut state = self.state.lock().await;
        state.revision += 1;
        state.hash = truncated;
        *state
    }

    pub async fn current(&self) -> ToolsetRevision {
        *self.state.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, desc: &str) -> PublicTool {
        PublicTool {
            name: name.into(),
            server_id: "s".into(),
            original_name: name.into(),
            description: Some(desc.into()),
            input_schema: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn revision_is_monotonically_non_decreasing() {
        let tracker = RevisionTracker::new();
        let r1 = tracker.bump(&[tool("a", "A")]).await;
        let r2 = tracker.bump(&[tool("a", "A"), tool("b", "B")]).await;
        assert!(r2.revision > r1.revision);
    }

    #[tokio::test]
    async fn hash_is_stable_under_reordering() {
        let tracker = RevisionTracker::new();
        let r1 = tracker.bump(&[tool("a", "A"), tool("b", "B")]).await;
        let r2 = tracker.bump(&[tool("b", "B"), tool("a", "A")]).await;
        assert_eq!(r1.hash, r2.hash);
        assert_eq!(r1.hash_hex().len(), 16);
    }

    #[tokio::test]
    async fn hash_changes_when_toolset_content_changes() {
        let tracker = RevisionTracker::new();
        let r1 = tracker.bump(&[tool("a", "A")]).await;
        let r2 = tracker.bump(&[tool("a", "A2")]).await;
        assert_ne!(r1.hash, r2.hash);
    }
}
