//! Capability Registries (spec §4.3).
//!
//! One generic [`CapabilityRegistry`] backs all three catalogs (tools,
//! resources, prompts); `tools.rs`/`resources.rs`/`prompts.rs` instantiate
//! it with the concrete original/public types and the per-catalog key
//! extraction rule. This mirrors the teacher's single `HashMap`-backed
//! `McpManager` pattern, generalized across the three catalogs the spec
//! calls out separately.

pub mod prompts;
pub mod resources;
pub mod tools;

use crate::naming::{public_key, NamingStrategy};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One entity as discovered from a downstream server, plus enough to
/// build its public projection.
pub trait CapabilityItem: Clone + Send + Sync + 'static {
    /// The key the entity is uniquely identified by within one server
    /// (tool/prompt name, or resource URI).
    fn original_key(&self) -> &str;
}

/// How to project a `(server_id, original, public_key)` triple into the
/// public-facing entity returned to the upstream client.
pub trait ToPublic<Original: CapabilityItem> {
    type Public: Clone + Send + Sync + 'static;
    fn to_public(server_id: &str, original: &Original, public_key: &str) -> Self::Public;
}

/// A forward map (`serverId -> items`) and reverse map
/// (`publicKey -> (serverId, originalKey)`) with atomic replace-in-place
/// registration, generic over one capability catalog.
pub struct CapabilityRegistry<Original, Projector>
where
    Original: CapabilityItem,
    Projector: ToPublic<Original>,
{
    forward: RwLock<HashMap<String, Vec<Original>>>,
    reverse: RwLock<HashMap<String, (String, String)>>,
    strategy: NamingStrategy,
    separator: String,
    _projector: std::marker::PhantomData<Projector>,
}

impl<Original, Projector> CapabilityRegistry<Original, Projector>
where
    Original: CapabilityItem,
    Projector: ToPublic<Original>,
{
    pub fn new(strategy: NamingStrategy, separator: impl Into<String>) -> Self {
        Self {
            forward: RwLock::new(HashMap::new()),
            reverse: RwLock::new(HashMap::new()),
            strategy,
            separator: separator.into(),
            _projector: std::marker::PhantomData,
        }
    }

    /// Replace the items for `server_id`, computing and installing public
    /// names for all of them. Holds both locks for the whole operation so
    /// no reader observes an empty set for a server that currently has
    /// items (spec §4.3, §9 "Concurrent registry replacement").
    ///
    /// On a naming collision with an entry from a *different* server, the
    /// colliding item from `items` is dropped and its name is returned in
    /// the collision list (spec §3: "registration of the colliding later
    /// entry fails, fatal error for that entry only").
    pub async fn register_server(
        &self,
        server_id: &str,
        items: Vec<Original>,
    ) -> Vec<String> {
        let mut forward = self.forward.write().await;
        let mut reverse = self.reverse.write().await;

        // Drop this server's previous reverse entries before re-checking
        // collisions, so re-registering the same server never collides
        // with its own prior generation.
        reverse.retain(|_, (sid, _)| sid != server_id);

        let mut collisions = Vec::new();
        let mut accepted = Vec::new();

        for item in items {
            let key = public_key(self.strategy, &self.separator, server_id, item.original_key());
            if let Some((existing_server, _)) = reverse.get(&key) {
                if existing_server != server_id {
                    collisions.push(key);
                    continue;
                }
            }
            reverse.insert(key, (server_id.to_string(), item.original_key().to_string()));
            accepted.push(item);
        }

        forward.insert(server_id.to_string(), accepted);
        collisions
    }

    /// Remove all of this server's items and reverse entries.
    pub async fn clear_server(&self, server_id: &str) {
        let mut forward = self.forward.write().await;
        let mut reverse = self.reverse.write().await;
        forward.remove(server_id);
        reverse.retain(|_, (sid, _)| sid != server_id);
    }

    /// Resolve a public key to `(server_id, original_key)`.
    pub async fn resolve(&self, public_key: &str) -> Option<(String, String)> {
        self.reverse.read().await.get(public_key).cloned()
    }

    pub async fn get_all(&self) -> Vec<Projector::Public> {
        let forward = self.forward.read().await;
        let mut out = Vec::new();
        for (server_id, items) in forward.iter() {
            for item in items {
                let key = public_key(self.strategy, &self.separator, server_id, item.original_key());
                out.push(Projector::to_public(server_id, item, &key));
            }
        }
        out
    }

    pub async fn server_keys(&self, server_id: &str) -> Vec<String> {
        let forward = self.forward.read().await;
        forward
            .get(server_id)
            .map(|items| items.iter().map(|i| i.original_key().to_string()).collect())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.forward.read().await.values().map(|v| v.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct FakeTool {
        name: String,
    }
    impl CapabilityItem for FakeTool {
        fn original_key(&self) -> &str {
            &self.name
        }
    }

    struct FakeProjector;
    impl ToPublic<FakeTool> for FakeProjector {
        type Public = (String, String, String);
        fn to_public(server_id: &str, original: &FakeTool, public_key: &str) -> Self::Public {
            (public_key.to_string(), server_id.to_string(), original.name.clone())
        }
    }

    type FakeRegistry = CapabilityRegistry<FakeTool, FakeProjector>;

    #[tokio::test]
    async fn distinct_servers_never_collide_on_distinct_public_names() {
        let reg = FakeRegistry::new(NamingStrategy::Prefix, "_");
        reg.register_server("fs", vec![FakeTool { name: "read".into() }, FakeTool { name: "write".into() }])
            .await;
        reg.register_server("web", vec![FakeTool { name: "fetch".into() }])
            .await;

        let all = reg.get_all().await;
        let mut names: Vec<_> = all.iter().map(|(k, _, _)| k.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["fs_read", "fs_write", "web_fetch"]);

        assert_eq!(
            reg.resolve("web_fetch").await,
            Some(("web".to_string(), "fetch".to_string()))
        );
    }

    #[tokio::test]
    async fn none_strategy_collision_drops_the_later_entry() {
        let reg = FakeRegistry::new(NamingStrategy::None, "_");
        reg.register_server("fs", vec![FakeTool { name: "read".into() }])
            .await;
        let collisions = reg
            .register_server("other", vec![FakeTool { name: "read".into() }])
            .await;
        assert_eq!(collisions, vec!["read".to_string()]);
        // "read" still resolves to the first server, "other" has nothing.
        assert_eq!(
            reg.resolve("read").await,
            Some(("fs".to_string(), "read".to_string()))
        );
    }

    #[tokio::test]
    async fn replace_in_place_never_observes_empty_window() {
        let reg = FakeRegistry::new(NamingStrategy::Prefix, "_");
        reg.register_server("fs", vec![FakeTool { name: "read".into() }])
            .await;
        // Re-registering the same server with new items must not leave a
        // transient empty set under the same lock acquisition.
        reg.register_server("fs", vec![FakeTool { name: "stat".into() }])
            .await;
        assert_eq!(reg.server_keys("fs").await, vec!["stat".to_string()]);
        assert_eq!(reg.resolve("fs_read").await, None);
        assert_eq!(
            reg.resolve("fs_stat").await,
            Some(("fs".to_string(), "stat".to_string()))
        );
    }

    #[tokio::test]
    async fn clear_server_removes_both_maps() {
        let reg = FakeRegistry::new(NamingStrategy::Prefix, "_");
        reg.register_server("fs", vec![FakeTool { name: "read".into() }])
            .await;
        reg.clear_server("fs").await;
        assert!(reg.is_empty().await);
        assert_eq!(reg.resolve("fs_read").await, None);
    }
}
