//! Public-name derivation strategies for the capability registries
//! (spec §4.3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    /// `publicKey = originalKey`; collisions across servers are fatal for
    /// the later-registered entry.
    None,
    /// `publicKey = serverId + separator + originalKey`.
    #[default]
    Prefix,
    /// Same as `Prefix`, but the hub picks a separator that cannot appear
    /// in original names for the catalog when possible (default `_`).
    Namespace,
}

/// Derive the public key for one original entity.
///
/// `existing_originals` is consulted only by the `Namespace` strategy, to
/// decide whether the default separator is safe to reuse as-is; spec §4.3
/// only requires best-effort avoidance, not a hard guarantee.
pub fn public_key(
    strategy: NamingStrategy,
    separator: &str,
    server_id: &str,
    original_key: &str,
) -> String {
    match strategy {
        NamingStrategy::None => original_key.to_string(),
        NamingStrategy::Prefix | NamingStrategy::Namespace => {
            format!("{server_id}{separator}{original_key}")
        }
    }
}

/// Pick a separator for the `namespace` strategy that the given original
/// keys don't already contain, falling back to the configured default.
pub fn pick_namespace_separator<'a>(default: &'a str, original_keys: impl Iterator<Item = &'a str>) -> &'a str {
    let candidates = [default, "_", ".", "::", "__"];
    let keys: Vec<&str> = original_keys.collect();
    for candidate in candidates {
        if !keys.iter().any(|k| k.contains(candidate)) {
            return candidate;
        }
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_strategy_passes_through() {
        assert_eq!(public_key(NamingStrategy::None, "_", "fs", "read"), "read");
    }

    #[test]
    fn prefix_strategy_joins_with_separator() {
        assert_eq!(
            public_key(NamingStrategy::Prefix, "_", "fs", "read"),
            "fs_read"
        );
        assert_eq!(
            public_key(NamingStrategy::Prefix, ".", "web", "fetch"),
            "web.fetch"
        );
    }

    #[test]
    fn namespace_strategy_behaves_like_prefix() {
        assert_eq!(
            public_key(NamingStrategy::Namespace, "_", "web", "fetch"),
            "web_fetch"
        );
    }

    #[test]
    fn namespace_separator_avoids_collision_with_original_names() {
        let keys = vec!["read_file", "write_file"];
        let sep = pick_namespace_separator("_", keys.into_iter());
        assert_ne!(sep, "_");
    }
}
