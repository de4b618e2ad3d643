use super::{CapabilityItem, CapabilityRegistry, ToPublic};
use crate::types::{OriginalResource, PublicResource};

impl CapabilityItem for OriginalResource {
    fn original_key(&self) -> &str {
        &self.uri
    }
}

pub struct ResourceProjector;

impl ToPublic<OriginalResource> for ResourceProjector {
    type Public = PublicResource;

    fn to_public(server_id: &str, original: &OriginalResource, public_key: &str) -> PublicResource {
        PublicResource {
            uri: public_key.to_string(),
            server_id: server_id.to_string(),
            original_uri: original.uri.clone(),
            name: original.name.clone(),
            description: original.description.clone(),
            mime_type: original.mime_type.clone(),
        }
    }
}

/// Registry for downstream resources, keyed by URI (spec §4.3). Also holds
/// the hub's own internal `hatago://servers` resource, exposed by the hub
/// coordinator rather than any downstream server.
pub type ResourceRegistry = CapabilityRegistry<OriginalResource, ResourceProjector>;

/// Well-known URI of the hub's self-describing resource (spec §4.3/§6).
pub const SERVERS_RESOURCE_URI: &str = "hatago://servers";
