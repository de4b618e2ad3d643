use super::{CapabilityItem, CapabilityRegistry, ToPublic};
use crate::types::{OriginalTool, PublicTool};

impl CapabilityItem for OriginalTool {
    fn original_key(&self) -> &str {
        &self.name
    }
}

pub struct ToolProjector;

impl ToPublic<OriginalTool> for ToolProjector {
    type Public = PublicTool;

    fn to_public(server_id: &str, original: &OriginalTool, public_key: &str) -> PublicTool {
        PublicTool {
            name: public_key.to_string(),
            server_id: server_id.to_string(),
            original_name: original.name.clone(),
            description: original.description.clone(),
            input_schema: original.input_schema.clone(),
        }
    }
}

/// Registry for downstream tools (spec §4.3).
pub type ToolRegistry = CapabilityRegistry<OriginalTool, ToolProjector>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NamingStrategy;

    #[tokio::test]
    async fn public_tool_carries_original_fields_untouched() {
        let reg = ToolRegistry::new(NamingStrategy::Prefix, "_");
        reg.register_server(
            "fs",
            vec![OriginalTool {
                name: "read".into(),
                description: Some("reads a file".into()),
                input_schema: serde_json::json!({"type": "object"}),
            }],
        )
        .await;
        let all = reg.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "fs_read");
        assert_eq!(all[0].original_name, "read");
        assert_eq!(all[0].description.as_deref(), Some("reads a file"));
    }
}
