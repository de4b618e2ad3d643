use super::{CapabilityItem, CapabilityRegistry, ToPublic};
use crate::types::{OriginalPrompt, PublicPrompt};

impl CapabilityItem for OriginalPrompt {
    fn original_key(&self) -> &str {
        &self.name
    }
}

pub struct PromptProjector;

impl ToPublic<OriginalPrompt> for PromptProjector {
    type Public = PublicPrompt;

    fn to_public(server_id: &str, original: &OriginalPrompt, public_key: &str) -> PublicPrompt {
        PublicPrompt {
            name: public_key.to_string(),
            server_id: server_id.to_string(),
            original_name: original.name.clone(),
            description: original.description.clone(),
            arguments: original.arguments.clone(),
        }
    }
}

/// Registry for downstream prompts (spec §4.3).
pub type PromptRegistry = CapabilityRegistry<OriginalPrompt, PromptProjector>;
