//! Agent definition and delegation to the external agent runtime
//!
//! The reasoning loop lives in an external runtime. This module describes
//! the agent it should run (`AgentCard`) and forwards `/v1/agent/*`
//! traffic to it (`AgentProxy`).

mod proxy;

use serde::Serialize;

use crate::tools::{ToolDeclaration, ToolRegistry};

pub use proxy::{AgentProxy, ProxyError};

/// Name the agent is registered under in the runtime
pub const AGENT_NAME: &str = "lgtm-image-generator-agent";

/// Agent description served to the runtime
#[derive(Debug, Clone, Serialize)]
pub struct AgentCard {
    pub name: &'static str,
    pub description: &'static str,
    pub model: String,
    pub instruction: String,
    pub tools: Vec<ToolDeclaration>,
}

impl AgentCard {
    pub fn new(model: &str, public_base_url: &str, tools: &ToolRegistry) -> Self {
        Self {
            name: AGENT_NAME,
            description: "The agent that generates LGTM images based on user requests.",
            model: model.to_string(),
            instruction: instruction(public_base_url),
            tools: tools.declarations(),
        }
    }
}

fn instruction(public_base_url: &str) -> String {
    format!(
        r#"You are an agent that generates LGTM images based on user requests.
- Use GenerateImageTool to create the image as an artifact
- Save the final image to the bucket with SaveImageTool
- Respond with the URL of the saved image
**[MUST]** Always provide the URL of the saved image in your final response.
The URL should be formatted as: {}/[uploaded_path]"#,
        public_base_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_mentions_public_url() {
        let text = instruction("https://pub.example.dev");
        assert!(text.contains("https://pub.example.dev/[uploaded_path]"));
        assert!(text.contains("SaveImageTool"));
    }

    #[test]
    fn test_card_lists_registry_tools() {
        let card = AgentCard::new("gemini-2.5-flash", "https://x", &ToolRegistry::new());
        assert_eq!(card.name, AGENT_NAME);
        assert_eq!(card.model, "gemini-2.5-flash");
        assert!(card.tools.is_empty());
    }
}
