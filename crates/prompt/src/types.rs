//! Prompt types for ragline.

use serde::{Deserialize, Serialize};

/// Id of the built-in answering template.
pub const DEFAULT_PROMPT_ID: &str = "rag.answer.default";

const DEFAULT_SYSTEM: &str = "You are a knowledge assistant answering questions from the user's \
document collection.\n\
Answer using only the reference documents provided with the question.\n\
Cite every document you rely on with its bracketed marker, for example [a1b2c3d4e5f60718].\n\
If the reference documents do not contain the answer, say that you don't know instead of guessing.\n\
Keep the answer concise and factual.";

const DEFAULT_LOW_CONFIDENCE_NOTE: &str = "The retrieved documents may not directly answer this \
question. Be cautious and state clearly what the documents do and do not say.";

const DEFAULT_TEMPLATE: &str = "{{#if history}}Conversation so far:
{{#each history}}{{role}}: {{content}}
{{/each}}
{{/if}}Reference documents:
{{#each context}}
{{marker}} (source: {{source}})
{{text}}
{{/each}}
Question: {{query}}";

/// An answering prompt definition, loadable from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// System message sent with every request
    pub system: String,

    /// Appended to the system message when retrieval confidence is low
    #[serde(rename = "lowConfidenceNote", default)]
    pub low_confidence_note: String,

    /// User message template with Handlebars syntax.
    ///
    /// Variables: `query`, `context` (list of `marker`, `id`, `source`,
    /// `text`, `score`) and `history` (list of `role`, `content`).
    pub template: String,
}

impl Default for PromptDefinition {
    fn default() -> Self {
        Self {
            id: DEFAULT_PROMPT_ID.to_string(),
            title: "Answer from retrieved documents".to_string(),
            api_version: "1.0".to_string(),
            system: DEFAULT_SYSTEM.to_string(),
            low_confidence_note: DEFAULT_LOW_CONFIDENCE_NOTE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// One retrieved chunk as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Chunk id, also used as the citation key
    pub id: String,
    pub source: String,
    pub text: String,
    pub score: f32,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A previous exchange in an interactive session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message
    pub system: String,

    /// User message
    pub user: String,

    /// Chunk ids referenced by citation markers, in prompt order
    pub citations: Vec<String>,

    /// Source prompt id
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: rag.answer.terse
title: Terse answers
apiVersion: "1.0"
system: "Answer in one sentence."
template: "{{query}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "rag.answer.terse");
        assert_eq!(def.system, "Answer in one sentence.");
        assert!(def.low_confidence_note.is_empty());
    }

    #[test]
    fn test_chat_role_serializes_lowercase() {
        let turn = ChatTurn::assistant("hi");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
