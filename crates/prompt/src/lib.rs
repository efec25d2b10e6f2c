//! Prompt system for ragline.
//!
//! - YAML prompt definitions with a built-in default
//! - Handlebars rendering of the retrieved context with citation markers
//! - Conversation history for interactive sessions

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::{build_prompt, citation_marker, render_template};
pub use loader::{list_prompts, load_prompt};
pub use types::{
    BuiltPrompt, ChatRole, ChatTurn, ContextEntry, PromptDefinition, DEFAULT_PROMPT_ID,
};
