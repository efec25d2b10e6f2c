//! Prompt builder for rendering templates and injecting retrieved context.

use crate::types::{BuiltPrompt, ChatTurn, ContextEntry, PromptDefinition};
use handlebars::Handlebars;
use ragline_core::{AppError, AppResult};
use serde::Serialize;

/// Bracketed marker the model uses to cite a chunk.
pub fn citation_marker(chunk_id: &str) -> String {
    format!("[{}]", chunk_id)
}

#[derive(Serialize)]
struct RenderedEntry<'a> {
    marker: String,
    id: &'a str,
    source: &'a str,
    text: &'a str,
    score: f32,
}

#[derive(Serialize)]
struct TemplateData<'a> {
    query: &'a str,
    context: Vec<RenderedEntry<'a>>,
    history: &'a [ChatTurn],
}

/// Build the answering prompt for a query.
///
/// Context entries are rendered in the order given, each prefixed with its
/// citation marker. The returned prompt lists the cited chunk ids in the
/// same order.
///
/// # Example
/// ```
/// use ragline_prompt::{build_prompt, ContextEntry, PromptDefinition};
///
/// let context = vec![ContextEntry {
///     id: "c0ffee".to_string(),
///     source: "notes.md".to_string(),
///     text: "Rust has no garbage collector.".to_string(),
///     score: 0.82,
/// }];
///
/// let built = build_prompt(&PromptDefinition::default(), "Does Rust use GC?", &context, &[], false)
///     .unwrap();
/// assert!(built.user.contains("[c0ffee]"));
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    query: &str,
    context: &[ContextEntry],
    history: &[ChatTurn],
    low_confidence: bool,
) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        prompt_id = %definition.id,
        context_entries = context.len(),
        history_turns = history.len(),
        "Building prompt"
    );

    let data = TemplateData {
        query,
        context: context
            .iter()
            .map(|entry| RenderedEntry {
                marker: citation_marker(&entry.id),
                id: &entry.id,
                source: &entry.source,
                text: &entry.text,
                score: entry.score,
            })
            .collect(),
        history,
    };

    let user = render_template(&definition.template, &data)?;

    let mut system = definition.system.clone();
    if low_confidence && !definition.low_confidence_note.is_empty() {
        system.push_str("\n\n");
        system.push_str(&definition.low_confidence_note);
    }

    Ok(BuiltPrompt {
        system,
        user,
        citations: context.iter().map(|entry| entry.id.clone()).collect(),
        source_prompt_id: definition.id.clone(),
    })
}

/// Render a Handlebars template with serializable data.
pub fn render_template<T: Serialize>(template: &str, data: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output, no HTML escaping
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(id: &str, text: &str) -> ContextEntry {
        ContextEntry {
            id: id.to_string(),
            source: "guide.md".to_string(),
            text: text.to_string(),
            score: 0.7,
        }
    }

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("query", "Hello, <world>!");

        let result = render_template("Question: {{query}}", &vars).unwrap();
        assert_eq!(result, "Question: Hello, <world>!");
    }

    #[test]
    fn test_context_rendered_with_markers_in_order() {
        let context = vec![entry("aaa1", "First fact"), entry("bbb2", "Second fact")];
        let built =
            build_prompt(&PromptDefinition::default(), "What?", &context, &[], false).unwrap();

        let first = built.user.find("[aaa1]").unwrap();
        let second = built.user.find("[bbb2]").unwrap();
        assert!(first < second);
        assert!(built.user.contains("First fact"));
        assert!(built.user.ends_with("Question: What?"));
        assert_eq!(built.citations, vec!["aaa1", "bbb2"]);
        assert!(!built.user.contains("Conversation so far"));
    }

    #[test]
    fn test_history_is_rendered() {
        let history = vec![
            ChatTurn::user("What is Milvus?"),
            ChatTurn::assistant("A vector database."),
        ];
        let built = build_prompt(
            &PromptDefinition::default(),
            "Who maintains it?",
            &[entry("c1", "text")],
            &history,
            false,
        )
        .unwrap();

        assert!(built.user.contains("Conversation so far"));
        assert!(built.user.contains("user: What is Milvus?"));
        assert!(built.user.contains("assistant: A vector database."));
    }

    #[test]
    fn test_low_confidence_note_appended_to_system() {
        let def = PromptDefinition::default();
        let normal = build_prompt(&def, "q", &[], &[], false).unwrap();
        let cautious = build_prompt(&def, "q", &[], &[], true).unwrap();

        assert!(!normal.system.contains("Be cautious"));
        assert!(cautious.system.contains("Be cautious"));
        assert!(cautious.system.starts_with(&normal.system));
    }

    #[test]
    fn test_render_template_syntax_error() {
        let vars: HashMap<&str, &str> = HashMap::new();
        let result = render_template("{{#each}}", &vars);
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }
}
