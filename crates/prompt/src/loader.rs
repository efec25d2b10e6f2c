//! Loader for YAML prompt definitions.

use crate::types::{PromptDefinition, DEFAULT_PROMPT_ID};
use ragline_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("prompts")
}

/// Load a prompt definition by id from `<data_dir>/prompts/<id>.yml`.
///
/// The built-in definition is returned for [`DEFAULT_PROMPT_ID`] when no
/// file overrides it.
pub fn load_prompt(data_dir: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(data_dir).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        if prompt_id == DEFAULT_PROMPT_ID {
            return Ok(PromptDefinition::default());
        }
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// List prompt ids available under `<data_dir>/prompts`.
pub fn list_prompts(data_dir: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(data_dir);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    // The template must be able to show the retrieved chunks
    if !def.template.contains("context") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' never renders the retrieved context",
            def.id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, template: &str) {
        let prompts = prompts_dir(dir);
        fs::create_dir_all(&prompts).unwrap();

        let content = format!(
            "id: {}\ntitle: \"Test Prompt\"\napiVersion: \"1.0\"\nsystem: \"Be terse.\"\ntemplate: \"{}\"\n",
            id, template
        );
        fs::write(prompts.join(format!("{}.yml", id)), content).unwrap();
    }

    #[test]
    fn test_default_prompt_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = load_prompt(temp_dir.path(), DEFAULT_PROMPT_ID).unwrap();
        assert_eq!(prompt.id, DEFAULT_PROMPT_ID);
    }

    #[test]
    fn test_file_overrides_default() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            DEFAULT_PROMPT_ID,
            "{{#each context}}{{marker}} {{text}}{{/each}} Q: {{query}}",
        );

        let prompt = load_prompt(temp_dir.path(), DEFAULT_PROMPT_ID).unwrap();
        assert_eq!(prompt.system, "Be terse.");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_template_without_context_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "bare", "Q: {{query}}");
        let err = load_prompt(temp_dir.path(), "bare").unwrap_err();
        assert!(err.to_string().contains("never renders"));
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "prompt2", "{{context}}");
        write_prompt(temp_dir.path(), "prompt1", "{{context}}");

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["prompt1", "prompt2"]);
    }
}
