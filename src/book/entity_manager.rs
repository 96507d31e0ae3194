//! Character / setting sheet generation and maintenance (C10). Characters
//! and settings are the same pipeline over a different chunk taxonomy.

use crate::error::Result;
use crate::executor::{ExecInput, ExecRequest, PromptExecutor};
use crate::llm::{parse_json_lenient, GenerateOptions, Message, ModelConfig};
use crate::rag::RagService;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Character,
    Setting,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Character => "character",
            EntityKind::Setting => "setting",
        }
    }

    fn savepoint_root(&self) -> &'static str {
        match self {
            EntityKind::Character => "characters",
            EntityKind::Setting => "settings",
        }
    }

    fn chunk_types(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Character => &[
                "personality",
                "background",
                "motivations",
                "relationships",
                "skills",
                "current_state",
                "growth_arc",
            ],
            EntityKind::Setting => &[
                "physical_description",
                "history_background",
                "function_purpose",
                "atmosphere_mood",
                "rules_constraints",
                "connections_relationships",
            ],
        }
    }
}

const MAX_ENTITIES: usize = 10;

/// Parses a JSON array of strings out of the model's reply, falling back to
/// one name per non-empty line; de-duplicates case-insensitively and caps at
/// `MAX_ENTITIES`.
pub fn parse_entity_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = match parse_json_lenient(raw) {
        Ok(value) => value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    };
    if names.is_empty() {
        names = raw
            .lines()
            .map(|l| l.trim().trim_start_matches(['-', '*']).trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
    }

    let mut seen = std::collections::HashSet::new();
    names.retain(|n| seen.insert(n.to_lowercase()));
    names.truncate(MAX_ENTITIES);
    names
}

pub async fn extract_names(
    executor: &PromptExecutor<'_>,
    kind: EntityKind,
    source_text: &str,
    savepoint_id: &str,
    model: &ModelConfig,
) -> Result<Vec<String>> {
    let mut vars = HashMap::new();
    vars.insert("kind".to_string(), kind.label().to_string());
    vars.insert("story_elements".to_string(), source_text.to_string());
    let result = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "entity.extract_names",
                variables: vars,
            },
            savepoint_id: Some(savepoint_id),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: true,
            required_attrs: Vec::new(),
        })
        .await?;
    Ok(parse_entity_names(&result.content))
}

fn entity_dir(kind: EntityKind, name: &str) -> String {
    format!("{}/{}", kind.savepoint_root(), name)
}

/// Turn 1 of the sheet generation: the full sheet.
pub async fn generate_sheet(
    executor: &PromptExecutor<'_>,
    kind: EntityKind,
    name: &str,
    story_elements: &str,
    model: &ModelConfig,
) -> Result<String> {
    let mut vars = HashMap::new();
    vars.insert("kind".to_string(), kind.label().to_string());
    vars.insert("name".to_string(), name.to_string());
    vars.insert("story_elements".to_string(), story_elements.to_string());
    let savepoint_id = format!("{}/sheet", entity_dir(kind, name));
    let result = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "entity.sheet",
                variables: vars,
            },
            savepoint_id: Some(&savepoint_id),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?;
    Ok(result.content)
}

/// Turns 2-8: one focused chunk per call, each a sibling conversation built
/// from the same (sheet-prompt, sheet-reply) pair rather than a shared
/// descending transcript, then indexed into RAG immediately.
pub async fn generate_and_index_chunks(
    executor: &PromptExecutor<'_>,
    rag: &RagService,
    kind: EntityKind,
    name: &str,
    story_elements: &str,
    sheet: &str,
    model: &ModelConfig,
) -> Result<HashMap<String, String>> {
    let mut sheet_vars = HashMap::new();
    sheet_vars.insert("kind".to_string(), kind.label().to_string());
    sheet_vars.insert("name".to_string(), name.to_string());
    sheet_vars.insert("story_elements".to_string(), story_elements.to_string());
    let sheet_prompt_text = executor.prompts.load("entity.sheet", &sheet_vars)?;

    let mut chunks = HashMap::new();
    for chunk_type in kind.chunk_types() {
        let mut chunk_vars = HashMap::new();
        chunk_vars.insert("kind".to_string(), kind.label().to_string());
        chunk_vars.insert("name".to_string(), name.to_string());
        chunk_vars.insert("chunk_type".to_string(), chunk_type.to_string());
        let chunk_prompt_text = executor.prompts.load("entity.chunk", &chunk_vars)?;

        let transcript = vec![
            Message::user(sheet_prompt_text.clone()),
            Message::assistant(sheet.to_string()),
            Message::user(chunk_prompt_text),
        ];

        let savepoint_id = format!("{}/{}_chunk", entity_dir(kind, name), chunk_type);
        let result = executor
            .execute(ExecRequest {
                input: ExecInput::Transcript(transcript),
                savepoint_id: Some(&savepoint_id),
                system_message: None,
                model_config: model,
                options: GenerateOptions::default(),
                expect_json: false,
                required_attrs: Vec::new(),
            })
            .await?;

        let metadata = serde_json::json!({
            "chunk_type": chunk_type,
            "generation_stage": "outline",
        });
        match kind {
            EntityKind::Character => {
                rag.index_character(name, chunk_type, &result.content).await?;
            }
            EntityKind::Setting => {
                rag.index_setting(name, chunk_type, &result.content).await?;
            }
        }
        let _ = metadata; // stamped by RagService's typed wrappers
        chunks.insert(chunk_type.to_string(), result.content);
    }
    Ok(chunks)
}

/// Re-derives the sheet for every entity named in a freshly generated
/// chapter, overwriting the savepoint (bypassing the executor's
/// short-circuit, since this is always a fresh regeneration).
pub async fn update_sheets_for_chapter(
    executor: &PromptExecutor<'_>,
    kind: EntityKind,
    chapter_content: &str,
    model: &ModelConfig,
) -> Result<Vec<String>> {
    let mut vars = HashMap::new();
    vars.insert("kind".to_string(), kind.label().to_string());
    vars.insert("story_elements".to_string(), chapter_content.to_string());
    let raw = executor
        .provider
        .generate_json(
            &[Message::user(executor.prompts.load("entity.extract_names", &vars)?)],
            model,
            &[],
            &GenerateOptions::default(),
        )
        .await
        .map(|v| v.to_string())
        .unwrap_or_default();
    let names = parse_entity_names(&raw);

    let mut updated = Vec::new();
    for name in &names {
        let sheet_path = format!("{}/sheet", entity_dir(kind, name));
        let existing = executor
            .savepoints
            .load(&sheet_path)?
            .map(|v| v.into_string())
            .or_else(|| {
                executor
                    .savepoints
                    .load(&format!("{}/personality_chunk", entity_dir(kind, name)))
                    .ok()
                    .flatten()
                    .map(|v| v.into_string())
            })
            .unwrap_or_default();
        if existing.is_empty() {
            continue;
        }

        let mut update_vars = HashMap::new();
        update_vars.insert("name".to_string(), name.clone());
        update_vars.insert("existing_sheet".to_string(), existing);
        update_vars.insert("chapter_content".to_string(), chapter_content.to_string());
        let prompt_text = executor.prompts.load("entity.update_sheet", &update_vars)?;
        let new_sheet = executor
            .provider
            .generate_text(&[Message::user(prompt_text)], model, &GenerateOptions::default())
            .await?;
        executor
            .savepoints
            .save(&sheet_path, crate::savepoint::SavepointValue::from(new_sheet))?;
        updated.push(name.clone());
    }
    Ok(updated)
}

/// Synthesizes short summaries for prompt injection from the
/// personality/motivations/current-state chunks of each named entity.
pub async fn get_summaries(
    executor: &PromptExecutor<'_>,
    kind: EntityKind,
    names: &[String],
    model: &ModelConfig,
) -> Result<String> {
    let mut blocks = Vec::new();
    for name in names {
        let personality = load_chunk(executor, kind, name, "personality")
            .or_else(|| load_chunk(executor, kind, name, "physical_description"))
            .unwrap_or_default();
        let motivations = load_chunk(executor, kind, name, "motivations")
            .or_else(|| load_chunk(executor, kind, name, "function_purpose"))
            .unwrap_or_default();
        let current_state = load_chunk(executor, kind, name, "current_state")
            .or_else(|| load_chunk(executor, kind, name, "atmosphere_mood"))
            .unwrap_or_default();

        let mut vars = HashMap::new();
        vars.insert("name".to_string(), name.clone());
        vars.insert("personality".to_string(), personality);
        vars.insert("motivations".to_string(), motivations);
        vars.insert("current_state".to_string(), current_state);
        let result = executor
            .execute(ExecRequest {
                input: ExecInput::Prompt {
                    prompt_id: "entity.summary",
                    variables: vars,
                },
                savepoint_id: None,
                system_message: None,
                model_config: model,
                options: GenerateOptions::default(),
                expect_json: false,
                required_attrs: Vec::new(),
            })
            .await?;
        blocks.push(format!("{name}: {}", result.content));
    }
    Ok(blocks.join("\n---\n"))
}

fn load_chunk(executor: &PromptExecutor<'_>, kind: EntityKind, name: &str, chunk_type: &str) -> Option<String> {
    executor
        .savepoints
        .load(&format!("{}/{}_chunk", entity_dir(kind, name), chunk_type))
        .ok()
        .flatten()
        .map(|v| v.into_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_names_from_json_array() {
        let names = parse_entity_names(r#"["Alice", "Bob", "alice"]"#);
        assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);
    }

    #[test]
    fn falls_back_to_line_parsing() {
        let names = parse_entity_names("- Alice\n- Bob\n");
        assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);
    }

    #[test]
    fn caps_at_ten() {
        let raw: Vec<String> = (0..15).map(|i| format!("Name{i}")).collect();
        let json = serde_json::to_string(&raw).unwrap();
        let names = parse_entity_names(&json);
        assert_eq!(names.len(), MAX_ENTITIES);
    }
}
