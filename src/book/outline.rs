//! Story-wide outline generation (C12): a warmup conversation followed by
//! eight analysis chunks continuing the same transcript, then entity sheets.

use crate::book::entity_manager::{self, EntityKind};
use crate::book::Context;
use crate::error::Result;
use crate::executor::{ExecInput, ExecRequest, PromptExecutor};
use crate::llm::{GenerateOptions, Message, ModelConfig};
use crate::rag::RagService;
use std::collections::HashMap;

const ANALYSIS_CHUNKS: &[&str] = &[
    "core_story_foundation",
    "character_foundation",
    "setting_foundation",
    "plot_structure",
    "theme_message",
    "tone_style",
    "conflict_stakes",
    "world_rules_logic",
];

use crate::utils::string_utils::title_case;

pub struct OutlineResult {
    pub context: Context,
    pub chunks: HashMap<String, String>,
}

pub async fn generate_outline(
    executor: &PromptExecutor<'_>,
    rag: &RagService,
    story_name: &str,
    prompt_text: &str,
    model: &ModelConfig,
) -> Result<OutlineResult> {
    // Step 1: understand the prompt; seeds the transcript every later step continues.
    let mut vars = HashMap::new();
    vars.insert("prompt".to_string(), prompt_text.to_string());
    let understand_prompt_text = executor.prompts.load("outline.understand_prompt", &vars)?;
    let understanding = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "outline.understand_prompt",
                variables: vars,
            },
            savepoint_id: Some("understand_prompt"),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    let mut transcript = vec![
        Message::user(understand_prompt_text),
        Message::assistant(understanding),
    ];

    // Step 2: eight analysis chunks, each one more turn on the shared transcript.
    let mut chunks = HashMap::new();
    for name in ANALYSIS_CHUNKS {
        let follow_up = executor.prompts.load(&format!("outline.{name}"), &HashMap::new())?;
        transcript.push(Message::user(follow_up));

        let savepoint_id = format!("story_analysis/{name}_chunk");
        let result = executor
            .execute(ExecRequest {
                input: ExecInput::Transcript(transcript.clone()),
                savepoint_id: Some(&savepoint_id),
                system_message: None,
                model_config: model,
                options: GenerateOptions::default(),
                expect_json: false,
                required_attrs: Vec::new(),
            })
            .await?
            .content;

        transcript.push(Message::assistant(result.clone()));
        rag.index_outline(&result, name).await?;
        chunks.insert(name.to_string(), result);
    }

    // Step 3: story start date and base context, derived from the core foundation chunk.
    let core_foundation = chunks
        .get("core_story_foundation")
        .cloned()
        .unwrap_or_default();

    let mut vars = HashMap::new();
    vars.insert("core_story_foundation".to_string(), core_foundation.clone());
    let story_start_date = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "outline.story_start_date",
                variables: vars.clone(),
            },
            savepoint_id: Some("story_start_date"),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    let base_context = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "outline.base_context",
                variables: vars,
            },
            savepoint_id: Some("base_context"),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    // Step 4: story elements = the eight chunks concatenated under Title Case headers.
    let story_elements = ANALYSIS_CHUNKS
        .iter()
        .map(|name| format!("=== {} ===\n{}", title_case(name), chunks.get(*name).cloned().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n\n");
    executor
        .savepoints
        .save("story_elements", crate::savepoint::SavepointValue::from(story_elements.clone()))?;

    // Step 5: entity sheets for characters and settings.
    for kind in [EntityKind::Character, EntityKind::Setting] {
        let names = entity_manager::extract_names(
            executor,
            kind,
            &story_elements,
            &format!("{}_names", kind.label()),
            model,
        )
        .await?;
        for name in &names {
            let sheet = entity_manager::generate_sheet(executor, kind, name, &story_elements, model).await?;
            entity_manager::generate_and_index_chunks(executor, rag, kind, name, &story_elements, &sheet, model)
                .await?;
        }
    }

    Ok(OutlineResult {
        context: Context {
            story_name: story_name.to_string(),
            prompt_text: prompt_text.to_string(),
            story_elements,
            story_start_date,
            base_context,
        },
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_chunk_names() {
        assert_eq!(title_case("core_story_foundation"), "Core Story Foundation");
        assert_eq!(title_case("plot_structure"), "Plot Structure");
    }
}
