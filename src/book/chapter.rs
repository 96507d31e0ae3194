//! Per-chapter generation pipeline (C13): synopsis -> outline -> scenes ->
//! recap -> title. Every step is savepoint-backed and therefore idempotent;
//! a chapter that fails is logged and skipped rather than aborting the run.

use crate::book::entity_manager::{self, EntityKind};
use crate::book::scene::{parse_scene_definitions, SceneDefinition};
use crate::book::{Chapter, ChapterOutline, Context, Scene};
use crate::config::Config;
use crate::error::Result;
use crate::executor::{ExecInput, ExecRequest, PromptExecutor};
use crate::llm::{GenerateOptions, ModelConfig};
use crate::rag::RagService;
use crate::recap;
use crate::savepoint::{SavepointStore, SavepointValue};
use std::collections::HashMap;
use tracing::{info, warn};

const ISSUES_PREFIX: &str = "ISSUES:";
const MIN_SCENE_WORDS: usize = 500;

/// Scans the savepoint directory for `chapter_<N>` folders and returns the
/// larger of that maximum and the configured cap, so resuming never skips
/// chapters already on disk and a fresh run never exceeds the config.
pub fn discover_chapter_count(savepoints: &SavepointStore, config: &Config) -> usize {
    let discovered = savepoints
        .story_dir()
        .ok()
        .and_then(|dir| std::fs::read_dir(dir).ok())
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| {
                    e.file_name()
                        .to_str()
                        .and_then(|n| n.strip_prefix("chapter_"))
                        .and_then(|n| n.parse::<usize>().ok())
                })
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);

    if discovered > config.max_chapters {
        warn!(discovered, configured = config.max_chapters, "on-disk chapters exceed configured max; using discovered count");
        discovered
    } else {
        config.max_chapters
    }
}

pub async fn generate_chapter(
    executor: &PromptExecutor<'_>,
    rag: &RagService,
    context: &Context,
    chapter_number: usize,
    config: &Config,
    model: &ModelConfig,
) -> Result<Option<Chapter>> {
    let Some(synopsis) = ensure_synopsis(executor, context, chapter_number, model).await? else {
        warn!(chapter_number, "no synopsis could be produced; skipping chapter");
        return Ok(None);
    };

    let outline = generate_chapter_outline(executor, rag, chapter_number, &synopsis, model).await?;
    let scenes = generate_scenes(executor, &outline, chapter_number, model).await?;
    let content = scenes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("\n\n");
    executor
        .savepoints
        .save(&format!("chapter_{chapter_number}/content"), SavepointValue::from(content.clone()))?;

    for kind in [EntityKind::Character, EntityKind::Setting] {
        entity_manager::update_sheets_for_chapter(executor, kind, &content, model).await?;
    }

    let recap_id = format!("chapter_{chapter_number}/recap");
    let recap_text = if executor.savepoints.has(&recap_id)? {
        executor
            .savepoints
            .load(&recap_id)?
            .map(|v| v.into_string())
            .unwrap_or_default()
    } else {
        let previous_recap = previous_recap(executor, chapter_number)?;
        recap::generate_recap(
            executor,
            chapter_number,
            &content,
            &previous_recap,
            &context.story_start_date,
            model,
            config.max_event_age_days,
        )
        .await
    };

    let title = generate_title(executor, chapter_number, &content, &outline.text, model).await?;

    info!(chapter_number, %title, scenes = scenes.len(), "chapter generated");

    Ok(Some(Chapter {
        number: chapter_number,
        title,
        outline,
        scenes,
        content,
        recap: recap_text,
    }))
}

fn previous_recap(executor: &PromptExecutor<'_>, chapter_number: usize) -> Result<String> {
    if chapter_number <= 1 {
        return Ok(String::new());
    }
    Ok(executor
        .savepoints
        .load(&format!("chapter_{}/recap", chapter_number - 1))?
        .map(|v| v.into_string())
        .unwrap_or_default())
}

async fn ensure_synopsis(
    executor: &PromptExecutor<'_>,
    context: &Context,
    chapter_number: usize,
    model: &ModelConfig,
) -> Result<Option<String>> {
    let savepoint_id = format!("chapter_{chapter_number}/synopsis");
    if let Some(existing) = executor.savepoints.load(&savepoint_id)? {
        return Ok(Some(existing.into_string()));
    }

    if context.story_elements.is_empty() {
        return Ok(None);
    }

    let previous_synopsis = if chapter_number <= 1 {
        String::new()
    } else {
        executor
            .savepoints
            .load(&format!("chapter_{}/synopsis", chapter_number - 1))?
            .map(|v| v.into_string())
            .unwrap_or_default()
    };

    let mut vars = HashMap::new();
    vars.insert("chapter_number".to_string(), chapter_number.to_string());
    vars.insert("understanding".to_string(), context.prompt_text.clone());
    vars.insert("base_context".to_string(), context.base_context.clone());
    vars.insert("combined_outline".to_string(), context.story_elements.clone());
    vars.insert("characters".to_string(), String::new());
    vars.insert("settings".to_string(), String::new());
    vars.insert("previous_synopsis".to_string(), previous_synopsis);

    let result = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "chapter.ensure_synopsis",
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
    Ok(Some(result.content))
}

async fn generate_chapter_outline(
    executor: &PromptExecutor<'_>,
    rag: &RagService,
    chapter_number: usize,
    synopsis: &str,
    model: &ModelConfig,
) -> Result<ChapterOutline> {
    let final_id = format!("chapter_{chapter_number}/outline");
    if let Some(existing) = executor.savepoints.load(&final_id)? {
        return Ok(ChapterOutline {
            chapter_number,
            synopsis: synopsis.to_string(),
            text: existing.into_string(),
        });
    }

    let entity_names = entity_manager::extract_names(
        executor,
        EntityKind::Character,
        synopsis,
        &format!("chapter_{chapter_number}/character_names"),
        model,
    )
    .await?;
    let characters = entity_manager::get_summaries(executor, EntityKind::Character, &entity_names, model).await?;

    let setting_names = entity_manager::extract_names(
        executor,
        EntityKind::Setting,
        synopsis,
        &format!("chapter_{chapter_number}/setting_names"),
        model,
    )
    .await?;
    let settings = entity_manager::get_summaries(executor, EntityKind::Setting, &setting_names, model).await?;

    let previous_recap = previous_recap(executor, chapter_number)?;
    let next_synopsis = executor
        .savepoints
        .load(&format!("chapter_{}/synopsis", chapter_number + 1))?
        .map(|v| v.into_string())
        .unwrap_or_default();

    let mut vars = HashMap::new();
    vars.insert("chapter_number".to_string(), chapter_number.to_string());
    vars.insert("synopsis".to_string(), synopsis.to_string());
    vars.insert("characters".to_string(), characters);
    vars.insert("settings".to_string(), settings);
    vars.insert("previous_recap".to_string(), previous_recap);
    vars.insert("next_synopsis".to_string(), next_synopsis);
    let core_outline = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "chapter.core_outline",
                variables: vars,
            },
            savepoint_id: Some(&format!("chapter_{chapter_number}/core_outline")),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    let mut vars = HashMap::new();
    vars.insert("outline".to_string(), core_outline.clone());
    let review = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "chapter.validate_outline",
                variables: vars,
            },
            savepoint_id: None,
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    let working_outline = if let Some(issues) = review.trim().strip_prefix(ISSUES_PREFIX) {
        let mut vars = HashMap::new();
        vars.insert("outline".to_string(), core_outline);
        vars.insert("issues".to_string(), issues.trim().to_string());
        executor
            .execute(ExecRequest {
                input: ExecInput::Prompt {
                    prompt_id: "chapter.improve_outline",
                    variables: vars,
                },
                savepoint_id: Some(&format!("chapter_{chapter_number}/improved_outline")),
                system_message: None,
                model_config: model,
                options: GenerateOptions::default(),
                expect_json: false,
                required_attrs: Vec::new(),
            })
            .await?
            .content
    } else {
        core_outline
    };

    let mut vars = HashMap::new();
    vars.insert("outline".to_string(), working_outline);
    let disambiguated = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "chapter.disambiguate_outline",
                variables: vars,
            },
            savepoint_id: Some(&format!("chapter_{chapter_number}/disambiguated_outline")),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    let mut vars = HashMap::new();
    vars.insert("outline".to_string(), disambiguated.clone());
    let cleaned = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "chapter.cleanup_outline",
                variables: vars,
            },
            savepoint_id: Some(&format!("chapter_{chapter_number}/cleaned_outline")),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    executor
        .savepoints
        .save(&final_id, SavepointValue::from(cleaned.clone()))?;

    let _ = rag; // entity sheets were already indexed as they were generated

    Ok(ChapterOutline {
        chapter_number,
        synopsis: synopsis.to_string(),
        text: cleaned,
    })
}

async fn generate_scenes(
    executor: &PromptExecutor<'_>,
    outline: &ChapterOutline,
    chapter_number: usize,
    model: &ModelConfig,
) -> Result<Vec<Scene>> {
    let definitions_id = format!("chapter_{chapter_number}/scene_definitions");
    let definitions: Vec<SceneDefinition> = match executor.savepoints.load(&definitions_id)? {
        Some(existing) => serde_json::from_str(&existing.into_string()).unwrap_or_else(|_| {
            vec![SceneDefinition {
                title: "Scene 1".to_string(),
                description: outline.text.clone(),
            }]
        }),
        None => {
            let mut vars = HashMap::new();
            vars.insert("outline".to_string(), outline.text.clone());
            let raw = executor
                .execute(ExecRequest {
                    input: ExecInput::Prompt {
                        prompt_id: "chapter.scene_definitions",
                        variables: vars,
                    },
                    savepoint_id: None,
                    system_message: None,
                    model_config: model,
                    options: GenerateOptions::default(),
                    expect_json: true,
                    required_attrs: Vec::new(),
                })
                .await?
                .content;
            let parsed = parse_scene_definitions(&raw, &outline.text);
            executor.savepoints.save(
                &definitions_id,
                SavepointValue::from(serde_json::to_value(&parsed)?),
            )?;
            parsed
        }
    };

    let mut scenes = Vec::with_capacity(definitions.len());
    let mut previous_content = String::new();
    for (idx, def) in definitions.iter().enumerate() {
        let scene_number = idx + 1;
        let content_id = format!("chapter_{chapter_number}/scene_{scene_number}/content");
        let title_id = format!("chapter_{chapter_number}/scene_{scene_number}/title");

        let content = if let Some(existing) = executor.savepoints.load(&content_id)? {
            existing.into_string()
        } else {
            let mut vars = HashMap::new();
            vars.insert("scene_number".to_string(), scene_number.to_string());
            vars.insert("scene_title".to_string(), def.title.clone());
            vars.insert("scene_description".to_string(), def.description.clone());
            vars.insert("chapter_outline".to_string(), outline.text.clone());
            vars.insert("previous_scene".to_string(), previous_content.clone());
            executor
                .execute(ExecRequest {
                    input: ExecInput::Prompt {
                        prompt_id: "chapter.scene_content",
                        variables: vars,
                    },
                    savepoint_id: Some(&content_id),
                    system_message: None,
                    model_config: model,
                    options: GenerateOptions {
                        min_words: Some(MIN_SCENE_WORDS),
                        ..Default::default()
                    },
                    expect_json: false,
                    required_attrs: Vec::new(),
                })
                .await?
                .content
        };

        let title = if let Some(existing) = executor.savepoints.load(&title_id)? {
            existing.into_string()
        } else {
            let mut vars = HashMap::new();
            vars.insert("scene_content".to_string(), content.clone());
            executor
                .execute(ExecRequest {
                    input: ExecInput::Prompt {
                        prompt_id: "chapter.scene_title",
                        variables: vars,
                    },
                    savepoint_id: Some(&title_id),
                    system_message: None,
                    model_config: model,
                    options: GenerateOptions::default(),
                    expect_json: false,
                    required_attrs: Vec::new(),
                })
                .await?
                .content
        };

        previous_content = content.clone();
        scenes.push(Scene {
            number: scene_number,
            title,
            description: def.description.clone(),
            content,
        });
    }

    Ok(scenes)
}

async fn generate_title(
    executor: &PromptExecutor<'_>,
    chapter_number: usize,
    chapter_content: &str,
    chapter_outline: &str,
    model: &ModelConfig,
) -> Result<String> {
    let mut vars = HashMap::new();
    vars.insert("chapter_content".to_string(), chapter_content.to_string());
    vars.insert("chapter_outline".to_string(), chapter_outline.to_string());
    let result = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "chapter.title",
                variables: vars,
            },
            savepoint_id: Some(&format!("chapter_{chapter_number}/title")),
            system_message: None,
            model_config: model,
            options: GenerateOptions::default(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?;
    Ok(result.content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn discover_chapter_count_prefers_larger_of_discovered_and_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SavepointStore::new(dir.path());
        store.set_story("story-a").unwrap();
        store.save("chapter_3/content", "x").unwrap();
        store.save("chapter_7/content", "x").unwrap();

        let mut config = Config {
            max_chapters: 5,
            ..Default::default()
        };
        assert_eq!(discover_chapter_count(&store, &config), 7);

        config.max_chapters = 20;
        assert_eq!(discover_chapter_count(&store, &config), 20);
    }
}
