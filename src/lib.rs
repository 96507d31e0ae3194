//! Narrative-generation pipeline: outline -> per-entity sheets -> chapters ->
//! recap -> rendered book, every stage resumable via the savepoint store.

pub mod book;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod prompts;
pub mod rag;
pub mod recap;
pub mod render;
pub mod savepoint;
pub mod state;
pub mod utils;

pub use book::{Book, Chapter, Context};
pub use config::Config;
pub use error::{BookGeneratorError, Result};
pub use render::{generate_pdf_and_epub, render_book};
pub use utils::logging::TokenTracker;

use book::chapter as chapter_pipeline;
use book::outline;
use executor::PromptExecutor;
use llm::ModelConfig;
use prompts::PromptRegistry;
use rag::embedding::OllamaEmbeddingProvider;
use rag::vector_store::VectorStore;
use rag::RagService;
use savepoint::SavepointStore;
use std::path::Path;
use tracing::{info, warn};
use utils::file_utils::sanitize_filename;

fn resolve_model_config(config: &Config) -> Result<ModelConfig> {
    let scheme = match config.llm_provider.as_str() {
        "openai" => "openai-compatible",
        other => other,
    };
    ModelConfig::parse(&format!("{scheme}://{}", config.model))
}

async fn connect_rag(config: &Config) -> Result<RagService> {
    let vector_store = VectorStore::connect(&config.rag.postgres_url, config.rag.vector_dimensions).await?;
    vector_store.ensure_schema().await?;
    let embedding = Box::new(OllamaEmbeddingProvider::new(config));
    Ok(RagService::new(vector_store, embedding, config.rag.clone()))
}

/// Runs the whole pipeline for one story: outline, per-chapter generation,
/// and assembly into a [`Book`]. `prompt_text` is the raw creative brief
/// (braindump/synopsis/etc.) that seeds the outline stage.
pub async fn generate_book_with_dir(
    title: String,
    prompt_text: String,
    config: &Config,
    output_dir: &Path,
    _auto_generate: bool,
) -> Result<(Book, TokenTracker)> {
    std::fs::create_dir_all(output_dir)?;

    let model_config = resolve_model_config(config)?;
    let provider = llm::provider_for(&model_config, config)?;

    let mut savepoints = SavepointStore::new(output_dir.join("savepoints"));
    let story_name = sanitize_filename(&title);
    savepoints.set_story(&story_name)?;

    let prompts = PromptRegistry::new(&config.prompt_root);
    prompts.ensure_builtin_defaults()?;

    let mut rag = connect_rag(config).await?;
    rag.create_story(&story_name, &format!("{story_name}.md")).await?;

    let executor = PromptExecutor::new(&savepoints, &prompts, provider.as_ref());

    info!(story = %story_name, "generating outline");
    let outline_result = outline::generate_outline(&executor, &rag, &title, &prompt_text, &model_config).await?;

    let chapter_count = chapter_pipeline::discover_chapter_count(&savepoints, config);
    info!(chapter_count, "chapter count resolved");

    let mut chapters = Vec::new();
    for chapter_number in 1..=chapter_count {
        match chapter_pipeline::generate_chapter(
            &executor,
            &rag,
            &outline_result.context,
            chapter_number,
            config,
            &model_config,
        )
        .await
        {
            Ok(Some(chapter)) => chapters.push(chapter),
            Ok(None) => {
                warn!(chapter_number, "chapter skipped: no synopsis available");
                continue;
            }
            Err(e) => {
                warn!(chapter_number, error = %e, "chapter generation failed; continuing to next chapter");
                continue;
            }
        }
    }

    let book = Book {
        story_name: title,
        context: outline_result.context,
        chapters,
    };

    let tracker = TokenTracker::new();
    Ok((book, tracker))
}
