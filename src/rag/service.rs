//! Orchestrator over the embedding provider, vector store, chunker, and
//! reranker (C9), enforcing per-story isolation.

use crate::config::RagConfig;
use crate::error::Result;
use crate::rag::chunker::chunk_text;
use crate::rag::embedding::EmbeddingProvider;
use crate::rag::reranker::{RerankedResult, Reranker};
use crate::rag::vector_store::{ChunkRow, NewChunk, SearchQuery, VectorStore};
use serde_json::Value as JsonValue;

pub struct RagService {
    pub vector_store: VectorStore,
    pub embedding: Box<dyn EmbeddingProvider>,
    config: RagConfig,
    current_story_id: Option<i32>,
}

impl RagService {
    pub fn new(vector_store: VectorStore, embedding: Box<dyn EmbeddingProvider>, config: RagConfig) -> Self {
        Self {
            vector_store,
            embedding,
            config,
            current_story_id: None,
        }
    }

    pub async fn create_story(&mut self, story_name: &str, prompt_file_path: &str) -> Result<i32> {
        let id = self.vector_store.create_story(story_name, prompt_file_path).await?;
        self.current_story_id = Some(id);
        Ok(id)
    }

    pub async fn index(&self, text: &str, content_type: &str, metadata: &JsonValue) -> Result<Vec<i32>> {
        let story_id = self.require_story_id()?;
        let chunks = chunk_text(text, self.config.max_chunk_size, self.config.chunk_overlap_size, metadata);
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedding.embed(&contents).await?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            let id = self
                .vector_store
                .insert_chunk(&NewChunk {
                    story_id,
                    content_type: content_type.to_string(),
                    content_subtype: None,
                    title: None,
                    body: chunk.content,
                    metadata: chunk.metadata,
                    embedding: vector,
                    chapter_number: None,
                    scene_number: None,
                })
                .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub async fn index_outline(&self, text: &str, chunk_type: &str) -> Result<Vec<i32>> {
        self.index(text, "story_analysis_chunk", &serde_json::json!({"chunk_type": chunk_type}))
            .await
    }

    pub async fn index_character(&self, name: &str, chunk_type: &str, text: &str) -> Result<Vec<i32>> {
        self.index(
            text,
            "character_chunk",
            &serde_json::json!({"character_name": name, "chunk_type": chunk_type, "generation_stage": "outline"}),
        )
        .await
    }

    pub async fn index_setting(&self, name: &str, chunk_type: &str, text: &str) -> Result<Vec<i32>> {
        self.index(
            text,
            "setting_chunk",
            &serde_json::json!({"setting_name": name, "chunk_type": chunk_type, "generation_stage": "outline"}),
        )
        .await
    }

    pub async fn search(
        &self,
        query: &str,
        content_type: Option<&str>,
        limit: i64,
        threshold: f64,
        cross_story: bool,
    ) -> Result<Vec<ChunkRow>> {
        let vector = self.embedding.embed_single(query).await?;
        let story_id = if cross_story { None } else { self.current_story_id };
        self.vector_store
            .search(
                &vector,
                &SearchQuery {
                    story_id,
                    content_type: content_type.map(String::from),
                    metadata_filters: None,
                    limit,
                    threshold,
                },
            )
            .await
    }

    pub async fn search_reranked(
        &self,
        query: &str,
        content_type: Option<&str>,
        limit: i64,
        threshold: f64,
        reranker: &Reranker,
    ) -> Result<Vec<RerankedResult>> {
        let results = self.search(query, content_type, limit, threshold, false).await?;
        reranker.rerank(query, results).await
    }

    pub async fn cleanup_by_type_and_metadata(&self, content_type: &str, filter: Option<&JsonValue>) -> Result<u64> {
        self.vector_store.delete_by_filters(content_type, filter).await
    }

    fn require_story_id(&self) -> Result<i32> {
        self.current_story_id
            .ok_or_else(|| crate::error::BookGeneratorError::MissingContext("no active story in RAG service".to_string()))
    }
}
