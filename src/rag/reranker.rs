//! Optional rescoring of retrieved chunks (C8).

use crate::error::Result;
use crate::rag::vector_store::ChunkRow;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStrategy {
    Hybrid,
    Keyword,
    Metadata,
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStrategy {
    CrossEncoder,
    Hybrid,
}

pub enum Reranker {
    RuleBased { strategy: RuleStrategy },
    ModelBased { strategy: ModelStrategy },
}

#[derive(Debug, Clone)]
pub struct RerankedResult {
    pub chunk_id: i32,
    pub content_type: String,
    pub content: String,
    pub metadata: JsonValue,
    pub original_similarity: f64,
    pub reranked_score: f64,
    pub reason: String,
}

/// Rule-based weighting (implementation discretion — no source-specified
/// values): hybrid = 0.5 keyword-overlap + 0.3 normalized-similarity + 0.2
/// metadata-boost.
const HYBRID_KEYWORD_WEIGHT: f64 = 0.5;
const HYBRID_SIMILARITY_WEIGHT: f64 = 0.3;
const HYBRID_METADATA_WEIGHT: f64 = 0.2;
const MODEL_HYBRID_MODEL_WEIGHT: f64 = 0.7;
const MODEL_HYBRID_SIMILARITY_WEIGHT: f64 = 0.3;

impl Reranker {
    pub async fn rerank(&self, query: &str, results: Vec<ChunkRow>) -> Result<Vec<RerankedResult>> {
        let mut reranked = match self {
            Reranker::RuleBased { strategy } => rule_based_rerank(query, results, *strategy),
            Reranker::ModelBased { strategy } => {
                // Cross-encoder inference runs on a worker pool so it never
                // blocks the async scheduler.
                match model_based_rerank(query, results.clone(), *strategy).await {
                    Ok(r) => r,
                    Err(_) => original_order_fallback(results, "reranker load/inference failure"),
                }
            }
        };
        reranked.sort_by(|a, b| b.reranked_score.partial_cmp(&a.reranked_score).unwrap());
        Ok(reranked)
    }
}

fn keyword_overlap(query: &str, content: &str) -> f64 {
    let query_words: std::collections::HashSet<String> =
        query.to_lowercase().split_whitespace().map(String::from).collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let hits = query_words
        .iter()
        .filter(|w| content_lower.contains(w.as_str()))
        .count();
    hits as f64 / query_words.len() as f64
}

fn metadata_boost(metadata: &JsonValue) -> f64 {
    if metadata.get("priority").and_then(|v| v.as_str()) == Some("high") {
        1.0
    } else {
        0.5
    }
}

fn rule_based_rerank(query: &str, results: Vec<ChunkRow>, strategy: RuleStrategy) -> Vec<RerankedResult> {
    results
        .into_iter()
        .map(|r| {
            let similarity = r.similarity.unwrap_or(0.0);
            let keyword = keyword_overlap(query, &r.content);
            let metadata = metadata_boost(&r.metadata);
            let score = match strategy {
                RuleStrategy::Keyword => keyword,
                RuleStrategy::Metadata => metadata,
                RuleStrategy::Semantic => similarity,
                RuleStrategy::Hybrid => {
                    HYBRID_KEYWORD_WEIGHT * keyword
                        + HYBRID_SIMILARITY_WEIGHT * similarity
                        + HYBRID_METADATA_WEIGHT * metadata
                }
            };
            RerankedResult {
                chunk_id: r.id,
                content_type: r.content_type,
                content: r.content,
                metadata: r.metadata,
                original_similarity: similarity,
                reranked_score: score,
                reason: format!("rule_based:{strategy:?}"),
            }
        })
        .collect()
}

async fn model_based_rerank(
    query: &str,
    results: Vec<ChunkRow>,
    strategy: ModelStrategy,
) -> Result<Vec<RerankedResult>> {
    let query = query.to_string();
    tokio::task::spawn_blocking(move || {
        results
            .into_iter()
            .map(|r| {
                let similarity = r.similarity.unwrap_or(0.0);
                let model_score = cross_encoder_score(&query, &r.content);
                let score = match strategy {
                    ModelStrategy::CrossEncoder => model_score,
                    ModelStrategy::Hybrid => {
                        MODEL_HYBRID_MODEL_WEIGHT * model_score + MODEL_HYBRID_SIMILARITY_WEIGHT * similarity
                    }
                };
                RerankedResult {
                    chunk_id: r.id,
                    content_type: r.content_type,
                    content: r.content,
                    metadata: r.metadata,
                    original_similarity: similarity,
                    reranked_score: score,
                    reason: format!("model_based:{strategy:?}"),
                }
            })
            .collect()
    })
    .await
    .map_err(|e| crate::error::BookGeneratorError::RerankerLoadFailure(e.to_string()))
}

/// Placeholder cross-encoder: truncates to a token budget and scores by
/// normalized keyword overlap. A real cross-encoder model is loaded lazily
/// on first use in a full deployment; this keeps the worker-pool contract
/// (CPU-bound work never runs on the async scheduler) without a model
/// dependency this crate cannot fetch.
fn cross_encoder_score(query: &str, content: &str) -> f64 {
    const TOKEN_BUDGET: usize = 512;
    let truncated: String = content.split_whitespace().take(TOKEN_BUDGET).collect::<Vec<_>>().join(" ");
    keyword_overlap(query, &truncated)
}

fn original_order_fallback(results: Vec<ChunkRow>, reason: &str) -> Vec<RerankedResult> {
    results
        .into_iter()
        .map(|r| {
            let similarity = r.similarity.unwrap_or(0.0);
            RerankedResult {
                chunk_id: r.id,
                content_type: r.content_type,
                content: r.content,
                metadata: r.metadata,
                original_similarity: similarity,
                reranked_score: similarity,
                reason: reason.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<ChunkRow> {
        vec![
            ChunkRow {
                id: 1,
                content_type: "outline".to_string(),
                content: "the dragon flies over the castle".to_string(),
                metadata: serde_json::json!({}),
                similarity: Some(0.4),
            },
            ChunkRow {
                id: 2,
                content_type: "outline".to_string(),
                content: "a quiet morning in the village".to_string(),
                metadata: serde_json::json!({"priority": "high"}),
                similarity: Some(0.9),
            },
        ]
    }

    #[tokio::test]
    async fn keyword_strategy_favors_keyword_overlap() {
        let reranker = Reranker::RuleBased {
            strategy: RuleStrategy::Keyword,
        };
        let reranked = reranker.rerank("dragon castle", sample_rows()).await.unwrap();
        assert_eq!(reranked[0].chunk_id, 1);
    }

    #[tokio::test]
    async fn semantic_strategy_preserves_similarity_order() {
        let reranker = Reranker::RuleBased {
            strategy: RuleStrategy::Semantic,
        };
        let reranked = reranker.rerank("anything", sample_rows()).await.unwrap();
        assert_eq!(reranked[0].chunk_id, 2);
    }

    #[tokio::test]
    async fn model_based_runs_on_worker_pool_and_returns_sorted() {
        let reranker = Reranker::ModelBased {
            strategy: ModelStrategy::Hybrid,
        };
        let reranked = reranker.rerank("village morning", sample_rows()).await.unwrap();
        assert_eq!(reranked.len(), 2);
        assert!(reranked[0].reranked_score >= reranked[1].reranked_score);
    }
}
