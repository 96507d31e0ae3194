//! RAG indexing and retrieval core (C5-C9).

pub mod chunker;
pub mod embedding;
pub mod reranker;
pub mod service;
pub mod vector_store;

pub use service::RagService;
