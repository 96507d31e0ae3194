use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookGeneratorError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("LLM error: {0}")]
    LLMError(String),

    #[error("Chain error: {0}")]
    ChainError(#[from] langchain_rust::chain::ChainError),

    #[error("Prompt error: {0}")]
    PromptError(#[from] langchain_rust::prompt::PromptError),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedLLMProvider(String),

    #[error("Other error: {0}")]
    Other(String),

    #[error("Duplicate content error: {0}")]
    DuplicateContent(String),

    #[error("Missing context: {0}")]
    MissingContext(String),

    #[error("Duplicate chapter title: {0}")]
    DuplicateChapterTitle(String),

    // --- savepoint store (C1) ---
    #[error("Savepoint store is not bound to a story: call set_story() first")]
    SavepointNotBound,

    #[error("Unsupported savepoint value type: {0}")]
    UnsupportedSavepointType(String),

    #[error("Corrupt savepoint at '{step_id}': {source}")]
    SavepointCorrupt {
        step_id: String,
        source: serde_yaml::Error,
    },

    // --- prompt registry (C2) ---
    #[error("Prompt template '{0}' not found")]
    PromptNotFound(String),

    #[error("Missing variable '{variable}' for prompt template '{prompt_id}'")]
    TemplateVariableMissing { prompt_id: String, variable: String },

    // --- model provider (C3) ---
    #[error("Provider transport error: {0}")]
    ProviderTransport(String),

    #[error("Provider returned unparseable JSON: {0}")]
    ProviderParse(String),

    #[error("Invalid model config string '{0}'")]
    InvalidModelConfig(String),

    #[error("JSON parse error: could not locate a JSON object or array in model output")]
    JSONParseError,

    // --- RAG (C5/C6/C8/C9) ---
    #[error("Embedding provider error: {0}")]
    EmbeddingError(String),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] sqlx::Error),

    #[error("Reranker load failure: {0}")]
    RerankerLoadFailure(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    // --- chapter pipeline (C13) ---
    #[error("Chapter {chapter} stage '{stage}' failed: {source}")]
    ChapterStageFailure {
        chapter: usize,
        stage: String,
        #[source]
        source: Box<BookGeneratorError>,
    },
}

pub type Result<T> = std::result::Result<T, BookGeneratorError>;

impl From<langchain_rust::language_models::LLMError> for BookGeneratorError {
    fn from(err: langchain_rust::language_models::LLMError) -> Self {
        BookGeneratorError::LLMError(err.to_string())
    }
}

impl From<serde_json::Error> for BookGeneratorError {
    fn from(err: serde_json::Error) -> Self {
        BookGeneratorError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for BookGeneratorError {
    fn from(err: reqwest::Error) -> Self {
        BookGeneratorError::ProviderTransport(err.to_string())
    }
}
