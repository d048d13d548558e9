//! Error types for codeseek-index.

/// Errors that can occur while scanning, chunking, indexing or searching.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files or the hash cache.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vector store error outside of a job phase.
    #[error("vector store error: {0}")]
    Store(#[from] codeseek_store::VectorStoreError),

    /// Tree-sitter parsing error.
    #[error("parse failed: {0}")]
    Parse(String),

    /// File extension not in the language registry.
    #[error("unsupported file: {0}")]
    UnsupportedFile(String),

    /// Tokenizer could not be loaded.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Invalid chunker limits.
    #[error("invalid chunk limits: {0}")]
    InvalidLimits(String),

    /// Repository root missing or not a directory.
    #[error("scan failed: {0}")]
    Scan(String),

    /// No job registered under this id.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Query embedding failed during search.
    #[error("failed to generate query embedding: {0}")]
    QueryEmbedding(#[source] codeseek_embed::EmbedError),

    /// Candidate retrieval failed during search.
    #[error("failed to search vector database: {0}")]
    VectorSearch(#[source] codeseek_store::VectorStoreError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
