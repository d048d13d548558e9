#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding request failed (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("empty embedding from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("expected {expected} dimensions from model, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding for text {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<EmbedError>,
    },

    #[error("embedding task failed: {0}")]
    Join(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EmbedError>;
