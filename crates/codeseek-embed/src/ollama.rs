use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::mrl::{apply_mrl, l2_normalize, mrl_target};
use crate::provider::EmbeddingProvider;

/// Connection and post-processing settings for [`OllamaEmbedder`].
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// Vector length the model natively returns.
    pub full_dimension: usize,
    /// Requested output length when MRL truncation is enabled.
    pub dimensions: usize,
    pub use_mrl: bool,
    pub normalize: bool,
    /// Inputs longer than this many characters are cut before sending.
    pub max_input_chars: usize,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
            full_dimension: 768,
            dimensions: 256,
            use_mrl: true,
            normalize: true,
            max_input_chars: 4000,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embedding client for Ollama's `/api/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaEmbedder {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = crate::http::default_client(config.timeout)?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn reduces_dimensions(&self) -> bool {
        self.config.use_mrl && self.config.dimensions < self.config.full_dimension
    }

    /// Probe the backend with a short request.
    ///
    /// # Errors
    ///
    /// Returns the embedding error when the backend is unreachable or misconfigured.
    pub async fn health_check(&self) -> Result<()> {
        self.embed("health check").await.map(|_| ())
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = truncate_chars(text, self.config.max_input_chars);
        let body = EmbeddingRequest {
            model: &self.config.model,
            prompt,
        };

        let response = self
            .client
            .post(format!(
                "{}/api/embeddings",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %text, "Ollama embedding API error");
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        if resp.embedding.is_empty() {
            return Err(EmbedError::EmptyResponse { provider: "ollama" });
        }
        if resp.embedding.len() != self.config.full_dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: self.config.full_dimension,
                actual: resp.embedding.len(),
            });
        }

        let mut vector = resp.embedding;
        if self.reduces_dimensions() {
            vector = apply_mrl(vector, self.config.dimensions);
        }
        if self.config.normalize {
            l2_normalize(&mut vector);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        if self.reduces_dimensions() {
            mrl_target(self.config.dimensions).min(self.config.full_dimension)
        } else {
            self.config.full_dimension
        }
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> OllamaConfig {
        OllamaConfig {
            base_url: server.uri(),
            full_dimension: 8,
            dimensions: 8,
            use_mrl: false,
            normalize: false,
            ..OllamaConfig::default()
        }
    }

    async fn mount_embedding(server: &MockServer, embedding: Vec<f32>) {
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embedding": embedding })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn embed_returns_vector() {
        let server = MockServer::start().await;
        mount_embedding(&server, vec![0.5; 8]).await;

        let embedder = OllamaEmbedder::new(config_for(&server)).unwrap();
        let v = embedder.embed("fn main() {}").await.unwrap();
        assert_eq!(v, vec![0.5; 8]);
        assert_eq!(embedder.dimensions(), 8);
    }

    #[tokio::test]
    async fn embed_sends_model_and_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "nomic-embed-text",
                "prompt": "hello",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embedding": vec![1.0; 8] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(config_for(&server)).unwrap();
        embedder.embed("hello").await.unwrap();
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_error() {
        let server = MockServer::start().await;
        mount_embedding(&server, vec![0.1; 4]).await;

        let embedder = OllamaEmbedder::new(config_for(&server)).unwrap();
        let err = embedder.embed("x").await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
        assert_eq!(err.to_string(), "expected 8 dimensions from model, got 4");
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not found"))
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(config_for(&server)).unwrap();
        let err = embedder.embed("x").await.unwrap_err();
        match err {
            EmbedError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_embedding_is_an_error() {
        let server = MockServer::start().await;
        mount_embedding(&server, vec![]).await;

        let embedder = OllamaEmbedder::new(config_for(&server)).unwrap();
        let err = embedder.embed("x").await.unwrap_err();
        assert!(matches!(err, EmbedError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn mrl_truncates_then_normalizes() {
        let server = MockServer::start().await;
        let mut full = vec![0.0_f32; 768];
        full[0] = 3.0;
        full[1] = 4.0;
        full[700] = 100.0;
        mount_embedding(&server, full).await;

        let config = OllamaConfig {
            base_url: server.uri(),
            ..OllamaConfig::default()
        };
        let embedder = OllamaEmbedder::new(config).unwrap();
        assert_eq!(embedder.dimensions(), 256);

        let v = embedder.embed("x").await.unwrap();
        assert_eq!(v.len(), 256);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let config = OllamaConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout: Duration::from_secs(2),
            ..OllamaConfig::default()
        };
        let embedder = OllamaEmbedder::new(config).unwrap();
        assert!(embedder.health_check().await.is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
