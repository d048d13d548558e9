//! Text embedding backends for codeseek.
//!
//! [`OllamaEmbedder`] calls a local Ollama server and post-processes the
//! returned vector (MRL truncation, L2 normalization). [`embed_batch`] fans a
//! batch of texts out over any [`EmbeddingProvider`] with a concurrency cap.

pub mod batch;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod mrl;
pub mod ollama;
pub mod provider;

pub use batch::embed_batch;
pub use error::{EmbedError, Result};
pub use ollama::{OllamaConfig, OllamaEmbedder};
pub use provider::EmbeddingProvider;
