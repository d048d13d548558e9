//! Application bootstrap: config resolution and component construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use codeseek_embed::{EmbeddingProvider, OllamaEmbedder};
use codeseek_index::{Chunker, HybridSearcher, IgnoreMatcher, Indexer, Scanner};
use codeseek_store::{QdrantOps, VectorStore};

use crate::config::Config;

pub type CodeIndexer = Indexer<OllamaEmbedder>;
pub type CodeSearcher = HybridSearcher<OllamaEmbedder>;

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Load and validate the config at `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn from_path(config_path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?;
        config.validate()?;
        tracing::debug!(path = %config_path.display(), "config loaded");
        Ok(Self::new(config, config_path.to_path_buf()))
    }

    #[must_use]
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build_embedder(&self) -> anyhow::Result<Arc<OllamaEmbedder>> {
        let embedder = OllamaEmbedder::new(self.config.ollama_config())
            .context("failed to create embedding client")?;
        Ok(Arc::new(embedder))
    }

    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn build_store(&self) -> anyhow::Result<Arc<dyn VectorStore>> {
        let url = &self.config.vector_db.url;
        let ops = QdrantOps::new(url)
            .map_err(|e| anyhow::anyhow!("failed to create Qdrant client for {url}: {e}"))?;
        Ok(Arc::new(ops))
    }

    /// Indexer over `provider` and `store` configured from the loaded file.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokenizer cannot be loaded or the config is invalid.
    pub fn build_indexer<P: EmbeddingProvider + 'static>(
        &self,
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
    ) -> anyhow::Result<Indexer<P>> {
        let chunker = Chunker::new(self.config.chunker_config()).context("failed to create chunker")?;
        let scanner = Scanner::new(
            IgnoreMatcher::new(&self.config.ignore_patterns),
            self.config.scanner_config(),
        );
        let config = self.config.indexer_config()?;
        tracing::debug!(
            workers = config.parallel_workers,
            collection = %config.collection,
            cache_dir = %config.cache_dir.display(),
            "indexer configured"
        );
        Ok(Indexer::new(provider, store, chunker, scanner, config))
    }

    #[must_use]
    pub fn build_searcher<P: EmbeddingProvider>(
        &self,
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
    ) -> HybridSearcher<P> {
        HybridSearcher::new(provider, store, self.config.search_config())
    }
}

/// Priority: explicit `--config` path > `CODESEEK_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODESEEK_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// Probe the embedding backend and log the outcome.
///
/// # Errors
///
/// Returns the backend error when the probe fails.
pub async fn health_check(embedder: &OllamaEmbedder) -> anyhow::Result<()> {
    let cfg = embedder.config();
    match embedder.health_check().await {
        Ok(()) => {
            tracing::info!(url = %cfg.base_url, model = %cfg.model, "embedding backend healthy");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(url = %cfg.base_url, model = %cfg.model, "embedding health check failed: {e:#}");
            Err(e).with_context(|| format!("embedding backend at {} is not usable", cfg.base_url))
        }
    }
}
