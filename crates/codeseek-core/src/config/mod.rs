mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use codeseek_embed::OllamaConfig;
use codeseek_index::{
    ChunkerConfig, IndexerConfig, MAX_CHUNK_CONTENT_BYTES, ScannerConfig, SearchConfig,
};
use codeseek_store::DistanceMetric;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the indexer or searcher cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.indexing.parallel_workers == 0 {
            return invalid("indexing.parallel_workers must be at least 1".into());
        }
        if self.indexing.batch_size == 0 {
            return invalid("indexing.batch_size must be at least 1".into());
        }
        if self.search.max_results == 0 {
            return invalid("search.max_results must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.search.semantic_weight) {
            return invalid(format!(
                "search.semantic_weight must be within 0..=1, got {}",
                self.search.semantic_weight
            ));
        }
        if self.embeddings.dimensions > self.embeddings.full_dimension {
            return invalid(format!(
                "embeddings.dimensions ({}) exceeds embeddings.full_dimension ({})",
                self.embeddings.dimensions, self.embeddings.full_dimension
            ));
        }
        if self.embeddings.max_concurrent == 0 {
            return invalid("embeddings.max_concurrent must be at least 1".into());
        }
        if !(1..=MAX_CHUNK_CONTENT_BYTES).contains(&self.chunking.max_chunk_size_bytes) {
            return invalid(format!(
                "chunking.max_chunk_size_bytes must be within 1..={MAX_CHUNK_CONTENT_BYTES}, got {}",
                self.chunking.max_chunk_size_bytes
            ));
        }
        if self.chunking.small_file_threshold >= self.chunking.medium_file_threshold {
            return invalid(format!(
                "chunking.small_file_threshold ({}) must be below chunking.medium_file_threshold ({})",
                self.chunking.small_file_threshold, self.chunking.medium_file_threshold
            ));
        }
        self.distance()?;
        Ok(())
    }

    /// Configured vector distance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown metric name.
    pub fn distance(&self) -> Result<DistanceMetric, ConfigError> {
        DistanceMetric::from_str(&self.vector_db.distance).map_err(|_| {
            ConfigError::Invalid(format!(
                "vector_db.distance must be one of cosine, dot, euclidean, got {}",
                self.vector_db.distance
            ))
        })
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        expand_tilde(&self.cache.dir)
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        let c = &self.chunking;
        ChunkerConfig {
            max_chunk_size_bytes: c.max_chunk_size_bytes,
            enable_hierarchical: c.enable_hierarchical,
            small_file_threshold: c.small_file_threshold,
            medium_file_threshold: c.medium_file_threshold,
            small_file_max_tokens: c.small_file_max_tokens,
            medium_file_max_tokens: c.medium_file_max_tokens,
            large_file_max_tokens: c.large_file_max_tokens,
        }
    }

    #[must_use]
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            max_file_size_bytes: self.indexing.max_file_size_mb.saturating_mul(1024 * 1024),
            respect_gitignore: self.indexing.respect_gitignore,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown distance metric.
    pub fn indexer_config(&self) -> Result<IndexerConfig, ConfigError> {
        Ok(IndexerConfig {
            parallel_workers: self.indexing.parallel_workers,
            batch_size: self.indexing.batch_size,
            incremental: self.indexing.incremental,
            background: self.indexing.background,
            collection: self.vector_db.collection.clone(),
            distance: self.distance()?,
            max_concurrent_embeddings: self.embeddings.max_concurrent,
            cache_dir: self.cache_dir(),
            ..IndexerConfig::default()
        })
    }

    #[must_use]
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            max_results: self.search.max_results,
            semantic_weight: self.search.semantic_weight,
            exact_match_boost: self.search.exact_match_boost,
            collection: self.vector_db.collection.clone(),
        }
    }

    #[must_use]
    pub fn ollama_config(&self) -> OllamaConfig {
        let e = &self.embeddings;
        OllamaConfig {
            base_url: e.base_url.clone(),
            model: e.model.clone(),
            full_dimension: e.full_dimension,
            dimensions: e.dimensions,
            use_mrl: e.use_mrl,
            normalize: e.normalize,
            max_input_chars: e.max_input_chars,
            timeout: Duration::from_secs(e.timeout_secs),
        }
    }
}

/// Expand a leading `~` against `HOME`. Other paths are returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };
    match (rest, std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
