use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            indexing: IndexingConfig::default(),
            search: SearchSettings::default(),
            embeddings: EmbeddingsConfig::default(),
            vector_db: VectorDbConfig::default(),
            cache: CacheConfig::default(),
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size_bytes")]
    pub max_chunk_size_bytes: usize,
    #[serde(default = "default_true")]
    pub enable_hierarchical: bool,
    #[serde(default = "default_small_file_threshold")]
    pub small_file_threshold: usize,
    #[serde(default = "default_medium_file_threshold")]
    pub medium_file_threshold: usize,
    #[serde(default = "default_small_file_max_tokens")]
    pub small_file_max_tokens: usize,
    #[serde(default = "default_medium_file_max_tokens")]
    pub medium_file_max_tokens: usize,
    #[serde(default = "default_large_file_max_tokens")]
    pub large_file_max_tokens: usize,
}

fn default_max_chunk_size_bytes() -> usize {
    4000
}

fn default_small_file_threshold() -> usize {
    1000
}

fn default_medium_file_threshold() -> usize {
    5000
}

fn default_small_file_max_tokens() -> usize {
    300
}

fn default_medium_file_max_tokens() -> usize {
    200
}

fn default_large_file_max_tokens() -> usize {
    150
}

fn default_true() -> bool {
    true
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: default_max_chunk_size_bytes(),
            enable_hierarchical: true,
            small_file_threshold: default_small_file_threshold(),
            medium_file_threshold: default_medium_file_threshold(),
            small_file_max_tokens: default_small_file_max_tokens(),
            medium_file_max_tokens: default_medium_file_max_tokens(),
            large_file_max_tokens: default_large_file_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,
    #[serde(default = "default_true")]
    pub background: bool,
    #[serde(default = "default_true")]
    pub incremental: bool,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

fn default_batch_size() -> usize {
    100
}

fn default_max_file_size_mb() -> u64 {
    1
}

pub(crate) fn default_parallel_workers() -> usize {
    std::thread::available_parallelism().map_or(4, usize::from)
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_file_size_mb: default_max_file_size_mb(),
            parallel_workers: default_parallel_workers(),
            background: true,
            incremental: true,
            respect_gitignore: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSettings {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_exact_match_boost")]
    pub exact_match_boost: f64,
}

fn default_max_results() -> usize {
    5
}

fn default_semantic_weight() -> f64 {
    0.7
}

fn default_exact_match_boost() -> f64 {
    1.5
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            semantic_weight: default_semantic_weight(),
            exact_match_boost: default_exact_match_boost(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_full_dimension")]
    pub full_dimension: usize,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default = "default_true")]
    pub use_mrl: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

fn default_dimensions() -> usize {
    256
}

fn default_full_dimension() -> usize {
    768
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_input_chars() -> usize {
    4000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: default_ollama_url(),
            dimensions: default_dimensions(),
            full_dimension: default_full_dimension(),
            normalize: true,
            use_mrl: true,
            max_concurrent: default_max_concurrent(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorDbConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// One of `cosine`, `dot`, `euclidean`.
    #[serde(default = "default_distance")]
    pub distance: String,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "code_chunks".into()
}

fn default_distance() -> String {
    "cosine".into()
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            distance: default_distance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Leading `~` is expanded against `HOME`.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

fn default_cache_dir() -> String {
    "~/.codeseek/cache".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

pub(crate) fn default_ignore_patterns() -> Vec<String> {
    codeseek_index::patterns::DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(|p| (*p).to_owned())
        .collect()
}
