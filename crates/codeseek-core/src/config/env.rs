use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CODESEEK_OLLAMA_URL") {
            self.embeddings.base_url = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_EMBEDDING_MODEL") {
            self.embeddings.model = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_QDRANT_URL") {
            self.vector_db.url = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_COLLECTION") {
            self.vector_db.collection = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_CACHE_DIR") {
            self.cache.dir = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_PARALLEL_WORKERS") {
            match v.parse::<usize>() {
                Ok(n) => self.indexing.parallel_workers = n,
                Err(_) => tracing::warn!("ignoring invalid CODESEEK_PARALLEL_WORKERS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODESEEK_MAX_RESULTS") {
            match v.parse::<usize>() {
                Ok(n) => self.search.max_results = n,
                Err(_) => tracing::warn!("ignoring invalid CODESEEK_MAX_RESULTS value: {v}"),
            }
        }
    }
}
