//! Repository indexing and hybrid code search.
//!
//! Source files are discovered by the [`Scanner`], split into
//! [`CodeChunk`]s by the [`Chunker`] (tree-sitter first, token windows as a
//! fallback), embedded, and stored in a vector collection by the [`Indexer`].
//! A per-repository [`FileHashCache`] keeps reindexing incremental.
//! [`HybridSearcher`] re-ranks vector hits with lexical and path signals.

pub mod cache;
pub mod chunk;
pub mod chunker;
pub mod error;
pub mod indexer;
pub mod job;
pub mod languages;
pub mod patterns;
pub mod scanner;
pub mod searcher;

pub use cache::{CacheStats, FileHash, FileHashCache};
pub use chunk::{ChunkKind, CodeChunk, MAX_CHUNK_CONTENT_BYTES};
pub use chunker::{Chunker, ChunkerConfig, TokenLimits};
pub use error::{IndexError, Result};
pub use indexer::{Indexer, IndexerConfig, RepoIndex, RepoStatus};
pub use job::{IndexJob, JobStatus};
pub use languages::{Lang, detect_language};
pub use patterns::IgnoreMatcher;
pub use scanner::{ScanResult, Scanner, ScannerConfig};
pub use searcher::{HybridSearcher, SearchConfig, SearchResult, format_results};
