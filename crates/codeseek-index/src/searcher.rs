//! Hybrid search: vector similarity re-ranked with lexical and path signals.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use codeseek_embed::EmbeddingProvider;
use codeseek_store::{VectorFilter, VectorStore};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::chunk::CodeChunk;
use crate::error::{IndexError, Result};

/// Candidates fetched per requested result, to leave room for re-ranking.
const OVERFETCH_FACTOR: usize = 3;
const PARTIAL_MATCH_WEIGHT: f64 = 0.3;
const PREVIEW_LINES: usize = 3;
const PREVIEW_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_results: usize,
    /// Multiplier on the raw similarity score.
    pub semantic_weight: f64,
    /// Added when the whole query occurs in the chunk.
    pub exact_match_boost: f64,
    pub collection: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            semantic_weight: 0.7,
            exact_match_boost: 1.5,
            collection: "code_chunks".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: CodeChunk,
    pub semantic_score: f64,
    pub exact_match: bool,
    /// Byte offsets of non-overlapping query occurrences in the lowercased content.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub match_positions: Vec<usize>,
    pub hybrid_score: f64,
}

/// Path-based relevance class, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Test,
    MainSource,
    Vendor,
    Neutral,
}

const TEST_DIRS: [&str; 4] = ["/test/", "/tests/", "/__tests__/", "/spec/"];
const TEST_SUFFIXES: [&str; 13] = [
    "_test.go",
    "_test.js",
    "_test.ts",
    ".test.js",
    ".test.ts",
    ".test.jsx",
    ".test.tsx",
    ".spec.js",
    ".spec.ts",
    ".spec.jsx",
    ".spec.tsx",
    "test.java",
    "tests.java",
];
const MAIN_SOURCE_DIRS: [&str; 5] = ["/src/main/", "/src/core/", "/lib/", "/pkg/", "/internal/"];
const VENDOR_MARKERS: [&str; 7] = [
    "/vendor/",
    "/node_modules/",
    "/target/",
    "/build/",
    "/dist/",
    ".generated.",
    "_generated.",
];

impl PathClass {
    #[must_use]
    pub fn of(path: &str) -> Self {
        let path = path.to_lowercase();
        if TEST_DIRS.iter().any(|d| path.contains(d))
            || TEST_SUFFIXES.iter().any(|s| path.ends_with(s))
        {
            Self::Test
        } else if MAIN_SOURCE_DIRS.iter().any(|d| path.contains(d))
            || (path.contains("/cmd/") && !path.contains("/test"))
        {
            Self::MainSource
        } else if VENDOR_MARKERS.iter().any(|m| path.contains(m)) {
            Self::Vendor
        } else {
            Self::Neutral
        }
    }

    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Test => 0.05,
            Self::MainSource => 1.3,
            Self::Vendor => 0.2,
            Self::Neutral => 1.0,
        }
    }
}

/// Lexical and path adjustments for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub hybrid: f64,
    pub exact_match: bool,
    pub match_positions: Vec<usize>,
}

/// Score a candidate chunk against `query`. The exact-match and partial
/// boosts are additive; the path multiplier applies to the sum.
#[must_use]
pub fn score_candidate(
    query: &str,
    content: &str,
    file_path: &str,
    semantic_score: f64,
    config: &SearchConfig,
) -> CandidateScore {
    let mut hybrid = semantic_score * config.semantic_weight;
    let blank = query.trim().is_empty();
    let query = query.to_lowercase();
    let content = content.to_lowercase();

    let mut exact_match = false;
    let mut match_positions = Vec::new();
    if !blank {
        if content.contains(&query) {
            exact_match = true;
            match_positions = content.match_indices(&query).map(|(i, _)| i).collect();
            hybrid += config.exact_match_boost;
        } else {
            let words: Vec<&str> = query.split_whitespace().collect();
            let matched = words
                .iter()
                .filter(|w| w.len() > 2 && content.contains(*w))
                .count();
            if matched > 0 {
                hybrid += ratio(matched, words.len()) * PARTIAL_MATCH_WEIGHT;
            }
        }
    }

    hybrid *= PathClass::of(file_path).multiplier();
    CandidateScore {
        hybrid,
        exact_match,
        match_positions,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(a: usize, b: usize) -> f64 {
    a as f64 / b as f64
}

/// Sort by hybrid score descending, then chunk id ascending, and keep `limit`.
pub fn rank(results: &mut Vec<SearchResult>, limit: usize) {
    results.sort_by(|a, b| {
        b.hybrid_score
            .total_cmp(&a.hybrid_score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    results.truncate(limit);
}

/// Hybrid searcher over one vector collection.
pub struct HybridSearcher<P> {
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    config: SearchConfig,
}

impl<P: EmbeddingProvider> HybridSearcher<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<dyn VectorStore>, config: SearchConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search `repo` with the configured result count.
    ///
    /// # Errors
    ///
    /// See [`HybridSearcher::search_with_limit`].
    pub async fn search(
        &self,
        query: &str,
        repo: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        self.search_with_limit(query, repo, self.config.max_results, cancel)
            .await
    }

    /// Search `repo` and return at most `limit` results.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::QueryEmbedding`] or [`IndexError::VectorSearch`]
    /// naming the failed stage, or [`IndexError::Cancelled`].
    pub async fn search_with_limit(
        &self,
        query: &str,
        repo: &Path,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let repo = repo.to_string_lossy();
        tracing::debug!(query, repo = %repo, limit, "search");

        let vector = tokio::select! {
            () = cancel.cancelled() => return Err(IndexError::Cancelled),
            v = self.provider.embed(query) => v.map_err(IndexError::QueryEmbedding)?,
        };

        let fetch = u64::try_from(limit.saturating_mul(OVERFETCH_FACTOR)).unwrap_or(u64::MAX);
        let points = tokio::select! {
            () = cancel.cancelled() => return Err(IndexError::Cancelled),
            p = self.store.search(
                &self.config.collection,
                vector,
                fetch,
                Some(VectorFilter::text_eq("repo_path", &*repo)),
            ) => p.map_err(IndexError::VectorSearch)?,
        };

        let mut results: Vec<SearchResult> = points
            .into_iter()
            .filter_map(|point| {
                let Some(chunk) = CodeChunk::from_payload(&point.id, &point.payload) else {
                    tracing::warn!(point = %point.id, "skipping point with malformed payload");
                    return None;
                };
                let semantic_score = f64::from(point.score);
                let score = score_candidate(
                    query,
                    &chunk.content,
                    &chunk.file_path,
                    semantic_score,
                    &self.config,
                );
                Some(SearchResult {
                    chunk,
                    semantic_score,
                    exact_match: score.exact_match,
                    match_positions: score.match_positions,
                    hybrid_score: score.hybrid,
                })
            })
            .collect();

        rank(&mut results, limit);
        tracing::info!(
            query,
            results = results.len(),
            top = results.first().map_or(0.0, |r| r.hybrid_score),
            "search complete"
        );
        Ok(results)
    }
}

/// Human-readable listing of results.
#[must_use]
pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_owned();
    }

    let mut out = format!("Found {} results:\n\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let chunk = &result.chunk;
        let mut location = format!("{}:{}-{}", chunk.file_path, chunk.start_line, chunk.end_line);
        if let Some(name) = chunk.function_name.as_ref().or(chunk.class_name.as_ref()) {
            let _ = write!(location, " (in {name})");
        }
        let exact = if result.exact_match { " [EXACT MATCH]" } else { "" };

        let _ = writeln!(out, "{}. {location}", i + 1);
        let _ = writeln!(out, "   score: {:.3}{exact}", result.hybrid_score);
        let _ = writeln!(out, "   Language: {}, Type: {}", chunk.language, chunk.chunk_type);
        out.push_str("   Preview:\n");

        let lines: Vec<&str> = chunk.content.split('\n').collect();
        for line in lines.iter().take(PREVIEW_LINES) {
            let line = line.trim();
            match line.char_indices().nth(PREVIEW_WIDTH) {
                Some((idx, _)) => {
                    let _ = writeln!(out, "   │ {}...", &line[..idx]);
                }
                None => {
                    let _ = writeln!(out, "   │ {line}");
                }
            }
        }
        if lines.len() > PREVIEW_LINES {
            let _ = writeln!(out, "   │ ... ({} more lines)", lines.len() - PREVIEW_LINES);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use codeseek_embed::mock::MockEmbedder;
    use codeseek_store::{CollectionSpec, DistanceMetric, InMemoryVectorStore, VectorPoint};
    use proptest::prelude::*;

    use super::*;
    use crate::chunk::ChunkKind;

    fn config() -> SearchConfig {
        SearchConfig::default()
    }

    fn result(id: &str, path: &str, content: &str, semantic: f64, query: &str) -> SearchResult {
        let mut chunk = CodeChunk::new(path, ChunkKind::Function, content, "java", 1, 3);
        chunk.id = id.to_owned();
        let score = score_candidate(query, content, path, semantic, &config());
        SearchResult {
            chunk,
            semantic_score: semantic,
            exact_match: score.exact_match,
            match_positions: score.match_positions,
            hybrid_score: score.hybrid,
        }
    }

    #[test]
    fn exact_match_outranks_higher_similarity() {
        let query = "validateToken";
        let foo = result("a", "src/Foo", "int add(int a, int b)", 0.8, query);
        let bar = result("b", "src/Bar", "boolean validateToken(String t)", 0.6, query);
        assert!((foo.hybrid_score - 0.56).abs() < 1e-9);
        assert!((bar.hybrid_score - 1.92).abs() < 1e-9);
        assert!(bar.exact_match);

        let mut results = vec![foo, bar];
        rank(&mut results, 5);
        assert_eq!(results[0].chunk.file_path, "src/Bar");
        assert_eq!(results[1].chunk.file_path, "src/Foo");
    }

    #[test]
    fn test_paths_are_heavily_penalized() {
        let cfg = SearchConfig {
            semantic_weight: 1.0,
            ..config()
        };
        let score = score_candidate("zzz", "nothing", "/repo/tests/Auth_test.ext", 1.0, &cfg);
        assert!((score.hybrid - 0.05).abs() < 1e-9);
    }

    #[test]
    fn path_classes_follow_check_order() {
        assert_eq!(PathClass::of("/r/src/main/java/App.java"), PathClass::MainSource);
        assert_eq!(PathClass::of("/r/src/main/java/AppTest.java"), PathClass::Test);
        assert_eq!(PathClass::of("/r/pkg/server/run_test.go"), PathClass::Test);
        assert_eq!(PathClass::of("/r/web/__tests__/app.js"), PathClass::Test);
        assert_eq!(PathClass::of("/r/ui/Button.spec.tsx"), PathClass::Test);
        assert_eq!(PathClass::of("/r/cmd/tool/main.go"), PathClass::MainSource);
        assert_eq!(PathClass::of("/r/vendor/x/y.go"), PathClass::Vendor);
        assert_eq!(PathClass::of("/r/lib/vendor/y.go"), PathClass::MainSource);
        assert_eq!(PathClass::of("/r/api/client.generated.ts"), PathClass::Vendor);
        assert_eq!(PathClass::of("/r/app/handler.go"), PathClass::Neutral);
        assert_eq!(PathClass::of("/R/SRC/MAIN/X.JAVA"), PathClass::MainSource);
    }

    #[test]
    fn match_positions_do_not_overlap() {
        let score = score_candidate("aa", "AAAA aa", "x", 0.0, &config());
        assert!(score.exact_match);
        assert_eq!(score.match_positions, vec![0, 2, 5]);
    }

    #[test]
    fn partial_matches_count_long_words_only() {
        // "get" and "user" match, "by" is too short, "email" is absent
        let score = score_candidate("get user by email", "fn get_user(id)", "x", 0.0, &config());
        assert!(!score.exact_match);
        assert!((score.hybrid - 0.15).abs() < 1e-9);
    }

    #[test]
    fn surrounding_whitespace_is_part_of_the_query() {
        let score = score_candidate("token ", "let tokenizer = 1;", "x", 0.5, &config());
        assert!(!score.exact_match);
        assert!(score.match_positions.is_empty());
        // "token" still counts as one matched word of one
        assert!((score.hybrid - (0.35 + 0.3)).abs() < 1e-9);

        let score = score_candidate(" token", "let tokenizer = 1;", "x", 0.5, &config());
        assert!(!score.exact_match);

        let score = score_candidate("token ", "a token here", "x", 0.5, &config());
        assert!(score.exact_match);
        assert_eq!(score.match_positions, vec![2]);
    }

    #[test]
    fn scattered_words_get_partial_boost_only() {
        let content = "fn validate(input: &str) {}\nfn token() {}";
        let score = score_candidate("validate token", content, "x", 0.5, &config());
        assert!(!score.exact_match);
        assert!(score.match_positions.is_empty());
        assert!((score.hybrid - (0.35 + 0.3)).abs() < 1e-9);

        let adjacent = score_candidate("validate token", "validate token", "x", 0.5, &config());
        assert!(adjacent.exact_match);
        assert!(adjacent.hybrid > score.hybrid);
    }

    #[test]
    fn whole_content_query_is_exact() {
        let score = score_candidate("return x;", "return x;", "x", 0.0, &config());
        assert!(score.exact_match);
        assert_eq!(score.match_positions, vec![0]);
    }

    #[test]
    fn empty_query_matches_nothing() {
        for q in ["", "   "] {
            let score = score_candidate(q, "anything at all", "x", 0.5, &config());
            assert!(!score.exact_match);
            assert!(score.match_positions.is_empty());
            assert!((score.hybrid - 0.35).abs() < 1e-9);
        }
    }

    #[test]
    fn ties_break_on_chunk_id() {
        let mut results = vec![
            result("c", "x", "alpha", 0.5, "zzz"),
            result("a", "x", "alpha", 0.5, "zzz"),
            result("b", "x", "alpha", 0.5, "zzz"),
        ];
        rank(&mut results, 2);
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn format_lists_location_score_and_preview() {
        let mut r = result(
            "a",
            "/r/src/Auth.java",
            "boolean validateToken(String t) {\n  return check(t);\n}\n// end\n",
            0.6,
            "validateToken",
        );
        r.chunk.function_name = Some("validateToken".into());
        let text = format_results(&[r]);
        assert!(text.starts_with("Found 1 results:"));
        assert!(text.contains("1. /r/src/Auth.java:1-3 (in validateToken)"));
        assert!(text.contains("[EXACT MATCH]"));
        assert!(text.contains("Language: java, Type: function"));
        assert!(text.contains("│ return check(t);"));
        assert!(text.contains("... (2 more lines)"));
        assert_eq!(format_results(&[]), "No results found.");
    }

    #[test]
    fn long_preview_lines_are_cut() {
        let long = "x".repeat(120);
        let r = result("a", "f", &long, 0.1, "q");
        let text = format_results(&[r]);
        assert!(text.contains(&format!("│ {}...", "x".repeat(80))));
    }

    async fn seeded_store(embedder: &MockEmbedder) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .ensure_collection(CollectionSpec {
                name: "code_chunks".into(),
                vector_size: 32,
                distance: DistanceMetric::Cosine,
                keyword_fields: vec!["repo_path".into(), "file_path".into()],
            })
            .await
            .unwrap();

        let docs = [
            ("/repo", "/repo/src/auth.go", "func ValidateToken(token string) bool"),
            ("/repo", "/repo/src/math.go", "func Add(a, b int) int"),
            ("/repo", "/repo/tests/auth_test.go", "func TestValidateToken(t *testing.T)"),
            ("/other", "/other/auth.go", "func ValidateToken(token string) bool"),
        ];
        let mut points = Vec::new();
        for (repo, path, content) in docs {
            let mut chunk = CodeChunk::new(path, ChunkKind::Token, content, "go", 1, 1);
            chunk.repo_path = repo.into();
            points.push(VectorPoint {
                id: chunk.id.clone(),
                vector: embedder.embed(content).await.unwrap(),
                payload: chunk.to_payload(),
            });
        }
        store.upsert("code_chunks", points).await.unwrap();
        store
    }

    #[tokio::test]
    async fn search_is_scoped_to_repo_and_reranked() {
        let embedder = MockEmbedder::new(32);
        let store = seeded_store(&embedder).await;
        let searcher = HybridSearcher::new(Arc::new(embedder), store, config());

        let results = searcher
            .search("ValidateToken", Path::new("/repo"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.chunk.repo_path == "/repo"));
        assert_eq!(results[0].chunk.file_path, "/repo/src/auth.go");
        assert!(results[0].exact_match);
        let test_hit = results
            .iter()
            .find(|r| r.chunk.file_path == "/repo/tests/auth_test.go")
            .unwrap();
        assert!(test_hit.exact_match);
        assert!(test_hit.hybrid_score < 0.2);
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let embedder = MockEmbedder::new(32);
        let store = seeded_store(&embedder).await;
        let searcher = HybridSearcher::new(Arc::new(embedder), store, config());
        let results = searcher
            .search_with_limit("token", Path::new("/repo"), 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_names_the_stage() {
        let store = Arc::new(InMemoryVectorStore::new());
        let searcher = HybridSearcher::new(Arc::new(MockEmbedder::failing(8)), store, config());
        let err = searcher
            .search("q", Path::new("/repo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::QueryEmbedding(_)));
        assert!(err.to_string().starts_with("failed to generate query embedding"));
    }

    #[tokio::test]
    async fn backend_failure_names_the_stage() {
        let store = Arc::new(InMemoryVectorStore::new());
        let searcher = HybridSearcher::new(Arc::new(MockEmbedder::new(8)), store, config());
        let err = searcher
            .search("q", Path::new("/repo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::VectorSearch(_)));
        assert!(err.to_string().starts_with("failed to search vector database"));
    }

    #[tokio::test]
    async fn cancelled_search_returns_cancelled() {
        let store = Arc::new(InMemoryVectorStore::new());
        let searcher = HybridSearcher::new(
            Arc::new(MockEmbedder::new(8).with_delay(1_000)),
            store,
            config(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = searcher
            .search("q", Path::new("/repo"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Cancelled));
    }

    proptest! {
        #[test]
        fn exact_match_always_scores_higher(
            semantic in 0.0f64..1.0,
            query in "[a-y]{3,12}",
            path in prop::sample::select(vec!["src/a.go", "/r/tests/a_test.go", "/r/lib/a.go", "/r/vendor/a.go"]),
        ) {
            let cfg = SearchConfig::default();
            let hit = score_candidate(&query, &format!("call {query}();"), path, semantic, &cfg);
            let miss = score_candidate(&query, "0 1 2 3", path, semantic, &cfg);
            prop_assert!(hit.exact_match);
            prop_assert!(hit.hybrid > miss.hybrid);
        }
    }
}
