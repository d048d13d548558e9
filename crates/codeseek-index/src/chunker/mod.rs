//! File chunking: syntax-tree first, token windows as the fallback.

mod ast;
mod token;

use std::path::Path;

pub use ast::{AstChunker, AstLimits};
pub use token::{TokenChunker, TokenLimits, is_boundary};

use crate::chunk::{CodeChunk, MAX_CHUNK_CONTENT_BYTES};
use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};

const SMALL_OVERLAP_RATIO: f64 = 0.067;
const MEDIUM_OVERLAP_RATIO: f64 = 0.10;
const LARGE_OVERLAP_RATIO: f64 = 0.14;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Byte ceiling for a single chunk; larger AST nodes are split.
    pub max_chunk_size_bytes: usize,
    /// Split oversized classes into a summary plus method chunks.
    pub enable_hierarchical: bool,
    /// Files with fewer lines use the small tier.
    pub small_file_threshold: usize,
    /// Files with fewer lines (and not small) use the medium tier.
    pub medium_file_threshold: usize,
    pub small_file_max_tokens: usize,
    pub medium_file_max_tokens: usize,
    pub large_file_max_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: MAX_CHUNK_CONTENT_BYTES,
            enable_hierarchical: true,
            small_file_threshold: 1000,
            medium_file_threshold: 5000,
            small_file_max_tokens: 300,
            medium_file_max_tokens: 200,
            large_file_max_tokens: 150,
        }
    }
}

impl ChunkerConfig {
    /// Token budget and overlap for a file of `line_count` lines. Larger
    /// files get smaller budgets with a larger overlap share.
    #[must_use]
    pub fn token_limits(&self, line_count: usize) -> TokenLimits {
        let (max_tokens, ratio) = if line_count < self.small_file_threshold {
            (self.small_file_max_tokens, SMALL_OVERLAP_RATIO)
        } else if line_count < self.medium_file_threshold {
            (self.medium_file_max_tokens, MEDIUM_OVERLAP_RATIO)
        } else {
            (self.large_file_max_tokens, LARGE_OVERLAP_RATIO)
        };
        let max_tokens = max_tokens.max(1);
        TokenLimits {
            max_tokens,
            overlap_tokens: overlap_for(max_tokens, ratio).min(max_tokens - 1),
        }
    }

    fn ast_limits(&self) -> AstLimits {
        AstLimits {
            max_chunk_bytes: self.max_chunk_size_bytes.min(MAX_CHUNK_CONTENT_BYTES),
            hierarchical: self.enable_hierarchical,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn overlap_for(max_tokens: usize, ratio: f64) -> usize {
    (max_tokens as f64 * ratio).round() as usize
}

/// Chunking facade used by the indexer. Never emits whole-file chunks.
#[derive(Debug)]
pub struct Chunker {
    config: ChunkerConfig,
    ast: AstChunker,
    tokens: TokenChunker,
}

impl Chunker {
    /// # Errors
    ///
    /// Returns an error if the tokenizer cannot be loaded or the small-tier
    /// limits are inconsistent.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        let defaults = config.token_limits(0);
        let tokens = TokenChunker::new(defaults, config.ast_limits().max_chunk_bytes)?;
        Ok(Self {
            config,
            ast: AstChunker::new(),
            tokens,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Read and chunk one file. `repo_root` is recorded on every chunk.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnsupportedFile`] for unknown extensions and
    /// [`IndexError::Io`] when the file cannot be read.
    pub fn chunk_file(&self, repo_root: &Path, file_path: &Path) -> Result<Vec<CodeChunk>> {
        if detect_language(file_path).is_none() {
            return Err(IndexError::UnsupportedFile(file_path.display().to_string()));
        }
        let bytes = std::fs::read(file_path)?;
        self.chunk_bytes(repo_root, file_path, &bytes)
    }

    /// Chunk `bytes` already read from `file_path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnsupportedFile`] for unknown extensions.
    pub fn chunk_bytes(
        &self,
        repo_root: &Path,
        file_path: &Path,
        bytes: &[u8],
    ) -> Result<Vec<CodeChunk>> {
        let lang = detect_language(file_path)
            .ok_or_else(|| IndexError::UnsupportedFile(file_path.display().to_string()))?;
        let content = String::from_utf8_lossy(bytes);

        let jsx = file_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tsx"));
        let path = file_path.to_string_lossy();
        let repo = repo_root.to_string_lossy();

        let mut chunks = self.chunk_source(&content, &path, lang, jsx);
        for chunk in &mut chunks {
            chunk.repo_path = repo.to_string();
        }
        Ok(chunks)
    }

    /// Chunk in-memory source. Blank input yields no chunks.
    #[must_use]
    pub fn chunk_source(&self, content: &str, file_path: &str, lang: Lang, jsx: bool) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let limits = self.config.token_limits(content.lines().count());

        if lang.grammar(jsx).is_some() {
            match self
                .ast
                .chunk(content, file_path, lang, jsx, self.config.ast_limits())
            {
                Ok(chunks) if !chunks.is_empty() => return chunks,
                Ok(_) => {
                    tracing::debug!(file = file_path, "no syntax nodes, using token chunker");
                }
                Err(e) => {
                    tracing::warn!(file = file_path, error = %e, "AST chunking failed, using token chunker");
                }
            }
        }

        self.tokens
            .chunk_with_limits(content, file_path, lang.id(), limits)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::chunk::ChunkKind;

    fn chunker() -> Chunker {
        Chunker::new(ChunkerConfig::default()).unwrap()
    }

    #[test]
    fn tiers_shrink_budget_and_grow_overlap_share() {
        let config = ChunkerConfig::default();
        assert_eq!(
            config.token_limits(10),
            TokenLimits {
                max_tokens: 300,
                overlap_tokens: 20
            }
        );
        assert_eq!(
            config.token_limits(1000),
            TokenLimits {
                max_tokens: 200,
                overlap_tokens: 20
            }
        );
        assert_eq!(
            config.token_limits(5000),
            TokenLimits {
                max_tokens: 150,
                overlap_tokens: 21
            }
        );
    }

    #[test]
    fn degenerate_budget_keeps_overlap_below_max() {
        let config = ChunkerConfig {
            small_file_max_tokens: 1,
            ..ChunkerConfig::default()
        };
        let limits = config.token_limits(1);
        assert_eq!(limits.max_tokens, 1);
        assert_eq!(limits.overlap_tokens, 0);
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();
        let err = chunker().chunk_file(dir.path(), &path).unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedFile(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = chunker()
            .chunk_file(dir.path(), &dir.path().join("gone.go"))
            .unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }

    #[test]
    fn whitespace_file_has_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.go");
        fs::write(&path, "  \n\t\n").unwrap();
        assert!(chunker().chunk_file(dir.path(), &path).unwrap().is_empty());
    }

    #[test]
    fn go_uses_token_chunks_with_repo_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.go");
        fs::write(&path, "package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n").unwrap();

        let chunks = chunker().chunk_file(dir.path(), &path).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkKind::Token);
        assert_eq!(chunks[0].language, "go");
        assert_eq!(chunks[0].repo_path, dir.path().to_string_lossy());
        assert_eq!(chunks[0].file_path, path.to_string_lossy());
    }

    #[test]
    fn chunk_bytes_ignores_current_disk_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.go");
        fs::write(&path, "package main\n\nfunc edited() {}\n").unwrap();

        let chunks = chunker()
            .chunk_bytes(dir.path(), &path, b"package main\n\nfunc original() {}\n")
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("original"));
        assert!(!chunks[0].content.contains("edited"));
    }

    #[cfg(feature = "lang-java")]
    #[test]
    fn java_uses_syntax_chunks() {
        let source = "public class Greeter {\n    public String greet(String name) {\n        return \"hi \" + name;\n    }\n}\n";
        let chunks = chunker().chunk_source(source, "Greeter.java", Lang::Java, false);
        assert!(chunks.iter().any(|c| c.chunk_type == ChunkKind::Class));
        assert!(chunks.iter().any(|c| c.function_name.as_deref() == Some("greet")));
        assert!(chunks.iter().all(|c| c.chunk_type != ChunkKind::Token));
    }

    #[cfg(feature = "lang-java")]
    #[test]
    fn java_without_declarations_falls_back_to_tokens() {
        let source = "// just a license header\n// and nothing else\n";
        let chunks = chunker().chunk_source(source, "Empty.java", Lang::Java, false);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkKind::Token);
    }

    #[cfg(feature = "lang-js")]
    #[test]
    fn tsx_files_parse_with_jsx_grammar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("View.tsx");
        fs::write(
            &path,
            "export function View() {\n    return <section className=\"view\">content</section>;\n}\n",
        )
        .unwrap();
        let chunks = chunker().chunk_file(dir.path(), &path).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkKind::Function);
        assert_eq!(chunks[0].function_name.as_deref(), Some("View"));
    }
}
