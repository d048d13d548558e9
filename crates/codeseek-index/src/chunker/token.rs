//! Token-budgeted line chunking with declaration-aware cut points.

use std::sync::{Arc, LazyLock, RwLock};

use regex::RegexSet;
use tiktoken_rs::CoreBPE;

use crate::chunk::{ChunkKind, CodeChunk};
use crate::error::{IndexError, Result};

/// Lines scanned past the budget for a declaration start.
const BOUNDARY_LOOKAHEAD: usize = 10;

static JAVA_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(public|private|protected)?\s*(static\s+)?class\s+\w+",
        r"^\s*(public|private|protected)?\s*(static\s+)?interface\s+\w+",
        r"^\s*(public|private|protected)?\s*(static\s+)?enum\s+\w+",
        r"^\s*(public|private|protected)?\s*(static\s+)?[\w<>\[\]]+\s+\w+\s*\([^)]*\)\s*\{?",
        r"^\s*@\w+",
    ])
    .unwrap()
});

static JAVASCRIPT_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*export\s+(default\s+)?function\s+\w+",
        r"^\s*export\s+(default\s+)?class\s+\w+",
        r"^\s*export\s+(const|let|var)\s+\w+",
        r"^\s*(async\s+)?function\s+\w+",
        r"^\s*class\s+\w+",
        r"^\s*(const|let|var)\s+\w+\s*=\s*(async\s+)?\([^)]*\)\s*=>",
    ])
    .unwrap()
});

static TYPESCRIPT_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*export\s+(default\s+)?function\s+\w+",
        r"^\s*export\s+(default\s+)?class\s+\w+",
        r"^\s*export\s+(interface|type)\s+\w+",
        r"^\s*export\s+(const|let|var)\s+\w+",
        r"^\s*(async\s+)?function\s+\w+",
        r"^\s*class\s+\w+",
        r"^\s*interface\s+\w+",
        r"^\s*type\s+\w+\s*=",
        r"^\s*(const|let|var)\s+\w+\s*=\s*(async\s+)?\([^)]*\)\s*=>",
    ])
    .unwrap()
});

static GO_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*func\s+\w+",
        r"^\s*func\s+\([^)]+\)\s+\w+",
        r"^\s*type\s+\w+\s+(struct|interface)",
        r"^\s*(const|var)\s+\w+",
    ])
    .unwrap()
});

static PYTHON_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*def\s+\w+",
        r"^\s*class\s+\w+",
        r"^\s*async\s+def\s+\w+",
        r"^\s*@\w+",
    ])
    .unwrap()
});

static RUST_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(pub\s+)?fn\s+\w+",
        r"^\s*(pub\s+)?struct\s+\w+",
        r"^\s*(pub\s+)?enum\s+\w+",
        r"^\s*(pub\s+)?trait\s+\w+",
        r"^\s*(pub\s+)?impl\s+",
    ])
    .unwrap()
});

static C_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*\w+\s+\w+\s*\([^)]*\)\s*\{?",
        r"^\s*struct\s+\w+",
        r"^\s*typedef\s+",
    ])
    .unwrap()
});

static CPP_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*\w+\s+\w+::\w+\s*\([^)]*\)",
        r"^\s*class\s+\w+",
        r"^\s*struct\s+\w+",
        r"^\s*namespace\s+\w+",
        r"^\s*template\s*<",
    ])
    .unwrap()
});

static DEFAULT_BOUNDARIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*function\s+\w+",
        r"^\s*class\s+\w+",
        r"^\s*def\s+\w+",
    ])
    .unwrap()
});

fn boundaries(language: &str) -> &'static RegexSet {
    match language {
        "java" => &JAVA_BOUNDARIES,
        "javascript" => &JAVASCRIPT_BOUNDARIES,
        "typescript" => &TYPESCRIPT_BOUNDARIES,
        "go" => &GO_BOUNDARIES,
        "python" => &PYTHON_BOUNDARIES,
        "rust" => &RUST_BOUNDARIES,
        "c" => &C_BOUNDARIES,
        "cpp" => &CPP_BOUNDARIES,
        _ => &DEFAULT_BOUNDARIES,
    }
}

/// Whether `line` starts a declaration in `language`. Unknown languages use a
/// generic function/class/def set.
#[must_use]
pub fn is_boundary(line: &str, language: &str) -> bool {
    boundaries(language).is_match(line.trim())
}

/// Per-chunk token budget and the overlap carried into the next chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl TokenLimits {
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidLimits`] unless `0 <= overlap < max`.
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(IndexError::InvalidLimits(
                "max tokens must be positive".into(),
            ));
        }
        if overlap_tokens >= max_tokens {
            return Err(IndexError::InvalidLimits(format!(
                "overlap ({overlap_tokens}) must be less than max tokens ({max_tokens})"
            )));
        }
        Ok(Self {
            max_tokens,
            overlap_tokens,
        })
    }
}

/// Line chunker that counts `cl100k_base` tokens.
pub struct TokenChunker {
    bpe: Arc<CoreBPE>,
    limits: RwLock<TokenLimits>,
    max_chunk_bytes: usize,
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("max_chunk_bytes", &self.max_chunk_bytes)
            .finish_non_exhaustive()
    }
}

impl TokenChunker {
    /// # Errors
    ///
    /// Returns [`IndexError::Tokenizer`] if the BPE ranks fail to load, or
    /// [`IndexError::InvalidLimits`] for inconsistent limits.
    pub fn new(limits: TokenLimits, max_chunk_bytes: usize) -> Result<Self> {
        let limits = TokenLimits::new(limits.max_tokens, limits.overlap_tokens)?;
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| IndexError::Tokenizer(e.to_string()))?;
        Ok(Self {
            bpe: Arc::new(bpe),
            limits: RwLock::new(limits),
            max_chunk_bytes,
        })
    }

    /// Replace the default limits used by [`TokenChunker::chunk`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidLimits`] and keeps the old limits when
    /// the new ones are inconsistent.
    pub fn set_limits(&self, max_tokens: usize, overlap_tokens: usize) -> Result<()> {
        let limits = TokenLimits::new(max_tokens, overlap_tokens)?;
        match self.limits.write() {
            Ok(mut guard) => *guard = limits,
            Err(poisoned) => *poisoned.into_inner() = limits,
        }
        Ok(())
    }

    #[must_use]
    pub fn limits(&self) -> TokenLimits {
        match self.limits.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Chunk with the current default limits.
    #[must_use]
    pub fn chunk(&self, content: &str, file_path: &str, language: &str) -> Vec<CodeChunk> {
        self.chunk_with_limits(content, file_path, language, self.limits())
    }

    /// Chunk with explicit limits, independent of the shared defaults.
    #[must_use]
    pub fn chunk_with_limits(
        &self,
        content: &str,
        file_path: &str,
        language: &str,
        limits: TokenLimits,
    ) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.split('\n').collect();
        let line_tokens: Vec<usize> = lines.iter().map(|l| self.count_tokens(l)).collect();

        let mut chunks = Vec::new();
        // current chunk is lines[start..start + len]
        let mut start = 0;
        let mut len = 0;
        let mut tokens = 0;
        // leading lines of the current chunk carried over as overlap
        let mut seeded = 0;

        let mut i = 0;
        while i < lines.len() {
            if tokens + line_tokens[i] > limits.max_tokens && len > seeded {
                let boundary = (i..lines.len().min(i + BOUNDARY_LOOKAHEAD))
                    .find(|&j| is_boundary(lines[j], language));
                if let Some(j) = boundary {
                    len += j + 1 - i;
                    i = j + 1;
                }

                self.push_chunk(&mut chunks, &lines, start, len, file_path, language);

                let keep = overlap_len(&line_tokens[start..start + len], limits.overlap_tokens);
                start = start + len - keep;
                len = keep;
                seeded = keep;
                tokens = line_tokens[start..start + len].iter().sum();

                if boundary.is_some() {
                    continue;
                }
            }

            len += 1;
            tokens += line_tokens[i];
            i += 1;
        }

        if len > seeded || chunks.is_empty() {
            self.push_chunk(&mut chunks, &lines, start, len, file_path, language);
        }
        chunks
    }

    fn push_chunk(
        &self,
        out: &mut Vec<CodeChunk>,
        lines: &[&str],
        start: usize,
        len: usize,
        file_path: &str,
        language: &str,
    ) {
        if len == 0 {
            return;
        }
        let content = lines[start..start + len].join("\n");
        if content.trim().is_empty() {
            return;
        }
        let capped = crate::chunk::truncate_bytes(&content, self.max_chunk_bytes);
        out.push(CodeChunk::new(
            file_path,
            ChunkKind::Token,
            capped,
            language,
            start + 1,
            start + len,
        ));
    }
}

/// Number of trailing lines whose token sum first reaches `overlap_tokens`.
/// At least one line is kept when any overlap is requested.
fn overlap_len(line_tokens: &[usize], overlap_tokens: usize) -> usize {
    if overlap_tokens == 0 {
        return 0;
    }
    let mut acc = 0;
    let mut keep = 0;
    for &t in line_tokens.iter().rev() {
        if acc >= overlap_tokens {
            break;
        }
        acc += t;
        keep += 1;
    }
    keep
}
