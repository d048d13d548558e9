//! Indexed code unit and its vector-store payload encoding.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Hard ceiling on the text stored for a single chunk, in bytes.
pub const MAX_CHUNK_CONTENT_BYTES: usize = 4000;

/// Payload fields that get a keyword index in the vector store.
pub const KEYWORD_FIELDS: [&str; 2] = ["repo_path", "file_path"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Function, arrow function, method or type found by the AST walk.
    Function,
    /// Whole class-like declaration, or the summary of a split one.
    Class,
    /// Method emitted by hierarchical splitting of an oversized class.
    Method,
    /// Line window from the token chunker.
    Token,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::Token => "token",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "method" => Some(Self::Method),
            "token" => Some(Self::Token),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous span of source text indexed as a unit.
///
/// `start_line <= end_line` (1-based), `content` is never blank, and
/// `parent_chunk_id` is set exactly for [`ChunkKind::Method`] chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: String,
    pub repo_path: String,
    pub file_path: String,
    pub chunk_type: ChunkKind,
    pub content: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_chunk_id: Option<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl CodeChunk {
    /// New chunk with a fresh id. `content` is capped at
    /// [`MAX_CHUNK_CONTENT_BYTES`].
    #[must_use]
    pub fn new(
        file_path: &str,
        chunk_type: ChunkKind,
        content: &str,
        language: &str,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repo_path: String::new(),
            file_path: file_path.to_owned(),
            chunk_type,
            content: truncate_bytes(content, MAX_CHUNK_CONTENT_BYTES).to_owned(),
            language: language.to_owned(),
            start_line,
            end_line: end_line.max(start_line),
            function_name: None,
            class_name: None,
            parent_chunk_id: None,
            embedding: None,
            indexed_at: None,
        }
    }

    /// Scalar fields as a vector-store payload.
    #[must_use]
    pub fn to_payload(&self) -> HashMap<String, Value> {
        let value = json!({
            "chunk_id": self.id,
            "repo_path": self.repo_path,
            "file_path": self.file_path,
            "chunk_type": self.chunk_type.as_str(),
            "content": self.content,
            "language": self.language,
            "start_line": self.start_line,
            "end_line": self.end_line,
            "function_name": self.function_name,
            "class_name": self.class_name,
            "parent_chunk_id": self.parent_chunk_id,
            "indexed_at": self.indexed_at.map(|t| t.to_rfc3339()),
        });
        match value {
            Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            _ => HashMap::new(),
        }
    }

    /// Rebuild a chunk from a stored payload. Returns `None` when required
    /// fields are missing.
    #[must_use]
    pub fn from_payload(id: &str, payload: &HashMap<String, Value>) -> Option<Self> {
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_owned);
        let line = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(f64_to_u64)))
                .and_then(|n| usize::try_from(n).ok())
        };

        Some(Self {
            id: text("chunk_id").unwrap_or_else(|| id.to_owned()),
            repo_path: text("repo_path").unwrap_or_default(),
            file_path: text("file_path")?,
            chunk_type: ChunkKind::parse(&text("chunk_type")?)?,
            content: text("content")?,
            language: text("language").unwrap_or_default(),
            start_line: line("start_line")?,
            end_line: line("end_line")?,
            function_name: text("function_name"),
            class_name: text("class_name"),
            parent_chunk_id: text("parent_chunk_id"),
            embedding: None,
            indexed_at: text("indexed_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u64(v: f64) -> u64 {
    if v.is_finite() && v >= 0.0 {
        v as u64
    } else {
        0
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
#[must_use]
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
