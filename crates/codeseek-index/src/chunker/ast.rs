//! Syntax-tree chunking with hierarchical splitting of oversized classes.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{LazyLock, Mutex};

use regex::RegexSet;
use tree_sitter::{Node, Parser, Tree};

use crate::chunk::{ChunkKind, CodeChunk, truncate_bytes};
use crate::error::{IndexError, Result};
use crate::languages::Lang;

/// Nodes whose trimmed text is shorter than this are dropped.
const MIN_CHUNK_BYTES: usize = 10;
const SUMMARY_MAX_LINES: usize = 50;
const SUMMARY_MAX_METHODS: usize = 20;
const SIGNATURE_MAX_CHARS: usize = 100;

const CLASS_KINDS: [&str; 4] = [
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "type_alias_declaration",
];

static JAVA_METHOD_START: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(public|private|protected)\s+.*\s+\w+\s*\(",
        r"^\s*@\w+.*\s+\w+\s*\(",
    ])
    .unwrap()
});

static JS_METHOD_START: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new([r"^\s*\w+\s*\(", r"^\s*async\s+\w+\s*\("]).unwrap());

static TS_METHOD_START: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(public|private|protected)?\s*\w+\s*\(",
        r"^\s*async\s+\w+\s*\(",
    ])
    .unwrap()
});

/// Limits applied while walking one file.
#[derive(Debug, Clone, Copy)]
pub struct AstLimits {
    pub max_chunk_bytes: usize,
    pub hierarchical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GrammarKey {
    lang: Lang,
    jsx: bool,
}

/// Tree-sitter chunker. Parsers are cached per grammar behind one lock that
/// is held only for the parse call.
#[derive(Default)]
pub struct AstChunker {
    parsers: Mutex<HashMap<GrammarKey, Parser>>,
}

impl std::fmt::Debug for AstChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstChunker").finish_non_exhaustive()
    }
}

struct WalkCtx<'a> {
    source: &'a str,
    file_path: &'a str,
    lang: Lang,
    limits: AstLimits,
}

impl AstChunker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk `source` along its syntax tree.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Parse`] when no grammar is available for `lang`
    /// or tree-sitter gives up on the input.
    pub fn chunk(
        &self,
        source: &str,
        file_path: &str,
        lang: Lang,
        jsx: bool,
        limits: AstLimits,
    ) -> Result<Vec<CodeChunk>> {
        let tree = self.parse(source, GrammarKey { lang, jsx })?;
        let ctx = WalkCtx {
            source,
            file_path,
            lang,
            limits,
        };

        let kinds = lang.semantic_node_kinds();
        let mut chunks = Vec::new();
        // method nodes already emitted under a class summary
        let mut consumed: HashSet<usize> = HashSet::new();
        let mut stack = vec![tree.root_node()];

        while let Some(node) = stack.pop() {
            if kinds.contains(&node.kind()) && !consumed.contains(&node.id()) {
                if limits.hierarchical
                    && is_class_kind(node.kind())
                    && node.byte_range().len() > limits.max_chunk_bytes
                {
                    split_class(&ctx, node, &mut chunks, &mut consumed);
                } else {
                    emit_node(&ctx, node, &mut chunks);
                }
            }
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }

        Ok(chunks)
    }

    fn parse(&self, source: &str, key: GrammarKey) -> Result<Tree> {
        let grammar = key
            .lang
            .grammar(key.jsx)
            .ok_or_else(|| IndexError::Parse(format!("no grammar for {}", key.lang)))?;

        let mut parsers = self
            .parsers
            .lock()
            .map_err(|_| IndexError::Parse("parser lock poisoned".into()))?;
        let parser = match parsers.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&grammar)
                    .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;
                e.insert(parser)
            }
        };
        parser
            .parse(source, None)
            .ok_or_else(|| IndexError::Parse(format!("tree-sitter returned no tree for {}", key.lang)))
    }
}

fn is_class_kind(kind: &str) -> bool {
    CLASS_KINDS.contains(&kind)
}

fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

fn start_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

fn end_line(node: Node<'_>) -> usize {
    node.end_position().row + 1
}

/// Name of a declaration: the `name` field, else the first identifier-like
/// child. Anonymous functions take the name of the variable they are bound to.
fn node_name(node: Node<'_>, source: &str) -> Option<String> {
    if matches!(node.kind(), "arrow_function" | "function_expression") {
        if let Some(name) = node.child_by_field_name("name") {
            return Some(node_text(name, source).to_owned());
        }
        let parent = node.parent()?;
        return match parent.kind() {
            "variable_declarator" | "public_field_definition" | "field_definition" => parent
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_owned()),
            "pair" => parent
                .child_by_field_name("key")
                .map(|n| node_text(n, source).to_owned()),
            _ => None,
        };
    }

    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(name, source).to_owned());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" | "name" | "property_identifier" | "type_identifier" => {
                return Some(node_text(child, source).to_owned());
            }
            "variable_declarator" => {
                if let Some(name) = node_name(child, source) {
                    return Some(name);
                }
            }
            _ => {}
        }
    }
    None
}

fn enclosing_class_name(node: Node<'_>, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(n) = current {
        if is_class_kind(n.kind()) {
            return node_name(n, source);
        }
        current = n.parent();
    }
    None
}

fn emit_node(ctx: &WalkCtx<'_>, node: Node<'_>, out: &mut Vec<CodeChunk>) {
    let text = node_text(node, ctx.source);
    if text.trim().len() < MIN_CHUNK_BYTES {
        return;
    }

    let name = node_name(node, ctx.source);
    let (kind, function_name, class_name) = if is_class_kind(node.kind()) {
        (ChunkKind::Class, None, name)
    } else {
        (
            ChunkKind::Function,
            name,
            enclosing_class_name(node, ctx.source),
        )
    };

    for (content, start, end) in split_lines(text, start_line(node), ctx.limits.max_chunk_bytes) {
        let mut chunk = CodeChunk::new(ctx.file_path, kind, &content, ctx.lang.id(), start, end);
        chunk.function_name.clone_from(&function_name);
        chunk.class_name.clone_from(&class_name);
        out.push(chunk);
    }
}

/// Replace one oversized class with a summary chunk plus one chunk per method.
fn split_class(
    ctx: &WalkCtx<'_>,
    class: Node<'_>,
    out: &mut Vec<CodeChunk>,
    consumed: &mut HashSet<usize>,
) {
    let class_name = node_name(class, ctx.source).unwrap_or_else(|| "anonymous".to_owned());
    let methods = method_nodes(class, ctx.lang);
    let summary_text = build_summary(ctx, class, &methods);

    let mut summary = CodeChunk::new(
        ctx.file_path,
        ChunkKind::Class,
        truncate_bytes(&summary_text, ctx.limits.max_chunk_bytes),
        ctx.lang.id(),
        start_line(class),
        end_line(class),
    );
    summary.class_name = Some(class_name.clone());
    let summary_id = summary.id.clone();
    out.push(summary);

    tracing::debug!(
        file = ctx.file_path,
        class = %class_name,
        methods = methods.len(),
        "split oversized class"
    );

    for method in methods {
        consumed.insert(method.id());
        let text = node_text(method, ctx.source);
        if text.trim().len() < MIN_CHUNK_BYTES {
            continue;
        }
        let method_name = node_name(method, ctx.source);
        for (content, start, end) in
            split_lines(text, start_line(method), ctx.limits.max_chunk_bytes)
        {
            let mut chunk =
                CodeChunk::new(ctx.file_path, ChunkKind::Method, &content, ctx.lang.id(), start, end);
            chunk.function_name.clone_from(&method_name);
            chunk.class_name = Some(class_name.clone());
            chunk.parent_chunk_id = Some(summary_id.clone());
            out.push(chunk);
        }
    }
}

/// Method-like nodes whose parent or grandparent is `class`, in source order.
fn method_nodes(class: Node<'_>, lang: Lang) -> Vec<Node<'_>> {
    let kinds = lang.method_node_kinds();
    let mut found = Vec::new();
    let mut stack = vec![class];
    while let Some(node) = stack.pop() {
        if node != class && kinds.contains(&node.kind()) {
            let parent = node.parent();
            let grandparent = parent.and_then(|p| p.parent());
            if parent == Some(class) || grandparent == Some(class) {
                found.push(node);
            }
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

fn is_method_start(lang: Lang, line: &str) -> bool {
    match lang {
        Lang::Java => JAVA_METHOD_START.is_match(line),
        Lang::JavaScript => JS_METHOD_START.is_match(line),
        Lang::TypeScript => TS_METHOD_START.is_match(line),
        Lang::Go => false,
    }
}

fn build_summary(ctx: &WalkCtx<'_>, class: Node<'_>, methods: &[Node<'_>]) -> String {
    let text = node_text(class, ctx.source);
    let mut summary = String::new();
    for line in text.lines().take(SUMMARY_MAX_LINES) {
        if is_method_start(ctx.lang, line) {
            break;
        }
        summary.push_str(line);
        summary.push('\n');
    }
    if summary.trim().is_empty() {
        summary = text.lines().next().unwrap_or_default().to_owned();
        summary.push('\n');
    }

    if !methods.is_empty() {
        summary.push_str("\n// Methods:\n");
        for method in methods.iter().take(SUMMARY_MAX_METHODS) {
            let signature = node_text(*method, ctx.source)
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or_default();
            let _ = writeln!(summary, "// - {}", truncate_signature(signature));
        }
        if methods.len() > SUMMARY_MAX_METHODS {
            let _ = write!(
                summary,
                "// ... and {} more methods",
                methods.len() - SUMMARY_MAX_METHODS
            );
        }
    }
    summary
}

fn truncate_signature(signature: &str) -> String {
    match signature.char_indices().nth(SIGNATURE_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &signature[..idx]),
        None => signature.to_owned(),
    }
}

/// Split `text` into line windows of at most `max_bytes`, with roughly 10%
/// (1 to 10 lines) overlap between consecutive windows. `first_line` is the
/// 1-based line of the first line of `text`. Returns `(content, start, end)`.
pub(crate) fn split_lines(
    text: &str,
    first_line: usize,
    max_bytes: usize,
) -> Vec<(String, usize, usize)> {
    if text.len() <= max_bytes {
        return vec![(text.to_owned(), first_line, first_line + text.lines().count().max(1) - 1)];
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let overlap = (lines.len() / 10).clamp(1, 10);
    let mut pieces = Vec::new();
    let mut push = |from: usize, to: usize| {
        let joined = lines[from..=to].join("\n");
        if !joined.trim().is_empty() {
            pieces.push((
                truncate_bytes(&joined, max_bytes).to_owned(),
                first_line + from,
                first_line + to,
            ));
        }
    };

    let mut start = 0;
    let mut size = 0;
    for i in 0..lines.len() {
        size += lines[i].len() + usize::from(i > start);
        if size > max_bytes && i + 1 < lines.len() {
            push(start, i);
            let next = (i + 1).saturating_sub(overlap).max(start + 1);
            size = if next <= i {
                lines[next..=i].iter().map(|l| l.len() + 1).sum::<usize>() - 1
            } else {
                0
            };
            start = next;
        }
    }
    if start < lines.len() {
        push(start, lines.len() - 1);
    }
    pieces
}
