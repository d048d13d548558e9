//! Language detection and tree-sitter grammar registry.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Language recognized by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Java,
    TypeScript,
    JavaScript,
    Go,
}

impl Lang {
    /// Identifier used in the vector payload and in boundary pattern lookup.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Go => "go",
        }
    }

    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Java => &["java"],
            Self::TypeScript => &["ts", "tsx"],
            Self::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Self::Go => &["go"],
        }
    }

    /// Whether a tree-sitter grammar is compiled in for this language.
    #[must_use]
    pub fn has_ast_support(self) -> bool {
        self.grammar(false).is_some()
    }

    /// Get the tree-sitter grammar. `jsx` selects the TSX dialect for
    /// TypeScript. Returns `None` if the language has no grammar or the
    /// corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self, jsx: bool) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-java")]
            Self::Java => Some(tree_sitter_java::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript if jsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[allow(unreachable_patterns)]
            _ => {
                let _ = jsx;
                None
            }
        }
    }

    /// AST node kinds that become chunks.
    #[must_use]
    pub fn semantic_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Java => &[
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
                "method_declaration",
                "constructor_declaration",
            ],
            Self::JavaScript => &[
                "function_declaration",
                "class_declaration",
                "method_definition",
                "arrow_function",
                "function_expression",
            ],
            Self::TypeScript => &[
                "function_declaration",
                "class_declaration",
                "interface_declaration",
                "type_alias_declaration",
                "method_definition",
                "arrow_function",
            ],
            Self::Go => &[],
        }
    }

    /// Node kinds collected as methods when a class is split hierarchically.
    #[must_use]
    pub fn method_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Java => &["method_declaration", "constructor_declaration"],
            Self::JavaScript | Self::TypeScript => &["method_definition", "function_declaration"],
            Self::Go => &[],
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

const ALL_LANGS: [Lang; 4] = [Lang::Java, Lang::TypeScript, Lang::JavaScript, Lang::Go];

/// Detect language from the file extension, ignoring case.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    ALL_LANGS
        .into_iter()
        .find(|lang| lang.extensions().contains(&ext.as_str()))
}

/// Languages with a registered extension.
#[must_use]
pub fn supported_languages() -> &'static [Lang] {
    &ALL_LANGS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_known_extensions() {
        assert_eq!(detect_language(Path::new("Main.java")), Some(Lang::Java));
        assert_eq!(detect_language(Path::new("app.ts")), Some(Lang::TypeScript));
        assert_eq!(detect_language(Path::new("View.tsx")), Some(Lang::TypeScript));
        assert_eq!(detect_language(Path::new("index.js")), Some(Lang::JavaScript));
        assert_eq!(detect_language(Path::new("App.jsx")), Some(Lang::JavaScript));
        assert_eq!(detect_language(Path::new("esm.mjs")), Some(Lang::JavaScript));
        assert_eq!(detect_language(Path::new("cfg.cjs")), Some(Lang::JavaScript));
        assert_eq!(detect_language(Path::new("main.go")), Some(Lang::Go));
    }

    #[test]
    fn detection_ignores_case() {
        assert_eq!(detect_language(Path::new("Main.JAVA")), Some(Lang::Java));
        assert_eq!(detect_language(Path::new("x.Ts")), Some(Lang::TypeScript));
    }

    #[test]
    fn unsupported_paths() {
        assert_eq!(detect_language(Path::new("lib.rs")), None);
        assert_eq!(detect_language(Path::new("script.py")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
        assert_eq!(detect_language(Path::new(".hidden")), None);
    }

    #[test]
    fn go_has_no_grammar() {
        assert!(!Lang::Go.has_ast_support());
        assert!(Lang::Go.semantic_node_kinds().is_empty());
    }

    #[cfg(feature = "lang-java")]
    #[test]
    fn java_grammar_loads() {
        assert!(Lang::Java.has_ast_support());
    }

    #[cfg(feature = "lang-js")]
    #[test]
    fn js_and_ts_grammars_load() {
        assert!(Lang::JavaScript.grammar(false).is_some());
        assert!(Lang::TypeScript.grammar(false).is_some());
        assert!(Lang::TypeScript.grammar(true).is_some());
    }

    #[test]
    fn display_matches_id() {
        assert_eq!(Lang::TypeScript.to_string(), "typescript");
        assert_eq!(Lang::Java.to_string(), "java");
    }
}
