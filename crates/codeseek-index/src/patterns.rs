//! Glob-like ignore patterns with `**` support.

use glob::{MatchOptions, Pattern};

/// Patterns applied when configuration supplies none.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "target/**",
    "build/**",
    "dist/**",
    "out/**",
    "node_modules/**",
    ".pnp/**",
    "**/*.min.js",
    "**/*.bundle.js",
    ".git/**",
    ".idea/**",
    ".vscode/**",
    "*.iml",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug)]
enum Rule {
    /// Pattern containing `**`, e.g. `node_modules/**` or `**/*.min.js`.
    Recursive {
        prefix: Option<String>,
        literal_parts: Vec<String>,
        glob_parts: Vec<Pattern>,
        full: Option<Pattern>,
    },
    Simple {
        glob: Option<Pattern>,
        dir_name: String,
    },
}

/// Compiled ignore rule set evaluated against repository-relative paths.
#[derive(Debug)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl Default for IgnoreMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_PATTERNS.iter().copied())
    }
}

impl IgnoreMatcher {
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .filter_map(|p| compile(p.as_ref()))
            .collect();
        Self { rules }
    }

    /// Whether `rel_path` (file or directory, relative to the repository root)
    /// is ignored.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let path = normalize(rel_path);
        if path.is_empty() {
            return false;
        }
        self.rules.iter().any(|rule| rule_matches(rule, &path))
    }
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").trim_matches('/').to_owned()
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn compile_glob(raw: &str) -> Option<Pattern> {
    match Pattern::new(raw) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(pattern = raw, error = %e, "invalid ignore pattern");
            None
        }
    }
}

fn compile(raw: &str) -> Option<Rule> {
    let pattern = normalize(raw.trim());
    if pattern.is_empty() {
        return None;
    }

    if pattern.contains("**") {
        let mut pieces = pattern.split("**");
        let prefix = pieces
            .next()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_owned);

        let mut literal_parts = Vec::new();
        let mut glob_parts = Vec::new();
        for part in pattern.split("**").map(|p| p.trim_matches('/')) {
            if part.is_empty() {
                continue;
            }
            if has_glob_meta(part) {
                glob_parts.extend(compile_glob(part));
            } else {
                literal_parts.push(part.to_owned());
            }
        }

        return Some(Rule::Recursive {
            prefix,
            literal_parts,
            glob_parts,
            full: compile_glob(&pattern),
        });
    }

    Some(Rule::Simple {
        glob: compile_glob(&pattern),
        dir_name: pattern,
    })
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn rule_matches(rule: &Rule, path: &str) -> bool {
    match rule {
        Rule::Recursive {
            prefix,
            literal_parts,
            glob_parts,
            full,
        } => {
            if let Some(prefix) = prefix
                && (path == prefix || path.starts_with(&format!("{prefix}/")))
            {
                return true;
            }
            let name = base_name(path);
            literal_parts.iter().any(|part| {
                path == part
                    || path.contains(&format!("/{part}/"))
                    || path.starts_with(&format!("{part}/"))
                    || path.ends_with(&format!("/{part}"))
            }) || glob_parts
                .iter()
                .any(|g| g.matches_with(name, MATCH_OPTIONS))
                || full
                    .as_ref()
                    .is_some_and(|g| g.matches_with(path, MATCH_OPTIONS))
        }
        Rule::Simple { glob, dir_name } => {
            if let Some(glob) = glob
                && (glob.matches_with(path, MATCH_OPTIONS)
                    || glob.matches_with(base_name(path), MATCH_OPTIONS))
            {
                return true;
            }
            // any ancestor directory named like the pattern
            let mut components: Vec<&str> = path.split('/').collect();
            components.pop();
            components.iter().any(|c| c == dir_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn default_patterns_prune_build_dirs() {
        let m = IgnoreMatcher::default();
        assert!(m.is_ignored("target"));
        assert!(m.is_ignored("target/debug/app"));
        assert!(m.is_ignored("node_modules/react/index.js"));
        assert!(m.is_ignored("dist/bundle.js"));
        assert!(m.is_ignored(".git/HEAD"));
        assert!(!m.is_ignored("src/main.go"));
        assert!(!m.is_ignored("src/targeting/aim.go"));
    }

    #[test]
    fn recursive_wildcard_matches_any_depth() {
        let m = IgnoreMatcher::default();
        assert!(m.is_ignored("vendor.min.js"));
        assert!(m.is_ignored("web/static/lib/jquery.min.js"));
        assert!(m.is_ignored("public/app.bundle.js"));
        assert!(!m.is_ignored("web/static/lib/jquery.js"));
    }

    #[test]
    fn nested_literal_segment() {
        let m = IgnoreMatcher::new(["**/generated/**"]);
        assert!(m.is_ignored("api/generated/client.ts"));
        assert!(m.is_ignored("generated/x.ts"));
        assert!(m.is_ignored("api/generated"));
        assert!(!m.is_ignored("api/generator.ts"));
    }

    #[test]
    fn simple_pattern_matches_basename() {
        let m = IgnoreMatcher::new(["*.iml"]);
        assert!(m.is_ignored("project.iml"));
        assert!(m.is_ignored("modules/core/core.iml"));
        assert!(!m.is_ignored("modules/core/core.java"));
    }

    #[test]
    fn simple_pattern_matches_ancestor_dir() {
        let m = IgnoreMatcher::new(["vendor"]);
        assert!(m.is_ignored("vendor"));
        assert!(m.is_ignored("third_party/vendor/lib.go"));
        assert!(!m.is_ignored("vendored.go"));
    }

    #[test]
    fn backslashes_are_normalized() {
        let m = IgnoreMatcher::default();
        assert!(m.is_ignored("node_modules\\left-pad\\index.js"));
    }

    #[test]
    fn empty_inputs() {
        let m = IgnoreMatcher::new(["", "  "]);
        assert!(!m.is_ignored("anything.go"));
        assert!(!IgnoreMatcher::default().is_ignored(""));
    }

    #[test]
    fn invalid_glob_is_skipped() {
        let m = IgnoreMatcher::new(["[unclosed", "build/**"]);
        assert!(m.is_ignored("build/out.js"));
        assert!(!m.is_ignored("src/a.js"));
    }

    proptest! {
        #[test]
        fn matcher_never_panics(pattern in ".{0,24}", path in "[a-z/._*\\-]{0,40}") {
            let m = IgnoreMatcher::new([pattern]);
            let _ = m.is_ignored(&path);
        }
    }
}
