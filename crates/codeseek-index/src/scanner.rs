//! Repository walk producing the list of indexable files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::languages::detect_language;
use crate::patterns::IgnoreMatcher;

/// Outcome of a repository walk.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanResult {
    /// Absolute paths of retained files, in walk order.
    pub files: Vec<PathBuf>,
    /// Files considered after ignore rules (retained plus skipped by language or size).
    pub total_files: usize,
    pub skipped_files: usize,
    /// Retained file count per language id.
    pub languages: BTreeMap<String, usize>,
    /// Per-entry walk errors. These never abort the scan.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub max_file_size_bytes: u64,
    pub respect_gitignore: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 1024 * 1024,
            respect_gitignore: true,
        }
    }
}

pub struct Scanner {
    matcher: Arc<IgnoreMatcher>,
    config: ScannerConfig,
}

impl Scanner {
    #[must_use]
    pub fn new(matcher: IgnoreMatcher, config: ScannerConfig) -> Self {
        Self {
            matcher: Arc::new(matcher),
            config,
        }
    }

    /// Walk `root` and collect candidate files.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Scan`] if `root` does not exist or is not a directory.
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        let meta = std::fs::metadata(root)
            .map_err(|e| IndexError::Scan(format!("{}: {e}", root.display())))?;
        if !meta.is_dir() {
            return Err(IndexError::Scan(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let matcher = Arc::clone(&self.matcher);
        let walk_root = root.to_path_buf();
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .git_ignore(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
                    return true;
                }
                if entry.file_name().to_string_lossy().starts_with('.') {
                    return false;
                }
                !matcher.is_ignored(&relative_path(&walk_root, entry.path()))
            })
            .build();

        let mut result = ScanResult::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "scan entry failed");
                    result.errors.push(e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            if self.matcher.is_ignored(&relative_path(root, path)) {
                result.skipped_files += 1;
                continue;
            }
            result.total_files += 1;

            let Some(lang) = detect_language(path) else {
                result.skipped_files += 1;
                continue;
            };

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    result.errors.push(format!("{}: {e}", path.display()));
                    result.skipped_files += 1;
                    continue;
                }
            };
            if size > self.config.max_file_size_bytes {
                tracing::debug!(file = %path.display(), size, "skipping oversized file");
                result.skipped_files += 1;
                continue;
            }

            *result.languages.entry(lang.id().to_owned()).or_default() += 1;
            result.files.push(path.to_path_buf());
        }

        tracing::info!(
            root = %root.display(),
            retained = result.files.len(),
            total = result.total_files,
            skipped = result.skipped_files,
            errors = result.errors.len(),
            "scan complete"
        );
        Ok(result)
    }
}

/// Forward-slash path of `path` relative to `root`.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn scanner(max_bytes: u64) -> Scanner {
        Scanner::new(
            IgnoreMatcher::default(),
            ScannerConfig {
                max_file_size_bytes: max_bytes,
                respect_gitignore: false,
            },
        )
    }

    fn names(result: &ScanResult, root: &Path) -> Vec<String> {
        result
            .files
            .iter()
            .map(|p| relative_path(root, p))
            .collect()
    }

    #[test]
    fn retains_only_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.go", "package main");
        write(root, "src/App.tsx", "export const App = () => null;");
        write(root, "src/Main.JAVA", "class Main {}");
        write(root, "README.md", "# readme");
        write(root, "lib/util.py", "def f(): pass");

        let result = scanner(1024).scan(root).unwrap();
        assert_eq!(
            names(&result, root),
            vec!["src/App.tsx", "src/Main.JAVA", "src/main.go"]
        );
        assert_eq!(result.total_files, 5);
        assert_eq!(result.skipped_files, 2);
        assert_eq!(result.languages.get("go"), Some(&1));
        assert_eq!(result.languages.get("java"), Some(&1));
        assert_eq!(result.languages.get("typescript"), Some(&1));
        assert!(result.errors.is_empty());
    }

    #[test]
    fn prunes_ignored_and_hidden_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "node_modules/pkg/index.js", "module.exports = 1;");
        write(root, ".cache/tool/gen.ts", "export {}");
        write(root, "build/out.js", "var x;");
        write(root, "web/jquery.min.js", "!function(){}");
        write(root, "web/app.js", "function main() {}");
        write(root, ".eslintrc.js", "module.exports = {};");

        let result = scanner(1024).scan(root).unwrap();
        assert_eq!(names(&result, root), vec![".eslintrc.js", "web/app.js"]);
        // min.js is walked but ignored as a file
        assert_eq!(result.skipped_files, 1);
        assert_eq!(result.total_files, 2);
    }

    #[test]
    fn skips_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "small.go", "package a");
        write(root, "big.go", &"x".repeat(200));

        let result = scanner(100).scan(root).unwrap();
        assert_eq!(names(&result, root), vec!["small.go"]);
        assert_eq!(result.skipped_files, 1);
        assert_eq!(result.total_files, 2);
    }

    #[test]
    fn missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = scanner(1024).scan(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, IndexError::Scan(_)));
    }

    #[test]
    fn file_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.go", "package a");
        let err = scanner(1024).scan(&dir.path().join("a.go")).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(relative_path(root, Path::new("/repo/src/a.go")), "src/a.go");
        assert_eq!(relative_path(root, Path::new("/elsewhere/b.go")), "/elsewhere/b.go");
    }
}
