//! File classification: decides whether a file's content is worth fetching.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. size above the ceiling → `too_large`
//! 2. a directory segment in the ignored set → `ignored_directory`
//! 3. basename is a known lock file → `lock_file`
//! 4. extension is a known binary format → `binary_extension`
//! 5. basename looks minified, bundled or is a source map → `generated_file`
//!
//! The verdict depends only on `(path, size)` and the configured ceiling.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::SkipReason;

/// Default content size ceiling: 1 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

const IGNORED_DIRECTORIES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "bower_components",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".gradle",
    ".idea",
    ".vscode",
    ".cache",
    ".next",
    ".nuxt",
    "target",
    "coverage",
];

const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "Gemfile.lock",
    "Pipfile.lock",
    "poetry.lock",
    "composer.lock",
    "go.sum",
    "flake.lock",
    "mix.lock",
    "Podfile.lock",
    "packages.lock.json",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tif", "tiff", "psd", "pdf", "zip", "tar",
    "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib",
    "o", "a", "lib", "bin", "wasm", "pyc", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4",
    "wav", "ogg", "flac", "mov", "avi", "webm", "sqlite", "db",
];

static RE_GENERATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.min\.(js|mjs|css)|[.-]bundle\.(js|mjs|css)|\.chunk\.js|\.map)$").unwrap()
});

/// Verdict for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub skip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}

impl Classification {
    pub fn fetch() -> Self {
        Self {
            skip: false,
            reason: None,
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skip: true,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    max_file_size: u64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl Classifier {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn classify(&self, path: &str, size: u64) -> Classification {
        if size > self.max_file_size {
            return Classification::skipped(SkipReason::TooLarge);
        }

        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let basename = segments.pop().unwrap_or("");

        if segments.iter().any(|s| IGNORED_DIRECTORIES.contains(s)) {
            return Classification::skipped(SkipReason::IgnoredDirectory);
        }

        if LOCK_FILES.contains(&basename) {
            return Classification::skipped(SkipReason::LockFile);
        }

        if let Some((_, ext)) = basename.rsplit_once('.') {
            let ext = ext.to_ascii_lowercase();
            if BINARY_EXTENSIONS.contains(&ext.as_str()) {
                return Classification::skipped(SkipReason::BinaryExtension);
            }
        }

        if RE_GENERATED.is_match(basename) {
            return Classification::skipped(SkipReason::GeneratedFile);
        }

        Classification::fetch()
    }
}

/// Classifies with the default size ceiling.
pub fn classify(path: &str, size: u64) -> Classification {
    Classifier::default().classify(path, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(path: &str, size: u64) -> Option<SkipReason> {
        classify(path, size).reason
    }

    #[test]
    fn test_ordinary_source_is_fetched() {
        assert_eq!(classify("src/main.rs", 100), Classification::fetch());
        assert_eq!(classify("README.md", 0), Classification::fetch());
        assert_eq!(classify("dist/app.js", 10), Classification::fetch());
    }

    #[test]
    fn test_generated_and_lock_examples() {
        assert_eq!(
            classify("dist/app.min.js", 100),
            Classification::skipped(SkipReason::GeneratedFile)
        );
        assert_eq!(
            classify("package-lock.json", 100),
            Classification::skipped(SkipReason::LockFile)
        );
    }

    #[test]
    fn test_rule_order() {
        // size beats everything
        assert_eq!(
            reason("node_modules/x.png", DEFAULT_MAX_FILE_SIZE + 1),
            Some(SkipReason::TooLarge)
        );
        // ignored directory beats lock file
        assert_eq!(
            reason("node_modules/pkg/yarn.lock", 10),
            Some(SkipReason::IgnoredDirectory)
        );
        // lock file beats the .json extension and patterns
        assert_eq!(reason("web/package-lock.json", 10), Some(SkipReason::LockFile));
        // binary extension beats the generated pattern
        assert_eq!(reason("img/logo.min.png", 10), Some(SkipReason::BinaryExtension));
    }

    #[test]
    fn test_size_ceiling_is_exclusive() {
        assert_eq!(reason("a.rs", DEFAULT_MAX_FILE_SIZE), None);
        assert_eq!(reason("a.rs", DEFAULT_MAX_FILE_SIZE + 1), Some(SkipReason::TooLarge));
        assert_eq!(Classifier::new(10).classify("a.rs", 11).reason, Some(SkipReason::TooLarge));
    }

    #[test]
    fn test_ignored_directories_match_segments_only() {
        assert_eq!(reason(".git/config", 10), Some(SkipReason::IgnoredDirectory));
        assert_eq!(reason("a/vendor/b.go", 10), Some(SkipReason::IgnoredDirectory));
        assert_eq!(reason("src/vendored.rs", 10), None);
        assert_eq!(reason("target", 10), None);
    }

    #[test]
    fn test_binary_extension_is_case_insensitive() {
        assert_eq!(reason("docs/Shot.PNG", 10), Some(SkipReason::BinaryExtension));
        assert_eq!(reason("Makefile", 10), None);
    }

    #[test]
    fn test_generated_patterns() {
        assert_eq!(reason("app.js.map", 10), Some(SkipReason::GeneratedFile));
        assert_eq!(reason("styles.min.css", 10), Some(SkipReason::GeneratedFile));
        assert_eq!(reason("vendor-bundle.js", 10), Some(SkipReason::GeneratedFile));
        assert_eq!(reason("minimal.js", 10), None);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for (path, size) in [("dist/app.min.js", 100), ("src/lib.rs", 5), ("Cargo.lock", 9)] {
            assert_eq!(classify(path, size), classify(path, size));
        }
    }
}
