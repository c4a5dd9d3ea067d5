//! Read-only file cache queried by the validator and the correction strategies
//!
//! The cache maps a repository-relative path to line-indexed text. It is
//! owned by the caller and shared read-only by every stage, so the trait
//! only exposes lookups.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{BINARY_SNIFF_BYTES, MAX_CACHED_FILE_SIZE, SKIPPED_DIRS};
use crate::error::Result;

/// A file as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub path: String,
    /// Lines without terminators. Empty for binary files.
    pub lines: Vec<String>,
    pub line_count: u32,
    pub is_binary: bool,
    /// Hex SHA-256 of the raw content.
    pub sha256: String,
    pub language: Option<String>,
}

impl CachedFile {
    /// Cache entry for text content.
    pub fn text(path: impl Into<String>, content: &str) -> Self {
        let path = path.into();
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        Self {
            language: detect_language(&path).map(str::to_string),
            line_count: u32::try_from(lines.len()).unwrap_or(u32::MAX),
            lines,
            is_binary: false,
            sha256: hash_bytes(content.as_bytes()),
            path,
        }
    }

    /// Cache entry for binary content; only the line count is kept.
    pub fn binary(path: impl Into<String>, bytes: &[u8]) -> Self {
        let path = path.into();
        let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
        let line_count = if bytes.is_empty() {
            0
        } else {
            newlines + usize::from(bytes.last() != Some(&b'\n'))
        };
        Self {
            language: None,
            line_count: u32::try_from(line_count).unwrap_or(u32::MAX),
            lines: Vec::new(),
            is_binary: true,
            sha256: hash_bytes(bytes),
            path,
        }
    }

    /// Build an entry from raw bytes, sniffing for binary content.
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        if looks_binary(bytes) {
            return Self::binary(path, bytes);
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::text(path, text),
            Err(_) => Self::binary(path, bytes),
        }
    }

    /// Inclusive, 1-indexed slice of lines joined with `\n`.
    ///
    /// `None` when the range is empty, inverted, or outside the file.
    pub fn slice(&self, start_line: u32, end_line: u32) -> Option<String> {
        if self.is_binary || start_line == 0 || end_line < start_line || end_line > self.line_count
        {
            return None;
        }
        let start = usize::try_from(start_line - 1).ok()?;
        let end = usize::try_from(end_line).ok()?;
        self.lines.get(start..end).map(|lines| lines.join("\n"))
    }
}

/// Read-only lookup of cached files by path.
pub trait FileCache: Send + Sync {
    fn get(&self, path: &str) -> Option<&CachedFile>;

    /// All cached paths, in a stable order.
    fn paths(&self) -> Vec<&str>;
}

/// Simple in-memory [`FileCache`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileCache {
    files: BTreeMap<String, CachedFile>,
}

impl InMemoryFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: CachedFile) {
        self.files.insert(file.path.clone(), file);
    }

    /// Insert text content under `path`.
    pub fn insert_text(&mut self, path: impl Into<String>, content: &str) {
        self.insert(CachedFile::text(path, content));
    }

    /// Builder-style variant of [`InMemoryFileCache::insert_text`].
    pub fn with_text(mut self, path: impl Into<String>, content: &str) -> Self {
        self.insert_text(path, content);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Load every regular file under `root`, keyed by `/`-separated relative path.
    ///
    /// Version-control and build directories and files above
    /// [`MAX_CACHED_FILE_SIZE`] are skipped.
    pub fn from_dir(root: &Path) -> Result<Self> {
        let mut cache = Self::new();
        let mut skipped = 0usize;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && e.depth() > 0
                    && e.file_name()
                        .to_str()
                        .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
            });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata()?.len() > MAX_CACHED_FILE_SIZE {
                debug!(path = %entry.path().display(), "skipping oversized file");
                skipped += 1;
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = std::fs::read(entry.path())?;
            cache.insert(CachedFile::from_bytes(key, &bytes));
        }

        info!(
            root = %root.display(),
            files = cache.len(),
            skipped,
            "loaded file cache"
        );
        Ok(cache)
    }
}

impl FileCache for InMemoryFileCache {
    fn get(&self, path: &str) -> Option<&CachedFile> {
        self.files
            .get(path)
            .or_else(|| self.files.get(path.trim_start_matches("./")))
    }

    fn paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// NUL byte in the leading chunk means binary.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|&b| b == 0)
}

/// Guess a language name from the file extension.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    let lang = match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "rb" => "ruby",
        "md" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "sh" => "shell",
        _ => return None,
    };
    Some(lang)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_entry() {
        let file = CachedFile::text("src/app.py", "a = 1\nb = 2\nc = 3\n");
        assert_eq!(file.line_count, 3);
        assert_eq!(file.language.as_deref(), Some("python"));
        assert_eq!(file.slice(2, 3).as_deref(), Some("b = 2\nc = 3"));
        assert!(file.slice(0, 1).is_none());
        assert!(file.slice(3, 4).is_none());
        assert!(file.slice(3, 2).is_none());
        assert_eq!(file.sha256.len(), 64);
    }

    #[test]
    fn test_binary_detection() {
        let file = CachedFile::from_bytes("logo.png", b"\x89PNG\x00\x01\nrest");
        assert!(file.is_binary);
        assert_eq!(file.line_count, 2);
        assert!(file.slice(1, 1).is_none());
    }

    #[test]
    fn test_lookup_tolerates_dot_slash() {
        let cache = InMemoryFileCache::new().with_text("src/lib.rs", "fn main() {}\n");
        assert!(cache.get("./src/lib.rs").is_some());
        assert!(cache.get("src/missing.rs").is_none());
        assert_eq!(cache.paths(), vec!["src/lib.rs"]);
    }

    #[test]
    fn test_from_dir_skips_build_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).expect("mkdir");
        std::fs::create_dir_all(root.join("target/debug")).expect("mkdir");
        std::fs::write(root.join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").expect("write");
        std::fs::write(root.join("target/debug/out.txt"), "ignored\n").expect("write");
        std::fs::write(root.join("blob.bin"), [0u8, 1, 2, 3]).expect("write");

        let cache = InMemoryFileCache::from_dir(root).expect("load");
        assert_eq!(cache.paths(), vec!["blob.bin", "src/lib.rs"]);
        assert!(cache.get("blob.bin").is_some_and(|f| f.is_binary));
        assert_eq!(cache.get("src/lib.rs").map(|f| f.line_count), Some(1));
    }
}
