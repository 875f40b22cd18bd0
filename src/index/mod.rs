//! Project file discovery
//!
//! Walks the project tree and classifies the files the strategies care
//! about. Parsing lives in [`parser`].

pub mod parser;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Languages the scanner understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    JavaScript,
    TypeScript,
    Tsx,
    Html,
    Unknown,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "html" | "htm" => Language::Html,
            _ => Language::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// JavaScript-family source that can hold application code
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Language::JavaScript | Language::TypeScript | Language::Tsx
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Html => "html",
            Language::Unknown => "unknown",
        }
    }
}

/// A file picked up by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub absolute: PathBuf,
    pub relative: PathBuf,
    pub language: Language,
    pub size: u64,
}

/// Stems accepted for an application entry point under `src/`
const ENTRY_STEMS: &[&str] = &["main", "index"];

/// Entry-point file names checked by the nuclear fallback, in priority order
pub const ENTRY_POINT_FILES: &[&str] = &[
    "src/main.tsx",
    "src/main.jsx",
    "src/main.ts",
    "src/main.js",
    "src/index.tsx",
    "src/index.jsx",
    "src/index.ts",
    "src/index.js",
];

impl SourceFile {
    /// `src/main.*` or `src/index.*` script
    pub fn is_entry_point(&self) -> bool {
        is_entry_point(&self.relative)
    }
}

pub fn is_entry_point(relative: &Path) -> bool {
    if !Language::from_path(relative).is_script() {
        return false;
    }
    let parent_is_src = relative
        .parent()
        .map(|p| p == Path::new("src"))
        .unwrap_or(false);
    let stem = relative.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    parent_is_src && ENTRY_STEMS.contains(&stem)
}

/// `index.html` or `public/index.html`
pub fn is_root_document(relative: &Path) -> bool {
    relative == Path::new("index.html") || relative == Path::new("public/index.html")
}

/// Discover every supported file under `root`, sorted by relative path.
///
/// Unreadable directory entries are skipped; only a failure to read the
/// root itself is returned as an error.
pub fn discover(root: &Path) -> std::io::Result<Vec<SourceFile>> {
    std::fs::read_dir(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.path()))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let language = Language::from_path(path);
        if language == Language::Unknown {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        files.push(SourceFile {
            absolute: path.to_path_buf(),
            relative,
            language,
            size,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Check if a path should be ignored
fn is_ignored(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    // Common ignore patterns
    let ignored = [
        "node_modules",
        "dist",
        "build",
        "coverage",
        "out",
        "target",
        "vendor",
    ];

    ignored.contains(&name) || name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::from_extension("jsx"), Language::JavaScript);
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("TSX"), Language::Tsx);
        assert_eq!(Language::from_extension("html"), Language::Html);
        assert_eq!(Language::from_extension("rs"), Language::Unknown);
    }

    #[test]
    fn test_entry_point_detection() {
        assert!(is_entry_point(Path::new("src/main.tsx")));
        assert!(is_entry_point(Path::new("src/index.js")));
        assert!(!is_entry_point(Path::new("src/App.tsx")));
        assert!(!is_entry_point(Path::new("lib/main.ts")));
        assert!(!is_entry_point(Path::new("src/main.css")));
    }

    #[test]
    fn discover_skips_ignored_dirs_and_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/react")).unwrap();
        fs::write(root.join("src/main.tsx"), "createRoot()").unwrap();
        fs::write(root.join("src/style.css"), "body {}").unwrap();
        fs::write(root.join("node_modules/react/index.js"), "").unwrap();
        fs::write(root.join("index.html"), "<div id=\"root\"></div>").unwrap();

        let files = discover(root).unwrap();
        let rels: Vec<_> = files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(
            rels,
            vec![PathBuf::from("index.html"), PathBuf::from("src/main.tsx")]
        );
        assert!(files[1].is_entry_point());
    }

    #[test]
    fn discover_fails_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("absent")).is_err());
    }
}
