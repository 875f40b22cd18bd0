use std::path::{Component, Path, PathBuf};

pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Resolve a project-relative path to an existing file inside `root`.
///
/// Rejects absolute paths, parent traversal and anything that resolves
/// outside the project (e.g. through a symlink).
pub fn resolve_project_file(root: &Path, relative: &Path) -> Result<PathBuf, String> {
    if relative.as_os_str().is_empty() {
        return Err("Path is empty".to_string());
    }
    if relative.is_absolute() {
        return Err(format!(
            "Absolute paths are not allowed: {}",
            relative.display()
        ));
    }
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(format!(
            "Parent traversal is not allowed: {}",
            relative.display()
        ));
    }

    let root = root
        .canonicalize()
        .map_err(|e| format!("Failed to resolve project root: {}", e))?;
    let joined = root.join(relative);
    let resolved = joined
        .canonicalize()
        .map_err(|e| format!("Failed to resolve {}: {}", relative.display(), e))?;

    if !resolved.starts_with(&root) {
        return Err(format!("Path escapes project: {}", relative.display()));
    }
    Ok(resolved)
}

/// Quote a string for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Append `suffix` to the full file name (`App.tsx` -> `App.tsx.bak`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Compute a stable hash of file contents (FNV-1a 64-bit).
pub fn hash_bytes(content: &[u8]) -> String {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in content {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    format!("{:016x}", hash)
}

pub fn hash_str(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::{hash_str, resolve_project_file, shell_quote, truncate, with_suffix};
    use std::fs;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_truncate_unicode_safe() {
        let input = "ééééé";
        assert_eq!(truncate(input, 4), "é...");
    }

    #[test]
    fn test_truncate_small_max() {
        let input = "こんにちは";
        assert_eq!(truncate(input, 3), "こんに");
        assert_eq!(truncate(input, 0), "");
    }

    #[test]
    fn test_hash_str_is_stable() {
        let a = hash_str("hello");
        let b = hash_str("hello");
        let c = hash_str("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_resolve_project_file_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.tsx"), "x").unwrap();

        let ok = resolve_project_file(dir.path(), Path::new("src/main.tsx")).unwrap();
        assert!(ok.ends_with("src/main.tsx"));
        assert!(resolve_project_file(dir.path(), Path::new("../etc/passwd")).is_err());
        assert!(resolve_project_file(dir.path(), Path::new("/etc/passwd")).is_err());
        assert!(resolve_project_file(dir.path(), Path::new("src/missing.tsx")).is_err());
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_with_suffix_keeps_extension() {
        assert_eq!(
            with_suffix(Path::new("src/App.tsx"), ".bak"),
            PathBuf::from("src/App.tsx.bak")
        );
    }
}
