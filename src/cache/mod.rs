//! Work directory for rendermedic
//!
//! Everything the engine persists lives under `<project>/.rendermedic/`:
//!
//! - `cache/`          bounded finding cache, purged wholesale on recovery
//! - `diagnostics/`    one JSON dump per strategy failure (write-only)
//! - `backups/<id>/`   session snapshots with their manifest
//! - `recovery-plan.json`
//! - `success-log.json` append-only JSON array
//!
//! # Error Handling
//!
//! Cache reads are best-effort: a missing or corrupt cache file is treated
//! as empty. Writes return `anyhow::Result` and callers decide whether a
//! failure matters; the engine logs and carries on for everything except
//! backups.

use crate::finding::Finding;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};
use uuid::Uuid;

const CACHE_DIR: &str = "cache";
const DIAGNOSTICS_DIR: &str = "diagnostics";
const BACKUPS_DIR: &str = "backups";
const FINDINGS_CACHE_FILE: &str = "findings.json";
const RECOVERY_PLAN_FILE: &str = "recovery-plan.json";
const SUCCESS_LOG_FILE: &str = "success-log.json";
const LOCK_FILE: &str = ".lock";
const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

/// One strategy failure, as written to `diagnostics/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticDump {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub error: String,
    pub stack: String,
}

/// One row of the success log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub result_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedFile {
    hash: String,
    findings: Vec<Finding>,
}

/// Findings per file, keyed by relative path and valid for one content hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingCache {
    entries: HashMap<PathBuf, CachedFile>,
    #[serde(skip)]
    max_entries: usize,
    #[serde(skip)]
    dirty: bool,
}

impl FindingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            dirty: false,
        }
    }

    pub fn get(&self, path: &Path, hash: &str) -> Option<&[Finding]> {
        self.entries
            .get(path)
            .filter(|entry| entry.hash == hash)
            .map(|entry| entry.findings.as_slice())
    }

    /// Insert unless the cache is full; replacing an existing path always works.
    pub fn insert(&mut self, path: PathBuf, hash: String, findings: Vec<Finding>) {
        if !self.entries.contains_key(&path) && self.entries.len() >= self.max_entries {
            return;
        }
        self.entries.insert(path, CachedFile { hash, findings });
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// The work directory manager
#[derive(Debug, Clone)]
pub struct WorkDir {
    project_root: PathBuf,
    dir: PathBuf,
}

struct WorkLock {
    file: std::fs::File,
}

impl Drop for WorkLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl WorkDir {
    pub fn new(project_root: &Path, name: &str) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            dir: project_root.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.join(CACHE_DIR)
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.dir.join(DIAGNOSTICS_DIR)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.dir.join(BACKUPS_DIR)
    }

    pub fn recovery_plan_path(&self) -> PathBuf {
        self.dir.join(RECOVERY_PLAN_FILE)
    }

    pub fn success_log_path(&self) -> PathBuf {
        self.dir.join(SUCCESS_LOG_FILE)
    }

    /// Ensure the work directory exists
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            self.ensure_ignored();
        }
        Ok(())
    }

    /// Keep the work dir out of version control without touching tracked files.
    fn ensure_ignored(&self) {
        let git_dir = self.project_root.join(".git");
        if !git_dir.is_dir() {
            return;
        }
        let Some(name) = self.dir.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let exclude_path = git_dir.join("info").join("exclude");
        if let Some(parent) = exclude_path.parent() {
            if fs::create_dir_all(parent).is_ok() {
                let _ = append_ignore_entry(&exclude_path, &format!("{}/", name));
            }
        }
    }

    fn lock(&self) -> anyhow::Result<WorkLock> {
        self.ensure_dir()?;

        let lock_path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // Lock file content doesn't matter, just the lock
            .open(&lock_path)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(err.into());
                    }
                    if start.elapsed() >= StdDuration::from_secs(LOCK_TIMEOUT_SECS) {
                        return Err(anyhow::anyhow!(
                            "Timed out waiting for work dir lock ({}s)",
                            LOCK_TIMEOUT_SECS
                        ));
                    }
                    std::thread::sleep(StdDuration::from_millis(LOCK_RETRY_MS));
                }
            }
        }

        Ok(WorkLock { file })
    }

    /// Delete the cache directory and recreate it empty.
    pub fn purge_cache(&self) -> anyhow::Result<()> {
        let dir = self.cache_dir();
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::create_dir_all(&dir)?;
        Ok(())
    }

    pub fn load_finding_cache(&self, max_entries: usize) -> FindingCache {
        let path = self.cache_dir().join(FINDINGS_CACHE_FILE);
        let mut cache: FindingCache = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        cache.max_entries = max_entries;
        if cache.entries.len() > max_entries {
            cache.clear();
        }
        cache
    }

    pub fn save_finding_cache(&self, cache: &FindingCache) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let dir = self.cache_dir();
        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir.join(FINDINGS_CACHE_FILE), cache)
    }

    /// Write a diagnostic dump to its own file and return the path.
    pub fn write_diagnostic(&self, dump: &DiagnosticDump) -> anyhow::Result<PathBuf> {
        self.ensure_dir()?;
        let dir = self.diagnostics_dir();
        fs::create_dir_all(&dir)?;
        let id = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}-{}-{}.json",
            dump.timestamp.format("%Y%m%dT%H%M%S%.3fZ"),
            dump.strategy,
            &id[..8]
        );
        let path = dir.join(name);
        write_json_atomic(&path, dump)?;
        Ok(path)
    }

    /// Append an entry to the success log.
    pub fn append_success(&self, operation: &str, result_summary: &str) -> anyhow::Result<()> {
        let _lock = self.lock()?;
        let mut entries = self.load_success_log();
        entries.push(SuccessEntry {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            result_summary: result_summary.to_string(),
        });
        write_json_atomic(&self.success_log_path(), &entries)
    }

    pub fn load_success_log(&self) -> Vec<SuccessEntry> {
        fs::read_to_string(self.success_log_path())
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }
}

fn append_ignore_entry(path: &Path, entry: &str) -> anyhow::Result<()> {
    let content = fs::read_to_string(path).unwrap_or_default();
    let already_present = content.lines().any(|line| line.trim() == entry);
    if already_present {
        return Ok(());
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    use std::io::Write;
    if !content.trim().is_empty() && !content.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "# rendermedic work dir")?;
    writeln!(file, "{}", entry)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    write_atomic(path, &content)
}

/// Write content atomically by writing to a temp file first, then renaming.
///
/// On Windows `rename()` fails if the destination exists, so the old file is
/// removed first; that window is not atomic.
pub fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = crate::util::with_suffix(path, ".tmp");
    fs::write(&tmp_path, content)?;

    #[cfg(windows)]
    {
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;

    #[test]
    fn purge_cache_recreates_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path(), ".rendermedic");
        let mut cache = FindingCache::new(10);
        cache.insert(PathBuf::from("src/a.ts"), "h".to_string(), Vec::new());
        work.save_finding_cache(&cache).unwrap();
        assert!(work.cache_dir().join(FINDINGS_CACHE_FILE).exists());

        work.purge_cache().unwrap();
        assert!(work.cache_dir().is_dir());
        assert_eq!(fs::read_dir(work.cache_dir()).unwrap().count(), 0);

        // Purging a cache that never existed also works
        let fresh = WorkDir::new(dir.path(), ".other");
        fresh.purge_cache().unwrap();
        assert!(fresh.cache_dir().is_dir());
    }

    #[test]
    fn finding_cache_round_trips_and_respects_hash_and_bound() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path(), ".rendermedic");
        let finding = Finding::new("stray_text", "src/a.ts", Severity::High, "x").with_line(2);

        let mut cache = FindingCache::new(1);
        cache.insert(PathBuf::from("src/a.ts"), "h1".to_string(), vec![finding.clone()]);
        cache.insert(PathBuf::from("src/b.ts"), "h2".to_string(), Vec::new());
        assert_eq!(cache.len(), 1);
        work.save_finding_cache(&cache).unwrap();

        let loaded = work.load_finding_cache(1);
        assert_eq!(loaded.get(Path::new("src/a.ts"), "h1"), Some(&[finding][..]));
        assert!(loaded.get(Path::new("src/a.ts"), "other").is_none());
    }

    #[test]
    fn success_log_is_an_appended_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path(), ".rendermedic");
        work.append_success("scan", "first").unwrap();
        work.append_success("repair", "second").unwrap();

        let raw = fs::read_to_string(work.success_log_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["operation"], "scan");
        assert_eq!(rows[1]["result_summary"], "second");
        assert!(rows[1]["timestamp"].is_string());
    }

    #[test]
    fn diagnostics_get_one_file_each() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path(), ".rendermedic");
        let dump = DiagnosticDump {
            timestamp: Utc::now(),
            strategy: "syntax_tree".to_string(),
            error: "boom".to_string(),
            stack: "boom".to_string(),
        };
        let a = work.write_diagnostic(&dump).unwrap();
        let b = work.write_diagnostic(&dump).unwrap();
        assert_ne!(a, b);
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&a).unwrap()).unwrap();
        assert_eq!(value["strategy"], "syntax_tree");
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn work_dir_is_excluded_from_git() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        let work = WorkDir::new(dir.path(), ".rendermedic");
        work.ensure_dir().unwrap();
        let exclude = fs::read_to_string(dir.path().join(".git/info/exclude")).unwrap();
        assert!(exclude.lines().any(|l| l == ".rendermedic/"));
    }
}
