//! Safe-fix transaction manager
//!
//! Applies only "ultra-safe" fixes: an allow-listed fix kind on a high
//! severity finding with a registered transform. Each fix is one
//! transaction per finding:
//!
//! 1. read the file as it is now
//! 2. compute the candidate
//! 3. verify it
//! 4. write the backup, then the file
//!
//! A failed write restores the file from the backup just made. There is no
//! `applied: true` record without a backup holding the pre-fix bytes.

pub mod transform;
pub mod verify;

pub use transform::{comment_out, is_comment, Candidate, TransformFn};
pub use verify::{DelimiterBalanceVerifier, Verifier};

use crate::cache::write_atomic;
use crate::error::TransformError;
use crate::finding::{Finding, FixKind, Severity};
use crate::util::{resolve_project_file, with_suffix};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fix kinds the manager is ever allowed to apply
pub const ALLOWED_FIXES: &[FixKind] = &[FixKind::CommentLine, FixKind::InsertMissingDelimiter];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Rejected(String),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }
}

/// Outcome of one attempted fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixRecord {
    pub finding: Finding,
    pub backup_path: Option<PathBuf>,
    pub applied: bool,
    pub verification: Verification,
}

impl FixRecord {
    pub fn rejected(finding: Finding, reason: impl Into<String>) -> Self {
        Self {
            finding,
            backup_path: None,
            applied: false,
            verification: Verification::Rejected(reason.into()),
        }
    }

    pub fn file(&self) -> &Path {
        self.finding.file_path()
    }
}

pub struct SafeFixManager {
    root: PathBuf,
    backup_suffix: String,
    transforms: BTreeMap<FixKind, TransformFn>,
    verifier: Box<dyn Verifier>,
}

impl SafeFixManager {
    pub fn new(root: &Path, backup_suffix: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            backup_suffix: backup_suffix.to_string(),
            transforms: transform::registry(),
            verifier: Box::new(DelimiterBalanceVerifier),
        }
    }

    pub fn with_verifier(mut self, verifier: Box<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn is_ultra_safe(&self, finding: &Finding) -> bool {
        match finding.fix_kind() {
            Some(kind) => {
                ALLOWED_FIXES.contains(&kind)
                    && finding.severity() == Severity::High
                    && self.transforms.contains_key(&kind)
            }
            None => false,
        }
    }

    /// Attempt every finding, file by file and bottom-up within a file.
    pub fn apply_all(&self, findings: &[Finding]) -> Vec<FixRecord> {
        let mut ordered: Vec<&Finding> = findings.iter().collect();
        ordered.sort_by_key(|f| (f.file_path().to_path_buf(), Reverse(f.line())));

        let records: Vec<FixRecord> = ordered.into_iter().map(|f| self.apply(f)).collect();
        let applied = records.iter().filter(|r| r.applied).count();
        if applied > 0 {
            info!("applied {} of {} fixes", applied, records.len());
        }
        records
    }

    pub fn apply(&self, finding: &Finding) -> FixRecord {
        let finding = finding.clone();
        let Some(transform) = finding
            .fix_kind()
            .filter(|_| self.is_ultra_safe(&finding))
            .and_then(|kind| self.transforms.get(&kind).copied())
        else {
            return FixRecord::rejected(finding, "not ultra-safe");
        };

        let path = match resolve_project_file(&self.root, finding.file_path()) {
            Ok(path) => path,
            Err(reason) => return FixRecord::rejected(finding, reason),
        };
        let original = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => return FixRecord::rejected(finding, format!("read failed: {}", e)),
        };

        let candidate = match transform(&original, &finding) {
            Ok(candidate) => candidate,
            Err(TransformError::AlreadyApplied { .. }) => {
                debug!("{} already fixed", finding.location());
                return FixRecord::rejected(finding, "already applied");
            }
            Err(e) => return FixRecord::rejected(finding, e.to_string()),
        };

        if let Err(reason) = self.verifier.verify(&original, &candidate) {
            info!(
                verifier = self.verifier.name(),
                "rejected fix for {}: {}",
                finding.location(),
                reason
            );
            return FixRecord::rejected(finding, reason);
        }

        let backup_path = match backup_file(&path, &original, &self.backup_suffix) {
            Ok(backup) => backup,
            Err(reason) => return FixRecord::rejected(finding, reason),
        };

        if let Err(reason) = commit(&path, &candidate.content) {
            let reason = match restore_backup(&path, &backup_path) {
                Ok(()) => format!("{}; restored from backup", reason),
                Err(restore) => {
                    warn!("{}", restore);
                    format!("{}; {}", reason, restore)
                }
            };
            warn!("rolled back fix for {}: {}", finding.location(), reason);
            return FixRecord {
                finding,
                backup_path: Some(backup_path),
                applied: false,
                verification: Verification::Rejected(reason),
            };
        }

        info!(
            "applied {} to {}",
            finding.fix_kind().map(|k| k.as_str()).unwrap_or("fix"),
            finding.location()
        );
        FixRecord {
            finding,
            backup_path: Some(backup_path),
            applied: true,
            verification: Verification::Verified,
        }
    }
}

/// First free backup path: `<file><suffix>`, then `<file><suffix>.2`, ...
pub fn next_backup_path(path: &Path, suffix: &str) -> PathBuf {
    let base = with_suffix(path, suffix);
    if !base.exists() {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = with_suffix(&base, &format!(".{}", n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Write `original` next to `path` and return where it went.
pub fn backup_file(path: &Path, original: &str, suffix: &str) -> Result<PathBuf, String> {
    let backup_path = next_backup_path(path, suffix);
    fs::write(&backup_path, original).map_err(|e| format!("Failed to create backup: {}", e))?;
    Ok(backup_path)
}

pub fn restore_backup(path: &Path, backup_path: &Path) -> Result<(), String> {
    fs::copy(backup_path, path)
        .map(|_| ())
        .map_err(|e| format!("Failed to restore backup: {}", e))
}

/// Write and read back; a mismatch counts as a failed write.
fn commit(path: &Path, content: &str) -> Result<(), String> {
    write_atomic(path, content).map_err(|e| format!("write failed: {}", e))?;
    match fs::read_to_string(path) {
        Ok(on_disk) if on_disk == content => Ok(()),
        Ok(_) => Err("content on disk differs from candidate".to_string()),
        Err(e) => Err(format!("read-back failed: {}", e)),
    }
}
