//! Session snapshots and recovery plans
//!
//! Before anything is scanned, the critical files of the project are copied
//! into `backups/<id>/files/` with a `manifest.json` next to them. After the
//! fixes run, a recovery plan ties every fix record to its backup and spells
//! out a shell command that undoes the session.

use crate::cache::{write_json_atomic, WorkDir};
use crate::fix::{FixRecord, Verification};
use crate::nuclear::{MANUAL_INTERVENTION, NOT_WRITTEN};
use crate::util::shell_quote;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";
const SNAPSHOT_FILES_DIR: &str = "files";

/// Reasons that mean "never tried" rather than "tried and failed"
const BENIGN_REJECTIONS: &[&str] = &["not ultra-safe", "already applied", NOT_WRITTEN];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub project: PathBuf,
    /// Snapshot contents, relative to the project root
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    NoChanges,
    Applied,
    Partial,
    ManualInterventionRequired,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::NoChanges => "no_changes",
            PlanStatus::Applied => "applied",
            PlanStatus::Partial => "partial",
            PlanStatus::ManualInterventionRequired => "manual_intervention_required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub file: PathBuf,
    pub action: String,
    pub backup_path: Option<PathBuf>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollback {
    pub possible: bool,
    pub backup_dir: PathBuf,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    pub id: String,
    pub backup_id: String,
    pub created: DateTime<Utc>,
    pub status: PlanStatus,
    pub steps: Vec<PlanStep>,
    pub rollback: Rollback,
}

/// `<yyyymmdd-hhmmss>-<8 hex>`
pub fn new_backup_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &suffix[..8])
}

/// Match a relative path against a critical-path pattern.
///
/// `dir/name.*` matches any file in `dir` whose stem is `name`; anything
/// else must match exactly.
pub fn matches_critical(pattern: &str, relative: &Path) -> bool {
    let pattern_path = Path::new(pattern);
    if pattern_path.parent() != relative.parent() {
        return false;
    }
    let Some(file_pattern) = pattern_path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    match file_pattern.strip_suffix(".*") {
        Some(stem) => relative.file_stem().and_then(|s| s.to_str()) == Some(stem),
        None => relative.file_name().and_then(|n| n.to_str()) == Some(file_pattern),
    }
}

pub struct BackupManager {
    work: WorkDir,
}

impl BackupManager {
    pub fn new(work: WorkDir) -> Self {
        Self { work }
    }

    pub fn snapshot_dir(&self, backup_id: &str) -> PathBuf {
        self.work.backups_dir().join(backup_id)
    }

    /// Existing files under the project root matching any pattern
    fn critical_files(&self, critical_paths: &[String]) -> Vec<PathBuf> {
        let root = self.work.project_root();
        let mut dirs: Vec<PathBuf> = critical_paths
            .iter()
            .map(|p| Path::new(p).parent().map(Path::to_path_buf).unwrap_or_default())
            .collect();
        dirs.sort();
        dirs.dedup();

        let mut found = Vec::new();
        for dir in dirs {
            let Ok(entries) = fs::read_dir(root.join(&dir)) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let relative = dir.join(entry.file_name());
                if critical_paths.iter().any(|p| matches_critical(p, &relative)) {
                    found.push(relative);
                }
            }
        }
        found.sort();
        found
    }

    /// Copy the critical files into a new snapshot and write its manifest.
    pub fn create_snapshot(&self, critical_paths: &[String]) -> Result<BackupManifest> {
        self.work.ensure_dir()?;
        let now = Utc::now();
        let id = new_backup_id(now);
        let snapshot = self.snapshot_dir(&id);
        let files_dir = snapshot.join(SNAPSHOT_FILES_DIR);
        fs::create_dir_all(&files_dir)
            .with_context(|| format!("Failed to create {}", files_dir.display()))?;

        let root = self.work.project_root();
        let files = self.critical_files(critical_paths);
        for rel in &files {
            let dest = files_dir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(root.join(rel), &dest)
                .with_context(|| format!("Failed to back up {}", rel.display()))?;
        }

        let manifest = BackupManifest {
            id,
            timestamp: now,
            project: root.to_path_buf(),
            files,
        };
        write_json_atomic(&snapshot.join(MANIFEST_FILE), &manifest)?;
        info!(backup = %manifest.id, "snapshot of {} critical files", manifest.files.len());
        Ok(manifest)
    }

    pub fn load_manifest(&self, backup_id: &str) -> Result<BackupManifest> {
        if backup_id.is_empty()
            || backup_id.contains(['/', '\\'])
            || backup_id.starts_with('.')
        {
            bail!("Invalid backup id: {}", backup_id);
        }
        let path = self.snapshot_dir(backup_id).join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("No backup manifest at {}", path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt backup manifest at {}", path.display()))?;
        Ok(manifest)
    }

    /// Copy every snapshot file back over the project. Returns what was restored.
    pub fn restore_snapshot(&self, manifest: &BackupManifest) -> Result<Vec<PathBuf>> {
        let files_dir = self.snapshot_dir(&manifest.id).join(SNAPSHOT_FILES_DIR);
        let root = self.work.project_root();
        let mut restored = Vec::new();
        for rel in &manifest.files {
            let target = root.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(files_dir.join(rel), &target)
                .with_context(|| format!("Failed to restore {}", rel.display()))?;
            debug!("restored {}", rel.display());
            restored.push(rel.clone());
        }
        info!(backup = %manifest.id, "restored {} files", restored.len());
        Ok(restored)
    }

    pub fn build_recovery_plan(
        &self,
        manifest: &BackupManifest,
        records: &[FixRecord],
    ) -> RecoveryPlan {
        let backup_dir = self.snapshot_dir(&manifest.id);
        // A file fixed twice has a numbered backup per fix; only the first
        // one holds the content from before the session.
        let mut restored = BTreeSet::new();
        let mut commands: Vec<String> = records
            .iter()
            .filter(|r| r.applied)
            .filter_map(|r| {
                let backup = r.backup_path.as_ref()?;
                if !restored.insert(r.file()) {
                    return None;
                }
                let target = self.work.project_root().join(r.file());
                Some(format!(
                    "cp {} {}",
                    shell_quote(&backup.to_string_lossy()),
                    shell_quote(&target.to_string_lossy())
                ))
            })
            .collect();
        if !manifest.files.is_empty() {
            commands.push(format!(
                "cp -R {} {}",
                shell_quote(&format!(
                    "{}/.",
                    backup_dir.join(SNAPSHOT_FILES_DIR).to_string_lossy()
                )),
                shell_quote(&format!("{}/", manifest.project.to_string_lossy()))
            ));
        }

        RecoveryPlan {
            id: Uuid::new_v4().to_string(),
            backup_id: manifest.id.clone(),
            created: Utc::now(),
            status: plan_status(records),
            steps: plan_steps(records),
            rollback: Rollback {
                possible: !commands.is_empty(),
                backup_dir,
                command: commands.join(" && "),
            },
        }
    }

    pub fn save_plan(&self, plan: &RecoveryPlan) -> Result<PathBuf> {
        self.work.ensure_dir()?;
        let path = self.work.recovery_plan_path();
        write_json_atomic(&path, plan)?;
        Ok(path)
    }

    /// Plan for a session whose snapshot could not be written. Nothing was
    /// modified, so there is nothing to roll back.
    pub fn unprotected_plan(&self, records: &[FixRecord]) -> RecoveryPlan {
        RecoveryPlan {
            id: Uuid::new_v4().to_string(),
            backup_id: String::new(),
            created: Utc::now(),
            status: PlanStatus::ManualInterventionRequired,
            steps: plan_steps(records),
            rollback: Rollback {
                possible: false,
                backup_dir: self.work.backups_dir(),
                command: String::new(),
            },
        }
    }
}

fn plan_steps(records: &[FixRecord]) -> Vec<PlanStep> {
    records
        .iter()
        .map(|r| PlanStep {
            file: r.file().to_path_buf(),
            action: if r.applied {
                r.finding
                    .fix_kind()
                    .map(|k| k.as_str().to_string())
                    .unwrap_or_else(|| r.finding.kind().to_string())
            } else {
                "skipped".to_string()
            },
            backup_path: r.backup_path.clone(),
            verified: r.verification.is_verified(),
        })
        .collect()
}

fn plan_status(records: &[FixRecord]) -> PlanStatus {
    if records.iter().any(|r| r.file() == Path::new(MANUAL_INTERVENTION)) {
        return PlanStatus::ManualInterventionRequired;
    }
    let applied = records.iter().filter(|r| r.applied).count();
    let failed = records
        .iter()
        .filter(|r| !r.applied)
        .filter(|r| match &r.verification {
            Verification::Rejected(reason) => {
                !BENIGN_REJECTIONS.contains(&reason.as_str())
            }
            Verification::Verified => true,
        })
        .count();

    match (applied, failed) {
        (0, 0) => PlanStatus::NoChanges,
        (_, 0) => PlanStatus::Applied,
        (0, _) => PlanStatus::ManualInterventionRequired,
        _ => PlanStatus::Partial,
    }
}
