//! Repair session
//!
//! One call to [`RepairSession::run`] is one session: snapshot, scan with
//! retries, fix (or fall back), then write the recovery plan. A snapshot
//! that cannot be written downgrades the session to scan only. The session
//! never prints; rendering the report is the caller's business.

use crate::backup::{BackupManager, PlanStatus, RecoveryPlan};
use crate::cache::WorkDir;
use crate::config::Config;
use crate::error::EngineError;
use crate::finding::{ScanResult, Severity};
use crate::fix::{FixRecord, SafeFixManager};
use crate::nuclear::NuclearFallback;
use crate::retry::{Attempt, RetryController, RetryOutcome};
use crate::strategy::{ScanContext, StrategyChain};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    ScanAndRepair,
    ScanOnly,
    NuclearFallback,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::ScanAndRepair => "scan_and_repair",
            ReportMode::ScanOnly => "scan_only",
            ReportMode::NuclearFallback => "nuclear_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub mode: ReportMode,
    pub project: PathBuf,
    pub scan: Option<ScanResult>,
    pub attempts: Vec<Attempt>,
    pub fixes: Vec<FixRecord>,
    pub plan: RecoveryPlan,
    pub instructions: Vec<String>,
}

impl RepairReport {
    /// High severity findings without an applied fix
    pub fn unresolved_high(&self) -> usize {
        let Some(scan) = &self.scan else {
            return self.fixes.iter().filter(|r| !r.applied).count();
        };
        scan.findings
            .iter()
            .filter(|f| f.severity() == Severity::High)
            .filter(|f| !self.fixes.iter().any(|r| r.applied && &r.finding == *f))
            .count()
    }

    pub fn needs_attention(&self) -> bool {
        self.plan.status == PlanStatus::ManualInterventionRequired || self.unresolved_high() > 0
    }

    pub fn summary(&self) -> String {
        let applied = self.fixes.iter().filter(|r| r.applied).count();
        format!(
            "{}: {} attempt(s), {} fix(es) applied, {} unresolved, plan {}",
            self.mode.as_str(),
            self.attempts.len(),
            applied,
            self.unresolved_high(),
            self.plan.status.as_str()
        )
    }
}

pub struct RepairSession {
    config: Config,
    scan_only: bool,
    sleeper: fn(Duration),
    chain: Option<StrategyChain>,
}

impl RepairSession {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            scan_only: false,
            sleeper: std::thread::sleep,
            chain: None,
        }
    }

    pub fn scan_only(mut self, scan_only: bool) -> Self {
        self.scan_only = scan_only;
        self
    }

    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Use a custom strategy chain instead of the built-in one.
    pub fn with_chain(mut self, chain: StrategyChain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn run(self, root: &Path) -> Result<RepairReport, EngineError> {
        fs::read_dir(root).map_err(|source| EngineError::FatalIo {
            path: root.to_path_buf(),
            source,
        })?;

        let config = self.config;
        let work = WorkDir::new(root, &config.work_dir);
        let backups = BackupManager::new(work.clone());
        // Without a snapshot there is no undo, so the session only scans.
        let manifest = match backups.create_snapshot(&config.critical_paths) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(
                    "could not snapshot critical files into {}: {:#}",
                    work.backups_dir().display(),
                    e
                );
                None
            }
        };
        let writes_allowed = !self.scan_only && manifest.is_some();

        let chain = match self.chain {
            Some(chain) => chain,
            None => StrategyChain::builtin()?,
        };
        debug!("strategy chain: {}", chain.names().join(" -> "));
        let ctx = ScanContext::new(&config, work.clone())?;
        debug!("detectors: {}", ctx.detectors.names().join(", "));
        let mut controller = RetryController::new(
            chain,
            ctx,
            &config,
            NuclearFallback::new(root, &config).dry_run(!writes_allowed),
        )
        .with_sleeper(self.sleeper);

        let outcome = controller.run(root);
        let attempts = controller.attempts().to_vec();

        let (mode, scan, fixes, mut instructions) = match outcome {
            RetryOutcome::Succeeded(scan) if self.scan_only => {
                (ReportMode::ScanOnly, Some(scan), Vec::new(), Vec::new())
            }
            RetryOutcome::Succeeded(scan) if !writes_allowed => {
                (ReportMode::ScanAndRepair, Some(scan), Vec::new(), Vec::new())
            }
            RetryOutcome::Succeeded(scan) => {
                let fixes = SafeFixManager::new(root, &config.backup_suffix).apply_all(&scan.findings);
                (ReportMode::ScanAndRepair, Some(scan), fixes, Vec::new())
            }
            RetryOutcome::Fallback(report) => (
                ReportMode::NuclearFallback,
                None,
                report.records,
                report.instructions,
            ),
        };

        let plan = match &manifest {
            Some(manifest) => backups.build_recovery_plan(manifest, &fixes),
            None => {
                instructions.insert(
                    0,
                    format!(
                        "Critical files could not be backed up into {}; no file was modified.",
                        work.backups_dir().display()
                    ),
                );
                backups.unprotected_plan(&fixes)
            }
        };
        if let Err(e) = backups.save_plan(&plan) {
            warn!("could not write recovery plan: {}", e);
        }

        let report = RepairReport {
            mode,
            project: root.to_path_buf(),
            scan,
            attempts,
            fixes,
            plan,
            instructions,
        };
        let summary = report.summary();
        if let Err(e) = work.append_success("repair", &summary) {
            warn!("could not append to success log: {}", e);
        }
        info!("{}", summary);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_sleep(_: Duration) {}

    #[test]
    fn unreadable_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = RepairSession::new(Config::default()).run(&dir.path().join("missing"));
        assert!(matches!(result, Err(EngineError::FatalIo { .. })));
    }

    #[test]
    fn scan_only_never_writes_fixes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let main = "import App from './App'\nCore Providers\nrender(App)\n";
        fs::write(dir.path().join("src/main.ts"), main).unwrap();

        let report = RepairSession::new(Config::default())
            .scan_only(true)
            .with_sleeper(no_sleep)
            .run(dir.path())
            .unwrap();

        assert_eq!(report.mode, ReportMode::ScanOnly);
        assert!(report.fixes.is_empty());
        assert!(report.needs_attention());
        assert_eq!(fs::read_to_string(dir.path().join("src/main.ts")).unwrap(), main);
        assert_eq!(report.plan.status, PlanStatus::NoChanges);
    }

    #[test]
    fn failed_snapshot_downgrades_to_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let main = "import App from './App'\nCore Providers\ncreateRoot(el).render(App)\n";
        fs::write(dir.path().join("src/main.ts"), main).unwrap();
        // A plain file where the work dir should be makes the snapshot fail
        fs::write(dir.path().join(".rendermedic"), "").unwrap();

        for scan_only in [false, true] {
            let report = RepairSession::new(Config::default())
                .scan_only(scan_only)
                .with_sleeper(no_sleep)
                .run(dir.path())
                .unwrap();

            assert!(report.scan.is_some());
            assert!(report.fixes.iter().all(|r| !r.applied));
            assert_eq!(report.plan.status, PlanStatus::ManualInterventionRequired);
            assert!(!report.plan.rollback.possible);
            assert!(report.needs_attention());
            assert!(report.instructions[0].contains("could not be backed up"));
            assert_eq!(fs::read_to_string(dir.path().join("src/main.ts")).unwrap(), main);
            assert!(!dir.path().join("src/main.ts.rendermedic.bak").exists());
        }
    }

    #[test]
    fn report_mode_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReportMode::NuclearFallback).unwrap(),
            "\"nuclear_fallback\""
        );
        assert_eq!(
            serde_json::to_string(&ReportMode::ScanAndRepair).unwrap(),
            "\"scan_and_repair\""
        );
    }
}
