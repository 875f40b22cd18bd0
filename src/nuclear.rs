//! Nuclear fallback
//!
//! Runs only once every retry has failed. There is no analysis left to
//! trust, so it looks for a short list of known-bad lines in the entry
//! point files and comments them out. In dry-run mode the matches are only
//! reported. Anything it cannot do ends up as a rejected record; this never
//! returns an error.

use crate::cache::write_atomic;
use crate::config::Config;
use crate::engine::ReportMode;
use crate::finding::{Finding, FixKind, Severity};
use crate::fix::transform::split_ending;
use crate::fix::{backup_file, comment_out, is_comment, restore_backup, FixRecord, Verification};
use crate::index::ENTRY_POINT_FILES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name used for the synthetic "do it by hand" record
pub const MANUAL_INTERVENTION: &str = "manual_intervention_required";

/// Rejection reason for a match seen while writes are disabled
pub const NOT_WRITTEN: &str = "found, not written";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuclearReport {
    pub mode: ReportMode,
    pub records: Vec<FixRecord>,
    pub instructions: Vec<String>,
}

impl NuclearReport {
    pub fn applied(&self) -> usize {
        self.records.iter().filter(|r| r.applied).count()
    }
}

pub struct NuclearFallback {
    root: PathBuf,
    patterns: Vec<String>,
    backup_suffix: String,
    work_dir: String,
    dry_run: bool,
}

impl NuclearFallback {
    pub fn new(root: &Path, config: &Config) -> Self {
        Self {
            root: root.to_path_buf(),
            patterns: config.nuclear_patterns.clone(),
            backup_suffix: config.backup_suffix.clone(),
            work_dir: config.work_dir.clone(),
            dry_run: false,
        }
    }

    /// Report matching lines without touching any file.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(&self) -> NuclearReport {
        warn!("all scan attempts failed; entering nuclear fallback");

        let mut records = Vec::new();
        for rel in ENTRY_POINT_FILES {
            let path = self.root.join(rel);
            if !path.is_file() {
                continue;
            }
            records.extend(self.scrub(&path, rel));
        }

        let applied = records.iter().filter(|r| r.applied).count();
        let found = records
            .iter()
            .filter(|r| matches!(&r.verification, Verification::Rejected(reason) if reason == NOT_WRITTEN))
            .count();
        let instructions = if applied > 0 {
            info!("nuclear fallback commented out {} pattern(s)", applied);
            vec![
                "Known bad lines were commented out of the entry point.".to_string(),
                format!(
                    "Check that the app renders; originals are kept as *{} files.",
                    self.backup_suffix
                ),
                format!(
                    "Scan failures are recorded under {}/diagnostics.",
                    self.work_dir
                ),
            ]
        } else if found > 0 {
            info!("nuclear fallback found {} pattern(s); writes disabled", found);
            vec![
                "Known bad lines were found in the entry point; nothing was written."
                    .to_string(),
                "Comment out the listed lines, or run a full repair to do it automatically."
                    .to_string(),
                format!(
                    "Scan failures are recorded under {}/diagnostics.",
                    self.work_dir
                ),
            ]
        } else {
            let instructions = vec![
                "Automatic repair was not possible.".to_string(),
                "Open src/main.* or src/index.* and look for text outside of any code construct."
                    .to_string(),
                format!(
                    "Scan failures are recorded under {}/diagnostics.",
                    self.work_dir
                ),
            ];
            records.push(FixRecord::rejected(
                Finding::new(
                    MANUAL_INTERVENTION,
                    MANUAL_INTERVENTION,
                    Severity::High,
                    instructions.join(" "),
                ),
                "manual intervention required",
            ));
            instructions
        };

        NuclearReport {
            mode: ReportMode::NuclearFallback,
            records,
            instructions,
        }
    }

    /// Comment out exact-match pattern lines in one entry file.
    fn scrub(&self, path: &Path, rel: &str) -> Vec<FixRecord> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                return vec![FixRecord::rejected(
                    nuclear_finding(rel, "entry point unreadable", None),
                    format!("read failed: {}", e),
                )]
            }
        };

        let mut records = Vec::new();
        for pattern in self.patterns.iter().filter(|p| content.contains(p.as_str())) {
            let current = match fs::read_to_string(path) {
                Ok(current) => current,
                Err(e) => {
                    records.push(FixRecord::rejected(
                        nuclear_finding(rel, pattern, None),
                        format!("read failed: {}", e),
                    ));
                    continue;
                }
            };
            records.push(self.comment_pattern(path, rel, pattern, &current));
        }
        records
    }

    fn comment_pattern(&self, path: &Path, rel: &str, pattern: &str, content: &str) -> FixRecord {
        let mut first_line = None;
        let fixed: String = content
            .split_inclusive('\n')
            .enumerate()
            .map(|(i, line)| {
                let (body, ending) = split_ending(line);
                let text = body.trim();
                if text == pattern.trim() && !is_comment(text) {
                    if first_line.is_none() {
                        first_line = Some(i + 1);
                    }
                    format!("{}{}", comment_out(body), ending)
                } else {
                    line.to_string()
                }
            })
            .collect();

        let finding = nuclear_finding(rel, pattern, first_line);
        if first_line.is_none() {
            return FixRecord::rejected(finding, "pattern is not on a line of its own");
        }
        if self.dry_run {
            return FixRecord::rejected(finding, NOT_WRITTEN);
        }

        let backup_path = match backup_file(path, content, &self.backup_suffix) {
            Ok(backup) => backup,
            Err(reason) => return FixRecord::rejected(finding, reason),
        };
        if let Err(e) = write_atomic(path, &fixed) {
            let reason = match restore_backup(path, &backup_path) {
                Ok(()) => format!("write failed: {}; restored from backup", e),
                Err(restore) => format!("write failed: {}; {}", e, restore),
            };
            warn!("{}", reason);
            return FixRecord {
                finding,
                backup_path: Some(backup_path),
                applied: false,
                verification: Verification::Rejected(reason),
            };
        }

        info!("commented out '{}' in {}", pattern, rel);
        FixRecord {
            finding,
            backup_path: Some(backup_path),
            applied: true,
            verification: Verification::Verified,
        }
    }
}

fn nuclear_finding(rel: &str, pattern: &str, line: Option<usize>) -> Finding {
    let finding = Finding::new(
        "nuclear_fallback",
        rel,
        Severity::High,
        format!("known bad line '{}' in entry point", pattern),
    )
    .with_fix(FixKind::CommentLine);
    match line {
        Some(line) => finding.with_line(line),
        None => finding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn comments_out_core_providers() {
        let main = "import App from './App'\n  Core Providers\nrender(App)\n";
        let dir = project(&[("src/main.tsx", main)]);
        let report = NuclearFallback::new(dir.path(), &Config::default()).run();

        assert_eq!(report.mode, ReportMode::NuclearFallback);
        assert_eq!(report.applied(), 1);
        assert_eq!(report.records[0].finding.line(), Some(2));
        assert_eq!(
            fs::read_to_string(dir.path().join("src/main.tsx")).unwrap(),
            "import App from './App'\n  /* Core Providers */\nrender(App)\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("src/main.tsx.rendermedic.bak")).unwrap(),
            main
        );
    }

    #[test]
    fn nothing_to_do_asks_for_a_human() {
        let dir = project(&[("src/main.ts", "render(App)\n")]);
        let report = NuclearFallback::new(dir.path(), &Config::default()).run();

        assert_eq!(report.records.len(), 1);
        let record = &report.records[0];
        assert_eq!(record.file(), Path::new(MANUAL_INTERVENTION));
        assert!(!record.applied);
        assert!(!report.instructions.is_empty());
    }

    #[test]
    fn pattern_inside_code_is_left_alone() {
        let main = "const label = 'Core Providers'\n";
        let dir = project(&[("src/index.js", main)]);
        let report = NuclearFallback::new(dir.path(), &Config::default()).run();

        assert_eq!(report.applied(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("src/index.js")).unwrap(), main);
        assert!(report
            .records
            .iter()
            .any(|r| r.file() == Path::new(MANUAL_INTERVENTION)));
    }

    #[test]
    fn dry_run_reports_matches_without_writing() {
        let main = "import App from './App'\nCore Providers\nrender(App)\n";
        let dir = project(&[("src/main.tsx", main)]);
        let report = NuclearFallback::new(dir.path(), &Config::default())
            .dry_run(true)
            .run();

        assert_eq!(report.mode, ReportMode::NuclearFallback);
        assert_eq!(report.applied(), 0);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].finding.line(), Some(2));
        assert_eq!(
            report.records[0].verification,
            Verification::Rejected(NOT_WRITTEN.to_string())
        );
        assert!(report.records[0].backup_path.is_none());
        assert!(report.instructions[0].contains("nothing was written"));
        assert_eq!(fs::read_to_string(dir.path().join("src/main.tsx")).unwrap(), main);
        assert!(!dir.path().join("src/main.tsx.rendermedic.bak").exists());
    }

    #[test]
    fn failed_write_is_folded_into_a_record() {
        let main = "Core Providers\nrender(App)\n";
        let dir = project(&[("src/main.ts", main)]);
        fs::create_dir_all(dir.path().join("src/main.ts.tmp")).unwrap();
        let report = NuclearFallback::new(dir.path(), &Config::default()).run();

        assert_eq!(report.applied(), 0);
        let record = report
            .records
            .iter()
            .find(|r| r.file() == Path::new("src/main.ts"))
            .unwrap();
        match &record.verification {
            Verification::Rejected(reason) => assert!(reason.ends_with("restored from backup")),
            other => panic!("unexpected verification {:?}", other),
        }
        assert_eq!(fs::read_to_string(dir.path().join("src/main.ts")).unwrap(), main);
    }

    #[test]
    fn missing_project_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let report = NuclearFallback::new(&dir.path().join("gone"), &Config::default()).run();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.applied(), 0);
    }
}
