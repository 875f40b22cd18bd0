//! Last resort: judge the project from file names and sizes alone

use super::{ScanContext, Strategy};
use crate::error::StrategyError;
use crate::finding::{Finding, ScanResult, Severity};
use crate::index::{discover, is_entry_point, is_root_document};
use std::path::Path;

pub struct FileMetadataStrategy;

impl Strategy for FileMetadataStrategy {
    fn name(&self) -> &'static str {
        "file_metadata"
    }

    fn scan(&mut self, root: &Path, _ctx: &mut ScanContext) -> Result<ScanResult, StrategyError> {
        let files = discover(root).map_err(|source| StrategyError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut findings: Vec<Finding> = files
            .iter()
            .filter(|f| f.language.is_script() && f.size == 0)
            .map(|f| {
                Finding::new(
                    "empty_source_file",
                    &f.relative,
                    Severity::Medium,
                    "source file is empty",
                )
            })
            .collect();

        if !files.iter().any(|f| is_entry_point(&f.relative)) {
            findings.push(Finding::new(
                "missing_entry_point",
                "src",
                Severity::High,
                "no src/main.* or src/index.* entry point",
            ));
        }
        if !files.iter().any(|f| is_root_document(&f.relative)) {
            findings.push(Finding::new(
                "missing_root_document",
                "index.html",
                Severity::Low,
                "no index.html at the project root or in public/",
            ));
        }

        Ok(ScanResult {
            strategy_name: self.name().to_string(),
            findings,
            files_examined: files.len(),
            files_failed: 0,
        })
    }
}
