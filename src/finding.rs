//! Findings and scan results
//!
//! A `Finding` is one structural defect reported by a detector or strategy.
//! Findings are immutable once built; strategies collect them into a
//! `ScanResult`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known mechanical remedies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    /// Wrap a stray line of text in a comment
    CommentLine,
    /// Append the closer for a single unclosed delimiter
    InsertMissingDelimiter,
}

impl FixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixKind::CommentLine => "comment_line",
            FixKind::InsertMissingDelimiter => "insert_missing_delimiter",
        }
    }
}

impl fmt::Display for FixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    kind: String,
    file_path: PathBuf,
    line: Option<usize>,
    severity: Severity,
    fix_kind: Option<FixKind>,
    message: String,
}

impl Finding {
    pub fn new(
        kind: impl Into<String>,
        file_path: impl Into<PathBuf>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            file_path: file_path.into(),
            line: None,
            severity,
            fix_kind: None,
            message: message.into(),
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_fix(mut self, fix_kind: FixKind) -> Self {
        self.fix_kind = Some(fix_kind);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Path relative to the project root
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// 1-based line number, when the defect has a location
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn fix_kind(&self) -> Option<FixKind> {
        self.fix_kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{}", self.file_path.display(), line),
            None => self.file_path.display().to_string(),
        }
    }
}

/// Output of one successful strategy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub strategy_name: String,
    pub findings: Vec<Finding>,
    pub files_examined: usize,
    pub files_failed: usize,
}

impl ScanResult {
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity() >= severity)
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} findings ({} high) in {} files, {} failed",
            self.strategy_name,
            self.findings.len(),
            self.count_at_least(Severity::High),
            self.files_examined,
            self.files_failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_high_last() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn finding_serializes_with_snake_case_enums() {
        let finding = Finding::new("stray_text", "src/main.tsx", Severity::High, "stray")
            .with_line(3)
            .with_fix(FixKind::CommentLine);
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["severity"], "high");
        assert_eq!(json["fix_kind"], "comment_line");
        assert_eq!(json["line"], 3);
        assert_eq!(finding.location(), "src/main.tsx:3");
    }
}
