//! Line-by-line regex heuristics
//!
//! Makes no attempt to understand strings or nesting. Block comments are
//! tracked by their delimiters and `//` lines are skipped; everything else
//! goes to the detectors.

use super::{
    content_files, finish, mask_jsx_text_lines, read_source, run_detectors, ScanContext, Strategy,
};
use crate::error::StrategyError;
use crate::finding::ScanResult;
use crate::index::Language;
use crate::lexer::LineMask;
use regex::Regex;
use std::path::Path;

pub struct LinePatternStrategy {
    line_comment: Regex,
    block_open: Regex,
    block_close: Regex,
}

impl LinePatternStrategy {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            line_comment: Regex::new(r"^\s*//")?,
            block_open: Regex::new(r"/\*")?,
            block_close: Regex::new(r"\*/")?,
        })
    }

    fn comment_mask(&self, content: &str) -> LineMask {
        let mut mask = LineMask::new();
        let mut in_block = false;

        for (i, line) in content.lines().enumerate() {
            let n = i + 1;
            if in_block {
                mask.insert(n);
                if self.block_close.is_match(line) {
                    in_block = false;
                }
                continue;
            }
            if self.line_comment.is_match(line) {
                mask.insert(n);
                continue;
            }
            if let Some(open) = self.block_open.find(line) {
                let rest = &line[open.end()..];
                if !self.block_close.is_match(rest) {
                    in_block = true;
                }
                if line[..open.start()].trim().is_empty() {
                    mask.insert(n);
                }
            }
        }
        mask
    }
}

impl Strategy for LinePatternStrategy {
    fn name(&self) -> &'static str {
        "line_pattern"
    }

    fn scan(&mut self, root: &Path, ctx: &mut ScanContext) -> Result<ScanResult, StrategyError> {
        let files = content_files(root)?;
        let mut findings = Vec::new();
        let (mut examined, mut failed) = (0, 0);

        for file in &files {
            let Some(content) = read_source(file, ctx.max_file_bytes) else {
                failed += 1;
                continue;
            };

            let mask = match file.language {
                Language::Html => LineMask::new(),
                l if l.is_script() => {
                    let mut mask = self.comment_mask(&content);
                    mask_jsx_text_lines(&content, &mut mask);
                    mask
                }
                _ => continue,
            };
            findings.extend(run_detectors(ctx, file, &content, &mask));
            examined += 1;
        }

        finish(self.name(), findings, examined, failed, "read")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_and_line_comments_are_masked() {
        let strategy = LinePatternStrategy::new().unwrap();
        let mask = strategy.comment_mask(
            "const a = 1\n/* start\nCore Providers\nend */\n// note here\nconst b = 2 /* trailing */\n/* Core Providers */\n",
        );
        assert!(!mask.contains(1));
        assert!(mask.contains(2));
        assert!(mask.contains(3));
        assert!(mask.contains(4));
        assert!(mask.contains(5));
        assert!(!mask.contains(6));
        assert!(mask.contains(7));
    }

    #[test]
    fn scans_scripts_with_the_shared_detectors() {
        use crate::cache::WorkDir;
        use crate::config::Config;
        use std::fs;

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/main.jsx"),
            "import App from './App'\nCore Providers\nrender(App)\n",
        )
        .unwrap();
        let config = Config::default();
        let mut ctx =
            ScanContext::new(&config, WorkDir::new(dir.path(), &config.work_dir)).unwrap();

        let mut strategy = LinePatternStrategy::new().unwrap();
        let result = strategy.scan(dir.path(), &mut ctx).unwrap();
        assert_eq!(result.strategy_name, "line_pattern");
        assert_eq!(result.files_examined, 1);
        assert!(result
            .findings
            .iter()
            .any(|f| f.kind() == "stray_text" && f.line() == Some(2)));
    }
}
