//! Tokenizer-level scan, for when tree-sitter is unavailable or declined

use super::{
    content_files, finish, mask_jsx_text_lines, read_source, run_detectors, ScanContext, Strategy,
};
use crate::error::StrategyError;
use crate::finding::{Finding, ScanResult, Severity};
use crate::index::Language;
use crate::lexer::{lex, LineMask};
use std::path::Path;

pub struct TokenScanStrategy;

impl Strategy for TokenScanStrategy {
    fn name(&self) -> &'static str {
        "token_scan"
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

            if file.language == Language::Html {
                findings.extend(run_detectors(ctx, file, &content, &LineMask::new()));
                examined += 1;
                continue;
            }
            if !file.language.is_script() {
                continue;
            }

            let lexed = lex(&content);
            if lexed.unterminated_block_comment {
                findings.push(Finding::new(
                    "unterminated_comment",
                    &file.relative,
                    Severity::High,
                    "block comment runs to end of file",
                ));
            }

            let mut mask = lexed.non_code;
            mask_jsx_text_lines(&content, &mut mask);
            findings.extend(run_detectors(ctx, file, &content, &mask));
            examined += 1;
        }

        finish(self.name(), findings, examined, failed, "read")
    }
}
