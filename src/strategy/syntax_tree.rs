//! Highest-fidelity strategy: full tree-sitter parse per file

use super::{content_files, finish, read_source, run_detectors, ScanContext, ScanMode, Strategy};
use crate::error::StrategyError;
use crate::finding::{Finding, ScanResult, Severity};
use crate::index::Language;
use crate::lexer::LineMask;
use crate::util::hash_str;
use std::path::Path;
use tracing::debug;

pub struct SyntaxTreeStrategy;

impl Strategy for SyntaxTreeStrategy {
    fn name(&self) -> &'static str {
        "syntax_tree"
    }

    fn scan(&mut self, root: &Path, ctx: &mut ScanContext) -> Result<ScanResult, StrategyError> {
        if ctx.mode == ScanMode::Simple {
            return Err(StrategyError::Declined {
                mode: ctx.mode.as_str(),
            });
        }

        let files = content_files(root)?;
        let mut findings = Vec::new();
        let (mut examined, mut failed) = (0, 0);
        let mut cache_hits = 0;

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

            let hash = hash_str(&content);
            if let Some(cached) = ctx.cache.get(&file.relative, &hash) {
                findings.extend(cached.iter().cloned());
                examined += 1;
                cache_hits += 1;
                continue;
            }

            let Some(parsed) = ctx.parsers.parse(&content, file.language)? else {
                debug!(path = %file.relative.display(), "tree-sitter gave up");
                failed += 1;
                continue;
            };

            let mut file_findings = Vec::new();
            if parsed.has_error {
                let finding = Finding::new(
                    "syntax_error",
                    &file.relative,
                    Severity::Medium,
                    "parser reported a syntax error",
                );
                file_findings.push(match parsed.first_error_line {
                    Some(line) => finding.with_line(line),
                    None => finding,
                });
            }
            file_findings.extend(run_detectors(ctx, file, &content, &parsed.non_code));

            ctx.cache
                .insert(file.relative.clone(), hash, file_findings.clone());
            findings.extend(file_findings);
            examined += 1;
        }

        if cache_hits > 0 {
            debug!("{} of {} files served from cache", cache_hits, examined);
        }
        if ctx.cache.is_dirty() {
            match ctx.work.save_finding_cache(&ctx.cache) {
                Ok(()) => ctx.cache.mark_clean(),
                Err(err) => debug!("could not persist finding cache: {}", err),
            }
        }

        finish(self.name(), findings, examined, failed, "parse")
    }
}
