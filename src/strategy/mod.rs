//! Strategy chain executor
//!
//! Source trees worth scanning are often broken in exactly the way we are
//! looking for, so no single parser can be trusted to read them. The chain
//! tries strategies from highest to lowest fidelity and returns the first
//! result it gets. Each failure leaves a diagnostic dump behind for the
//! operator; the executor itself never reads those back.

mod line_pattern;
mod metadata;
mod syntax_tree;
mod token_scan;

pub use line_pattern::LinePatternStrategy;
pub use metadata::FileMetadataStrategy;
pub use syntax_tree::SyntaxTreeStrategy;
pub use token_scan::TokenScanStrategy;

use crate::cache::{DiagnosticDump, FindingCache, WorkDir};
use crate::config::Config;
use crate::detect::{DetectorSet, SourceText};
use crate::error::{error_chain, ChainExhausted, StrategyError};
use crate::finding::{Finding, ScanResult};
use crate::index::parser::ParserPool;
use crate::index::{discover, SourceFile};
use crate::lexer::LineMask;
use chrono::Utc;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Full,
    /// Skip expensive strategies; set by the retry controller
    Simple,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Full => "full",
            ScanMode::Simple => "simple",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state shared by strategies across attempts.
///
/// Owned by the retry controller, which is the only thing allowed to reset
/// pieces of it between attempts.
pub struct ScanContext {
    pub parsers: ParserPool,
    pub cache: FindingCache,
    pub mode: ScanMode,
    pub detectors: DetectorSet,
    pub work: WorkDir,
    pub max_file_bytes: u64,
}

impl ScanContext {
    pub fn new(config: &Config, work: WorkDir) -> Result<Self, regex::Error> {
        Ok(Self::with_detectors(config, work, DetectorSet::builtin()?))
    }

    pub fn with_detectors(config: &Config, work: WorkDir, detectors: DetectorSet) -> Self {
        Self {
            parsers: ParserPool::new(),
            cache: work.load_finding_cache(config.max_cache_entries),
            mode: ScanMode::Full,
            detectors,
            work,
            max_file_bytes: config.max_file_bytes,
        }
    }
}

pub trait Strategy {
    fn name(&self) -> &'static str;
    fn scan(&mut self, root: &Path, ctx: &mut ScanContext) -> Result<ScanResult, StrategyError>;
}

/// Ordered strategies, highest fidelity first.
pub struct StrategyChain {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// syntax tree -> tokenizer -> line patterns -> file metadata
    pub fn builtin() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            Box::new(SyntaxTreeStrategy),
            Box::new(TokenScanStrategy),
            Box::new(LinePatternStrategy::new()?),
            Box::new(FileMetadataStrategy),
        ]))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies in order until one succeeds.
    pub fn run(&mut self, root: &Path, ctx: &mut ScanContext) -> Result<ScanResult, ChainExhausted> {
        let mut last: Option<(&'static str, StrategyError)> = None;

        for strategy in self.strategies.iter_mut() {
            let name = strategy.name();
            match strategy.scan(root, ctx) {
                Ok(result) => {
                    if let Some((failed, _)) = &last {
                        info!(strategy = name, "fell back to {} after {} failed", name, failed);
                    }
                    debug!("{}", result.summary());
                    return Ok(result);
                }
                Err(err) => {
                    warn!(strategy = name, "strategy failed: {}", err);
                    record_diagnostic(&ctx.work, name, &err);
                    last = Some((name, err));
                }
            }
        }

        let (strategy, last) = last.unwrap_or((
            "<none>",
            StrategyError::Other("strategy chain is empty".to_string()),
        ));
        Err(ChainExhausted {
            attempted: self.strategies.len(),
            strategy: strategy.to_string(),
            last,
        })
    }
}

fn record_diagnostic(work: &WorkDir, strategy: &str, err: &StrategyError) {
    let dump = DiagnosticDump {
        timestamp: Utc::now(),
        strategy: strategy.to_string(),
        error: err.to_string(),
        stack: error_chain(err),
    };
    if let Err(write_err) = work.write_diagnostic(&dump) {
        warn!("could not write diagnostic dump: {}", write_err);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SHARED STRATEGY HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Discover files for a content strategy; fails when there is no script.
fn content_files(root: &Path) -> Result<Vec<SourceFile>, StrategyError> {
    let files = discover(root).map_err(|source| StrategyError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    if !files.iter().any(|f| f.language.is_script()) {
        return Err(StrategyError::NoSourceFiles {
            root: root.to_path_buf(),
        });
    }
    Ok(files)
}

fn read_source(file: &SourceFile, max_bytes: u64) -> Option<String> {
    if file.size > max_bytes {
        debug!(path = %file.relative.display(), "skipping oversized file ({} bytes)", file.size);
        return None;
    }
    match fs::read_to_string(&file.absolute) {
        Ok(content) => Some(content),
        Err(err) => {
            debug!(path = %file.relative.display(), "unreadable: {}", err);
            None
        }
    }
}

fn run_detectors(
    ctx: &ScanContext,
    file: &SourceFile,
    content: &str,
    non_code: &LineMask,
) -> Vec<Finding> {
    ctx.detectors.run(&SourceText {
        path: &file.relative,
        language: file.language,
        content,
        non_code,
    })
}

fn finish(
    name: &str,
    findings: Vec<Finding>,
    files_examined: usize,
    files_failed: usize,
    stage: &'static str,
) -> Result<ScanResult, StrategyError> {
    if files_examined == 0 && files_failed > 0 {
        return Err(StrategyError::AllFilesFailed {
            failed: files_failed,
            stage,
        });
    }
    Ok(ScanResult {
        strategy_name: name.to_string(),
        findings,
        files_examined,
        files_failed,
    })
}

/// Mask lines that sit directly inside JSX markup.
///
/// Without a real parser, a line right after one ending in `>` (an opening
/// tag) or right before one starting with `<` is treated as JSX text.
fn mask_jsx_text_lines(content: &str, mask: &mut LineMask) {
    let lines: Vec<&str> = content.lines().map(str::trim).collect();

    // next_code[i]: first non-blank line after line i
    let mut next_code: Vec<Option<&str>> = vec![None; lines.len()];
    let mut upcoming = None;
    for (i, line) in lines.iter().enumerate().rev() {
        next_code[i] = upcoming;
        if !line.is_empty() {
            upcoming = Some(*line);
        }
    }

    let mut prev_code: Option<&str> = None;
    for (i, line) in lines.iter().enumerate() {
        let after_tag = prev_code
            .map(|l| l.ends_with('>') && !l.ends_with("=>"))
            .unwrap_or(false);
        let before_tag = next_code[i].map(|l| l.starts_with('<')).unwrap_or(false);
        if after_tag || before_tag {
            mask.insert(i + 1);
        }
        if !line.is_empty() {
            prev_code = Some(*line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;

    struct Failing(&'static str);

    impl Strategy for Failing {
        fn name(&self) -> &'static str {
            self.0
        }
        fn scan(&mut self, _: &Path, _: &mut ScanContext) -> Result<ScanResult, StrategyError> {
            Err(StrategyError::Other(format!("{} broke", self.0)))
        }
    }

    struct Succeeding;

    impl Strategy for Succeeding {
        fn name(&self) -> &'static str {
            "metadata_only"
        }
        fn scan(&mut self, _: &Path, _: &mut ScanContext) -> Result<ScanResult, StrategyError> {
            Ok(ScanResult {
                strategy_name: "metadata_only".to_string(),
                findings: vec![Finding::new("f", "a", Severity::Low, "m")],
                files_examined: 1,
                files_failed: 0,
            })
        }
    }

    fn context(root: &Path) -> ScanContext {
        let config = Config::default();
        let work = WorkDir::new(root, &config.work_dir);
        ScanContext::new(&config, work).unwrap()
    }

    fn dump_count(ctx: &ScanContext) -> usize {
        fs::read_dir(ctx.work.diagnostics_dir())
            .map(|d| d.count())
            .unwrap_or(0)
    }

    #[test]
    fn lowest_fidelity_success_is_returned_with_one_dump_per_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let mut chain = StrategyChain::new(vec![
            Box::new(Failing("a")),
            Box::new(Failing("b")),
            Box::new(Failing("c")),
            Box::new(Succeeding),
        ]);

        let result = chain.run(dir.path(), &mut ctx).unwrap();
        assert_eq!(result.strategy_name, "metadata_only");
        assert_eq!(dump_count(&ctx), chain.len() - 1);
    }

    #[test]
    fn exhausted_chain_carries_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let mut chain = StrategyChain::new(vec![Box::new(Failing("a")), Box::new(Failing("b"))]);

        let err = chain.run(dir.path(), &mut ctx).unwrap_err();
        assert_eq!(err.attempted, 2);
        assert_eq!(err.strategy, "b");
        assert_eq!(err.last.to_string(), "b broke");
        assert_eq!(dump_count(&ctx), 2);

        let dump_path = fs::read_dir(ctx.work.diagnostics_dir())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let dump: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dump_path).unwrap()).unwrap();
        for key in ["timestamp", "strategy", "error", "stack"] {
            assert!(dump.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn empty_project_falls_through_to_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let mut chain = StrategyChain::builtin().unwrap();

        let result = chain.run(dir.path(), &mut ctx).unwrap();
        assert_eq!(result.strategy_name, "file_metadata");
        assert!(result
            .findings
            .iter()
            .any(|f| f.kind() == "missing_entry_point"));
        assert_eq!(dump_count(&ctx), 3);
    }

    #[test]
    fn jsx_heuristic_masks_text_between_tags() {
        let content = "return (\n  <div>\n    Core Providers\n  </div>\n)\nimport App from './App'\nLoose words here\nconst f = () =>\n";
        let mut mask = LineMask::new();
        mask_jsx_text_lines(content, &mut mask);
        assert!(mask.contains(3));
        assert!(!mask.contains(7));
    }

    #[test]
    fn jsx_heuristic_looks_past_blank_lines() {
        let mut content = String::from("<div>\n");
        content.push_str(&"\n".repeat(50_000));
        content.push_str("Hello there\n\n\n</div>\n");
        let mut mask = LineMask::new();
        mask_jsx_text_lines(&content, &mut mask);

        let text_line = 50_002;
        assert!(mask.contains(text_line));
        assert!(mask.contains(text_line + 1));
        assert!(!mask.contains(1));
    }
}
