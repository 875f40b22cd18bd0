//! Error types for scanning and repair

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single analysis strategy.
///
/// Always recoverable: the chain executor records it and moves on to the
/// next, lower-fidelity strategy.
#[derive(Error, Debug)]
pub enum StrategyError {
    /// Nothing under the root that this strategy knows how to read
    #[error("no source files found under '{root}'")]
    NoSourceFiles { root: PathBuf },

    /// Every candidate file failed to read or parse
    #[error("all {failed} candidate files failed to {stage}")]
    AllFilesFailed { failed: usize, stage: &'static str },

    /// Strategy refuses to run in the current scan mode
    #[error("strategy declined to run in {mode} mode")]
    Declined { mode: &'static str },

    /// Parser grammar could not be loaded
    #[error("failed to load {language} grammar: {reason}")]
    Grammar {
        language: &'static str,
        reason: String,
    },

    /// I/O error outside of per-file reads (e.g. walking the tree)
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Every strategy in the chain failed.
#[derive(Error, Debug)]
#[error("all {attempted} strategies failed; last was '{strategy}': {last}")]
pub struct ChainExhausted {
    pub attempted: usize,
    pub strategy: String,
    #[source]
    pub last: StrategyError,
}

/// Errors that escape the repair engine.
///
/// Scan failures never show up here; they end in the nuclear fallback.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The project root itself cannot be read
    #[error("project root '{path}' is not readable: {source}")]
    FatalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A built-in detector pattern failed to compile
    #[error("invalid detector pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A fix transform could not produce a candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("finding has no line number")]
    MissingLine,

    #[error("line {line} is out of range (file has {len} lines)")]
    LineOutOfRange { line: usize, len: usize },

    #[error("line {line} is already a comment")]
    AlreadyApplied { line: usize },

    #[error("expected exactly one unclosed delimiter, found {found}")]
    NotSingleUnclosed { found: usize },
}

/// Render an error and its source chain, one cause per line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {}", cause));
        source = cause.source();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_includes_every_cause() {
        let err = ChainExhausted {
            attempted: 4,
            strategy: "file_metadata".to_string(),
            last: StrategyError::Io {
                path: PathBuf::from("/nope"),
                source: io::Error::new(io::ErrorKind::NotFound, "gone"),
            },
        };
        let rendered = error_chain(&err);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("all 4 strategies failed"));
        assert!(lines[1].contains("/nope"));
        assert_eq!(lines[2], "caused by: gone");
    }
}
