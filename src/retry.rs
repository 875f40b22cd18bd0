//! Retry controller
//!
//! Runs the strategy chain up to `max_retries` times. Between failed
//! attempts it applies one recovery action from a fixed rotation, chosen by
//! attempt index alone. When every attempt has failed the nuclear fallback
//! takes over, so a scan failure never escapes as an error.

use crate::config::Config;
use crate::error::{error_chain, ChainExhausted};
use crate::finding::ScanResult;
use crate::nuclear::{NuclearFallback, NuclearReport};
use crate::strategy::{ScanContext, ScanMode, StrategyChain};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Running,
    Succeeded,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    PurgeCache,
    ReinitializeParsers,
    SimpleMode,
    Backoff,
}

impl RecoveryAction {
    /// Rotation applied after failed attempts 0, 1, 2, 3, 4, ...
    pub const POLICY: [RecoveryAction; 4] = [
        RecoveryAction::PurgeCache,
        RecoveryAction::ReinitializeParsers,
        RecoveryAction::SimpleMode,
        RecoveryAction::Backoff,
    ];

    pub fn for_attempt(index: usize) -> Self {
        Self::POLICY[index % Self::POLICY.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::PurgeCache => "purge_cache",
            RecoveryAction::ReinitializeParsers => "reinitialize_parsers",
            RecoveryAction::SimpleMode => "simple_mode",
            RecoveryAction::Backoff => "backoff",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linear backoff: `index * 2` seconds, capped.
pub fn backoff_delay(index: usize, max_secs: u64) -> Duration {
    let secs = (index as u64).saturating_mul(2).min(max_secs);
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { summary: String, findings: usize },
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub index: usize,
    pub strategy_used: Option<String>,
    pub outcome: AttemptOutcome,
    /// Action applied after this attempt, if any
    pub recovery: Option<RecoveryAction>,
}

/// Append-only attempt history, never longer than the retry budget.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    entries: Vec<Attempt>,
    cap: usize,
}

impl AttemptLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap.min(128)),
            cap,
        }
    }

    fn push(&mut self, attempt: Attempt) {
        if self.entries.len() < self.cap {
            self.entries.push(attempt);
        }
    }

    fn set_recovery(&mut self, action: RecoveryAction) {
        if let Some(last) = self.entries.last_mut() {
            last.recovery = Some(action);
        }
    }

    pub fn entries(&self) -> &[Attempt] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded(ScanResult),
    Fallback(NuclearReport),
}

pub struct RetryController {
    chain: StrategyChain,
    ctx: ScanContext,
    fallback: NuclearFallback,
    max_retries: usize,
    max_backoff_secs: u64,
    sleeper: fn(Duration),
    state: RetryState,
    log: AttemptLog,
}

impl RetryController {
    pub fn new(
        chain: StrategyChain,
        ctx: ScanContext,
        config: &Config,
        fallback: NuclearFallback,
    ) -> Self {
        let max_retries = config.max_retries.max(1);
        Self {
            chain,
            ctx,
            fallback,
            max_retries,
            max_backoff_secs: config.max_backoff_secs,
            sleeper: std::thread::sleep,
            state: RetryState::Idle,
            log: AttemptLog::new(max_retries),
        }
    }

    /// Replace the backoff sleep (tests pass a no-op).
    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn attempts(&self) -> &[Attempt] {
        self.log.entries()
    }

    pub fn context(&self) -> &ScanContext {
        &self.ctx
    }

    pub fn run(&mut self, root: &Path) -> RetryOutcome {
        self.state = RetryState::Running;
        self.log = AttemptLog::new(self.max_retries);

        for index in 0..self.max_retries {
            match self.chain.run(root, &mut self.ctx) {
                Ok(result) => {
                    let summary = result.summary();
                    self.log.push(Attempt {
                        index,
                        strategy_used: Some(result.strategy_name.clone()),
                        outcome: AttemptOutcome::Success {
                            summary: summary.clone(),
                            findings: result.findings.len(),
                        },
                        recovery: None,
                    });
                    if let Err(e) = self.ctx.work.append_success("scan", &summary) {
                        warn!("could not append to success log: {}", e);
                    }
                    info!(attempt = index + 1, "scan succeeded: {}", summary);
                    self.state = RetryState::Succeeded;
                    return RetryOutcome::Succeeded(result);
                }
                Err(err) => {
                    self.record_failure(index, &err);
                    if index + 1 < self.max_retries {
                        let action = RecoveryAction::for_attempt(index);
                        self.log.set_recovery(action);
                        self.recover(action, index);
                    }
                }
            }
        }

        self.state = RetryState::Exhausted;
        warn!("scan failed {} times", self.max_retries);
        RetryOutcome::Fallback(self.fallback.run())
    }

    fn record_failure(&mut self, index: usize, err: &ChainExhausted) {
        warn!(attempt = index + 1, max = self.max_retries, "{}", err);
        debug!("{}", error_chain(err));
        self.log.push(Attempt {
            index,
            strategy_used: None,
            outcome: AttemptOutcome::Failure {
                error: err.to_string(),
            },
            recovery: None,
        });
    }

    fn recover(&mut self, action: RecoveryAction, index: usize) {
        info!(attempt = index + 1, "recovery action: {}", action);
        match action {
            RecoveryAction::PurgeCache => {
                self.ctx.cache.clear();
                if let Err(e) = self.ctx.work.purge_cache() {
                    warn!("could not purge cache directory: {}", e);
                }
            }
            RecoveryAction::ReinitializeParsers => self.ctx.parsers.reset(),
            RecoveryAction::SimpleMode => self.ctx.mode = ScanMode::Simple,
            RecoveryAction::Backoff => {
                let delay = backoff_delay(index, self.max_backoff_secs);
                debug!("backing off for {:?}", delay);
                (self.sleeper)(delay);
            }
        }
    }
}
