//! Issue detectors
//!
//! A detector looks at one file's content and reports zero or more
//! findings. Detectors never touch the filesystem and never fail; input
//! they cannot make sense of yields no findings.
//!
//! Strategies hand detectors a [`SourceText`] whose `non_code` mask was
//! computed at the strategy's own fidelity, so the same rule gets more
//! precise when a real parser is available.

mod rules;

pub use rules::{
    is_stray_prose, MissingMountCallDetector, MissingRootElementDetector, StrayTextDetector,
    UnclosedDelimiterDetector,
};

use crate::finding::Finding;
use crate::index::Language;
use crate::lexer::LineMask;
use std::path::Path;

/// One file as presented to a detector
#[derive(Debug, Clone, Copy)]
pub struct SourceText<'a> {
    /// Path relative to the project root
    pub path: &'a Path,
    pub language: Language,
    pub content: &'a str,
    pub non_code: &'a LineMask,
}

pub trait Detector {
    fn name(&self) -> &'static str;
    fn detect(&self, source: &SourceText<'_>) -> Vec<Finding>;
}

/// Ordered set of detectors shared by every strategy.
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorSet {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// The rules shipped with the binary
    pub fn builtin() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            Box::new(StrayTextDetector),
            Box::new(UnclosedDelimiterDetector),
            Box::new(MissingMountCallDetector::new()?),
            Box::new(MissingRootElementDetector::new()?),
        ]))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn run(&self, source: &SourceText<'_>) -> Vec<Finding> {
        self.detectors
            .iter()
            .flat_map(|d| d.detect(source))
            .collect()
    }
}
