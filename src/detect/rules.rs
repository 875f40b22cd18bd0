//! Built-in detection rules
//!
//! Intentionally minimal: only the defects that blank a rendered app and
//! can be recognized without understanding the program.

use super::{Detector, SourceText};
use crate::finding::{Finding, FixKind, Severity};
use crate::index::{is_entry_point, is_root_document, Language};
use crate::lexer::lex;
use crate::util::truncate;
use regex::Regex;

/// Words that make a bare line a statement rather than stray prose
const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "class", "const", "declare", "default", "delete",
    "enum", "export", "extends", "from", "function", "implements", "import", "in",
    "instanceof", "interface", "let", "module", "namespace", "new", "of", "return", "throw",
    "type", "typeof", "var", "void", "yield",
];

/// A bare line of words: letters and digits only, at least two words, no
/// punctuation and no keyword.
pub fn is_stray_prose(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > 120 {
        return false;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() < 2 {
        return false;
    }
    let starts_alpha = trimmed
        .chars()
        .next()
        .map(|c| c.is_alphabetic())
        .unwrap_or(false);
    starts_alpha
        && words
            .iter()
            .all(|w| w.chars().all(|c| c.is_alphanumeric()) && !KEYWORDS.contains(w))
}

/// Plain text left in a script outside any code construct
pub struct StrayTextDetector;

impl Detector for StrayTextDetector {
    fn name(&self) -> &'static str {
        "stray_text"
    }

    fn detect(&self, source: &SourceText<'_>) -> Vec<Finding> {
        if !source.language.is_script() {
            return Vec::new();
        }

        source
            .content
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(n, line)| !source.non_code.contains(*n) && is_stray_prose(line))
            .map(|(n, line)| {
                Finding::new(
                    "stray_text",
                    source.path,
                    Severity::High,
                    format!(
                        "stray text \"{}\" outside any code construct",
                        truncate(line.trim(), 60)
                    ),
                )
                .with_line(n)
                .with_fix(FixKind::CommentLine)
            })
            .collect()
    }
}

/// Exactly one bracket left open at end of file
pub struct UnclosedDelimiterDetector;

impl Detector for UnclosedDelimiterDetector {
    fn name(&self) -> &'static str {
        "unclosed_delimiter"
    }

    fn detect(&self, source: &SourceText<'_>) -> Vec<Finding> {
        if !source.language.is_script() {
            return Vec::new();
        }

        let lexed = lex(source.content);
        if lexed.unclosed.len() != 1 || !lexed.is_clean_apart_from_unclosed() {
            return Vec::new();
        }

        let (delim, line) = lexed.unclosed[0];
        vec![Finding::new(
            "unclosed_delimiter",
            source.path,
            Severity::High,
            format!("'{}' opened on line {} is never closed", delim.open(), line),
        )
        .with_line(line)
        .with_fix(FixKind::InsertMissingDelimiter)]
    }
}

/// Entry point that never mounts the app
pub struct MissingMountCallDetector {
    mount_call: Regex,
}

impl MissingMountCallDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            mount_call: Regex::new(r"\b(?:createRoot|hydrateRoot|render|createApp|mount)\s*\(")?,
        })
    }
}

impl Detector for MissingMountCallDetector {
    fn name(&self) -> &'static str {
        "missing_mount_call"
    }

    fn detect(&self, source: &SourceText<'_>) -> Vec<Finding> {
        if !is_entry_point(source.path) || self.mount_call.is_match(source.content) {
            return Vec::new();
        }
        vec![Finding::new(
            "missing_mount_call",
            source.path,
            Severity::High,
            "entry point never calls createRoot/render/hydrateRoot, so nothing is mounted",
        )]
    }
}

/// Root HTML document without a mount element
pub struct MissingRootElementDetector {
    root_id: Regex,
}

impl MissingRootElementDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            root_id: Regex::new(r#"(?i)\bid\s*=\s*["']?(?:root|app)(?:["'\s/>]|$)"#)?,
        })
    }
}

impl Detector for MissingRootElementDetector {
    fn name(&self) -> &'static str {
        "missing_root_element"
    }

    fn detect(&self, source: &SourceText<'_>) -> Vec<Finding> {
        if source.language != Language::Html
            || !is_root_document(source.path)
            || self.root_id.is_match(source.content)
        {
            return Vec::new();
        }
        vec![Finding::new(
            "missing_root_element",
            source.path,
            Severity::Medium,
            "no element with id=\"root\" or id=\"app\" to mount into",
        )]
    }
}
