//! Fix transforms
//!
//! Pure functions from the current file content to a candidate. A
//! candidate also declares the delimiter shift it intends, so the verifier
//! can tell an intended closer from an accidental one.

use crate::error::TransformError;
use crate::finding::{Finding, FixKind};
use crate::lexer::{lex, Balance};
use std::collections::BTreeMap;

/// Proposed new content for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub content: String,
    /// Balance change the edit is meant to cause
    pub expected_shift: Balance,
}

pub type TransformFn = fn(&str, &Finding) -> Result<Candidate, TransformError>;

/// Registered transform for every allow-listed fix kind
pub fn registry() -> BTreeMap<FixKind, TransformFn> {
    let mut transforms: BTreeMap<FixKind, TransformFn> = BTreeMap::new();
    transforms.insert(FixKind::CommentLine, comment_line);
    transforms.insert(FixKind::InsertMissingDelimiter, insert_missing_delimiter);
    transforms
}

/// Is `text` (already trimmed) a comment on its own?
pub fn is_comment(text: &str) -> bool {
    text.starts_with("//") || (text.starts_with("/*") && text.ends_with("*/"))
}

/// Comment out one line's text, keeping its indentation.
pub fn comment_out(line: &str) -> String {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, text) = line.split_at(indent_len);
    let text = text.trim_end();
    if text.contains("*/") {
        format!("{}// {}", indent, text)
    } else {
        format!("{}/* {} */", indent, text)
    }
}

/// Split off the line terminator so edits keep CRLF files intact.
pub(crate) fn split_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

pub fn comment_line(content: &str, finding: &Finding) -> Result<Candidate, TransformError> {
    let target = finding.line().ok_or(TransformError::MissingLine)?;
    let mut lines: Vec<String> = content.split_inclusive('\n').map(String::from).collect();
    if target == 0 || target > lines.len() {
        return Err(TransformError::LineOutOfRange {
            line: target,
            len: lines.len(),
        });
    }

    let (body, ending) = split_ending(&lines[target - 1]);
    if is_comment(body.trim()) {
        return Err(TransformError::AlreadyApplied { line: target });
    }
    lines[target - 1] = format!("{}{}", comment_out(body), ending);

    Ok(Candidate {
        content: lines.concat(),
        expected_shift: Balance::zero(),
    })
}

pub fn insert_missing_delimiter(
    content: &str,
    _finding: &Finding,
) -> Result<Candidate, TransformError> {
    let lexed = lex(content);
    let [(delim, _)] = lexed.unclosed.as_slice() else {
        return Err(TransformError::NotSingleUnclosed {
            found: lexed.unclosed.len(),
        });
    };

    let mut fixed = content.to_string();
    if !fixed.is_empty() && !fixed.ends_with('\n') {
        fixed.push('\n');
    }
    fixed.push(delim.close());
    fixed.push('\n');

    Ok(Candidate {
        content: fixed,
        expected_shift: Balance::closing(*delim),
    })
}
