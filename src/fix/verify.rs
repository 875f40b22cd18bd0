//! Candidate verification
//!
//! Runs before anything touches disk. A verifier only ever says no; it never
//! edits the candidate.

use super::transform::Candidate;
use crate::lexer::lex;

pub trait Verifier {
    fn name(&self) -> &'static str;

    /// `Err(reason)` rejects the candidate.
    fn verify(&self, original: &str, candidate: &Candidate) -> Result<(), String>;
}

/// Structural check on delimiters and comments, with literals skipped.
pub struct DelimiterBalanceVerifier;

impl Verifier for DelimiterBalanceVerifier {
    fn name(&self) -> &'static str {
        "delimiter_balance"
    }

    fn verify(&self, original: &str, candidate: &Candidate) -> Result<(), String> {
        let before = lex(original);
        let after = lex(&candidate.content);

        if after.unterminated_block_comment && !before.unterminated_block_comment {
            return Err("candidate leaves a block comment unterminated".to_string());
        }

        let expected = before.balance + candidate.expected_shift;
        if after.balance != expected {
            return Err(format!(
                "delimiter balance {} does not match expected {}",
                after.balance, expected
            ));
        }
        Ok(())
    }
}
