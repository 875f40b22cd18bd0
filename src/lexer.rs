//! Reduced-grammar tokenizer for JavaScript/TypeScript sources
//!
//! Tracks only comments, string and template literals, and the three
//! bracket pairs. It never fails: malformed input just shows up in the
//! counters (`unterminated_*`, `mismatched`), which is exactly what the
//! detectors and the fix verifier look at.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Add;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delimiter {
    Brace,
    Paren,
    Bracket,
}

impl Delimiter {
    pub fn from_open(c: char) -> Option<Self> {
        match c {
            '{' => Some(Delimiter::Brace),
            '(' => Some(Delimiter::Paren),
            '[' => Some(Delimiter::Bracket),
            _ => None,
        }
    }

    pub fn from_close(c: char) -> Option<Self> {
        match c {
            '}' => Some(Delimiter::Brace),
            ')' => Some(Delimiter::Paren),
            ']' => Some(Delimiter::Bracket),
            _ => None,
        }
    }

    pub fn open(&self) -> char {
        match self {
            Delimiter::Brace => '{',
            Delimiter::Paren => '(',
            Delimiter::Bracket => '[',
        }
    }

    pub fn close(&self) -> char {
        match self {
            Delimiter::Brace => '}',
            Delimiter::Paren => ')',
            Delimiter::Bracket => ']',
        }
    }
}

/// Net open-minus-close count per delimiter pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub braces: i64,
    pub parens: i64,
    pub brackets: i64,
}

impl Balance {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Balance shift caused by inserting one closer for `delim`
    pub fn closing(delim: Delimiter) -> Self {
        let mut shift = Self::zero();
        shift.bump(delim, -1);
        shift
    }

    pub fn bump(&mut self, delim: Delimiter, delta: i64) {
        match delim {
            Delimiter::Brace => self.braces += delta,
            Delimiter::Paren => self.parens += delta,
            Delimiter::Bracket => self.brackets += delta,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Balance {
        Balance {
            braces: self.braces + rhs.braces,
            parens: self.parens + rhs.parens,
            brackets: self.brackets + rhs.brackets,
        }
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{}}={} ()={} []={}",
            self.braces, self.parens, self.brackets
        )
    }
}

/// Set of 1-based line numbers known not to contain code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMask {
    lines: BTreeSet<usize>,
}

impl LineMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, line: usize) {
        self.lines.insert(line);
    }

    /// Insert `start..=end`
    pub fn insert_range(&mut self, start: usize, end: usize) {
        for line in start..=end {
            self.lines.insert(line);
        }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.lines.contains(&line)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub balance: Balance,
    /// Openers never closed, in the order they were opened, with their line
    pub unclosed: Vec<(Delimiter, usize)>,
    /// Closers that did not match the innermost opener (or had none)
    pub mismatched: usize,
    pub unterminated_block_comment: bool,
    pub unterminated_strings: usize,
    /// Lines whose visible text is entirely comment or literal content
    pub non_code: LineMask,
}

impl Lexed {
    /// True when nothing but the unclosed openers is wrong with the file
    pub fn is_clean_apart_from_unclosed(&self) -> bool {
        self.mismatched == 0 && !self.unterminated_block_comment && self.unterminated_strings == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    LineComment,
    BlockComment,
    Str(char),
    Template,
}

/// Tokenize `content`, tolerating any malformed input.
pub fn lex(content: &str) -> Lexed {
    let chars: Vec<char> = content.chars().collect();
    let mut out = Lexed::default();
    let mut stack: Vec<(Delimiter, usize)> = Vec::new();
    // Delimiter stack depth at each open `${`
    let mut template_exprs: Vec<usize> = Vec::new();

    let mut mode = Mode::Code;
    let mut line = 1usize;
    let mut line_has_code = false;
    let mut line_has_text = false;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '\n' {
            if mode == Mode::LineComment {
                mode = Mode::Code;
            }
            if let Mode::Str(_) = mode {
                out.unterminated_strings += 1;
                mode = Mode::Code;
            }
            if line_has_text && !line_has_code {
                out.non_code.insert(line);
            }
            line += 1;
            line_has_code = false;
            line_has_text = false;
            i += 1;
            continue;
        }

        if !c.is_whitespace() {
            line_has_text = true;
        }

        match mode {
            Mode::Code => match c {
                '/' if next == Some('/') => {
                    mode = Mode::LineComment;
                    i += 1;
                }
                '/' if next == Some('*') => {
                    mode = Mode::BlockComment;
                    i += 1;
                }
                '\'' | '"' => mode = Mode::Str(c),
                '`' => mode = Mode::Template,
                _ => {
                    if !c.is_whitespace() {
                        line_has_code = true;
                    }
                    if let Some(delim) = Delimiter::from_open(c) {
                        stack.push((delim, line));
                        out.balance.bump(delim, 1);
                    } else if c == '}' && template_exprs.last() == Some(&stack.len()) {
                        template_exprs.pop();
                        mode = Mode::Template;
                    } else if let Some(delim) = Delimiter::from_close(c) {
                        out.balance.bump(delim, -1);
                        match stack.last() {
                            Some((open, _)) if *open == delim => {
                                stack.pop();
                            }
                            _ => out.mismatched += 1,
                        }
                    }
                }
            },
            Mode::LineComment => {}
            Mode::BlockComment => {
                if c == '*' && next == Some('/') {
                    mode = Mode::Code;
                    i += 1;
                }
            }
            Mode::Str(quote) => {
                if c == '\\' {
                    i += 1;
                } else if c == quote {
                    mode = Mode::Code;
                }
            }
            Mode::Template => {
                if c == '\\' {
                    i += 1;
                } else if c == '`' {
                    mode = Mode::Code;
                } else if c == '$' && next == Some('{') {
                    template_exprs.push(stack.len());
                    line_has_code = true;
                    mode = Mode::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    if line_has_text && !line_has_code {
        out.non_code.insert(line);
    }
    match mode {
        Mode::BlockComment => out.unterminated_block_comment = true,
        Mode::Str(_) | Mode::Template => out.unterminated_strings += 1,
        Mode::Code | Mode::LineComment => {}
    }
    out.unclosed = stack;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_code_is_zero() {
        let lexed = lex("function f(a) { return [a, (a)]; }\n");
        assert!(lexed.balance.is_zero());
        assert!(lexed.unclosed.is_empty());
        assert_eq!(lexed.mismatched, 0);
    }

    #[test]
    fn delimiters_in_comments_and_strings_are_ignored() {
        let src = "// { (\nconst s = \"[\";\n/* ) */\nconst t = `}${x}`;\n";
        let lexed = lex(src);
        assert!(lexed.balance.is_zero(), "{}", lexed.balance);
        assert!(lexed.non_code.contains(1));
        assert!(lexed.non_code.contains(3));
        assert!(!lexed.non_code.contains(2));
    }

    #[test]
    fn reports_single_unclosed_brace_with_line() {
        let lexed = lex("function App() {\n  return null;\n");
        assert_eq!(lexed.unclosed, vec![(Delimiter::Brace, 1)]);
        assert_eq!(lexed.balance.braces, 1);
        assert!(lexed.is_clean_apart_from_unclosed());
    }

    #[test]
    fn flags_unterminated_block_comment() {
        let lexed = lex("const a = 1;\n/* never closed\n");
        assert!(lexed.unterminated_block_comment);
    }

    #[test]
    fn quote_in_prose_only_poisons_its_line() {
        let lexed = lex("<p>Don't</p>\nconst x = (1);\n");
        assert_eq!(lexed.unterminated_strings, 1);
        assert!(lexed.balance.is_zero());
    }

    #[test]
    fn closing_shift_cancels_one_opener() {
        let lexed = lex("[1, 2");
        let shifted = lexed.balance + Balance::closing(Delimiter::Bracket);
        assert!(shifted.is_zero());
    }
}
