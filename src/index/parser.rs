//! Tree-sitter based parsing for the syntax-tree strategy

use super::Language;
use crate::error::StrategyError;
use crate::lexer::LineMask;
use tree_sitter::{Parser, TreeCursor};

// ═══════════════════════════════════════════════════════════════════════════
//  PARSER POOL
// ═══════════════════════════════════════════════════════════════════════════
//
// Tree-sitter parsers are expensive to create but can be reused for every
// file of the same language. The pool is owned by the scan context rather
// than living in thread-local storage, so the retry controller can throw it
// away and rebuild it as a recovery action.

/// Node kinds whose text is never application code
const NON_CODE_KINDS: &[&str] = &["comment", "string", "template_string", "regex", "jsx_text"];

/// Structural facts extracted from one parse
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub has_error: bool,
    /// 1-based line of the first error or missing node
    pub first_error_line: Option<usize>,
    /// Lines covered by comments, literals and JSX text
    pub non_code: LineMask,
}

#[derive(Default)]
pub struct ParserPool {
    javascript: Option<Parser>,
    typescript: Option<Parser>,
    tsx: Option<Parser>,
    generation: u32,
}

impl ParserPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every parser; they are recreated lazily on next use.
    pub fn reset(&mut self) {
        self.javascript = None;
        self.typescript = None;
        self.tsx = None;
        self.generation += 1;
    }

    /// Number of times the pool has been reset
    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn parser_for(&mut self, language: Language) -> Result<&mut Parser, StrategyError> {
        let slot = match language {
            Language::JavaScript => &mut self.javascript,
            Language::TypeScript => &mut self.typescript,
            Language::Tsx => &mut self.tsx,
            Language::Html | Language::Unknown => {
                return Err(StrategyError::Grammar {
                    language: language.name(),
                    reason: "no grammar bundled".to_string(),
                })
            }
        };

        if slot.is_none() {
            let mut parser = Parser::new();
            parser
                .set_language(&grammar(language))
                .map_err(|e| StrategyError::Grammar {
                    language: language.name(),
                    reason: e.to_string(),
                })?;
            *slot = Some(parser);
        }

        match slot {
            Some(parser) => Ok(parser),
            None => Err(StrategyError::Grammar {
                language: language.name(),
                reason: "parser unavailable".to_string(),
            }),
        }
    }

    /// Parse `content`. `Ok(None)` means tree-sitter gave up on this file.
    pub fn parse(
        &mut self,
        content: &str,
        language: Language,
    ) -> Result<Option<ParsedFile>, StrategyError> {
        let parser = self.parser_for(language)?;
        let Some(tree) = parser.parse(content, None) else {
            return Ok(None);
        };

        let root = tree.root_node();
        let mut parsed = ParsedFile {
            has_error: root.has_error(),
            ..ParsedFile::default()
        };
        let mut cursor = root.walk();
        collect_recursive(&mut cursor, &mut parsed);
        Ok(Some(parsed))
    }
}

fn grammar(language: Language) -> tree_sitter::Language {
    match language {
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        _ => tree_sitter_javascript::LANGUAGE.into(),
    }
}

fn collect_recursive(cursor: &mut TreeCursor, parsed: &mut ParsedFile) {
    loop {
        let node = cursor.node();

        if (node.is_error() || node.is_missing()) && parsed.first_error_line.is_none() {
            parsed.first_error_line = Some(node.start_position().row + 1);
        }

        if NON_CODE_KINDS.contains(&node.kind()) {
            parsed
                .non_code
                .insert_range(node.start_position().row + 1, node.end_position().row + 1);
        } else if cursor.goto_first_child() {
            collect_recursive(cursor, parsed);
            cursor.goto_parent();
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_module_has_no_error() {
        let mut pool = ParserPool::new();
        let parsed = pool
            .parse("const a = 1;\nexport default a;\n", Language::JavaScript)
            .unwrap()
            .unwrap();
        assert!(!parsed.has_error);
        assert!(parsed.first_error_line.is_none());
    }

    #[test]
    fn comments_and_jsx_text_are_masked() {
        let src = "// header\nexport function App() {\n  return (\n    <div>\n      Core Providers\n    </div>\n  );\n}\n";
        let mut pool = ParserPool::new();
        let parsed = pool.parse(src, Language::Tsx).unwrap().unwrap();
        assert!(parsed.non_code.contains(1));
        assert!(parsed.non_code.contains(5));
        assert!(!parsed.non_code.contains(2));
    }

    #[test]
    fn unclosed_brace_reports_error() {
        let mut pool = ParserPool::new();
        let parsed = pool
            .parse("function f() {\n  return 1;\n", Language::TypeScript)
            .unwrap()
            .unwrap();
        assert!(parsed.has_error);
        assert!(parsed.first_error_line.is_some());
    }

    #[test]
    fn reset_bumps_generation_and_parsers_come_back() {
        let mut pool = ParserPool::new();
        pool.parse("1;", Language::JavaScript).unwrap();
        pool.reset();
        assert_eq!(pool.generation(), 1);
        assert!(pool.parse("2;", Language::JavaScript).unwrap().is_some());
    }

    #[test]
    fn html_has_no_grammar() {
        let mut pool = ParserPool::new();
        assert!(matches!(
            pool.parse("<html></html>", Language::Html),
            Err(StrategyError::Grammar { .. })
        ));
    }
}
