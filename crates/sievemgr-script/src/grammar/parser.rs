//! Recursive-descent parser producing [`Node`] trees.
//!
//! ```text
//! command   = identifier arguments ( ";" / block )
//! arguments = *argument [ test / test-list ]
//! argument  = string-list / number / tag
//! test      = identifier arguments
//! test-list = "(" test *( "," test ) ")"
//! block     = "{" *command "}"
//! ```

use super::lexer::{Lexer, Spanned, Token};
use super::{Node, SyntaxError};
use crate::model::Argument;

/// Deepest nesting of blocks and tests a command may have.
pub const MAX_DEPTH: usize = 128;

/// Parses a script into one result per top-level command.
///
/// A command that fails to parse is reported as a [`SyntaxError`] spanning
/// from its first token to the next top-level `;` or closing `}`, and
/// parsing resumes after it.
#[must_use]
pub fn parse(script: &str) -> Vec<Result<Node, SyntaxError>> {
    let mut parser = Parser {
        tokens: Lexer::new(script).tokenize(),
        pos: 0,
        depth: 0,
    };

    let mut results = Vec::new();
    while !parser.at_eof() {
        let start = parser.pos;
        match parser.command() {
            Ok(node) => results.push(Ok(node)),
            Err(message) => {
                parser.pos = start;
                parser.depth = 0;
                let line = parser.tokens[start].line;
                let end_line = parser.resync();
                tracing::debug!(line, end_line, %message, "skipping malformed command");
                results.push(Err(SyntaxError {
                    message,
                    line,
                    end_line,
                }));
            }
        }
    }
    results
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Commands and tests currently open.
    depth: usize,
}

type Parsed<T> = std::result::Result<T, String>;

impl Parser {
    fn peek(&self) -> &Spanned {
        // The token list always ends with Eof and the parser never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.peek().token == Token::Eof
    }

    fn bump(&mut self) -> Spanned {
        let spanned = self.peek().clone();
        if spanned.token != Token::Eof {
            self.pos += 1;
        }
        spanned
    }

    fn unexpected<T>(&self, expected: &str) -> Parsed<T> {
        let found = self.peek();
        Err(format!(
            "expected {expected}, found {} on line {}",
            found.token.describe(),
            found.line
        ))
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Parsed<T>) -> Parsed<T> {
        if self.depth >= MAX_DEPTH {
            return Err(format!(
                "nesting too deep on line {} (more than {MAX_DEPTH} levels)",
                self.peek().line
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn command(&mut self) -> Parsed<Node> {
        self.nested(Self::command_inner)
    }

    fn command_inner(&mut self) -> Parsed<Node> {
        let Token::Identifier(name) = self.peek().token.clone() else {
            return self.unexpected("command");
        };
        let line = self.bump().line;
        let (arguments, tests) = self.arguments()?;

        let mut node = Node {
            name,
            arguments,
            tests,
            block: None,
            line,
            end_line: line,
        };

        match self.peek().token {
            Token::Semicolon => node.end_line = self.bump().end_line,
            Token::LBrace => {
                self.bump();
                let mut block = Vec::new();
                loop {
                    match self.peek().token {
                        Token::RBrace => break,
                        Token::Eof => return self.unexpected("'}'"),
                        _ => block.push(self.command()?),
                    }
                }
                node.end_line = self.bump().end_line;
                node.block = Some(block);
            }
            _ => return self.unexpected("';' or '{'"),
        }
        Ok(node)
    }

    fn arguments(&mut self) -> Parsed<(Vec<Argument>, Vec<Node>)> {
        let mut arguments = Vec::new();
        loop {
            match self.peek().token.clone() {
                Token::String(value) => {
                    self.bump();
                    arguments.push(Argument::StringList(vec![value]));
                }
                Token::LBracket => arguments.push(self.string_list()?),
                Token::Number(number) => {
                    self.bump();
                    arguments.push(Argument::Number(number));
                }
                Token::Tag(tag) => {
                    self.bump();
                    arguments.push(Argument::Tag(tag));
                }
                _ => break,
            }
        }

        let tests = match self.peek().token {
            Token::LParen => self.test_list()?,
            Token::Identifier(_) => vec![self.test()?],
            _ => Vec::new(),
        };
        Ok((arguments, tests))
    }

    fn string_list(&mut self) -> Parsed<Argument> {
        self.bump(); // Skip [
        let mut values = Vec::new();
        loop {
            let Token::String(value) = self.peek().token.clone() else {
                return self.unexpected("string");
            };
            self.bump();
            values.push(value);

            match self.peek().token {
                Token::Comma => {
                    self.bump();
                }
                Token::RBracket => {
                    self.bump();
                    return Ok(Argument::StringList(values));
                }
                _ => return self.unexpected("',' or ']'"),
            }
        }
    }

    fn test(&mut self) -> Parsed<Node> {
        self.nested(Self::test_inner)
    }

    fn test_inner(&mut self) -> Parsed<Node> {
        let Token::Identifier(name) = self.peek().token.clone() else {
            return self.unexpected("test");
        };
        let line = self.bump().line;
        let (arguments, tests) = self.arguments()?;
        let end_line = self.tokens[self.pos.saturating_sub(1)].end_line;

        Ok(Node {
            name,
            arguments,
            tests,
            block: None,
            line,
            end_line,
        })
    }

    fn test_list(&mut self) -> Parsed<Vec<Node>> {
        self.bump(); // Skip (
        let mut tests = Vec::new();
        loop {
            tests.push(self.test()?);
            match self.peek().token {
                Token::Comma => {
                    self.bump();
                }
                Token::RParen => {
                    self.bump();
                    return Ok(tests);
                }
                _ => return self.unexpected("',' or ')'"),
            }
        }
    }

    /// Skips to the end of the current top-level command and returns the
    /// last line consumed.
    fn resync(&mut self) -> usize {
        let mut depth = 0usize;
        let mut end_line = self.peek().line;

        while !self.at_eof() {
            let spanned = self.bump();
            end_line = spanned.end_line;
            match spanned.token {
                Token::LBrace => depth += 1,
                Token::RBrace if depth <= 1 => break,
                Token::RBrace => depth -= 1,
                Token::Semicolon if depth == 0 => break,
                _ => {}
            }
        }
        end_line
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_require_and_action() {
        let nodes = parse("require [\"fileinto\", \"reject\"];\r\nkeep;");
        assert_eq!(nodes.len(), 2);

        let require = nodes[0].as_ref().unwrap();
        assert_eq!(require.name, "require");
        assert_eq!(
            require.arguments,
            vec![Argument::strings(["fileinto", "reject"])]
        );
        assert_eq!(nodes[1].as_ref().unwrap().line, 2);
    }

    #[test]
    fn test_if_block_with_test_list() {
        let script = "if anyof (header :contains \"Subject\" \"x\",\r\n          not exists \"Date\") {\r\n    discard;\r\n}\r\n";
        let nodes = parse(script);
        let node = nodes[0].as_ref().unwrap();

        assert_eq!(node.name, "if");
        assert_eq!((node.line, node.end_line), (1, 4));
        let anyof = &node.tests[0];
        assert_eq!(anyof.name, "anyof");
        assert_eq!(anyof.tests.len(), 2);
        assert_eq!(anyof.tests[1].name, "not");
        assert_eq!(anyof.tests[1].tests[0].name, "exists");
        assert_eq!(node.block.as_ref().unwrap()[0].name, "discard");
    }

    #[test]
    fn test_nested_blocks() {
        let nodes = parse("if true { if false { stop; } keep; }");
        let outer = nodes[0].as_ref().unwrap();
        let block = outer.block.as_ref().unwrap();
        assert_eq!(block[0].name, "if");
        assert_eq!(block[1].name, "keep");
    }

    #[test]
    fn test_recovery_at_semicolon() {
        let nodes = parse("keep;\r\nfileinto [\"a\" \"b\"];\r\nstop;");
        assert_eq!(nodes.len(), 3);
        assert!(nodes[0].is_ok());
        let err = nodes[1].as_ref().unwrap_err();
        assert_eq!((err.line, err.end_line), (2, 2));
        assert!(err.message.contains("expected ',' or ']'"));
        assert_eq!(nodes[2].as_ref().unwrap().name, "stop");
    }

    #[test]
    fn test_recovery_skips_whole_block() {
        let nodes = parse("if header :is \"a\" {\r\n  fileinto ;;\r\n  stop;\r\n}\r\nkeep;");
        assert_eq!(nodes.len(), 2);
        let err = nodes[0].as_ref().unwrap_err();
        assert_eq!((err.line, err.end_line), (1, 4));
        assert_eq!(nodes[1].as_ref().unwrap().name, "keep");
    }

    #[test]
    fn test_stray_brace_and_eof() {
        let nodes = parse("}\r\nkeep;\r\nif true {");
        assert!(nodes[0].is_err());
        assert!(nodes[1].is_ok());
        let err = nodes[2].as_ref().unwrap_err();
        assert!(err.message.contains("end of script"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_missing_semicolon() {
        let nodes = parse("keep\r\n");
        let err = nodes[0].as_ref().unwrap_err();
        assert!(err.message.contains("expected ';' or '{'"));
    }

    #[test]
    fn test_deep_test_nesting_is_a_syntax_error() {
        let script = format!("if {}true {{ stop; }}\r\nkeep;", "not ".repeat(50_000));
        let results = parse(&script);

        assert_eq!(results.len(), 2);
        let err = results[0].as_ref().unwrap_err();
        assert!(err.message.contains("nesting too deep"));
        assert_eq!((err.line, err.end_line), (1, 1));
        assert_eq!(results[1].as_ref().unwrap().name, "keep");
    }

    #[test]
    fn test_deep_block_nesting_is_a_syntax_error() {
        let script = format!("{}{}", "if true {\r\n".repeat(1_000), "}\r\n".repeat(1_000));
        let results = parse(&script);

        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().message.contains("nesting too deep"));
    }

    #[test]
    fn test_nesting_at_the_limit_parses() {
        let script = format!("if {}true {{ stop; }}", "not ".repeat(MAX_DEPTH - 2));
        assert!(parse(&script)[0].is_ok());
    }
}
