//! The grammar seam.
//!
//! The rule engine never builds grammar internals itself. It hands script
//! text to a [`ScriptGrammar`] and gets [`Node`] trees back, and it hands
//! nodes back to get rendered [`Fragment`]s. [`SieveGrammar`] is the
//! built-in RFC 5228 implementation.

pub mod lexer;
pub mod parser;
pub mod render;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Argument;

/// Parses and renders Sieve.
pub trait ScriptGrammar {
    /// Parses a script into one result per top-level command.
    fn parse(&self, script: &str) -> Vec<Result<Node, SyntaxError>>;

    /// Renders top-level nodes, one fragment per node.
    fn render(&self, nodes: &[Node]) -> Vec<Fragment>;
}

/// A command or test in the grammar's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier.
    pub name: String,
    /// Arguments in source order.
    pub arguments: Vec<Argument>,
    /// A single test, or the members of a test list.
    pub tests: Vec<Node>,
    /// Block contents; `None` for commands ending in `;` and for tests.
    pub block: Option<Vec<Node>>,
    /// First line (1-based).
    pub line: usize,
    /// Last line.
    pub end_line: usize,
}

impl Node {
    /// Creates a node with arguments only.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            arguments,
            tests: Vec::new(),
            block: None,
            line: 0,
            end_line: 0,
        }
    }

    /// Sets the tests.
    #[must_use]
    pub fn with_tests(mut self, tests: Vec<Self>) -> Self {
        self.tests = tests;
        self
    }

    /// Sets the block.
    #[must_use]
    pub fn with_block(mut self, block: Vec<Self>) -> Self {
        self.block = Some(block);
        self
    }

    /// Sets the line.
    #[must_use]
    pub const fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self.end_line = line;
        self
    }
}

/// Rendered text of one top-level node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Line the node was positioned at.
    pub line: usize,
    /// CRLF-separated text without a trailing line break.
    pub text: String,
}

impl Fragment {
    /// Returns the rendered lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split("\r\n")
    }
}

/// A top-level command the grammar could not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// What went wrong.
    pub message: String,
    /// First line of the skipped span.
    pub line: usize,
    /// Last line of the skipped span.
    pub end_line: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// RFC 5228 grammar with per-command error recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct SieveGrammar;

impl ScriptGrammar for SieveGrammar {
    fn parse(&self, script: &str) -> Vec<Result<Node, SyntaxError>> {
        parser::parse(script)
    }

    fn render(&self, nodes: &[Node]) -> Vec<Fragment> {
        render::render(nodes)
    }
}
