//! # sievemgr-script
//!
//! Round-trip safe conversion between stored Sieve scripts and the rule
//! list a filter editor works with.
//!
//! ## Features
//!
//! - **Dual-pass parsing**: active rules and rules disabled with the
//!   `#<!-->` marker are both recovered as structured rules
//! - **Metadata comments**: `## Flag: …|UniqueId:…|Rulename: …` lines are
//!   attached to the rule below them
//! - **Local error recovery**: a rule that fails to parse is kept verbatim
//!   instead of failing the whole script
//! - **Require reconciliation**: the `require` line is recomputed from the
//!   rules and the server's extension list on every write
//! - **Pluggable grammar**: parsing and rendering go through the
//!   [`ScriptGrammar`] trait; [`SieveGrammar`] is the default
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::collections::BTreeSet;
//! use sievemgr_script::{ScriptParser, ScriptWriter};
//!
//! let parsed = ScriptParser::new().parse_client_rules(&script);
//! for rule in &parsed.rules {
//!     println!("{:?} {:?}", rule.name(), rule.commands);
//! }
//!
//! let server: BTreeSet<String> = ["fileinto", "imap4flags"].map(String::from).into();
//! let text = ScriptWriter::new().write(&parsed.rules, &server, &parsed.retain);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod convert;
mod error;
pub mod grammar;
pub mod metadata;
pub mod model;
pub mod parser;
pub mod require;
pub mod strip;
pub mod writer;

pub use error::{Result, ScriptError};
pub use grammar::{Fragment, Node, ScriptGrammar, SieveGrammar, SyntaxError};
pub use model::{
    Argument, ClientRulesAndRequire, Command, Number, ParseResult, Quantifier, Rule, RuleComment,
    Test,
};
pub use parser::ScriptParser;
pub use require::merge_require_line;
pub use writer::ScriptWriter;

/// First line of every script this crate writes.
pub const SCRIPT_HEADER: &str = "# Sieve filter";

/// Prefix marking the lines of a disabled rule.
pub const DISABLED_MARKER: &str = "#<!-->";
