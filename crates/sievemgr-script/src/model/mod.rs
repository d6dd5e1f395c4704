//! In-memory representation of a script as an ordered list of rules.

mod command;
mod result;
mod rule;

pub use command::{Argument, Command, Number, Quantifier, Test};
pub use result::{ClientRulesAndRequire, ParseResult};
pub use rule::{Rule, RuleComment};
