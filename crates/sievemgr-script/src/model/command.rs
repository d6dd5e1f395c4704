//! Commands, tests and their arguments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A Sieve command as the editor sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Command {
    /// `require`; one entry per `require` statement in the group.
    Require(Vec<Vec<String>>),
    /// `if <test> { … }`
    If {
        /// Condition.
        test: Test,
        /// Block contents.
        actions: Vec<Command>,
    },
    /// `elsif <test> { … }`
    ElseIf {
        /// Condition.
        test: Test,
        /// Block contents.
        actions: Vec<Command>,
    },
    /// `else { … }`
    Else {
        /// Block contents.
        actions: Vec<Command>,
    },
    /// Any other command, e.g. `fileinto "Junk";`.
    Action {
        /// Command identifier.
        name: String,
        /// Positional and tagged arguments in source order.
        arguments: Vec<Argument>,
    },
}

impl Command {
    /// Creates an action command.
    #[must_use]
    pub fn action(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self::Action {
            name: name.into(),
            arguments,
        }
    }

    /// Returns the Sieve identifier of the command.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Require(_) => "require",
            Self::If { .. } => "if",
            Self::ElseIf { .. } => "elsif",
            Self::Else { .. } => "else",
            Self::Action { name, .. } => name,
        }
    }

    /// Returns the nested commands of a control block.
    #[must_use]
    pub fn actions(&self) -> &[Self] {
        match self {
            Self::If { actions, .. } | Self::ElseIf { actions, .. } | Self::Else { actions } => {
                actions
            }
            Self::Require(_) | Self::Action { .. } => &[],
        }
    }

    /// Returns the condition of an `if` or `elsif`.
    #[must_use]
    pub const fn test(&self) -> Option<&Test> {
        match self {
            Self::If { test, .. } | Self::ElseIf { test, .. } => Some(test),
            _ => None,
        }
    }
}

/// A test, possibly nesting further tests (`allof`, `anyof`, `not`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    /// Test identifier.
    pub name: String,
    /// Arguments in source order.
    pub arguments: Vec<Argument>,
    /// Nested tests.
    pub tests: Vec<Test>,
}

impl Test {
    /// Creates a test without nested tests.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            arguments,
            tests: Vec::new(),
        }
    }

    /// Creates a combinator such as `allof` over `tests`.
    #[must_use]
    pub fn combine(name: impl Into<String>, tests: Vec<Self>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            tests,
        }
    }
}

/// Command or test argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Argument {
    /// A single string or a bracketed string list.
    StringList(Vec<String>),
    /// A number with optional quantifier.
    Number(Number),
    /// A tagged argument such as `:contains`, stored with its colon.
    Tag(String),
}

impl Argument {
    /// Creates a one-element string list.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::StringList(vec![value.into()])
    }

    /// Creates a string list.
    pub fn strings<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::StringList(values.into_iter().map(Into::into).collect())
    }

    /// Creates a tag, adding the leading colon if missing.
    #[must_use]
    pub fn tag(name: &str) -> Self {
        if name.starts_with(':') {
            Self::Tag(name.to_string())
        } else {
            Self::Tag(format!(":{name}"))
        }
    }

    /// Returns the strings of a string list.
    #[must_use]
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::StringList(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the tag name including its colon.
    #[must_use]
    pub fn as_tag(&self) -> Option<&str> {
        match self {
            Self::Tag(tag) => Some(tag),
            _ => None,
        }
    }
}

/// Size quantifier of a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    /// Kibi (`K`).
    K,
    /// Mebi (`M`).
    M,
    /// Gibi (`G`).
    G,
}

impl Quantifier {
    /// Parses `K`, `M` or `G` in either case.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'K' | 'k' => Some(Self::K),
            'M' | 'm' => Some(Self::M),
            'G' | 'g' => Some(Self::G),
            _ => None,
        }
    }

    /// Returns the multiplier.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::K => 1 << 10,
            Self::M => 1 << 20,
            Self::G => 1 << 30,
        }
    }

    const fn as_char(self) -> char {
        match self {
            Self::K => 'K',
            Self::M => 'M',
            Self::G => 'G',
        }
    }
}

/// Numeric argument such as `100K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Number {
    /// Digits as written.
    pub value: u64,
    /// Optional quantifier.
    pub quantifier: Option<Quantifier>,
}

impl Number {
    /// Creates a plain number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            quantifier: None,
        }
    }

    /// Returns the value with the quantifier applied, saturating on overflow.
    #[must_use]
    pub fn bytes(self) -> u64 {
        self.quantifier
            .map_or(self.value, |q| self.value.saturating_mul(q.multiplier()))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        if let Some(q) = self.quantifier {
            write!(f, "{}", q.as_char())?;
        }
        Ok(())
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
    fn test_number_display_and_bytes() {
        let n = Number {
            value: 100,
            quantifier: Some(Quantifier::K),
        };
        assert_eq!(n.to_string(), "100K");
        assert_eq!(n.bytes(), 102400);
        assert_eq!(Number::new(7).to_string(), "7");
        let huge = Number {
            value: u64::MAX,
            quantifier: Some(Quantifier::G),
        };
        assert_eq!(huge.bytes(), u64::MAX);
    }

    #[test]
    fn test_tag_adds_colon() {
        assert_eq!(Argument::tag("is"), Argument::Tag(":is".to_string()));
        assert_eq!(Argument::tag(":copy").as_tag(), Some(":copy"));
    }

    #[test]
    fn test_command_accessors() {
        let cmd = Command::If {
            test: Test::new("exists", vec![Argument::string("X-Spam")]),
            actions: vec![Command::action("discard", vec![])],
        };
        assert_eq!(cmd.name(), "if");
        assert_eq!(cmd.test().unwrap().name, "exists");
        assert_eq!(cmd.actions().len(), 1);
        assert!(Command::Require(vec![]).actions().is_empty());
    }

    #[test]
    fn test_json_shape() {
        let cmd = Command::action("fileinto", vec![Argument::tag("copy"), Argument::string("Work")]);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "action");
        assert_eq!(json["data"]["name"], "fileinto");
        assert_eq!(json["data"]["arguments"][0]["type"], "tag");
        assert_eq!(json["data"]["arguments"][1]["value"][0], "Work");

        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }
}
