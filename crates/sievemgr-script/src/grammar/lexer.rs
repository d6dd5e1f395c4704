//! Sieve lexer (RFC 5228 section 2).
//!
//! The lexer never fails: anything it cannot read becomes a
//! [`Token::Invalid`] so the parser can report it and resynchronise.

use crate::model::{Number, Quantifier};

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Command or test name.
    Identifier(String),
    /// Tagged argument, colon included.
    Tag(String),
    /// Number with optional quantifier.
    Number(Number),
    /// Quoted or `text:` multi-line string, unescaped.
    String(String),
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// Unreadable input, with a description.
    Invalid(String),
    /// End of input.
    Eof,
}

impl Token {
    /// Describes the token for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Identifier(name) => format!("identifier {name:?}"),
            Self::Tag(tag) => format!("tag {tag}"),
            Self::Number(n) => format!("number {n}"),
            Self::String(_) => "string".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Semicolon => "';'".to_string(),
            Self::Invalid(message) => message.clone(),
            Self::Eof => "end of script".to_string(),
        }
    }
}

/// A token with the lines it starts and ends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// First line (1-based).
    pub line: usize,
    /// Last line.
    pub end_line: usize,
}

/// Sieve lexer state.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given script.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
        }
    }

    /// Reads every token; the last one is always [`Token::Eof`].
    #[must_use]
    pub fn tokenize(mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token();
            let eof = spanned.token == Token::Eof;
            tokens.push(spanned);
            if eof {
                return tokens;
            }
        }
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Spanned {
        if let Some(message) = self.skip_insignificant() {
            return Spanned {
                token: Token::Invalid(message),
                line: self.line,
                end_line: self.line,
            };
        }

        let line = self.line;
        let token = self.read_token();
        Spanned {
            token,
            line,
            end_line: self.line,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte)
    }

    fn advance_char(&mut self) -> Option<char> {
        let c = self.input[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skips whitespace and comments. Returns a message for an unterminated
    /// bracket comment.
    fn skip_insignificant(&mut self) -> Option<String> {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'#' => self.skip_line(),
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    loop {
                        match self.advance() {
                            Some(b'*') if self.peek() == Some(b'/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => return Some("unterminated bracket comment".to_string()),
                        }
                    }
                }
                _ => break,
            }
        }
        None
    }

    fn skip_line(&mut self) {
        while let Some(byte) = self.advance() {
            if byte == b'\n' {
                break;
            }
        }
    }

    fn read_token(&mut self) -> Token {
        let Some(byte) = self.peek() else {
            return Token::Eof;
        };

        match byte {
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'{' => self.single(Token::LBrace),
            b'}' => self.single(Token::RBrace),
            b',' => self.single(Token::Comma),
            b';' => self.single(Token::Semicolon),
            b'"' => self.read_quoted_string(),
            b':' => self.read_tag(),
            b'0'..=b'9' => self.read_number(),
            _ if is_identifier_start(byte) => self.read_identifier(),
            _ => {
                let c = self.advance_char().unwrap_or_default();
                Token::Invalid(format!("unexpected character {c:?}"))
            }
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_char) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn read_identifier(&mut self) -> Token {
        let word = self.read_word();
        if word.eq_ignore_ascii_case("text") && self.peek() == Some(b':') {
            self.advance();
            return self.read_multiline();
        }
        Token::Identifier(word.to_string())
    }

    fn read_tag(&mut self) -> Token {
        self.advance(); // Skip colon
        if !self.peek().is_some_and(is_identifier_start) {
            return Token::Invalid("expected tag name after ':'".to_string());
        }
        Token::Tag(format!(":{}", self.read_word()))
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let Ok(value) = self.input[start..self.pos].parse::<u64>() else {
            return Token::Invalid("number too large".to_string());
        };

        let quantifier = self.peek().and_then(|b| Quantifier::from_char(char::from(b)));
        if quantifier.is_some() {
            self.pos += 1;
        }
        Token::Number(Number { value, quantifier })
    }

    /// Reads a quoted string; `\x` stands for `x`.
    fn read_quoted_string(&mut self) -> Token {
        self.advance(); // Skip opening quote

        let mut value = String::new();
        loop {
            match self.advance_char() {
                Some('"') => return Token::String(value),
                Some('\\') => match self.advance_char() {
                    Some(c) => value.push(c),
                    None => break,
                },
                Some(c) => value.push(c),
                None => break,
            }
        }
        Token::Invalid("unterminated quoted string".to_string())
    }

    /// Reads the body of a `text:` string up to the lone `.` line.
    fn read_multiline(&mut self) -> Token {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.advance();
        }
        match self.peek() {
            Some(b'#') => self.skip_line(),
            Some(b'\r') if self.peek_at(1) == Some(b'\n') => {
                self.advance();
                self.advance();
            }
            Some(b'\n') => {
                self.advance();
            }
            _ => return Token::Invalid("expected line break after text:".to_string()),
        }

        let mut value = String::new();
        while self.pos < self.input.len() {
            let rest = &self.input[self.pos..];
            let (raw, consumed) = match rest.find('\n') {
                Some(idx) => (&rest[..idx], idx + 1),
                None => (rest, rest.len()),
            };
            let line = raw.strip_suffix('\r').unwrap_or(raw);

            if line == "." {
                // Leave the terminator's line break to the whitespace skipper.
                self.pos += raw.len();
                return Token::String(value);
            }

            value.push_str(line.strip_prefix('.').filter(|l| l.starts_with('.')).unwrap_or(line));
            value.push_str("\r\n");
            self.pos += consumed;
            if consumed > raw.len() {
                self.line += 1;
            }
        }
        Token::Invalid("unterminated multi-line string".to_string())
    }
}

const fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

const fn is_identifier_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
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

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(
            tokens("fileinto :copy \"INBOX.Work\";"),
            vec![
                Token::Identifier("fileinto".to_string()),
                Token::Tag(":copy".to_string()),
                Token::String("INBOX.Work".to_string()),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_lists() {
        assert_eq!(
            tokens("size :over 100K [\"a\", \"b\"]"),
            vec![
                Token::Identifier("size".to_string()),
                Token::Tag(":over".to_string()),
                Token::Number(Number {
                    value: 100,
                    quantifier: Some(Quantifier::K)
                }),
                Token::LBracket,
                Token::String("a".to_string()),
                Token::Comma,
                Token::String("b".to_string()),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(
            tokens(r#""a\"b\\c\d""#),
            vec![Token::String("a\"b\\cd".to_string()), Token::Eof]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokens("# hash\r\n/* bracket\r\n comment */ keep; # tail"),
            vec![
                Token::Identifier("keep".to_string()),
                Token::Semicolon,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_multiline_string() {
        let spanned = Lexer::new("vacation text: # note\r\nAway.\r\n..dot\r\n.\r\n;").tokenize();
        assert_eq!(
            spanned[1].token,
            Token::String("Away.\r\n.dot\r\n".to_string())
        );
        assert_eq!((spanned[1].line, spanned[1].end_line), (1, 4));
        assert_eq!(spanned[2].token, Token::Semicolon);
        assert_eq!(spanned[2].line, 5);
    }

    #[test]
    fn test_multiline_with_bare_lf() {
        assert_eq!(
            tokens("text:\nline\n.\n"),
            vec![Token::String("line\r\n".to_string()), Token::Eof]
        );
    }

    #[test]
    fn test_line_numbers() {
        let spanned = Lexer::new("require \"x\";\r\n\r\nkeep;").tokenize();
        assert_eq!(spanned[0].line, 1);
        assert_eq!(spanned[3].line, 3);
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(tokens("@")[0], Token::Invalid(_)));
        assert!(matches!(tokens("\"open")[0], Token::Invalid(_)));
        assert!(matches!(tokens("text:\r\nno end")[0], Token::Invalid(_)));
        assert!(matches!(tokens("/* open")[0], Token::Invalid(_)));
        assert!(matches!(tokens(": x")[0], Token::Invalid(_)));
    }
}
