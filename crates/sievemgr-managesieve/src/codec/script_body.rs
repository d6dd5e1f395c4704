//! Decoder for script bodies sent without a literal header.
//!
//! Some servers answer GETSCRIPT with the script text inline, followed by a
//! line starting with `OK`. The terminator is only recognised at the start of
//! a line outside quoted strings and bracket comments. Non-ASCII octets may be
//! sent as `\ooo` octal escapes.

/// Scanner position inside the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LineStart,
    AfterO,
    Text,
    Quoted,
    HashComment,
    BracketComment,
}

/// Incremental decoder fed one response line at a time.
#[derive(Debug, Clone)]
pub struct ScriptBodyDecoder {
    state: State,
    out: Vec<u8>,
    done: bool,
}

impl Default for ScriptBodyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptBodyDecoder {
    /// Creates a decoder positioned at the start of the body.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::LineStart,
            out: Vec::new(),
            done: false,
        }
    }

    /// Feeds one line (without its terminator).
    ///
    /// Returns true once the terminating `OK` has been seen; that line is not
    /// part of the body and later lines are ignored.
    pub fn feed_line(&mut self, line: &str) -> bool {
        if self.done {
            return true;
        }

        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match (self.state, b) {
                (State::LineStart, b'O') => {
                    self.state = State::AfterO;
                }
                (State::AfterO, b'K') if matches!(bytes.get(i + 1), None | Some(b' ' | b'(')) => {
                    self.done = true;
                    return true;
                }
                (State::AfterO, _) => {
                    self.out.push(b'O');
                    self.state = State::Text;
                    continue;
                }
                (State::LineStart, _) => {
                    self.state = State::Text;
                    continue;
                }
                (_, b'\\') => {
                    i += self.escape(&bytes[i + 1..]);
                }
                (State::Text, b'"') => {
                    self.out.push(b);
                    self.state = State::Quoted;
                }
                (State::Text, b'#') => {
                    self.out.push(b);
                    self.state = State::HashComment;
                }
                (State::Text, b'/') if bytes.get(i + 1) == Some(&b'*') => {
                    self.out.extend_from_slice(b"/*");
                    self.state = State::BracketComment;
                    i += 1;
                }
                (State::Quoted, b'"') => {
                    self.out.push(b);
                    self.state = State::Text;
                }
                (State::BracketComment, b'*') if bytes.get(i + 1) == Some(&b'/') => {
                    self.out.extend_from_slice(b"*/");
                    self.state = State::Text;
                    i += 1;
                }
                _ => self.out.push(b),
            }
            i += 1;
        }

        if self.state == State::AfterO {
            self.out.push(b'O');
        }
        self.out.extend_from_slice(b"\r\n");
        self.state = match self.state {
            State::Quoted => State::Quoted,
            State::BracketComment => State::BracketComment,
            _ => State::LineStart,
        };
        false
    }

    /// Returns true once the terminating `OK` line has been seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Returns the decoded body.
    #[must_use]
    pub fn finish(self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }

    /// Handles the octets after a backslash and returns how many it consumed.
    fn escape(&mut self, rest: &[u8]) -> usize {
        let digits = rest
            .iter()
            .take(3)
            .take_while(|b| (b'0'..=b'7').contains(*b))
            .count();

        if digits == 3 {
            let value = rest[..3]
                .iter()
                .fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0'));
            if let Ok(octet) = u8::try_from(value) {
                self.out.push(octet);
                return 3;
            }
        }

        // Fewer than three digits: copy through, including the escaped octet.
        self.out.push(b'\\');
        self.out.extend_from_slice(&rest[..digits]);
        match rest.get(digits) {
            Some(&next) if digits < 3 => {
                self.out.push(next);
                digits + 1
            }
            _ => digits,
        }
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
    use proptest::prelude::*;

    fn decode(lines: &[&str]) -> (String, bool) {
        let mut decoder = ScriptBodyDecoder::new();
        let mut done = false;
        for line in lines {
            if decoder.feed_line(line) {
                done = true;
                break;
            }
        }
        (decoder.finish(), done)
    }

    #[test]
    fn test_stops_at_ok() {
        let (body, done) = decode(&["require \"fileinto\";", "keep;", "OK"]);
        assert!(done);
        assert_eq!(body, "require \"fileinto\";\r\nkeep;\r\n");
    }

    #[test]
    fn test_ok_with_text_is_terminal() {
        let (body, done) = decode(&["keep;", "OK \"Getscript completed.\""]);
        assert!(done);
        assert_eq!(body, "keep;\r\n");
    }

    #[test]
    fn test_ok_inside_quoted_string_is_body() {
        let (body, done) = decode(&["reject \"multi", "OK", "line\";", "OK"]);
        assert!(done);
        assert_eq!(body, "reject \"multi\r\nOK\r\nline\";\r\n");
    }

    #[test]
    fn test_ok_inside_bracket_comment_is_body() {
        let (body, done) = decode(&["/* start", "OK", "*/ keep;", "OK"]);
        assert!(done);
        assert_eq!(body, "/* start\r\nOK\r\n*/ keep;\r\n");
    }

    #[test]
    fn test_hash_comment_ends_at_line_end() {
        let (body, done) = decode(&["# don't \"quote", "OK"]);
        assert!(done);
        assert_eq!(body, "# don't \"quote\r\n");
    }

    #[test]
    fn test_okay_is_not_terminal() {
        let (body, done) = decode(&["OKAY", "O", "OK"]);
        assert!(done);
        assert_eq!(body, "OKAY\r\nO\r\n");
    }

    #[test]
    fn test_octal_escapes_decode() {
        let (body, _) = decode(&["# Rulename: B\\303\\244r", "OK"]);
        assert_eq!(body, "# Rulename: Bär\r\n");
    }

    #[test]
    fn test_short_octal_copies_verbatim() {
        let (body, _) = decode(&["a\\12x b\\9", "OK"]);
        assert_eq!(body, "a\\12x b\\9\r\n");
    }

    #[test]
    fn test_escaped_quote_does_not_close_string() {
        let (body, done) = decode(&["\"a\\\"", "OK", "\"", "OK"]);
        assert!(done);
        assert_eq!(body, "\"a\\\"\r\nOK\r\n\"\r\n");
    }

    #[test]
    fn test_trailing_backslash() {
        let (body, _) = decode(&["x\\", "OK"]);
        assert_eq!(body, "x\\\r\n");
    }

    proptest! {
        #[test]
        fn plain_lines_pass_through(lines in proptest::collection::vec("[a-z ;{}]{0,20}", 0..8)) {
            let mut decoder = ScriptBodyDecoder::new();
            for line in &lines {
                prop_assert!(!decoder.feed_line(line));
            }
            prop_assert!(decoder.feed_line("OK"));
            let expected: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
            prop_assert_eq!(decoder.finish(), expected);
        }
    }
}
