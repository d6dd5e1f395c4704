//! Response line classification.
//!
//! Only the textual header of a response is interpreted here; literal bodies
//! are read by [`FramedStream::read_literal`](super::FramedStream::read_literal)
//! using the length this module extracts.

use super::quoted::unquote;
use crate::types::{Response, ResponseCode, Status};

/// Classification of the first line of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstLine {
    /// `OK`, `NO`, `BYE`, or `None` for data/continuation lines.
    pub status: Option<Status>,
    /// Length announced by a trailing `{N}` or `{N+}` header.
    pub literal: Option<usize>,
}

impl FirstLine {
    /// Returns true if the line starts with `OK`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Some(Status::Ok)
    }

    /// Returns true if the line starts with `NO`.
    #[must_use]
    pub fn is_no(&self) -> bool {
        self.status == Some(Status::No)
    }
}

/// Classifies a response line and extracts an optional literal length.
#[must_use]
pub fn parse_first_line(line: &str) -> FirstLine {
    FirstLine {
        status: status_word(line).map(|(status, _)| status),
        literal: literal_length(line),
    }
}

/// Parses an `OK` / `NO` / `BYE` line into status, code and message.
///
/// The bracketed response code is only interpreted when `with_codes` is set;
/// otherwise it stays part of the message text. Returns `None` for lines
/// that do not start with a status word.
#[must_use]
pub fn parse_response(line: &str, with_codes: bool) -> Option<Response> {
    let (status, word_len) = status_word(line)?;
    let rest = line.trim_start()[word_len..].trim();

    let mut code = None;
    let mut text = rest;
    if with_codes
        && let Some(after) = rest.strip_prefix('(')
        && let Some(end) = closing_paren(after)
    {
        code = Some(ResponseCode::parse(&after[..end]));
        text = after[end + 1..].trim();
    }

    let message = unquote(text).unwrap_or_else(|| text.to_string());
    Some(Response {
        status,
        code,
        message,
    })
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}` or `{123+}` (non-synchronizing).
#[must_use]
pub fn literal_length(line: &str) -> Option<usize> {
    let body = line.trim_end().strip_suffix('}')?;
    let open = body.rfind('{')?;
    let digits = &body[open + 1..];
    let digits = digits.strip_suffix('+').unwrap_or(digits);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn status_word(line: &str) -> Option<(Status, usize)> {
    let trimmed = line.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(trimmed.len());

    let status = match trimmed[..end].to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BYE" => Status::Bye,
        _ => return None,
    };
    Some((status, end))
}

fn closing_paren(s: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ')' if !in_quote => return Some(idx),
            _ => {}
        }
    }
    None
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
    fn test_classify() {
        assert!(parse_first_line("OK").is_ok());
        assert!(parse_first_line("OK \"Logged in.\"").is_ok());
        assert!(parse_first_line("ok (TAG \"a\")").is_ok());
        assert!(parse_first_line("NO \"Bad\"").is_no());
        assert_eq!(parse_first_line("BYE").status, Some(Status::Bye));
        assert_eq!(parse_first_line("\"main\" ACTIVE").status, None);
        assert_eq!(parse_first_line("OKAY").status, None);
        assert_eq!(parse_first_line("NOTIFY").status, None);
    }

    #[test]
    fn test_literal_header() {
        assert_eq!(parse_first_line("{123}").literal, Some(123));
        assert_eq!(parse_first_line("{54+}").literal, Some(54));
        assert_eq!(parse_first_line("{0}").literal, Some(0));
        assert_eq!(parse_first_line("NO {12}").literal, Some(12));
        assert_eq!(parse_first_line("OK").literal, None);
        assert_eq!(parse_first_line("{abc}").literal, None);
        assert_eq!(parse_first_line("{}").literal, None);
        assert_eq!(parse_first_line("{12").literal, None);
    }

    #[test]
    fn test_parse_response_with_code() {
        let resp = parse_response(
            "NO (NONEXISTENT) \"There is no script by that name\"",
            true,
        )
        .unwrap();
        assert_eq!(resp.status, Status::No);
        assert_eq!(resp.code, Some(ResponseCode::NonExistent));
        assert_eq!(resp.message, "There is no script by that name");
    }

    #[test]
    fn test_parse_response_code_with_paren_in_quote() {
        let resp = parse_response("OK (TAG \"a)b\") \"done\"", true).unwrap();
        assert_eq!(resp.code, Some(ResponseCode::Tag("a)b".to_string())));
        assert_eq!(resp.message, "done");
    }

    #[test]
    fn test_parse_response_codes_disabled() {
        let resp = parse_response("NO (QUOTA/MAXSIZE) \"Too big\"", false).unwrap();
        assert_eq!(resp.code, None);
        assert_eq!(resp.message, "(QUOTA/MAXSIZE) \"Too big\"");
    }

    #[test]
    fn test_parse_response_bare() {
        let resp = parse_response("OK", true).unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.message, "");
        assert!(parse_response("\"script\"", true).is_none());
    }
}
