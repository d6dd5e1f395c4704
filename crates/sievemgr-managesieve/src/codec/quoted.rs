//! Quoted-string helpers.

/// Encodes a string as a protocol quoted string.
#[must_use]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Decodes a complete quoted string. Returns `None` unless the whole input
/// (ignoring surrounding whitespace) is exactly one quoted string.
#[must_use]
pub fn unquote(s: &str) -> Option<String> {
    let inner = s.trim().strip_prefix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?.1),
            '"' => return (idx + 1 == inner.len()).then_some(out),
            _ => out.push(c),
        }
    }
    None
}

/// Splits a line into quoted strings and bare atoms.
///
/// `"SIEVE" "fileinto reject"` yields `["SIEVE", "fileinto reject"]`. An
/// unterminated quoted string runs to the end of the line.
#[must_use]
pub fn split_strings(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if c == '"' {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => token.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    tokens
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
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote("c:\\x"), "\"c:\\\\x\"");
        assert_eq!(quote(""), "\"\"");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"abc\"").as_deref(), Some("abc"));
        assert_eq!(unquote("  \"a\\\"b\"  ").as_deref(), Some("a\"b"));
        assert_eq!(unquote("\"\"").as_deref(), Some(""));
        assert_eq!(unquote("abc"), None);
        assert_eq!(unquote("\"abc"), None);
        assert_eq!(unquote("\"a\" ACTIVE"), None);
    }

    #[test]
    fn test_quote_unquote_inverse() {
        for s in ["", "x", "with \"quotes\"", "back\\slash", "ümlaut"] {
            assert_eq!(unquote(&quote(s)).as_deref(), Some(s));
        }
    }

    #[test]
    fn test_split_strings() {
        assert_eq!(
            split_strings("\"SIEVE\" \"fileinto reject\""),
            vec!["SIEVE", "fileinto reject"]
        );
        assert_eq!(split_strings("\"main\" ACTIVE"), vec!["main", "ACTIVE"]);
        assert_eq!(split_strings("STARTTLS"), vec!["STARTTLS"]);
        assert_eq!(split_strings("\"SASL\" \"\""), vec!["SASL", ""]);
        assert!(split_strings("   ").is_empty());
    }
}
