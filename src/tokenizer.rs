//! Shell-style argument tokenizer.
//!
//! Splits the raw argument text of a trigger into tokens. The scan is a single
//! left-to-right pass over a four-state machine:
//!
//! ```text
//!            ws                 '                 "
//! NoToken ───────▶ NoToken   ───────▶ SingleQuote ───────▶ DoubleQuote
//!    │ other                    │ '                  │ "
//!    ▼                          ▼                    ▼
//! InToken ◀───────────────── InToken ◀────────────── InToken
//!    │ ws ─▶ emit, NoToken
//! ```
//!
//! Outside quotes a backslash takes the next character literally. Inside single
//! quotes everything is literal. Inside double quotes only `\"` and `\\` are
//! unescaped; other escapes keep their backslash. Closing a quote does not end
//! the token: `'a b'c` is the single token `a bc`.
//!
//! The tokenizer never rejects input. Unterminated quotes run to the end of the
//! input and a dangling backslash is kept as a literal `\`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NoToken,
    InToken,
    InSingleQuote,
    InDoubleQuote,
}

/// Split `input` into argument tokens.
///
/// ```
/// use inkline::tokenize;
///
/// assert_eq!(tokenize("'a b' c"), vec!["a b", "c"]);
/// assert_eq!(tokenize(r#""a\"b""#), vec![r#"a"b"#]);
/// ```
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::NoToken;
    let mut escaped = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }

        match state {
            State::InSingleQuote => {
                if c == '\'' {
                    state = State::InToken;
                } else {
                    current.push(c);
                }
            }
            State::InDoubleQuote => match c {
                '"' => state = State::InToken,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => current.push('\\'),
                },
                _ => current.push(c),
            },
            State::NoToken | State::InToken => match c {
                '\\' => {
                    escaped = true;
                    state = State::InToken;
                }
                '\'' => state = State::InSingleQuote,
                '"' => state = State::InDoubleQuote,
                _ if c.is_whitespace() => {
                    if state == State::InToken {
                        tokens.push(std::mem::take(&mut current));
                        state = State::NoToken;
                    }
                }
                _ => {
                    current.push(c);
                    state = State::InToken;
                }
            },
        }
    }

    if escaped {
        current.push('\\');
        tokens.push(current);
    } else if state != State::NoToken {
        tokens.push(current);
    }

    tokens
}

/// Split `input` like [`tokenize`], then render every token as a double-quoted
/// string literal.
///
/// Backslashes, double quotes and the control characters `\n \t \r \b \f` are
/// escaped to their two-character forms.
pub fn tokenize_quoted(input: &str) -> Vec<String> {
    tokenize(input).iter().map(|token| quote(token)).collect()
}

fn quote(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    for c in token.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
