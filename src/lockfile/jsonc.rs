//! JSONC handling: strips comments and trailing commas so `bun.lock` can be
//! fed to a strict JSON parser.
//!
//! String literals are preserved byte-for-byte, including escape sequences
//! and comment-looking content. Newlines that terminate single-line comments
//! are kept so line numbers survive for error reporting.

/// Removes `//` and `/* */` comments plus trailing commas from JSONC bytes.
pub fn strip_comments(data: &[u8]) -> Vec<u8> {
    strip_trailing_commas(&strip_comment_bytes(data))
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Normal,
    InString,
    SingleComment,
    MultiComment,
}

fn strip_comment_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut state = State::Normal;
    let mut pos = 0;

    while pos < data.len() {
        let c = data[pos];
        match state {
            State::Normal => {
                if c == b'"' {
                    state = State::InString;
                    out.push(c);
                    pos += 1;
                } else if c == b'/' && data.get(pos + 1) == Some(&b'/') {
                    state = State::SingleComment;
                    pos += 2;
                } else if c == b'/' && data.get(pos + 1) == Some(&b'*') {
                    state = State::MultiComment;
                    pos += 2;
                } else {
                    out.push(c);
                    pos += 1;
                }
            }
            State::InString => {
                if c == b'\\' && pos + 1 < data.len() {
                    out.push(c);
                    out.push(data[pos + 1]);
                    pos += 2;
                    continue;
                }
                if c == b'"' {
                    state = State::Normal;
                }
                out.push(c);
                pos += 1;
            }
            State::SingleComment => {
                if c == b'\n' {
                    state = State::Normal;
                    out.push(b'\n');
                }
                pos += 1;
            }
            State::MultiComment => {
                if c == b'*' && data.get(pos + 1) == Some(&b'/') {
                    state = State::Normal;
                    pos += 2;
                } else {
                    pos += 1;
                }
            }
        }
    }

    out
}

/// Removes commas followed only by whitespace before `]` or `}`.
fn strip_trailing_commas(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut in_string = false;

    for (i, &c) in data.iter().enumerate() {
        if c == b'"' && !is_escaped(data, i) {
            in_string = !in_string;
        }

        if !in_string && c == b',' && is_trailing_comma(data, i) {
            continue;
        }

        out.push(c);
    }

    out
}

fn is_trailing_comma(data: &[u8], i: usize) -> bool {
    for &c in &data[i + 1..] {
        if c.is_ascii_whitespace() {
            continue;
        }
        return c == b']' || c == b'}';
    }
    false
}

/// An odd run of preceding backslashes means the quote is escaped.
fn is_escaped(data: &[u8], i: usize) -> bool {
    let mut count = 0;
    let mut j = i;
    while j > 0 && data[j - 1] == b'\\' {
        count += 1;
        j -= 1;
    }
    count % 2 == 1
}
