//! Comment removal ahead of tokenizing.
//!
//! Every character of a `// ...` or `/* ... */` run is replaced by a space,
//! line breaks excepted, so offsets, lines and columns computed on the
//! stripped text are valid for the original one as well.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Regular,
    /// A `/` was seen in regular text, it may open a comment.
    Slash,
    LineComment,
    BlockComment,
    /// A `*` was seen inside a block comment, it may close it.
    BlockStar,
    InString,
    InStringEscape,
}

/// Returns `text` with comment content blanked out.
///
/// The result has exactly as many characters as the input. Comment syntax
/// inside double-quoted strings is copied verbatim, and a block comment that
/// never terminates swallows the rest of the input.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = State::Regular;

    for c in text.chars() {
        state = match state {
            State::Regular => regular(c, &mut out),
            State::Slash => match c {
                '/' => {
                    out.push_str("  ");
                    State::LineComment
                }
                '*' => {
                    out.push_str("  ");
                    State::BlockComment
                }
                _ => {
                    out.push('/');
                    regular(c, &mut out)
                }
            },
            State::LineComment => {
                if matches!(c, '\n' | '\r') {
                    out.push(c);
                    State::Regular
                } else {
                    blank(c, &mut out);
                    State::LineComment
                }
            }
            State::BlockComment => {
                blank(c, &mut out);
                if c == '*' {
                    State::BlockStar
                } else {
                    State::BlockComment
                }
            }
            State::BlockStar => {
                blank(c, &mut out);
                match c {
                    '/' => State::Regular,
                    '*' => State::BlockStar,
                    _ => State::BlockComment,
                }
            }
            State::InString => {
                out.push(c);
                match c {
                    '\\' => State::InStringEscape,
                    '"' => State::Regular,
                    _ => State::InString,
                }
            }
            State::InStringEscape => {
                out.push(c);
                State::InString
            }
        };
    }

    if state == State::Slash {
        out.push('/');
    }

    out
}

fn regular(c: char, out: &mut String) -> State {
    match c {
        '/' => State::Slash,
        '"' => {
            out.push(c);
            State::InString
        }
        _ => {
            out.push(c);
            State::Regular
        }
    }
}

fn blank(c: char, out: &mut String) {
    if matches!(c, '\n' | '\r') {
        out.push(c);
    } else {
        out.push(' ');
    }
}
