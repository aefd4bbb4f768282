use std::fmt::Display;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Location of a character in notation text.
///
/// `offset` counts characters from the start of the text; `line` and
/// `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Position {
            offset,
            line,
            column,
        }
    }

    /// Byte span of the character at this position inside `source`.
    ///
    /// Positions past the end of `source` collapse to an empty span at its end.
    pub fn span_in(&self, source: &str) -> SourceSpan {
        match source.char_indices().nth(self.offset) {
            Some((byte, c)) => SourceSpan::from(byte..byte + c.len_utf8()),
            None => SourceSpan::from(source.len()..source.len()),
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_identifier_continue(c: char) -> bool {
    is_identifier_start(c) || c.is_ascii_digit() || matches!(c, '.' | '$')
}

pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Characters that can begin an expression term.
pub fn is_expression_start(c: char) -> bool {
    is_identifier_start(c) || c.is_ascii_digit() || matches!(c, '-' | '(' | '"')
}

/// Characters that can begin a member value: an expression, a section or an array.
pub fn is_entity_start(c: char) -> bool {
    matches!(c, '[' | '#') || is_expression_start(c)
}

#[derive(Error, Debug, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(notation::syntax))]
pub struct SyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    bad_bit: SourceSpan,

    #[help]
    help: Option<String>,

    message: String,
    position: Position,

    /// The character no transition was defined for, if any.
    pub token: Option<char>,
}

impl SyntaxError {
    pub(crate) fn unexpected(src: NamedSource<String>, token: char, position: Position) -> Self {
        let bad_bit = position.span_in(src.inner());
        SyntaxError {
            src,
            bad_bit,
            help: Some(format!("remove or correct the character `{}`", token.escape_debug())),
            message: format!("syntax error, unexpected character '{}'", token.escape_debug()),
            position,
            token: Some(token),
        }
    }

    pub(crate) fn invalid(
        src: NamedSource<String>,
        message: String,
        help: Option<String>,
        token: Option<char>,
        position: Position,
    ) -> Self {
        let bad_bit = position.span_in(src.inner());
        SyntaxError {
            src,
            bad_bit,
            help,
            message,
            position,
            token,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn line(&self) -> usize {
        self.position.line
    }

    pub fn column(&self) -> usize {
        self.position.column
    }

    pub fn render_source(&self) -> String {
        render_listing(self.src.inner(), &self.message, self.position)
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("unexpected end of script")]
#[diagnostic(
    code(notation::eof),
    help("The notation ended unexpectedly, possibly due to a missing closing brace, bracket or `;`.")
)]
pub struct UnexpectedEndOfInput {
    #[source_code]
    src: NamedSource<String>,

    #[label("input ends here")]
    bad_bit: SourceSpan,

    position: Position,
}

impl UnexpectedEndOfInput {
    pub(crate) fn build(src: NamedSource<String>, position: Position) -> Self {
        let end = src.inner().len();
        UnexpectedEndOfInput {
            src,
            bad_bit: SourceSpan::from(end..end),
            position,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn line(&self) -> usize {
        self.position.line
    }

    pub fn column(&self) -> usize {
        self.position.column
    }

    pub fn render_source(&self) -> String {
        render_listing(self.src.inner(), &self.to_string(), self.position)
    }
}

/// Failure produced while turning notation text into a tree.
#[derive(Error, Debug, Diagnostic)]
pub enum ParseError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    UnexpectedEnd(#[from] UnexpectedEndOfInput),
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Syntax(e) => e.position(),
            ParseError::UnexpectedEnd(e) => e.position(),
        }
    }

    /// Line-numbered listing of the source with a caret under the failing column.
    pub fn render_source(&self) -> String {
        match self {
            ParseError::Syntax(e) => e.render_source(),
            ParseError::UnexpectedEnd(e) => e.render_source(),
        }
    }
}

fn render_listing(source: &str, message: &str, position: Position) -> String {
    let text = source.replace(['\r', '\t'], " ");
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.len() > 1 && lines.last() == Some(&"") {
        lines.pop();
    }

    let mut out = format!(
        "PARSER ERROR:\n\t'{message}'\n\tat line {} and column {}.\n",
        position.line, position.column
    );
    for (index, line) in lines.iter().enumerate() {
        let number = index + 1;
        out.push_str(&format!("{number:>3}: {line}\n"));
        if number == position.line {
            push_caret(&mut out, position.column);
        }
    }
    // input ending in a line break fails on the empty line after it
    if position.line > lines.len() {
        for number in lines.len() + 1..=position.line {
            out.push_str(&format!("{number:>3}: \n"));
        }
        push_caret(&mut out, position.column);
    }
    out
}

fn push_caret(out: &mut String, column: usize) {
    out.push_str("     ");
    out.push_str(&"-".repeat(column.saturating_sub(1)));
    out.push_str("^\n");
}
