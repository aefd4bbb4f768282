pub mod comment;
pub mod eval;
pub mod lex;
pub mod library;
pub mod math;
pub mod parse;
pub mod system;
pub mod tree;
pub mod value;

pub use comment::strip_comments;
pub use eval::{Computer, EvalError, MemberKind};
pub use lex::{ParseError, Position, SyntaxError, UnexpectedEndOfInput};
pub use library::{Args, Library, LibraryError, MemberTable, ParamType, Signature};
pub use parse::Parser;
pub use tree::{ElementId, ElementKind, EntityId, Notation};
pub use value::{Payload, Variant, VariantType};

/// Parses `source` with the default operator set.
pub fn parse(source: &str) -> Result<Notation, ParseError> {
    Parser::new(None, source).parse()
}
