//! The expression computer: operator precedence, postfix conversion and execution.

use std::{collections::HashMap, fmt::Display};

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::{
    lex::Position,
    library::{HandlerResult, Library, LibraryError, MemberTable},
    math::MathLibrary,
    system::SystemLibrary,
    tree::{ElementId, ElementKind, EntityId, ExpressionElement, Notation},
    value::Variant,
};

/// Library consulted for unqualified names and unregistered operators.
pub const DEFAULT_LIBRARY: &str = "system";

/// Nesting limit for function arguments when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Priority reported for operators that are not in the precedence table.
pub const UNKNOWN_PRIORITY: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Operator,
    Method,
    Variable,
}

impl Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberKind::Operator => write!(f, "operator"),
            MemberKind::Method => write!(f, "method"),
            MemberKind::Variable => write!(f, "variable"),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum EvalError {
    #[error("library '{name}' is not registered")]
    #[diagnostic(
        code(notation::eval::unknown_library),
        help("register the library before computing, or fix the qualifier")
    )]
    UnknownLibrary { name: String },

    #[error("{kind} '{name}' not found in library '{library}'")]
    #[diagnostic(code(notation::eval::member_not_found))]
    MemberNotFound {
        library: String,
        kind: MemberKind,
        name: String,
    },

    #[error("{kind} '{name}' of library '{library}' failed")]
    #[diagnostic(code(notation::eval::invocation))]
    Invocation {
        library: String,
        kind: MemberKind,
        name: String,
        #[source]
        source: LibraryError,
    },

    #[error("evaluation left {values} values on the stack instead of one")]
    #[diagnostic(code(notation::eval::internal))]
    InternalConsistency { values: usize },

    #[error("function arguments nested deeper than {limit} levels")]
    #[diagnostic(code(notation::eval::depth))]
    DepthExceeded { limit: usize },

    #[error("no member at path '{path}'")]
    #[diagnostic(code(notation::eval::path))]
    PathNotFound { path: String },

    #[error("member '{name}' is not an expression")]
    #[diagnostic(code(notation::eval::not_expression))]
    NotAnExpression { name: String },

    #[error("runtime error evaluating {description} at {position}")]
    #[diagnostic(code(notation::eval::element))]
    Element {
        description: String,
        position: Position,

        /// Only the outermost layer carries the source text.
        #[source_code]
        src: Option<NamedSource<String>>,

        #[label("while evaluating this")]
        bad_bit: SourceSpan,

        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    /// The innermost error below any element context layers.
    pub fn root_cause(&self) -> &EvalError {
        let mut error = self;
        while let EvalError::Element { source, .. } = error {
            error = source;
        }
        error
    }

    /// Position of the outermost element being evaluated when the error occurred.
    pub fn position(&self) -> Option<Position> {
        match self {
            EvalError::Element { position, .. } => Some(*position),
            _ => None,
        }
    }

    fn element(notation: &Notation, element: &ExpressionElement, source: EvalError) -> Self {
        let position = element.position();
        let description = if element.text().is_empty() {
            element.kind().describe().to_string()
        } else {
            format!("{} '{}'", element.kind().describe(), element.text())
        };
        EvalError::Element {
            description,
            position,
            src: None,
            bad_bit: position.span_in(notation.source()),
            source: Box::new(source),
        }
    }

    fn with_source_code(mut self, notation: &Notation) -> Self {
        if let EvalError::Element { src, .. } = &mut self {
            *src = Some(NamedSource::new(
                notation.filename().unwrap_or("<input>"),
                notation.source().to_string(),
            ));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    pub priority: i32,
    pub library: String,
}

/// Evaluates expressions of a parsed [`Notation`] against registered libraries.
///
/// Libraries and the precedence table are only changed through `&mut self`,
/// so a shared `&Computer` can evaluate from several threads at once.
pub struct Computer {
    libraries: HashMap<String, MemberTable>,
    operators: HashMap<String, OperatorInfo>,
    max_depth: usize,
}

impl Default for Computer {
    fn default() -> Self {
        Self::new()
    }
}

impl Computer {
    /// A computer with the `system` and `math` libraries and their operators.
    pub fn new() -> Self {
        let mut computer = Self::empty();
        computer
            .add_library("system", SystemLibrary)
            .add_library("math", MathLibrary);
        for op in ["==", "!="] {
            computer.register_operator(op, "system", 1);
        }
        computer.register_operator("||", "system", 2);
        computer.register_operator("&&", "system", 3);
        for op in [">", "<", ">=", "<="] {
            computer.register_operator(op, "system", 4);
        }
        for op in ["+", "-"] {
            computer.register_operator(op, "math", 5);
        }
        for op in ["*", "/"] {
            computer.register_operator(op, "math", 6);
        }
        computer
    }

    /// A computer without libraries or operators.
    pub fn empty() -> Self {
        Computer {
            libraries: HashMap::new(),
            operators: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Registers `library` under `name`, replacing any library of that name.
    pub fn add_library(&mut self, name: impl Into<String>, library: impl Library) -> &mut Self {
        let name = name.into();
        let mut members = MemberTable::new();
        library.register(&mut members);
        debug!(library = %name, "registered library");
        self.libraries.insert(name, members);
        self
    }

    pub fn has_library(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    /// Binds `op` to `library` with `priority`; higher priorities bind tighter.
    pub fn register_operator(
        &mut self,
        op: impl Into<String>,
        library: impl Into<String>,
        priority: i32,
    ) -> &mut Self {
        let op = op.into();
        let library = library.into();
        debug!(operator = %op, library = %library, priority, "registered operator");
        self.operators.insert(op, OperatorInfo { priority, library });
        self
    }

    pub fn operator(&self, op: &str) -> Option<&OperatorInfo> {
        self.operators.get(op)
    }

    pub fn operator_priority(&self, op: &str) -> i32 {
        self.operators
            .get(op)
            .map_or(UNKNOWN_PRIORITY, |info| info.priority)
    }

    /// Orders the children of `element` so operators follow their operands.
    ///
    /// Operators of equal priority associate to the left; `(` and `)`
    /// symbols only steer the ordering and never reach the output.
    pub fn to_postfix(&self, notation: &Notation, element: ElementId) -> Vec<ElementId> {
        let children = notation.element(element).children();
        let mut output = Vec::with_capacity(children.len());
        let mut stack: Vec<ElementId> = Vec::new();

        for &child in children {
            let node = notation.element(child);
            match node.kind() {
                kind if kind.is_operand() => output.push(child),
                ElementKind::Operator => {
                    let priority = self.operator_priority(node.text());
                    while let Some(&top) = stack.last() {
                        let top_node = notation.element(top);
                        if top_node.kind() != ElementKind::Operator
                            || priority > self.operator_priority(top_node.text())
                        {
                            break;
                        }
                        output.push(top);
                        stack.pop();
                    }
                    stack.push(child);
                }
                ElementKind::Symbol if node.text() == "(" => stack.push(child),
                ElementKind::Symbol if node.text() == ")" => {
                    while let Some(top) = stack.pop() {
                        if is_open_parenthesis(notation.element(top)) {
                            break;
                        }
                        output.push(top);
                    }
                }
                _ => {}
            }
        }

        while let Some(top) = stack.pop() {
            if !is_open_parenthesis(notation.element(top)) {
                output.push(top);
            }
        }
        output
    }

    /// Evaluates the expression entity `expression`.
    #[instrument(skip(self, notation), level = "debug")]
    pub fn compute(&self, notation: &Notation, expression: EntityId) -> Result<Variant, EvalError> {
        let entity = notation.entity(expression);
        let Some(expression) = entity.as_expression() else {
            return Err(EvalError::NotAnExpression {
                name: entity.name().unwrap_or_default().to_string(),
            });
        };
        self.execute(notation, expression.root(), 0)
            .map_err(|error| error.with_source_code(notation))
    }

    /// Evaluates the expression bound to a dotted member path such as `"rates.total"`.
    pub fn compute_path(&self, notation: &Notation, path: &str) -> Result<Variant, EvalError> {
        let id = notation.find(path).ok_or_else(|| EvalError::PathNotFound {
            path: path.to_string(),
        })?;
        self.compute(notation, id)
    }

    fn execute(&self, notation: &Notation, element: ElementId, depth: usize) -> Result<Variant, EvalError> {
        if depth > self.max_depth {
            return Err(EvalError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        let postfix = self.to_postfix(notation, element);
        trace!(
            postfix = %postfix
                .iter()
                .map(|&id| notation.element(id).text())
                .collect::<Vec<_>>()
                .join(" "),
            "postfix order"
        );

        let mut stack: Vec<Variant> = Vec::with_capacity(postfix.len());
        for id in postfix {
            let value = self
                .step(notation, id, &mut stack, depth)
                .map_err(|source| EvalError::element(notation, notation.element(id), source))?;
            let value = match value.type_name() {
                Some(_) => value,
                None => {
                    let type_name = value.variant_type().name();
                    value.with_type_name(type_name)
                }
            };
            stack.push(value);
        }

        if stack.len() != 1 {
            return Err(EvalError::InternalConsistency {
                values: stack.len(),
            });
        }
        stack
            .pop()
            .ok_or(EvalError::InternalConsistency { values: 0 })
    }

    fn step(
        &self,
        notation: &Notation,
        id: ElementId,
        stack: &mut Vec<Variant>,
        depth: usize,
    ) -> Result<Variant, EvalError> {
        let node = notation.element(id);
        match node.kind() {
            ElementKind::Number => Ok(Variant::double(Variant::string(node.text()).as_double())),
            ElementKind::String => Ok(Variant::string(node.text())),
            ElementKind::Identifier => {
                let (library, name) = split_qualified(node.text());
                let found = self.library(library)?.read_variable(name);
                let value = resolve(library, MemberKind::Variable, name, found)?;
                Ok(value.with_name(format!("{library}.{name}")))
            }
            ElementKind::Operator => {
                let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                    return Err(EvalError::InternalConsistency {
                        values: stack.len(),
                    });
                };
                let op = node.text();
                let library = self
                    .operators
                    .get(op)
                    .map_or(DEFAULT_LIBRARY, |info| info.library.as_str());
                let found = self.library(library)?.call_operator(op, &lhs, &rhs);
                resolve(library, MemberKind::Operator, op, found)
            }
            ElementKind::Function => {
                let (library, name) = split_qualified(node.text());
                let mut arguments = Vec::with_capacity(node.children().len());
                for &argument in node.children() {
                    // `f()` still carries one argument wrapper, with nothing in it
                    if notation.element(argument).children().is_empty() {
                        continue;
                    }
                    arguments.push(self.execute(notation, argument, depth + 1)?);
                }
                let found = self.library(library)?.call_method(name, &arguments);
                resolve(library, MemberKind::Method, name, found)
            }
            ElementKind::GenericNode => self.execute(notation, id, depth + 1),
            ElementKind::Symbol | ElementKind::FunctionArgument => {
                Err(EvalError::InternalConsistency {
                    values: stack.len(),
                })
            }
        }
    }

    fn library(&self, name: &str) -> Result<&MemberTable, EvalError> {
        self.libraries
            .get(name)
            .ok_or_else(|| EvalError::UnknownLibrary {
                name: name.to_string(),
            })
    }
}

fn is_open_parenthesis(element: &ExpressionElement) -> bool {
    element.kind() == ElementKind::Symbol && element.text() == "("
}

/// Splits `library.member` on the first dot; bare names belong to the default library.
fn split_qualified(text: &str) -> (&str, &str) {
    text.split_once('.').unwrap_or((DEFAULT_LIBRARY, text))
}

fn resolve(
    library: &str,
    kind: MemberKind,
    name: &str,
    found: Option<HandlerResult>,
) -> Result<Variant, EvalError> {
    match found {
        Some(Ok(value)) => Ok(value),
        Some(Err(source)) => Err(EvalError::Invocation {
            library: library.to_string(),
            kind,
            name: name.to_string(),
            source,
        }),
        None => Err(EvalError::MemberNotFound {
            library: library.to_string(),
            kind,
            name: name.to_string(),
        }),
    }
}
