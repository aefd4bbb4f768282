//! Library bundles: operators, methods and variables available to expressions.
//!
//! A [`Library`] fills a [`MemberTable`] once, when it is added to a
//! [`Computer`](crate::Computer). Lookups then only walk these tables in
//! registration order; nothing is discovered at evaluation time.

use std::{ops::Index, sync::Arc};

use thiserror::Error;

use crate::value::Variant;

/// Failure raised by a library handler.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("cannot parse `{value}` as a date with format `{format}`")]
    DateParse {
        value: String,
        format: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

impl LibraryError {
    pub fn message(message: impl Into<String>) -> Self {
        LibraryError::Message(message.into())
    }
}

pub type HandlerResult = Result<Variant, LibraryError>;

pub type Handler = Arc<dyn Fn(Args<'_>) -> HandlerResult + Send + Sync>;
pub type Producer = Arc<dyn Fn() -> HandlerResult + Send + Sync>;
pub type DefaultMethod = Arc<dyn Fn(&str, &[Variant]) -> HandlerResult + Send + Sync>;
pub type DefaultVariable = Arc<dyn Fn(&str) -> HandlerResult + Send + Sync>;

/// Declared type of a handler parameter. Arguments are coerced to it before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Integer,
    Long,
    Double,
    String,
    Boolean,
    Variant,
}

impl ParamType {
    pub fn coerce(self, value: &Variant) -> Variant {
        match self {
            ParamType::Integer => Variant::integer(value.as_integer()),
            ParamType::Long => Variant::long(value.as_long()),
            ParamType::Double => Variant::double(value.as_double()),
            ParamType::String => Variant::string(value.as_string()),
            ParamType::Boolean => Variant::boolean(value.as_boolean()),
            ParamType::Variant => value.clone(),
        }
    }
}

/// Parameter list of a method: fixed slots, optionally followed by one
/// variadic slot that absorbs every remaining argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ParamType>,
    variadic: Option<ParamType>,
}

impl Signature {
    pub fn fixed(params: impl Into<Vec<ParamType>>) -> Self {
        Signature {
            params: params.into(),
            variadic: None,
        }
    }

    pub fn variadic(params: impl Into<Vec<ParamType>>, rest: ParamType) -> Self {
        Signature {
            params: params.into(),
            variadic: Some(rest),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn accepts(&self, count: usize) -> bool {
        match self.variadic {
            Some(_) => count >= self.params.len(),
            None => count == self.params.len(),
        }
    }

    fn bind(&self, arguments: &[Variant]) -> Vec<Variant> {
        let rest = self.variadic.unwrap_or(ParamType::Variant);
        arguments
            .iter()
            .enumerate()
            .map(|(index, value)| self.params.get(index).copied().unwrap_or(rest).coerce(value))
            .collect()
    }
}

/// Coerced arguments handed to a handler.
///
/// Indexing below [`Args::fixed`] is always in bounds; the dispatcher only
/// calls a handler whose signature accepts the argument count.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    values: &'a [Variant],
    fixed: usize,
}

impl<'a> Args<'a> {
    pub fn new(values: &'a [Variant], fixed: usize) -> Self {
        Args { values, fixed }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fixed(&self) -> usize {
        self.fixed
    }

    pub fn get(&self, index: usize) -> Option<&'a Variant> {
        self.values.get(index)
    }

    /// Values bound to the variadic slot, in call order.
    pub fn rest(&self) -> &'a [Variant] {
        &self.values[self.fixed.min(self.values.len())..]
    }

    pub fn values(&self) -> &'a [Variant] {
        self.values
    }
}

impl Index<usize> for Args<'_> {
    type Output = Variant;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

#[derive(Clone)]
pub enum Variable {
    Constant(Variant),
    /// Re-invoked on every access.
    Producer(Producer),
}

#[derive(Clone)]
struct OperatorEntry {
    symbol: String,
    params: [ParamType; 2],
    handler: Handler,
}

#[derive(Clone)]
struct MethodEntry {
    name: String,
    signature: Signature,
    handler: Handler,
}

#[derive(Clone)]
struct VariableEntry {
    name: String,
    variable: Variable,
}

/// The operators, methods and variables one library contributes.
#[derive(Clone, Default)]
pub struct MemberTable {
    operators: Vec<OperatorEntry>,
    methods: Vec<MethodEntry>,
    variables: Vec<VariableEntry>,
    default_method: Option<DefaultMethod>,
    default_variable: Option<DefaultVariable>,
}

impl MemberTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operator<F>(&mut self, symbol: impl Into<String>, params: [ParamType; 2], handler: F) -> &mut Self
    where
        F: Fn(Args<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.operators.push(OperatorEntry {
            symbol: symbol.into(),
            params,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn method<F>(&mut self, name: impl Into<String>, signature: Signature, handler: F) -> &mut Self
    where
        F: Fn(Args<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.methods.push(MethodEntry {
            name: name.into(),
            signature,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn constant(&mut self, name: impl Into<String>, value: Variant) -> &mut Self {
        self.variables.push(VariableEntry {
            name: name.into(),
            variable: Variable::Constant(value),
        });
        self
    }

    pub fn producer<F>(&mut self, name: impl Into<String>, producer: F) -> &mut Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        self.variables.push(VariableEntry {
            name: name.into(),
            variable: Variable::Producer(Arc::new(producer)),
        });
        self
    }

    /// Fallback for calls with no matching method: receives the method name and raw arguments.
    pub fn default_method<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&str, &[Variant]) -> HandlerResult + Send + Sync + 'static,
    {
        self.default_method = Some(Arc::new(handler));
        self
    }

    /// Fallback for unknown variable names.
    pub fn default_variable<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        self.default_variable = Some(Arc::new(handler));
        self
    }

    /// Runs the first operator registered for `symbol`; `None` when there is none.
    pub fn call_operator(&self, symbol: &str, lhs: &Variant, rhs: &Variant) -> Option<HandlerResult> {
        let entry = self.operators.iter().find(|entry| entry.symbol == symbol)?;
        let values = [entry.params[0].coerce(lhs), entry.params[1].coerce(rhs)];
        Some((entry.handler)(Args::new(&values, 2)))
    }

    /// Runs the first method named `name` whose signature accepts `arguments`,
    /// falling back to the default method handler.
    pub fn call_method(&self, name: &str, arguments: &[Variant]) -> Option<HandlerResult> {
        let found = self
            .methods
            .iter()
            .find(|entry| entry.name == name && entry.signature.accepts(arguments.len()));
        if let Some(entry) = found {
            let values = entry.signature.bind(arguments);
            return Some((entry.handler)(Args::new(&values, entry.signature.arity())));
        }
        self.default_method
            .as_ref()
            .map(|handler| handler(name, arguments))
    }

    /// Reads a constant or producer variable, falling back to the default variable handler.
    pub fn read_variable(&self, name: &str) -> Option<HandlerResult> {
        let found = self.variables.iter().find(|entry| entry.name == name);
        match found.map(|entry| &entry.variable) {
            Some(Variable::Constant(value)) => Some(Ok(value.clone())),
            Some(Variable::Producer(producer)) => Some(producer()),
            None => self
                .default_variable
                .as_ref()
                .map(|handler| handler(name)),
        }
    }
}

/// A named bundle of members. Implementors describe their members once, in
/// [`Library::register`].
pub trait Library {
    fn register(&self, members: &mut MemberTable);
}

impl Library for MemberTable {
    fn register(&self, members: &mut MemberTable) {
        *members = self.clone();
    }
}
