use miette::NamedSource;
use tracing::debug;

use crate::{
    comment::strip_comments,
    lex::{
        ParseError, Position, SyntaxError, UnexpectedEndOfInput, is_entity_start,
        is_expression_start, is_identifier_continue, is_identifier_start, is_whitespace,
    },
    tree::{ElementId, ElementKind, EntityId, EntityKind, Notation, Section},
};

/// Operators recognized when no custom set is given.
pub const DEFAULT_OPERATORS: [&str; 12] = [
    "+", "-", "*", "/", "==", "!=", ">", "<", ">=", "<=", "&&", "||",
];

pub struct Parser<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    operators: Vec<String>,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Self::with_operators(filename, whole, DEFAULT_OPERATORS)
    }

    pub fn with_operators<I, S>(filename: Option<&'de str>, whole: &'de str, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Parser {
            filename,
            whole,
            operators: operators.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parse(self) -> Result<Notation, ParseError> {
        let (data, terminated) = prepare(self.whole);
        let last = data.chars().count().saturating_sub(1);
        let mut builder = Builder::new(&self);

        for (index, c) in data.chars().enumerate() {
            builder.column += 1;
            if c == '\n' {
                builder.column = 0;
                builder.line += 1;
            }

            let skip_whitespace = !matches!(builder.state, State::String | State::StringEscape);
            if skip_whitespace && is_whitespace(c) {
                builder.after_whitespace = true;
                builder.offset += 1;
                continue;
            }
            builder.spaced = std::mem::take(&mut builder.after_whitespace);

            builder.state = match builder.step(c) {
                Ok(state) => state,
                // the appended terminator was rejected: the text itself stopped short
                Err(Fault::Unexpected) if terminated && index == last => {
                    return Err(UnexpectedEndOfInput::build(self.source(), builder.position()).into());
                }
                Err(fault) => return Err(builder.fail(&self, fault, c)),
            };
            builder.offset += 1;
        }

        builder.finish(&self)
    }

    fn source(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string())
    }
}

/// Strips comments, terminates the text with `.` and normalizes line breaks.
///
/// Character count is preserved apart from the appended terminator; the flag
/// reports whether one was appended.
fn prepare(whole: &str) -> (String, bool) {
    let mut data = strip_comments(whole);
    let terminated = !data.trim_end().ends_with('.');
    if terminated {
        data.push('.');
    }
    (data.replace("\r\n", " \n").replace('\r', "\n"), terminated)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Section,
    SectionName,
    SectionOpen,
    SectionClose,
    EntityName,
    EntityAssignment,
    ArrayOpen,
    ArrayComma,
    ArrayClose,
    ParenthesisOpen,
    ParenthesisClose,
    String,
    StringEscape,
    StringEnd,
    UnaryMinus,
    Number,
    NumberDot,
    NumberFloat,
    Operator,
    Identifier,
    FunctionOpen,
    FunctionArgumentComma,
    StatementEnd,
    Final,
}

enum Fault {
    /// No transition is defined for the current character.
    Unexpected,
    Invalid {
        message: String,
        help: Option<String>,
        at: Position,
    },
}

struct Builder<'p> {
    operators: &'p [String],
    tree: Notation,
    state: State,

    offset: usize,
    line: usize,
    column: usize,
    after_whitespace: bool,
    /// Whitespace immediately preceded the current character.
    spaced: bool,

    buffer: String,
    token_start: Position,
    member_name: Option<String>,

    current: EntityId,
    element: Option<ElementId>,
    array_balance: usize,
    section_balance: usize,
}

impl<'p> Builder<'p> {
    fn new(parser: &'p Parser<'_>) -> Self {
        let tree = Notation::new(parser.filename, parser.whole);
        let current = tree.root();
        Builder {
            operators: &parser.operators,
            tree,
            state: State::Start,
            offset: 0,
            line: 1,
            column: 0,
            after_whitespace: false,
            spaced: false,
            buffer: String::new(),
            token_start: Position::default(),
            member_name: None,
            current,
            element: None,
            array_balance: 0,
            section_balance: 0,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.offset, self.line, self.column)
    }

    fn step(&mut self, c: char) -> Result<State, Fault> {
        match self.state {
            State::Start => self.on_start(c),
            State::Section => self.on_section(c),
            State::SectionName => self.on_section_name(c),
            State::SectionOpen => self.on_section_open(c),
            State::SectionClose => self.on_section_close(c),
            State::EntityName => self.on_entity_name(c),
            State::EntityAssignment | State::ArrayComma => self.on_value_expected(c),
            State::ArrayOpen => self.on_array_open(c),
            State::ArrayClose => self.terminator(c),
            State::ParenthesisOpen | State::FunctionArgumentComma => self.on_expression_expected(c),
            State::ParenthesisClose | State::StringEnd => self.on_operand_end(c),
            State::String => self.on_string(c),
            State::StringEscape => self.on_string_escape(c),
            State::UnaryMinus => self.on_unary_minus(c),
            State::Number => self.on_number(c),
            State::NumberDot => self.on_number_dot(c),
            State::NumberFloat => self.on_number_float(c),
            State::Operator => self.on_operator(c),
            State::Identifier => self.on_identifier(c),
            State::FunctionOpen => self.on_function_open(c),
            State::StatementEnd => self.on_statement_end(c),
            State::Final => Err(Fault::Unexpected),
        }
    }

    fn on_start(&mut self, c: char) -> Result<State, Fault> {
        if c != '#' {
            return Err(Fault::Unexpected);
        }
        let position = self.position();
        let root = self.tree.root();
        self.tree.entity_mut(root).position = position;
        Ok(State::Section)
    }

    fn on_section(&mut self, c: char) -> Result<State, Fault> {
        if !is_identifier_start(c) {
            return Err(Fault::Unexpected);
        }
        self.begin_token(c);
        Ok(State::SectionName)
    }

    fn on_section_name(&mut self, c: char) -> Result<State, Fault> {
        if !self.spaced && is_identifier_continue(c) {
            self.buffer.push(c);
            return Ok(State::SectionName);
        }
        if c != '{' {
            return Err(Fault::Unexpected);
        }
        self.section_balance += 1;
        let name = std::mem::take(&mut self.buffer);
        if let EntityKind::Section(section) = &mut self.tree.entity_mut(self.current).kind {
            section.name = Some(name);
        }
        Ok(State::SectionOpen)
    }

    fn on_section_open(&mut self, c: char) -> Result<State, Fault> {
        if c == '}' && self.section_balance > 0 {
            self.close_section();
            return Ok(State::SectionClose);
        }
        if !is_identifier_start(c) {
            return Err(Fault::Unexpected);
        }
        self.begin_token(c);
        Ok(State::EntityName)
    }

    fn on_section_close(&mut self, c: char) -> Result<State, Fault> {
        // the root section is closed; only the terminator may follow
        if self.section_balance == 0 {
            return if c == '.' {
                Ok(State::Final)
            } else {
                Err(Fault::Unexpected)
            };
        }
        self.terminator(c)
    }

    fn on_entity_name(&mut self, c: char) -> Result<State, Fault> {
        if !self.spaced && is_identifier_continue(c) {
            self.buffer.push(c);
            return Ok(State::EntityName);
        }
        if c != '=' {
            return Err(Fault::Unexpected);
        }
        self.member_name = Some(std::mem::take(&mut self.buffer));
        Ok(State::EntityAssignment)
    }

    fn on_statement_end(&mut self, c: char) -> Result<State, Fault> {
        if is_identifier_start(c) {
            self.begin_token(c);
            return Ok(State::EntityName);
        }
        if c == '}' && self.section_balance > 0 {
            self.close_section();
            return Ok(State::SectionClose);
        }
        Err(Fault::Unexpected)
    }

    fn on_value_expected(&mut self, c: char) -> Result<State, Fault> {
        if is_entity_start(c) {
            return self.value_start(c, true);
        }
        Err(Fault::Unexpected)
    }

    fn on_array_open(&mut self, c: char) -> Result<State, Fault> {
        if c == ']' && self.array_balance > 0 {
            self.close_array();
            return Ok(State::ArrayClose);
        }
        self.on_value_expected(c)
    }

    fn on_expression_expected(&mut self, c: char) -> Result<State, Fault> {
        if is_expression_start(c) {
            return self.value_start(c, false);
        }
        Err(Fault::Unexpected)
    }

    fn on_function_open(&mut self, c: char) -> Result<State, Fault> {
        if c == ')' {
            return self.terminator(c);
        }
        self.on_expression_expected(c)
    }

    fn on_operand_end(&mut self, c: char) -> Result<State, Fault> {
        if self.operator_starts(c) {
            return Ok(self.start_operator(c));
        }
        self.terminator(c)
    }

    fn on_string(&mut self, c: char) -> Result<State, Fault> {
        match c {
            '\\' => Ok(State::StringEscape),
            '"' => {
                self.flush(ElementKind::String);
                Ok(State::StringEnd)
            }
            _ => {
                self.buffer.push(c);
                Ok(State::String)
            }
        }
    }

    fn on_string_escape(&mut self, c: char) -> Result<State, Fault> {
        let unescaped = match c {
            '"' => '"',
            '\\' => '\\',
            't' => '\t',
            _ => {
                return Err(Fault::Invalid {
                    message: format!("invalid escape sequence '\\{}'", c.escape_debug()),
                    help: Some("only `\\\"`, `\\\\` and `\\t` are recognized".to_string()),
                    at: self.position(),
                });
            }
        };
        self.buffer.push(unescaped);
        Ok(State::String)
    }

    fn on_unary_minus(&mut self, c: char) -> Result<State, Fault> {
        if !c.is_ascii_digit() {
            return Err(Fault::Unexpected);
        }
        self.buffer.push(c);
        Ok(State::Number)
    }

    fn on_number(&mut self, c: char) -> Result<State, Fault> {
        if !self.spaced && c.is_ascii_digit() {
            self.buffer.push(c);
            return Ok(State::Number);
        }
        if !self.spaced && c == '.' {
            self.buffer.push(c);
            return Ok(State::NumberDot);
        }
        self.after_operand(c, ElementKind::Number)
    }

    fn on_number_dot(&mut self, c: char) -> Result<State, Fault> {
        if self.spaced || !c.is_ascii_digit() {
            return Err(Fault::Unexpected);
        }
        self.buffer.push(c);
        Ok(State::NumberFloat)
    }

    fn on_number_float(&mut self, c: char) -> Result<State, Fault> {
        if !self.spaced && c.is_ascii_digit() {
            self.buffer.push(c);
            return Ok(State::NumberFloat);
        }
        self.after_operand(c, ElementKind::Number)
    }

    fn on_identifier(&mut self, c: char) -> Result<State, Fault> {
        if !self.spaced && is_identifier_continue(c) {
            self.buffer.push(c);
            return Ok(State::Identifier);
        }
        if c == '(' {
            self.open_function();
            return Ok(State::FunctionOpen);
        }
        self.after_operand(c, ElementKind::Identifier)
    }

    fn on_operator(&mut self, c: char) -> Result<State, Fault> {
        if !self.spaced && self.operator_extends(c) {
            self.buffer.push(c);
            return Ok(State::Operator);
        }
        self.on_expression_expected(c)
    }

    /// A number or identifier token ended: an operator or a terminator follows.
    fn after_operand(&mut self, c: char, kind: ElementKind) -> Result<State, Fault> {
        if self.operator_starts(c) {
            self.flush(kind);
            return Ok(self.start_operator(c));
        }
        self.terminator(c)
    }

    /// Opens whatever member value, array item or expression term starts with `c`.
    fn value_start(&mut self, c: char, entity_beginning: bool) -> Result<State, Fault> {
        let position = self.position();

        if entity_beginning && c == '[' {
            self.array_balance += 1;
            let name = self.member_name.take();
            let id = self
                .tree
                .push_entity(name, self.current, position, EntityKind::Array(Default::default()));
            self.tree.attach(id);
            self.current = id;
            return Ok(State::ArrayOpen);
        }

        if entity_beginning && c == '#' {
            let name = self.member_name.take();
            let section = EntityKind::Section(Section {
                name: None,
                members: Vec::new(),
            });
            let id = self.tree.push_entity(name, self.current, position, section);
            self.tree.attach(id);
            self.current = id;
            return Ok(State::Section);
        }

        if self.state == State::Operator {
            self.emit_operator()?;
        } else if !self.tree.entity(self.current).is_expression() {
            let name = self.member_name.take();
            let (id, root) = self.tree.push_expression(name, self.current, position);
            self.tree.attach(id);
            self.current = id;
            self.element = Some(root);
        }

        if self.state == State::FunctionArgumentComma {
            let function = self
                .element
                .and_then(|element| self.tree.element(element).parent());
            if let Some(function) = function {
                let argument = self.tree.extend_element(
                    function,
                    ElementKind::FunctionArgument,
                    String::new(),
                    position,
                );
                self.element = Some(argument);
            }
        }

        match c {
            '(' => {
                self.open_parenthesis();
                Ok(State::ParenthesisOpen)
            }
            '"' => {
                self.buffer.clear();
                self.token_start = position;
                Ok(State::String)
            }
            '-' => {
                self.begin_token(c);
                Ok(State::UnaryMinus)
            }
            c if c.is_ascii_digit() => {
                self.begin_token(c);
                Ok(State::Number)
            }
            c if is_identifier_start(c) => {
                self.begin_token(c);
                Ok(State::Identifier)
            }
            _ => Err(Fault::Unexpected),
        }
    }

    /// Handles `,` `;` `]` and `)` after a finished value.
    fn terminator(&mut self, c: char) -> Result<State, Fault> {
        if !matches!(c, ',' | ';' | ']' | ')') {
            return Err(Fault::Unexpected);
        }

        match self.state {
            State::Number | State::NumberFloat => self.flush(ElementKind::Number),
            State::Identifier => self.flush(ElementKind::Identifier),
            _ => {}
        }

        if matches!(
            self.state,
            State::Number
                | State::NumberFloat
                | State::Identifier
                | State::ParenthesisClose
                | State::StringEnd
        ) {
            self.maybe_close_expression(c);
        }

        let current = self.tree.entity(self.current);
        let (in_section, in_array, in_expression) = (
            current.is_section(),
            current.is_array(),
            current.is_expression(),
        );
        let expression_depth = current
            .as_expression()
            .map_or(0, |expression| expression.paren_depth);
        let element = self.element.map(|id| self.tree.element(id));
        let element_depth = element.map_or(0, |element| element.paren_depth);
        let in_argument = element.is_some_and(|e| e.kind == ElementKind::FunctionArgument);

        match c {
            ';' if in_section => Ok(State::StatementEnd),
            ',' if in_array => Ok(State::ArrayComma),
            ',' if in_expression && in_argument && element_depth == 0 => {
                Ok(State::FunctionArgumentComma)
            }
            ')' if in_expression && element_depth > 0 => {
                self.close_parenthesis();
                Ok(State::ParenthesisClose)
            }
            ')' if in_expression && in_argument && expression_depth > 0 => {
                self.close_function();
                Ok(State::ParenthesisClose)
            }
            ']' if in_array && self.array_balance > 0 => {
                self.close_array();
                Ok(State::ArrayClose)
            }
            _ => Err(Fault::Unexpected),
        }
    }

    /// Leaves the current expression when `c` ends it at parenthesis depth zero.
    fn maybe_close_expression(&mut self, c: char) {
        let current = self.tree.entity(self.current);
        let Some(expression) = current.as_expression() else {
            return;
        };
        let parent_is_array = current
            .parent()
            .is_some_and(|parent| self.tree.entity(parent).is_array());
        let ends = matches!(c, ';' | ']') || (c == ',' && parent_is_array);
        if expression.paren_depth == 0 && ends {
            if let Some(parent) = current.parent() {
                self.current = parent;
            }
        }
    }

    fn begin_token(&mut self, c: char) {
        self.buffer.clear();
        self.buffer.push(c);
        self.token_start = self.position();
    }

    fn start_operator(&mut self, c: char) -> State {
        self.begin_token(c);
        State::Operator
    }

    /// Emits the buffered token as a child of the current element.
    fn flush(&mut self, kind: ElementKind) {
        let text = std::mem::take(&mut self.buffer);
        if let Some(element) = self.element {
            self.tree.extend_element(element, kind, text, self.token_start);
        }
    }

    fn emit_operator(&mut self) -> Result<(), Fault> {
        if !self.operators.iter().any(|op| *op == self.buffer) {
            return Err(Fault::Invalid {
                message: format!("unknown operator '{}'", self.buffer),
                help: Some(format!("registered operators: {}", self.operators.join(" "))),
                at: self.token_start,
            });
        }
        self.flush(ElementKind::Operator);
        Ok(())
    }

    fn operator_starts(&self, c: char) -> bool {
        self.operators.iter().any(|op| op.starts_with(c))
    }

    fn operator_extends(&self, c: char) -> bool {
        let mut candidate = self.buffer.clone();
        candidate.push(c);
        self.operators
            .iter()
            .any(|op| op.starts_with(candidate.as_str()))
    }

    fn adjust_depths(&mut self, element: ElementId, open: bool) {
        let node = self.tree.element_mut(element);
        node.paren_depth = if open {
            node.paren_depth + 1
        } else {
            node.paren_depth.saturating_sub(1)
        };
        if let Some(expression) = self.tree.expression_mut(self.current) {
            expression.paren_depth = if open {
                expression.paren_depth + 1
            } else {
                expression.paren_depth.saturating_sub(1)
            };
        }
    }

    fn open_parenthesis(&mut self) {
        let Some(element) = self.element else {
            return;
        };
        self.adjust_depths(element, true);
        let position = self.position();
        self.tree
            .extend_element(element, ElementKind::Symbol, "(".to_string(), position);
    }

    fn close_parenthesis(&mut self) {
        let Some(element) = self.element else {
            return;
        };
        let position = self.position();
        self.tree
            .extend_element(element, ElementKind::Symbol, ")".to_string(), position);
        self.adjust_depths(element, false);
    }

    fn open_function(&mut self) {
        let Some(element) = self.element else {
            return;
        };
        self.adjust_depths(element, true);
        let name = std::mem::take(&mut self.buffer);
        let function =
            self.tree
                .extend_element(element, ElementKind::Function, name, self.token_start);
        let position = self.position();
        let argument = self.tree.extend_element(
            function,
            ElementKind::FunctionArgument,
            String::new(),
            position,
        );
        self.element = Some(argument);
    }

    /// `)` of a call: jump from the argument wrapper over the function node
    /// back to the element that contains the call.
    fn close_function(&mut self) {
        let outer = self
            .element
            .and_then(|argument| self.tree.element(argument).parent())
            .and_then(|function| self.tree.element(function).parent());
        if let Some(outer) = outer {
            self.element = Some(outer);
            self.adjust_depths(outer, false);
        }
    }

    fn close_section(&mut self) {
        self.section_balance -= 1;
        if let Some(parent) = self.tree.entity(self.current).parent() {
            self.current = parent;
        }
    }

    fn close_array(&mut self) {
        self.array_balance -= 1;
        if let Some(parent) = self.tree.entity(self.current).parent() {
            self.current = parent;
        }
    }

    fn fail(&self, parser: &Parser<'_>, fault: Fault, c: char) -> ParseError {
        match fault {
            Fault::Unexpected => SyntaxError::unexpected(parser.source(), c, self.position()).into(),
            Fault::Invalid { message, help, at } => {
                SyntaxError::invalid(parser.source(), message, help, Some(c), at).into()
            }
        }
    }

    fn finish(self, parser: &Parser<'_>) -> Result<Notation, ParseError> {
        let position = self.position();
        match self.state {
            State::Final => {
                debug!(
                    entities = self.tree.entity_count(),
                    elements = self.tree.element_count(),
                    "parsed notation"
                );
                Ok(self.tree)
            }
            State::String | State::StringEscape => Err(SyntaxError::invalid(
                parser.source(),
                "unterminated string literal".to_string(),
                Some("add the missing trailing `\"`".to_string()),
                None,
                position,
            )
            .into()),
            _ => Err(UnexpectedEndOfInput::build(parser.source(), position).into()),
        }
    }
}
