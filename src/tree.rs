//! The parsed notation tree.
//!
//! All nodes of one parse live in two arenas owned by [`Notation`]: one for
//! entities (sections, arrays, expressions) and one for expression elements.
//! Parent links are plain indices and never own anything; only the child
//! lists describe the tree shape.

use std::fmt::Display;

use crate::lex::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Symbol,
    String,
    Number,
    Identifier,
    Function,
    FunctionArgument,
    Operator,
    GenericNode,
}

impl ElementKind {
    /// Article-prefixed name used in diagnostics, e.g. "an operator".
    pub fn describe(self) -> &'static str {
        match self {
            ElementKind::Symbol => "a symbol",
            ElementKind::String => "a string",
            ElementKind::Number => "a number",
            ElementKind::Identifier => "an identifier",
            ElementKind::Function => "a function",
            ElementKind::FunctionArgument => "a function argument",
            ElementKind::Operator => "an operator",
            ElementKind::GenericNode => "an expression",
        }
    }

    /// The element is pushed to the postfix output as soon as it is read.
    pub fn is_operand(self) -> bool {
        matches!(
            self,
            ElementKind::Number
                | ElementKind::String
                | ElementKind::Identifier
                | ElementKind::Function
                | ElementKind::GenericNode
        )
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementKind::Symbol => "SYMBOL",
            ElementKind::String => "STRING",
            ElementKind::Number => "NUMBER",
            ElementKind::Identifier => "IDENTIFIER",
            ElementKind::Function => "FUNCTION",
            ElementKind::FunctionArgument => "ARGUMENT",
            ElementKind::Operator => "OPERATOR",
            ElementKind::GenericNode => "NODE",
        };
        write!(f, "{name}")
    }
}

/// One node of an expression: a token, a call, an argument wrapper or the root node.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionElement {
    pub(crate) kind: ElementKind,
    pub(crate) text: String,
    pub(crate) children: Vec<ElementId>,
    pub(crate) paren_depth: usize,
    pub(crate) parent: Option<ElementId>,
    pub(crate) expression: EntityId,
    pub(crate) position: Position,
}

impl ExpressionElement {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// The expression entity this element belongs to.
    pub fn expression(&self) -> EntityId {
        self.expression
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Parentheses opened directly under this element and not yet closed.
    pub fn parenthesis_depth(&self) -> usize {
        self.paren_depth
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub(crate) name: Option<String>,
    pub(crate) members: Vec<EntityId>,
}

impl Section {
    /// The name written after `#`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array {
    pub(crate) items: Vec<EntityId>,
}

impl Array {
    pub fn items(&self) -> &[EntityId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub(crate) root: ElementId,
    pub(crate) paren_depth: usize,
}

impl Expression {
    /// The generic node holding the top-level token sequence.
    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn parenthesis_depth(&self) -> usize {
        self.paren_depth
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Section(Section),
    Array(Array),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<EntityId>,
    pub(crate) position: Position,
    pub(crate) kind: EntityKind,
}

impl Entity {
    /// Member name this entity is bound to in its parent section.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn as_section(&self) -> Option<&Section> {
        match &self.kind {
            EntityKind::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match &self.kind {
            EntityKind::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match &self.kind {
            EntityKind::Expression(expression) => Some(expression),
            _ => None,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self.kind, EntityKind::Section(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, EntityKind::Array(_))
    }

    pub fn is_expression(&self) -> bool {
        matches!(self.kind, EntityKind::Expression(_))
    }
}

/// A successfully parsed notation: the source text plus its tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Notation {
    filename: Option<String>,
    source: String,
    entities: Vec<Entity>,
    elements: Vec<ExpressionElement>,
}

const ROOT: EntityId = EntityId(0);

impl Notation {
    pub(crate) fn new(filename: Option<&str>, source: &str) -> Self {
        Notation {
            filename: filename.map(str::to_string),
            source: source.to_string(),
            entities: vec![Entity {
                name: None,
                parent: None,
                position: Position::new(0, 1, 1),
                kind: EntityKind::Section(Section {
                    name: None,
                    members: Vec::new(),
                }),
            }],
            elements: Vec::new(),
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> EntityId {
        ROOT
    }

    pub fn root_section(&self) -> &Section {
        match &self.entities[ROOT.0].kind {
            EntityKind::Section(section) => section,
            _ => unreachable!("the root entity is always a section"),
        }
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn element(&self, id: ElementId) -> &ExpressionElement {
        &self.elements[id.0]
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// First member of the section `section` bound to `name`.
    pub fn member(&self, section: EntityId, name: &str) -> Option<EntityId> {
        self.entity(section)
            .as_section()?
            .members
            .iter()
            .copied()
            .find(|&id| self.entity(id).name() == Some(name))
    }

    /// Resolves a dotted member path such as `"rate.rounding.unit_volume"`
    /// starting at the root section.
    pub fn find(&self, path: &str) -> Option<EntityId> {
        path.split('.')
            .try_fold(ROOT, |section, name| self.member(section, name))
    }

    pub(crate) fn push_entity(
        &mut self,
        name: Option<String>,
        parent: EntityId,
        position: Position,
        kind: EntityKind,
    ) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(Entity {
            name,
            parent: Some(parent),
            position,
            kind,
        });
        id
    }

    /// Creates an expression entity together with its root node.
    pub(crate) fn push_expression(
        &mut self,
        name: Option<String>,
        parent: EntityId,
        position: Position,
    ) -> (EntityId, ElementId) {
        let entity = EntityId(self.entities.len());
        let root = ElementId(self.elements.len());
        self.elements.push(ExpressionElement {
            kind: ElementKind::GenericNode,
            text: String::new(),
            children: Vec::new(),
            paren_depth: 0,
            parent: None,
            expression: entity,
            position,
        });
        self.push_entity(
            name,
            parent,
            position,
            EntityKind::Expression(Expression {
                root,
                paren_depth: 0,
            }),
        );
        (entity, root)
    }

    /// Appends `child` to the member list of its parent section or array.
    pub(crate) fn attach(&mut self, child: EntityId) {
        let Some(parent) = self.entities[child.0].parent else {
            return;
        };
        match &mut self.entities[parent.0].kind {
            EntityKind::Section(section) => section.members.push(child),
            EntityKind::Array(array) => array.items.push(child),
            EntityKind::Expression(_) => {}
        }
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> &mut ExpressionElement {
        &mut self.elements[id.0]
    }

    pub(crate) fn expression_mut(&mut self, id: EntityId) -> Option<&mut Expression> {
        match &mut self.entities[id.0].kind {
            EntityKind::Expression(expression) => Some(expression),
            _ => None,
        }
    }

    /// Adds a child element under `parent`, inheriting its expression.
    pub(crate) fn extend_element(
        &mut self,
        parent: ElementId,
        kind: ElementKind,
        text: String,
        position: Position,
    ) -> ElementId {
        let id = ElementId(self.elements.len());
        let expression = self.elements[parent.0].expression;
        self.elements.push(ExpressionElement {
            kind,
            text,
            children: Vec::new(),
            paren_depth: 0,
            parent: Some(parent),
            expression,
            position,
        });
        self.elements[parent.0].children.push(id);
        id
    }
}

const SPACES: &str = "                                                                ";

/// Two spaces per level. Format widths cap at `u16::MAX`, so the run is
/// written in slices instead.
fn indent(f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
    let mut width = depth * 2;
    while width > 0 {
        let run = width.min(SPACES.len());
        f.write_str(&SPACES[..run])?;
        width -= run;
    }
    Ok(())
}

enum Walk {
    Entity(EntityId, usize),
    Element(ElementId, usize),
    Close(&'static str, usize),
}

impl Display for Notation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // explicit stack so arbitrarily deep input cannot overflow the call stack
        let mut stack = vec![Walk::Entity(ROOT, 0)];
        while let Some(item) = stack.pop() {
            match item {
                Walk::Entity(id, depth) => {
                    let entity = self.entity(id);
                    indent(f, depth)?;
                    if let Some(name) = entity.name() {
                        write!(f, "{name} = ")?;
                    }
                    match &entity.kind {
                        EntityKind::Section(section) => {
                            writeln!(f, "SECTION '{}' {{", section.name().unwrap_or_default())?;
                            stack.push(Walk::Close("}", depth));
                            for &member in section.members.iter().rev() {
                                stack.push(Walk::Entity(member, depth + 1));
                            }
                        }
                        EntityKind::Array(array) => {
                            writeln!(f, "ARRAY [")?;
                            stack.push(Walk::Close("]", depth));
                            for &item in array.items.iter().rev() {
                                stack.push(Walk::Entity(item, depth + 1));
                            }
                        }
                        EntityKind::Expression(expression) => {
                            writeln!(f, "EXPRESSION")?;
                            for &child in self.element(expression.root).children.iter().rev() {
                                stack.push(Walk::Element(child, depth + 1));
                            }
                        }
                    }
                }
                Walk::Element(id, depth) => {
                    let element = self.element(id);
                    indent(f, depth)?;
                    writeln!(f, "{} '{}'", element.kind, element.text.escape_debug())?;
                    for &child in element.children.iter().rev() {
                        stack.push(Walk::Element(child, depth + 1));
                    }
                }
                Walk::Close(token, depth) => {
                    indent(f, depth)?;
                    writeln!(f, "{token}")?;
                }
            }
        }
        Ok(())
    }
}
