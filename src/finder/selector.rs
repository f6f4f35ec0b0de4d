//! Entity selector compiler.
//!
//! A selector is a small filter expression stored in list definitions
//! (`annal:list_entity_selector`) and field definitions
//! (`annal:field_ref_restriction`):
//!
//! ```text
//! selector := value op value END | "ALL" | ""
//! value    := "[" ident "]" | name "[" ident "]" | quoted | ident
//! op       := "==" | "in" | "subtype" | name
//! ```
//!
//! `[p]` reads property `p` of the entity under test, `name[p]` reads
//! property `p` of a context object bound under `name`, anything else is a
//! string literal. Compiled selectors are total: evaluation never fails.

use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

use serde_json::{Map, Value};

use crate::entity::EntityValues;
use crate::error::{StoreError, StoreResult, ValidationError};

/// Named context objects a selector may refer to (`view[annal:record_type]`).
pub type SelectorContext = Map<String, Value>;

/// Comparison hooks consulted while evaluating a selector.
///
/// `subtype` backs the built-in `subtype` operator; any other operator name
/// accepted at compile time dispatches to `compare`.
pub trait EntityComparator {
    /// Returns true if type URI `a` is `b` or a (transitive) subtype of `b`.
    fn subtype(&self, a: &str, b: &str) -> bool;

    /// Names of additional operators this comparator implements.
    fn operators(&self) -> &[&str] {
        &[]
    }

    /// Evaluates an additional operator.
    fn compare(&self, op: &str, a: &Value, b: &Value) -> bool {
        let _ = (op, a, b);
        false
    }
}

/// Comparator with no type hierarchy: a type is only a subtype of itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityComparator;

impl EntityComparator for IdentityComparator {
    fn subtype(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `[field]`: a property of the entity under test.
    Entity(String),
    /// `name[field]`: a property of a named context object.
    Context {
        /// Context binding name.
        name: String,
        /// Property within the bound object.
        field: String,
    },
    /// A quoted string or bare identifier.
    Literal(String),
}

impl Operand {
    fn evaluate(&self, entity: &EntityValues, context: &SelectorContext) -> Value {
        match self {
            Self::Entity(field) => entity.get(field).cloned().unwrap_or(Value::Null),
            Self::Context { name, field } => context
                .get(name)
                .and_then(|obj| obj.get(field))
                .cloned()
                .unwrap_or(Value::Null),
            Self::Literal(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(field) => write!(f, "[{field}]"),
            Self::Context { name, field } => write!(f, "{name}[{field}]"),
            Self::Literal(s) => write!(f, "{s:?}"),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Eq,
    /// `in`: membership when the right side is a list, else equality.
    In,
    /// `subtype`: type hierarchy test via the comparator.
    Subtype,
    /// Any other name, evaluated by the comparator.
    Custom(String),
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => f.write_str("=="),
            Self::In => f.write_str("in"),
            Self::Subtype => f.write_str("subtype"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    All,
    Compare {
        lhs: Operand,
        op: Operator,
        rhs: Operand,
    },
}

/// A compiled selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    predicate: Predicate,
}

impl Selector {
    /// Selector that passes every entity.
    #[must_use]
    pub fn all() -> Self {
        Self {
            source: String::new(),
            predicate: Predicate::All,
        }
    }

    /// Compiles a selector using only the built-in operators.
    ///
    /// # Errors
    /// `SelectorSyntax` for malformed input or an unknown operator.
    pub fn parse(source: &str) -> StoreResult<Self> {
        Self::parse_with(source, &[])
    }

    /// Compiles a selector that may also use the named extra operators.
    ///
    /// # Errors
    /// `SelectorSyntax` for malformed input or an operator not in `extra_ops`.
    pub fn parse_with(source: &str, extra_ops: &[&str]) -> StoreResult<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() || trimmed == "ALL" {
            return Ok(Self {
                source: source.to_string(),
                predicate: Predicate::All,
            });
        }
        let mut parser = Parser::new(source);
        let lhs = parser.operand()?;
        let op = parser.operator(extra_ops)?;
        let rhs = parser.operand()?;
        parser.end()?;
        Ok(Self {
            source: source.to_string(),
            predicate: Predicate::Compare { lhs, op, rhs },
        })
    }

    /// Compiles an optional selector; `None` passes everything.
    ///
    /// # Errors
    /// As [`Selector::parse`].
    pub fn from_option(source: Option<&str>) -> StoreResult<Self> {
        source.map_or_else(|| Ok(Self::all()), Self::parse)
    }

    /// Returns the selector text as given.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns true if this selector passes every entity.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self.predicate, Predicate::All)
    }

    /// Evaluates the selector against one entity.
    #[must_use]
    pub fn select(
        &self,
        entity: &EntityValues,
        context: &SelectorContext,
        comparator: &dyn EntityComparator,
    ) -> bool {
        let Predicate::Compare { lhs, op, rhs } = &self.predicate else {
            return true;
        };
        let a = lhs.evaluate(entity, context);
        let b = rhs.evaluate(entity, context);
        match op {
            Operator::Eq => a == b,
            Operator::In => match_in(&a, &b),
            Operator::Subtype => match_subtype(&a, &b, comparator),
            Operator::Custom(name) => comparator.compare(name, &a, &b),
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for Selector {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::All => f.write_str("ALL"),
            Predicate::Compare { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}

fn is_unrestricted(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn match_in(a: &Value, b: &Value) -> bool {
    if is_unrestricted(a) {
        return true;
    }
    match b {
        Value::Array(items) => items.contains(a),
        _ => a == b,
    }
}

fn match_subtype(a: &Value, b: &Value, comparator: &dyn EntityComparator) -> bool {
    let Some(b) = b.as_str().filter(|s| !s.is_empty()) else {
        return true;
    };
    match a {
        Value::Null => true,
        Value::String(a) => a.is_empty() || comparator.subtype(a, b),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|a| comparator.subtype(a, b)),
        _ => false,
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '@'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-.~:/?#@!$&'()*+,;=".contains(c)
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> StoreError {
        ValidationError::SelectorSyntax {
            selector: self.input.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn pos(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |(i, _)| *i)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn expect(&mut self, want: char) -> StoreResult<()> {
        match self.chars.next() {
            Some((_, c)) if c == want => Ok(()),
            Some((i, c)) => Err(self.error(format!("expected '{want}' at {i}, found '{c}'"))),
            None => Err(self.error(format!("expected '{want}' at end of selector"))),
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos();
        while self.chars.next_if(|(_, c)| pred(*c)).is_some() {}
        let end = self.pos();
        let input = self.input;
        &input[start..end]
    }

    fn ident(&mut self) -> StoreResult<&'a str> {
        match self.peek() {
            Some(c) if is_ident_start(c) => Ok(self.take_while(is_ident_char)),
            Some(c) => {
                let at = self.pos();
                Err(self.error(format!("unexpected '{c}' at {at}")))
            }
            None => Err(self.error("unexpected end of selector")),
        }
    }

    fn bracketed(&mut self) -> StoreResult<&'a str> {
        self.expect('[')?;
        let field = self.ident()?;
        self.expect(']')?;
        Ok(field)
    }

    fn quoted(&mut self, quote: char) -> StoreResult<String> {
        self.expect(quote)?;
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some((_, c)) if c == quote => return Ok(out),
                Some((_, c)) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn operand(&mut self) -> StoreResult<Operand> {
        self.skip_ws();
        match self.peek() {
            Some('[') => Ok(Operand::Entity(self.bracketed()?.to_string())),
            Some(q @ ('"' | '\'')) => Ok(Operand::Literal(self.quoted(q)?)),
            Some(c) if is_ident_start(c) => {
                let start = self.pos();
                // name[field] shares its leading characters with a bare identifier
                let rest = &self.input[start..];
                let name_len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
                if is_name_start(c) && rest[name_len..].starts_with('[') {
                    let name = self.take_while(is_name_char);
                    let field = self.bracketed()?;
                    return Ok(Operand::Context {
                        name: name.to_string(),
                        field: field.to_string(),
                    });
                }
                Ok(Operand::Literal(self.ident()?.to_string()))
            }
            Some(c) => {
                let at = self.pos();
                Err(self.error(format!("unexpected '{c}' at {at}")))
            }
            None => Err(self.error("missing operand")),
        }
    }

    fn operator(&mut self, extra_ops: &[&str]) -> StoreResult<Operator> {
        self.skip_ws();
        if self.peek() == Some('=') {
            self.expect('=')?;
            self.expect('=')?;
            return Ok(Operator::Eq);
        }
        match self.peek() {
            Some(c) if is_name_start(c) => {}
            Some(c) => {
                let at = self.pos();
                return Err(self.error(format!("expected operator at {at}, found '{c}'")));
            }
            None => return Err(self.error("missing operator")),
        }
        match self.take_while(is_name_char) {
            "in" => Ok(Operator::In),
            "subtype" => Ok(Operator::Subtype),
            name if extra_ops.contains(&name) => Ok(Operator::Custom(name.to_string())),
            name => Err(self.error(format!("unknown operator '{name}'"))),
        }
    }

    fn end(&mut self) -> StoreResult<()> {
        self.skip_ws();
        match self.chars.next() {
            None => Ok(()),
            Some((i, _)) => Err(self.error(format!("unexpected trailing text at {i}"))),
        }
    }
}
