//! Field-selection micro-language.
//!
//! ```text
//! fields := [ field { ',' field } ]
//! field  := name [ ':' '(' fields ')' ]
//! ```
//!
//! `id,snippet:(title,name)` selects `id` verbatim and only `title` and `name`
//! below `snippet`.

use crate::errors::{QueryError, Result};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// One entry of a [`FieldTree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Include the value as-is.
    Leaf,
    /// Recurse into the value with a sub-selection.
    Node(FieldTree),
}

/// Ordered mapping from field name to [`Field`].
///
/// Iteration order is insertion order and drives [`fmt::Display`]; equality
/// ignores order.
#[derive(Debug, Clone, Default)]
pub struct FieldTree {
    entries: Vec<(String, Field)>,
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, f)| f)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f))
    }

    /// Inserts `field` under `name`. An existing entry keeps its position and
    /// takes the new value. Names the grammar cannot express are rejected.
    pub fn insert(&mut self, name: impl Into<String>, field: Field) -> Result<()> {
        let name = name.into();
        check_name(&name)?;
        self.put(name, field);
        Ok(())
    }

    fn put(&mut self, name: String, field: Field) {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = field,
            None => self.entries.push((name, field)),
        }
    }

    /// Builds a tree from its JSON shape: either the text form or an object
    /// whose values are `true` or nested objects.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::String(s) => parse(s),
            JsonValue::Object(map) => {
                let mut tree = FieldTree::new();
                for (k, v) in map {
                    let field = match v {
                        JsonValue::Bool(true) => Field::Leaf,
                        JsonValue::Object(_) => Field::Node(FieldTree::from_json(v)?),
                        other => {
                            return Err(QueryError::malformed(
                                &value.to_string(),
                                format!("field {k:?} must be true or an object, got {other}"),
                            ))
                        }
                    };
                    tree.insert(k.clone(), field)?;
                }
                Ok(tree)
            }
            other => Err(QueryError::malformed(
                &other.to_string(),
                "expected a selection string or object",
            )),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let map = self
            .iter()
            .map(|(k, f)| {
                let v = match f {
                    Field::Leaf => JsonValue::Bool(true),
                    Field::Node(sub) => sub.to_json(),
                };
                (k.to_string(), v)
            })
            .collect();
        JsonValue::Object(map)
    }
}

impl PartialEq for FieldTree {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, f)| other.get(k).is_some_and(|o| o == f))
    }
}

impl fmt::Display for FieldTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, field)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match field {
                Field::Leaf => f.write_str(name)?,
                Field::Node(sub) => write!(f, "{name}:({sub})")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldTree {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

impl Serialize for FieldTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, f) in self.iter() {
            match f {
                Field::Leaf => map.serialize_entry(k, &true)?,
                Field::Node(sub) => map.serialize_entry(k, sub)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        FieldTree::from_json(&value).map_err(D::Error::custom)
    }
}

/// A field name must be non-empty, carry no surrounding whitespace and avoid
/// `,:()`; anything else would not survive [`stringify`] then [`parse`].
pub fn check_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty field name"
    } else if name.trim() != name {
        "field name has surrounding whitespace"
    } else if name.contains([',', ':', '(', ')']) {
        "field name contains one of ',:()'"
    } else {
        return Ok(());
    };
    Err(QueryError::malformed(name, reason))
}

/// Canonical text form of `tree`.
pub fn stringify(tree: &FieldTree) -> String {
    tree.to_string()
}

/// Parses a field selection. The empty string is the empty tree.
pub fn parse(input: &str) -> Result<FieldTree> {
    let tokens = tokenize(input);
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let tree = parser.fields()?;
    match parser.peek() {
        None => Ok(tree),
        Some((Token::RParen, at)) => Err(parser.error(format!("unbalanced ')' at {at}"))),
        Some((tok, at)) => Err(parser.error(format!("unexpected {tok} at {at}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Comma,
    Colon,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(n) => write!(f, "name {n:?}"),
            Token::Comma => f.write_str("','"),
            Token::Colon => f.write_str("':'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

// Names are maximal runs of non-punctuation with surrounding whitespace
// trimmed; whitespace-only runs produce no token.
fn tokenize(input: &str) -> Vec<(Token, usize)> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let flush = |out: &mut Vec<(Token, usize)>, from: usize, to: usize| {
        let raw = &input[from..to];
        let name = raw.trim();
        if !name.is_empty() {
            let offset = from + (raw.len() - raw.trim_start().len());
            out.push((Token::Name(name.to_string()), offset));
        }
    };
    for (i, c) in input.char_indices() {
        let punct = match c {
            ',' => Token::Comma,
            ':' => Token::Colon,
            '(' => Token::LParen,
            ')' => Token::RParen,
            _ => continue,
        };
        flush(&mut out, start, i);
        out.push((punct, i));
        start = i + c.len_utf8();
    }
    flush(&mut out, start, input.len());
    out
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, reason: String) -> QueryError {
        QueryError::malformed(self.input, reason)
    }

    fn fields(&mut self) -> Result<FieldTree> {
        let mut tree = FieldTree::new();
        if matches!(self.peek(), None | Some((Token::RParen, _))) {
            return Ok(tree);
        }
        loop {
            let (name, field) = self.field()?;
            tree.put(name, field);
            match self.peek() {
                Some((Token::Comma, _)) => {
                    self.pos += 1;
                }
                _ => return Ok(tree),
            }
        }
    }

    fn field(&mut self) -> Result<(String, Field)> {
        let name = match self.next() {
            Some((Token::Name(n), _)) => n,
            Some((tok, at)) => {
                return Err(self.error(format!("expected field name at {at}, found {tok}")))
            }
            None => return Err(self.error("expected field name at end of input".into())),
        };
        if !matches!(self.peek(), Some((Token::Colon, _))) {
            return Ok((name, Field::Leaf));
        }
        self.pos += 1;
        match self.next() {
            Some((Token::LParen, _)) => {}
            Some((tok, at)) => {
                return Err(self.error(format!("expected '(' after {name:?}: at {at}, found {tok}")))
            }
            None => return Err(self.error(format!("expected '(' after {name:?}:"))),
        }
        let sub = self.fields()?;
        match self.next() {
            Some((Token::RParen, _)) => Ok((name, Field::Node(sub))),
            Some((tok, at)) => Err(self.error(format!("expected ')' at {at}, found {tok}"))),
            None => Err(self.error(format!("unbalanced '(' in group {name:?}"))),
        }
    }
}
