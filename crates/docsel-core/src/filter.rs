//! String-matching filters over (possibly nested) document fields.

use crate::errors::{QueryError, Result};
use crate::fields::{self, Field, FieldTree};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::fmt;

/// Filter operator, written as a single trailing symbol on a query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Match {
    /// `=`
    Exact,
    /// `~` one of a comma-separated list
    OneOf,
    /// `|` equal, or prefixed by `value-`
    LangTag,
    /// `*`
    Contains,
    /// `^`
    Prefix,
    /// `$`
    Suffix,
    /// Anything else; never matches.
    Unknown(String),
}

impl Match {
    pub const SYMBOLS: [char; 6] = ['=', '~', '|', '*', '^', '$'];

    pub fn from_symbol(sym: &str) -> Self {
        match sym {
            "=" => Match::Exact,
            "~" => Match::OneOf,
            "|" => Match::LangTag,
            "*" => Match::Contains,
            "^" => Match::Prefix,
            "$" => Match::Suffix,
            other => Match::Unknown(other.to_string()),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Match::Exact => "=",
            Match::OneOf => "~",
            Match::LangTag => "|",
            Match::Contains => "*",
            Match::Prefix => "^",
            Match::Suffix => "$",
            Match::Unknown(s) => s,
        }
    }

    pub fn test(&self, text: &str, needle: &str) -> bool {
        match self {
            Match::Exact => text == needle,
            Match::OneOf => needle.split(',').any(|v| v == text),
            Match::LangTag => {
                text == needle
                    || text
                        .strip_prefix(needle)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
            Match::Contains => text.contains(needle),
            Match::Prefix => text.starts_with(needle),
            Match::Suffix => text.ends_with(needle),
            Match::Unknown(_) => false,
        }
    }
}

impl From<String> for Match {
    fn from(s: String) -> Self {
        Match::from_symbol(&s)
    }
}

impl From<Match> for String {
    fn from(m: Match) -> Self {
        m.symbol().to_string()
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `property` is a plain name or a single-branch selection such as
/// `owner:(address:(city))`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub property: String,
    #[serde(rename = "match")]
    pub op: Match,
    #[serde(rename = "filter")]
    pub value: String,
}

impl Filter {
    pub fn new(property: impl Into<String>, op: Match, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn path(&self) -> Result<Vec<String>> {
        property_path(&self.property)
    }
}

/// Resolves a filter property through the selection grammar into the list of
/// segments to descend.
pub fn property_path(property: &str) -> Result<Vec<String>> {
    let tree = fields::parse(property)?;
    let mut path = Vec::new();
    let mut cur = &tree;
    loop {
        let mut it = cur.iter();
        let (name, field) = match (it.next(), it.next()) {
            (Some(entry), None) => entry,
            (None, _) => return Err(QueryError::malformed(property, "empty filter property")),
            (Some(_), Some(_)) => {
                return Err(QueryError::malformed(
                    property,
                    "filter property must select exactly one field per level",
                ))
            }
        };
        path.push(name.to_string());
        match field {
            Field::Leaf => return Ok(path),
            Field::Node(sub) => cur = sub,
        }
    }
}

/// True when `doc` satisfies `filter`. Absent segments and non-scalar values
/// never match.
pub fn matches(doc: &JsonValue, filter: &Filter) -> bool {
    match filter.path() {
        Ok(path) => matches_path(doc, &path, &filter.op, &filter.value),
        Err(_) => false,
    }
}

fn matches_path(value: &JsonValue, path: &[String], op: &Match, needle: &str) -> bool {
    match path.split_first() {
        None => scalar_text(value).is_some_and(|text| op.test(&text, needle)),
        Some((head, rest)) => value
            .get(head.as_str())
            .is_some_and(|inner| matches_path(inner, rest, op, needle)),
    }
}

fn scalar_text(value: &JsonValue) -> Option<Cow<'_, str>> {
    match value {
        JsonValue::String(s) => Some(Cow::Borrowed(s)),
        JsonValue::Number(n) => Some(Cow::Owned(n.to_string())),
        JsonValue::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

/// Keeps the documents matching every filter, in their original order.
pub fn filter_all(docs: Vec<JsonValue>, filters: &[Filter]) -> Vec<JsonValue> {
    if filters.is_empty() {
        return docs;
    }
    let compiled: Option<Vec<(Vec<String>, &Filter)>> = filters
        .iter()
        .map(|f| f.path().ok().map(|p| (p, f)))
        .collect();
    let Some(compiled) = compiled else {
        return Vec::new();
    };
    docs.into_iter()
        .filter(|doc| {
            compiled
                .iter()
                .all(|(path, f)| matches_path(doc, path, &f.op, &f.value))
        })
        .collect()
}

/// Whether `schema` reaches `path`. A leaf selects everything beneath it.
pub fn selects(schema: &FieldTree, path: &[String]) -> bool {
    match path.split_first() {
        None => true,
        Some((head, rest)) => match schema.get(head) {
            Some(Field::Leaf) => true,
            Some(Field::Node(sub)) => selects(sub, rest),
            None => false,
        },
    }
}

/// Splits a parameter name into property and operator: `name^` is a prefix
/// match on `name`, a bare `name` is exact.
pub fn split_operator(param: &str) -> (&str, Match) {
    match param.chars().last() {
        Some(c) if Match::SYMBOLS.contains(&c) => {
            let cut = param.len() - c.len_utf8();
            (&param[..cut], Match::from_symbol(&param[cut..]))
        }
        _ => (param, Match::Exact),
    }
}

/// Builds filters from query parameters. Parameters whose property does not
/// parse or is not reached by `schema` are dropped.
pub fn filters_from_params<I, K, V>(params: I, schema: Option<&FieldTree>) -> Vec<Filter>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    params
        .into_iter()
        .filter_map(|(name, value)| {
            let (property, op) = split_operator(name.as_ref());
            let path = property_path(property).ok()?;
            if let Some(schema) = schema {
                if !selects(schema, &path) {
                    return None;
                }
            }
            Some(Filter::new(property, op, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(op: &str, needle: &str, name: &str) -> bool {
        matches(
            &json!({ "name": name }),
            &Filter::new("name", Match::from_symbol(op), needle),
        )
    }

    #[test]
    fn exact() {
        assert!(hit("=", "foo", "foo"));
        assert!(!hit("=", "foo", "foobar"));
    }

    #[test]
    fn one_of() {
        assert!(hit("~", "foo,bar", "foo"));
        assert!(hit("~", "foo,bar", "bar"));
        assert!(!hit("~", "foo,bar", "baz"));
    }

    #[test]
    fn lang_tag() {
        assert!(hit("|", "foo", "foo"));
        assert!(hit("|", "foo", "foo-bar"));
        assert!(!hit("|", "foo", "bar"));
        assert!(!hit("|", "foo", "foobar"));
    }

    #[test]
    fn contains_prefix_suffix() {
        assert!(hit("*", "bar", "foobar"));
        assert!(!hit("*", "baz", "foobar"));
        assert!(hit("^", "f", "foo"));
        assert!(hit("^", "f", "furz"));
        assert!(!hit("^", "f", "goo"));
        assert!(hit("$", "bar", "foobar"));
        assert!(hit("$", "bar", "barbar"));
        assert!(!hit("$", "bar", "foo"));
    }

    #[test]
    fn unknown_operator_never_matches() {
        assert!(!hit("!", "foo", "foo"));
        assert!(!hit(">=", "a", "b"));
    }

    #[test]
    fn numbers_and_bools_compare_as_text() {
        let doc = json!({"age": 7, "alive": true, "tags": ["a"], "nil": null});
        assert!(matches(&doc, &Filter::new("age", Match::Exact, "7")));
        assert!(matches(&doc, &Filter::new("alive", Match::Exact, "true")));
        assert!(!matches(&doc, &Filter::new("tags", Match::Contains, "a")));
        assert!(!matches(&doc, &Filter::new("nil", Match::Exact, "null")));
    }

    #[test]
    fn nested_property_descends() {
        let doc = json!({"owner": {"address": {"city": "Berlin"}}, "name": "tom"});
        assert!(matches(
            &doc,
            &Filter::new("owner:(address:(city))", Match::Exact, "Berlin")
        ));
        assert!(matches(&doc, &Filter::new("owner:(address:(city))", Match::Prefix, "Ber")));
        assert!(!matches(&doc, &Filter::new("owner:(address:(zip))", Match::Exact, "1")));
        assert!(!matches(&doc, &Filter::new("name:(first)", Match::Exact, "tom")));
        assert!(!matches(&doc, &Filter::new("pet:(name)", Match::Exact, "tom")));
    }

    #[test]
    fn multi_branch_property_is_rejected() {
        assert!(property_path("a,b").is_err());
        assert!(property_path("a:(b,c)").is_err());
        assert!(property_path("").is_err());
        assert_eq!(property_path("a:(b:(c))").unwrap(), vec!["a", "b", "c"]);
        assert!(!matches(&json!({"a": "x", "b": "x"}), &Filter::new("a,b", Match::Exact, "x")));
    }

    #[test]
    fn filter_all_is_conjunctive_and_ordered() {
        let docs = vec![
            json!({"id": "1", "name": "foo", "race": "tabby"}),
            json!({"id": "2", "name": "bar", "race": "tabby"}),
            json!({"id": "3", "name": "foo", "race": "siamese"}),
            json!({"id": "4", "name": "foo", "race": "tabby-mix"}),
        ];
        let filters = vec![
            Filter::new("name", Match::Exact, "foo"),
            Filter::new("race", Match::LangTag, "tabby"),
        ];
        let ids: Vec<_> = filter_all(docs.clone(), &filters)
            .into_iter()
            .map(|d| d["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("1"), json!("4")]);
        assert_eq!(filter_all(docs.clone(), &[]), docs);
    }

    #[test]
    fn operator_suffix_parsing() {
        assert_eq!(split_operator("name"), ("name", Match::Exact));
        assert_eq!(split_operator("name="), ("name", Match::Exact));
        assert_eq!(split_operator("name~"), ("name", Match::OneOf));
        assert_eq!(split_operator("name|"), ("name", Match::LangTag));
        assert_eq!(split_operator("name*"), ("name", Match::Contains));
        assert_eq!(split_operator("name^"), ("name", Match::Prefix));
        assert_eq!(split_operator("name$"), ("name", Match::Suffix));
    }

    #[test]
    fn params_outside_schema_are_discarded() {
        let schema = fields::parse("name,owner:(first,last),meta").unwrap();
        let filters = filters_from_params(
            vec![
                ("name^", "f"),
                ("colour", "red"),
                ("owner:(first)", "ann"),
                ("owner:(middle)", "x"),
                ("meta:(anything)", "y"),
                ("broken:(", "z"),
            ],
            Some(&schema),
        );
        assert_eq!(
            filters,
            vec![
                Filter::new("name", Match::Prefix, "f"),
                Filter::new("owner:(first)", Match::Exact, "ann"),
                Filter::new("meta:(anything)", Match::Exact, "y"),
            ]
        );
        assert_eq!(filters_from_params(vec![("colour", "red")], None).len(), 1);
    }

    #[test]
    fn filter_serde_uses_wire_names() {
        let f: Filter =
            serde_json::from_value(json!({"property": "name", "match": "^", "filter": "f"})).unwrap();
        assert_eq!(f, Filter::new("name", Match::Prefix, "f"));
        assert_eq!(
            serde_json::to_value(Filter::new("name", Match::Unknown("?".into()), "x")).unwrap(),
            json!({"property": "name", "match": "?", "filter": "x"})
        );
    }
}
