use crate::errors::Result;
use crate::fields::{self, FieldTree};
use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A field selection as supplied by a caller: already parsed, or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Text(String),
    Tree(FieldTree),
}

impl Selection {
    pub fn resolve(&self) -> Result<FieldTree> {
        match self {
            Selection::Text(s) => fields::parse(s),
            Selection::Tree(t) => Ok(t.clone()),
        }
    }
}

impl From<&str> for Selection {
    fn from(s: &str) -> Self {
        Selection::Text(s.to_string())
    }
}

impl From<String> for Selection {
    fn from(s: String) -> Self {
        Selection::Text(s)
    }
}

impl From<FieldTree> for Selection {
    fn from(t: FieldTree) -> Self {
        Selection::Tree(t)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub fields: Option<Selection>,
    // false reduces collection results to public ids
    #[serde(default)]
    pub include_docs: bool,
}

impl FindOptions {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            include_docs: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn fields(mut self, fields: impl Into<Selection>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn include_docs(mut self, include: bool) -> Self {
        self.include_docs = include;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FindResult {
    Document(JsonValue),
    Documents(Vec<JsonValue>),
    Ids(Vec<String>),
}

impl FindResult {
    pub fn into_document(self) -> Option<JsonValue> {
        match self {
            FindResult::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_documents(self) -> Option<Vec<JsonValue>> {
        match self {
            FindResult::Documents(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_ids(self) -> Option<Vec<String>> {
        match self {
            FindResult::Ids(ids) => Some(ids),
            _ => None,
        }
    }
}
