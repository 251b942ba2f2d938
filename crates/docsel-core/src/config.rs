use crate::fields::FieldTree;
use crate::util::{slugify, timestamped_id};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// How public ids are minted for documents saved without one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// `<unix-millis>-<hash8>`
    #[default]
    Timestamped,
    /// Slug of a string field, e.g. `"Tom Cat"` becomes `tom-cat`. Falls back
    /// to [`IdStrategy::Timestamped`] when the field is missing or empty.
    Field(String),
}

impl IdStrategy {
    pub fn generate(&self, doc: &JsonValue) -> String {
        match self {
            IdStrategy::Timestamped => timestamped_id(doc),
            IdStrategy::Field(name) => doc
                .get(name)
                .and_then(|v| v.as_str())
                .map(slugify)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| timestamped_id(doc)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Collection (view) name. Private ids are `<collection>-<id>`.
    pub collection: String,
    /// Schema enforced on saves and used to validate filter parameters.
    #[serde(default)]
    pub fields: Option<FieldTree>,
    #[serde(default)]
    pub id: IdStrategy,
}

impl ResourceConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: None,
            id: IdStrategy::default(),
        }
    }

    pub fn with_fields(mut self, fields: FieldTree) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_id(mut self, id: IdStrategy) -> Self {
        self.id = id;
        self
    }

    pub fn private_id(&self, id: &str) -> String {
        format!("{}-{}", self.collection, id)
    }

    /// Inverse of [`ResourceConfig::private_id`]; `None` for ids outside the
    /// collection.
    pub fn public_id<'a>(&self, private: &'a str) -> Option<&'a str> {
        private
            .strip_prefix(self.collection.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
    }

    pub fn design_id(&self) -> String {
        format!("_design/{}", self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::parse;
    use serde_json::json;

    #[test]
    fn private_and_public_ids_are_inverse() {
        let cfg = ResourceConfig::new("cat");
        assert_eq!(cfg.private_id("tom"), "cat-tom");
        assert_eq!(cfg.public_id("cat-tom"), Some("tom"));
        assert_eq!(cfg.public_id("cat-tom-2"), Some("tom-2"));
        assert_eq!(cfg.public_id("catalog-1"), None);
        assert_eq!(cfg.public_id("dog-1"), None);
        assert_eq!(cfg.design_id(), "_design/cat");
    }

    #[test]
    fn deserializes_text_fields_and_id_strategy() {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "collection": "cat",
            "fields": "name,race,fur,food",
            "id": {"field": "name"}
        }))
        .unwrap();
        assert_eq!(cfg.fields, Some(parse("name,race,fur,food").unwrap()));
        assert_eq!(cfg.id, IdStrategy::Field("name".into()));

        let bare: ResourceConfig = serde_json::from_value(json!({"collection": "cat"})).unwrap();
        assert!(bare.fields.is_none());
        assert_eq!(bare.id, IdStrategy::Timestamped);
    }

    #[test]
    fn field_strategy_slugifies_and_falls_back() {
        let strategy = IdStrategy::Field("name".into());
        assert_eq!(strategy.generate(&json!({"name": "Tom Cat"})), "tom-cat");
        let fallback = strategy.generate(&json!({"race": "tabby"}));
        assert!(fallback.split_once('-').is_some());
    }
}
