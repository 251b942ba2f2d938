//! Query orchestration for one managed collection.
//!
//! Documents are stored under `<collection>-<id>` and listed through the
//! `findAll` prefix view declared in `_design/<collection>`.

use crate::traits::{DocumentStore, ViewOptions, DELETED_KEY, ID_KEY, PRIVATE_KEYS, REV_KEY};
use docsel_core::filter::filter_all;
use docsel_core::project::{is_schema_mismatch, project};
use docsel_core::{
    FieldTree, FindOptions, FindResult, QueryError, ResourceConfig, Result, StoreError,
};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info};

pub const FIND_ALL_VIEW: &str = "findAll";

pub type IdGenerator = Arc<dyn Fn(&JsonValue) -> String + Send + Sync>;

/// Cheap to clone; holds no locks, so concurrent calls never wait on each
/// other here. Two concurrent saves of one id race at the store: the loser
/// gets a conflict, or the last writer wins when both read the same
/// revision before either writes.
#[derive(Clone)]
pub struct Resource {
    store: Arc<dyn DocumentStore>,
    config: Arc<ResourceConfig>,
    id_gen: IdGenerator,
}

impl Resource {
    pub fn new(store: Arc<dyn DocumentStore>, config: ResourceConfig) -> Self {
        let strategy = config.id.clone();
        Self {
            store,
            config: Arc::new(config),
            id_gen: Arc::new(move |doc| strategy.generate(doc)),
        }
    }

    pub fn with_id_generator<F>(mut self, f: F) -> Self
    where
        F: Fn(&JsonValue) -> String + Send + Sync + 'static,
    {
        self.id_gen = Arc::new(f);
        self
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Creates or refreshes the design document holding the collection views.
    pub async fn init(&self) -> Result<()> {
        let design_id = self.config.design_id();
        let mut design = json!({
            "views": {
                FIND_ALL_VIEW: { "prefix": format!("{}-", self.config.collection) }
            }
        });
        match self.store.get(&design_id).await {
            Ok(existing) => {
                if let Some(rev) = existing.get(REV_KEY) {
                    design[REV_KEY] = rev.clone();
                }
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.store.insert(design, &design_id).await?;
        info!(collection = %self.config.collection, "design document ready");
        Ok(())
    }

    /// Fetch, strip, filter (collections only), project, then optionally
    /// reduce to ids.
    pub async fn find(&self, opts: FindOptions) -> Result<FindResult> {
        let fields = opts.fields.as_ref().map(|s| s.resolve()).transpose()?;

        if let Some(id) = &opts.id {
            // single-id reads are never filtered
            let doc = self.fetch_one(id).await?;
            debug!(collection = %self.config.collection, %id, "found document");
            return Ok(FindResult::Document(apply_fields(doc, fields.as_ref())));
        }

        let docs = self.fetch_all().await?;
        let fetched = docs.len();
        let docs = filter_all(docs, &opts.filters);
        debug!(
            collection = %self.config.collection,
            fetched,
            matched = docs.len(),
            filters = opts.filters.len(),
            "filtered collection"
        );
        if !opts.include_docs {
            let ids = docs
                .iter()
                .filter_map(|d| d.get("id").and_then(|v| v.as_str()).map(str::to_string))
                .collect();
            return Ok(FindResult::Ids(ids));
        }
        Ok(FindResult::Documents(
            docs.into_iter()
                .map(|d| apply_fields(d, fields.as_ref()))
                .collect(),
        ))
    }

    /// Validates `entry` against the configured fields and stores it. Returns
    /// the public id, minted when `entry` carries none.
    pub async fn save(&self, entry: JsonValue) -> Result<String> {
        let mut body = match entry {
            JsonValue::Object(map) => map,
            other => return Err(self.mismatch(&other)),
        };
        let given_id = match body.remove("id") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(other) => {
                body.insert("id".into(), other);
                return Err(self.mismatch(&JsonValue::Object(body)));
            }
        };
        for key in PRIVATE_KEYS {
            body.remove(key);
        }
        let payload = JsonValue::Object(body);
        let mut safe = match &self.config.fields {
            Some(tree) => {
                if is_schema_mismatch(&payload, tree) {
                    return Err(self.mismatch(&payload));
                }
                into_map(project(&payload, tree))
            }
            None => into_map(payload),
        };

        let (id, existing) = match given_id {
            Some(id) => {
                let key = self.config.private_id(&id);
                match self.store.get(&key).await {
                    Ok(current) => (id, current.get(REV_KEY).cloned()),
                    Err(StoreError::NotFound(_)) => (id, None),
                    Err(e) => return Err(e.into()),
                }
            }
            None => ((self.id_gen)(&JsonValue::Object(safe.clone())), None),
        };
        let key = self.config.private_id(&id);
        safe.insert("id".into(), JsonValue::String(id.clone()));
        if let Some(rev) = existing {
            safe.insert(REV_KEY.into(), rev);
        }
        let ack = self.store.insert(JsonValue::Object(safe), &key).await?;
        debug!(collection = %self.config.collection, %id, rev = %ack.rev, "saved document");
        Ok(id)
    }

    /// Marks the document deleted; the store keeps a tombstone.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let key = self.config.private_id(id);
        let mut doc = match self.store.get(&key).await {
            Ok(doc) => doc,
            Err(StoreError::NotFound(_)) => return Err(self.not_found(id)),
            Err(e) => return Err(e.into()),
        };
        doc[DELETED_KEY] = JsonValue::Bool(true);
        self.store.insert(doc, &key).await?;
        debug!(collection = %self.config.collection, %id, "deleted document");
        Ok(())
    }

    async fn fetch_one(&self, id: &str) -> Result<JsonValue> {
        let rows = self
            .store
            .query_view(
                &self.config.collection,
                FIND_ALL_VIEW,
                ViewOptions {
                    key: Some(self.config.private_id(id)),
                    include_docs: true,
                },
            )
            .await?;
        rows.into_iter()
            .next()
            .and_then(|row| self.strip(row.into_document()))
            .ok_or_else(|| self.not_found(id))
    }

    async fn fetch_all(&self) -> Result<Vec<JsonValue>> {
        let rows = self
            .store
            .query_view(
                &self.config.collection,
                FIND_ALL_VIEW,
                ViewOptions::default(),
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| self.strip(row.into_document()))
            .collect())
    }

    /// Drops store-private metadata and puts the public id first.
    fn strip(&self, doc: JsonValue) -> Option<JsonValue> {
        let JsonValue::Object(mut map) = doc else {
            return None;
        };
        let private = map.get(ID_KEY)?.as_str()?.to_string();
        let public = self.config.public_id(&private)?.to_string();
        for key in PRIVATE_KEYS {
            map.remove(key);
        }
        map.remove("id");
        let mut out = Map::with_capacity(map.len() + 1);
        out.insert("id".into(), JsonValue::String(public));
        out.extend(map);
        Some(JsonValue::Object(out))
    }

    fn not_found(&self, id: &str) -> QueryError {
        QueryError::NotFound {
            collection: self.config.collection.clone(),
            id: id.to_string(),
        }
    }

    fn mismatch(&self, doc: &JsonValue) -> QueryError {
        QueryError::SchemaMismatch {
            document: doc.to_string(),
            expected: self
                .config
                .fields
                .as_ref()
                .map(FieldTree::to_string)
                .unwrap_or_else(|| "an object".into()),
        }
    }
}

fn apply_fields(doc: JsonValue, fields: Option<&FieldTree>) -> JsonValue {
    match fields {
        Some(tree) => project(&doc, tree),
        None => doc,
    }
}

fn into_map(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}
