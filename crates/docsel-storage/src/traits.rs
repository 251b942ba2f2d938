use docsel_core::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store-owned metadata keys. Never visible to projection or filtering.
pub const ID_KEY: &str = "_id";
pub const REV_KEY: &str = "_rev";
pub const DELETED_KEY: &str = "_deleted";
pub const PRIVATE_KEYS: [&str; 3] = [ID_KEY, REV_KEY, DELETED_KEY];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub id: String,
    pub rev: String,
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// Restrict rows to this key.
    pub key: Option<String>,
    pub include_docs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub id: String,
    pub key: String,
    pub value: JsonValue,
    #[serde(default)]
    pub doc: Option<JsonValue>,
}

impl ViewRow {
    pub fn into_document(self) -> JsonValue {
        self.doc.unwrap_or(self.value)
    }
}

/// Schemaless document store with CouchDB-style revisions and prefix views.
///
/// Writes to a key holding a live document must carry its current `_rev`,
/// otherwise they fail with [`StoreError::Conflict`]. A write with
/// `_deleted: true` leaves a tombstone that `get` and views skip.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> StoreResult<JsonValue>;
    async fn insert(&self, doc: JsonValue, key: &str) -> StoreResult<Ack>;
    async fn query_view(
        &self,
        collection: &str,
        view: &str,
        opts: ViewOptions,
    ) -> StoreResult<Vec<ViewRow>>;

    // Export of live documents (for admin dump)
    fn all_documents(&self) -> Vec<JsonValue> {
        Vec::new()
    }
}

pub fn is_deleted(doc: &JsonValue) -> bool {
    doc.get(DELETED_KEY).and_then(|v| v.as_bool()).unwrap_or(false)
}
