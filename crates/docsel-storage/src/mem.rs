use crate::traits::{
    is_deleted, Ack, DocumentStore, StoreResult, ViewOptions, ViewRow, ID_KEY, REV_KEY,
};
use docsel_core::util::blake3_hex;
use docsel_core::StoreError;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    // key -> latest revision (tombstones included), ordered for prefix views
    docs: BTreeMap<String, JsonValue>,
}

fn rev_seq(doc: &JsonValue) -> u64 {
    doc.get(REV_KEY)
        .and_then(|v| v.as_str())
        .and_then(|r| r.split_once('-'))
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a write and returns its ack.
    pub(crate) fn write(&self, doc: JsonValue, key: &str) -> StoreResult<Ack> {
        self.write_with(doc, key, |_| Ok(()))
    }

    /// Applies a write once `commit` accepts the stored document (`_id` and
    /// `_rev` set). The store lock is held across `commit`; an error from it
    /// leaves the store unchanged.
    pub(crate) fn write_with<F>(&self, mut doc: JsonValue, key: &str, commit: F) -> StoreResult<Ack>
    where
        F: FnOnce(&JsonValue) -> StoreResult<()>,
    {
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| StoreError::Internal(format!("{key}: document must be an object")))?;
        let given = obj.remove(REV_KEY);
        let mut inner = self.inner.write();
        let seq = match inner.docs.get(key) {
            Some(cur) if !is_deleted(cur) => {
                if given.as_ref() != cur.get(REV_KEY) {
                    return Err(StoreError::Conflict(format!(
                        "{key}: document update conflict"
                    )));
                }
                rev_seq(cur)
            }
            Some(tombstone) => rev_seq(tombstone),
            None => 0,
        };
        obj.insert(ID_KEY.into(), JsonValue::String(key.to_string()));
        let digest = blake3_hex(doc.to_string().as_bytes());
        let rev = format!("{}-{}", seq + 1, &digest[..8]);
        if let Some(obj) = doc.as_object_mut() {
            obj.insert(REV_KEY.into(), JsonValue::String(rev.clone()));
        }
        commit(&doc)?;
        inner.docs.insert(key.to_string(), doc);
        Ok(Ack {
            id: key.to_string(),
            rev,
        })
    }

    /// Restores a stored revision verbatim, bypassing revision checks.
    pub fn replay_insert(&self, doc: JsonValue) {
        if let Some(key) = doc.get(ID_KEY).and_then(|v| v.as_str()).map(str::to_string) {
            self.inner.write().docs.insert(key, doc);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .docs
            .values()
            .filter(|d| !is_deleted(d))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<JsonValue> {
        let inner = self.inner.read();
        match inner.docs.get(key) {
            Some(doc) if !is_deleted(doc) => Ok(doc.clone()),
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn insert(&self, doc: JsonValue, key: &str) -> StoreResult<Ack> {
        self.write(doc, key)
    }

    async fn query_view(
        &self,
        collection: &str,
        view: &str,
        opts: ViewOptions,
    ) -> StoreResult<Vec<ViewRow>> {
        let inner = self.inner.read();
        let design_id = format!("_design/{collection}");
        let design = inner
            .docs
            .get(&design_id)
            .filter(|d| !is_deleted(d))
            .ok_or_else(|| StoreError::NotFound(design_id.clone()))?;
        let prefix = design
            .pointer(&format!("/views/{view}/prefix"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("{design_id}/{view}")))?;
        let rows = inner
            .docs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(k, doc)| {
                !is_deleted(doc) && opts.key.as_deref().map_or(true, |want| want == k.as_str())
            })
            .map(|(k, doc)| ViewRow {
                id: k.clone(),
                key: k.clone(),
                value: doc.clone(),
                doc: opts.include_docs.then(|| doc.clone()),
            })
            .collect();
        Ok(rows)
    }

    fn all_documents(&self) -> Vec<JsonValue> {
        self.inner
            .read()
            .docs
            .values()
            .filter(|d| !is_deleted(d))
            .cloned()
            .collect()
    }
}
