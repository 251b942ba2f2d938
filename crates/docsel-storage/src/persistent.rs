use crate::traits::{Ack, DocumentStore, StoreResult, ViewOptions, ViewRow};
use crate::wal::{Wal, WalRecord};
use crate::InMemoryStore;
use docsel_core::StoreError;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::info;

/// [`InMemoryStore`] made durable by a JSON-lines write-ahead log under
/// `<data_dir>/wal`.
pub struct PersistentStore {
    mem: InMemoryStore,
    wal: parking_lot::Mutex<Wal>,
    data_dir: PathBuf,
}

impl PersistentStore {
    pub fn open(data_dir: PathBuf) -> std::io::Result<Self> {
        let wal_dir = data_dir.join("wal");
        let mem = replay(&wal_dir)?;
        info!(dir = %data_dir.display(), docs = mem.len(), "replayed wal");
        let wal = Wal::open(&wal_dir)?;
        Ok(Self {
            mem,
            wal: parking_lot::Mutex::new(wal),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Rebuilds the in-memory state recorded in a WAL directory.
pub fn replay(wal_dir: &Path) -> std::io::Result<InMemoryStore> {
    let mem = InMemoryStore::new();
    for rec in Wal::replay(wal_dir)? {
        match rec {
            WalRecord::Insert { doc, .. } => mem.replay_insert(doc),
        }
    }
    Ok(mem)
}

#[async_trait::async_trait]
impl DocumentStore for PersistentStore {
    async fn get(&self, key: &str) -> StoreResult<JsonValue> {
        self.mem.get(key).await
    }

    async fn insert(&self, doc: JsonValue, key: &str) -> StoreResult<Ack> {
        // log order must follow apply order; nothing is applied unless logged
        let mut wal = self.wal.lock();
        self.mem.write_with(doc, key, |stored| {
            wal.append(&WalRecord::Insert {
                key: key.to_string(),
                doc: stored.clone(),
            })
            .map_err(|e| StoreError::Io(e.to_string()))
        })
    }

    async fn query_view(
        &self,
        collection: &str,
        view: &str,
        opts: ViewOptions,
    ) -> StoreResult<Vec<ViewRow>> {
        self.mem.query_view(collection, view, opts).await
    }

    fn all_documents(&self) -> Vec<JsonValue> {
        self.mem.all_documents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reopening_restores_documents_and_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let rev = {
            let store = PersistentStore::open(dir.path().to_path_buf()).unwrap();
            store
                .insert(json!({"views": {"findAll": {"prefix": "cat-"}}}), "_design/cat")
                .await
                .unwrap();
            let first = store.insert(json!({"name": "tom"}), "cat-tom").await.unwrap();
            let gone = store.insert(json!({"name": "kit"}), "cat-kit").await.unwrap();
            store
                .insert(json!({"_rev": gone.rev, "_deleted": true}), "cat-kit")
                .await
                .unwrap();
            store
                .insert(json!({"name": "tommy", "_rev": first.rev}), "cat-tom")
                .await
                .unwrap()
                .rev
        };

        let store = PersistentStore::open(dir.path().to_path_buf()).unwrap();
        let tom = store.get("cat-tom").await.unwrap();
        assert_eq!(tom["name"], "tommy");
        assert_eq!(tom["_rev"], rev.as_str());
        assert!(store.get("cat-kit").await.is_err());
        let rows = store
            .query_view("cat", "findAll", ViewOptions::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.all_documents().len(), 2);

        // revision checks continue from the replayed state
        let err = store.insert(json!({"name": "x"}), "cat-tom").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_log_append_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path().to_path_buf()).unwrap();
        let first = store.insert(json!({"name": "tom"}), "cat-tom").await.unwrap();
        let segment = store.wal.lock().path().to_path_buf();
        *store.wal.lock() = Wal::read_only(&segment).unwrap();

        let err = store
            .insert(json!({"name": "tommy", "_rev": first.rev.clone()}), "cat-tom")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        let err = store.insert(json!({"name": "kit"}), "cat-kit").await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        // memory still agrees with the log
        let tom = store.get("cat-tom").await.unwrap();
        assert_eq!(tom["name"], "tom");
        assert_eq!(tom["_rev"], first.rev.as_str());
        assert!(store.get("cat-kit").await.is_err());
        drop(store);
        let reopened = PersistentStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.get("cat-tom").await.unwrap(), tom);
        assert!(reopened.get("cat-kit").await.is_err());
    }
}
