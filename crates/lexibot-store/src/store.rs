//! Sharded key-value store.
//!
//! Generic mapping from `(shard id, field name)` to arbitrary JSON, one JSON
//! document per shard on disk and an in-memory mirror serving all reads.
//! Every mutation persists the whole shard document first and installs it
//! into the mirror only once the write succeeded, so the mirror never
//! diverges from the last known-good disk content — not even transiently
//! while a write is in flight.
//!
//! Mutations against the same shard are serialized by a per-shard async
//! mutex; different shards proceed independently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};
use crate::fs::FileAdapter;
use crate::template::NameTemplate;

/// One shard's content: a flat JSON object keyed by field name.
type ShardDoc = Map<String, Value>;

/// Internal key of the implicit shard of an unsharded store.
const IMPLICIT_SHARD: &str = "";

/// File-backed key-value store with per-shard JSON documents.
pub struct ShardedStore {
    adapter: Arc<dyn FileAdapter>,
    dir: PathBuf,
    template: NameTemplate,
    shards: DashMap<String, ShardDoc>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ShardedStore {
    /// Open a store rooted at `dir`, creating the directory if missing and
    /// loading every shard file matching `template` into the mirror.
    ///
    /// A successful return is the readiness signal: the instance is fully
    /// loaded before any operation can be issued against it. Any failure
    /// here (uncreatable directory, unreadable or malformed shard file) is
    /// fatal to the instance.
    pub async fn open(
        adapter: Arc<dyn FileAdapter>,
        dir: impl Into<PathBuf>,
        template: NameTemplate,
    ) -> StoreResult<Self> {
        let dir = dir.into();
        if !adapter.exists(&dir).await {
            info!(path = %dir.display(), "storage directory missing, creating");
            adapter.mkdir(&dir).await.map_err(|e| StoreError::Init {
                path: dir.clone(),
                message: format!("cannot create storage directory: {e}"),
            })?;
        }

        let store = Self {
            adapter,
            dir,
            template,
            shards: DashMap::new(),
            locks: DashMap::new(),
        };

        let names = store
            .adapter
            .read_dir(&store.dir)
            .await
            .map_err(|e| StoreError::Init {
                path: store.dir.clone(),
                message: format!("cannot enumerate storage directory: {e}"),
            })?;

        // An unsharded store keeps its single document from first boot on.
        let literal = store.template.render(None);
        if !store.template.is_sharded() && !names.iter().any(|n| *n == literal) {
            let path = store.dir.join(&literal);
            info!(path = %path.display(), "creating empty store document");
            store
                .adapter
                .save_json(&path, &Value::Object(ShardDoc::new()))
                .await
                .map_err(|e| StoreError::Init {
                    path,
                    message: format!("cannot create store document: {e}"),
                })?;
        }

        for name in names {
            let Some(id) = store.template.match_name(&name) else {
                continue;
            };
            let path = store.dir.join(&name);
            let value = store
                .adapter
                .read_json(&path)
                .await
                .map_err(|e| StoreError::Init {
                    path: path.clone(),
                    message: format!("cannot read shard file: {e}"),
                })?;
            let Value::Object(doc) = value else {
                return Err(StoreError::Init {
                    path,
                    message: "shard file is not a JSON object".into(),
                });
            };
            store.shards.insert(id, doc);
        }

        info!(
            path = %store.dir.display(),
            shards = store.shards.len(),
            template = %store.template,
            "store loaded"
        );
        Ok(store)
    }

    /// Read one field from the mirror. No I/O, side-effect free; an unknown
    /// shard reads as empty.
    pub fn get(&self, field: &str, shard: Option<&str>) -> Option<Value> {
        let key = self.shard_key(shard);
        self.shards
            .get(&key)
            .and_then(|doc| doc.get(field).cloned())
    }

    /// Read several fields at once; absent fields are absent from the map.
    pub fn get_many(&self, fields: &[&str], shard: Option<&str>) -> HashMap<String, Value> {
        let key = self.shard_key(shard);
        let mut result = HashMap::new();
        if let Some(doc) = self.shards.get(&key) {
            for field in fields {
                if let Some(value) = doc.get(*field) {
                    result.insert((*field).to_string(), value.clone());
                }
            }
        }
        result
    }

    /// List the field names present in a shard (empty if the shard is absent).
    pub fn get_keys(&self, shard: Option<&str>) -> Vec<String> {
        let key = self.shard_key(shard);
        self.shards
            .get(&key)
            .map(|doc| doc.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Set one field and persist the shard. Returns `false` (with the mirror
    /// untouched) if the write fails.
    pub async fn update_item(&self, field: &str, value: Value, shard: Option<&str>) -> bool {
        let field = field.to_string();
        self.mutate(shard, move |doc| {
            doc.insert(field, value);
        })
        .await
    }

    /// Set a batch of fields and persist the shard once. The batch is atomic
    /// from the caller's view: all fields land or none do. Later entries
    /// overwrite earlier ones addressing the same field.
    pub async fn update_items(&self, items: Vec<(String, Value)>, shard: Option<&str>) -> bool {
        self.mutate(shard, move |doc| {
            for (field, value) in items {
                doc.insert(field, value);
            }
        })
        .await
    }

    /// Delete one field and persist the shard. A failed write keeps the
    /// prior value. Removing an absent field still persists and succeeds.
    pub async fn remove_item(&self, field: &str, shard: Option<&str>) -> bool {
        let field = field.to_string();
        self.mutate(shard, move |doc| {
            doc.remove(&field);
        })
        .await
    }

    /// Apply an arbitrary mutation to a shard document under that shard's
    /// write lock: persist the new document first, and install it into the
    /// mirror only once the write succeeded.
    ///
    /// The lock covers the read-compute-persist-install span, so two
    /// overlapping mutations of one shard cannot lose updates. Readers
    /// never observe an unpersisted document: a failed write leaves the
    /// mirror exactly as it was.
    pub(crate) async fn mutate<F>(&self, shard: Option<&str>, apply: F) -> bool
    where
        F: FnOnce(&mut ShardDoc),
    {
        let key = self.shard_key(shard);
        // Clone the lock handle out so the map guard is released before
        // awaiting; holding it across the await would block other shards.
        let lock = {
            let entry = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(&entry)
        };
        let _guard = lock.lock().await;

        let mut doc = self
            .shards
            .get(&key)
            .map(|doc| doc.clone())
            .unwrap_or_default();
        apply(&mut doc);

        let path = self.file_path(&key);
        match self.adapter.save_json(&path, &Value::Object(doc.clone())).await {
            Ok(()) => {
                self.shards.insert(key.clone(), doc);
                debug!(path = %path.display(), shard = %key, "shard persisted");
                true
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    shard = %key,
                    error = %e,
                    "cannot persist shard, mirror left unchanged"
                );
                false
            }
        }
    }

    fn shard_key(&self, shard: Option<&str>) -> String {
        if self.template.is_sharded() {
            shard.unwrap_or(IMPLICIT_SHARD).to_string()
        } else {
            if let Some(id) = shard {
                debug!(id, template = %self.template, "shard id ignored by unsharded store");
            }
            IMPLICIT_SHARD.to_string()
        }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let name = if self.template.is_sharded() {
            self.template.render(Some(key))
        } else {
            self.template.render(None)
        };
        self.dir.join(name)
    }
}

// ── tests ────────────────────────────────────────────────────────────
