//! Per-chat state records.
//!
//! Specializes [`ShardedStore`] for conversation state: the store is
//! unsharded (everything lives in `state.json`), each chat's composite id is
//! a field of that single document, and the field's value is the chat's
//! record — a JSON object holding `isActive`, user/chat profiles, the
//! pending multi-turn command, and whatever else handlers attach.
//!
//! Records are created implicitly on first write and never physically
//! deleted; [`ChatStateStore::archive`] soft-deletes by flagging
//! `isActive = false`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::StoreResult;
use crate::fs::FileAdapter;
use crate::store::ShardedStore;
use crate::template::NameTemplate;

/// Record field carrying the soft-delete marker.
pub const FIELD_IS_ACTIVE: &str = "isActive";

/// Record field carrying the pending multi-turn command, persisted so that
/// a bare follow-up message can still be disambiguated after a restart.
pub const FIELD_PENDING_COMMAND: &str = "pendingCommand";

/// Composite state id for a user within a chat, `<chatId>_<userId>`.
pub fn state_id(user_id: &str, chat_id: &str) -> String {
    format!("{chat_id}_{user_id}")
}

/// Store of per-chat state records on top of a single `state.json` document.
pub struct ChatStateStore {
    store: ShardedStore,
}

impl ChatStateStore {
    /// Open the chat state store rooted at `dir`.
    ///
    /// Initialization failures (uncreatable directory, corrupt document)
    /// are fatal; the successful return is the readiness signal.
    pub async fn open(adapter: Arc<dyn FileAdapter>, dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let template = NameTemplate::parse("state.json")?;
        let store = ShardedStore::open(adapter, dir, template).await?;
        Ok(Self { store })
    }

    /// Read one field of the chat's record; `None` if the record or the
    /// field is absent. No I/O.
    pub fn get(&self, field: &str, id: &str) -> Option<Value> {
        match self.store.get(id, None) {
            Some(Value::Object(record)) => record.get(field).cloned(),
            Some(_) | None => None,
        }
    }

    /// Read several fields of the chat's record; absent fields are absent
    /// from the map.
    pub fn get_many(&self, fields: &[&str], id: &str) -> HashMap<String, Value> {
        let mut result = HashMap::new();
        if let Some(Value::Object(record)) = self.store.get(id, None) {
            for field in fields {
                if let Some(value) = record.get(*field) {
                    result.insert((*field).to_string(), value.clone());
                }
            }
        }
        result
    }

    /// Set one field of the chat's record, creating the record if needed.
    pub async fn update_item(&self, field: &str, value: Value, id: &str) -> bool {
        self.update_items(vec![(field.to_string(), value)], id).await
    }

    /// Merge a batch of fields into the chat's record (last write wins) and
    /// persist once. On failure the previously committed record stays in
    /// place, in memory and on disk.
    pub async fn update_items(&self, items: Vec<(String, Value)>, id: &str) -> bool {
        let id = id.to_string();
        self.store
            .mutate(None, move |doc| {
                let mut record = take_record(doc, &id);
                for (field, value) in items {
                    record.insert(field, value);
                }
                doc.insert(id, Value::Object(record));
            })
            .await
    }

    /// Merge a batch given as a list of JSON objects, each contributing its
    /// own keys (the `[{isActive: true}, {user: {...}}]` calling shape).
    pub async fn update_items_by_meta(&self, items: Vec<Map<String, Value>>, id: &str) -> bool {
        let flattened = items
            .into_iter()
            .flat_map(|object| object.into_iter())
            .collect();
        self.update_items(flattened, id).await
    }

    /// Delete one field from the chat's record and persist.
    pub async fn remove_item(&self, field: &str, id: &str) -> bool {
        let field = field.to_string();
        let id = id.to_string();
        self.store
            .mutate(None, move |doc| {
                let mut record = take_record(doc, &id);
                record.remove(&field);
                doc.insert(id, Value::Object(record));
            })
            .await
    }

    /// Soft-delete the chat: mark `isActive = false`, keeping the record on
    /// disk. Idempotent.
    pub async fn archive(&self, id: &str) -> bool {
        self.update_item(FIELD_IS_ACTIVE, json!(false), id).await
    }

    /// The pending multi-turn command for the chat, if any.
    pub fn pending_command(&self, id: &str) -> Option<String> {
        self.get(FIELD_PENDING_COMMAND, id)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Remember `command` as the chat's pending multi-turn command.
    pub async fn set_pending_command(&self, id: &str, command: &str) -> bool {
        self.update_item(FIELD_PENDING_COMMAND, json!(command), id)
            .await
    }

    /// Forget the chat's pending multi-turn command.
    pub async fn clear_pending_command(&self, id: &str) -> bool {
        self.remove_item(FIELD_PENDING_COMMAND, id).await
    }
}

/// Pull the chat's record out of the state document, defaulting to empty.
///
/// A non-object value under the id would mean the document was written by
/// something other than this store; it is replaced, with a warning.
fn take_record(doc: &mut Map<String, Value>, id: &str) -> Map<String, Value> {
    match doc.remove(id) {
        Some(Value::Object(record)) => record,
        Some(other) => {
            warn!(id, value = %other, "replacing non-record state value");
            Map::new()
        }
        None => Map::new(),
    }
}

// ── tests ────────────────────────────────────────────────────────────
