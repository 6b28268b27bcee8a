//! # lexibot-store
//!
//! File-backed persistence for lexibot.
//!
//! Provides a process-local, sharded key-value store with an in-memory
//! mirror that only ever holds persisted state, a per-chat state layer with
//! soft-delete, and an append-only event ledger in flat delimited files.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐  ┌───────────────────────────┐
//! │  ChatStateStore      │  │  History (ledger)          │
//! │  (records, archive)  │  │  (append, scan, rewrite)   │
//! ├──────────────────────┤  └─────────────┬─────────────┘
//! │  ShardedStore        │                │
//! │  (persisted mirror)  │                │
//! ├──────────────────────┴────────────────┴─────────────┐
//! │  FileAdapter (tokio::fs, atomic JSON / delimited)    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use lexibot_store::{ChatStateStore, DiskAdapter, History, ShardedStore, NameTemplate};
//!
//! let adapter = Arc::new(DiskAdapter::new());
//! let state = ChatStateStore::open(adapter.clone(), "storage/").await?;
//! let files = ShardedStore::open(
//!     adapter.clone(),
//!     "storage/data/",
//!     NameTemplate::parse("data-$[id].json")?,
//! )
//! .await?;
//! let history = History::open(adapter, "storage/history/").await?;
//! ```
//!
//! A store's async `open` returning `Ok` is its readiness signal: shards are
//! loaded and directories exist before any operation can be issued. Mutating
//! operations report `bool` success — a document is installed in memory only
//! after it hit disk, so `false` always means "nothing changed".

pub mod chat_state;
pub mod error;
pub mod fs;
pub mod history;
pub mod store;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

// ── re-exports ───────────────────────────────────────────────────────

pub use chat_state::{state_id, ChatStateStore, FIELD_IS_ACTIVE, FIELD_PENDING_COMMAND};
pub use error::{StoreError, StoreResult};
pub use fs::{DiskAdapter, FileAdapter};
pub use history::{AnalyticsEvent, History, HistoryEvent, HistoryPatch};
pub use store::ShardedStore;
pub use template::NameTemplate;
