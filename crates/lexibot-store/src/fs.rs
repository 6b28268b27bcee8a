//! Durable file adapter.
//!
//! All disk access in the crate goes through the [`FileAdapter`] trait so
//! the stores can be exercised against an in-memory or fault-injecting
//! implementation in tests. [`DiskAdapter`] is the production implementation
//! on top of `tokio::fs`.
//!
//! Whole-document saves (`save_json`, `save_delimited`) are atomic: the
//! content is written to a sibling temp file and renamed over the target, so
//! a crash mid-write leaves the previous document intact. Appends are issued
//! as a single write, so a ledger row is all-or-nothing.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreResult;

/// Asynchronous filesystem operations consumed by the stores and the ledger.
#[async_trait]
pub trait FileAdapter: Send + Sync {
    /// Check whether `path` exists.
    async fn exists(&self, path: &Path) -> bool;

    /// Create a directory, including missing parents.
    async fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// List the entry names (not full paths) inside a directory.
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Read and parse a JSON document.
    async fn read_json(&self, path: &Path) -> StoreResult<serde_json::Value>;

    /// Serialize and atomically persist a JSON document.
    async fn save_json(&self, path: &Path, value: &serde_json::Value) -> StoreResult<()>;

    /// Append `text` to a file (created if missing) in a single write.
    async fn append_file(&self, path: &Path, text: &str) -> io::Result<()>;

    /// Read a delimited text file into rows of trimmed fields.
    ///
    /// Empty lines are skipped. The file is not required to exist; the
    /// caller maps `NotFound` to an empty result where appropriate.
    async fn read_delimited(&self, path: &Path, delimiter: char) -> io::Result<Vec<Vec<String>>>;

    /// Atomically rewrite a delimited text file from rows of fields.
    async fn save_delimited(
        &self,
        path: &Path,
        rows: &[Vec<String>],
        delimiter: char,
    ) -> io::Result<()>;
}

/// Production adapter backed by `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct DiskAdapter;

impl DiskAdapter {
    /// Create a new disk adapter.
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }

    /// Write `bytes` to a sibling temp file, then rename over `path`.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp = Self::temp_path(path);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "atomic write");
        Ok(())
    }
}

#[async_trait]
impl FileAdapter for DiskAdapter {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn read_json(&self, path: &Path) -> StoreResult<serde_json::Value> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save_json(&self, path: &Path, value: &serde_json::Value) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        Self::write_atomic(path, &bytes).await?;
        Ok(())
    }

    async fn append_file(&self, path: &Path, text: &str) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }

    async fn read_delimited(&self, path: &Path, delimiter: char) -> io::Result<Vec<Vec<String>>> {
        let text = tokio::fs::read_to_string(path).await?;
        let rows = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split(delimiter)
                    .map(|field| field.trim().to_string())
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    async fn save_delimited(
        &self,
        path: &Path,
        rows: &[Vec<String>],
        delimiter: char,
    ) -> io::Result<()> {
        let mut text = String::new();
        for row in rows {
            text.push_str(&row.join(&delimiter.to_string()));
            text.push('\n');
        }
        Self::write_atomic(path, text.as_bytes()).await
    }
}

// ── tests ────────────────────────────────────────────────────────────
