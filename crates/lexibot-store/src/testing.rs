//! Fault-injecting file adapters for unit tests.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{StoreError, StoreResult};
use crate::fs::{DiskAdapter, FileAdapter};

/// Wraps [`DiskAdapter`] and fails every write while the flag is set.
///
/// Reads always pass through, so tests can assert that a failed mutation
/// left both the mirror and the disk content untouched.
pub(crate) struct FlakyAdapter {
    inner: DiskAdapter,
    fail_writes: AtomicBool,
}

impl FlakyAdapter {
    pub(crate) fn new() -> Self {
        Self {
            inner: DiskAdapter::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_error(&self) -> Option<io::Error> {
        self.fail_writes
            .load(Ordering::SeqCst)
            .then(|| io::Error::other("injected write failure"))
    }
}

#[async_trait]
impl FileAdapter for FlakyAdapter {
    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.inner.mkdir(path).await
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        self.inner.read_dir(path).await
    }

    async fn read_json(&self, path: &Path) -> StoreResult<serde_json::Value> {
        self.inner.read_json(path).await
    }

    async fn save_json(&self, path: &Path, value: &serde_json::Value) -> StoreResult<()> {
        if let Some(e) = self.write_error() {
            return Err(StoreError::Io(e));
        }
        self.inner.save_json(path, value).await
    }

    async fn append_file(&self, path: &Path, text: &str) -> io::Result<()> {
        if let Some(e) = self.write_error() {
            return Err(e);
        }
        self.inner.append_file(path, text).await
    }

    async fn read_delimited(&self, path: &Path, delimiter: char) -> io::Result<Vec<Vec<String>>> {
        self.inner.read_delimited(path, delimiter).await
    }

    async fn save_delimited(
        &self,
        path: &Path,
        rows: &[Vec<String>],
        delimiter: char,
    ) -> io::Result<()> {
        if let Some(e) = self.write_error() {
            return Err(e);
        }
        self.inner.save_delimited(path, rows, delimiter).await
    }
}

/// Holds an armed `save_json` open until released, then fails it.
///
/// Lets a test observe the store while a write is in flight: the task is
/// parked inside the adapter between [`GatedAdapter::entered`] firing and
/// [`GatedAdapter::release`] being called.
pub(crate) struct GatedAdapter {
    inner: DiskAdapter,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedAdapter {
    pub(crate) fn new() -> Self {
        Self {
            inner: DiskAdapter::new(),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Make the next `save_json` block at the gate and then fail.
    pub(crate) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once an armed write has reached the gate.
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the gated write proceed to its failure.
    pub(crate) fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl FileAdapter for GatedAdapter {
    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.inner.mkdir(path).await
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        self.inner.read_dir(path).await
    }

    async fn read_json(&self, path: &Path) -> StoreResult<serde_json::Value> {
        self.inner.read_json(path).await
    }

    async fn save_json(&self, path: &Path, value: &serde_json::Value) -> StoreResult<()> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
            return Err(StoreError::Io(io::Error::other("injected write failure")));
        }
        self.inner.save_json(path, value).await
    }

    async fn append_file(&self, path: &Path, text: &str) -> io::Result<()> {
        self.inner.append_file(path, text).await
    }

    async fn read_delimited(&self, path: &Path, delimiter: char) -> io::Result<Vec<Vec<String>>> {
        self.inner.read_delimited(path, delimiter).await
    }

    async fn save_delimited(
        &self,
        path: &Path,
        rows: &[Vec<String>],
        delimiter: char,
    ) -> io::Result<()> {
        self.inner.save_delimited(path, rows, delimiter).await
    }
}
