//! Append-only event ledger.
//!
//! One delimited text file per subject id (`hist-<id>.csv`), eight columns
//! in fixed order, no header row on disk:
//!
//! `id, userId, eventType, value1, value2, dateCreate, dateEdit, dateDelete`
//!
//! New events are appended; existing rows can be corrected through
//! [`History::update`], which rewrites the whole file and stamps the
//! `dateEdit` column. Absent optional columns serialize to the empty field;
//! any present value — including `"false"`, `"0"` or a patched empty string
//! — is written literally.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::fs::FileAdapter;
use crate::template::NameTemplate;

// Column layout of a ledger row.
const COL_ID: usize = 0;
const COL_USER_ID: usize = 1;
const COL_EVENT_TYPE: usize = 2;
const COL_VALUE1: usize = 3;
const COL_VALUE2: usize = 4;
const COL_DATE_CREATE: usize = 5;
const COL_DATE_EDIT: usize = 6;
const COL_DATE_DELETE: usize = 7;
const COLUMN_COUNT: usize = 8;

/// One ledger entry.
///
/// Serializes with the ledger's own column vocabulary (`userId`,
/// `eventType`, `dateCreate`, ...) so JSON dumps of events read the same as
/// the on-disk schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    /// Caller-supplied numeric id (typically the message id).
    pub id: i64,
    /// Subject the event belongs to (the composite state id).
    pub user_id: String,
    /// Event kind, free-form (see [`AnalyticsEvent`] for the built-ins).
    pub event_type: String,
    pub value1: Option<String>,
    pub value2: Option<String>,
    /// Stamped when the event is constructed for appending.
    pub date_create: DateTime<Utc>,
    /// Stamped by [`History::update`], never by `add`.
    pub date_edit: Option<DateTime<Utc>>,
    /// Reserved; only ever set through an update patch.
    pub date_delete: Option<DateTime<Utc>>,
}

impl HistoryEvent {
    /// Build a fresh event with `dateCreate` set to now.
    pub fn new(
        id: i64,
        user_id: impl Into<String>,
        event_type: impl Into<String>,
        value1: Option<String>,
        value2: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            event_type: event_type.into(),
            value1,
            value2,
            date_create: Utc::now(),
            date_edit: None,
            date_delete: None,
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.user_id.clone(),
            self.event_type.clone(),
            self.value1.clone().unwrap_or_default(),
            self.value2.clone().unwrap_or_default(),
            format_date(&self.date_create),
            self.date_edit.as_ref().map(format_date).unwrap_or_default(),
            self.date_delete.as_ref().map(format_date).unwrap_or_default(),
        ]
    }

    /// Parse a row; `None` means the row is malformed and should be skipped.
    fn from_row(row: &[String]) -> Option<Self> {
        if row.len() != COLUMN_COUNT {
            return None;
        }
        Some(Self {
            id: row[COL_ID].parse().ok()?,
            user_id: row[COL_USER_ID].clone(),
            event_type: row[COL_EVENT_TYPE].clone(),
            value1: optional_field(&row[COL_VALUE1]),
            value2: optional_field(&row[COL_VALUE2]),
            date_create: parse_date(&row[COL_DATE_CREATE])?,
            date_edit: optional_date(&row[COL_DATE_EDIT])?,
            date_delete: optional_date(&row[COL_DATE_DELETE])?,
        })
    }
}

/// Column patch for [`History::update`]. `None` retains the existing column;
/// a provided value always wins, including an empty string. `dateEdit` is
/// not patchable — the update stamps it unconditionally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPatch {
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub value1: Option<String>,
    pub value2: Option<String>,
    pub date_create: Option<DateTime<Utc>>,
    pub date_delete: Option<DateTime<Utc>>,
}

impl HistoryPatch {
    /// Apply the patch to a raw row, leaving untouched columns byte-identical
    /// and stamping `dateEdit` with the current time.
    fn apply(&self, row: &[String]) -> Vec<String> {
        let mut new_row = row.to_vec();
        if let Some(user_id) = &self.user_id {
            new_row[COL_USER_ID] = user_id.clone();
        }
        if let Some(event_type) = &self.event_type {
            new_row[COL_EVENT_TYPE] = event_type.clone();
        }
        if let Some(value1) = &self.value1 {
            new_row[COL_VALUE1] = value1.clone();
        }
        if let Some(value2) = &self.value2 {
            new_row[COL_VALUE2] = value2.clone();
        }
        if let Some(date_create) = &self.date_create {
            new_row[COL_DATE_CREATE] = format_date(date_create);
        }
        new_row[COL_DATE_EDIT] = format_date(&Utc::now());
        if let Some(date_delete) = &self.date_delete {
            new_row[COL_DATE_DELETE] = format_date(date_delete);
        }
        new_row
    }
}

/// The built-in analytics event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEvent {
    /// A user activated the bot in a chat.
    Start,
    /// A user stopped the bot in a chat.
    Stop,
}

impl fmt::Display for AnalyticsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "START"),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

/// Append-only ledger of immutable historical events, one file per subject.
pub struct History {
    adapter: Arc<dyn FileAdapter>,
    dir: PathBuf,
    template: NameTemplate,
    delimiter: char,
}

impl History {
    /// Open a ledger rooted at `dir` with the default file template
    /// (`hist-$[id].csv`) and delimiter (`,`).
    pub async fn open(adapter: Arc<dyn FileAdapter>, dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let template = NameTemplate::parse("hist-$[id].csv")?;
        Self::open_with(adapter, dir, template, ',').await
    }

    /// Open a ledger with an explicit file template and delimiter.
    ///
    /// Ensures the directory exists before any operation is accepted; a
    /// failure here is fatal.
    pub async fn open_with(
        adapter: Arc<dyn FileAdapter>,
        dir: impl Into<PathBuf>,
        template: NameTemplate,
        delimiter: char,
    ) -> StoreResult<Self> {
        if delimiter == '\n' {
            return Err(StoreError::Config(
                "ledger delimiter cannot be the line terminator".into(),
            ));
        }
        let dir = dir.into();
        if !adapter.exists(&dir).await {
            info!(path = %dir.display(), "history directory missing, creating");
            adapter.mkdir(&dir).await.map_err(|e| StoreError::Init {
                path: dir.clone(),
                message: format!("cannot create history directory: {e}"),
            })?;
        }
        Ok(Self {
            adapter,
            dir,
            template,
            delimiter,
        })
    }

    /// Append one event to the subject's file. All-or-nothing at row
    /// granularity; returns `false` on any I/O failure.
    pub async fn add(&self, event: &HistoryEvent, subject: Option<&str>) -> bool {
        let row = event.to_row();
        if !self.row_is_clean(&row) {
            warn!(id = event.id, "refusing to append row containing the delimiter");
            return false;
        }
        let path = self.file_path(subject);
        let line = format!("{}\n", row.join(&self.delimiter.to_string()));
        match self.adapter.append_file(&path, &line).await {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot append history row");
                false
            }
        }
    }

    /// First event whose id column equals `id`, in file order. A missing
    /// file or no match is `Ok(None)`; a read failure other than not-found
    /// is surfaced.
    pub async fn get(&self, id: i64, subject: Option<&str>) -> StoreResult<Option<HistoryEvent>> {
        let id = id.to_string();
        let rows = self.read_rows(subject).await?;
        for row in &rows {
            if row.first().map(String::as_str) != Some(id.as_str()) {
                continue;
            }
            match HistoryEvent::from_row(row) {
                Some(event) => return Ok(Some(event)),
                None => warn!(row = ?row, "skipping malformed history row"),
            }
        }
        Ok(None)
    }

    /// All events of the subject, in file order. Malformed rows are logged
    /// and skipped.
    pub async fn get_all(&self, subject: Option<&str>) -> StoreResult<Vec<HistoryEvent>> {
        let rows = self.read_rows(subject).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let event = HistoryEvent::from_row(row);
                if event.is_none() {
                    warn!(row = ?row, "skipping malformed history row");
                }
                event
            })
            .collect())
    }

    /// Events of the subject satisfying `predicate`, in file order. The
    /// predicate sees the typed record, never the raw row.
    pub async fn get_by_filter<F>(
        &self,
        predicate: F,
        subject: Option<&str>,
    ) -> StoreResult<Vec<HistoryEvent>>
    where
        F: Fn(&HistoryEvent) -> bool,
    {
        let mut events = self.get_all(subject).await?;
        events.retain(|event| predicate(event));
        Ok(events)
    }

    /// Rewrite the subject's file with the row matching `id` patched and its
    /// `dateEdit` column stamped; every other row passes through unchanged.
    ///
    /// Returns `false` on any I/O failure. A missing id rewrites the file
    /// unchanged and still reports success.
    pub async fn update(&self, id: i64, patch: &HistoryPatch, subject: Option<&str>) -> bool {
        let path = self.file_path(subject);
        let rows = match self.read_rows(subject).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot read history for update");
                return false;
            }
        };

        let id = id.to_string();
        let mut rewritten = Vec::with_capacity(rows.len());
        for row in rows {
            if row.first().map(String::as_str) == Some(id.as_str()) && row.len() == COLUMN_COUNT {
                let patched = patch.apply(&row);
                if self.row_is_clean(&patched) {
                    rewritten.push(patched);
                    continue;
                }
                warn!(id = %id, "patch would break column alignment, keeping original row");
            }
            rewritten.push(row);
        }

        match self
            .adapter
            .save_delimited(&path, &rewritten, self.delimiter)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot rewrite history file");
                false
            }
        }
    }

    /// Record an analytics event for a subject (a `START`/`STOP` marker with
    /// the shown word and the user's answer, when present).
    pub async fn log_event(
        &self,
        message_id: i64,
        state_id: &str,
        event: AnalyticsEvent,
        word: Option<&str>,
        answer: Option<&str>,
    ) -> bool {
        let event = HistoryEvent::new(
            message_id,
            state_id,
            event.to_string(),
            word.map(str::to_string),
            answer.map(str::to_string),
        );
        self.add(&event, Some(state_id)).await
    }

    async fn read_rows(&self, subject: Option<&str>) -> StoreResult<Vec<Vec<String>>> {
        let path = self.file_path(subject);
        match self.adapter.read_delimited(&path, self.delimiter).await {
            Ok(rows) => Ok(rows),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn file_path(&self, subject: Option<&str>) -> PathBuf {
        self.dir.join(self.template.render(subject))
    }

    fn row_is_clean(&self, row: &[String]) -> bool {
        row.iter()
            .all(|field| !field.contains(self.delimiter) && !field.contains('\n'))
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn optional_field(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

fn parse_date(field: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(field)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Empty is a valid absent date; a non-empty unparseable one makes the row
/// malformed (outer `Option` is the parse result, inner the column).
fn optional_date(field: &str) -> Option<Option<DateTime<Utc>>> {
    if field.is_empty() {
        Some(None)
    } else {
        parse_date(field).map(Some)
    }
}

// ── tests ────────────────────────────────────────────────────────────
