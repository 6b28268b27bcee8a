//! Shard file-name templates.
//!
//! A template such as `data-$[id].json` names one file per shard id; a
//! template without the `$[id]` placeholder (e.g. `state.json`) names the
//! single file of an unsharded store.

use crate::error::{StoreError, StoreResult};

/// The placeholder substituted with the shard id.
const ID_PLACEHOLDER: &str = "$[id]";

/// A parsed file-name template with an optional `$[id]` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    raw: String,
    /// `Some((prefix, suffix))` when the template carries the placeholder.
    parts: Option<(String, String)>,
}

impl NameTemplate {
    /// Parse a template string.
    ///
    /// Fails on an empty template or more than one `$[id]` placeholder.
    pub fn parse(template: &str) -> StoreResult<Self> {
        if template.is_empty() {
            return Err(StoreError::Config("empty file-name template".into()));
        }
        let mut pieces = template.split(ID_PLACEHOLDER);
        let prefix = pieces.next().unwrap_or_default().to_string();
        let parts = match pieces.next() {
            None => None,
            Some(suffix) => {
                if pieces.next().is_some() {
                    return Err(StoreError::Config(format!(
                        "template <{template}> has more than one {ID_PLACEHOLDER} placeholder"
                    )));
                }
                Some((prefix, suffix.to_string()))
            }
        };
        Ok(Self {
            raw: template.to_string(),
            parts,
        })
    }

    /// Whether the template names one file per shard id.
    pub fn is_sharded(&self) -> bool {
        self.parts.is_some()
    }

    /// Render the file name for a shard id.
    ///
    /// An unsharded template always renders its literal name; a sharded
    /// template substitutes the id (empty when the id is omitted).
    pub fn render(&self, id: Option<&str>) -> String {
        match &self.parts {
            None => self.raw.clone(),
            Some((prefix, suffix)) => format!("{prefix}{}{suffix}", id.unwrap_or_default()),
        }
    }

    /// Match a directory entry against the template, extracting the shard id.
    ///
    /// Returns `Some(id)` for sharded templates (the id may be empty for the
    /// implicit shard's file), `Some("")` for an exact unsharded match, and
    /// `None` for entries that do not belong to this store.
    pub fn match_name(&self, name: &str) -> Option<String> {
        match &self.parts {
            None => (name == self.raw).then(String::new),
            Some((prefix, suffix)) => {
                let rest = name.strip_prefix(prefix.as_str())?;
                let id = rest.strip_suffix(suffix.as_str())?;
                Some(id.to_string())
            }
        }
    }
}

impl std::fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── tests ────────────────────────────────────────────────────────────
