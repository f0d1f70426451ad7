//! Read-side queries over the mirrored ledger entries.
//!
//! Sorting, label filtering, and substring search over snapshots obtained
//! from the store. Nothing in this module mutates the store; callers fetch a
//! snapshot via `get_all` and shape it here. Search is applied after label
//! filtering, and sorting last.

use crate::ledger::LedgerEntry;
use itertools::Itertools;
use std::collections::HashSet;
use std::str::FromStr;

/// Label shown (and filtered on) for entries whose label is empty.
pub const MISSING_LABEL: &str = "N/A";

/// Error types for malformed query input.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown sort field: {0}")]
    UnknownSortField(String),
}

/// A sortable (and searchable) entry field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Key,
    Label,
    Timestamp,
    BlockVersion,
    BlockSize,
    ParentBlockHash,
    BlockOffset,
    Description,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Key => "key",
            SortField::Label => "label",
            SortField::Timestamp => "timestamp",
            SortField::BlockVersion => "block_version",
            SortField::BlockSize => "block_size",
            SortField::ParentBlockHash => "parent_block_hash",
            SortField::BlockOffset => "block_offset",
            SortField::Description => "description",
        }
    }

    /// Numeric fields compare numerically; the rest compare as strings.
    fn is_numeric(&self) -> bool {
        matches!(
            self,
            SortField::Timestamp
                | SortField::BlockVersion
                | SortField::BlockSize
                | SortField::BlockOffset
        )
    }
}

impl FromStr for SortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "key" => Ok(SortField::Key),
            "label" => Ok(SortField::Label),
            "timestamp" => Ok(SortField::Timestamp),
            "block_version" => Ok(SortField::BlockVersion),
            "block_size" => Ok(SortField::BlockSize),
            "parent_block_hash" => Ok(SortField::ParentBlockHash),
            "block_offset" => Ok(SortField::BlockOffset),
            "description" => Ok(SortField::Description),
            other => Err(QueryError::UnknownSortField(other.to_string())),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Where a search term is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Match against the string representation of every field.
    AllFields,
    /// Match against one named field only.
    Field(SortField),
}

fn numeric_value(entry: &LedgerEntry, field: SortField) -> u64 {
    match field {
        SortField::Timestamp => entry.timestamp_ms.unwrap_or(0),
        SortField::BlockVersion => u64::from(entry.block_version),
        SortField::BlockSize => entry.block_size,
        SortField::BlockOffset => entry.block_offset,
        _ => 0,
    }
}

fn string_value(entry: &LedgerEntry, field: SortField) -> &str {
    match field {
        SortField::Key => &entry.key,
        SortField::Label => &entry.label,
        SortField::ParentBlockHash => &entry.parent_block_hash,
        SortField::Description => &entry.description,
        _ => "",
    }
}

/// Text an entry field contributes to a search, lowercased by the caller.
fn field_text(entry: &LedgerEntry, field: SortField) -> String {
    if field.is_numeric() {
        match field {
            SortField::Timestamp => format_timestamp(entry.timestamp_ms),
            _ => numeric_value(entry, field).to_string(),
        }
    } else {
        string_value(entry, field).to_string()
    }
}

/// Sort entries in place by one field.
///
/// Numeric fields compare numerically with a missing timestamp as 0; string
/// fields compare lexicographically with missing values as the empty string.
pub fn sort_entries(entries: &mut [LedgerEntry], field: SortField, direction: SortDirection) {
    entries.sort_by(|a, b| {
        let ordering = if field.is_numeric() {
            numeric_value(a, field).cmp(&numeric_value(b, field))
        } else {
            string_value(a, field).cmp(string_value(b, field))
        };
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

/// Keep only entries whose label is in the selected set.
///
/// An empty label matches under [`MISSING_LABEL`]. An empty selection yields
/// an empty result set, not "show all".
pub fn filter_by_labels(
    entries: Vec<LedgerEntry>,
    selected: &HashSet<String>,
) -> Vec<LedgerEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            let label = if entry.label.is_empty() {
                MISSING_LABEL
            } else {
                entry.label.as_str()
            };
            selected.contains(label)
        })
        .collect()
}

/// Keep only entries matching a case-insensitive substring search.
pub fn search_entries(
    entries: Vec<LedgerEntry>,
    term: &str,
    scope: SearchScope,
) -> Vec<LedgerEntry> {
    if term.is_empty() {
        return entries;
    }
    let needle = term.to_lowercase();

    entries
        .into_iter()
        .filter(|entry| match scope {
            SearchScope::Field(field) => {
                field_text(entry, field).to_lowercase().contains(&needle)
            }
            SearchScope::AllFields => {
                let haystack = format!(
                    "{} {} {} {} {} {} {} {} {}",
                    entry.key,
                    entry.label,
                    format_value(&entry.value),
                    entry.description,
                    format_timestamp(entry.timestamp_ms),
                    entry.block_version,
                    entry.block_size,
                    entry.parent_block_hash,
                    entry.block_offset,
                );
                haystack.to_lowercase().contains(&needle)
            }
        })
        .collect()
}

/// Sorted distinct labels present in the given entries, with empty labels
/// reported as [`MISSING_LABEL`].
pub fn distinct_labels(entries: &[LedgerEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            if entry.label.is_empty() {
                MISSING_LABEL.to_string()
            } else {
                entry.label.clone()
            }
        })
        .unique()
        .sorted()
        .collect()
}

/// A complete read-side query: label filter, then search, then sort.
#[derive(Debug, Clone)]
pub struct LedgerQuery {
    /// Labels to keep. `None` keeps all; an empty set keeps nothing.
    pub labels: Option<HashSet<String>>,
    /// Case-insensitive substring to search for.
    pub search: Option<String>,
    pub scope: SearchScope,
    pub sort_field: SortField,
    pub direction: SortDirection,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            labels: None,
            search: None,
            scope: SearchScope::AllFields,
            sort_field: SortField::Timestamp,
            direction: SortDirection::Descending,
        }
    }
}

impl LedgerQuery {
    /// Apply the query to a store snapshot.
    pub fn apply(&self, entries: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
        let mut entries = match &self.labels {
            Some(selected) => filter_by_labels(entries, selected),
            None => entries,
        };
        if let Some(term) = &self.search {
            entries = search_entries(entries, term, self.scope);
        }
        sort_entries(&mut entries, self.sort_field, self.direction);
        entries
    }
}

/// Render a millisecond-epoch timestamp for display.
pub fn format_timestamp(timestamp_ms: Option<u64>) -> String {
    let Some(ms) = timestamp_ms else {
        return MISSING_LABEL.to_string();
    };
    match chrono::DateTime::from_timestamp_millis(ms as i64) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => MISSING_LABEL.to_string(),
    }
}

/// Render an opaque entry value for display.
pub fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => MISSING_LABEL.to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}
