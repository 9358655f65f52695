//! Destination storage.
//!
//! Every write is a single-row transaction so that progress made inside a chunk survives a
//! later failure of that chunk.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::error::StorageError;
use crate::job::ImportMode;
use async_trait::async_trait;
use serde::Serialize;

/// Column values ready to be persisted, in selected-field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetRecord {
    fields: Vec<(String, String)>,
}

impl TargetRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<C: Into<String>, V: Into<String>> FromIterator<(C, V)> for TargetRecord {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(c, v)| (c.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteOutcome {
    Inserted,
    Updated,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails when the table cannot be reached at all.
    async fn check_table(&self, table: &str) -> Result<(), StorageError>;

    /// Point lookup: does any row have `column = value`.
    async fn value_exists(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<bool, StorageError>;

    /// Writes one row atomically according to `mode`.
    ///
    /// Update modes match existing rows on `identity`; `Update` with no match fails with
    /// [`StorageError::NoMatchingRow`] and writes nothing.
    async fn write_row(
        &self,
        table: &str,
        mode: ImportMode,
        identity: &str,
        record: &TargetRecord,
    ) -> Result<WriteOutcome, StorageError>;
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`; table and column names are interpolated into SQL.
pub(crate) fn check_identifier(name: &str) -> Result<&str, StorageError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

pub(crate) fn identity_value<'a>(
    record: &'a TargetRecord,
    identity: &str,
) -> Result<&'a str, StorageError> {
    record.get(identity).ok_or_else(|| StorageError::NoMatchingRow {
        column: identity.to_string(),
        value: String::new(),
    })
}
