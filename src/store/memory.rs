use super::{identity_value, Store, TargetRecord, WriteOutcome};
use crate::error::StorageError;
use crate::job::ImportMode;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

type Row = HashMap<String, String>;

/// In-process tables, used for dry runs, benchmarks and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: &str) -> Self {
        Self {
            tables: Mutex::new(HashMap::from([(table.to_string(), Vec::new())])),
        }
    }

    pub async fn create_table(&self, table: &str) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default();
    }

    pub async fn insert(&self, table: &str, record: &TargetRecord) {
        let row = record
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_string()))
            .collect();
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Snapshot of a table's rows.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn check_table(&self, table: &str) -> Result<(), StorageError> {
        if self.tables.lock().await.contains_key(table) {
            Ok(())
        } else {
            Err(StorageError::UnknownTable(table.to_string()))
        }
    }

    async fn value_exists(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<bool, StorageError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        Ok(rows
            .iter()
            .any(|row| row.get(column).is_some_and(|v| v == value)))
    }

    async fn write_row(
        &self,
        table: &str,
        mode: ImportMode,
        identity: &str,
        record: &TargetRecord,
    ) -> Result<WriteOutcome, StorageError> {
        let mut tables = self.tables.lock().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;

        let existing = if mode.matches_identity() {
            let key = identity_value(record, identity)?;
            let index = rows
                .iter()
                .position(|row| row.get(identity).is_some_and(|v| v == key));
            if index.is_none() && mode == ImportMode::Update {
                return Err(StorageError::NoMatchingRow {
                    column: identity.to_string(),
                    value: key.to_string(),
                });
            }
            index
        } else {
            None
        };

        match existing {
            Some(index) => {
                let row = &mut rows[index];
                for (c, v) in record.iter() {
                    row.insert(c.to_string(), v.to_string());
                }
                Ok(WriteOutcome::Updated)
            }
            None => {
                rows.push(
                    record
                        .iter()
                        .map(|(c, v)| (c.to_string(), v.to_string()))
                        .collect(),
                );
                Ok(WriteOutcome::Inserted)
            }
        }
    }
}
