use super::{check_identifier, identity_value, Store, TargetRecord, WriteOutcome};
use crate::error::StorageError;
use crate::job::ImportMode;
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite destination. Calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs raw SQL, e.g. schema setup.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?
    }
}

fn exists(conn: &Connection, table: &str, column: &str, value: &str) -> Result<bool, StorageError> {
    let sql = format!(
        "SELECT 1 FROM \"{}\" WHERE \"{}\" = ?1 LIMIT 1",
        check_identifier(table)?,
        check_identifier(column)?
    );
    Ok(conn
        .query_row(&sql, params![value], |_| Ok(()))
        .optional()?
        .is_some())
}

fn insert(conn: &Connection, table: &str, record: &TargetRecord) -> Result<(), StorageError> {
    let columns = record
        .iter()
        .map(|(c, _)| check_identifier(c).map(|c| format!("\"{c}\"")))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>();
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        check_identifier(table)?,
        columns.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(record.iter().map(|(_, v)| v)))?;
    Ok(())
}

fn update(
    conn: &Connection,
    table: &str,
    identity: &str,
    key: &str,
    record: &TargetRecord,
) -> Result<usize, StorageError> {
    let assignments = record
        .iter()
        .enumerate()
        .map(|(i, (c, _))| check_identifier(c).map(|c| format!("\"{c}\" = ?{}", i + 1)))
        .collect::<Result<Vec<_>, _>>()?;
    let sql = format!(
        "UPDATE \"{}\" SET {} WHERE \"{}\" = ?{}",
        check_identifier(table)?,
        assignments.join(", "),
        check_identifier(identity)?,
        record.len() + 1
    );
    let values = record.iter().map(|(_, v)| v).chain(std::iter::once(key));
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn check_table(&self, table: &str) -> Result<(), StorageError> {
        let table = check_identifier(table)?.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |_| Ok(()),
                )
                .optional()?;
            found.ok_or(StorageError::UnknownTable(table))
        })
        .await
    }

    async fn value_exists(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<bool, StorageError> {
        let (table, column, value) = (table.to_string(), column.to_string(), value.to_string());
        self.with_conn(move |conn| exists(conn, &table, &column, &value))
            .await
    }

    async fn write_row(
        &self,
        table: &str,
        mode: ImportMode,
        identity: &str,
        record: &TargetRecord,
    ) -> Result<WriteOutcome, StorageError> {
        let (table, identity, record) = (table.to_string(), identity.to_string(), record.clone());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let outcome = match mode {
                ImportMode::Insert => {
                    insert(&tx, &table, &record)?;
                    WriteOutcome::Inserted
                }
                ImportMode::Update | ImportMode::InsertOrUpdate => {
                    let key = identity_value(&record, &identity)?;
                    if update(&tx, &table, &identity, key, &record)? > 0 {
                        WriteOutcome::Updated
                    } else if mode == ImportMode::Update {
                        return Err(StorageError::NoMatchingRow {
                            column: identity.clone(),
                            value: key.to_string(),
                        });
                    } else {
                        insert(&tx, &table, &record)?;
                        WriteOutcome::Inserted
                    }
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }
}
