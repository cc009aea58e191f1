//! In-memory row store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use conduit_core::{Row, StorageOperation};
use serde_json::Value;
use tracing::debug;

use crate::PluginStorage;
use crate::error::{StorageError, StorageResult};

/// Column holding the row identifier.
const ID_COLUMN: &str = "id";

/// Validate a namespace or table name.
///
/// Names must be non-empty and must not contain the null byte.
fn validate_name(kind: &str, name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidName(format!("{kind} must not be empty")));
    }
    if name.contains('\0') {
        return Err(StorageError::InvalidName(format!(
            "{kind} must not contain null bytes"
        )));
    }
    Ok(())
}

/// Whether every filter column equals the row's value.
fn row_matches(row: &Row, filter: &Row) -> bool {
    filter.iter().all(|(column, expected)| row.get(column) == Some(expected))
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    next_id: u64,
}

impl Table {
    fn insert(&mut self, mut row: Row) -> StorageResult<Row> {
        if let Some(id) = row.get(ID_COLUMN) {
            if self.rows.iter().any(|r| r.get(ID_COLUMN) == Some(id)) {
                return Err(StorageError::DuplicateId(id.clone()));
            }
        } else {
            loop {
                self.next_id = self.next_id.saturating_add(1);
                let candidate = Value::from(self.next_id);
                if !self.rows.iter().any(|r| r.get(ID_COLUMN) == Some(&candidate)) {
                    row.insert(ID_COLUMN.into(), candidate);
                    break;
                }
            }
        }
        self.rows.push(row.clone());
        Ok(row)
    }

    fn update(&mut self, filter: &Row, values: &Row) -> Vec<Row> {
        let mut updated = Vec::new();
        for row in self.rows.iter_mut().filter(|r| row_matches(r, filter)) {
            for (column, value) in values {
                if column != ID_COLUMN {
                    row.insert(column.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        updated
    }

    fn delete(&mut self, filter: &Row) -> Vec<Row> {
        let (deleted, kept): (Vec<Row>, Vec<Row>) = std::mem::take(&mut self.rows)
            .into_iter()
            .partition(|r| row_matches(r, filter));
        self.rows = kept;
        deleted
    }

    fn query(&self, filter: &Row, limit: Option<usize>) -> Vec<Row> {
        self.rows
            .iter()
            .filter(|r| row_matches(r, filter))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// In-memory storage backend for tests and ephemeral deployments.
///
/// Tables live under `namespace -> table`; rows are JSON objects in
/// insertion order. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    namespaces: RwLock<HashMap<String, HashMap<String, Table>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table names in a namespace, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the lock is poisoned.
    pub fn tables(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let mut tables: Vec<String> = namespaces
            .get(namespace)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        tables.sort();
        Ok(tables)
    }
}

#[async_trait]
impl PluginStorage for MemoryStorage {
    async fn execute(
        &self,
        namespace: &str,
        operation: StorageOperation,
    ) -> StorageResult<Vec<Row>> {
        validate_name("namespace", namespace)?;
        validate_name("table", operation.table())?;
        debug!(namespace, table = operation.table(), op = operation.name(), "storage operation");

        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        if let StorageOperation::CreateTable { table } = &operation {
            namespaces
                .entry(namespace.to_string())
                .or_default()
                .entry(table.clone())
                .or_default();
            return Ok(Vec::new());
        }

        let table = namespaces
            .get_mut(namespace)
            .and_then(|tables| tables.get_mut(operation.table()))
            .ok_or_else(|| StorageError::TableNotFound {
                namespace: namespace.to_string(),
                table: operation.table().to_string(),
            })?;

        match operation {
            StorageOperation::CreateTable { .. } => Ok(Vec::new()),
            StorageOperation::Insert { row, .. } => table.insert(row).map(|row| vec![row]),
            StorageOperation::Update { filter, values, .. } => Ok(table.update(&filter, &values)),
            StorageOperation::Delete { filter, .. } => Ok(table.delete(&filter)),
            StorageOperation::Query { filter, limit, .. } => Ok(table.query(&filter, limit)),
        }
    }
}
