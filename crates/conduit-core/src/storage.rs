//! Storage request payloads.
//!
//! Plugins address a namespaced row store. The host forwards these operations
//! verbatim to the storage backend and relays the resulting rows.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One stored row: a JSON object keyed by column name.
pub type Row = Map<String, Value>;

/// A storage operation against one table in the plugin's namespace.
///
/// Filters are conjunctions of column equalities; an empty filter matches
/// every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StorageOperation {
    /// Create a table if it does not exist yet.
    CreateTable {
        /// Table name.
        table: String,
    },
    /// Insert a row. An `id` column is assigned when absent.
    Insert {
        /// Table name.
        table: String,
        /// Row to insert.
        row: Row,
    },
    /// Overwrite columns on every row matching the filter.
    Update {
        /// Table name.
        table: String,
        /// Equality filter.
        #[serde(default)]
        filter: Row,
        /// Columns to set.
        values: Row,
    },
    /// Delete every row matching the filter.
    Delete {
        /// Table name.
        table: String,
        /// Equality filter.
        #[serde(default)]
        filter: Row,
    },
    /// Return rows matching the filter.
    Query {
        /// Table name.
        table: String,
        /// Equality filter.
        #[serde(default)]
        filter: Row,
        /// Maximum number of rows to return.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
}

impl StorageOperation {
    /// The table this operation targets.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table }
            | Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. }
            | Self::Query { table, .. } => table,
        }
    }

    /// Short operation name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "create_table",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Query { .. } => "query",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_wire_shape() {
        let op: StorageOperation =
            serde_json::from_value(json!({"op": "query", "table": "notes"})).unwrap();
        assert_eq!(op.table(), "notes");
        assert_eq!(op.name(), "query");
        assert!(matches!(
            op,
            StorageOperation::Query { ref filter, limit: None, .. } if filter.is_empty()
        ));
    }
}
