// =====================================================
// TABLE SOURCE ABSTRACTION
// One seam over the PostgREST and direct-Postgres backends
// =====================================================

use serde_json::Value;
use thiserror::Error;

use crate::types::RowRecord;

// --- Errors ---

/// Closed classification of backend failures, constructed at the boundary
/// where each backend receives its raw error. Everything downstream branches
/// on these kinds instead of sniffing vendor codes or message substrings.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("table {table} does not exist or is not accessible")]
    MissingTable { table: String },

    #[error("rpc {name} failed: {message}")]
    Rpc { name: String, message: String },

    #[error("query failed: {message}")]
    Query { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("invalid source configuration: {message}")]
    Config { message: String },
}

impl SourceError {
    pub fn is_missing_table(&self) -> bool {
        matches!(self, SourceError::MissingTable { .. })
    }
}

// --- Collaborator Capabilities ---

/// Read-only data access the backup component needs from the surrounding
/// application. Implementations live in `rest` and `postgres`; tests supply
/// an in-memory mock.
#[async_trait::async_trait]
pub trait TableSource: Send + Sync {
    /// Privileged "list all tables" introspection call.
    async fn list_tables(&self) -> Result<Vec<String>, SourceError>;

    /// Zero-row existence probe. `Ok(false)` means the backend reported the
    /// missing-table class of error; a backend-reported error of any other
    /// kind means the table is there but unreadable, which still counts as
    /// existing. Transport-level failures surface as `Err`.
    async fn table_exists(&self, table: &str) -> Result<bool, SourceError>;

    /// One page of rows, in the backend's implicit order.
    async fn fetch_rows(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>, SourceError>;

    /// Raw DDL for one table. Implementations do not enforce a deadline of
    /// their own; the backup layer races this call against its timeout.
    async fn get_table_ddl(&self, table: &str) -> Result<String, SourceError>;
}

// --- RPC Result Normalization ---

/// The `get_all_tables` RPC may return an array of plain names, an array of
/// `{ "table_name": … }` rows, or a single such row. Entries that carry no
/// usable name are dropped.
pub fn normalize_table_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(entry_name).collect(),
        other => entry_name(other).into_iter().collect(),
    }
}

fn entry_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Object(row) => row
            .get("table_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
