// =====================================================
// COMMON BACKUP TYPES
// =====================================================

use std::time::Duration;

// --- Dynamic Rows ---

/// One table row as fetched from a backend: an ordered mapping from column
/// name to JSON value. Ordering is preserved by serde_json's `preserve_order`
/// feature, so the key set of the first fetched row doubles as the column
/// list for the whole table.
pub type RowRecord = serde_json::Map<String, serde_json::Value>;

// --- Progress Reporting ---

/// Invoked synchronously with `(phase_label, current_step, total_steps)`.
/// Total is `2 * table_count` (schema phase then data phase per table).
pub type ProgressCallback = dyn Fn(&str, usize, usize) + Send + Sync;

// --- Backup Options ---

pub const DEFAULT_PAGE_SIZE: u64 = 1000;
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 100;
pub const DEFAULT_DDL_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Rows fetched per page while scanning a table.
    pub page_size: u64,
    /// Rows per generated INSERT statement.
    pub insert_batch_size: usize,
    /// How long a single DDL introspection call may run before the dump
    /// falls back to a placeholder comment.
    pub ddl_timeout: Duration,
    /// Candidate tables probed when the introspection RPC yields nothing.
    pub fallback_tables: Vec<String>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            ddl_timeout: DEFAULT_DDL_TIMEOUT,
            fallback_tables: Vec::new(),
        }
    }
}

impl BackupOptions {
    pub fn with_fallback_tables(mut self, tables: Vec<String>) -> Self {
        self.fallback_tables = tables;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page size must be greater than zero".to_string());
        }
        if self.insert_batch_size == 0 {
            return Err("insert batch size must be greater than zero".to_string());
        }
        if self.ddl_timeout.is_zero() {
            return Err("ddl timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}
