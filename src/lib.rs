//! supadump: plain-SQL backups for Supabase-style Postgres projects.
//!
//! Produces a single annotated `.sql` document with a DDL section and a data
//! section per table, summarizes such documents back into statement counts,
//! and copies storage buckets between projects. Tables are read either
//! through the PostgREST API (`RestSource`) or a direct database connection
//! (`PgSource`).

pub mod backup;
pub mod postgres;
pub mod rest;
pub mod restore;
pub mod source;
pub mod storage;
pub mod types;

pub use backup::{create_backup, BackupError};
pub use postgres::PgSource;
pub use rest::{RestConfig, RestSource};
pub use restore::{parse_backup_summary, split_sql_statements, RestoreSummary};
pub use source::{SourceError, TableSource};
pub use storage::{StorageConfig, StorageError, StorageSync, SyncReport};
pub use types::{BackupOptions, ProgressCallback, RowRecord};
