// =====================================================
// DATABASE BACKUP
// Builds a single SQL text document: schemas, data, notes
// =====================================================

pub mod discovery;
pub mod sql_utils;


use chrono::{SecondsFormat, Utc};
use thiserror::Error;

use crate::source::{SourceError, TableSource};
use crate::types::{BackupOptions, ProgressCallback, RowRecord};

/// Banner line separating the document's sections. The restore-side parser
/// splits on this exact string.
pub const SECTION_BANNER: &str = "-- ============================================";

pub const SCHEMA_SECTION_TITLE: &str = "-- STEP 1: TABLE SCHEMAS (DDL)";
pub const DATA_SECTION_TITLE: &str = "-- STEP 2: TABLE DATA";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("invalid backup options: {0}")]
    InvalidOptions(String),

    #[error("no accessible tables found to back up")]
    NoAccessibleTables,
}

/// Produces the full backup document for every discoverable table: a header,
/// a DDL section, a data section wrapped in session-replication-role toggles,
/// and a row-level-security note. Per-table failures degrade to comment lines
/// in the output; the only fatal conditions are invalid options and an empty
/// discovery result.
pub async fn create_backup(
    source: &dyn TableSource,
    options: &BackupOptions,
    progress: Option<&ProgressCallback>,
) -> Result<String, BackupError> {
    options.validate().map_err(BackupError::InvalidOptions)?;

    let mut parts: Vec<String> = Vec::new();

    parts.push("-- Database Backup".to_string());
    parts.push(format!(
        "-- Generated at: {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    parts.push("-- This backup includes table schemas (DDL) and data".to_string());
    parts.push(String::new());

    report(progress, "Fetching table list...", 0, 0);
    let tables = discovery::discover_tables(source, &options.fallback_tables).await;
    if tables.is_empty() {
        return Err(BackupError::NoAccessibleTables);
    }

    log::info!("backing up {} tables", tables.len());
    parts.push(format!("-- Found {} tables to backup", tables.len()));
    parts.push(String::new());

    let total = tables.len() * 2;

    push_section_banner(&mut parts, SCHEMA_SECTION_TITLE);
    for (i, table) in tables.iter().enumerate() {
        report(progress, &format!("Backing up schema: {}", table), i + 1, total);
        append_table_schema(source, options, table, &mut parts).await;
    }

    push_section_banner(&mut parts, DATA_SECTION_TITLE);
    parts.push("-- Disable foreign key checks temporarily".to_string());
    parts.push("SET session_replication_role = replica;".to_string());
    parts.push(String::new());

    for (i, table) in tables.iter().enumerate() {
        report(
            progress,
            &format!("Backing up data: {}", table),
            tables.len() + i + 1,
            total,
        );
        append_table_data(source, options, table, &mut parts).await;
    }

    parts.push("SET session_replication_role = DEFAULT;".to_string());
    parts.push(String::new());

    report(progress, "Finishing up...", total, total);
    append_rls_note(&mut parts);

    Ok(parts.join("\n"))
}

fn report(progress: Option<&ProgressCallback>, label: &str, current: usize, total: usize) {
    if let Some(callback) = progress {
        callback(label, current, total);
    }
}

fn push_section_banner(parts: &mut Vec<String>, title: &str) {
    parts.push(SECTION_BANNER.to_string());
    parts.push(title.to_string());
    parts.push(SECTION_BANNER.to_string());
    parts.push(String::new());
}

// --- Schema Section ---

/// Captures one table's DDL, racing the source call against the configured
/// timeout. Losing the race drops the in-flight future, so a hung backend
/// call is cancelled instead of left running unobserved. Every failure mode
/// degrades to a placeholder comment.
async fn append_table_schema(
    source: &dyn TableSource,
    options: &BackupOptions,
    table: &str,
    parts: &mut Vec<String>,
) {
    match tokio::time::timeout(options.ddl_timeout, source.get_table_ddl(table)).await {
        Ok(Ok(ddl)) if !ddl.trim().is_empty() => {
            parts.push(format!("-- Table {} schema", table));
            parts.push(sql_utils::ensure_sql_terminated(&ddl));
            parts.push(String::new());
        }
        Ok(Ok(_)) => {
            log::warn!("DDL helper returned nothing for {}", table);
            push_ddl_placeholder(parts, table, "empty DDL returned");
        }
        Ok(Err(err)) => {
            log::warn!("could not capture DDL for {}: {}", table, err);
            push_ddl_placeholder(parts, table, &err.to_string());
        }
        Err(_) => {
            log::warn!("DDL capture for {} timed out", table);
            push_ddl_placeholder(parts, table, "timed out");
        }
    }
}

fn push_ddl_placeholder(parts: &mut Vec<String>, table: &str, reason: &str) {
    parts.push(format!("-- Table {} schema (DDL not available: {})", table, reason));
    parts.push(format!("-- CREATE TABLE {} (...);", table));
    parts.push(String::new());
}

// --- Data Section ---

/// Dumps one table as a DELETE plus batched INSERTs. A missing table and a
/// failed fetch each leave a comment behind; the backup moves on.
async fn append_table_data(
    source: &dyn TableSource,
    options: &BackupOptions,
    table: &str,
    parts: &mut Vec<String>,
) {
    let rows = match fetch_all_rows(source, table, options.page_size).await {
        Ok(rows) => rows,
        Err(err) if err.is_missing_table() => {
            parts.push(format!("-- Table {} does not exist or is not accessible", table));
            return;
        }
        Err(err) => {
            log::warn!("failed to back up data for {}: {}", table, err);
            parts.push(format!("-- Error backing up {}: {}", table, err));
            parts.push(String::new());
            return;
        }
    };

    if rows.is_empty() {
        parts.push(format!("-- Table {} is empty", table));
        parts.push(String::new());
        return;
    }

    let columns = sql_utils::insert_column_order(&rows);

    parts.push(format!("-- Data for table: {} ({} rows)", table, rows.len()));
    parts.push(format!("DELETE FROM {};", table));
    parts.push(String::new());

    for statement in
        sql_utils::build_insert_statements(table, &columns, &rows, options.insert_batch_size)
    {
        parts.push(statement);
        parts.push(String::new());
    }

    let drifted = sql_utils::count_column_drift(&rows, &columns);
    if drifted > 0 {
        log::warn!(
            "{} rows in {} did not match the first row's columns",
            drifted,
            table
        );
        parts.push(format!(
            "-- Warning: {} rows had a different column set; missing columns written as NULL, extra keys dropped",
            drifted
        ));
        parts.push(String::new());
    }
}

/// Pages through a table until a short or empty page signals the end.
async fn fetch_all_rows(
    source: &dyn TableSource,
    table: &str,
    page_size: u64,
) -> Result<Vec<RowRecord>, SourceError> {
    let mut all_rows = Vec::new();
    let mut offset = 0u64;

    loop {
        let page = source.fetch_rows(table, offset, page_size).await?;
        if page.is_empty() {
            break;
        }
        let last_page = (page.len() as u64) < page_size;
        all_rows.extend(page);
        if last_page {
            break;
        }
        offset += page_size;
    }

    Ok(all_rows)
}

// --- RLS Note ---

fn append_rls_note(parts: &mut Vec<String>) {
    parts.push("-- Row Level Security Policies".to_string());
    parts.push("-- Note: RLS policies should be backed up from Supabase Dashboard".to_string());
    parts.push("-- or using pg_dump for complete backup".to_string());
    parts.push(String::new());
    parts.push("-- To backup RLS policies, use the following SQL in Supabase SQL Editor:".to_string());
    parts.push(
        "-- SELECT schemaname, tablename, policyname, permissive, roles, cmd, qual, with_check"
            .to_string(),
    );
    parts.push("-- FROM pg_policies".to_string());
    parts.push("-- WHERE schemaname = 'public';".to_string());
    parts.push(String::new());
}
