// =====================================================
// POSTGRES SOURCE
// Direct database access for self-managed connections
// =====================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Uuid;
use sqlx::{Column, Pool, Postgres, Row};
use std::time::Duration;

use crate::source::{SourceError, TableSource};
use crate::types::RowRecord;

pub struct PgSource {
    pool: Pool<Postgres>,
    schema: String,
}

impl PgSource {
    /// Connects a small pool to the given database URL. The schema name is
    /// validated up front because it is interpolated into queries.
    pub async fn connect(database_url: &str, schema: &str) -> Result<Self, SourceError> {
        if database_url.trim().is_empty() {
            return Err(SourceError::Config {
                message: "database url is empty".to_string(),
            });
        }
        if !is_safe_identifier(schema) {
            return Err(SourceError::Config {
                message: format!("invalid schema name: {}", schema),
            });
        }

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Configuration(_) => SourceError::Config {
                    message: format!("invalid database url: {}", err),
                },
                _ => SourceError::Transport {
                    message: format!("failed to connect: {}", err),
                },
            })?;

        Ok(PgSource {
            pool,
            schema: schema.to_string(),
        })
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.schema, table)
    }
}

#[async_trait::async_trait]
impl TableSource for PgSource {
    async fn list_tables(&self) -> Result<Vec<String>, SourceError> {
        let rows = sqlx::query(
            "SELECT tablename FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| SourceError::Rpc {
            name: "pg_tables".to_string(),
            message: err.to_string(),
        })?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("tablename"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SourceError::Query {
                message: err.to_string(),
            })
    }

    async fn table_exists(&self, table: &str) -> Result<bool, SourceError> {
        if !is_safe_identifier(table) {
            return Ok(false);
        }

        let probe = format!("SELECT * FROM {} LIMIT 0", self.qualified(table));
        match sqlx::query(&probe).fetch_all(&self.pool).await {
            Ok(_) => Ok(true),
            Err(err) => match classify_table_error(table, err) {
                SourceError::MissingTable { .. } => Ok(false),
                SourceError::Transport { message } => Err(SourceError::Transport { message }),
                // The table is there, we just cannot read it.
                _ => Ok(true),
            },
        }
    }

    async fn fetch_rows(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>, SourceError> {
        if !is_safe_identifier(table) {
            return Err(SourceError::MissingTable {
                table: table.to_string(),
            });
        }

        let query = format!("SELECT * FROM {} OFFSET $1 LIMIT $2", self.qualified(table));
        let rows = sqlx::query(&query)
            .bind(offset as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| classify_table_error(table, err))?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn get_table_ddl(&self, table: &str) -> Result<String, SourceError> {
        if !is_safe_identifier(table) {
            return Err(SourceError::MissingTable {
                table: table.to_string(),
            });
        }

        let columns_row = sqlx::query(
            r#"
            WITH columns AS (
                SELECT
                    column_name,
                    data_type,
                    character_maximum_length,
                    is_nullable,
                    column_default
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
            )
            SELECT string_agg(
                column_name || ' ' ||
                CASE
                    WHEN character_maximum_length IS NOT NULL
                    THEN data_type || '(' || character_maximum_length || ')'
                    ELSE data_type
                END ||
                CASE WHEN is_nullable = 'NO' THEN ' NOT NULL' ELSE '' END ||
                CASE WHEN column_default IS NOT NULL THEN ' DEFAULT ' || column_default ELSE '' END,
                E',\n    '
            ) as columns_def
            FROM columns
        "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify_table_error(table, err))?;

        let columns_def: String = columns_row.try_get("columns_def").unwrap_or_default();
        if columns_def.trim().is_empty() {
            // information_schema knows no columns, so the table is gone.
            return Err(SourceError::MissingTable {
                table: table.to_string(),
            });
        }

        let pk_rows = sqlx::query(
            r#"
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
            WHERE tc.table_schema = $1
                AND tc.table_name = $2
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
        "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();

        let pk_columns: Vec<String> = pk_rows
            .iter()
            .map(|row| row.try_get::<String, _>("column_name").unwrap_or_default())
            .filter(|name| !name.is_empty())
            .collect();

        Ok(compose_create_table(&self.schema, table, &columns_def, &pk_columns))
    }
}

// --- Helpers ---

/// Bare lowercase-style SQL identifier: letters, digits, underscores, not
/// starting with a digit. Everything else never reaches a query string.
fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn classify_table_error(table: &str, err: sqlx::Error) -> SourceError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("42P01") {
            return SourceError::MissingTable {
                table: table.to_string(),
            };
        }
        return SourceError::Query {
            message: db_err.message().to_string(),
        };
    }
    SourceError::Transport {
        message: err.to_string(),
    }
}

fn compose_create_table(
    schema: &str,
    table: &str,
    columns_def: &str,
    pk_columns: &[String],
) -> String {
    let pk_constraint = if pk_columns.is_empty() {
        String::new()
    } else {
        format!(",\n    PRIMARY KEY ({})", pk_columns.join(", "))
    };
    format!(
        "CREATE TABLE {}.{} (\n    {}{}\n);",
        schema, table, columns_def, pk_constraint
    )
}

fn record_from_row(row: &PgRow) -> RowRecord {
    let mut record = RowRecord::new();
    for (index, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), decode_column(row, index));
    }
    record
}

/// Best-effort decode of one column into JSON. Typed decodes run first so
/// temporal, uuid and json columns keep their shape instead of leaking their
/// binary representations; the unchecked chain then covers the plain scalar
/// types. Anything undecodable becomes NULL.
fn decode_column(row: &PgRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<DateTime<Utc>, _>(index) {
        return Value::String(value.to_rfc3339_opts(SecondsFormat::Micros, true));
    }
    if let Ok(value) = row.try_get::<NaiveDateTime, _>(index) {
        return Value::String(value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string());
    }
    if let Ok(value) = row.try_get::<NaiveDate, _>(index) {
        return Value::String(value.to_string());
    }
    if let Ok(value) = row.try_get::<NaiveTime, _>(index) {
        return Value::String(value.to_string());
    }
    if let Ok(value) = row.try_get::<Uuid, _>(index) {
        return Value::String(value.to_string());
    }
    if let Ok(value) = row.try_get::<Value, _>(index) {
        return value;
    }
    if let Ok(value) = row.try_get_unchecked::<i64, _>(index) {
        return json!(value);
    }
    if let Ok(value) = row.try_get_unchecked::<i32, _>(index) {
        return json!(value);
    }
    if let Ok(value) = row.try_get_unchecked::<i16, _>(index) {
        return json!(value);
    }
    if let Ok(value) = row.try_get_unchecked::<f64, _>(index) {
        return json!(value);
    }
    if let Ok(value) = row.try_get_unchecked::<f32, _>(index) {
        return json!(value);
    }
    if let Ok(value) = row.try_get_unchecked::<bool, _>(index) {
        return json!(value);
    }
    if let Ok(value) = row.try_get_unchecked::<String, _>(index) {
        return Value::String(value);
    }
    if let Ok(bytes) = row.try_get_unchecked::<Vec<u8>, _>(index) {
        return Value::String(String::from_utf8_lossy(&bytes).to_string());
    }
    Value::Null
}
