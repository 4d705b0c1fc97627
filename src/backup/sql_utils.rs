// =====================================================
// SQL TEXT HELPERS
// Literal rendering and INSERT assembly for backup output
// =====================================================

use std::path::Path;

use serde_json::Value;

use crate::types::RowRecord;

// --- Escaping ---

/// Doubles single quotes and backslashes so a value can sit inside a
/// single-quoted SQL literal. The two replacements are independent, so their
/// order does not change the result.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// Renders one JSON value as a SQL literal. Arrays and objects are embedded
/// as escaped JSON text with a `::jsonb` cast; everything else follows the
/// scalar rules the restore side expects.
pub fn value_to_sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", escape_sql_string(s)),
        Value::Array(_) | Value::Object(_) => {
            format!("'{}'::jsonb", escape_sql_string(&value.to_string()))
        }
    }
}

// --- INSERT Assembly ---

/// Column order for a table's INSERT statements: the first row's key order.
pub fn insert_column_order(rows: &[RowRecord]) -> Vec<String> {
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

/// Number of rows whose key set differs from the established columns. Such
/// rows are still emitted (missing columns as NULL, extras dropped), but
/// callers flag the table so the drift is visible in the output.
pub fn count_column_drift(rows: &[RowRecord], columns: &[String]) -> usize {
    rows.iter()
        .filter(|row| {
            row.len() != columns.len() || !columns.iter().all(|col| row.contains_key(col))
        })
        .count()
}

/// Builds multi-row INSERT statements for one table, `batch_size` rows per
/// statement. Each returned string is one complete statement with the value
/// tuples on their own lines. A zero batch size degrades to one row per
/// statement.
pub fn build_insert_statements(
    table: &str,
    columns: &[String],
    rows: &[RowRecord],
    batch_size: usize,
) -> Vec<String> {
    if rows.is_empty() || columns.is_empty() {
        return Vec::new();
    }

    rows.chunks(batch_size.max(1))
        .map(|batch| {
            let tuples: Vec<String> = batch
                .iter()
                .map(|row| {
                    let rendered: Vec<String> = columns
                        .iter()
                        .map(|col| value_to_sql_literal(row.get(col).unwrap_or(&Value::Null)))
                        .collect();
                    format!("({})", rendered.join(", "))
                })
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES\n{};",
                table,
                columns.join(", "),
                tuples.join(",\n")
            )
        })
        .collect()
}

// --- Statement Hygiene ---

/// Trims a DDL fragment and guarantees a trailing semicolon so it can be
/// embedded mid-document.
pub fn ensure_sql_terminated(sql: &str) -> String {
    let trimmed = sql.trim();
    if trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{};", trimmed)
    }
}

// --- File Output ---

/// Writes a finished document to disk, creating parent directories as needed.
pub fn write_text_file(file_path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(file_path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RowRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test rows must be objects"),
        }
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(escape_sql_string("O'Brien"), "O''Brien");
        assert_eq!(escape_sql_string(r"C:\tmp"), r"C:\\tmp");
        assert_eq!(escape_sql_string(r"it's C:\tmp"), r"it''s C:\\tmp");
    }

    #[test]
    fn escaping_round_trips() {
        let original = r"O'Brien saved to C:\tmp\it's done";
        let escaped = escape_sql_string(original);
        let unescaped = escaped.replace("''", "'").replace(r"\\", r"\");
        assert_eq!(unescaped, original);
    }

    #[test]
    fn renders_scalar_literals() {
        assert_eq!(value_to_sql_literal(&json!(null)), "NULL");
        assert_eq!(value_to_sql_literal(&json!(true)), "true");
        assert_eq!(value_to_sql_literal(&json!(false)), "false");
        assert_eq!(value_to_sql_literal(&json!(42)), "42");
        assert_eq!(value_to_sql_literal(&json!(-3.5)), "-3.5");
        assert_eq!(value_to_sql_literal(&json!("hello")), "'hello'");
        assert_eq!(value_to_sql_literal(&json!("it's")), "'it''s'");
    }

    #[test]
    fn renders_structured_values_as_jsonb() {
        let object = json!({ "kind": "image", "tags": ["a", "b"] });
        assert_eq!(
            value_to_sql_literal(&object),
            r#"'{"kind":"image","tags":["a","b"]}'::jsonb"#
        );
        let array = json!([1, 2, 3]);
        assert_eq!(value_to_sql_literal(&array), "'[1,2,3]'::jsonb");
    }

    #[test]
    fn jsonb_literal_escapes_embedded_quotes() {
        let value = json!({ "note": "it's fine" });
        assert_eq!(
            value_to_sql_literal(&value),
            r#"'{"note":"it''s fine"}'::jsonb"#
        );
    }

    #[test]
    fn column_order_follows_first_row() {
        let rows = vec![
            record(json!({ "id": 1, "title": "first" })),
            record(json!({ "id": 2, "title": "second" })),
        ];
        assert_eq!(insert_column_order(&rows), vec!["id", "title"]);
        assert_eq!(count_column_drift(&rows, &insert_column_order(&rows)), 0);
    }

    #[test]
    fn counts_column_drift() {
        let columns = vec!["id".to_string(), "title".to_string()];
        let rows = vec![
            record(json!({ "id": 1, "title": "ok" })),
            record(json!({ "id": 2, "extra": "surprise" })),
            record(json!({ "id": 3 })),
        ];
        assert_eq!(count_column_drift(&rows, &columns), 2);
    }

    #[test]
    fn batches_insert_statements() {
        let rows: Vec<RowRecord> = (1..=5)
            .map(|i| record(json!({ "id": i, "name": format!("row {}", i) })))
            .collect();
        let columns = insert_column_order(&rows);
        let statements = build_insert_statements("posts", &columns, &rows, 2);
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0],
            "INSERT INTO posts (id, name) VALUES\n(1, 'row 1'),\n(2, 'row 2');"
        );
        assert_eq!(statements[2], "INSERT INTO posts (id, name) VALUES\n(5, 'row 5');");
    }

    #[test]
    fn drifted_rows_fill_missing_columns_with_null() {
        let columns = vec!["id".to_string(), "title".to_string()];
        let rows = vec![record(json!({ "id": 7, "extra": true }))];
        let statements = build_insert_statements("posts", &columns, &rows, 100);
        assert_eq!(
            statements,
            vec!["INSERT INTO posts (id, title) VALUES\n(7, NULL);".to_string()]
        );
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(build_insert_statements("posts", &["id".to_string()], &[], 100).is_empty());
        let rows = vec![record(json!({ "id": 1 }))];
        assert!(build_insert_statements("posts", &[], &rows, 100).is_empty());
    }

    #[test]
    fn terminates_sql_fragments() {
        assert_eq!(ensure_sql_terminated("CREATE TABLE t (id int)"), "CREATE TABLE t (id int);");
        assert_eq!(ensure_sql_terminated("CREATE TABLE t (id int);\n"), "CREATE TABLE t (id int);");
    }

    #[test]
    fn writes_files_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("backup.sql");
        write_text_file(&path, "-- backup\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "-- backup\n");
    }
}
