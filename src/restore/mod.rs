// =====================================================
// RESTORE PLANNING
// Summarizes a backup document; nothing is executed here
// =====================================================


use serde::Serialize;

use crate::backup::SECTION_BANNER;

/// Fixed operator guidance returned with every summary.
pub const RESTORE_INSTRUCTIONS: &str = "Run this file in the Supabase Dashboard SQL Editor. \
Apply the schema section (CREATE TABLE statements) first, then the data section \
(INSERT statements).";

/// Advisory statement counts for a backup document. Restoring means pasting
/// the file into a privileged SQL console; this summary tells the operator
/// what they are about to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub schema_statements: usize,
    pub data_statements: usize,
    pub total_statements: usize,
    pub instructions: String,
}

/// Parses a backup document into a [`RestoreSummary`]. Input that carries no
/// section markers is counted as data in its entirety, so arbitrary SQL files
/// still summarize. This function cannot fail; unrecognizable text simply
/// counts zero statements.
pub fn parse_backup_summary(content: &str) -> RestoreSummary {
    let (schema_sql, data_sql) = split_sections(content);

    let schema_statements = cleaned_statements(&schema_sql)
        .filter(|statement| statement.to_uppercase().contains("CREATE"))
        .count();
    let data_statements = cleaned_statements(&data_sql)
        .filter(|statement| !statement.starts_with("SET"))
        .count();

    RestoreSummary {
        schema_statements,
        data_statements,
        total_statements: schema_statements + data_statements,
        instructions: RESTORE_INSTRUCTIONS.to_string(),
    }
}

/// Splits arbitrary SQL text into executable statements. Fragments that are
/// empty or all comments are dropped; leading comment lines are removed from
/// the statements that remain.
pub fn split_sql_statements(content: &str) -> Vec<String> {
    cleaned_statements(content).collect()
}

#[derive(Clone, Copy)]
enum Section {
    Preamble,
    Schema,
    Data,
}

/// Walks the banner-delimited chunks with a section cursor. The chunk holding
/// a section title is only the title line itself; the section's body arrives
/// in the chunks after it, so everything accrues to the most recent title.
fn split_sections(content: &str) -> (String, String) {
    let mut schema_sql = String::new();
    let mut data_sql = String::new();
    let mut section = Section::Preamble;

    for chunk in content.split(SECTION_BANNER) {
        if chunk.contains("STEP 1: TABLE SCHEMAS") {
            section = Section::Schema;
        } else if chunk.contains("STEP 2: TABLE DATA") {
            section = Section::Data;
        }
        match section {
            Section::Preamble => {}
            Section::Schema => schema_sql.push_str(chunk),
            Section::Data => data_sql.push_str(chunk),
        }
    }

    if schema_sql.is_empty() && data_sql.is_empty() {
        data_sql.push_str(content);
    }

    (schema_sql, data_sql)
}

/// Semicolon-split fragments with their leading comment and blank lines
/// removed. A fragment that was nothing but comments disappears instead of
/// shadowing the statement after it.
fn cleaned_statements(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(';').filter_map(|fragment| {
        let body: Vec<&str> = fragment
            .lines()
            .skip_while(|line| {
                let trimmed = line.trim();
                trimmed.is_empty() || trimmed.starts_with("--")
            })
            .collect();
        let statement = body.join("\n").trim().to_string();
        if statement.is_empty() {
            None
        } else {
            Some(statement)
        }
    })
}
