// =====================================================
// TABLE DISCOVERY
// RPC listing with probe validation and a fallback roster
// =====================================================

use futures::future::join_all;

use crate::source::TableSource;

/// Discovers the tables a backup should cover. The privileged listing call is
/// tried first; its names are still probed, since a stale helper function can
/// return tables the caller cannot read. If no listed name survives its probe
/// the fallback roster is probed instead. Either way the result preserves
/// candidate order, and a failed probe drops the candidate rather than
/// aborting discovery.
pub async fn discover_tables(source: &dyn TableSource, fallback: &[String]) -> Vec<String> {
    match source.list_tables().await {
        Ok(tables) if !tables.is_empty() => {
            let existing = filter_existing_tables(source, &tables).await;
            if !existing.is_empty() {
                return existing;
            }
            log::warn!("no listed table passed its existence probe, probing fallback roster");
        }
        Ok(_) => {
            log::warn!("table listing returned no tables, probing fallback roster");
        }
        Err(err) => {
            log::warn!("table listing unavailable ({}), probing fallback roster", err);
        }
    }

    filter_existing_tables(source, fallback).await
}

/// Concurrent existence fan-out. Every probe settles independently; an error
/// counts as "absent".
async fn filter_existing_tables(source: &dyn TableSource, candidates: &[String]) -> Vec<String> {
    let probes = candidates.iter().map(|table| async move {
        match source.table_exists(table).await {
            Ok(exists) => exists,
            Err(err) => {
                log::debug!("existence probe for {} failed: {}", table, err);
                false
            }
        }
    });

    let verdicts = join_all(probes).await;
    candidates
        .iter()
        .zip(verdicts)
        .filter(|(_, exists)| *exists)
        .map(|(table, _)| table.clone())
        .collect()
}
