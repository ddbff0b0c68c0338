//! Bulk loading of dive records from a JSON file (`divelog populate`).
//!
//! The file holds a JSON array of objects with the same fields as the
//! `create_dive_log` tool. Each element is created independently: a bad
//! record is reported and skipped, the rest still load.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::config::Config;
use crate::models::{NewDiveLog, SearchRequest};
use crate::store::DiveStore;

/// Query run after loading to show that retrieval works.
pub const SMOKE_TEST_QUERY: &str = "Wreck dives with good visibility and marine life";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateFailure {
    /// 1-based position in the input array.
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct PopulateReport {
    pub created: Vec<String>,
    pub failures: Vec<PopulateFailure>,
}

/// Parse the input file into raw records.
pub fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dive file: {}", path.display()))?;
    let records: Vec<Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} must contain a JSON array of dives", path.display()))?;
    Ok(records)
}

/// Create one entry per record, collecting per-record failures.
pub async fn load_records(store: &DiveStore, records: Vec<Value>) -> PopulateReport {
    let mut report = PopulateReport::default();
    let total = records.len();

    for (i, record) in records.into_iter().enumerate() {
        let index = i + 1;
        let result = match serde_json::from_value::<NewDiveLog>(record) {
            Ok(input) => store.create(input).await.map_err(|e| e.to_string()),
            Err(e) => Err(format!("invalid record: {}", e)),
        };

        match result {
            Ok(id) => {
                report.created.push(id);
                if index % 5 == 0 {
                    tracing::info!(index, total, "dive logs inserted");
                }
            }
            Err(message) => {
                tracing::warn!(index, error = %message, "dive log rejected");
                report.failures.push(PopulateFailure { index, message });
            }
        }
    }

    report
}

pub async fn run_populate(config: &Config, path: &Path) -> Result<()> {
    let records = read_records(path)?;
    let store = DiveStore::open(config).await?;

    println!("Inserting {} dive log records...", records.len());
    let report = load_records(&store, records).await;

    for failure in &report.failures {
        println!("  Error inserting dive log {}: {}", failure.index, failure.message);
    }
    println!();
    println!("Dive log data insertion completed!");
    println!("  Success: {}", report.created.len());
    println!("  Errors: {}", report.failures.len());

    println!();
    println!("Smoke test search: '{}'", SMOKE_TEST_QUERY);
    let results = store
        .search(&SearchRequest {
            query: SMOKE_TEST_QUERY.to_string(),
            ..Default::default()
        })
        .await?;

    if results.is_empty() {
        println!("  (no results)");
    }
    for (i, hit) in results.iter().enumerate() {
        let dive = &hit.dive;
        println!(
            "{}. {:<24} | score {:>7.3} | {} | {}m | {}",
            i + 1,
            dive.site,
            hit.score,
            dive.dive_type,
            dive.depth_max,
            dive.date.as_deref().unwrap_or("undated")
        );
        println!(
            "   {}, {}",
            dive.area.as_deref().unwrap_or("-"),
            dive.country.as_deref().unwrap_or("-")
        );
    }

    store.close().await;
    Ok(())
}
