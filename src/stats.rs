//! Dive log statistics (`divelog stats`).
//!
//! Totals, a per-country breakdown, and embedding coverage, so the user can
//! check that population and `embed pending` did what they expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::error::DiveResult;
use crate::store::DiveStore;

/// Per-country breakdown. Entries without a country are grouped under
/// `"(unknown)"`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryStats {
    pub country: String,
    pub dives: i64,
    pub minutes: i64,
    pub deepest: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogStats {
    pub total_dives: i64,
    pub total_minutes: i64,
    pub embedded: i64,
    pub preferences: i64,
    /// Creation time (Unix millis) of the most recently logged entry.
    pub last_logged_ms: Option<i64>,
    pub by_country: Vec<CountryStats>,
}

pub async fn collect_stats(store: &DiveStore) -> DiveResult<LogStats> {
    let pool = store.pool();

    let totals = sqlx::query(
        "SELECT COUNT(*) AS dives, COALESCE(SUM(length_minutes), 0) AS minutes, MAX(created_at) AS last_logged FROM dive_logs",
    )
    .fetch_one(pool)
    .await?;

    let embedded = store.vector_count().await?;

    let preferences: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_preferences")
        .fetch_one(pool)
        .await?;

    let country_rows = sqlx::query(
        r#"
        SELECT
            COALESCE(country, '(unknown)') AS country,
            COUNT(*) AS dives,
            SUM(length_minutes) AS minutes,
            MAX(depth_max) AS deepest
        FROM dive_logs
        GROUP BY COALESCE(country, '(unknown)')
        ORDER BY dives DESC, country ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_country = country_rows
        .iter()
        .map(|row| CountryStats {
            country: row.get("country"),
            dives: row.get("dives"),
            minutes: row.get("minutes"),
            deepest: row.get("deepest"),
        })
        .collect();

    Ok(LogStats {
        total_dives: totals.get("dives"),
        total_minutes: totals.get("minutes"),
        embedded,
        preferences,
        last_logged_ms: totals.get("last_logged"),
        by_country,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = DiveStore::open(config).await?;
    let stats = collect_stats(&store).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Dive Log: Stats");
    println!("===============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Dives:       {}", stats.total_dives);
    println!("  Bottom time: {}", format_minutes(stats.total_minutes));
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.total_dives,
        if stats.total_dives > 0 {
            (stats.embedded * 100) / stats.total_dives
        } else {
            0
        }
    );
    println!("  Preferences: {}", stats.preferences);
    println!(
        "  Last logged: {}",
        stats
            .last_logged_ms
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.by_country.is_empty() {
        println!();
        println!("  By country:");
        println!(
            "  {:<24} {:>6} {:>10} {:>10}",
            "COUNTRY", "DIVES", "MINUTES", "DEEPEST"
        );
        println!("  {}", "-".repeat(54));

        for c in &stats.by_country {
            println!(
                "  {:<24} {:>6} {:>10} {:>9.1}m",
                c.country, c.dives, c.minutes, c.deepest
            );
        }
    }

    println!();

    store.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// `95` → `"1h 35m"`.
fn format_minutes(minutes: i64) -> String {
    if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

/// Format a Unix-millis timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts_ms: i64) -> String {
    let delta = (chrono::Utc::now().timestamp_millis() - ts_ms) / 1000;

    if delta < 0 {
        return format_ts_iso(ts_ms);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts_ms)
    }
}

fn format_ts_iso(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts_ms.to_string())
}
