use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::DiveResult;
use crate::models::{dive_type_key, fold_key};

const SEARCH_KEY_COLUMNS: [&str; 4] = ["site_key", "area_key", "country_key", "dive_type_key"];

pub async fn run_migrations(config: &Config) -> DiveResult<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables, the FTS5 index, and its sync triggers. Idempotent.
pub async fn apply(pool: &SqlitePool) -> DiveResult<()> {
    // seq aliases rowid so the FTS5 external-content rowids survive VACUUM
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dive_logs (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            narrative TEXT NOT NULL,
            site TEXT NOT NULL,
            area TEXT,
            country TEXT,
            depth_max REAL NOT NULL,
            depth_avg REAL,
            length_minutes INTEGER NOT NULL,
            dive_type TEXT NOT NULL,
            highlights TEXT,
            dive_date TEXT,
            dive_time TEXT,
            equipment_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            site_key TEXT,
            area_key TEXT,
            country_key TEXT,
            dive_type_key TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    add_search_keys(pool).await?;

    // Create preferences table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create vectors table (semantic retrieval)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dive_vectors (
            dive_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (dive_id) REFERENCES dive_logs(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='dive_logs_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE dive_logs_fts USING fts5(
                narrative,
                site,
                area,
                country,
                highlights,
                content='dive_logs',
                content_rowid='rowid',
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Index anything inserted before the index existed
        sqlx::query("INSERT INTO dive_logs_fts(dive_logs_fts) VALUES('rebuild')")
            .execute(pool)
            .await?;
    }

    // Keep the index consistent with the table inside the writing transaction
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS dive_logs_ai AFTER INSERT ON dive_logs BEGIN
            INSERT INTO dive_logs_fts(rowid, narrative, site, area, country, highlights)
            VALUES (new.rowid, new.narrative, new.site, new.area, new.country, new.highlights);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS dive_logs_ad AFTER DELETE ON dive_logs BEGIN
            INSERT INTO dive_logs_fts(dive_logs_fts, rowid, narrative, site, area, country, highlights)
            VALUES ('delete', old.rowid, old.narrative, old.site, old.area, old.country, old.highlights);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS dive_logs_au AFTER UPDATE ON dive_logs BEGIN
            INSERT INTO dive_logs_fts(dive_logs_fts, rowid, narrative, site, area, country, highlights)
            VALUES ('delete', old.rowid, old.narrative, old.site, old.area, old.country, old.highlights);
            INSERT INTO dive_logs_fts(rowid, narrative, site, area, country, highlights)
            VALUES (new.rowid, new.narrative, new.site, new.area, new.country, new.highlights);
        END
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dive_logs_date ON dive_logs(dive_date DESC, dive_time DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dive_logs_country ON dive_logs(country)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Add the case-folded filter columns to databases created without them and
/// fill them for rows that predate the columns.
async fn add_search_keys(pool: &SqlitePool) -> DiveResult<()> {
    let existing: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info('dive_logs')")
            .fetch_all(pool)
            .await?;
    for column in SEARCH_KEY_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            sqlx::query(&format!("ALTER TABLE dive_logs ADD COLUMN {} TEXT", column))
                .execute(pool)
                .await?;
        }
    }

    let rows = sqlx::query(
        "SELECT seq, site, area, country, dive_type FROM dive_logs WHERE site_key IS NULL",
    )
    .fetch_all(pool)
    .await?;
    if rows.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for row in &rows {
        let area: Option<String> = row.try_get("area")?;
        let country: Option<String> = row.try_get("country")?;
        sqlx::query(
            "UPDATE dive_logs SET site_key = ?, area_key = ?, country_key = ?, dive_type_key = ? WHERE seq = ?",
        )
        .bind(fold_key(&row.try_get::<String, _>("site")?))
        .bind(area.as_deref().map(fold_key))
        .bind(country.as_deref().map(fold_key))
        .bind(dive_type_key(&row.try_get::<String, _>("dive_type")?))
        .bind(row.try_get::<i64, _>("seq")?)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    tracing::info!(rows = rows.len(), "filled search keys for existing dives");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_search_keys_added_to_existing_database() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db.path = tmp.path().join("divelog.sqlite");
        let pool = db::connect(&config).await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE dive_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                narrative TEXT NOT NULL,
                site TEXT NOT NULL,
                area TEXT,
                country TEXT,
                depth_max REAL NOT NULL,
                depth_avg REAL,
                length_minutes INTEGER NOT NULL,
                dive_type TEXT NOT NULL,
                highlights TEXT,
                dive_date TEXT,
                dive_time TEXT,
                equipment_json TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO dive_logs (id, narrative, site, country, depth_max, length_minutes, dive_type, created_at)
             VALUES ('a', 'Tug on the reef', 'Tugboat', 'CURAÇAO', 18, 40, 'Wreck, Night Dive', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        apply(&pool).await.unwrap();
        apply(&pool).await.unwrap();

        let row = sqlx::query(
            "SELECT site_key, area_key, country_key, dive_type_key FROM dive_logs WHERE id = 'a'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.get::<String, _>("site_key"), "tugboat");
        assert_eq!(row.get::<Option<String>, _>("area_key"), None);
        assert_eq!(row.get::<String, _>("country_key"), "curaçao");
        assert_eq!(row.get::<String, _>("dive_type_key"), ",wreck,nightdive,");
        pool.close().await;
    }
}
