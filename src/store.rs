//! The record store: durable storage and retrieval of dive log entries and
//! user preferences, backed by SQLite.
//!
//! [`DiveStore`] owns the connection pool, the retrieval settings, and (in
//! semantic mode) the embedding provider. All database failures surface as
//! [`DiveLogError::StorageUnavailable`].
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create`](DiveStore::create) | Validate, embed (semantic mode) and insert a new entry atomically |
//! | [`get`](DiveStore::get) | Fetch one entry by id |
//! | [`get_all`](DiveStore::get_all) | Every entry, most recent dive first |
//! | [`search`](DiveStore::search) | Ranked, filtered retrieval |
//! | [`get_preference`](DiveStore::get_preference) | Read a preference (`None` when unset) |
//! | [`set_preference`](DiveStore::set_preference) | Upsert a preference |
//! | [`list_preferences`](DiveStore::list_preferences) | All preferences, by key |

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{DiveLogError, DiveResult};
use crate::migrate;
use crate::models::{
    dive_type_key, fold_key, DiveLogEntry, NewDiveLog, ScoredDive, SearchRequest, UserPreference,
};
use crate::search;

/// Column list (alias `d`) understood by [`row_to_entry`].
pub const DIVE_COLUMNS: &str = "d.id, d.narrative, d.site, d.area, d.country, d.depth_max, \
     d.depth_avg, d.length_minutes, d.dive_type, d.highlights, d.dive_date, d.dive_time, \
     d.equipment_json, d.created_at";

/// An entry whose stored vector is missing or stale.
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub dive_id: String,
    pub text: String,
    pub content_hash: String,
}

pub struct DiveStore {
    pool: SqlitePool,
    retrieval: RetrievalConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl DiveStore {
    /// Open (and migrate) the database named in `config`, creating the
    /// embedding provider when one is configured.
    pub async fn open(config: &Config) -> DiveResult<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::with_pool(pool, config.retrieval.clone(), embedder))
    }

    /// Wrap an already-migrated pool.
    pub fn with_pool(
        pool: SqlitePool,
        retrieval: RetrievalConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            pool,
            retrieval,
            embedder,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn embedder(&self) -> Option<&dyn EmbeddingProvider> {
        self.embedder.as_deref()
    }

    pub fn is_semantic(&self) -> bool {
        self.retrieval.is_semantic()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ============ Dive logs ============

    /// Validate and insert a new entry, returning its id.
    ///
    /// The row, its full-text index update and (when an embedding provider
    /// is configured) its vector commit together. The vector is computed
    /// before anything is written, so an embedding failure leaves the store
    /// unchanged and fails the create with `UpstreamModel`.
    pub async fn create(&self, input: NewDiveLog) -> DiveResult<String> {
        let dive = input
            .normalize()?
            .into_entry(Uuid::new_v4().to_string(), Utc::now());
        let equipment_json = serde_json::to_string(&dive.equipment)
            .map_err(|e| DiveLogError::validation(format!("invalid equipment list: {}", e)))?;

        let embedded = match self.embedder.as_deref() {
            Some(provider) => {
                let text = dive.embedding_text();
                let vector = embedding::embed_query(provider, &text).await?;
                Some((provider, embedding::content_hash(&text), vector))
            }
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO dive_logs (
                id, narrative, site, area, country, depth_max, depth_avg,
                length_minutes, dive_type, highlights, dive_date, dive_time,
                equipment_json, created_at,
                site_key, area_key, country_key, dive_type_key
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&dive.id)
        .bind(&dive.narrative)
        .bind(&dive.site)
        .bind(&dive.area)
        .bind(&dive.country)
        .bind(dive.depth_max)
        .bind(dive.depth_avg)
        .bind(dive.length_minutes)
        .bind(&dive.dive_type)
        .bind(&dive.highlights)
        .bind(&dive.date)
        .bind(&dive.time)
        .bind(&equipment_json)
        .bind(dive.created_at.timestamp_millis())
        .bind(fold_key(&dive.site))
        .bind(dive.area.as_deref().map(fold_key))
        .bind(dive.country.as_deref().map(fold_key))
        .bind(dive_type_key(&dive.dive_type))
        .execute(&mut *tx)
        .await?;

        if let Some((provider, hash, vector)) = embedded {
            write_vector(
                &mut tx,
                &dive.id,
                provider.model_name(),
                provider.dims(),
                &hash,
                &vector,
            )
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(dive_id = %dive.id, site = %dive.site, "dive log created");
        Ok(dive.id)
    }

    /// Fetch a single entry.
    pub async fn get(&self, id: &str) -> DiveResult<Option<DiveLogEntry>> {
        let sql = format!("SELECT {} FROM dive_logs d WHERE d.id = ?", DIVE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    /// Every entry: most recent dive first, undated entries last, then
    /// insertion order.
    pub async fn get_all(&self) -> DiveResult<Vec<DiveLogEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM dive_logs d
            ORDER BY d.dive_date IS NULL, d.dive_date DESC, d.dive_time DESC, d.rowid ASC
            "#,
            DIVE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }

    pub async fn count(&self) -> DiveResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM dive_logs")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Ranked, filtered retrieval.
    ///
    /// A query without searchable terms is a filter-only search returning
    /// every matching entry in insertion order (truncated only when the
    /// request carries an explicit limit). Otherwise results are ranked by
    /// BM25 (keyword mode) or cosine similarity (semantic mode) and truncated
    /// to the request limit, defaulting to `retrieval.top_k`.
    pub async fn search(&self, req: &SearchRequest) -> DiveResult<Vec<ScoredDive>> {
        let explicit_limit = req.limit.map(search::clamp_limit);
        let limit = explicit_limit.unwrap_or(self.retrieval.top_k);

        let match_expr = match search::fts_match_expression(&req.query) {
            Some(expr) => expr,
            None => {
                return search::filter_only_search(&self.pool, &req.filters, explicit_limit).await;
            }
        };

        if self.retrieval.is_semantic() {
            let provider = self.embedder.as_deref().ok_or_else(|| {
                DiveLogError::validation("semantic retrieval requires an embedding provider")
            })?;
            return search::vector_search(&self.pool, provider, &req.query, &req.filters, limit)
                .await;
        }

        search::keyword_search(&self.pool, &match_expr, &req.filters, limit).await
    }

    // ============ Preferences ============

    pub async fn get_preference(&self, key: &str) -> DiveResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key.trim())
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Insert or overwrite a preference.
    pub async fn set_preference(&self, key: &str, value: &str) -> DiveResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(DiveLogError::validation("preference key must not be empty"));
        }

        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_preferences(&self) -> DiveResult<Vec<UserPreference>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM user_preferences ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| UserPreference {
                key: row.get("key"),
                value: row.get("value"),
                updated_at: millis_to_datetime(row.get("updated_at")),
            })
            .collect())
    }

    // ============ Embeddings ============

    /// Entries with no vector for `model`, or whose text changed since.
    pub async fn pending_embeddings(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> DiveResult<Vec<PendingEmbedding>> {
        let sql = format!(
            r#"
            SELECT {}, v.content_hash AS existing_hash
            FROM dive_logs d
            LEFT JOIN dive_vectors v ON v.dive_id = d.id AND v.model = ?
            ORDER BY d.rowid ASC
            "#,
            DIVE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(model)
            .fetch_all(&self.pool)
            .await?;

        let mut pending = Vec::new();
        for row in &rows {
            if limit.is_some_and(|lim| pending.len() >= lim) {
                break;
            }
            let entry = row_to_entry(row)?;
            let text = entry.embedding_text();
            let hash = embedding::content_hash(&text);
            let existing: Option<String> = row.get("existing_hash");
            if existing.as_deref() != Some(hash.as_str()) {
                pending.push(PendingEmbedding {
                    dive_id: entry.id,
                    text,
                    content_hash: hash,
                });
            }
        }
        Ok(pending)
    }

    pub async fn upsert_vector(
        &self,
        dive_id: &str,
        model: &str,
        dims: usize,
        content_hash: &str,
        vector: &[f32],
    ) -> DiveResult<()> {
        let mut conn = self.pool.acquire().await?;
        write_vector(&mut conn, dive_id, model, dims, content_hash, vector).await
    }

    pub async fn clear_vectors(&self) -> DiveResult<u64> {
        let result = sqlx::query("DELETE FROM dive_vectors")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn vector_count(&self) -> DiveResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM dive_vectors")
            .fetch_one(&self.pool)
            .await?)
    }
}

async fn write_vector(
    conn: &mut SqliteConnection,
    dive_id: &str,
    model: &str,
    dims: usize,
    content_hash: &str,
    vector: &[f32],
) -> DiveResult<()> {
    if dims != 0 && vector.len() != dims {
        return Err(DiveLogError::upstream(format!(
            "embedding for {} has {} dimensions, expected {}",
            dive_id,
            vector.len(),
            dims
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO dive_vectors (dive_id, model, dims, content_hash, embedding, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(dive_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            content_hash = excluded.content_hash,
            embedding = excluded.embedding,
            created_at = excluded.created_at
        "#,
    )
    .bind(dive_id)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(content_hash)
    .bind(embedding::vec_to_blob(vector))
    .bind(Utc::now().timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Map a row selected with [`DIVE_COLUMNS`] into an entry.
pub fn row_to_entry(row: &SqliteRow) -> DiveResult<DiveLogEntry> {
    let equipment_json: String = row.try_get("equipment_json")?;
    let equipment: Vec<String> = serde_json::from_str(&equipment_json).map_err(|e| {
        DiveLogError::StorageUnavailable(format!("corrupt equipment list: {}", e))
    })?;

    Ok(DiveLogEntry {
        id: row.try_get("id")?,
        narrative: row.try_get("narrative")?,
        site: row.try_get("site")?,
        area: row.try_get("area")?,
        country: row.try_get("country")?,
        depth_max: row.try_get("depth_max")?,
        depth_avg: row.try_get("depth_avg")?,
        length_minutes: row.try_get("length_minutes")?,
        dive_type: row.try_get("dive_type")?,
        highlights: row.try_get("highlights")?,
        date: row.try_get("dive_date")?,
        time: row.try_get("dive_time")?,
        equipment,
        created_at: millis_to_datetime(row.try_get("created_at")?),
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
