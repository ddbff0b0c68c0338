//! Dive log retrieval: keyword (FTS5), semantic (embeddings), and
//! filter-only search.
//!
//! # Ranking
//!
//! | Mode | Candidates | Score | Tie-break |
//! |------|------------|-------|-----------|
//! | keyword | FTS5 `MATCH` of OR-combined query terms | `-bm25()` | insertion order |
//! | semantic | every filtered entry with a stored vector | cosine similarity | insertion order |
//! | filter-only | every filtered entry (blank query) | `0.0` | insertion order |
//!
//! Metadata filters never contribute to the score. They are SQL predicates
//! ANDed with the text match.

use anyhow::Result;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{query::Query, Row, Sqlite, SqlitePool};

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::DiveResult;
use crate::get::format_dive_line;
use crate::models::{fold_key, split_types, ScoredDive, SearchFilters, SearchRequest};
use crate::store::{row_to_entry, DiveStore, DIVE_COLUMNS};

/// Largest page a single search may return.
pub const MAX_LIMIT: i64 = 100;

/// Extract lowercase alphanumeric terms from free text, deduplicated in
/// first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        let term = raw.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Build an FTS5 `MATCH` expression where any term may match.
///
/// Each term is double-quoted so FTS5 operators in user text (`AND`, `NEAR`,
/// `-`, `*`) are treated as plain words. Returns `None` when the query has no
/// searchable terms, which callers treat as a filter-only search.
pub fn fts_match_expression(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Clamp a caller-supplied limit to `[1, MAX_LIMIT]`.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIMIT)
}

#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Text(String),
    Real(f64),
}

/// SQL fragment (`AND ...` clauses over alias `d`) plus its bind values.
#[derive(Debug, Default)]
struct FilterClause {
    sql: String,
    binds: Vec<Bind>,
}

fn build_filter_clause(filters: &SearchFilters) -> FilterClause {
    let mut clause = FilterClause::default();

    if let Some(location) = filters.location.as_deref().map(fold_key) {
        if !location.is_empty() {
            clause
                .sql
                .push_str(" AND (d.country_key = ? OR d.area_key = ? OR d.site_key = ?)");
            for _ in 0..3 {
                clause.binds.push(Bind::Text(location.clone()));
            }
        }
    }

    if let Some(dive_type) = filters.dive_type.as_deref() {
        let wanted = split_types(dive_type);
        if !wanted.is_empty() {
            let ors: Vec<&str> = wanted
                .iter()
                .map(|_| "instr(d.dive_type_key, ?) > 0")
                .collect();
            clause.sql.push_str(&format!(" AND ({})", ors.join(" OR ")));
            for t in wanted {
                clause
                    .binds
                    .push(Bind::Text(format!(",{},", t.replace(' ', ""))));
            }
        }
    }

    if let Some(max) = filters.max_depth {
        clause.sql.push_str(" AND d.depth_max <= ?");
        clause.binds.push(Bind::Real(max));
    }

    if let Some(min) = filters.min_depth {
        clause.sql.push_str(" AND d.depth_max >= ?");
        clause.binds.push(Bind::Real(min));
    }

    clause
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: Vec<Bind>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for b in binds {
        query = match b {
            Bind::Text(s) => query.bind(s),
            Bind::Real(f) => query.bind(f),
        };
    }
    query
}

fn rows_to_scored(
    rows: &[SqliteRow],
    score: impl Fn(&SqliteRow) -> f64,
) -> DiveResult<Vec<ScoredDive>> {
    rows.iter()
        .map(|row| {
            Ok(ScoredDive {
                dive: row_to_entry(row)?,
                score: score(row),
            })
        })
        .collect()
}

// ============ Keyword search ============

pub(crate) async fn keyword_search(
    pool: &SqlitePool,
    match_expr: &str,
    filters: &SearchFilters,
    limit: i64,
) -> DiveResult<Vec<ScoredDive>> {
    let clause = build_filter_clause(filters);
    let sql = format!(
        r#"
        SELECT {cols}, bm25(dive_logs_fts) AS bm25_score
        FROM dive_logs_fts
        JOIN dive_logs d ON d.rowid = dive_logs_fts.rowid
        WHERE dive_logs_fts MATCH ?{filters}
        ORDER BY bm25_score ASC, d.rowid ASC
        LIMIT ?
        "#,
        cols = DIVE_COLUMNS,
        filters = clause.sql
    );

    let query = sqlx::query(&sql).bind(match_expr.to_string());
    let rows = bind_all(query, clause.binds)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    // negate so higher = better
    rows_to_scored(&rows, |row| -row.get::<f64, _>("bm25_score"))
}

// ============ Filter-only search ============

pub(crate) async fn filter_only_search(
    pool: &SqlitePool,
    filters: &SearchFilters,
    limit: Option<i64>,
) -> DiveResult<Vec<ScoredDive>> {
    let clause = build_filter_clause(filters);
    let sql = format!(
        "SELECT {cols} FROM dive_logs d WHERE 1 = 1{filters} ORDER BY d.rowid ASC{limit}",
        cols = DIVE_COLUMNS,
        filters = clause.sql,
        limit = if limit.is_some() { " LIMIT ?" } else { "" }
    );

    let mut query = bind_all(sqlx::query(&sql), clause.binds);
    if let Some(limit) = limit {
        query = query.bind(limit);
    }
    let rows = query.fetch_all(pool).await?;

    rows_to_scored(&rows, |_| 0.0)
}

// ============ Vector search ============

pub(crate) async fn vector_search(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    query: &str,
    filters: &SearchFilters,
    limit: i64,
) -> DiveResult<Vec<ScoredDive>> {
    let query_vec = embedding::embed_query(provider, query).await?;

    let clause = build_filter_clause(filters);
    let sql = format!(
        r#"
        SELECT {cols}, v.embedding
        FROM dive_logs d
        LEFT JOIN dive_vectors v ON v.dive_id = d.id AND v.model = ?
        WHERE 1 = 1{filters}
        ORDER BY d.rowid ASC
        "#,
        cols = DIVE_COLUMNS,
        filters = clause.sql
    );

    let q = sqlx::query(&sql).bind(provider.model_name().to_string());
    let rows = bind_all(q, clause.binds).fetch_all(pool).await?;

    let (embedded, missing): (Vec<SqliteRow>, Vec<SqliteRow>) = rows
        .into_iter()
        .partition(|row| row.get::<Option<Vec<u8>>, _>("embedding").is_some());
    if !missing.is_empty() {
        tracing::warn!(
            skipped = missing.len(),
            "dives without embeddings skipped; run `divelog embed pending`"
        );
    }

    let mut candidates = rows_to_scored(&embedded, |row| {
        let blob: Vec<u8> = row.get("embedding");
        embedding::cosine_similarity(&query_vec, &embedding::blob_to_vec(&blob)) as f64
    })?;

    // Stable sort keeps insertion order among equal similarities
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(limit as usize);

    Ok(candidates)
}

/// CLI entry point: run a search and print ranked results.
pub async fn run_search(
    config: &Config,
    query: &str,
    filters: SearchFilters,
    limit: Option<i64>,
) -> Result<()> {
    let store = DiveStore::open(config).await?;
    let results = store
        .search(&SearchRequest {
            query: query.to_string(),
            filters,
            limit,
        })
        .await?;
    store.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in results.iter().enumerate() {
        println!("{:>2}. [{:.3}] {}", i + 1, hit.score, format_dive_line(&hit.dive));
        if let Some(ref highlights) = hit.dive.highlights {
            println!("      {}", highlights);
        }
        println!("      id: {}", hit.dive.id);
    }

    Ok(())
}
