//! Embedding maintenance for the semantic retrieval mode
//! (`divelog embed pending` / `divelog embed rebuild`).
//!
//! New entries are embedded inline by [`DiveStore::create`]; these commands
//! catch up entries whose inline embedding failed, entries created while
//! embeddings were disabled, and entries whose stored vector came from a
//! different text or model.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::DiveResult;
use crate::store::{DiveStore, PendingEmbedding};

/// Counts from one embedding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Embed `pending` in batches. A failed batch is counted and skipped; a
/// storage failure aborts the pass.
pub async fn embed_entries(
    store: &DiveStore,
    provider: &dyn EmbeddingProvider,
    pending: &[PendingEmbedding],
    batch_size: usize,
) -> DiveResult<EmbedReport> {
    let mut report = EmbedReport {
        total: pending.len(),
        ..Default::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match provider.embed(&texts).await {
            Ok(vectors) => {
                for (item, vector) in batch.iter().zip(vectors.iter()) {
                    store
                        .upsert_vector(
                            &item.dive_id,
                            provider.model_name(),
                            provider.dims(),
                            &item.content_hash,
                            vector,
                        )
                        .await?;
                    report.embedded += 1;
                }
            }
            Err(e) => {
                tracing::warn!(batch = batch.len(), error = %e, "embedding batch failed");
                report.failed += batch.len();
            }
        }
        tracing::info!(
            embedded = report.embedded,
            failed = report.failed,
            total = report.total,
            "embedding progress"
        );
    }

    Ok(report)
}

async fn open_with_provider(config: &Config) -> Result<DiveStore> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    Ok(DiveStore::open(config).await?)
}

/// Embed entries that are missing or have stale embeddings.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let store = open_with_provider(config).await?;
    let Some(provider) = store.embedder() else {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    };
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let pending = store
        .pending_embeddings(provider.model_name(), limit)
        .await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  dives needing embeddings: {}", pending.len());
        store.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all dives up to date");
        store.close().await;
        return Ok(());
    }

    let report = embed_entries(&store, provider, &pending, batch_size).await?;

    println!("embed pending");
    println!("  total pending: {}", report.total);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);

    store.close().await;
    Ok(())
}

/// Delete every stored vector and embed all entries again.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    let store = open_with_provider(config).await?;
    let Some(provider) = store.embedder() else {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    };
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let cleared = store.clear_vectors().await?;
    println!("embed rebuild: cleared {} existing embeddings", cleared);

    let all = store.pending_embeddings(provider.model_name(), None).await?;
    if all.is_empty() {
        println!("  no dives to embed");
        store.close().await;
        return Ok(());
    }

    let report = embed_entries(&store, provider, &all, batch_size).await?;

    println!("embed rebuild");
    println!("  total dives: {}", report.total);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);

    store.close().await;
    Ok(())
}
