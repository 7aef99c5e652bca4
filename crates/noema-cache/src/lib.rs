// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic cache for pipeline results.
//!
//! A per-user vector store short-circuits the five-agent pipeline when a
//! sufficiently similar thought was analyzed before. The cache is strictly
//! best-effort: every internal error — including the embedding backend
//! being absent or down — degrades to a miss, never to a failed thought.

pub mod store;

use std::sync::Arc;

use noema_config::model::CacheConfig;
use noema_core::analysis::AnalysisResult;
use noema_core::EmbeddingAdapter;
use noema_storage::Database;
use tracing::{debug, info, warn};

pub use store::{CacheMatch, CacheStats, CacheStore};

/// A cache hit: the stored outputs plus the similarity that matched.
#[derive(Debug)]
pub struct CacheHit {
    pub outputs: AnalysisResult,
    pub similarity: f32,
}

/// The never-fail cache facade used by the orchestrator.
pub struct SemanticCache {
    store: CacheStore,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    config: CacheConfig,
}

impl SemanticCache {
    pub fn new(
        db: &Database,
        config: CacheConfig,
        embedder: Option<Arc<dyn EmbeddingAdapter>>,
    ) -> Self {
        if embedder.is_none() {
            info!("no embedding adapter configured; semantic cache disabled");
        }
        Self {
            store: CacheStore::new(db),
            embedder,
            config,
        }
    }

    /// Whether lookups can do anything at all.
    pub fn is_enabled(&self) -> bool {
        self.embedder.is_some()
    }

    /// Embed the text, swallowing failures.
    ///
    /// `None` both when no embedder is configured and when the backend
    /// errors; the caller proceeds without an embedding either way.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(vector) => Some(vector),
            Err(failure) => {
                warn!(error = %failure, "embedding failed; cache lookup degraded to miss");
                None
            }
        }
    }

    /// Look up the best match for an embedding. Errors degrade to a miss.
    pub async fn lookup(&self, user_id: &str, embedding: &[f32]) -> Option<CacheHit> {
        let matched = match self
            .store
            .best_match(user_id, embedding, self.config.similarity_threshold)
            .await
        {
            Ok(matched) => matched?,
            Err(e) => {
                warn!(error = %e, "cache lookup failed; treating as miss");
                return None;
            }
        };

        debug!(
            similarity = matched.similarity,
            entry_id = %matched.entry_id,
            "cache hit"
        );
        if let Err(e) = self.store.record_hit(&matched.entry_id).await {
            // Hit accounting is best-effort too.
            warn!(error = %e, "failed to record cache hit");
        }

        Some(CacheHit {
            outputs: matched.outputs,
            similarity: matched.similarity,
        })
    }

    /// Store a fresh result. Errors are swallowed; expired entries are
    /// reaped lazily on the same write path.
    pub async fn save(
        &self,
        user_id: &str,
        text: &str,
        embedding: &[f32],
        outputs: &AnalysisResult,
    ) -> bool {
        match self.store.reap_expired().await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "reaped expired cache entries"),
            Err(e) => warn!(error = %e, "cache reap failed"),
        }

        match self
            .store
            .insert(user_id, text, embedding, outputs, self.config.ttl_days)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "cache save failed");
                false
            }
        }
    }

    /// Per-user statistics for the health surface.
    pub async fn stats(&self, user_id: &str) -> CacheStats {
        self.store.stats(user_id).await.unwrap_or_default()
    }
}
