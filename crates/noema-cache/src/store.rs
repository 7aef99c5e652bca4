// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed vector store for cache entries.
//!
//! Entries are scoped per user and carry a fixed TTL from creation. The
//! embedding scan loads `(id, embedding, outputs, created_at)` tuples for
//! one user only; similarity runs in process against that slice.

use noema_core::analysis::AnalysisResult;
use noema_core::types::{blob_to_vec, cosine_similarity, vec_to_blob};
use noema_core::NoemaError;
use rusqlite::params;
use tokio_rusqlite::Connection;

use noema_storage::Database;

/// Helper to convert tokio_rusqlite errors into NoemaError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> NoemaError {
    NoemaError::Storage {
        source: Box::new(e),
    }
}

/// A scored cache candidate.
#[derive(Debug)]
pub struct CacheMatch {
    pub entry_id: String,
    pub outputs: AnalysisResult,
    pub similarity: f32,
}

/// Aggregate per-user cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
}

/// Raw store operations; errors surface here and are swallowed one layer
/// up in [`crate::SemanticCache`].
#[derive(Clone)]
pub struct CacheStore {
    conn: Connection,
}

impl CacheStore {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection().clone(),
        }
    }

    /// Find the best non-expired entry for the user at or above the
    /// threshold.
    ///
    /// Highest similarity wins; ties break on the most recent `created_at`.
    /// A threshold of 1.0 (or above) degenerates to exact-embedding match.
    /// Entries stored under a different dimension never match.
    pub async fn best_match(
        &self,
        user_id: &str,
        embedding: &[f32],
        threshold: f64,
    ) -> Result<Option<CacheMatch>, NoemaError> {
        let user_id = user_id.to_string();
        let query = embedding.to_vec();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, embedding, outputs, created_at FROM cache_entries
                     WHERE user_id = ?1
                       AND expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                )?;
                let candidates = stmt
                    .query_map(params![user_id], |row| {
                        let blob: Vec<u8> = row.get(1)?;
                        Ok((
                            row.get::<_, String>(0)?,
                            blob_to_vec(&blob),
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let exact_only = threshold >= 1.0;
                let mut best: Option<(String, String, f32, String)> = None;
                for (id, stored, outputs, created_at) in candidates {
                    let similarity = if exact_only {
                        if stored == query {
                            1.0
                        } else {
                            continue;
                        }
                    } else {
                        let s = cosine_similarity(&query, &stored);
                        if (s as f64) < threshold {
                            continue;
                        }
                        s
                    };

                    let better = match &best {
                        None => true,
                        Some((_, _, best_sim, best_created)) => {
                            similarity > *best_sim
                                || (similarity == *best_sim && created_at > *best_created)
                        }
                    };
                    if better {
                        best = Some((id, outputs, similarity, created_at));
                    }
                }

                let Some((entry_id, outputs_raw, similarity, _)) = best else {
                    return Ok(None);
                };

                // A stored payload that no longer parses is treated as
                // absent rather than an error.
                let Ok(outputs) = serde_json::from_str::<AnalysisResult>(&outputs_raw) else {
                    return Ok(None);
                };

                Ok(Some(CacheMatch {
                    entry_id,
                    outputs,
                    similarity,
                }))
            })
            .await
            .map_err(storage_err)
    }

    /// Record a hit on an entry.
    pub async fn record_hit(&self, entry_id: &str) -> Result<(), NoemaError> {
        let entry_id = entry_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE cache_entries SET hit_count = hit_count + 1,
                         last_hit_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![entry_id],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Insert a new entry with the configured TTL. Does not deduplicate.
    pub async fn insert(
        &self,
        user_id: &str,
        text: &str,
        embedding: &[f32],
        outputs: &AnalysisResult,
        ttl_days: u32,
    ) -> Result<String, NoemaError> {
        let id = uuid::Uuid::new_v4().to_string();
        let entry_id = id.clone();
        let user_id = user_id.to_string();
        let text = text.to_string();
        let blob = vec_to_blob(embedding);
        let outputs_json = serde_json::to_string(outputs)
            .map_err(|e| NoemaError::Internal(format!("failed to serialize cache payload: {e}")))?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO cache_entries (id, user_id, text, embedding, outputs, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5,
                             strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?6))",
                    params![
                        entry_id,
                        user_id,
                        text,
                        blob,
                        outputs_json,
                        format!("+{ttl_days} days")
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Delete expired entries. Returns the number removed.
    pub async fn reap_expired(&self) -> Result<usize, NoemaError> {
        self.conn
            .call(|conn| {
                let removed = conn.execute(
                    "DELETE FROM cache_entries
                     WHERE expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    [],
                )?;
                Ok(removed)
            })
            .await
            .map_err(storage_err)
    }

    /// Entry and hit counts for one user (live entries only).
    pub async fn stats(&self, user_id: &str) -> Result<CacheStats, NoemaError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let (entries, hits): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(hit_count), 0) FROM cache_entries
                     WHERE user_id = ?1
                       AND expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(CacheStats {
                    entries: entries as u64,
                    hits: hits as u64,
                })
            })
            .await
            .map_err(storage_err)
    }

    #[cfg(test)]
    pub(crate) async fn force_expire_all(&self) -> Result<(), NoemaError> {
        self.conn
            .call(|conn| {
                conn.execute(
                    "UPDATE cache_entries
                     SET expires_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-1 hours')",
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }
}
