// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persistence sink: atomic, idempotent updates to thought rows.
//!
//! This is the sole place status transitions are enforced. Ownership of a
//! row is taken with a compare-and-set in [`ThoughtStore::begin_processing`];
//! stage columns are first-writer-wins so at-least-once redelivery cannot
//! overwrite earlier results.

use noema_core::analysis::StageName;
use noema_core::types::{blob_to_vec, vec_to_blob};
use noema_core::{ErrorKind, NoemaError, Thought, ThoughtStatus};
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::database::{map_tr_err, Database};

const THOUGHT_COLUMNS: &str = "id, user_id, text, status, attempts, \
     classification, analysis, value_impact, action_plan, priority, \
     embedding, context_version, error_kind, error_message, \
     created_at, processed_at, processing_started_at";

/// Error messages are bounded before they land in the row.
const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Outcome of the `begin_processing` compare-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Ownership taken; the attempt counter after the increment.
    Started { attempts: i64 },
    /// Another delivery holds the row and its grace window is still open.
    Busy,
    /// The row is already completed; redelivery is a no-op.
    AlreadyCompleted,
    /// The row failed with a permanent kind (including a dead-lettered
    /// retry budget); redelivery is a no-op.
    AlreadyFailed,
    /// No such thought.
    NotFound,
}

/// Outcome of the `complete` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed,
    /// Idempotent redelivery after a prior completion.
    AlreadyCompleted,
    /// A stage column is still NULL; completing would break the invariant.
    MissingStages,
    NotFound,
}

/// Store for thought rows.
#[derive(Clone)]
pub struct ThoughtStore {
    conn: Connection,
}

impl ThoughtStore {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection().clone(),
        }
    }

    /// Insert a new thought in `pending` state.
    pub async fn insert(
        &self,
        thought_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), NoemaError> {
        let thought_id = thought_id.to_string();
        let user_id = user_id.to_string();
        let text = text.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO thoughts (id, user_id, text) VALUES (?1, ?2, ?3)",
                    params![thought_id, user_id, text],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Load a thought by id.
    pub async fn get(&self, thought_id: &str) -> Result<Option<Thought>, NoemaError> {
        let thought_id = thought_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {THOUGHT_COLUMNS} FROM thoughts WHERE id = ?1"
                ))?;
                let mut rows = stmt.query_map(params![thought_id], row_to_thought)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Atomic compare-and-set taking ownership of the row for processing.
    ///
    /// `pending` rows and rows that failed with a transient kind (a
    /// released mid-retry run) transition immediately; a `failed` row
    /// carrying a permanent kind is terminal — it was dead-lettered or
    /// failed for good, and a replayed envelope must not reclaim it. A
    /// `processing` row whose `processing_started_at` is older than
    /// `grace_seconds` is considered abandoned and taken over; a fresher
    /// one reports [`BeginOutcome::Busy`]. The attempt counter increments
    /// on every successful transition and never decreases.
    pub async fn begin_processing(
        &self,
        thought_id: &str,
        grace_seconds: u64,
    ) -> Result<BeginOutcome, NoemaError> {
        let thought_id = thought_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let row = tx.query_row(
                    "SELECT status, processing_started_at, error_kind
                     FROM thoughts WHERE id = ?1",
                    params![thought_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                );

                let (status, started_at, error_kind) = match row {
                    Ok(triple) => triple,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        tx.commit()?;
                        return Ok(BeginOutcome::NotFound);
                    }
                    Err(e) => return Err(e.into()),
                };

                if status == "completed" {
                    tx.commit()?;
                    return Ok(BeginOutcome::AlreadyCompleted);
                }

                if status == "failed" {
                    // An unknown or missing kind is treated as permanent.
                    let permanent = error_kind
                        .as_deref()
                        .and_then(ErrorKind::from_str_value)
                        .map(|kind| !kind.is_transient())
                        .unwrap_or(true);
                    if permanent {
                        tx.commit()?;
                        return Ok(BeginOutcome::AlreadyFailed);
                    }
                }

                if status == "processing" {
                    let cutoff: String = tx.query_row(
                        "SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)",
                        params![format!("-{grace_seconds} seconds")],
                        |row| row.get(0),
                    )?;
                    let within_grace = started_at
                        .as_deref()
                        .map(|s| s >= cutoff.as_str())
                        .unwrap_or(false);
                    if within_grace {
                        tx.commit()?;
                        return Ok(BeginOutcome::Busy);
                    }
                }

                tx.execute(
                    "UPDATE thoughts SET status = 'processing',
                         attempts = attempts + 1,
                         processing_started_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                         error_kind = NULL,
                         error_message = NULL
                     WHERE id = ?1",
                    params![thought_id],
                )?;
                let attempts: i64 = tx.query_row(
                    "SELECT attempts FROM thoughts WHERE id = ?1",
                    params![thought_id],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                Ok(BeginOutcome::Started { attempts })
            })
            .await
            .map_err(map_tr_err)
    }

    /// Persist one stage output. First-writer-wins: a no-op if the column
    /// is already set or the row has left `processing`.
    ///
    /// Returns whether this call wrote the column.
    pub async fn write_stage(
        &self,
        thought_id: &str,
        stage: StageName,
        output: &serde_json::Value,
    ) -> Result<bool, NoemaError> {
        let thought_id = thought_id.to_string();
        let json = output.to_string();
        // Column names come from StageName, never from input.
        let sql = format!(
            "UPDATE thoughts SET {col} = ?2 \
             WHERE id = ?1 AND {col} IS NULL AND status = 'processing'",
            col = stage.as_str()
        );
        let wrote = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(&sql, params![thought_id, json])?;
                Ok(changed > 0)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(stage = %stage, wrote, "stage output persisted");
        Ok(wrote)
    }

    /// Terminal transition to `completed`.
    ///
    /// Valid only when all five stage columns are set; otherwise reports
    /// [`CompleteOutcome::MissingStages`], which the orchestrator maps to
    /// `permanent/invariant`.
    pub async fn complete(
        &self,
        thought_id: &str,
        embedding: Option<&[f32]>,
        context_version: Option<i64>,
    ) -> Result<CompleteOutcome, NoemaError> {
        let thought_id = thought_id.to_string();
        let blob = embedding.map(vec_to_blob);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let row = tx.query_row(
                    "SELECT status,
                            classification IS NULL OR analysis IS NULL
                                OR value_impact IS NULL OR action_plan IS NULL
                                OR priority IS NULL
                     FROM thoughts WHERE id = ?1",
                    params![thought_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
                );

                let (status, missing) = match row {
                    Ok(pair) => pair,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        tx.commit()?;
                        return Ok(CompleteOutcome::NotFound);
                    }
                    Err(e) => return Err(e.into()),
                };

                if status == "completed" {
                    tx.commit()?;
                    return Ok(CompleteOutcome::AlreadyCompleted);
                }
                if missing {
                    tx.commit()?;
                    return Ok(CompleteOutcome::MissingStages);
                }

                tx.execute(
                    "UPDATE thoughts SET status = 'completed',
                         processed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                         embedding = COALESCE(?2, embedding),
                         context_version = COALESCE(?3, context_version)
                     WHERE id = ?1",
                    params![thought_id, blob, context_version],
                )?;
                tx.commit()?;
                Ok(CompleteOutcome::Completed)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Terminal transition to `failed`. Idempotent; never demotes a
    /// completed row.
    pub async fn fail(
        &self,
        thought_id: &str,
        kind: ErrorKind,
        message: &str,
    ) -> Result<(), NoemaError> {
        let thought_id = thought_id.to_string();
        let kind = kind.as_str();
        let message: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE thoughts SET status = 'failed',
                         processed_at = COALESCE(processed_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                         error_kind = ?2,
                         error_message = ?3
                     WHERE id = ?1 AND status <> 'completed'",
                    params![thought_id, kind, message],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Thoughts still `pending` past the grace window, oldest first.
    ///
    /// These are work orders that never reached the broker (deferred
    /// ingest) or whose envelope was lost; the sweeper republishes them.
    pub async fn stale_pending(
        &self,
        grace_seconds: u64,
        limit: usize,
    ) -> Result<Vec<Thought>, NoemaError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {THOUGHT_COLUMNS} FROM thoughts
                     WHERE status = 'pending'
                       AND created_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)
                     ORDER BY created_at ASC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(
                        params![format!("-{grace_seconds} seconds"), limit as i64],
                        row_to_thought,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Thoughts stuck in `processing` past the grace window, oldest first.
    pub async fn stuck_processing(
        &self,
        grace_seconds: u64,
        limit: usize,
    ) -> Result<Vec<Thought>, NoemaError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {THOUGHT_COLUMNS} FROM thoughts
                     WHERE status = 'processing'
                       AND processing_started_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)
                     ORDER BY processing_started_at ASC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(
                        params![format!("-{grace_seconds} seconds"), limit as i64],
                        row_to_thought,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

fn row_to_thought(row: &rusqlite::Row) -> rusqlite::Result<Thought> {
    let status: String = row.get(3)?;
    let embedding: Option<Vec<u8>> = row.get(10)?;

    fn stage<T: serde::de::DeserializeOwned>(
        row: &rusqlite::Row,
        idx: usize,
    ) -> rusqlite::Result<Option<T>> {
        let raw: Option<String> = row.get(idx)?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    Ok(Thought {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        status: ThoughtStatus::from_str_value(&status),
        attempts: row.get(4)?,
        classification: stage(row, 5)?,
        analysis: stage(row, 6)?,
        value_impact: stage(row, 7)?,
        action_plan: stage(row, 8)?,
        priority: stage(row, 9)?,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        context_version: row.get(11)?,
        error_kind: row.get(12)?,
        error_message: row.get(13)?,
        created_at: row.get(14)?,
        processed_at: row.get(15)?,
        processing_started_at: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> ThoughtStore {
        let db = Database::open_in_memory().await.unwrap();
        ThoughtStore::new(&db)
    }

    fn classification_json() -> serde_json::Value {
        json!({"type": "question", "urgency": "soon"})
    }

    fn all_stage_jsons() -> [(StageName, serde_json::Value); 5] {
        [
            (StageName::Classification, classification_json()),
            (StageName::Analysis, json!({"goal_alignment": {}})),
            (
                StageName::ValueImpact,
                json!({
                    "economic": {"score": 5.0}, "relational": {"score": 5.0},
                    "legacy": {"score": 5.0}, "health": {"score": 5.0},
                    "growth": {"score": 5.0}, "weighted_total": 5.0
                }),
            ),
            (StageName::ActionPlan, json!({"main_actions": []})),
            (
                StageName::Priority,
                json!({"priority_level": "Medium", "recommended_timeline": {}}),
            ),
        ]
    }

    #[tokio::test]
    async fn insert_and_get_pending() {
        let store = store().await;
        store.insert("t-1", "u-1", "Should I learn Rust?").await.unwrap();

        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.status, ThoughtStatus::Pending);
        assert_eq!(thought.attempts, 0);
        assert_eq!(thought.text, "Should I learn Rust?");
        assert!(thought.classification.is_none());
        assert!(thought.processed_at.is_none());
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = store().await;
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn begin_processing_takes_ownership_and_increments() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();

        let outcome = store.begin_processing("t-1", 600).await.unwrap();
        assert_eq!(outcome, BeginOutcome::Started { attempts: 1 });

        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.status, ThoughtStatus::Processing);
        assert!(thought.processing_started_at.is_some());
    }

    #[tokio::test]
    async fn begin_processing_busy_within_grace() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();

        // Second delivery within the grace window backs off.
        let outcome = store.begin_processing("t-1", 600).await.unwrap();
        assert_eq!(outcome, BeginOutcome::Busy);

        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.attempts, 1, "busy must not bump the counter");
    }

    #[tokio::test]
    async fn begin_processing_takes_over_stale_row() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();

        // Grace of zero seconds: the claim goes stale as soon as the
        // timestamp ticks over.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let outcome = store.begin_processing("t-1", 0).await.unwrap();
        assert_eq!(outcome, BeginOutcome::Started { attempts: 2 });
    }

    #[tokio::test]
    async fn begin_processing_after_completion_is_noop() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();
        for (stage, output) in all_stage_jsons() {
            store.write_stage("t-1", stage, &output).await.unwrap();
        }
        store.complete("t-1", None, None).await.unwrap();

        let outcome = store.begin_processing("t-1", 600).await.unwrap();
        assert_eq!(outcome, BeginOutcome::AlreadyCompleted);
    }

    #[tokio::test]
    async fn begin_processing_unknown_thought() {
        let store = store().await;
        assert_eq!(
            store.begin_processing("ghost", 600).await.unwrap(),
            BeginOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn begin_processing_retries_failed_row() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();
        store
            .fail("t-1", ErrorKind::Timeout, "provider timed out")
            .await
            .unwrap();

        let outcome = store.begin_processing("t-1", 600).await.unwrap();
        assert_eq!(outcome, BeginOutcome::Started { attempts: 2 });

        // The failure record is cleared while processing.
        let thought = store.get("t-1").await.unwrap().unwrap();
        assert!(thought.error_kind.is_none());
    }

    #[tokio::test]
    async fn begin_processing_refuses_terminally_failed_row() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();
        // The consumer exhausted the retry budget and dead-lettered the
        // envelope; a replayed delivery must not reclaim the row.
        store
            .fail("t-1", ErrorKind::RetriesExhausted, "retry budget exhausted")
            .await
            .unwrap();

        let outcome = store.begin_processing("t-1", 600).await.unwrap();
        assert_eq!(outcome, BeginOutcome::AlreadyFailed);

        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.status, ThoughtStatus::Failed);
        assert_eq!(
            thought.error_kind.as_deref(),
            Some("permanent/retries_exhausted")
        );
        assert_eq!(thought.attempts, 1, "refused claims must not bump the counter");

        // Any other permanent kind is just as terminal.
        store.insert("t-2", "u-1", "text").await.unwrap();
        store.begin_processing("t-2", 600).await.unwrap();
        store
            .fail("t-2", ErrorKind::UnknownUser, "no context stored")
            .await
            .unwrap();
        assert_eq!(
            store.begin_processing("t-2", 600).await.unwrap(),
            BeginOutcome::AlreadyFailed
        );
    }

    #[tokio::test]
    async fn write_stage_first_writer_wins() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();

        let first = json!({"type": "task", "urgency": "soon"});
        let second = json!({"type": "idea", "urgency": "never"});

        assert!(store
            .write_stage("t-1", StageName::Classification, &first)
            .await
            .unwrap());
        assert!(!store
            .write_stage("t-1", StageName::Classification, &second)
            .await
            .unwrap());

        let thought = store.get("t-1").await.unwrap().unwrap();
        let classification = thought.classification.unwrap();
        assert_eq!(
            classification.kind,
            noema_core::analysis::ThoughtKind::Task,
            "second write must not overwrite the first"
        );
    }

    #[tokio::test]
    async fn write_stage_rejected_outside_processing() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        // Still pending: no write.
        assert!(!store
            .write_stage("t-1", StageName::Classification, &classification_json())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn complete_requires_all_stages() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();
        store
            .write_stage("t-1", StageName::Classification, &classification_json())
            .await
            .unwrap();

        let outcome = store.complete("t-1", None, None).await.unwrap();
        assert_eq!(outcome, CompleteOutcome::MissingStages);

        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.status, ThoughtStatus::Processing);
    }

    #[tokio::test]
    async fn complete_persists_embedding_and_is_idempotent() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();
        for (stage, output) in all_stage_jsons() {
            store.write_stage("t-1", stage, &output).await.unwrap();
        }

        let embedding = vec![0.5_f32; 8];
        let outcome = store.complete("t-1", Some(&embedding), Some(4)).await.unwrap();
        assert_eq!(outcome, CompleteOutcome::Completed);

        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.status, ThoughtStatus::Completed);
        assert_eq!(thought.embedding.as_deref(), Some(&embedding[..]));
        assert_eq!(thought.context_version, Some(4));
        assert!(thought.processed_at.is_some());
        assert!(thought.analysis_result().is_some());

        let again = store.complete("t-1", Some(&embedding), Some(4)).await.unwrap();
        assert_eq!(again, CompleteOutcome::AlreadyCompleted);
    }

    #[tokio::test]
    async fn fail_records_error_and_never_demotes_completed() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();
        store
            .fail("t-1", ErrorKind::UnknownUser, "no context stored")
            .await
            .unwrap();

        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.status, ThoughtStatus::Failed);
        assert_eq!(thought.error_kind.as_deref(), Some("permanent/unknown_user"));
        assert!(thought.processed_at.is_some());

        // Completed rows are immune to fail.
        store.insert("t-2", "u-1", "text").await.unwrap();
        store.begin_processing("t-2", 600).await.unwrap();
        for (stage, output) in all_stage_jsons() {
            store.write_stage("t-2", stage, &output).await.unwrap();
        }
        store.complete("t-2", None, None).await.unwrap();
        store.fail("t-2", ErrorKind::Stuck, "late sweeper").await.unwrap();
        let thought = store.get("t-2").await.unwrap().unwrap();
        assert_eq!(thought.status, ThoughtStatus::Completed);
    }

    #[tokio::test]
    async fn fail_truncates_long_messages() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        store.begin_processing("t-1", 600).await.unwrap();
        let long = "x".repeat(2000);
        store.fail("t-1", ErrorKind::Network, &long).await.unwrap();
        let thought = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(thought.error_message.unwrap().len(), 500);
    }

    #[tokio::test]
    async fn stuck_scan_finds_only_stale_processing() {
        let store = store().await;
        store.insert("t-stale", "u-1", "old").await.unwrap();
        store.begin_processing("t-stale", 600).await.unwrap();
        store.insert("t-pending", "u-1", "untouched").await.unwrap();

        // Grace 3600s: nothing is stale yet.
        assert!(store.stuck_processing(3600, 10).await.unwrap().is_empty());

        // Grace 0s: the processing row qualifies; pending does not.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let stuck = store.stuck_processing(0, 10).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, "t-stale");
    }

    #[tokio::test]
    async fn attempts_counter_is_monotonic() {
        let store = store().await;
        store.insert("t-1", "u-1", "text").await.unwrap();
        let mut last = 0;
        for _ in 0..3 {
            match store.begin_processing("t-1", 0).await.unwrap() {
                BeginOutcome::Started { attempts } => {
                    assert!(attempts > last);
                    last = attempts;
                }
                other => panic!("expected Started, got {other:?}"),
            }
            store.fail("t-1", ErrorKind::Timeout, "again").await.unwrap();
        }
        assert_eq!(last, 3);
    }
}
