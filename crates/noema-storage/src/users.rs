// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-mostly store for user context profiles.
//!
//! The pipeline only reads; writes come from the profile service upstream.
//! Profiles are opaque JSON blobs bounded to a few kilobytes with a
//! monotonically increasing version.

use noema_core::{NoemaError, UserContext};
use rusqlite::params;
use tokio_rusqlite::Connection;

use crate::database::{map_tr_err, Database};

/// Upper bound on a stored profile, matching what the agents can absorb.
pub const MAX_PROFILE_BYTES: usize = 4096;

/// Store for user context rows.
#[derive(Clone)]
pub struct UserStore {
    conn: Connection,
}

impl UserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection().clone(),
        }
    }

    /// Insert or replace a user's profile, bumping the version.
    pub async fn upsert(
        &self,
        user_id: &str,
        profile: &serde_json::Value,
    ) -> Result<i64, NoemaError> {
        let serialized = profile.to_string();
        if serialized.len() > MAX_PROFILE_BYTES {
            return Err(NoemaError::Config(format!(
                "user profile exceeds {MAX_PROFILE_BYTES} bytes ({} bytes)",
                serialized.len()
            )));
        }
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (user_id, profile, version) VALUES (?1, ?2, 1)
                     ON CONFLICT(user_id)
                     DO UPDATE SET profile = excluded.profile, version = version + 1",
                    params![user_id.clone(), serialized],
                )?;
                let version = conn.query_row(
                    "SELECT version FROM users WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(version)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Load a user's context; `None` when the user is unknown.
    pub async fn get(&self, user_id: &str) -> Result<Option<UserContext>, NoemaError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT user_id, profile, version FROM users WHERE user_id = ?1")?;
                let mut rows = stmt.query_map(params![user_id], |row| {
                    let profile_raw: String = row.get(1)?;
                    Ok(UserContext {
                        user_id: row.get(0)?,
                        version: row.get(2)?,
                        profile: serde_json::from_str(&profile_raw)
                            .unwrap_or(serde_json::Value::Null),
                    })
                })?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(map_tr_err)
    }
}
