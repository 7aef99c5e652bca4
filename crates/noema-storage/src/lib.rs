// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Noema pipeline.
//!
//! One database file holds the thought rows (the sink), the user-context
//! profiles, and the semantic cache entries. The sink is the sole
//! enforcement point for thought status transitions; see
//! [`thoughts::ThoughtStore`].

pub mod database;
pub mod thoughts;
pub mod users;

pub use database::Database;
pub use thoughts::{BeginOutcome, CompleteOutcome, ThoughtStore};
pub use users::UserStore;
