// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Noema thought-analysis pipeline.
//!
//! This crate provides the foundational error taxonomy, event schemas,
//! domain types, and adapter traits used throughout the Noema workspace.
//! Infrastructure crates (broker, storage, cache, bus, providers) implement
//! the traits defined here.

pub mod analysis;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, Failure, NoemaError};
pub use event::{DeadLetterRecord, EventBody, EventEnvelope, SCHEMA_VERSION, TOTAL_AGENTS};
pub use types::{Thought, ThoughtStatus, UserContext};

// Re-export adapter traits at crate root.
pub use traits::{EmbeddingAdapter, ProgressBus, ProgressStream, ProviderAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_matches_event_module() {
        assert_eq!(SCHEMA_VERSION, 1);
        assert_eq!(TOTAL_AGENTS, 5);
    }

    #[test]
    fn adapter_traits_are_object_safe() {
        // If any of these traits loses object safety, this stops compiling.
        fn _provider(_: &dyn ProviderAdapter) {}
        fn _embedder(_: &dyn EmbeddingAdapter) {}
        fn _bus(_: &dyn ProgressBus) {}
    }

    #[test]
    fn error_kind_exposed_at_root() {
        assert!(ErrorKind::RateLimited.is_transient());
        assert!(!ErrorKind::Stuck.is_transient());
    }
}
