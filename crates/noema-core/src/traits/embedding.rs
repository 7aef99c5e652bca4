// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::Failure;

/// Adapter for generating vector embeddings from text.
///
/// Powers the semantic cache; its absence disables caching rather than
/// failing the pipeline.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    /// Short identifier, e.g. `"gemini-embedding"`.
    fn name(&self) -> &str;

    /// The dimension every returned vector has.
    fn dimension(&self) -> usize;

    /// Generate an embedding for the given text.
    ///
    /// Implementations must return exactly [`dimension`](Self::dimension)
    /// components, padding or truncating the backend's native size if it
    /// differs.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Failure>;
}
