// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapters for the semantic cache.
//!
//! The store has one fixed dimension; backends whose native size differs
//! are padded with zeros or truncated so the vector store and the
//! similarity function always agree.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use noema_core::{EmbeddingAdapter, ErrorKind, Failure, NoemaError};

use crate::classify::{classify_status, classify_transport};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1/embeddings";

/// Pad with zeros or truncate a vector to the target dimension.
pub fn fit_dimension(mut vec: Vec<f32>, dimension: usize) -> Vec<f32> {
    if vec.len() < dimension {
        vec.resize(dimension, 0.0);
    } else {
        vec.truncate(dimension);
    }
    vec
}

fn build_client() -> Result<reqwest::Client, NoemaError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| NoemaError::Provider {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Gemini embedContent adapter (768-dimensional native).
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    dimension: usize,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: &str, model: impl Into<String>, dimension: usize) -> Result<Self, NoemaError> {
        Ok(Self {
            client: build_client()?,
            model: model.into(),
            api_key: api_key.to_string(),
            dimension,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl EmbeddingAdapter for GeminiEmbedder {
    fn name(&self) -> &str {
        "gemini-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, Failure> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = GeminiEmbedRequest {
            content: GeminiContent {
                parts: vec![GeminiPart { text: text.into() }],
            },
            task_type: "SEMANTIC_SIMILARITY",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("gemini-embedding", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("gemini-embedding", status.as_u16(), &body));
        }

        let parsed: GeminiEmbedResponse = response.json().await.map_err(|e| {
            Failure::new(
                ErrorKind::InvalidPayload,
                format!("failed to parse embedding response: {e}"),
            )
        })?;

        debug!(native_len = parsed.embedding.values.len(), "gemini embedding generated");
        Ok(fit_dimension(parsed.embedding.values, self.dimension))
    }
}

/// OpenAI embeddings adapter (1536-dimensional native for text-embedding-3-small).
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    dimension: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, model: impl Into<String>, dimension: usize) -> Result<Self, NoemaError> {
        Ok(Self {
            client: build_client()?,
            model: model.into(),
            api_key: api_key.to_string(),
            dimension,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, Failure> {
        let body = OpenAiEmbedRequest {
            input: text.into(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("openai-embedding", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("openai-embedding", status.as_u16(), &body));
        }

        let parsed: OpenAiEmbedResponse = response.json().await.map_err(|e| {
            Failure::new(
                ErrorKind::InvalidPayload,
                format!("failed to parse embedding response: {e}"),
            )
        })?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                Failure::new(ErrorKind::InvalidPayload, "embedding response had no data")
            })?;

        Ok(fit_dimension(vector, self.dimension))
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct GeminiEmbedRequest {
    content: GeminiContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiEmbedding,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest {
    input: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}
