// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider construction from configuration.

use std::sync::Arc;

use noema_config::model::ProviderConfig;
use noema_core::{EmbeddingAdapter, NoemaError, ProviderAdapter};
use tracing::info;

use crate::anthropic::AnthropicProvider;
use crate::embedding::{GeminiEmbedder, OpenAiEmbedder};
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;

/// A chat provider plus its matching embedder, when the provider has one.
///
/// Anthropic has no embeddings API, so the `anthropic` tag disables the
/// semantic cache rather than failing startup.
pub struct ProviderSet {
    pub chat: Arc<dyn ProviderAdapter>,
    pub embedder: Option<Arc<dyn EmbeddingAdapter>>,
}

/// Build the configured provider pair.
///
/// The API key comes from config, falling back to the provider's
/// conventional environment variable.
pub fn build_providers(
    config: &ProviderConfig,
    embedding_dimension: usize,
) -> Result<ProviderSet, NoemaError> {
    let api_key = resolve_api_key(config)?;

    let set = match config.provider.as_str() {
        "anthropic" => ProviderSet {
            chat: Arc::new(AnthropicProvider::new(&api_key, &config.model)?),
            embedder: None,
        },
        "openai" => ProviderSet {
            chat: Arc::new(OpenAiProvider::new(&api_key, &config.model)?),
            embedder: Some(Arc::new(OpenAiEmbedder::new(
                &api_key,
                &config.embedding_model,
                embedding_dimension,
            )?)),
        },
        "gemini" => ProviderSet {
            chat: Arc::new(GeminiProvider::new(&api_key, &config.model)?),
            embedder: Some(Arc::new(GeminiEmbedder::new(
                &api_key,
                &config.embedding_model,
                embedding_dimension,
            )?)),
        },
        other => {
            return Err(NoemaError::Config(format!(
                "unknown provider tag `{other}`"
            )))
        }
    };

    info!(
        provider = set.chat.name(),
        model = %config.model,
        semantic_cache = set.embedder.is_some(),
        "provider initialized"
    );
    Ok(set)
}

fn resolve_api_key(config: &ProviderConfig) -> Result<String, NoemaError> {
    if let Some(key) = &config.api_key {
        return Ok(key.clone());
    }
    let var = match config.provider.as_str() {
        "anthropic" => "ANTHROPIC_API_KEY",
        "openai" => "OPENAI_API_KEY",
        "gemini" => "GEMINI_API_KEY",
        _ => "NOEMA_PROVIDER_API_KEY",
    };
    std::env::var(var).map_err(|_| {
        NoemaError::Config(format!(
            "provider.api_key not set and {var} is not in the environment"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> ProviderConfig {
        ProviderConfig {
            provider: provider.to_string(),
            api_key: Some("test-key".to_string()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn anthropic_has_no_embedder() {
        let set = build_providers(&config("anthropic"), 768).unwrap();
        assert_eq!(set.chat.name(), "anthropic");
        assert!(set.embedder.is_none());
    }

    #[test]
    fn gemini_and_openai_carry_embedders() {
        let set = build_providers(&config("gemini"), 768).unwrap();
        assert_eq!(set.chat.name(), "gemini");
        let embedder = set.embedder.expect("gemini should have an embedder");
        assert_eq!(embedder.dimension(), 768);

        let set = build_providers(&config("openai"), 1536).unwrap();
        assert_eq!(set.chat.name(), "openai");
        assert_eq!(set.embedder.unwrap().dimension(), 1536);
    }

    #[test]
    fn unknown_tag_is_config_error() {
        assert!(build_providers(&config("mistral"), 768).is_err());
    }
}
