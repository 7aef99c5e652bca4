// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Gemini generateContent adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use noema_core::types::{ChatRequest, ChatResponse, ChatRole, ProviderCapabilities, TokenUsage};
use noema_core::{ErrorKind, Failure, NoemaError, ProviderAdapter};

use crate::classify::{classify_status, classify_transport};

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_CONTEXT_TOKENS: u32 = 1_000_000;

/// Adapter for the Gemini generateContent API.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self, NoemaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| NoemaError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model: model.into(),
            api_key: api_key.to_string(),
            base_url: API_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_prompt_cache: false,
            max_context_tokens: MAX_CONTEXT_TOKENS,
        }
    }

    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, Failure> {
        // Cache hint unsupported: the context rides in the system
        // instruction like everything else.
        let system_text = match &request.cacheable_context {
            Some(context) => format!("{}\n\n{context}", request.system),
            None => request.system.clone(),
        };

        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system_text }],
            },
            contents: request
                .messages
                .iter()
                .map(|m| Content {
                    role: Some(match m.role {
                        ChatRole::User => "user".into(),
                        ChatRole::Assistant => "model".into(),
                    }),
                    parts: vec![Part {
                        text: m.content.clone(),
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("gemini", &e))?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "gemini response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("gemini", status.as_u16(), &body));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            Failure::new(
                ErrorKind::InvalidPayload,
                format!("failed to parse gemini response: {e}"),
            )
        })?;

        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            // No candidates usually means the prompt tripped a safety filter.
            Failure::new(ErrorKind::ContentPolicy, "gemini returned no candidates")
        })?;

        let content = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed.usage_metadata.unwrap_or_default();
        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                cache_read_tokens: 0,
                cache_creation_tokens: 0,
            },
        })
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Default, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_core::types::ChatMessage;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_provider(base_url: &str) -> GeminiProvider {
        GeminiProvider::new("g-key", "gemini-2.0-flash")
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            system: "You analyze personal thoughts.".into(),
            cacheable_context: None,
            messages: vec![ChatMessage::user("Classify this.")],
            max_tokens: 500,
        }
    }

    #[tokio::test]
    async fn generate_success_joins_parts() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "```json\n"}, {"text": "{\"type\": \"idea\"}\n```"}]
                }
            }],
            "usageMetadata": {"promptTokenCount": 33, "candidatesTokenCount": 9}
        });
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let response = provider.generate(test_request()).await.unwrap();
        assert_eq!(response.content, "```json\n{\"type\": \"idea\"}\n```");
        assert_eq!(response.usage.input_tokens, 33);
        assert_eq!(response.usage.output_tokens, 9);
    }

    #[tokio::test]
    async fn no_candidates_maps_to_content_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let failure = provider.generate(test_request()).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::ContentPolicy);
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let failure = provider.generate(test_request()).await.unwrap_err();
        assert!(failure.is_transient());
    }

    #[test]
    fn capabilities_do_not_claim_prompt_cache() {
        let provider = GeminiProvider::new("k", "gemini-2.0-flash").unwrap();
        assert!(!provider.capabilities().supports_prompt_cache);
        assert_eq!(provider.capabilities().max_context_tokens, 1_000_000);
    }
}
