//! HTTP client for an Ollama-compatible embedding endpoint.
//!
//! `POST {url}/api/embeddings` with `{model, prompt}` returns
//! `{embedding: [f32]}`; `GET {url}/api/tags` lists available models for the
//! health check. Inputs are truncated to a character ceiling so they stay
//! inside the model's context window.

use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// A successful embedding call.
#[derive(Debug, Clone)]
pub struct EmbedResult {
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

/// Outcome of a health probe against the embedding service.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EmbeddingHealth {
    pub available: bool,
    pub model: String,
    pub url: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Debug)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    url: String,
    model: String,
    max_chars: usize,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::ServiceUnavailable(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_chars: config.max_chars,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single text. Truncates to the configured character ceiling
    /// on a char boundary first.
    pub async fn embed(&self, text: &str) -> Result<EmbedResult> {
        let prompt = truncate_chars(text, self.max_chars);

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
        });

        let response = self
            .http
            .post(format!("{}/api/embeddings", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ServiceUnavailable(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ServiceUnavailable(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("malformed embedding response: {e}")))?;

        if parsed.embedding.is_empty() {
            return Err(Error::Protocol("empty embedding in response".into()));
        }

        let dimensions = parsed.embedding.len();
        Ok(EmbedResult {
            vector: parsed.embedding,
            model: self.model.clone(),
            dimensions,
        })
    }

    /// Probe the service and verify the configured model is installed.
    /// Never errors; unreachable or model-less services report unavailable.
    pub async fn health(&self) -> EmbeddingHealth {
        let available = match self
            .http
            .get(format!("{}/api/tags", self.url))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                match response.json::<TagsResponse>().await {
                    Ok(tags) => tags.models.iter().any(|m| {
                        // "nomic-embed-text:latest" should satisfy "nomic-embed-text"
                        m.name == self.model
                            || m.name.split(':').next() == Some(self.model.as_str())
                    }),
                    Err(_) => false,
                }
            }
            _ => false,
        };

        EmbeddingHealth {
            available,
            model: self.model.clone(),
            url: self.url.clone(),
        }
    }
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // multi-byte chars count as one
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[test]
    fn client_strips_trailing_slash() {
        let config = EmbeddingConfig {
            url: "http://localhost:11434/".into(),
            ..Default::default()
        };
        let client = EmbeddingClient::new(&config).unwrap();
        assert_eq!(client.url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn unreachable_service_reports_unavailable() {
        let config = EmbeddingConfig {
            // Reserved TEST-NET address; nothing listens here
            url: "http://192.0.2.1:1".into(),
            timeout_secs: 1,
            ..Default::default()
        };
        let client = EmbeddingClient::new(&config).unwrap();

        let health = client.health().await;
        assert!(!health.available);

        let err = client.embed("anything").await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }
}
