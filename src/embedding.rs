//! Embedding generation via an OpenAI-compatible API

use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Inputs per embeddings request; longer batches are split across requests
const EMBED_BATCH_SIZE: usize = 100;

/// Request timeout for embedding and model-list calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Fallback dimensions for known models when the API does not report them
const KNOWN_MODEL_DIMENSIONS: &[(&str, u32)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for texts. The output has the same length and
    /// order as the input; an empty input returns an empty output without
    /// contacting the remote.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// An embedding model advertised by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub dimensions: u32,
}

/// Client for an OpenAI-compatible embeddings endpoint
pub struct OpenAiEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// Embeddings API request
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Embeddings API response
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Models API response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    dimensions: Option<u32>,
}

impl OpenAiEmbeddingClient {
    /// Create a new embedding client
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// The model name requests are issued against
    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .authorized(self.client.post(self.api_url("embeddings")))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream(format!(
                "embedding API returned {}: {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| RagError::Upstream(format!("invalid embedding response: {}", e)))?;

        if parsed.data.len() != batch.len() {
            return Err(RagError::Upstream(format!(
                "embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                batch.len()
            )));
        }

        // The API is allowed to reorder entries; index restores input order.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    /// List embedding models advertised by the API.
    ///
    /// Falls back to the known-model table when the remote is unreachable or
    /// returns nothing usable, always including the configured model.
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        let mut models = match self.fetch_models().await {
            Ok(models) => models,
            Err(err) => {
                warn!("failed to list embedding models: {}", err);
                Vec::new()
            }
        };

        if models.is_empty() {
            models = KNOWN_MODEL_DIMENSIONS
                .iter()
                .map(|(id, dimensions)| ModelInfo {
                    id: (*id).to_string(),
                    dimensions: *dimensions,
                })
                .collect();
        }
        if !models.iter().any(|m| m.id == self.model) {
            models.insert(
                0,
                ModelInfo {
                    id: self.model.clone(),
                    dimensions: known_dimensions(&self.model),
                },
            );
        }
        models
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .authorized(self.client.get(self.api_url("models")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Upstream(format!(
                "models API returned {}",
                status
            )));
        }

        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|e| RagError::Upstream(format!("invalid models response: {}", e)))?;

        Ok(parsed
            .data
            .into_iter()
            .filter(|m| m.id.to_lowercase().contains("embed"))
            .map(|m| {
                let dimensions = m.dimensions.unwrap_or_else(|| known_dimensions(&m.id));
                ModelInfo { id: m.id, dimensions }
            })
            .collect())
    }
}

fn known_dimensions(model: &str) -> u32 {
    KNOWN_MODEL_DIMENSIONS
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, d)| *d)
        .unwrap_or(1536)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("embedding {} texts with model {}", texts.len(), self.model);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_joins_without_double_slash() {
        let client = OpenAiEmbeddingClient::new("https://api.example.com/v1/", "key", "m");
        assert_eq!(
            client.api_url("embeddings"),
            "https://api.example.com/v1/embeddings"
        );
    }

    #[test]
    fn test_known_dimensions_fallback() {
        assert_eq!(known_dimensions("text-embedding-3-large"), 3072);
        assert_eq!(known_dimensions("some-custom-embed"), 1536);
    }
}
