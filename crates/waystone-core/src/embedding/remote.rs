//! Remote batched embedding over an OpenAI-compatible endpoint.
//!
//! Built for vLLM's `/v1/embeddings` surface but works against anything
//! OpenAI-shaped. Texts are cut into batches of `batch_size`, with up to
//! `concurrency` requests in flight. Transient failures (connect errors,
//! 429, 5xx) are retried with exponential backoff; 4xx responses and
//! dimension mismatches abort immediately.

use super::EmbedBackend;
use crate::config::{EMBED_BACKOFF_BASE_MS, EMBED_MAX_ATTEMPTS};
use crate::error::{ConfigError, EmbedError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Normalizes a user-supplied endpoint to its `/v1` base.
///
/// Accepts a bare host, `…/v1`, or `…/v1/embeddings` (with or without a
/// trailing slash) and always returns the `…/v1` form.
pub fn resolve_base_url(url: &str) -> Result<String, ConfigError> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidUrl("empty URL".to_string()));
    }

    let base = if let Some(stripped) = trimmed.strip_suffix("/embeddings") {
        stripped.to_string()
    } else {
        trimmed.to_string()
    };

    if base.ends_with("/v1") {
        Ok(base)
    } else {
        Ok(format!("{base}/v1"))
    }
}

/// Batched embeddings client for OpenAI-compatible servers.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    batch_size: usize,
    concurrency: usize,
}

impl RemoteEmbedder {
    /// Builds a client against `url` for `model`.
    pub fn new(
        url: &str,
        model: &str,
        batch_size: usize,
        concurrency: usize,
    ) -> Result<Self, ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        let base_url = resolve_base_url(url)?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            model: model.to_string(),
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        })
    }

    /// Checks the served model list and falls back to the first served
    /// model when the configured id is absent.
    ///
    /// A renamed deployment of the same weights is common with vLLM; the
    /// warning leaves an audit trail without failing the build.
    pub async fn preflight(&mut self) -> Result<(), EmbedError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EmbedError::InferenceFailed(format!("failed to query {url}: {e}")))?;
        let listing: ModelList = response
            .json()
            .await
            .map_err(|e| EmbedError::InferenceFailed(format!("bad model listing: {e}")))?;

        if listing.data.iter().any(|m| m.id == self.model) {
            debug!(model = %self.model, "model served by endpoint");
            return Ok(());
        }

        match listing.data.first() {
            Some(first) => {
                warn!(
                    requested = %self.model,
                    served = %first.id,
                    "model not served by endpoint, using the first served model"
                );
                self.model = first.id.clone();
                Ok(())
            }
            None => Err(EmbedError::InferenceFailed(format!(
                "endpoint {} serves no models",
                self.base_url
            ))),
        }
    }

    async fn send_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let request = EmbeddingRequest {
                model: &self.model,
                input: batch,
            };

            let outcome = self.client.post(&url).json(&request).send().await;
            let err = match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                            EmbedError::InferenceFailed(format!("bad embedding response: {e}"))
                        })?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != batch.len() {
                            return Err(EmbedError::InferenceFailed(format!(
                                "endpoint returned {} embeddings for {} inputs",
                                parsed.data.len(),
                                batch.len()
                            )));
                        }
                        return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
                    }

                    let body = resp.text().await.unwrap_or_default();
                    if !is_retryable_status(status) {
                        return Err(EmbedError::Rejected {
                            status: status.as_u16(),
                            message: body,
                        });
                    }
                    format!("{status}: {body}")
                }
                Err(e) => e.to_string(),
            };

            if attempt >= EMBED_MAX_ATTEMPTS {
                return Err(EmbedError::RetriesExhausted {
                    attempts: attempt,
                    message: err,
                });
            }

            let backoff = Duration::from_millis(EMBED_BACKOFF_BASE_MS << (attempt - 1));
            warn!(attempt, error = %err, "transient embedding failure, backing off {:?}", backoff);
            tokio::time::sleep(backoff).await;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl EmbedBackend for RemoteEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            texts = texts.len(),
            model = %self.model,
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            "embedding remotely"
        );

        // Index each batch so out-of-order completion can be reassembled.
        let batches: Vec<(usize, Vec<String>)> = texts
            .chunks(self.batch_size)
            .enumerate()
            .map(|(i, c)| (i, c.to_vec()))
            .collect();

        let mut results: Vec<Option<Vec<Vec<f32>>>> = vec![None; batches.len()];
        let mut in_flight = stream::iter(batches)
            .map(|(i, batch)| async move { (i, self.send_batch(&batch).await) })
            .buffer_unordered(self.concurrency);

        while let Some((i, outcome)) = in_flight.next().await {
            results[i] = Some(outcome?);
        }

        Ok(results.into_iter().flatten().flatten().collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bare_host() {
        assert_eq!(
            resolve_base_url("http://127.0.0.1:8000").unwrap(),
            "http://127.0.0.1:8000/v1"
        );
    }

    #[test]
    fn test_resolve_v1_suffix() {
        assert_eq!(
            resolve_base_url("http://host:8000/v1").unwrap(),
            "http://host:8000/v1"
        );
        assert_eq!(
            resolve_base_url("http://host:8000/v1/").unwrap(),
            "http://host:8000/v1"
        );
    }

    #[test]
    fn test_resolve_full_embeddings_path() {
        assert_eq!(
            resolve_base_url("http://host:8000/v1/embeddings").unwrap(),
            "http://host:8000/v1"
        );
        assert_eq!(
            resolve_base_url("http://host:8000/embeddings").unwrap(),
            "http://host:8000/v1"
        );
    }

    #[test]
    fn test_resolve_rejects_empty() {
        assert!(resolve_base_url("").is_err());
        assert!(resolve_base_url("   ").is_err());
    }

    #[test]
    fn test_new_rejects_missing_model() {
        assert!(matches!(
            RemoteEmbedder::new("http://host", "", 64, 8),
            Err(ConfigError::MissingModel)
        ));
    }

    #[test]
    fn test_retryable_status_classification() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
