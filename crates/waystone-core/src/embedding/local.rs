//! Local transformer embedding via candle.
//!
//! Loads a BERT-family encoder from safetensors plus its HuggingFace
//! tokenizer, runs texts through it one at a time, and mean-pools the last
//! hidden state. Normalization happens in the driver, not here.
//!
//! The model directory is expected to contain `model.safetensors`,
//! `tokenizer.json`, and `config.json` (the HuggingFace layout).

use super::EmbedBackend;
use crate::error::EmbedError;
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::info;

/// CPU-resident BERT-family embedder.
///
/// The model is instantiated once and reused for every text; candle's
/// graph is stateless across forward passes so this is safe from a single
/// owning thread.
pub struct LocalEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    max_tokens: usize,
}

impl LocalEmbedder {
    /// Loads model weights, config, and tokenizer from `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P, model_id: &str) -> Result<Self, EmbedError> {
        let dir = dir.as_ref();
        let weights = dir.join("model.safetensors");
        let config_path = dir.join("config.json");
        let tokenizer_path = dir.join("tokenizer.json");

        let config_bytes = std::fs::read(&config_path).map_err(|e| {
            EmbedError::ModelLoad(format!("read {}: {e}", config_path.display()))
        })?;
        let config: Config = serde_json::from_slice(&config_bytes)
            .map_err(|e| EmbedError::ModelLoad(format!("parse config.json: {e}")))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EmbedError::ModelLoad(format!("load {}: {e}", tokenizer_path.display()))
        })?;

        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights.clone()], DType::F32, &device)
        }
        .map_err(|e| EmbedError::ModelLoad(format!("load {}: {e}", weights.display())))?;

        let max_tokens = config.max_position_embeddings;
        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedError::ModelLoad(format!("build model: {e}")))?;

        info!(model = model_id, max_tokens, "loaded local embedding model");

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            max_tokens,
        })
    }

    /// Embeds a single text: tokenize, forward, mean-pool.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::TokenizationFailed(e.to_string()))?;

        let mut ids: Vec<u32> = encoding.get_ids().to_vec();
        ids.truncate(self.max_tokens);
        if ids.is_empty() {
            return Err(EmbedError::TokenizationFailed(
                "empty token sequence".to_string(),
            ));
        }
        let seq_len = ids.len();

        let token_ids = Tensor::new(ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))?;
        let token_type_ids = token_ids
            .zeros_like()
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))?;

        // [1, seq, hidden] -> mean over seq -> [hidden]
        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, None)
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))?;
        let pooled = (hidden.sum(1).and_then(|t| t / (seq_len as f64)))
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))?;

        pooled
            .squeeze(0)
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))
    }
}

#[async_trait]
impl EmbedBackend for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        // One text at a time: candle's CPU path gains little from batching
        // and the sequential loop keeps peak memory flat.
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text)?);
        }
        Ok(out)
    }
}
