//! Local BERT-family embeddings using Candle

use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::info;

/// How token states collapse into one vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    Mean,
    Cls,
}

impl Pooling {
    /// CLS pooling for the AnglE/BGE families, mean pooling otherwise
    pub fn for_model(model_name: &str) -> Self {
        let lower = model_name.to_lowercase();
        if lower.contains("uae-") || lower.contains("bge-") {
            Pooling::Cls
        } else {
            Pooling::Mean
        }
    }
}

/// Local embedding backend using Candle
pub struct CandleEmbedding {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
    pooling: Pooling,
}

impl CandleEmbedding {
    /// Load a model from a local directory or the HF hub at a pinned revision
    pub fn new(
        model_name: String,
        revision: Option<String>,
        model_path: Option<String>,
    ) -> anyhow::Result<Self> {
        info!("Loading local embedding model: {}", model_name);

        let device = Device::Cpu;

        let (config_path, tokenizer_path, weights_path) = if let Some(path) = model_path {
            let base = PathBuf::from(path);
            (
                base.join("config.json"),
                base.join("tokenizer.json"),
                base.join("model.safetensors"),
            )
        } else {
            let api = Api::new()?;
            let repo = match revision {
                Some(rev) => Repo::with_revision(model_name.clone(), RepoType::Model, rev),
                None => Repo::new(model_name.clone(), RepoType::Model),
            };
            let repo = api.repo(repo);

            let config = repo.get("config.json")?;
            let tokenizer = repo.get("tokenizer.json")?;
            let weights = repo
                .get("model.safetensors")
                .or_else(|_| repo.get("pytorch_model.bin"))?;

            (config, tokenizer, weights)
        };

        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dimensions = config.hidden_size;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        let vb = if weights_path.extension().map(|e| e == "safetensors").unwrap_or(false) {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)? }
        } else {
            VarBuilder::from_pth(weights_path, DTYPE, &device)?
        };

        let model = BertModel::load(vb, &config)?;
        let pooling = Pooling::for_model(&model_name);

        info!("Loaded model: {} dims, pooling: {:?}", dimensions, pooling);

        Ok(Self {
            model,
            tokenizer,
            device,
            dimensions,
            pooling,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Compute embeddings
    pub fn embed(&self, texts: &[String], batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            all_embeddings.extend(self.embed_batch(batch)?);
        }
        Ok(all_embeddings)
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let flatten = |f: fn(&tokenizers::Encoding) -> &[u32]| -> Vec<u32> {
            encodings.iter().flat_map(|e| f(e).iter().copied()).collect()
        };

        let input_ids = Tensor::from_vec(flatten(|e| e.get_ids()), (batch_size, seq_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(flatten(|e| e.get_attention_mask()), (batch_size, seq_len), &self.device)?;
        let token_type_ids =
            Tensor::from_vec(flatten(|e| e.get_type_ids()), (batch_size, seq_len), &self.device)?;

        let output = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = match self.pooling {
            Pooling::Cls => output.narrow(1, 0, 1)?.squeeze(1)?,
            Pooling::Mean => mean_pooling(&output, &attention_mask)?,
        };

        Ok(pooled.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }
}

/// Mean over non-padding positions
fn mean_pooling(output: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
    let mask = attention_mask
        .to_dtype(output.dtype())?
        .unsqueeze(2)?
        .broadcast_as(output.shape())?;

    let sum = output.mul(&mask)?.sum(1)?;
    let count = attention_mask
        .to_dtype(output.dtype())?
        .sum(1)?
        .unsqueeze(1)?
        .broadcast_as(sum.shape())?;

    Ok(sum.div(&count.clamp(1e-9, f64::INFINITY)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pooling_choice() {
        assert_eq!(Pooling::for_model("WhereIsAI/UAE-Large-V1"), Pooling::Cls);
        assert_eq!(Pooling::for_model("BAAI/bge-small-en-v1.5"), Pooling::Cls);
        assert_eq!(Pooling::for_model("intfloat/multilingual-e5-small"), Pooling::Mean);
    }
}
