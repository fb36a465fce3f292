//! Local ONNX Runtime embedding provider.
//!
//! Runs all-MiniLM-L6-v2 via `ort`: tokenization, inference, mean pooling and
//! L2 normalization. Inference is synchronous and runs on the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;

/// Output dimension of all-MiniLM-L6-v2.
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

pub const LOCAL_MODEL_NAME: &str = "all-MiniLM-L6-v2";

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is only reached through the Mutex.
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

/// Local ONNX-based embedding provider.
pub struct LocalEmbeddingProvider {
    model: Arc<OnnxModel>,
}

fn inference_err(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::Inference(e.to_string())
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelNotFound(format!(
                "{} (run `rapport model download` first)",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(EmbeddingError::ModelNotFound(format!(
                "{} (run `rapport model download` first)",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(inference_err)?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(inference_err)?
            .with_intra_threads(4)
            .map_err(inference_err)?
            .commit_from_file(&model_path)
            .map_err(inference_err)?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(inference_err)?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(inference_err)?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
            }),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed_one(&text))
            .await
            .map_err(inference_err)?
    }

    fn model_name(&self) -> &str {
        LOCAL_MODEL_NAME
    }
}

impl OnnxModel {
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoding = self.tokenizer.encode(text, true).map_err(inference_err)?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let seq_len = input_ids.len();
        let shape = vec![1i64, seq_len as i64];

        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids.into_boxed_slice())).map_err(inference_err)?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))
                .map_err(inference_err)?;
        // single segment: token_type_ids are all zero
        let token_type_ids_tensor =
            Tensor::from_array((shape, vec![0i64; seq_len].into_boxed_slice())).map_err(inference_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbeddingError::Inference(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            })
            .map_err(inference_err)?;

        // Output name varies by export
        let token_embeddings = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (shape, data) = token_embeddings
            .try_extract_tensor::<f32>()
            .map_err(inference_err)?;

        let dims: &[i64] = &shape;
        if dims.len() != 3 || dims[2] != LOCAL_EMBEDDING_DIM as i64 {
            return Err(EmbeddingError::Inference(format!(
                "unexpected token_embeddings shape: {dims:?}, expected [1, seq, {LOCAL_EMBEDDING_DIM}]"
            )));
        }
        let hidden_dim = dims[2] as usize;
        let actual_seq_len = dims[1] as usize;

        Ok(l2_normalize(&mean_pool(
            data,
            &attention_mask,
            actual_seq_len,
            hidden_dim,
        )))
    }
}

/// Average token embeddings where the attention mask is set.
fn mean_pool(data: &[f32], mask: &[i64], seq_len: usize, hidden_dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;

    for (s, &m) in mask.iter().take(seq_len).enumerate() {
        if m > 0 {
            let offset = s * hidden_dim;
            for (d, acc) in sum.iter_mut().enumerate() {
                *acc += data[offset + d];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    sum
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
