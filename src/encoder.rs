//! The encoder capability the harness benchmarks.
//!
//! The harness only sees [`Encoder`]: an ordered batch of strings in, one
//! fixed-width row per string out. [`load_encoder`] resolves a model
//! identifier to a concrete implementation after the runtime is configured.

use crate::embeddings::Matrix;
use crate::error::{BenchError, Result};
use crate::runtime::RuntimeEnv;
use log::debug;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL: &str = "hashing-384";
const DEFAULT_HASHING_DIM: usize = 384;

pub trait Encoder {
    fn model_id(&self) -> &str;

    /// Width of every row returned by [`Encoder::encode`].
    fn dimension(&self) -> usize;

    /// Encode `batch` in order. `batch_size` is a hint for backends that
    /// sub-batch internally.
    fn encode(&self, batch: &[&str], batch_size: usize, normalize: bool) -> Result<Matrix>;
}

/// Feature-hashing bag-of-words encoder.
///
/// Each lowercased whitespace token is hashed to a bucket and a sign. Inputs
/// are truncated to `max_tokens` tokens, mirroring a transformer's maximum
/// sequence length. Deterministic across platforms.
pub struct HashingEncoder {
    model_id: String,
    dim: usize,
    max_tokens: usize,
    runtime: RuntimeEnv,
}

impl HashingEncoder {
    pub fn new(model_id: impl Into<String>, dim: usize, max_tokens: usize, runtime: RuntimeEnv) -> Self {
        Self {
            model_id: model_id.into(),
            dim,
            max_tokens,
            runtime,
        }
    }

    fn embed_one(&self, text: &str, normalize: bool) -> Vec<f32> {
        let mut row = vec![0.0f32; self.dim];
        for token in text.split_whitespace().take(self.max_tokens) {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            row[idx] += sign;
        }

        if normalize {
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|v| *v /= norm);
            }
        }
        row
    }
}

impl Encoder for HashingEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    /// The batch is split into `inter_op_threads` contiguous groups that run
    /// concurrently; rows within a group share the intra-op pool.
    fn encode(&self, batch: &[&str], _batch_size: usize, normalize: bool) -> Result<Matrix> {
        let groups = self.runtime.inter_op_threads.clamp(1, batch.len().max(1));
        let group_len = batch.len().div_ceil(groups).max(1);
        // collect preserves input order across both levels.
        let rows: Vec<Vec<f32>> = self.runtime.pool().install(|| {
            batch
                .par_chunks(group_len)
                .flat_map(|group| group.par_iter().map(move |text| self.embed_one(text, normalize)))
                .collect()
        });
        Matrix::from_rows(rows)
    }
}

/// Resolve `model_id` to the built-in hashing width without building anything.
pub fn resolve_model(model_id: &str) -> Result<usize> {
    let dim = match model_id {
        "hashing" => Some(DEFAULT_HASHING_DIM),
        _ => model_id
            .strip_prefix("hashing-")
            .and_then(|d| d.parse().ok())
            .filter(|&d| d > 0),
    };
    dim.ok_or_else(|| {
        BenchError::config(
            "model_identifier",
            format!("unsupported model '{model_id}' (expected hashing or hashing-<dim>)"),
        )
    })
}

/// Construct the encoder named by `model_id` on a configured runtime.
pub fn load_encoder(
    model_id: &str,
    max_sequence_length: usize,
    runtime: &RuntimeEnv,
) -> Result<Box<dyn Encoder>> {
    let dim = resolve_model(model_id)?;
    debug!(
        "loading {model_id}: dim {dim}, max tokens {max_sequence_length}, inter_op {}",
        runtime.inter_op_threads
    );
    Ok(Box::new(HashingEncoder::new(
        model_id,
        dim,
        max_sequence_length,
        runtime.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{configure, RuntimeConfig};
    use tempfile::tempdir;

    fn runtime() -> (tempfile::TempDir, RuntimeEnv) {
        let dir = tempdir().unwrap();
        let rt = configure(&RuntimeConfig {
            threads: 2,
            cache_dir: dir.path().join("cache"),
        })
        .unwrap();
        (dir, rt)
    }

    #[test]
    fn test_model_resolution() {
        let (_d, rt) = runtime();
        assert_eq!(load_encoder("hashing", 8, &rt).unwrap().dimension(), 384);
        assert_eq!(load_encoder("hashing-64", 8, &rt).unwrap().dimension(), 64);
        for bad in ["BAAI/bge-m3", "hashing-0", "hashing-x"] {
            assert!(matches!(
                load_encoder(bad, 8, &rt),
                Err(BenchError::Configuration { param: "model_identifier", .. })
            ));
        }
    }

    #[test]
    fn test_encode_shape_and_determinism() {
        let (_d, rt) = runtime();
        let enc = load_encoder("hashing-32", 512, &rt).unwrap();
        let batch = ["Lote de dados.", "Modelo vetor matriz.", ""];
        let a = enc.encode(&batch, 3, false).unwrap();
        let b = enc.encode(&batch, 3, false).unwrap();
        assert_eq!(a.rows(), 3);
        assert_eq!(a.cols(), 32);
        assert_eq!(a, b);
        assert!(a.row(2).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_resolve_model_without_runtime() {
        assert_eq!(resolve_model("hashing").unwrap(), 384);
        assert_eq!(resolve_model("hashing-12").unwrap(), 12);
        assert!(matches!(
            resolve_model("BAAI/bge-m3"),
            Err(BenchError::Configuration { param: "model_identifier", .. })
        ));
    }

    #[test]
    fn test_inter_op_grouping_keeps_rows_in_order() {
        let dir = tempdir().unwrap();
        let texts: Vec<String> = (0..7).map(|i| format!("doc {i} valor{i} sinal")).collect();
        let batch: Vec<&str> = texts.iter().map(String::as_str).collect();

        let mut outputs = Vec::new();
        for threads in [1, 4, 8] {
            let rt = configure(&RuntimeConfig {
                threads,
                cache_dir: dir.path().join("cache"),
            })
            .unwrap();
            let enc = HashingEncoder::new("hashing-16", 16, 512, rt);
            let m = enc.encode(&batch, 7, true).unwrap();
            for (i, text) in batch.iter().enumerate() {
                assert_eq!(m.row(i), enc.embed_one(text, true).as_slice());
            }
            outputs.push(m);
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);

        let (_d, rt) = runtime();
        let enc = HashingEncoder::new("hashing-16", 16, 512, rt);
        assert_eq!(enc.encode(&[], 4, false).unwrap().rows(), 0);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let (_d, rt) = runtime();
        let enc = HashingEncoder::new("hashing-16", 16, 512, rt);
        assert_eq!(enc.embed_one("Dados.", false), enc.embed_one("dados", false));
    }

    #[test]
    fn test_truncates_to_max_tokens() {
        let (_d, rt) = runtime();
        let enc = HashingEncoder::new("hashing-16", 16, 2, rt);
        assert_eq!(
            enc.embed_one("alfa beta gama delta", false),
            enc.embed_one("alfa beta", false)
        );
    }

    #[test]
    fn test_normalize_gives_unit_rows() {
        let (_d, rt) = runtime();
        let enc = HashingEncoder::new("hashing-16", 16, 512, rt);
        let row = enc.embed_one("sinal ruido sinal peso", true);
        let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
