use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;

use log::{debug, warn};

use crate::embeddings::Matrix;
use crate::encoder::{Encoder, DEFAULT_MODEL};
use crate::error::{BenchError, Result};
use crate::runtime::DEFAULT_CACHE_DIR;

/// Parameters of one benchmark run.
#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub corpus_path: PathBuf,
    /// Explicit output directory; `None` means `<results_root>/<run_id>`.
    pub output_dir: Option<PathBuf>,
    pub results_root: PathBuf,
    pub cache_dir: PathBuf,
    pub batch_size: usize,
    pub max_sequence_length: usize,
    pub thread_count: usize,
    pub model_identifier: String,
    pub warmup_docs: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data/corpus.jsonl"),
            output_dir: None,
            results_root: PathBuf::from("results"),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            batch_size: 16,
            max_sequence_length: 512,
            thread_count: num_cpus::get().max(1),
            model_identifier: DEFAULT_MODEL.to_string(),
            warmup_docs: 32,
        }
    }
}

impl BenchmarkConfig {
    /// Reject out-of-range parameters. Pure; touches nothing.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BenchError::config("batch_size", "must be > 0, got 0"));
        }
        if self.max_sequence_length == 0 {
            return Err(BenchError::config("max_sequence_length", "must be > 0, got 0"));
        }
        if self.thread_count == 0 {
            return Err(BenchError::config("thread_count", "must be > 0, got 0"));
        }
        if self.model_identifier.trim().is_empty() {
            return Err(BenchError::config("model_identifier", "must not be empty"));
        }
        // warmup_docs >= 0 holds by type.
        Ok(())
    }
}

/// Warm-up count actually used for a corpus of `n_docs` documents.
///
/// Clamped to `n_docs`, then lowered to `n_docs - 1` when it would leave
/// nothing to measure. The returned flag reports that second adjustment.
pub fn effective_warmup(configured: usize, n_docs: usize) -> (usize, bool) {
    let warmup = configured.min(n_docs);
    if n_docs > 0 && warmup >= n_docs {
        (n_docs - 1, true)
    } else {
        (warmup, false)
    }
}

/// [`effective_warmup`] with the adjustment logged.
pub fn plan_warmup(configured: usize, n_docs: usize) -> usize {
    let (warmup, adjusted) = effective_warmup(configured, n_docs);
    if adjusted {
        warn!(
            "warm-up adjusted from {configured} to {warmup} docs so that at least one of {n_docs} docs is measured"
        );
    }
    warmup
}

/// Contiguous order-preserving chunks of `batch_size`; the last may be short.
pub fn batch_ranges(len: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let step = batch_size.max(1);
    (0..len)
        .step_by(step)
        .map(move |start| start..(start + step).min(len))
}

fn encode_checked<E: Encoder + ?Sized>(
    encoder: &E,
    batch: &[&str],
    batch_size: usize,
    phase: &'static str,
) -> Result<Matrix> {
    let out = encoder
        .encode(batch, batch_size, false)
        .map_err(|e| match e {
            BenchError::Encoding { message, .. } => BenchError::Encoding { phase, message },
            other => BenchError::Encoding {
                phase,
                message: other.to_string(),
            },
        })?;
    if out.rows() != batch.len() {
        return Err(BenchError::Encoding {
            phase,
            message: format!("encoder returned {} rows for {} inputs", out.rows(), batch.len()),
        });
    }
    Ok(out)
}

/// Encode `texts` batch by batch without timing; rows come back in order.
pub fn encode_untimed<E: Encoder + ?Sized>(
    encoder: &E,
    texts: &[&str],
    batch_size: usize,
    phase: &'static str,
) -> Result<Matrix> {
    let mut out = Matrix::empty();
    for range in batch_ranges(texts.len(), batch_size) {
        let part = encode_checked(encoder, &texts[range], batch_size, phase)?;
        out.vstack(&part)?;
    }
    Ok(out)
}

/// Timings and outputs of the measured phase.
#[derive(Clone, Debug, Default)]
pub struct Measured {
    pub embeddings: Matrix,
    /// Wall-clock seconds of each batch, in order.
    pub batch_seconds: Vec<f64>,
    /// One sample per measured document: its batch duration / batch length.
    pub per_doc_seconds: Vec<f64>,
    /// Single wall-clock span across the whole phase.
    pub total_seconds: f64,
}

impl Measured {
    pub fn docs(&self) -> usize {
        self.per_doc_seconds.len()
    }
}

/// Time each batch of `texts` through the encoder.
///
/// Per-document latency is not observable, so every document of a batch is
/// assigned an equal share of that batch's duration.
pub fn measure_batches<E: Encoder + ?Sized>(
    encoder: &E,
    texts: &[&str],
    batch_size: usize,
) -> Result<Measured> {
    let mut measured = Measured {
        per_doc_seconds: Vec::with_capacity(texts.len()),
        ..Default::default()
    };

    let total_start = Instant::now();
    for range in batch_ranges(texts.len(), batch_size) {
        let batch = &texts[range];
        let start = Instant::now();
        let out = encode_checked(encoder, batch, batch_size, "measurement")?;
        let duration = start.elapsed().as_secs_f64();

        measured.embeddings.vstack(&out)?;
        measured.batch_seconds.push(duration);
        let share = duration / batch.len() as f64;
        measured
            .per_doc_seconds
            .extend(std::iter::repeat(share).take(batch.len()));
    }
    measured.total_seconds = total_start.elapsed().as_secs_f64();

    debug!(
        "measured {} docs in {} batches, {:.6}s",
        measured.docs(),
        measured.batch_seconds.len(),
        measured.total_seconds
    );
    Ok(measured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    /// Records every batch it sees; optionally sleeps per input.
    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<Vec<String>>>,
        sleep_per_doc: Option<Duration>,
        fail_after: Option<usize>,
    }

    impl Encoder for Recorder {
        fn model_id(&self) -> &str {
            "recorder"
        }

        fn dimension(&self) -> usize {
            2
        }

        fn encode(&self, batch: &[&str], _batch_size: usize, _normalize: bool) -> Result<Matrix> {
            let mut seen = self.seen.borrow_mut();
            if self.fail_after.is_some_and(|n| seen.len() >= n) {
                return Err(BenchError::Encoding {
                    phase: "backend",
                    message: "out of memory".to_string(),
                });
            }
            seen.push(batch.iter().map(|s| s.to_string()).collect());
            if let Some(d) = self.sleep_per_doc {
                std::thread::sleep(d * batch.len() as u32);
            }
            Matrix::from_rows(batch.iter().map(|s| vec![s.len() as f32, 1.0]).collect())
        }
    }

    fn docs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("doc-{i}")).collect()
    }

    #[test]
    fn test_validate_names_parameter() {
        let ok = BenchmarkConfig::default();
        assert!(ok.validate().is_ok());

        let cases: [(&str, BenchmarkConfig); 3] = [
            ("batch_size", BenchmarkConfig { batch_size: 0, ..ok.clone() }),
            ("max_sequence_length", BenchmarkConfig { max_sequence_length: 0, ..ok.clone() }),
            ("thread_count", BenchmarkConfig { thread_count: 0, ..ok.clone() }),
        ];
        for (name, cfg) in cases {
            match cfg.validate() {
                Err(BenchError::Configuration { param, .. }) => assert_eq!(param, name),
                other => panic!("expected {name} error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_effective_warmup() {
        assert_eq!(effective_warmup(10, 5), (4, true));
        assert_eq!(effective_warmup(5, 5), (4, true));
        assert_eq!(effective_warmup(3, 5), (3, false));
        assert_eq!(effective_warmup(0, 5), (0, false));
        assert_eq!(effective_warmup(1, 1), (0, true));
        assert_eq!(effective_warmup(4, 0), (0, false));
    }

    #[test]
    fn test_at_least_one_measured() {
        for n in 1..40 {
            for w in 0..50 {
                let (warmup, _) = effective_warmup(w, n);
                assert!(n - warmup >= 1);
                if w == 0 {
                    assert_eq!(n - warmup, n);
                }
            }
        }
    }

    #[test]
    fn test_batch_ranges() {
        let sizes: Vec<usize> = batch_ranges(7, 3).map(|r| r.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(batch_ranges(0, 4).count(), 0);
        assert_eq!(batch_ranges(8, 4).map(|r| r.len()).collect::<Vec<_>>(), vec![4, 4]);
    }

    #[test]
    fn test_batches_reproduce_sequence() {
        let texts = docs(11);
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let enc = Recorder::default();
        let (warmup, _) = effective_warmup(4, refs.len());

        encode_untimed(&enc, &refs[..warmup], 3, "warm-up").unwrap();
        measure_batches(&enc, &refs[warmup..], 3).unwrap();

        let flat: Vec<String> = enc.seen.borrow().iter().flatten().cloned().collect();
        assert_eq!(flat, texts);
        assert!(enc.seen.borrow().iter().all(|b| b.len() <= 3));
    }

    #[test]
    fn test_per_doc_time_uses_actual_batch_len() {
        let texts = docs(7);
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let enc = Recorder {
            sleep_per_doc: Some(Duration::from_millis(2)),
            ..Default::default()
        };
        let m = measure_batches(&enc, &refs, 3).unwrap();

        assert_eq!(m.batch_seconds.len(), 3);
        assert_eq!(m.docs(), 7);
        assert_eq!(m.embeddings.rows(), 7);
        for i in 0..3 {
            assert_eq!(m.per_doc_seconds[i], m.batch_seconds[0] / 3.0);
            assert_eq!(m.per_doc_seconds[3 + i], m.batch_seconds[1] / 3.0);
        }
        assert_eq!(m.per_doc_seconds[6], m.batch_seconds[2]);

        let batch_sum: f64 = m.batch_seconds.iter().sum();
        assert!(m.total_seconds >= batch_sum);
    }

    #[test]
    fn test_encoder_failure_propagates_with_phase() {
        let texts = docs(6);
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let enc = Recorder {
            fail_after: Some(1),
            ..Default::default()
        };
        match measure_batches(&enc, &refs, 2) {
            Err(BenchError::Encoding { phase, message }) => {
                assert_eq!(phase, "measurement");
                assert_eq!(message, "out of memory");
            }
            other => panic!("expected encoding failure, got {other:?}"),
        }
    }

    #[test]
    fn test_row_count_mismatch_is_encoding_failure() {
        struct Short;
        impl Encoder for Short {
            fn model_id(&self) -> &str {
                "short"
            }
            fn dimension(&self) -> usize {
                1
            }
            fn encode(&self, _: &[&str], _: usize, _: bool) -> Result<Matrix> {
                Matrix::from_rows(vec![vec![0.0]])
            }
        }
        let err = encode_untimed(&Short, &["a", "b"], 2, "warm-up").unwrap_err();
        assert!(matches!(err, BenchError::Encoding { phase: "warm-up", .. }));
    }
}
