//! End-to-end benchmark run: load, configure, warm up, measure, record.

use crate::corpus::load_corpus;
use crate::embeddings::to_npy_bytes;
use crate::encoder::{load_encoder, resolve_model, Encoder};
use crate::error::{BenchError, Result};
use crate::harness::{encode_untimed, measure_batches, plan_warmup, BenchmarkConfig};
use crate::provenance::{
    current_run_id, git_revision, hostname, iso_timestamp, sha256_file, sha256_hex,
};
use crate::runtime::{configure, RuntimeConfig, RuntimeEnv};
use crate::schema::{
    append_record, write_env_snapshot, EnvSnapshot, RunRecord, EMBEDDINGS_FILE, ENV_FILE, RUN_LOG,
};
use crate::stats::{docs_per_sec, percentile, round_to, rss_peak_mb};
use chrono::Utc;
use log::{debug, info};
use std::fs;
use std::path::PathBuf;

pub fn runtime_version() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// A finished run and where its artifacts live.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub output_dir: PathBuf,
}

/// Run with the encoder named by `config.model_identifier`.
///
/// An unknown identifier is rejected before the runtime or output directory
/// is touched.
pub fn run_benchmark(config: &BenchmarkConfig) -> Result<RunOutcome> {
    resolve_model(&config.model_identifier)?;
    run_benchmark_with(config, |cfg, runtime| {
        load_encoder(&cfg.model_identifier, cfg.max_sequence_length, runtime)
    })
}

/// Run with an encoder produced by `make_encoder`, which is called only after
/// the runtime has been configured.
///
/// Fails before touching the filesystem on invalid parameters, and before any
/// encoder exists on a missing or empty corpus. Once the output directory is
/// created it is left in place even if a later phase fails.
pub fn run_benchmark_with<F>(config: &BenchmarkConfig, make_encoder: F) -> Result<RunOutcome>
where
    F: FnOnce(&BenchmarkConfig, &RuntimeEnv) -> Result<Box<dyn Encoder>>,
{
    config.validate()?;

    let records = load_corpus(&config.corpus_path)?;
    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    let n_docs = texts.len();
    let warmup = plan_warmup(config.warmup_docs, n_docs);

    let runtime = configure(&RuntimeConfig {
        threads: config.thread_count,
        cache_dir: config.cache_dir.clone(),
    })?;

    let run_id = current_run_id();
    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| config.results_root.join(&run_id));
    fs::create_dir_all(&output_dir)
        .map_err(|e| BenchError::io(format!("creating {}", output_dir.display()), e))?;
    write_env_snapshot(
        &output_dir.join(ENV_FILE),
        &EnvSnapshot {
            timestamp: iso_timestamp(Utc::now()),
            hostname: hostname(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: num_cpus::get(),
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: git_revision(),
        },
    )?;
    info!(
        "run {run_id}: {n_docs} docs, warm-up {warmup}, batch {}, threads {}, output {}",
        config.batch_size,
        config.thread_count,
        output_dir.display()
    );

    let encoder = make_encoder(config, &runtime)?;
    let encoder: &dyn Encoder = &*encoder;
    debug!("encoder {} ready (dim {})", encoder.model_id(), encoder.dimension());

    if warmup > 0 {
        encode_untimed(encoder, &texts[..warmup], config.batch_size, "warm-up")?;
        debug!("warm-up done");
    }

    let measured = measure_batches(encoder, &texts[warmup..], config.batch_size)?;

    // Persisted rows cover the warm-up docs too, in corpus order.
    let embeddings = if warmup > 0 {
        let mut all = encode_untimed(
            encoder,
            &texts[..warmup],
            config.batch_size,
            "embedding export",
        )?;
        all.vstack(&measured.embeddings)?;
        all
    } else {
        measured.embeddings.clone()
    };

    let npy = to_npy_bytes(&embeddings);
    let embeddings_path = output_dir.join(EMBEDDINGS_FILE);
    fs::write(&embeddings_path, &npy)
        .map_err(|e| BenchError::io(format!("writing {}", embeddings_path.display()), e))?;
    let embeddings_sha256 = sha256_hex(&npy);
    let corpus_sha256 = sha256_file(&config.corpus_path)?;

    let p50_ms = percentile(&measured.per_doc_seconds, 50.0) * 1000.0;
    let p95_ms = percentile(&measured.per_doc_seconds, 95.0) * 1000.0;
    let rate = docs_per_sec(measured.docs(), measured.total_seconds);

    let record = RunRecord {
        run_id,
        timestamp: iso_timestamp(Utc::now()),
        model_id: config.model_identifier.clone(),
        runtime_version: runtime_version(),
        corpus_sha256,
        embeddings_sha256,
        batch: config.batch_size,
        threads: config.thread_count,
        n_docs_total: n_docs,
        total_seconds_measured: round_to(measured.total_seconds, 6),
        docs_per_sec: round_to(rate, 6),
        p50_ms: round_to(p50_ms, 3),
        p95_ms: round_to(p95_ms, 3),
        rss_peak_mb: round_to(rss_peak_mb(), 3),
    };
    append_record(&output_dir.join(RUN_LOG), &record)?;

    Ok(RunOutcome { record, output_dir })
}
