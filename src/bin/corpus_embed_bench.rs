use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use corpus_embed_bench::corpus::{self, GenerateConfig, Language};
use corpus_embed_bench::harness::BenchmarkConfig;
use corpus_embed_bench::pipeline::{self, PipelineRequest};
use corpus_embed_bench::provenance::verify_run;
use corpus_embed_bench::runtime::DEFAULT_CACHE_DIR;
use corpus_embed_bench::schema::{self, RunRecord, EMBEDDINGS_FILE, RUN_LOG};
use corpus_embed_bench::{encoder, run_benchmark};
use std::fs;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a deterministic PT-BR corpus (one JSON record per line).
    GenerateCorpus {
        /// Output JSONL path. Parent directories are created; an existing file is replaced.
        #[arg(long, short = 'o', default_value = "data/corpus.jsonl")]
        out: PathBuf,

        /// Random seed for deterministic generation.
        #[arg(long, default_value_t = 13)]
        seed: u64,

        /// Comma-separated target sizes in characters.
        #[arg(long, default_value = "256,512,1024,2048,4096,8192")]
        sizes: String,

        /// Documents per target size.
        #[arg(long, default_value_t = 24)]
        n_per_size: usize,

        /// Vocabulary language (only pt-br).
        #[arg(long, default_value = "pt-br")]
        language: String,

        /// Minimum words per document, checked in addition to the size target.
        #[arg(long)]
        min_words: Option<usize>,
    },

    /// Benchmark an encoder over a corpus and append the result to run.jsonl.
    Run {
        #[arg(long, default_value = "data/corpus.jsonl")]
        corpus: PathBuf,

        /// Output directory. Defaults to <results-root>/<run_id>.
        #[arg(long)]
        outdir: Option<PathBuf>,

        #[arg(long, default_value = "results")]
        results_root: PathBuf,

        /// Private model-artifact cache.
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        #[arg(long, default_value_t = 16)]
        batch: usize,

        /// Maximum tokens per document seen by the encoder.
        #[arg(long, default_value_t = 512)]
        max_length: usize,

        /// Encoder threads. Defaults to the number of logical CPUs.
        #[arg(long, env = "EMBED_BENCH_THREADS")]
        threads: Option<usize>,

        #[arg(long, default_value = encoder::DEFAULT_MODEL)]
        model: String,

        /// Documents encoded before timing starts.
        #[arg(long, default_value_t = 32)]
        warmup_docs: usize,
    },

    /// Print the most recent run record under a results root.
    Latest {
        #[arg(long, default_value = "results")]
        results_root: PathBuf,
    },

    /// Recompute corpus and embeddings hashes of a run and compare with its record.
    Verify {
        /// Run directory containing run.jsonl and embeddings.npy.
        #[arg(value_name = "DIR")]
        run_dir: PathBuf,

        #[arg(long, default_value = "data/corpus.jsonl")]
        corpus: PathBuf,
    },

    /// Run an external pipeline script, then print the run record it produced.
    Pipeline {
        #[arg(long, default_value = "./scripts/run_all.sh")]
        script: PathBuf,

        #[arg(long, default_value_t = 5)]
        n_per_size: usize,

        #[arg(long, default_value_t = 16)]
        batches: usize,

        #[arg(long, default_value_t = 4)]
        threads: usize,

        #[arg(long, default_value_t = 5)]
        warmup_docs: usize,

        #[arg(long, default_value = "results")]
        results_root: PathBuf,

        /// Extra flags passed through to the script, after `--`.
        #[arg(last = true)]
        extra: Vec<String>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "corpus-embed-bench")]
#[command(about = "Deterministic corpus generation and embedding throughput benchmarks (JSON output)")]
struct Args {
    /// Where to write the JSON record. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out_json: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn emit(record: &RunRecord, out: Option<&PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    if let Some(out) = out {
        fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.cmd {
        Command::GenerateCorpus {
            out,
            seed,
            sizes,
            n_per_size,
            language,
            min_words,
        } => {
            let config = GenerateConfig {
                seed,
                sizes: corpus::parse_sizes(&sizes)?,
                n_per_size,
                language: Language::parse(&language)?,
                min_words,
            };
            let start = std::time::Instant::now();
            let written = corpus::write_corpus(&out, &config)?;
            eprintln!(
                "Wrote {} docs to {} in {:.2}s",
                written,
                out.display(),
                start.elapsed().as_secs_f64()
            );
            // No JSON record for corpus generation.
            Ok(())
        }
        Command::Run {
            corpus,
            outdir,
            results_root,
            cache_dir,
            batch,
            max_length,
            threads,
            model,
            warmup_docs,
        } => {
            let defaults = BenchmarkConfig::default();
            let config = BenchmarkConfig {
                corpus_path: corpus,
                output_dir: outdir,
                results_root,
                cache_dir,
                batch_size: batch,
                max_sequence_length: max_length,
                thread_count: threads.unwrap_or(defaults.thread_count),
                model_identifier: model,
                warmup_docs,
            };
            let outcome = run_benchmark(&config).context("benchmark failed")?;
            eprintln!("Run directory: {}", outcome.output_dir.display());
            emit(&outcome.record, args.out_json.as_ref())
        }
        Command::Latest { results_root } => match schema::latest_run(&results_root)? {
            Some((path, record)) => {
                eprintln!("Latest run log: {}", path.display());
                emit(&record, args.out_json.as_ref())
            }
            None => bail!("no {RUN_LOG} found under {}", results_root.display()),
        },
        Command::Verify { run_dir, corpus } => {
            let log = run_dir.join(RUN_LOG);
            let record = schema::read_last_record(&log)?
                .with_context(|| format!("{} has no records", log.display()))?;
            let report = verify_run(&record, &corpus, &run_dir.join(EMBEDDINGS_FILE))?;

            eprintln!("Run: {}", record.run_id);
            eprintln!(
                "  corpus:     {} ({})",
                if report.corpus_ok { "ok" } else { "MISMATCH" },
                report.corpus_sha256
            );
            eprintln!(
                "  embeddings: {} ({})",
                if report.embeddings_ok { "ok" } else { "MISMATCH" },
                report.embeddings_sha256
            );
            if !report.ok() {
                bail!("integrity check failed for {}", run_dir.display());
            }
            Ok(())
        }
        Command::Pipeline {
            script,
            n_per_size,
            batches,
            threads,
            warmup_docs,
            results_root,
            extra,
        } => {
            let request = PipelineRequest {
                command: vec!["bash".to_string(), script.display().to_string()],
                n_per_size,
                batches,
                threads,
                warmup_docs,
                extra_args: extra,
                results_root,
            };
            let record = pipeline::run_pipeline(&request)?;
            emit(&record, args.out_json.as_ref())
        }
    }
}
