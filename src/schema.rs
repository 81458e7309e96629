use crate::error::{BenchError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File name of the append-only run log inside a run directory.
pub const RUN_LOG: &str = "run.jsonl";
pub const EMBEDDINGS_FILE: &str = "embeddings.npy";
pub const ENV_FILE: &str = "env.json";

/// One benchmark execution. Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub timestamp: String,
    pub model_id: String,
    pub runtime_version: String,
    pub corpus_sha256: String,
    pub embeddings_sha256: String,
    pub batch: usize,
    pub threads: usize,
    pub n_docs_total: usize,
    pub total_seconds_measured: f64,
    pub docs_per_sec: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub rss_peak_mb: f64,
}

/// Host description written next to the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub timestamp: String,
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub cpu_count: usize,
    pub bench_version: String,
    pub git_sha: Option<String>,
}

/// Append `record` as one line; earlier lines are never touched.
pub fn append_record(path: &Path, record: &RunRecord) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BenchError::io(format!("opening {}", path.display()), e))?;
    file.write_all(&line)
        .map_err(|e| BenchError::io(format!("appending to {}", path.display()), e))?;

    info!("appended run {} to {}", record.run_id, path.display());
    Ok(())
}

pub fn write_env_snapshot(path: &Path, env: &EnvSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(env)?;
    fs::write(path, json).map_err(|e| BenchError::io(format!("writing {}", path.display()), e))
}

/// Every record in a run log, in file order. Blank lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<RunRecord>> {
    let file =
        File::open(path).map_err(|e| BenchError::io(format!("opening {}", path.display()), e))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| BenchError::io(format!("reading {}", path.display()), e))?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

/// The last record of a run log, if any.
pub fn read_last_record(path: &Path) -> Result<Option<RunRecord>> {
    Ok(read_records(path)?.pop())
}

/// Locate `<root>/*/run.jsonl` with the newest modification time and return
/// its path with its last record.
pub fn latest_run(root: &Path) -> Result<Option<(PathBuf, RunRecord)>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in walkdir::WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(false)
    {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            BenchError::io(
                format!("scanning {}", root.display()),
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other(msg)),
            )
        })?;
        if !entry.file_type().is_file() || entry.file_name() != RUN_LOG {
            continue;
        }
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
            newest = Some((modified, entry.into_path()));
        }
    }

    match newest {
        Some((_, path)) => Ok(read_last_record(&path)?.map(|r| (path, r))),
        None => Ok(None),
    }
}
