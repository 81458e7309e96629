//! Invoke an external pipeline script and pick up the run it produced.

use crate::error::{BenchError, Result};
use crate::schema::{latest_run, RunRecord};
use log::info;
use std::path::PathBuf;
use std::process::Command;

/// Parameters forwarded to the pipeline script.
#[derive(Clone, Debug)]
pub struct PipelineRequest {
    /// Interpreter followed by its leading arguments, e.g. `["bash", "scripts/run_all.sh"]`.
    pub command: Vec<String>,
    pub n_per_size: usize,
    pub batches: usize,
    pub threads: usize,
    pub warmup_docs: usize,
    /// Extra trailing flags, e.g. `--skip-sync`.
    pub extra_args: Vec<String>,
    /// Where the script writes `<run_id>/run.jsonl`.
    pub results_root: PathBuf,
}

impl PipelineRequest {
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.command.iter().skip(1).cloned().collect();
        for (flag, value) in [
            ("--n-per-size", self.n_per_size),
            ("--batches", self.batches),
            ("--threads", self.threads),
            ("--warmup-docs", self.warmup_docs),
        ] {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Run the pipeline to completion, then return the newest run record under
/// `results_root`. A non-zero exit yields `ExternalProcess` with the captured
/// stderr; no partial record is ever returned.
pub fn run_pipeline(request: &PipelineRequest) -> Result<RunRecord> {
    let program = request
        .command
        .first()
        .ok_or_else(|| BenchError::config("command", "pipeline command is empty"))?;
    let args = request.args();
    let rendered = std::iter::once(program.as_str())
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    info!("running pipeline: {rendered}");

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| BenchError::io(format!("spawning `{rendered}`"), e))?;

    if !output.status.success() {
        return Err(BenchError::ExternalProcess {
            command: rendered,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    match latest_run(&request.results_root)? {
        Some((path, record)) => {
            info!("pipeline produced {}", path.display());
            Ok(record)
        }
        None => Err(BenchError::ExternalProcess {
            command: rendered,
            status: output.status.to_string(),
            stderr: format!(
                "no run.jsonl found under {}",
                request.results_root.display()
            ),
        }),
    }
}
