//! Thread and cache configuration applied before an encoder is built.
//!
//! Numeric backends read their thread settings once, at initialization, so
//! [`configure`] must run before [`crate::encoder::load_encoder`]. The result is
//! an explicit [`RuntimeEnv`] that the encoder receives instead of consulting
//! process globals.

use crate::error::{BenchError, Result};
use log::debug;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variables read by BLAS-style backends at startup.
pub const THREAD_ENV_VARS: &[&str] = &[
    "OMP_NUM_THREADS",
    "MKL_NUM_THREADS",
    "OPENBLAS_NUM_THREADS",
    "NUMEXPR_NUM_THREADS",
];

/// Default location of the private model-artifact cache.
pub const DEFAULT_CACHE_DIR: &str = ".model-cache";

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub threads: usize,
    pub cache_dir: PathBuf,
}

impl RuntimeConfig {
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

/// Inter-op parallelism: half the configured threads, never below one.
pub fn inter_op_threads(threads: usize) -> usize {
    (threads / 2).max(1)
}

/// Configured runtime handed to the encoder constructor.
#[derive(Clone, Debug)]
pub struct RuntimeEnv {
    pub intra_op_threads: usize,
    pub inter_op_threads: usize,
    pub cache_dir: PathBuf,
    pool: Arc<rayon::ThreadPool>,
}

impl RuntimeEnv {
    /// Pool sized to `intra_op_threads`; all encoder work runs inside it.
    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }
}

fn set_default_var(key: &str, value: &Path) {
    if env::var_os(key).is_none() {
        env::set_var(key, value);
    }
}

/// Pin backend thread counts and create the process-local cache directory.
///
/// Environment variables are set for this process and never restored.
pub fn configure(config: &RuntimeConfig) -> Result<RuntimeEnv> {
    if config.threads == 0 {
        return Err(BenchError::config("thread_count", "must be > 0, got 0"));
    }

    let threads = config.threads.to_string();
    for key in THREAD_ENV_VARS {
        env::set_var(key, &threads);
    }

    fs::create_dir_all(&config.cache_dir).map_err(|e| {
        BenchError::io(format!("creating cache dir {}", config.cache_dir.display()), e)
    })?;
    let cache_dir = fs::canonicalize(&config.cache_dir).map_err(|e| {
        BenchError::io(format!("resolving {}", config.cache_dir.display()), e)
    })?;
    set_default_var("HF_HOME", &cache_dir);
    set_default_var("HF_HUB_CACHE", &cache_dir.join("hub"));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .thread_name(|i| format!("encoder-{i}"))
        .build()
        .map_err(|e| BenchError::config("thread_count", e.to_string()))?;

    let runtime = RuntimeEnv {
        intra_op_threads: config.threads,
        inter_op_threads: inter_op_threads(config.threads),
        cache_dir,
        pool: Arc::new(pool),
    };
    debug!(
        "runtime configured: intra_op={} inter_op={} cache={}",
        runtime.intra_op_threads,
        runtime.inter_op_threads,
        runtime.cache_dir.display()
    );
    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn inter_op_is_half_rounded_down_at_least_one() {
        assert_eq!(inter_op_threads(1), 1);
        assert_eq!(inter_op_threads(2), 1);
        assert_eq!(inter_op_threads(3), 1);
        assert_eq!(inter_op_threads(8), 4);
        assert_eq!(inter_op_threads(9), 4);
    }

    #[test]
    fn configure_pins_threads_and_creates_cache() {
        let dir = tempdir().unwrap();
        let cfg = RuntimeConfig {
            threads: 3,
            cache_dir: dir.path().join("cache/models"),
        };
        let rt = configure(&cfg).unwrap();

        assert_eq!(rt.intra_op_threads, 3);
        assert_eq!(rt.inter_op_threads, 1);
        assert_eq!(rt.pool().current_num_threads(), 3);
        assert!(rt.cache_dir.is_absolute());
        assert!(rt.cache_dir.is_dir());
        for key in THREAD_ENV_VARS {
            assert!(env::var(key).is_ok());
        }
    }

    #[test]
    fn zero_threads_rejected() {
        let dir = tempdir().unwrap();
        let cfg = RuntimeConfig {
            threads: 0,
            cache_dir: dir.path().join("never"),
        };
        assert!(matches!(
            configure(&cfg),
            Err(BenchError::Configuration { param: "thread_count", .. })
        ));
        assert!(!dir.path().join("never").exists());
    }
}
