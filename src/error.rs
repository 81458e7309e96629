//! Error taxonomy for corpus generation and benchmark runs.

use std::io;
use std::path::PathBuf;

/// Everything that can abort a generator or benchmark invocation.
///
/// None of these are retried internally; callers get the operation and the
/// offending value and decide what to do.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// A numeric or named parameter is out of range.
    #[error("invalid {param}: {message}")]
    Configuration { param: &'static str, message: String },

    #[error("unsupported language '{0}' (only pt-br is available)")]
    UnsupportedLanguage(String),

    #[error("invalid size list '{raw}': {message}")]
    InvalidSizeList { raw: String, message: String },

    #[error("corpus not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("corpus is empty: {}", .0.display())]
    EmptyCorpus(PathBuf),

    #[error("malformed corpus record at {}:{line}: {source}", path.display())]
    MalformedCorpus {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The encoder failed during warm-up, measurement or the final pass.
    #[error("encoding failed during {phase}: {message}")]
    Encoding { phase: &'static str, message: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    ExternalProcess {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    pub fn config(param: &'static str, message: impl Into<String>) -> Self {
        BenchError::Configuration {
            param,
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        BenchError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_names_parameter() {
        let err = BenchError::config("batch_size", "must be > 0, got 0");
        assert_eq!(err.to_string(), "invalid batch_size: must be > 0, got 0");
    }

    #[test]
    fn missing_corpus_shows_path() {
        let err = BenchError::CorpusNotFound(PathBuf::from("data/corpus.jsonl"));
        assert_eq!(err.to_string(), "corpus not found: data/corpus.jsonl");
    }

    #[test]
    fn io_error_keeps_source() {
        let err = BenchError::io(
            "creating results/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("creating results/x"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
