//! Content hashes and run identity.

use crate::error::{BenchError, Result};
use crate::schema::RunRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process::Command;

/// Placeholder used in run ids when no revision can be determined.
pub const NO_GIT: &str = "nogit";

fn hex(digest: &[u8]) -> String {
    let mut s = String::with_capacity(digest.len() * 2);
    for b in digest {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex(&Sha256::digest(bytes))
}

/// Streaming SHA-256 over a reader, 1 MiB at a time.
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

pub fn sha256_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut file =
        File::open(path).map_err(|e| BenchError::io(format!("opening {}", path.display()), e))?;
    sha256_reader(&mut file).map_err(|e| BenchError::io(format!("hashing {}", path.display()), e))
}

/// `2024-05-01T12:00:00.123Z`
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current source revision: `GIT_SHA`/`GITHUB_SHA` if exported by CI,
/// otherwise `git rev-parse HEAD`.
pub fn git_revision() -> Option<String> {
    if let Some(sha) = std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .filter(|s| !s.trim().is_empty())
    {
        return Some(sha.trim().to_string());
    }

    let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()?
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on success.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let name = String::from_utf8_lossy(&buf[..end]).into_owned();
        if !name.is_empty() {
            return name;
        }
    }
    "localhost".to_string()
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// `<YYYYmmddTHHMMSSZ>-<host>-<rev[..8]>`
pub fn build_run_id(at: DateTime<Utc>, host: &str, revision: Option<&str>) -> String {
    let rev: String = revision.unwrap_or(NO_GIT).chars().take(8).collect();
    format!("{}-{}-{}", at.format("%Y%m%dT%H%M%SZ"), host, rev)
}

pub fn current_run_id() -> String {
    build_run_id(Utc::now(), &hostname(), git_revision().as_deref())
}

/// Outcome of re-hashing a run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub corpus_sha256: String,
    pub embeddings_sha256: String,
    pub corpus_ok: bool,
    pub embeddings_ok: bool,
}

impl VerifyReport {
    pub fn ok(&self) -> bool {
        self.corpus_ok && self.embeddings_ok
    }
}

/// Recompute both integrity anchors and compare them with `record`.
pub fn verify_run(record: &RunRecord, corpus: &Path, embeddings: &Path) -> Result<VerifyReport> {
    let corpus_sha256 = sha256_file(corpus)?;
    let embeddings_sha256 = sha256_file(embeddings)?;
    Ok(VerifyReport {
        corpus_ok: corpus_sha256 == record.corpus_sha256,
        embeddings_ok: embeddings_sha256 == record.embeddings_sha256,
        corpus_sha256,
        embeddings_sha256,
    })
}
