//! Summary statistics over timing samples.

use std::cmp::Ordering;

/// Percentile of `samples` with linear interpolation between closest ranks.
///
/// `q` is in `[0, 100]`. Returns 0.0 for an empty slice.
pub fn percentile(samples: &[f64], q: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    percentile_sorted(&sorted, q)
}

/// As [`percentile`], for input that is already sorted ascending.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() - 1) as f64 * (q / 100.0).clamp(0.0, 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Documents per second; 0.0 when no time elapsed.
pub fn docs_per_sec(docs: usize, total_seconds: f64) -> f64 {
    if total_seconds > 0.0 {
        docs as f64 / total_seconds
    } else {
        0.0
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Peak resident set size of this process in megabytes.
#[cfg(unix)]
pub fn rss_peak_mb() -> f64 {
    // SAFETY: getrusage only writes into the zeroed struct we pass.
    let usage = unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            return 0.0;
        }
        usage
    };
    let max_rss = usage.ru_maxrss as f64;
    // Linux reports KiB, macOS reports bytes.
    if cfg!(target_os = "macos") {
        max_rss / (1024.0 * 1024.0)
    } else {
        max_rss / 1024.0
    }
}

#[cfg(not(unix))]
pub fn rss_peak_mb() -> f64 {
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let samples = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&samples, 50.0), 2.5);
        assert_eq!(percentile(&samples, 0.0), 1.0);
        assert_eq!(percentile(&samples, 100.0), 4.0);
        // rank = 3 * 0.95 = 2.85
        assert!((percentile(&samples, 95.0) - 3.85).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample_is_every_percentile() {
        assert_eq!(percentile(&[7.25], 50.0), 7.25);
        assert_eq!(percentile(&[7.25], 95.0), 7.25);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_docs_per_sec_guards_zero() {
        assert_eq!(docs_per_sec(10, 0.0), 0.0);
        assert_eq!(docs_per_sec(10, 2.0), 5.0);
        assert_eq!(docs_per_sec(0, 2.0), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234_567_89, 6), 1.234_568);
        assert_eq!(round_to(12.3456, 3), 12.346);
        assert_eq!(round_to(0.0, 3), 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_rss_is_positive() {
        let _buf = vec![1u8; 4 * 1024 * 1024];
        assert!(rss_peak_mb() > 0.0);
    }
}
