//! Worker-count resolution.
//!
//! `worker_count` follows the usual process-count convention:
//! - `n > 0`: exactly `n` workers
//! - `0`: one per logical CPU
//! - `n < 0`: all logical CPUs minus `|n|`, at least one

/// Resolves a configured worker count against the machine's CPU count.
///
/// # Examples
///
/// ```
/// use gravity_parallel::workers::resolve_worker_count;
///
/// assert_eq!(resolve_worker_count(3), 3);
/// assert!(resolve_worker_count(-2) >= 1);
/// ```
pub fn resolve_worker_count(requested: i64) -> usize {
    resolve_worker_count_with(requested, num_cpus::get())
}

/// Resolves `requested` against an explicit CPU count.
pub fn resolve_worker_count_with(requested: i64, available: usize) -> usize {
    let available = available.max(1);
    match requested {
        n if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        0 => available,
        n => {
            let reserve = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
            available.saturating_sub(reserve).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_is_exact() {
        assert_eq!(resolve_worker_count_with(4, 16), 4);
        assert_eq!(resolve_worker_count_with(32, 2), 32);
    }

    #[test]
    fn test_zero_uses_all_cpus() {
        assert_eq!(resolve_worker_count_with(0, 8), 8);
        assert_eq!(resolve_worker_count_with(0, 0), 1);
    }

    #[test]
    fn test_negative_reserves_cpus() {
        assert_eq!(resolve_worker_count_with(-2, 8), 6);
        assert_eq!(resolve_worker_count_with(-2, 2), 1);
        assert_eq!(resolve_worker_count_with(i64::MIN, 8), 1);
    }
}
