//! Parallel utilities with feature-gated implementations
//!
//! Row-parallel kernels go through these helpers so the crate builds with
//! and without rayon. Sequential fallbacks visit rows in ascending order.

/// Rows below which kernels stay sequential
pub const PARALLEL_ROW_THRESHOLD: usize = 246;

/// Check if parallel processing is available
#[cfg(feature = "rayon")]
pub fn is_parallel_available() -> bool {
    true
}

/// Check if parallel processing is available
#[cfg(not(feature = "rayon"))]
pub fn is_parallel_available() -> bool {
    false
}

/// Number of worker threads used by the parallel kernels
#[cfg(feature = "rayon")]
pub fn num_threads() -> usize {
    rayon::current_num_threads()
}

/// Number of worker threads used by the parallel kernels
#[cfg(not(feature = "rayon"))]
pub fn num_threads() -> usize {
    1
}

/// Parallel map with index
#[cfg(feature = "rayon")]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

/// Sequential map with index (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}

/// Parallel map with index and a scratch value owned by each worker.
///
/// `init` runs once per rayon work split, so the scratch must be reset by
/// `f` before use on every index.
#[cfg(feature = "rayon")]
pub fn parallel_map_indexed_with<S, U, I, F>(count: usize, init: I, f: F) -> Vec<U>
where
    U: Send,
    I: Fn() -> S + Sync + Send,
    F: Fn(&mut S, usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map_init(init, f).collect()
}

/// Sequential map with a single scratch value (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_map_indexed_with<S, U, I, F>(count: usize, init: I, f: F) -> Vec<U>
where
    I: Fn() -> S,
    F: Fn(&mut S, usize) -> U,
{
    let mut scratch = init();
    (0..count).map(|i| f(&mut scratch, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_map_indexed() {
        let result = parallel_map_indexed(5, |i| i * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_parallel_map_indexed_with_scratch() {
        let result = parallel_map_indexed_with(
            6,
            || vec![0usize; 3],
            |scratch, i| {
                scratch.fill(i);
                scratch.iter().sum::<usize>()
            },
        );
        assert_eq!(result, vec![0, 3, 6, 9, 12, 15]);
    }

    #[test]
    fn test_thread_count_positive() {
        assert!(num_threads() >= 1);
        assert_eq!(is_parallel_available(), cfg!(feature = "rayon"));
    }
}
