use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),
}

/// Controls how the data-parallel loops of the registration kernels run.
///
/// Every kernel collects its per-item results in index order and reduces
/// them sequentially, so all strategies produce identical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool.
    #[default]
    Parallel,

    /// Run sequentially on the current thread.
    ///
    /// Useful for small volumes and debugging.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call.
    Fixed(usize),
}

/// Evaluate `op` for every index in `0..len` and collect the results in index order.
///
/// # Arguments
///
/// * `strategy` - The execution strategy.
/// * `len` - The number of items.
/// * `op` - The per-item operation.
///
/// # Errors
///
/// Returns [`ParallelError`] if a fixed-size thread pool cannot be built.
pub fn map_indexed<T, F>(
    strategy: ExecutionStrategy,
    len: usize,
    op: F,
) -> Result<Vec<T>, ParallelError>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    let out = match strategy {
        ExecutionStrategy::Serial => (0..len).map(op).collect(),
        ExecutionStrategy::Parallel => (0..len).into_par_iter().map(op).collect(),
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(ParallelError::InvalidThreadCount(n));
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ParallelError::BuildError(e.to_string()))?;
            pool.install(|| (0..len).into_par_iter().map(op).collect())
        }
    };
    Ok(out)
}

/// Apply `op` to every element of `dst` together with its index.
///
/// # Errors
///
/// Returns [`ParallelError`] if a fixed-size thread pool cannot be built.
pub fn for_each_indexed<T, F>(
    strategy: ExecutionStrategy,
    dst: &mut [T],
    op: F,
) -> Result<(), ParallelError>
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    match strategy {
        ExecutionStrategy::Serial => {
            dst.iter_mut().enumerate().for_each(|(i, d)| op(i, d));
        }
        ExecutionStrategy::Parallel => {
            dst.par_iter_mut().enumerate().for_each(|(i, d)| op(i, d));
        }
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(ParallelError::InvalidThreadCount(n));
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ParallelError::BuildError(e.to_string()))?;
            pool.install(|| {
                dst.par_iter_mut().enumerate().for_each(|(i, d)| op(i, d));
            });
        }
    }
    Ok(())
}
