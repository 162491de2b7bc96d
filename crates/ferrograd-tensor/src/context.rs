use std::{
    collections::HashMap,
    ops::Range,
    sync::{Arc, Mutex, OnceLock},
};

use ferrograd_kernels::Acceleration;
use rayon::prelude::*;

use crate::error::TensorError;

/// Controls how data-parallel loops are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Run sequentially on the current thread.
    ///
    /// Useful for small tensors, debugging, or deterministic float reductions.
    Serial,

    /// Use the global Rayon thread pool, one contiguous chunk per worker.
    #[default]
    Parallel,

    /// Run on a dedicated Rayon pool with `n` threads.
    ///
    /// The pool is built on first use and shared by every context asking for `n` threads
    /// for the rest of the process.
    Fixed(usize),
}

/// Default element count below which loops stay on the calling thread.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 32 * 1024;

/// Default matmul tile edge.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Default largest dimension handled by plain blocked matmul in the recursive variant.
pub const DEFAULT_RECURSION_THRESHOLD: usize = 128;

/// Execution parameters passed to every operation.
///
/// The method-style API on [`crate::Tensor`] uses [`ExecutionContext::global`]; the free
/// functions in [`crate::ops`] take a context explicitly so callers can force serial scalar
/// execution.
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::{ExecutionContext, ExecutionStrategy, Acceleration};
///
/// let ctx = ExecutionContext::serial().with_block_size(32);
/// assert_eq!(ctx.strategy, ExecutionStrategy::Serial);
/// assert_eq!(ctx.acceleration, Acceleration::Scalar);
/// assert_eq!(ctx.workers(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    /// How loops are scheduled.
    pub strategy: ExecutionStrategy,
    /// Kernel tier used by inner loops.
    pub acceleration: Acceleration,
    /// Loops over fewer elements than this run serially.
    pub parallel_threshold: usize,
    /// Matmul tile edge.
    pub block_size: usize,
    /// Base-case size of the divide-and-conquer matmul.
    pub recursion_threshold: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::Parallel,
            acceleration: Acceleration::detect(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            block_size: DEFAULT_BLOCK_SIZE,
            recursion_threshold: DEFAULT_RECURSION_THRESHOLD,
        }
    }
}

static GLOBAL_CONTEXT: OnceLock<ExecutionContext> = OnceLock::new();

static FIXED_POOLS: OnceLock<Mutex<HashMap<usize, Arc<rayon::ThreadPool>>>> = OnceLock::new();

/// Returns the shared pool with `n` threads, building it on first request.
fn fixed_pool(n: usize) -> Result<Arc<rayon::ThreadPool>, TensorError> {
    if n == 0 {
        return Err(TensorError::Execution(
            "thread count must be > 0, got 0".to_string(),
        ));
    }
    let mut pools = FIXED_POOLS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(pool) = pools.get(&n) {
        return Ok(Arc::clone(pool));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(move |i| format!("ferrograd-fixed{n}-{i}"))
        .build()
        .map_err(|e| TensorError::Execution(e.to_string()))?;
    log::debug!("built shared thread pool with {n} threads");
    let pool = Arc::new(pool);
    pools.insert(n, Arc::clone(&pool));
    Ok(pool)
}

impl ExecutionContext {
    /// The process-wide default context, detected on first use.
    pub fn global() -> &'static ExecutionContext {
        GLOBAL_CONTEXT.get_or_init(ExecutionContext::default)
    }

    /// A single-threaded context using the portable kernels.
    pub fn serial() -> Self {
        Self {
            strategy: ExecutionStrategy::Serial,
            acceleration: Acceleration::Scalar,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            block_size: DEFAULT_BLOCK_SIZE,
            recursion_threshold: DEFAULT_RECURSION_THRESHOLD,
        }
    }

    /// Replaces the scheduling strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the kernel tier.
    pub fn with_acceleration(mut self, acceleration: Acceleration) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Replaces the serial cut-off.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Replaces the matmul tile edge.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Replaces the recursive matmul base-case size.
    pub fn with_recursion_threshold(mut self, threshold: usize) -> Self {
        self.recursion_threshold = threshold;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Execution`] for a zero thread count or a zero block size.
    pub fn validate(&self) -> Result<(), TensorError> {
        if let ExecutionStrategy::Fixed(0) = self.strategy {
            return Err(TensorError::Execution(
                "thread count must be > 0, got 0".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(TensorError::Execution(
                "block size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of workers a parallel loop is split across.
    pub fn workers(&self) -> usize {
        match self.strategy {
            ExecutionStrategy::Serial => 1,
            ExecutionStrategy::Parallel => rayon::current_num_threads(),
            ExecutionStrategy::Fixed(n) => n.max(1),
        }
    }

    fn is_serial_for(&self, len: usize) -> bool {
        self.workers() <= 1 || len < self.parallel_threshold
    }

    /// The context to use for work already running inside [`ExecutionContext::run`].
    ///
    /// Inside a `Fixed` pool the current Rayon pool is already the local one.
    pub(crate) fn nested(&self) -> Self {
        match self.strategy {
            ExecutionStrategy::Fixed(_) => self.with_strategy(ExecutionStrategy::Parallel),
            _ => *self,
        }
    }

    /// Runs `f` on the pool selected by the strategy, blocking until it returns.
    pub(crate) fn run<R, F>(&self, f: F) -> Result<R, TensorError>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match self.strategy {
            ExecutionStrategy::Fixed(n) => {
                let pool = fixed_pool(n)?;
                Ok(pool.install(f))
            }
            _ => Ok(f()),
        }
    }

    /// Runs two closures, potentially in parallel, and returns both results.
    pub(crate) fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        match self.strategy {
            ExecutionStrategy::Serial => (a(), b()),
            _ => rayon::join(a, b),
        }
    }

    /// Splits `out` into one contiguous chunk per worker and calls `f(start, chunk)` on each.
    ///
    /// `start` is the position of the chunk's first element in `out`. Chunks are disjoint so
    /// workers never write to the same element.
    pub(crate) fn for_each_chunk_mut<T, F>(&self, out: &mut [T], f: F) -> Result<(), TensorError>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<(), TensorError> + Send + Sync,
    {
        if self.is_serial_for(out.len()) {
            return f(0, out);
        }
        let chunk = out.len().div_ceil(self.workers());
        self.run(|| {
            out.par_chunks_mut(chunk)
                .enumerate()
                .try_for_each(|(i, c)| f(i * chunk, c))
        })?
    }

    /// Calls `f(row, chunk)` for consecutive `row_len` sized pieces of `out`.
    ///
    /// The last piece may be shorter. `work` is the estimated element count of the whole
    /// loop and decides between serial and parallel execution.
    pub(crate) fn for_each_row_mut<T, F>(
        &self,
        out: &mut [T],
        row_len: usize,
        work: usize,
        f: F,
    ) -> Result<(), TensorError>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<(), TensorError> + Send + Sync,
    {
        if row_len == 0 {
            return Err(TensorError::Execution("row length must be > 0".to_string()));
        }
        if self.is_serial_for(work) {
            return out
                .chunks_mut(row_len)
                .enumerate()
                .try_for_each(|(i, c)| f(i, c));
        }
        self.run(|| {
            out.par_chunks_mut(row_len)
                .enumerate()
                .try_for_each(|(i, c)| f(i, c))
        })?
    }

    /// Folds `0..len` in one chunk per worker and merges the partials under a lock.
    ///
    /// `merge` must be commutative since workers finish in any order.
    pub(crate) fn reduce<A, F, M>(&self, len: usize, fold: F, merge: M) -> Result<A, TensorError>
    where
        A: Send,
        F: Fn(Range<usize>) -> A + Send + Sync,
        M: Fn(A, A) -> A + Send + Sync,
    {
        if self.is_serial_for(len) {
            return Ok(fold(0..len));
        }
        let chunk = len.div_ceil(self.workers());
        let n_chunks = len.div_ceil(chunk);
        let acc: Mutex<Option<A>> = Mutex::new(None);
        self.run(|| {
            (0..n_chunks).into_par_iter().for_each(|i| {
                let partial = fold(i * chunk..((i + 1) * chunk).min(len));
                let mut guard = acc.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                *guard = Some(match guard.take() {
                    Some(current) => merge(current, partial),
                    None => partial,
                });
            })
        })?;
        acc.into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .ok_or_else(|| TensorError::Execution("reduction over zero chunks".to_string()))
    }
}
