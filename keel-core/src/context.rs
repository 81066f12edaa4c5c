use crate::config::ExecutionConfig;
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

static DEFAULT_CONTEXT: OnceLock<ExecutionContext> = OnceLock::new();

/// Immutable execution settings passed to every engine call.
///
/// Holds the worker pool plus the chunking parameters. Chunk boundaries depend
/// only on `morsel_size`, never on the worker count, and partial results are
/// combined in chunk order, so reductions give bit-identical results for any
/// number of workers.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pool: Option<Arc<rayon::ThreadPool>>,
    max_workers: usize,
    auto_detected: bool,
    min_rows_for_parallel: usize,
    morsel_size: usize,
}

impl ExecutionContext {
    pub fn new(config: &ExecutionConfig) -> Result<Self> {
        config.validate()?;

        let (max_workers, auto_detected) = match config.max_workers {
            Some(n) => (n, false),
            None => (num_cpus::get().max(1), true),
        };

        let pool = if config.parallel_enabled && max_workers > 1 {
            let prefix = config.thread_name_prefix.clone();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(max_workers)
                .thread_name(move |i| format!("{}-{}", prefix, i))
                .build()
                .map_err(|e| Error::Execution(format!("failed to build worker pool: {}", e)))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        debug!(
            max_workers,
            auto_detected,
            morsel_size = config.morsel_size,
            "created execution context"
        );

        Ok(Self {
            pool,
            max_workers,
            auto_detected,
            min_rows_for_parallel: config.min_rows_for_parallel,
            morsel_size: config.morsel_size,
        })
    }

    /// Context with an explicit worker count and default chunking.
    pub fn with_workers(max_workers: usize) -> Result<Self> {
        Self::new(&ExecutionConfig {
            max_workers: Some(max_workers),
            ..ExecutionConfig::default()
        })
    }

    /// Single-threaded context; every task runs on the calling thread.
    pub fn sequential() -> Self {
        let config = ExecutionConfig::default();
        Self {
            pool: None,
            max_workers: 1,
            auto_detected: false,
            min_rows_for_parallel: config.min_rows_for_parallel,
            morsel_size: config.morsel_size,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn auto_detected(&self) -> bool {
        self.auto_detected
    }

    pub fn morsel_size(&self) -> usize {
        self.morsel_size
    }

    pub fn min_rows_for_parallel(&self) -> usize {
        self.min_rows_for_parallel
    }

    pub fn should_parallelize(&self, len: usize) -> bool {
        self.pool.is_some() && len >= self.min_rows_for_parallel
    }

    /// Contiguous `morsel_size` ranges covering `0..len`.
    pub fn chunk_ranges(&self, len: usize) -> Vec<Range<usize>> {
        (0..len)
            .step_by(self.morsel_size)
            .map(|start| start..(start + self.morsel_size).min(len))
            .collect()
    }

    /// Applies `f` to every chunk of `0..len`, returning results in chunk order.
    pub fn map_chunks<T, F>(&self, len: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Range<usize>) -> T + Sync + Send,
    {
        let ranges = self.chunk_ranges(len);
        match &self.pool {
            Some(pool) if ranges.len() > 1 && len >= self.min_rows_for_parallel => {
                pool.install(|| ranges.into_par_iter().map(&f).collect())
            }
            _ => ranges.into_iter().map(f).collect(),
        }
    }

    /// Maps then folds chunk partials left to right.
    pub fn reduce<T, M, C>(&self, len: usize, identity: T, map: M, combine: C) -> T
    where
        T: Send,
        M: Fn(Range<usize>) -> T + Sync + Send,
        C: Fn(T, T) -> T,
    {
        self.map_chunks(len, map)
            .into_iter()
            .fold(identity, combine)
    }

    /// Number of hash partitions a build phase over `len` rows should use.
    pub fn partition_count(&self, len: usize) -> usize {
        if self.should_parallelize(len) {
            self.max_workers.next_power_of_two()
        } else {
            1
        }
    }

    /// Runs `f(p)` for each partition `p`, returning results in partition order.
    pub fn map_partitions<T, F>(&self, partitions: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match &self.pool {
            Some(pool) if partitions > 1 => {
                pool.install(|| (0..partitions).into_par_iter().map(&f).collect())
            }
            _ => (0..partitions).map(f).collect(),
        }
    }

    /// Runs `f` inside the worker pool, so nested rayon calls use it.
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl Default for ExecutionContext {
    /// The process-wide auto-detected context, built once on first use.
    fn default() -> Self {
        DEFAULT_CONTEXT
            .get_or_init(|| {
                ExecutionContext::new(&ExecutionConfig::default()).unwrap_or_else(|e| {
                    warn!("falling back to sequential execution: {}", e);
                    ExecutionContext::sequential()
                })
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_morsels(workers: usize) -> ExecutionContext {
        ExecutionContext::new(&ExecutionConfig {
            max_workers: Some(workers),
            min_rows_for_parallel: 0,
            morsel_size: 7,
            ..ExecutionConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_explicit_workers() {
        let ctx = ExecutionContext::with_workers(3).unwrap();
        assert_eq!(ctx.max_workers(), 3);
        assert!(!ctx.auto_detected());
    }

    #[test]
    fn test_default_is_auto_detected() {
        let ctx = ExecutionContext::default();
        assert!(ctx.max_workers() >= 1);
    }

    #[test]
    fn test_rejects_zero_workers() {
        assert!(matches!(
            ExecutionContext::with_workers(0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_chunk_ranges_cover_input() {
        let ctx = small_morsels(2);
        let ranges = ctx.chunk_ranges(20);
        assert_eq!(ranges, vec![0..7, 7..14, 14..20]);
        assert!(ctx.chunk_ranges(0).is_empty());
    }

    #[test]
    fn test_map_chunks_preserves_order() {
        for workers in [1, 2, 4] {
            let ctx = small_morsels(workers);
            let starts = ctx.map_chunks(50, |r| r.start);
            assert_eq!(starts, vec![0, 7, 14, 21, 28, 35, 42, 49]);
        }
    }

    #[test]
    fn test_reduce_is_independent_of_workers() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64) * 0.1).collect();
        let sum_with = |workers| {
            small_morsels(workers).reduce(
                values.len(),
                0.0,
                |r| values[r].iter().sum::<f64>(),
                |a, b| a + b,
            )
        };
        let one = sum_with(1);
        assert_eq!(one.to_bits(), sum_with(2).to_bits());
        assert_eq!(one.to_bits(), sum_with(8).to_bits());
    }
}
