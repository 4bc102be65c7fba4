//! Pool configuration and builder.

use crate::pool::WorkStealingPool;
use spindle_core::PoolResult;

/// How [`WorkStealingPool::submit`] picks a destination queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Uniformly random queue, drawn from a per-thread generator
    #[default]
    Random,
    /// Next queue from a shared rotating counter
    RoundRobin,
}

/// Configuration for a [`WorkStealingPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads. Zero is allowed; see [`WorkStealingPool`].
    pub worker_threads: usize,
    /// Worker threads are named `{thread_name_prefix}-{index}`
    pub thread_name_prefix: String,
    /// Destination policy for single submissions
    pub placement: Placement,
    /// Stack size for worker threads; `None` keeps the platform default
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            thread_name_prefix: "spindle-worker".to_owned(),
            placement: Placement::default(),
            stack_size: None,
        }
    }
}

/// Builder for configuring a [`WorkStealingPool`].
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set the placement policy for [`WorkStealingPool::submit`].
    #[must_use]
    pub fn placement(mut self, placement: Placement) -> Self {
        self.config.placement = placement;
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// The configuration built so far.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Spawn the pool.
    ///
    /// # Errors
    ///
    /// [`PoolError::Spawn`](spindle_core::PoolError::Spawn) if a worker thread
    /// cannot be created.
    pub fn build(self) -> PoolResult<WorkStealingPool> {
        WorkStealingPool::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_threads, num_cpus::get());
        assert_eq!(config.thread_name_prefix, "spindle-worker");
        assert_eq!(config.placement, Placement::Random);
        assert_eq!(config.stack_size, None);
    }

    #[test]
    fn test_builder_setters() {
        let builder = PoolBuilder::new()
            .worker_threads(3)
            .thread_name_prefix("io")
            .placement(Placement::RoundRobin)
            .stack_size(256 * 1024);

        let config = builder.config();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.thread_name_prefix, "io");
        assert_eq!(config.placement, Placement::RoundRobin);
        assert_eq!(config.stack_size, Some(256 * 1024));
    }
}
