//! Worker budget, retry policy and concurrency limiting.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use inframan_core::DeploymentConfig;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Retry behaviour for failed provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Delay before retry number `retry` (1-based): the base delay doubled
    /// per previous retry, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Budget for resource deployment.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Max concurrent provider calls
    pub max_concurrent: NonZeroUsize,
    /// Timeout for a single provider attempt
    pub timeout_per_resource: Duration,
    /// Retry behaviour
    pub retry: RetryPolicy,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_concurrent: NonZeroUsize::MIN.saturating_add(9),
            timeout_per_resource: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
        }
    }
}

impl Budget {
    /// Create a new budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a budget from deployment settings. A `max_workers` of 0 is
    /// treated as 1.
    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self {
            max_concurrent: NonZeroUsize::new(config.max_workers).unwrap_or(NonZeroUsize::MIN),
            timeout_per_resource: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy {
                max_retries: config.retry_attempts,
                base_delay: Duration::from_millis(config.retry_delay_ms),
                ..RetryPolicy::default()
            },
        }
    }

    /// Set max concurrent provider calls.
    pub fn with_max_concurrent(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_per_resource = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Limits how many provider calls run at once.
#[derive(Debug, Clone)]
pub struct ResourceScheduler {
    budget: Budget,
    permits: Arc<Semaphore>,
}

impl ResourceScheduler {
    /// Create a new scheduler.
    pub fn new(budget: Budget) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(budget.max_concurrent.get())),
            budget,
        }
    }

    /// The budget this scheduler enforces.
    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Wait for a free worker slot. The slot is released when the permit is
    /// dropped. Fails once the scheduler is closed.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.permits.clone().acquire_owned().await
    }

    /// Free worker slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for ResourceScheduler {
    fn default() -> Self {
        Self::new(Budget::default())
    }
}
