//! # Delivery Error Classification
//!
//! Decides what the dispatch layer does with a failed delivery: redeliver
//! after an exponential backoff, or let the task fail for good. Input and
//! preparation errors are permanent; resource, engine, timeout and system
//! errors are retried until the retry budget is spent.

use std::time::Duration;

use super::errors::ExecutionError;
use crate::config::BackoffConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the task RUNNING and redeliver after `delay`
    Retry { next_attempt: u32, delay: Duration },
    /// Mark the task FAILED
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Redeliveries allowed after the first delivery
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// No redeliveries at all
    pub fn no_retries() -> Self {
        Self::new(0, BackoffConfig::default())
    }

    /// `attempt` is the 1-based dispatch attempt that just failed
    pub fn classify(&self, error: &ExecutionError, attempt: u32) -> Disposition {
        if error.is_retryable() && attempt <= self.max_retries {
            Disposition::Retry {
                next_attempt: attempt + 1,
                delay: self.backoff.delay_for_attempt(attempt),
            }
        } else {
            Disposition::Fail
        }
    }
}
