//! Resilience patterns for remote exchange calls.
//!
//! This module provides the bounded retry executor used for every remote
//! exchange operation: portfolio sync, order lookup, and cancellation.

mod retry;

pub use retry::{
    RetryError, RetryExecutor, RetryPolicy, RetrySink, Retryable, Sleeper, TokioSleeper,
    TracingRetrySink,
};
