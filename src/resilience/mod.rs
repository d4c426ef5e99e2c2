//! Resilience helpers for store access.

pub mod retry;

pub use retry::{retry, RetryConfig};
