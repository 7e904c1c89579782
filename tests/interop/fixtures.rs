use std::time::Duration;

use banner_harness::retry::RetryPolicy;
use rstest::*;

/// Retry policy for peers that are already listening
#[fixture]
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_millis(20))
}

/// Retry policy that tolerates no peer at all
#[fixture]
pub fn single_attempt() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(1))
}
