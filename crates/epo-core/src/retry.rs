//! Retry with exponential backoff for per-file pipeline work

use std::time::Duration;

use crate::shutdown::is_shutdown_requested;

/// Hard ceiling on the retry budget, whatever the configuration says.
pub const MAX_RETRY_BUDGET: u32 = 10;

/// Whether an error is worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff: 5ms * 2^(attempt-1) (5ms, 10ms, 20ms, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_millis(5 * (1 << (attempt - 1)))
}

/// Retry a fallible operation with exponential backoff.
///
/// Retryable errors get up to `min(max_retries, MAX_RETRY_BUDGET)` retries
/// after the first attempt. A pending shutdown stops the loop immediately:
/// the current error is returned without sleeping or retrying.
pub fn retry_with_backoff<T, E: std::fmt::Display + Retryable>(
    label: &str,
    max_retries: u32,
    mut attempt_fn: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let budget = max_retries.min(MAX_RETRY_BUDGET);
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < budget && e.is_retryable() && !is_shutdown_requested() => {
                attempt += 1;
                log::debug!("{label}: attempt {attempt}/{budget} failed: {e}, retrying...");
                std::thread::sleep(backoff_duration(attempt));
            }
            Err(e) => {
                log::error!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestError {
        message: &'static str,
        retryable: bool,
    }

    impl TestError {
        fn transient(message: &'static str) -> Self {
            Self {
                message,
                retryable: true,
            }
        }

        fn fatal(message: &'static str) -> Self {
            Self {
                message,
                retryable: false,
            }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn backoff_exponential_from_5ms() {
        assert_eq!(backoff_duration(1), Duration::from_millis(5));
        assert_eq!(backoff_duration(2), Duration::from_millis(10));
        assert_eq!(backoff_duration(3), Duration::from_millis(20));
        assert_eq!(backoff_duration(4), Duration::from_millis(40));
    }

    #[test]
    fn succeeds_first_try() {
        let mut calls = 0;
        let result: Result<i32, TestError> = retry_with_backoff("t", 3, || {
            calls += 1;
            Ok(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn retries_until_success() {
        let mut calls = 0;
        let result: Result<i32, TestError> = retry_with_backoff("t", 3, || {
            calls += 1;
            if calls < 3 {
                Err(TestError::transient("transient"))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausts_budget() {
        let mut calls = 0;
        let result: Result<(), TestError> = retry_with_backoff("t", 2, || {
            calls += 1;
            Err(TestError::transient("always"))
        });
        assert!(result.is_err());
        // one initial attempt plus two retries
        assert_eq!(calls, 3);
    }

    #[test]
    fn budget_is_capped() {
        let mut calls = 0u32;
        let result: Result<(), TestError> = retry_with_backoff("t", 100, || {
            calls += 1;
            Err(TestError::transient("always"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1 + MAX_RETRY_BUDGET);
    }

    #[test]
    fn non_retryable_error_fails_immediately() {
        let mut calls = 0;
        let result: Result<(), TestError> = retry_with_backoff("t", 5, || {
            calls += 1;
            Err(TestError::fatal("fatal"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
