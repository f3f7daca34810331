use crate::core::config::RetryPolicy;
use crate::core::error::ProviderError;
use log::warn;
use std::future::Future;
use std::time::Duration;

type Rule = fn(&ProviderError) -> bool;

/// Evaluated in order; any match marks the failure as a rate limit.
const RATE_LIMIT_RULES: &[(&str, Rule)] = &[
    ("status 429", |e| e.status_code == Some(429)),
    ("nested code 429", |e| e.nested_code == Some(429)),
    ("message mentions 429", |e| e.message.contains("429")),
    ("RESOURCE_EXHAUSTED", |e| e.message.contains("RESOURCE_EXHAUSTED")),
    ("quota", |e| e.message.contains("quota")),
];

/// Name of the first rule matching `err`, if any.
pub fn rate_limit_reason(err: &ProviderError) -> Option<&'static str> {
    RATE_LIMIT_RULES
        .iter()
        .find(|(_, rule)| rule(err))
        .map(|(name, _)| *name)
}

pub fn is_rate_limited(err: &ProviderError) -> bool {
    rate_limit_reason(err).is_some()
}

/// Scales `delay` by `multiplier`, saturating at `Duration::MAX` instead of
/// overflowing.
fn next_delay(delay: Duration, multiplier: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier).unwrap_or(Duration::MAX)
}

impl RetryPolicy {
    /// Runs `operation`, retrying only rate-limited failures with exponential
    /// backoff. Any other failure, or the last one once the budget is spent,
    /// is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut retries = self.max_retries;
        let mut delay = self.initial_delay();
        let mut attempt = 1u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let reason = match rate_limit_reason(&err) {
                Some(reason) if retries > 0 => reason,
                _ => return Err(err),
            };

            warn!(
                "Rate limited ({}) on attempt {}, retrying in {:?} ({} retries left)",
                reason,
                attempt,
                delay,
                retries - 1
            );
            tokio::time::sleep(delay).await;

            retries -= 1;
            attempt += 1;
            delay = next_delay(delay, self.backoff_multiplier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn rate_limited() -> ProviderError {
        ProviderError::new("Too many requests").with_status(429)
    }

    #[test]
    fn test_rate_limit_rules() {
        assert!(is_rate_limited(&ProviderError::new("x").with_status(429)));
        assert!(is_rate_limited(&ProviderError::new("x").with_status(400).with_nested_code(429)));
        assert!(is_rate_limited(&ProviderError::new("HTTP 429 Too Many Requests")));
        assert!(is_rate_limited(&ProviderError::new("RESOURCE_EXHAUSTED: try later")));
        assert!(is_rate_limited(&ProviderError::new("You exceeded your current quota")));

        assert!(!is_rate_limited(&ProviderError::new("model not found").with_status(404)));
        // Match is case-sensitive.
        assert!(!is_rate_limited(&ProviderError::new("QUOTA")));
        assert_eq!(
            rate_limit_reason(&ProviderError::new("quota").with_status(429)),
            Some("status 429")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_until_success() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 100,
            backoff_multiplier: 2.0,
        };
        let attempts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let log = attempts.clone();
        let result = policy
            .execute(|| {
                let log = log.clone();
                async move {
                    let seen = {
                        let mut log = log.lock().unwrap();
                        log.push(Instant::now());
                        log.len()
                    };
                    if seen <= 3 {
                        Err(rate_limited())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        let offsets: Vec<u128> = attempts
            .lock()
            .unwrap()
            .iter()
            .map(|t| (*t - start).as_millis())
            .collect();
        // Delays of 100, 200, 400ms between attempts.
        assert_eq!(offsets, vec![0, 100, 300, 700]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_returns_original_error() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(Mutex::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(ProviderError::new("RESOURCE_EXHAUSTED: slow down"))
                }
            })
            .await;

        assert_eq!(*calls.lock().unwrap(), 4);
        assert_eq!(result.unwrap_err().message, "RESOURCE_EXHAUSTED: slow down");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_rate_limit_error_is_not_retried() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(Mutex::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<(), _> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(ProviderError::new("invalid argument").with_status(400))
                }
            })
            .await;

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(Instant::now(), start);
        let err = result.unwrap_err();
        assert_eq!(err.status_code, Some(400));
        assert_eq!(err.message, "invalid argument");
    }

    #[test]
    fn test_next_delay_saturates() {
        let d = Duration::from_millis(100);
        assert_eq!(next_delay(d, 2.0), Duration::from_millis(200));
        assert_eq!(next_delay(d, 1e308), Duration::MAX);
        assert_eq!(next_delay(d, f64::INFINITY), Duration::MAX);
        assert_eq!(next_delay(d, f64::NAN), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_multiplier_does_not_panic() {
        let policy = RetryPolicy {
            max_retries: 1,
            initial_delay_ms: 10,
            backoff_multiplier: 1e308,
        };
        let calls = Arc::new(Mutex::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(ProviderError::new("quota"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().message, "quota");
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let calls = Arc::new(Mutex::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(rate_limited())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
