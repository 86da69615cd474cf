//! Retry with linear backoff over a declared set of recoverable error kinds

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use dashprobe_common::{Category, ErrorKind, StepError};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::clock::measure;
use crate::error::{E2eError, E2eResult};
use crate::executor::Operation;
use crate::logger::StructuredLogger;

fn default_retryable() -> BTreeSet<ErrorKind> {
    ErrorKind::RECOVERABLE.into_iter().collect()
}

/// How often and how patiently to re-run a failing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total tries including the first; 1 disables retrying
    pub max_attempts: u32,

    /// Delay before attempt `k` is `base_delay_seconds * (k - 1)`
    pub base_delay_seconds: f64,

    #[serde(default = "default_retryable")]
    pub retryable_kinds: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 1.0)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_seconds: f64) -> Self {
        Self {
            max_attempts,
            base_delay_seconds,
            retryable_kinds: default_retryable(),
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, 0.0)
    }

    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }

    /// Backoff slept before the given 1-based attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_sub(1) as f64;
        Duration::from_secs_f64((self.base_delay_seconds * factor).max(0.0))
    }

    pub fn validate(&self, label: &str) -> E2eResult<()> {
        if self.max_attempts < 1 {
            return Err(E2eError::InvalidConfig(format!(
                "{}: max_attempts must be >= 1",
                label
            )));
        }
        if !(self.base_delay_seconds >= 0.0) {
            return Err(E2eError::InvalidConfig(format!(
                "{}: base_delay_seconds must be >= 0",
                label
            )));
        }
        Ok(())
    }
}

/// Retry policies per category, falling back to `default`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryTable {
    #[serde(default)]
    pub default: RetryPolicy,
    #[serde(default)]
    pub page_load: Option<RetryPolicy>,
    #[serde(default)]
    pub action: Option<RetryPolicy>,
    #[serde(default)]
    pub element_wait: Option<RetryPolicy>,
    #[serde(default)]
    pub webdriver_init: Option<RetryPolicy>,
    #[serde(default)]
    pub sensor_validation: Option<RetryPolicy>,
    #[serde(default)]
    pub visual_validation: Option<RetryPolicy>,
    #[serde(default)]
    pub download_test: Option<RetryPolicy>,
}

impl Default for RetryTable {
    fn default() -> Self {
        Self {
            default: RetryPolicy::new(2, 1.0),
            page_load: Some(RetryPolicy::new(2, 1.5)),
            action: None,
            element_wait: Some(RetryPolicy::new(2, 1.0)),
            webdriver_init: Some(RetryPolicy::new(3, 2.0)),
            sensor_validation: None,
            visual_validation: None,
            download_test: None,
        }
    }
}

impl RetryTable {
    /// The same policy for every category
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            default: policy,
            page_load: None,
            action: None,
            element_wait: None,
            webdriver_init: None,
            sensor_validation: None,
            visual_validation: None,
            download_test: None,
        }
    }

    pub fn for_category(&self, category: Category) -> &RetryPolicy {
        let specific = match category {
            Category::PageLoad => self.page_load.as_ref(),
            Category::Action => self.action.as_ref(),
            Category::ElementWait => self.element_wait.as_ref(),
            Category::WebdriverInit => self.webdriver_init.as_ref(),
            Category::SensorValidation => self.sensor_validation.as_ref(),
            Category::VisualValidation => self.visual_validation.as_ref(),
            Category::DownloadTest => self.download_test.as_ref(),
        };
        specific.unwrap_or(&self.default)
    }

    pub fn validate(&self) -> E2eResult<()> {
        self.default.validate("retry.default")?;
        for (label, policy) in [
            ("retry.page_load", &self.page_load),
            ("retry.action", &self.action),
            ("retry.element_wait", &self.element_wait),
            ("retry.webdriver_init", &self.webdriver_init),
            ("retry.sensor_validation", &self.sensor_validation),
            ("retry.visual_validation", &self.visual_validation),
            ("retry.download_test", &self.download_test),
        ] {
            if let Some(policy) = policy {
                policy.validate(label)?;
            }
        }
        Ok(())
    }
}

/// Terminal result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Value of the successful attempt, or the last error
    pub result: Result<T, StepError>,
    pub attempts: u32,
    pub last_duration: Duration,
    pub total_delay: Duration,
}

/// Run `op` until it succeeds, fails with a non-retryable kind, or the
/// attempt budget is spent.
///
/// Failed intermediate attempts are logged here (text sink only). The final
/// attempt is left to the caller, who turns it into the terminal record.
pub async fn run_with_retry<T, F, Fut>(
    logger: &mut StructuredLogger,
    operation: &Operation,
    policy: &RetryPolicy,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut total_delay = Duration::ZERO;
    let mut attempt = 1;

    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            debug!(
                "Retrying {} in {:.1}s (attempt {}/{})",
                operation.name,
                delay.as_secs_f64(),
                attempt,
                max_attempts
            );
            sleep(delay).await;
            total_delay += delay;
        }

        let (result, duration) = measure(|| op()).await;

        match result {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    last_duration: duration,
                    total_delay,
                };
            }
            Err(err) => {
                let retryable = policy.is_retryable(err.kind);
                if !retryable || attempt >= max_attempts {
                    if !retryable {
                        debug!("{} failed with non-retryable {}", operation.name, err.kind);
                    }
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                        last_duration: duration,
                        total_delay,
                    };
                }
                logger.record_attempt(&operation.failed_attempt(attempt, duration, &err));
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn operation() -> Operation {
        Operation::new("open_dashboard", Category::PageLoad)
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_retryable_failures_then_success() {
        let mut logger = StructuredLogger::console_only(Utc::now());
        let policy = RetryPolicy::new(3, 2.0);
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let outcome = run_with_retry(&mut logger, &operation(), &policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(StepError::timeout(format!("body not present (try {})", n)))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.total_delay, Duration::from_secs(6));

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_millis(6100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_aborts_immediately() {
        let mut logger = StructuredLogger::console_only(Utc::now());
        let policy = RetryPolicy::new(3, 2.0);
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = run_with_retry(&mut logger, &operation(), &policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StepError::assertion("title missing 'Microclimate Dashboard'"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_delay, Duration::ZERO);
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::AssertionMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_returns_last_error() {
        let mut logger = StructuredLogger::console_only(Utc::now());
        let policy = RetryPolicy::new(2, 0.5);
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = run_with_retry(&mut logger, &operation(), &policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(StepError::stale_element(format!("node detached #{}", n)))
        })
        .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.total_delay, Duration::from_millis(500));
        assert_eq!(outcome.result.unwrap_err().message, "node detached #2");
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let mut logger = StructuredLogger::console_only(Utc::now());
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> =
            run_with_retry(&mut logger, &operation(), &RetryPolicy::no_retry(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StepError::timeout("slow"))
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_linear_backoff_schedule() {
        let policy = RetryPolicy::new(4, 1.5);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs_f64(1.5));
        assert_eq!(policy.delay_before(3), Duration::from_secs_f64(3.0));
        assert_eq!(policy.delay_before(4), Duration::from_secs_f64(4.5));
    }

    #[test]
    fn test_table_falls_back_to_default() {
        let table = RetryTable::default();
        assert_eq!(table.for_category(Category::WebdriverInit).max_attempts, 3);
        assert_eq!(table.for_category(Category::Action), &table.default);
        assert_eq!(table.for_category(Category::DownloadTest), &table.default);

        let tuned = RetryTable {
            sensor_validation: Some(RetryPolicy::new(1, 0.0)),
            ..RetryTable::default()
        };
        assert_eq!(tuned.for_category(Category::SensorValidation).max_attempts, 1);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut table = RetryTable::default();
        table.action = Some(RetryPolicy::new(0, 1.0));
        assert!(table.validate().is_err());
    }
}
