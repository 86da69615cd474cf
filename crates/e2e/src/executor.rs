//! Retry + timing + threshold composition around one operation

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use dashprobe_common::{Category, Metadata, OperationRecord, Outcome, StepError};

use crate::logger::StructuredLogger;
use crate::retry::{run_with_retry, RetryPolicy, RetryTable};
use crate::threshold::ThresholdPolicy;

/// Name, category and tags of an operation about to run
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    pub category: Category,
    pub metadata: Metadata,
}

impl Operation {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
            metadata: Metadata::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record for one attempt of this operation
    pub fn record(
        &self,
        attempt: u32,
        duration: Duration,
        outcome: Outcome,
        error: Option<String>,
    ) -> OperationRecord {
        OperationRecord {
            operation_name: self.name.clone(),
            category: self.category,
            attempt_number: attempt,
            duration_seconds: duration.as_secs_f64(),
            outcome,
            timestamp: Utc::now(),
            metadata: self.metadata.clone(),
            error,
        }
    }

    pub(crate) fn failed_attempt(
        &self,
        attempt: u32,
        duration: Duration,
        err: &StepError,
    ) -> OperationRecord {
        self.record(attempt, duration, Outcome::Fail, Some(err.to_string()))
    }
}

/// Terminal result of an executed operation
#[derive(Debug)]
pub struct Execution<T> {
    /// The terminal record, already logged and kept in the session
    pub record: OperationRecord,
    /// Present when the last attempt returned a value, even if it was too slow
    pub value: Option<T>,
    /// The last attempt's error when every attempt failed
    pub error: Option<StepError>,
}

impl<T> Execution<T> {
    pub fn outcome(&self) -> Outcome {
        self.record.outcome
    }

    pub fn attempts(&self) -> u32 {
        self.record.attempt_number
    }

    /// Human-readable reason for a FAIL outcome
    pub fn failure_reason(&self) -> Option<String> {
        match (&self.error, self.record.outcome) {
            (Some(err), _) => Some(err.to_string()),
            (None, Outcome::Fail) => self.record.error.clone(),
            _ => None,
        }
    }
}

/// Holds the thresholds and retry table for a run
#[derive(Debug, Clone, Default)]
pub struct Executor {
    thresholds: ThresholdPolicy,
    retry: RetryTable,
}

impl Executor {
    pub fn new(thresholds: ThresholdPolicy, retry: RetryTable) -> Self {
        Self { thresholds, retry }
    }

    pub fn thresholds(&self) -> &ThresholdPolicy {
        &self.thresholds
    }

    pub fn retry_table(&self) -> &RetryTable {
        &self.retry
    }

    /// Run `op` under the retry policy configured for its category
    pub async fn execute_default<T, F, Fut>(
        &self,
        logger: &mut StructuredLogger,
        operation: &Operation,
        op: F,
    ) -> Execution<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let policy = self.retry.for_category(operation.category).clone();
        self.execute(logger, operation, &policy, op).await
    }

    /// Run `op` under `policy`, classify the successful attempt and log
    /// exactly one terminal record.
    pub async fn execute<T, F, Fut>(
        &self,
        logger: &mut StructuredLogger,
        operation: &Operation,
        policy: &RetryPolicy,
        op: F,
    ) -> Execution<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let outcome = run_with_retry(logger, operation, policy, op).await;
        let attempts = outcome.attempts;
        let duration = outcome.last_duration;

        match outcome.result {
            Ok(value) => {
                let classified = self.thresholds.classify(operation.category, duration);
                let error = match (classified, self.thresholds.get(operation.category)) {
                    (Outcome::Fail, Some(t)) => Some(format!(
                        "took {:.2}s, fail threshold is {:.1}s",
                        duration.as_secs_f64(),
                        t.fail_at
                    )),
                    _ => None,
                };
                let mut record = operation.record(attempts, duration, classified, error);
                if let Some(t) = self.thresholds.get(operation.category) {
                    record
                        .metadata
                        .insert("warn_at".to_string(), format!("{:.1}", t.warn_at));
                    record
                        .metadata
                        .insert("fail_at".to_string(), format!("{:.1}", t.fail_at));
                }
                logger.record_operation(record.clone());
                Execution {
                    record,
                    value: Some(value),
                    error: None,
                }
            }
            Err(err) => {
                let mut record =
                    operation.record(attempts, duration, Outcome::Fail, Some(err.to_string()));
                record
                    .metadata
                    .insert("error_kind".to_string(), err.kind.to_string());
                logger.record_operation(record.clone());
                Execution {
                    record,
                    value: None,
                    error: Some(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::Thresholds;
    use dashprobe_common::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor() -> Executor {
        let thresholds = ThresholdPolicy::permissive()
            .with(Category::Action, Thresholds { warn_at: 3.0, fail_at: 5.0 });
        Executor::new(thresholds, RetryTable::uniform(RetryPolicy::new(3, 1.0)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_terminal_record_per_operation() {
        let mut logger = StructuredLogger::console_only(Utc::now());
        let calls = AtomicU32::new(0);
        let op = Operation::new("time_filter:7 Hari", Category::Action).with_meta("label", "7 Hari");

        let execution = executor()
            .execute_default(&mut logger, &op, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StepError::not_interactable("overlay intercepts click"))
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(execution.outcome(), Outcome::Pass);
        assert_eq!(execution.attempts(), 2);
        assert_eq!(logger.session().operations.len(), 1);
        let record = &logger.session().operations[0];
        assert_eq!(record.attempt_number, 2);
        assert_eq!(record.metadata.get("label").map(String::as_str), Some("7 Hari"));
        assert_eq!(record.metadata.get("fail_at").map(String::as_str), Some("5.0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_success_is_classified() {
        let mut logger = StructuredLogger::console_only(Utc::now());
        let op = Operation::new("click_download", Category::Action);

        let execution = executor()
            .execute_default(&mut logger, &op, || async {
                tokio::time::sleep(Duration::from_secs(4)).await;
                Ok(7)
            })
            .await;

        assert_eq!(execution.outcome(), Outcome::Warning);
        assert_eq!(execution.value, Some(7));

        let slow = executor()
            .execute_default(&mut logger, &op, || async {
                tokio::time::sleep(Duration::from_secs(6)).await;
                Ok(())
            })
            .await;
        assert_eq!(slow.outcome(), Outcome::Fail);
        assert!(slow.error.is_none());
        assert!(slow.failure_reason().unwrap().contains("fail threshold"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_operation_records_failure() {
        let mut logger = StructuredLogger::console_only(Utc::now());
        let op = Operation::new("open_dashboard", Category::PageLoad);

        let execution: Execution<()> = executor()
            .execute_default(&mut logger, &op, || async {
                Err(StepError::timeout("body never appeared"))
            })
            .await;

        assert_eq!(execution.outcome(), Outcome::Fail);
        assert_eq!(execution.attempts(), 3);
        assert_eq!(execution.error.as_ref().unwrap().kind, ErrorKind::Timeout);

        let ops = &logger.session().operations;
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].metadata.get("error_kind").map(String::as_str),
            Some("timeout")
        );
    }
}
