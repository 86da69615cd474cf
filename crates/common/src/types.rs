//! Core records for dashprobe runs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Free-form key/value tags attached to log entries and records
pub type Metadata = BTreeMap<String, String>;

/// Operation class used to pick duration thresholds and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PageLoad,
    Action,
    ElementWait,
    WebdriverInit,
    /// Sensor extraction across every station page
    SensorValidation,
    /// Chart checks across the charting stations
    VisualValidation,
    /// Download dialog, password round trips and the file wait
    DownloadTest,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::PageLoad,
        Category::Action,
        Category::ElementWait,
        Category::WebdriverInit,
        Category::SensorValidation,
        Category::VisualValidation,
        Category::DownloadTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PageLoad => "page_load",
            Category::Action => "action",
            Category::ElementWait => "element_wait",
            Category::WebdriverInit => "webdriver_init",
            Category::SensorValidation => "sensor_validation",
            Category::VisualValidation => "visual_validation",
            Category::DownloadTest => "download_test",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Warning,
    Fail,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Warning => "WARNING",
            Outcome::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt of one operation. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_name: String,
    pub category: Category,
    pub attempt_number: u32,
    pub duration_seconds: f64,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotKind {
    Success,
    Error,
}

/// A captured browser snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub path: PathBuf,
    pub operation_name: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ScreenshotKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Step lifecycle: pending -> running -> passed | warned | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Passed,
    Warned,
    Failed,
}

impl Default for StepState {
    fn default() -> Self {
        Self::Pending
    }
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Passed | StepState::Warned | StepState::Failed)
    }

    /// Passed and warned steps both count toward the run cutoff
    pub fn is_success(&self) -> bool {
        matches!(self, StepState::Passed | StepState::Warned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Passed => "passed",
            StepState::Warned => "warned",
            StepState::Failed => "failed",
        }
    }
}

impl From<Outcome> for StepState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Pass => StepState::Passed,
            Outcome::Warning => StepState::Warned,
            Outcome::Fail => StepState::Failed,
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal view of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub state: StepState,
    pub attempts: u32,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<PathBuf>,
}

/// Aggregate over every step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub pass_fraction: f64,
    pub success_cutoff: f64,
    pub success: bool,
    /// Set when the browser session could not be acquired
    pub aborted: bool,
    pub duration_seconds: f64,
    pub steps: Vec<StepSummary>,
}

impl RunSummary {
    /// Build the aggregate. `success` requires `(passed + warned) / total >= cutoff`.
    pub fn from_steps(
        steps: Vec<StepSummary>,
        success_cutoff: f64,
        aborted: bool,
        duration_seconds: f64,
    ) -> Self {
        let total = steps.len();
        let passed = steps.iter().filter(|s| s.state == StepState::Passed).count();
        let warned = steps.iter().filter(|s| s.state == StepState::Warned).count();
        let failed = steps.iter().filter(|s| s.state == StepState::Failed).count();

        let pass_fraction = if total == 0 {
            0.0
        } else {
            (passed + warned) as f64 / total as f64
        };
        let success = !aborted && total > 0 && pass_fraction >= success_cutoff;

        Self {
            total,
            passed,
            warned,
            failed,
            pass_fraction,
            success_cutoff,
            success,
            aborted,
            duration_seconds,
            steps,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// Everything recorded during one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub operations: Vec<OperationRecord>,
    pub step_results: BTreeMap<String, bool>,
    pub screenshots: Vec<ScreenshotRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl SessionReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            operations: Vec::new(),
            step_results: BTreeMap::new(),
            screenshots: Vec::new(),
            summary: None,
        }
    }

    /// Terminal record for an operation, if one was logged
    pub fn operation(&self, name: &str) -> Option<&OperationRecord> {
        self.operations.iter().rev().find(|o| o.operation_name == name)
    }

    /// Write the session as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, state: StepState) -> StepSummary {
        StepSummary {
            name: name.to_string(),
            state,
            attempts: 1,
            duration_seconds: 0.5,
            error: None,
            evidence: None,
        }
    }

    fn five_steps_one_failed() -> Vec<StepSummary> {
        vec![
            step("webdriver_init", StepState::Passed),
            step("open_dashboard", StepState::Passed),
            step("verify_main_page", StepState::Warned),
            step("time_filter:1 Hari", StepState::Failed),
            step("download_with_password", StepState::Passed),
        ]
    }

    #[test]
    fn test_summary_meets_cutoff() {
        let summary = RunSummary::from_steps(five_steps_one_failed(), 0.6, false, 12.0);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.warned, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.pass_fraction - 0.8).abs() < f64::EPSILON);
        assert!(summary.success);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_summary_misses_cutoff() {
        let summary = RunSummary::from_steps(five_steps_one_failed(), 0.9, false, 12.0);
        assert!(!summary.success);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_aborted_summary_never_succeeds() {
        let steps = vec![step("webdriver_init", StepState::Failed)];
        let summary = RunSummary::from_steps(steps, 0.0, true, 1.0);
        assert!(!summary.success);
    }

    #[test]
    fn test_step_state_from_outcome() {
        assert_eq!(StepState::from(Outcome::Warning), StepState::Warned);
        assert!(StepState::from(Outcome::Warning).is_success());
        assert!(!StepState::from(Outcome::Fail).is_success());
        assert!(!StepState::Running.is_terminal());
    }
}
