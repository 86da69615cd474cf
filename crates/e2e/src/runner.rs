//! Step orchestrator: acquires the browser, runs every step, reports

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use dashprobe_common::{
    Category, Metadata, RunSummary, SessionReport, StepError, StepState, StepSummary,
};
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::chromium::ChromiumLauncher;
use crate::clock::Stopwatch;
use crate::config::RunnerConfig;
use crate::dashboard;
use crate::driver::{BrowserDriver, DriverFactory};
use crate::error::E2eResult;
use crate::evidence::EvidenceCapturer;
use crate::executor::{Executor, Operation};
use crate::logger::{Level, StructuredLogger};
use crate::report::{HtmlReportSink, JsonReportSink, ReportSink};

/// Name of the browser acquisition step
pub const WEBDRIVER_INIT: &str = "webdriver_init";

/// One unit of the acceptance run
#[async_trait]
pub trait Step<D: BrowserDriver>: Send + Sync {
    /// Name, category and tags used for logging and thresholds
    fn operation(&self) -> Operation;

    /// Perform the step once. Returned metadata is logged alongside the step.
    async fn run(&self, driver: &D) -> Result<Metadata, StepError>;
}

/// What a finished run leaves behind
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub session: SessionReport,
    /// Files written by the report sinks
    pub reports: Vec<PathBuf>,
    pub text_log: Option<PathBuf>,
    pub machine_log: Option<PathBuf>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.summary.exit_code()
    }
}

pub struct Orchestrator {
    logger: StructuredLogger,
    executor: Executor,
    evidence: EvidenceCapturer,
    sinks: Vec<Box<dyn ReportSink>>,
    success_cutoff: f64,
}

impl Orchestrator {
    pub fn new(
        logger: StructuredLogger,
        executor: Executor,
        evidence: EvidenceCapturer,
        success_cutoff: f64,
    ) -> Self {
        Self {
            logger,
            executor,
            evidence,
            sinks: Vec::new(),
            success_cutoff,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Logger files, executor, evidence directory and sinks from `config.output`.
    ///
    /// An unusable log directory degrades the logger to console output.
    pub fn from_config(config: &RunnerConfig) -> Self {
        let started_at = Utc::now();
        let logger = match StructuredLogger::open(&config.output.log_dir, started_at) {
            Ok(logger) => logger,
            Err(e) => {
                warn!(
                    "Cannot open log files in {}: {}; logging to console only",
                    config.output.log_dir.display(),
                    e
                );
                StructuredLogger::console_only(started_at)
            }
        };
        let executor = Executor::new(config.thresholds.clone(), config.retry.clone());
        let evidence = EvidenceCapturer::new(&config.output.screenshot_dir)
            .with_success_shots(config.run.screenshot_on_success);

        let mut orchestrator = Self::new(logger, executor, evidence, config.run.success_cutoff);
        if config.output.json_report {
            orchestrator =
                orchestrator.with_sink(Box::new(JsonReportSink::new(&config.output.report_dir)));
        }
        if config.output.html_report {
            orchestrator =
                orchestrator.with_sink(Box::new(HtmlReportSink::new(&config.output.report_dir)));
        }
        orchestrator
    }

    /// Acquire a browser from `factory` and run `steps` in order.
    ///
    /// Every step runs regardless of earlier failures. The browser is closed
    /// and reports are written on every path; a panic inside a step is
    /// resumed after that.
    pub async fn run<F>(mut self, factory: &F, steps: &[Box<dyn Step<F::Driver>>]) -> RunOutcome
    where
        F: DriverFactory,
    {
        let clock = Stopwatch::start();
        info!("Starting dashboard run: {} steps", steps.len() + 1);

        let init_op = Operation::new(WEBDRIVER_INIT, Category::WebdriverInit);
        let init = self
            .executor
            .execute_default(&mut self.logger, &init_op, || factory.launch())
            .await;

        let mut summaries = vec![StepSummary {
            name: WEBDRIVER_INIT.to_string(),
            state: init.outcome().into(),
            attempts: init.attempts(),
            duration_seconds: init.record.duration_seconds,
            error: init.failure_reason(),
            evidence: None,
        }];
        self.logger
            .record_step(WEBDRIVER_INIT, summaries[0].state.is_success());

        let Some(driver) = init.value else {
            error!("Browser could not be acquired, aborting run");
            summaries.extend(steps.iter().map(|s| pending(&s.operation().name)));
            return self.finish(summaries, true, clock).await;
        };

        let looped = AssertUnwindSafe(self.run_steps(&driver, steps, &mut summaries))
            .catch_unwind()
            .await;

        let panic = match looped {
            Ok(()) => None,
            Err(payload) => {
                let done = summaries.len() - 1;
                if let Some(step) = steps.get(done) {
                    let name = step.operation().name;
                    let reason = panic_message(payload.as_ref());
                    error!("Step {} panicked", name);
                    let evidence = self
                        .evidence
                        .capture_on_failure(&driver, &mut self.logger, &name, &reason)
                        .await;
                    self.logger.record_step(&name, false);
                    summaries.push(StepSummary {
                        name,
                        state: StepState::Failed,
                        attempts: 1,
                        duration_seconds: 0.0,
                        error: Some(reason),
                        evidence,
                    });
                }
                summaries.extend(steps.iter().skip(done + 1).map(|s| pending(&s.operation().name)));
                Some(payload)
            }
        };

        if let Err(e) = driver.close().await {
            self.logger.record(
                Level::Warning,
                format!("closing browser failed: {}", e),
                Metadata::new(),
            );
        }

        let outcome = self.finish(summaries, false, clock).await;
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        outcome
    }

    async fn run_steps<D: BrowserDriver>(
        &mut self,
        driver: &D,
        steps: &[Box<dyn Step<D>>],
        summaries: &mut Vec<StepSummary>,
    ) {
        for step in steps {
            let summary = self.run_step(driver, step.as_ref()).await;
            summaries.push(summary);
        }
    }

    async fn run_step<D: BrowserDriver>(&mut self, driver: &D, step: &dyn Step<D>) -> StepSummary {
        let operation = step.operation();
        let mut tags = operation.metadata.clone();
        tags.insert("state".to_string(), StepState::Running.as_str().to_string());
        self.logger
            .record(Level::Info, format!("Step {} started", operation.name), tags);

        let execution = self
            .executor
            .execute_default(&mut self.logger, &operation, || step.run(driver))
            .await;

        let state = StepState::from(execution.outcome());
        let error = execution.failure_reason();

        if let Some(details) = execution.value.as_ref().filter(|m| !m.is_empty()) {
            self.logger.record(
                Level::Info,
                format!("{} details", operation.name),
                details.clone(),
            );
        }

        let evidence = match state {
            StepState::Failed => {
                let reason = error.as_deref().unwrap_or("failed");
                self.evidence
                    .capture_on_failure(driver, &mut self.logger, &operation.name, reason)
                    .await
            }
            _ => {
                self.evidence
                    .capture_success(driver, &mut self.logger, &operation.name)
                    .await
            }
        };

        self.logger.record_step(&operation.name, state.is_success());
        StepSummary {
            name: operation.name,
            state,
            attempts: execution.record.attempt_number,
            duration_seconds: execution.record.duration_seconds,
            error,
            evidence,
        }
    }

    async fn finish(
        mut self,
        steps: Vec<StepSummary>,
        aborted: bool,
        clock: Stopwatch,
    ) -> RunOutcome {
        let summary = RunSummary::from_steps(steps, self.success_cutoff, aborted, clock.elapsed_secs());
        let verdict = if summary.success { "SUCCESS" } else { "FAILURE" };
        self.logger.record(
            if summary.success { Level::Info } else { Level::Error },
            format!(
                "Run finished: {} ({}/{} steps passed or warned, {:.1}% vs cutoff {:.1}%)",
                verdict,
                summary.passed + summary.warned,
                summary.total,
                summary.pass_fraction * 100.0,
                summary.success_cutoff * 100.0
            ),
            Metadata::new(),
        );
        self.logger.finish(summary.clone());

        let mut reports = Vec::new();
        for sink in &self.sinks {
            match sink.write(self.logger.session()) {
                Ok(path) => reports.push(path),
                Err(e) => {
                    warn!("Report sink {} failed: {}", sink.name(), e);
                    let mut metadata = Metadata::new();
                    metadata.insert("error_kind".to_string(), "io_failure".to_string());
                    metadata.insert("sink".to_string(), sink.name().to_string());
                    self.logger.record(
                        Level::Warning,
                        format!("report sink {} failed: {}", sink.name(), e),
                        metadata,
                    );
                }
            }
        }
        self.logger.flush_session();

        let text_log = self.logger.text_path().map(PathBuf::from);
        let machine_log = self.logger.machine_path().map(PathBuf::from);
        RunOutcome {
            summary,
            session: self.logger.into_session(),
            reports,
            text_log,
            machine_log,
        }
    }
}

fn pending(name: &str) -> StepSummary {
    StepSummary {
        name: name.to_string(),
        state: StepState::Pending,
        attempts: 0,
        duration_seconds: 0.0,
        error: None,
        evidence: None,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("step panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("step panicked: {}", s)
    } else {
        "step panicked".to_string()
    }
}

/// Run the full dashboard plan in Chrome using an already validated `config`
pub async fn run_dashboard(config: &RunnerConfig) -> E2eResult<RunOutcome> {
    let steps = dashboard::plan(config)?;
    let launcher = ChromiumLauncher::new(config.browser.clone());
    let orchestrator = Orchestrator::from_config(config);
    Ok(orchestrator.run(&launcher, &dashboard::boxed(steps)).await)
}
