//! dashprobe acceptance runner
//!
//! Drives a real Chrome session through the microclimate dashboard and
//! records every operation with its timing, outcome and evidence.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Orchestrator                           │
//! │    ├── webdriver_init (DriverFactory::launch)               │
//! │    ├── for each Step: Executor::execute                     │
//! │    │     ├── run_with_retry (RetryPolicy, backoff)          │
//! │    │     ├── measure (Clock)                                │
//! │    │     └── ThresholdPolicy::classify                      │
//! │    ├── EvidenceCapturer on FAIL                             │
//! │    └── ReportSink (JSON, HTML)                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StructuredLogger: text + JSONL sinks, SessionReport        │
//! │  BrowserDriver: chromiumoxide (ChromiumDriver) or stubs     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod chromium;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod driver;
pub mod error;
pub mod evidence;
pub mod executor;
pub mod logger;
pub mod report;
pub mod retry;
pub mod runner;
pub mod sensors;
pub mod threshold;

pub use chromium::{ChromiumDriver, ChromiumLauncher};
pub use config::RunnerConfig;
pub use driver::{BrowserDriver, DriverFactory, Locator, WaitCondition};
pub use error::{E2eError, E2eResult};
pub use evidence::EvidenceCapturer;
pub use executor::{Execution, Executor, Operation};
pub use logger::StructuredLogger;
pub use report::{HtmlReportSink, JsonReportSink, ReportSink};
pub use retry::{RetryPolicy, RetryTable};
pub use runner::{run_dashboard, Orchestrator, RunOutcome, Step};
pub use threshold::{ThresholdPolicy, Thresholds};
