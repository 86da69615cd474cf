//! Dual-sink structured logging and the in-memory session record
//!
//! Every entry goes to a human-readable text sink and a JSON-lines sink and is
//! mirrored to the console through `tracing`. Sink failures never reach the
//! caller: a failed write is reported on the other sink when it still works.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use dashprobe_common::{
    Metadata, OperationRecord, Outcome, RunSummary, ScreenshotRecord, SessionReport,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::E2eResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

impl From<Outcome> for Level {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Pass => Level::Info,
            Outcome::Warning => Level::Warning,
            Outcome::Fail => Level::Error,
        }
    }
}

/// A single log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl LogEntry {
    fn new(level: Level, message: String, metadata: Metadata) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message,
            metadata,
        }
    }

    fn sink_failure(sink: &str, err: &io::Error) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("sink".to_string(), sink.to_string());
        metadata.insert("error_kind".to_string(), "io_failure".to_string());
        Self::new(
            Level::Error,
            format!("{} log sink write failed: {}", sink, err),
            metadata,
        )
    }

    /// `message k=v k=v` without the timestamp and level
    fn body(&self) -> String {
        if self.metadata.is_empty() {
            return self.message.clone();
        }
        let tags: Vec<String> = self
            .metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{} {{{}}}", self.message, tags.join(", "))
    }

    pub fn to_text_line(&self) -> String {
        format!(
            "{} - {} - {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.as_str(),
            self.body()
        )
    }
}

/// One line of the machine-readable sink
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MachineRecord<'a> {
    Entry(&'a LogEntry),
    Session { report: &'a SessionReport },
}

struct Sink {
    writer: Box<dyn Write + Send>,
}

impl Sink {
    fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }
}

/// Logger instance owned by the orchestrator for the lifetime of one run
pub struct StructuredLogger {
    text: Option<Sink>,
    machine: Option<Sink>,
    text_path: Option<PathBuf>,
    machine_path: Option<PathBuf>,
    session: SessionReport,
}

impl StructuredLogger {
    /// Create `dashprobe_<ts>.log` and `dashprobe_<ts>.jsonl` under `dir`
    pub fn open(dir: &Path, started_at: DateTime<Utc>) -> E2eResult<Self> {
        std::fs::create_dir_all(dir)?;

        let stem = format!("dashprobe_{}", started_at.format("%Y%m%d_%H%M%S"));
        let text_path = dir.join(format!("{}.log", stem));
        let machine_path = dir.join(format!("{}.jsonl", stem));

        let text = BufWriter::new(File::create(&text_path)?);
        let machine = BufWriter::new(File::create(&machine_path)?);

        let mut logger = Self::with_writers(text, machine, started_at);
        logger.text_path = Some(text_path);
        logger.machine_path = Some(machine_path);
        Ok(logger)
    }

    pub fn with_writers(
        text: impl Write + Send + 'static,
        machine: impl Write + Send + 'static,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            text: Some(Sink::new(text)),
            machine: Some(Sink::new(machine)),
            text_path: None,
            machine_path: None,
            session: SessionReport::new(started_at),
        }
    }

    /// Console output only; nothing is written to disk
    pub fn console_only(started_at: DateTime<Utc>) -> Self {
        Self {
            text: None,
            machine: None,
            text_path: None,
            machine_path: None,
            session: SessionReport::new(started_at),
        }
    }

    pub fn text_path(&self) -> Option<&Path> {
        self.text_path.as_deref()
    }

    pub fn machine_path(&self) -> Option<&Path> {
        self.machine_path.as_deref()
    }

    pub fn record(&mut self, level: Level, message: impl Into<String>, metadata: Metadata) {
        let entry = LogEntry::new(level, message.into(), metadata);
        emit_console(&entry);
        self.write_text(&entry.to_text_line());
        self.write_machine(&MachineRecord::Entry(&entry));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(Level::Info, message, Metadata::new());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(Level::Warning, message, Metadata::new());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(Level::Error, message, Metadata::new());
    }

    /// Log a failed, non-terminal attempt. Text sink only; not part of the session.
    pub fn record_attempt(&mut self, record: &OperationRecord) {
        let entry = LogEntry::new(
            Level::Warning,
            format!(
                "attempt {} of {} failed after {:.2}s: {}",
                record.attempt_number,
                record.operation_name,
                record.duration_seconds,
                record.error.as_deref().unwrap_or("unknown error")
            ),
            record.metadata.clone(),
        );
        emit_console(&entry);
        self.write_text(&entry.to_text_line());
    }

    /// Log a terminal record on both sinks and keep it in the session
    pub fn record_operation(&mut self, record: OperationRecord) {
        let mut metadata = record.metadata.clone();
        metadata.insert("category".to_string(), record.category.to_string());
        metadata.insert("attempt".to_string(), record.attempt_number.to_string());
        metadata.insert(
            "duration_seconds".to_string(),
            format!("{:.3}", record.duration_seconds),
        );
        metadata.insert("outcome".to_string(), record.outcome.to_string());
        if let Some(err) = &record.error {
            metadata.insert("error".to_string(), err.clone());
        }

        let message = format!(
            "{} {} in {:.2}s (attempt {})",
            record.operation_name,
            record.outcome,
            record.duration_seconds,
            record.attempt_number
        );
        self.record(Level::from(record.outcome), message, metadata);
        self.session.operations.push(record);
    }

    pub fn record_step(&mut self, name: &str, success: bool) {
        self.session.step_results.insert(name.to_string(), success);
    }

    pub fn record_screenshot(&mut self, shot: ScreenshotRecord) {
        let mut metadata = Metadata::new();
        metadata.insert("path".to_string(), shot.path.display().to_string());
        metadata.insert("operation".to_string(), shot.operation_name.clone());
        if let Some(err) = &shot.error {
            metadata.insert("error".to_string(), err.clone());
        }
        self.record(Level::Info, "screenshot saved", metadata);
        self.session.screenshots.push(shot);
    }

    /// Stamp the session as finished with its aggregate
    pub fn finish(&mut self, summary: RunSummary) {
        self.session.finished_at = Some(Utc::now());
        self.session.summary = Some(summary);
    }

    /// Write the accumulated session as one machine-readable document
    pub fn flush_session(&mut self) {
        let report = self.session.clone();
        self.write_machine(&MachineRecord::Session { report: &report });
        let line = LogEntry::new(
            Level::Info,
            format!(
                "session flushed: {} operations, {} screenshots",
                report.operations.len(),
                report.screenshots.len()
            ),
            Metadata::new(),
        )
        .to_text_line();
        self.write_text(&line);
    }

    pub fn session(&self) -> &SessionReport {
        &self.session
    }

    pub fn into_session(self) -> SessionReport {
        self.session
    }

    fn write_text(&mut self, line: &str) {
        let Some(sink) = self.text.as_mut() else {
            return;
        };
        if let Err(e) = sink.write_line(line) {
            warn!("text log sink write failed: {}", e);
            let failure = LogEntry::sink_failure("text", &e);
            if let Some(machine) = self.machine.as_mut() {
                if let Ok(json) = serde_json::to_string(&MachineRecord::Entry(&failure)) {
                    let _ = machine.write_line(&json);
                }
            }
        }
    }

    fn write_machine(&mut self, record: &MachineRecord<'_>) {
        let Some(sink) = self.machine.as_mut() else {
            return;
        };
        let result = serde_json::to_string(record)
            .map_err(io::Error::from)
            .and_then(|json| sink.write_line(&json));
        if let Err(e) = result {
            warn!("machine log sink write failed: {}", e);
            let failure = LogEntry::sink_failure("machine", &e);
            if let Some(text) = self.text.as_mut() {
                let _ = text.write_line(&failure.to_text_line());
            }
        }
    }
}

fn emit_console(entry: &LogEntry) {
    match entry.level {
        Level::Info => info!("{}", entry.body()),
        Level::Warning => warn!("{}", entry.body()),
        Level::Error => error!("{}", entry.body()),
    }
}
