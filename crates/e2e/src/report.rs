//! Report sinks for the finished session

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use base64::Engine;
use dashprobe_common::{ScreenshotKind, SessionReport, StepState};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// Something that turns a session into an artifact on disk
pub trait ReportSink: Send {
    fn name(&self) -> &str;

    /// Write the report and return where it went
    fn write(&self, report: &SessionReport) -> E2eResult<PathBuf>;
}

fn stamp(report: &SessionReport) -> String {
    report.started_at.format("%Y%m%d_%H%M%S").to_string()
}

fn sink_error(sink: &str, err: impl std::fmt::Display) -> E2eError {
    E2eError::ReportSink {
        sink: sink.to_string(),
        reason: err.to_string(),
    }
}

/// Pretty JSON dump of the whole session
pub struct JsonReportSink {
    dir: PathBuf,
}

impl JsonReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ReportSink for JsonReportSink {
    fn name(&self) -> &str {
        "json"
    }

    fn write(&self, report: &SessionReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| sink_error(self.name(), e))?;

        let path = self.dir.join(format!("session_{}.json", stamp(report)));
        report.save(&path).map_err(|e| sink_error(self.name(), e))?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Standalone HTML page: summary, steps, operations and screenshots
pub struct HtmlReportSink {
    dir: PathBuf,
    embed_screenshots: bool,
}

impl HtmlReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            embed_screenshots: true,
        }
    }

    /// Inline screenshots as data URIs instead of linking to them
    pub fn embed_screenshots(mut self, embed: bool) -> Self {
        self.embed_screenshots = embed;
        self
    }

    pub fn render(&self, report: &SessionReport) -> String {
        let mut html = String::new();
        let _ = self.render_into(&mut html, report);
        html
    }

    fn render_into(&self, out: &mut String, report: &SessionReport) -> std::fmt::Result {
        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html lang=\"en\"><head><meta charset=\"utf-8\">")?;
        writeln!(out, "<title>dashprobe report {}</title>", stamp(report))?;
        writeln!(out, "<style>{}</style></head><body>", STYLE)?;
        writeln!(out, "<h1>Dashboard acceptance report</h1>")?;
        writeln!(
            out,
            "<p>Started {}{}</p>",
            report.started_at.to_rfc3339(),
            report
                .finished_at
                .map(|f| format!(", finished {}", f.to_rfc3339()))
                .unwrap_or_default()
        )?;

        if let Some(summary) = &report.summary {
            let verdict = if summary.aborted {
                "<span class=\"failed\">ABORTED</span>"
            } else if summary.success {
                "<span class=\"passed\">SUCCESS</span>"
            } else {
                "<span class=\"failed\">FAILURE</span>"
            };
            writeln!(out, "<h2>Summary: {}</h2>", verdict)?;
            writeln!(
                out,
                "<p>{} steps: {} passed, {} warned, {} failed. Pass rate {:.1}% (cutoff {:.1}%), {:.1}s total.</p>",
                summary.total,
                summary.passed,
                summary.warned,
                summary.failed,
                summary.pass_fraction * 100.0,
                summary.success_cutoff * 100.0,
                summary.duration_seconds
            )?;

            writeln!(out, "<h2>Steps</h2><table>")?;
            writeln!(
                out,
                "<tr><th>Step</th><th>State</th><th>Attempts</th><th>Duration</th><th>Error</th></tr>"
            )?;
            for step in &summary.steps {
                let class = match step.state {
                    StepState::Passed => "passed",
                    StepState::Warned => "warned",
                    StepState::Failed => "failed",
                    StepState::Pending | StepState::Running => "pending",
                };
                writeln!(
                    out,
                    "<tr><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{:.2}s</td><td>{}</td></tr>",
                    escape(&step.name),
                    class,
                    step.state,
                    step.attempts,
                    step.duration_seconds,
                    escape(step.error.as_deref().unwrap_or(""))
                )?;
            }
            writeln!(out, "</table>")?;
        }

        writeln!(out, "<h2>Operations</h2><table>")?;
        writeln!(
            out,
            "<tr><th>Operation</th><th>Category</th><th>Attempt</th><th>Duration</th><th>Outcome</th><th>Error</th></tr>"
        )?;
        for op in &report.operations {
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}s</td><td>{}</td><td>{}</td></tr>",
                escape(&op.operation_name),
                op.category,
                op.attempt_number,
                op.duration_seconds,
                op.outcome,
                escape(op.error.as_deref().unwrap_or(""))
            )?;
        }
        writeln!(out, "</table>")?;

        if !report.screenshots.is_empty() {
            writeln!(out, "<h2>Screenshots</h2>")?;
            for shot in &report.screenshots {
                let label = match shot.kind {
                    ScreenshotKind::Error => "error",
                    ScreenshotKind::Success => "success",
                };
                writeln!(
                    out,
                    "<figure><img src=\"{}\" alt=\"{}\"><figcaption>{} ({}) {}</figcaption></figure>",
                    self.image_src(&shot.path),
                    escape(&shot.operation_name),
                    escape(&shot.operation_name),
                    label,
                    escape(shot.error.as_deref().unwrap_or(""))
                )?;
            }
        }

        writeln!(out, "</body></html>")
    }

    fn image_src(&self, path: &Path) -> String {
        if self.embed_screenshots {
            match std::fs::read(path) {
                Ok(bytes) => {
                    return format!(
                        "data:image/png;base64,{}",
                        base64::engine::general_purpose::STANDARD.encode(bytes)
                    )
                }
                Err(e) => debug!("Linking {} instead of embedding: {}", path.display(), e),
            }
        }
        escape(&path.display().to_string())
    }
}

impl ReportSink for HtmlReportSink {
    fn name(&self) -> &str {
        "html"
    }

    fn write(&self, report: &SessionReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| sink_error(self.name(), e))?;

        let path = self.dir.join(format!("report_{}.html", stamp(report)));
        std::fs::write(&path, self.render(report)).map_err(|e| sink_error(self.name(), e))?;

        info!("HTML report written to: {}", path.display());
        Ok(path)
    }
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:4px 8px}\
.passed{color:#2e7d32}.warned{color:#ef6c00}.failed{color:#c62828}.pending{color:#777}\
img{max-width:640px;border:1px solid #999}";

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
