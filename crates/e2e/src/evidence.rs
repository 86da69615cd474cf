//! Screenshot evidence for failed (and optionally passed) steps

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashprobe_common::{Metadata, ScreenshotKind, ScreenshotRecord};
use tracing::debug;

use crate::driver::BrowserDriver;
use crate::logger::{Level, StructuredLogger};

pub struct EvidenceCapturer {
    dir: PathBuf,
    on_success: bool,
    last_stamp: Option<DateTime<Utc>>,
}

impl EvidenceCapturer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            on_success: false,
            last_stamp: None,
        }
    }

    /// Also keep a screenshot of every passing step
    pub fn with_success_shots(mut self, enabled: bool) -> Self {
        self.on_success = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Strictly increasing within this capturer, so names never collide
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(prev) if now <= prev => prev + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    /// `ERROR_<name>_<stamp>.png` for failures, `<name>_<stamp>.png` otherwise
    pub fn file_name(&mut self, kind: ScreenshotKind, operation_name: &str) -> String {
        let stamp = self.next_stamp().format("%Y%m%d_%H%M%S_%6f");
        let name = sanitize(operation_name);
        match kind {
            ScreenshotKind::Error => format!("ERROR_{}_{}.png", name, stamp),
            ScreenshotKind::Success => format!("{}_{}.png", name, stamp),
        }
    }

    pub async fn capture_on_failure<D>(
        &mut self,
        driver: &D,
        logger: &mut StructuredLogger,
        operation_name: &str,
        error: &str,
    ) -> Option<PathBuf>
    where
        D: BrowserDriver + ?Sized,
    {
        self.capture(
            driver,
            logger,
            operation_name,
            ScreenshotKind::Error,
            Some(error.to_string()),
        )
        .await
    }

    /// No-op unless success shots are enabled
    pub async fn capture_success<D>(
        &mut self,
        driver: &D,
        logger: &mut StructuredLogger,
        operation_name: &str,
    ) -> Option<PathBuf>
    where
        D: BrowserDriver + ?Sized,
    {
        if !self.on_success {
            return None;
        }
        self.capture(driver, logger, operation_name, ScreenshotKind::Success, None)
            .await
    }

    async fn capture<D>(
        &mut self,
        driver: &D,
        logger: &mut StructuredLogger,
        operation_name: &str,
        kind: ScreenshotKind,
        error: Option<String>,
    ) -> Option<PathBuf>
    where
        D: BrowserDriver + ?Sized,
    {
        let png = match driver.snapshot().await {
            Ok(png) => png,
            Err(e) => {
                logger.record(
                    Level::Warning,
                    format!("screenshot for {} unavailable: {}", operation_name, e),
                    secondary_failure(operation_name),
                );
                return None;
            }
        };

        let file_name = self.file_name(kind, operation_name);
        let path = self.dir.join(file_name);
        let written = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, &png).await
        }
        .await;

        if let Err(e) = written {
            logger.record(
                Level::Warning,
                format!("could not write {}: {}", path.display(), e),
                secondary_failure(operation_name),
            );
            return None;
        }

        debug!("Saved {} bytes to {}", png.len(), path.display());
        logger.record_screenshot(ScreenshotRecord {
            path: path.clone(),
            operation_name: operation_name.to_string(),
            timestamp: Utc::now(),
            kind,
            error,
        });
        Some(path)
    }
}

fn secondary_failure(operation_name: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("operation".to_string(), operation_name.to_string());
    metadata.insert("error_kind".to_string(), "io_failure".to_string());
    metadata
}

/// Keep names filesystem-safe: `visit_station:Petangoran Main` -> `visit_station_Petangoran_Main`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
