//! Runner configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::retry::RetryTable;
use crate::threshold::ThresholdPolicy;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dashprobe.toml";

/// Everything a run needs, loaded once before the orchestrator starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub thresholds: ThresholdPolicy,

    #[serde(default)]
    pub retry: RetryTable,

    #[serde(default)]
    pub run: RunSettings,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            credentials: CredentialsConfig::default(),
            browser: BrowserSettings::default(),
            thresholds: ThresholdPolicy::default(),
            retry: RetryTable::default(),
            run: RunSettings::default(),
            output: OutputConfig::default(),
        }
    }
}

/// A station page of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Display name used in step names
    pub name: String,

    /// Path relative to `target.base_url`
    pub path: String,

    /// Whether the page is expected to carry charts
    #[serde(default)]
    pub charts: bool,

    /// Whether the page offers the password-gated download
    #[serde(default)]
    pub download: bool,
}

impl Station {
    fn new(name: &str, path: &str, charts: bool, download: bool) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            charts,
            download,
        }
    }
}

/// The dashboard under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,

    /// Substring the main page title must contain
    pub page_title: String,

    /// Navigation labels expected on the main page
    pub nav_labels: Vec<String>,

    pub stations: Vec<Station>,

    /// Time-range filter button labels
    pub time_filters: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "https://iot-fakeapi.vercel.app/".to_string(),
            page_title: "Microclimate Dashboard".to_string(),
            nav_labels: vec!["Home".to_string(), "Dashboard".to_string()],
            stations: vec![
                Station::new("Petangoran Main", "petengoran", false, false),
                Station::new("Petangoran Station 1", "petengoran/station1", true, true),
                Station::new("Petangoran Station 2", "petengoran/station2", true, false),
                Station::new("Kalimantan Main", "kalimantan", false, false),
                Station::new("Kalimantan Station 1", "kalimantan/station1", true, true),
                Station::new("Kalimantan Station 2", "kalimantan/station2", true, false),
            ],
            time_filters: vec![
                "1 Hari".to_string(),
                "7 Hari".to_string(),
                "30 Hari".to_string(),
            ],
        }
    }
}

/// Passwords for the download dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub password: String,
    pub wrong_password: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            password: "admin123".to_string(),
            wrong_password: "wrongpass".to_string(),
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,

    pub window_width: u32,
    pub window_height: u32,

    /// Pass `--no-sandbox` and `--disable-dev-shm-usage` (containers, CI)
    pub no_sandbox: bool,

    /// Explicit Chrome/Chromium binary; autodetected when unset
    pub chrome_executable: Option<PathBuf>,

    /// Where the browser saves downloads; `~/Downloads` when unset
    pub download_dir: Option<PathBuf>,

    /// Upper bound for a single element wait
    pub element_timeout_seconds: f64,

    /// Upper bound for a page load
    pub page_load_timeout_seconds: f64,

    /// How long to wait for a finished download
    pub download_timeout_seconds: f64,

    /// Polling interval for waits
    pub poll_interval_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            no_sandbox: true,
            chrome_executable: None,
            download_dir: None,
            element_timeout_seconds: 10.0,
            page_load_timeout_seconds: 30.0,
            download_timeout_seconds: 30.0,
            poll_interval_ms: 250,
        }
    }
}

impl BrowserSettings {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.element_timeout_seconds)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.page_load_timeout_seconds)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.download_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(dashprobe_common::default_download_dir)
    }
}

/// Pass criteria and evidence behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Minimum `(passed + warned) / total` for a successful run
    pub success_cutoff: f64,

    /// Minimum share of the nine sensor parameters that must be found
    pub sensor_cutoff: f64,

    /// Keep a screenshot of passing steps too
    pub screenshot_on_success: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            success_cutoff: 0.6,
            sensor_cutoff: 0.6,
            screenshot_on_success: false,
        }
    }
}

/// Output locations and enabled report sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub report_dir: PathBuf,
    pub log_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub json_report: bool,
    pub html_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("reports"),
            log_dir: PathBuf::from("logs"),
            screenshot_dir: PathBuf::from("screenshots"),
            json_report: true,
            html_report: true,
        }
    }
}

impl OutputConfig {
    /// Put every output directory under `root`
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            report_dir: root.join("reports"),
            log_dir: root.join("logs"),
            screenshot_dir: root.join("screenshots"),
            ..Self::default()
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        self.thresholds.validate()?;
        self.retry.validate()?;

        for (label, cutoff) in [
            ("run.success_cutoff", self.run.success_cutoff),
            ("run.sensor_cutoff", self.run.sensor_cutoff),
        ] {
            if !(cutoff > 0.0 && cutoff <= 1.0) {
                return Err(E2eError::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    label, cutoff
                )));
            }
        }

        for (label, secs) in [
            ("browser.element_timeout_seconds", self.browser.element_timeout_seconds),
            ("browser.page_load_timeout_seconds", self.browser.page_load_timeout_seconds),
            ("browser.download_timeout_seconds", self.browser.download_timeout_seconds),
        ] {
            if !(secs > 0.0 && secs.is_finite()) {
                return Err(E2eError::InvalidConfig(format!(
                    "{} must be > 0, got {}",
                    label, secs
                )));
            }
        }

        if self.target.base_url.trim().is_empty() {
            return Err(E2eError::InvalidConfig(
                "target.base_url must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::Thresholds;
    use dashprobe_common::Category;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.target.stations.len(), 6);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashprobe.toml");
        std::fs::write(
            &path,
            r#"
[target]
base_url = "http://localhost:3000/"
page_title = "Microclimate Dashboard"
nav_labels = ["Home"]
stations = [{ name = "Local", path = "station1", charts = true }]
time_filters = ["1 Hari"]

[thresholds.page_load]
warn_at = 2.0
fail_at = 4.0

[retry.default]
max_attempts = 1
base_delay_seconds = 0.0

[run]
success_cutoff = 0.8
sensor_cutoff = 0.6
screenshot_on_success = true
"#,
        )
        .unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.target.base_url, "http://localhost:3000/");
        assert!(!config.target.stations[0].download);
        assert_eq!(
            config.thresholds.get(Category::PageLoad),
            Some(Thresholds { warn_at: 2.0, fail_at: 4.0 })
        );
        assert_eq!(config.thresholds.action, None);
        assert_eq!(config.retry.default.max_attempts, 1);
        assert!(config.retry.default.is_retryable(dashprobe_common::ErrorKind::Timeout));
        assert_eq!(config.browser, BrowserSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dashprobe.toml");
        let mut config = RunnerConfig::default();
        config.run.success_cutoff = 0.75;
        config.save(&path).unwrap();
        assert_eq!(RunnerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RunnerConfig::default();
        config.thresholds.page_load = Some(Thresholds { warn_at: 10.0, fail_at: 7.0 });
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.run.success_cutoff = 0.0;
        assert!(config.validate().unwrap_err().to_string().contains("run.success_cutoff"));

        let mut config = RunnerConfig::default();
        config.browser.element_timeout_seconds = 0.0;
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.retry.default.base_delay_seconds = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashprobe.toml");
        std::fs::write(&path, "[run\nsuccess_cutoff = ").unwrap();
        assert!(matches!(RunnerConfig::load(&path), Err(E2eError::ConfigParse(_))));
    }
}
