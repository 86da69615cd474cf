//! The microclimate dashboard acceptance plan
//!
//! [`plan`] expands a [`RunnerConfig`] into the ordered step list: open the
//! dashboard, verify the main page, visit every station, check sensor
//! completeness and chart rendering, exercise each time filter and finally
//! the password-protected download.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashprobe_common::{Category, Metadata, StepError};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{RunnerConfig, Station};
use crate::driver::{click_locator, require, BrowserDriver, WaitCondition};
use crate::error::E2eResult;
use crate::executor::Operation;
use crate::runner::Step;
use crate::sensors::{Sensor, SensorExtractor, SensorReadings};

/// XPath/CSS locators for the dashboard markup
pub mod locators {
    use crate::driver::Locator;

    pub fn body() -> Locator {
        Locator::css("body")
    }

    /// Any element whose own text contains `label`
    pub fn labelled(label: &str) -> Locator {
        Locator::xpath(format!("//*[contains(text(), '{}')]", label))
    }

    pub fn loading() -> Locator {
        Locator::xpath("//*[contains(@class, 'loading') or contains(@class, 'spinner')]")
    }

    pub fn canvas() -> Locator {
        Locator::css("canvas")
    }

    pub fn svg() -> Locator {
        Locator::css("svg")
    }

    pub fn chart_container() -> Locator {
        Locator::xpath(
            "//div[contains(@class, 'chart') or contains(@class, 'graph')] \
             | //div[contains(@id, 'chart')] | //div[contains(@id, 'graph')]",
        )
    }

    pub fn download_trigger() -> Locator {
        Locator::xpath(
            "//*[contains(text(), 'Download') or contains(text(), 'download') or contains(text(), 'Unduh')]",
        )
    }

    pub fn modal() -> Locator {
        Locator::xpath(
            "//*[contains(@class, 'modal') or contains(@class, 'popup') or contains(@class, 'dialog')]",
        )
    }

    pub fn password_input() -> Locator {
        Locator::xpath(
            "//input[@type='password' or contains(@placeholder, 'password') or contains(@name, 'password')]",
        )
    }

    pub fn submit() -> Locator {
        Locator::xpath(
            "//*[contains(text(), 'Submit') or contains(text(), 'Confirm') or contains(text(), 'OK') or @type='submit']",
        )
    }

    pub fn error_message() -> Locator {
        Locator::xpath(
            "//*[contains(text(), 'error') or contains(text(), 'Error') or contains(text(), 'salah') or contains(text(), 'wrong')]",
        )
    }
}

/// What a dashboard step checks
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    OpenDashboard,
    VerifyMainPage,
    VisitStation(Station),
    ValidateSensors,
    ValidateVisuals,
    TimeFilter(String),
    DownloadWithPassword,
}

impl Check {
    pub fn name(&self) -> String {
        match self {
            Check::OpenDashboard => "open_dashboard".to_string(),
            Check::VerifyMainPage => "verify_main_page".to_string(),
            Check::VisitStation(station) => format!("visit_station:{}", station.name),
            Check::ValidateSensors => "validate_sensors".to_string(),
            Check::ValidateVisuals => "validate_visuals".to_string(),
            Check::TimeFilter(label) => format!("time_filter:{}", label),
            Check::DownloadWithPassword => "download_with_password".to_string(),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Check::OpenDashboard | Check::VisitStation(_) => Category::PageLoad,
            Check::VerifyMainPage => Category::ElementWait,
            Check::ValidateSensors => Category::SensorValidation,
            Check::ValidateVisuals => Category::VisualValidation,
            Check::TimeFilter(_) => Category::Action,
            Check::DownloadWithPassword => Category::DownloadTest,
        }
    }
}

struct PlanContext {
    config: RunnerConfig,
    extractor: SensorExtractor,
}

/// One planned step bound to the shared run context
pub struct DashboardStep {
    check: Check,
    ctx: Arc<PlanContext>,
}

impl DashboardStep {
    pub fn check(&self) -> &Check {
        &self.check
    }
}

/// Expand `config` into the ordered dashboard steps
pub fn plan(config: &RunnerConfig) -> E2eResult<Vec<DashboardStep>> {
    let ctx = Arc::new(PlanContext {
        config: config.clone(),
        extractor: SensorExtractor::new()?,
    });

    let target = &config.target;
    let mut checks = vec![Check::OpenDashboard, Check::VerifyMainPage];
    checks.extend(target.stations.iter().cloned().map(Check::VisitStation));
    checks.push(Check::ValidateSensors);
    checks.push(Check::ValidateVisuals);
    checks.extend(target.time_filters.iter().cloned().map(Check::TimeFilter));
    checks.push(Check::DownloadWithPassword);

    Ok(checks
        .into_iter()
        .map(|check| DashboardStep {
            check,
            ctx: Arc::clone(&ctx),
        })
        .collect())
}

/// Box planned steps for the orchestrator
pub fn boxed<D: BrowserDriver>(steps: Vec<DashboardStep>) -> Vec<Box<dyn Step<D>>> {
    steps
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn Step<D>>)
        .collect()
}

#[async_trait]
impl<D: BrowserDriver> Step<D> for DashboardStep {
    fn operation(&self) -> Operation {
        let op = Operation::new(self.check.name(), self.check.category());
        match &self.check {
            Check::VisitStation(station) => op
                .with_meta("station", station.name.as_str())
                .with_meta("path", station.path.as_str()),
            Check::TimeFilter(label) => op.with_meta("label", label.as_str()),
            Check::OpenDashboard => op.with_meta("url", self.ctx.config.target.base_url.as_str()),
            _ => op,
        }
    }

    async fn run(&self, driver: &D) -> Result<Metadata, StepError> {
        let ctx = self.ctx.as_ref();
        match &self.check {
            Check::OpenDashboard => open_dashboard(driver, ctx).await,
            Check::VerifyMainPage => verify_main_page(driver, ctx).await,
            Check::VisitStation(station) => visit_station(driver, ctx, station).await,
            Check::ValidateSensors => validate_sensors(driver, ctx).await,
            Check::ValidateVisuals => validate_visuals(driver, ctx).await,
            Check::TimeFilter(label) => time_filter(driver, ctx, label).await,
            Check::DownloadWithPassword => download_with_password(driver, ctx).await,
        }
    }
}

async fn wait_for_body<D: BrowserDriver>(driver: &D, ctx: &PlanContext) -> Result<(), StepError> {
    let timeout = ctx.config.browser.page_load_timeout();
    driver
        .wait_until(&WaitCondition::Present(locators::body()), timeout)
        .await?;
    driver.wait_until(&WaitCondition::DocumentReady, timeout).await
}

async fn open_dashboard<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
) -> Result<Metadata, StepError> {
    let url = &ctx.config.target.base_url;
    driver.open(url).await?;
    wait_for_body(driver, ctx).await?;
    info!("Dashboard opened: {}", url);
    Ok(Metadata::new())
}

async fn verify_main_page<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
) -> Result<Metadata, StepError> {
    let timeout = ctx.config.browser.element_timeout();
    for label in &ctx.config.target.nav_labels {
        require(driver, &locators::labelled(label), timeout).await?;
        debug!("Navigation label '{}' present", label);
    }

    let expected = &ctx.config.target.page_title;
    let title = driver.title().await?;
    if !title.contains(expected.as_str()) {
        return Err(StepError::assertion(format!(
            "title '{}' does not contain '{}'",
            title, expected
        )));
    }

    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), title);
    Ok(metadata)
}

async fn load_station<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
    station: &Station,
) -> Result<(), StepError> {
    driver.navigate(&station.path).await?;
    wait_for_body(driver, ctx).await
}

async fn visit_station<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
    station: &Station,
) -> Result<Metadata, StepError> {
    load_station(driver, ctx, station).await?;

    let source = driver.page_source().await?.to_lowercase();
    if source.contains("404") || source.contains("not found") {
        return Err(StepError::assertion(format!(
            "{} is not available (404)",
            station.name
        )));
    }
    info!("{} loaded", station.name);
    Ok(Metadata::new())
}

async fn validate_sensors<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
) -> Result<Metadata, StepError> {
    let mut readings: Option<SensorReadings> = None;
    let mut last_error = None;

    for station in &ctx.config.target.stations {
        if let Err(e) = load_station(driver, ctx, station).await {
            warn!("Skipping {} for sensor data: {}", station.name, e);
            last_error = Some(e);
            continue;
        }
        let found = ctx.extractor.extract(&driver.page_source().await?);
        debug!("{}: {} sensor values", station.name, found.found());
        readings
            .get_or_insert_with(Default::default)
            .merge(found);
    }

    let readings = match (readings, last_error) {
        (Some(readings), _) => readings,
        (None, Some(err)) => return Err(err),
        (None, None) => return Err(StepError::assertion("no stations configured")),
    };

    let found = readings.found();
    let total = Sensor::ALL.len();
    let cutoff = ctx.config.run.sensor_cutoff;
    info!(
        "Sensor completeness: {}/{} ({:.1}%)",
        found,
        total,
        readings.completeness() * 100.0
    );

    if readings.completeness() < cutoff {
        let missing: Vec<&str> = readings.missing().iter().map(|s| s.label()).collect();
        return Err(StepError::assertion(format!(
            "found {}/{} sensor parameters, need {:.0}% (missing: {})",
            found,
            total,
            cutoff * 100.0,
            missing.join(", ")
        )));
    }

    let mut metadata = readings.to_metadata();
    metadata.insert("found".to_string(), format!("{}/{}", found, total));
    Ok(metadata)
}

async fn validate_visuals<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
) -> Result<Metadata, StepError> {
    let mut metadata = Metadata::new();
    let mut rendering = 0;

    for station in ctx.config.target.stations.iter().filter(|s| s.charts) {
        if let Err(e) = load_station(driver, ctx, station).await {
            warn!("Skipping {} for charts: {}", station.name, e);
            metadata.insert(station.name.clone(), format!("unavailable: {}", e));
            continue;
        }

        let canvas = driver.count(&locators::canvas()).await?;
        let svg = driver.count(&locators::svg()).await?;
        let containers = driver.count(&locators::chart_container()).await?;
        if canvas + svg + containers > 0 {
            rendering += 1;
        }
        metadata.insert(
            station.name.clone(),
            format!("canvas={} svg={} containers={}", canvas, svg, containers),
        );
    }

    if rendering == 0 {
        return Err(StepError::assertion("no station shows chart elements"));
    }
    info!("Charts rendered on {} station(s)", rendering);
    Ok(metadata)
}

async fn time_filter<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
    label: &str,
) -> Result<Metadata, StepError> {
    let timeout = ctx.config.browser.element_timeout();
    click_locator(driver, &locators::labelled(label), timeout).await?;
    driver
        .wait_until(&WaitCondition::Absent(locators::loading()), timeout)
        .await?;
    info!("Filter '{}' applied", label);
    Ok(Metadata::new())
}

async fn submit_password<D: BrowserDriver>(
    driver: &D,
    password: &str,
    timeout: Duration,
) -> Result<(), StepError> {
    let input = require(driver, &locators::password_input(), timeout).await?;
    driver.fill(&input, password).await?;
    click_locator(driver, &locators::submit(), timeout).await
}

async fn download_with_password<D: BrowserDriver>(
    driver: &D,
    ctx: &PlanContext,
) -> Result<Metadata, StepError> {
    let browser = &ctx.config.browser;
    let timeout = browser.element_timeout();

    if let Some(station) = ctx.config.target.stations.iter().find(|s| s.download) {
        load_station(driver, ctx, station).await?;
    }

    let modal = async {
        click_locator(driver, &locators::download_trigger(), timeout).await?;
        driver
            .wait_until(&WaitCondition::Present(locators::modal()), timeout)
            .await
    }
    .await;

    let rejected = async {
        submit_password(driver, &ctx.config.credentials.wrong_password, timeout).await?;
        driver
            .wait_until(&WaitCondition::Present(locators::error_message()), timeout)
            .await
    }
    .await;

    let download_dir = browser.download_dir();
    let since = SystemTime::now();
    let downloaded = async {
        submit_password(driver, &ctx.config.credentials.password, timeout).await?;
        wait_for_download(
            &download_dir,
            since,
            browser.download_timeout(),
            browser.poll_interval(),
        )
        .await
    }
    .await;

    let checks = [
        ("modal", modal.map(|()| "passed".to_string())),
        ("wrong_password", rejected.map(|()| "passed".to_string())),
        (
            "download",
            downloaded.map(|path| format!("passed: {}", path.display())),
        ),
    ];

    let mut metadata = Metadata::new();
    let mut passed = 0;
    for (check, result) in checks {
        let value = match result {
            Ok(value) => {
                passed += 1;
                value
            }
            Err(e) => {
                warn!("Download check {} failed: {}", check, e);
                format!("failed: {}", e)
            }
        };
        metadata.insert(check.to_string(), value);
    }

    info!("Download checks: {}/3 passed", passed);
    if passed < 2 {
        return Err(StepError::assertion(format!(
            "only {}/3 download checks passed",
            passed
        )));
    }
    Ok(metadata)
}

fn is_export(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("csv") | Some("json")
    )
}

fn in_progress(path: &Path) -> bool {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".crdownload");
    Path::new(&partial).exists()
}

/// A `.csv`/`.json` export in `dir` modified at or after `since` that Chrome
/// has finished writing
pub fn find_fresh_download(dir: &Path, since: SystemTime) -> Option<PathBuf> {
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_export(entry.path()))
        .filter(|entry| !in_progress(entry.path()))
        .filter(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map_or(false, |modified| modified >= since)
        })
        .map(|entry| entry.into_path())
        .next()
}

/// Poll `dir` until [`find_fresh_download`] yields a file or `timeout` elapses
pub async fn wait_for_download(
    dir: &Path,
    since: SystemTime,
    timeout: Duration,
    poll: Duration,
) -> Result<PathBuf, StepError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(path) = find_fresh_download(dir, since) {
            info!("Downloaded {}", path.display());
            return Ok(path);
        }
        if Instant::now() >= deadline {
            return Err(StepError::timeout(format!(
                "no fresh .csv/.json in {} within {:.0}s",
                dir.display(),
                timeout.as_secs_f64()
            )));
        }
        sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::executor::Executor;
    use crate::logger::StructuredLogger;
    use dashprobe_common::{ErrorKind, Outcome};

    const STATION_PAGE: &str = r#"<html><body>
        <div><h3>Timestamp</h3><span>2024-05-01 13:45:10</span></div>
        <div><h3>Temperature</h3><span>25.5 °C</span></div>
        <div><h3>Humidity</h3><span>65 %</span></div>
        <div><h3>Wind Speed</h3><span>2.3 m/s</span></div>
        <div><h3>Rain Gauge</h3><span>0.5 mm</span></div>
        <div><h3>Air Pressure</h3><span>1013 hPa</span></div>
    </body></html>"#;

    fn config(download_dir: &Path) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.browser.download_dir = Some(download_dir.to_path_buf());
        config.browser.download_timeout_seconds = 2.0;
        config
    }

    fn step(config: &RunnerConfig, name: &str) -> DashboardStep {
        plan(config)
            .unwrap()
            .into_iter()
            .find(|s| s.check().name() == name)
            .unwrap()
    }

    fn dashboard_page() -> FakeDriver {
        FakeDriver::with_page("Microclimate Dashboard", "<html><body>ok</body></html>")
            .present(locators::body())
    }

    #[test]
    fn test_plan_order() {
        let config = RunnerConfig::default();
        let names: Vec<String> = plan(&config)
            .unwrap()
            .iter()
            .map(|s| s.check().name())
            .collect();

        assert_eq!(names.len(), 14);
        assert_eq!(names[0], "open_dashboard");
        assert_eq!(names[1], "verify_main_page");
        assert_eq!(names[2], "visit_station:Petangoran Main");
        assert_eq!(names[8], "validate_sensors");
        assert_eq!(names[9], "validate_visuals");
        assert_eq!(names[10], "time_filter:1 Hari");
        assert_eq!(names[13], "download_with_password");
    }

    #[test]
    fn test_categories_and_metadata() {
        let config = RunnerConfig::default();
        let steps = plan(&config).unwrap();
        let ops: Vec<Operation> = steps
            .iter()
            .map(|s| Step::<FakeDriver>::operation(s))
            .collect();

        assert_eq!(ops[1].category, Category::ElementWait);
        assert_eq!(ops[2].category, Category::PageLoad);
        assert_eq!(ops[2].metadata.get("path").map(String::as_str), Some("petengoran"));
        assert_eq!(ops[8].category, Category::SensorValidation);
        assert_eq!(ops[9].category, Category::VisualValidation);
        assert_eq!(ops[11].category, Category::Action);
        assert_eq!(ops[11].metadata.get("label").map(String::as_str), Some("7 Hari"));
        assert_eq!(ops[13].category, Category::DownloadTest);
    }

    #[tokio::test]
    async fn test_open_and_verify_main_page() {
        let config = RunnerConfig::default();
        let driver = dashboard_page()
            .present(locators::labelled("Home"))
            .present(locators::labelled("Dashboard"));

        step(&config, "open_dashboard").run(&driver).await.unwrap();
        assert_eq!(
            driver.state.lock().unwrap().visited,
            vec!["https://iot-fakeapi.vercel.app/".to_string()]
        );

        let metadata = step(&config, "verify_main_page").run(&driver).await.unwrap();
        assert_eq!(
            metadata.get("title").map(String::as_str),
            Some("Microclimate Dashboard")
        );
    }

    #[tokio::test]
    async fn test_wrong_title_is_an_assertion() {
        let config = RunnerConfig::default();
        let driver = FakeDriver::with_page("Vercel", "")
            .present(locators::labelled("Home"))
            .present(locators::labelled("Dashboard"));

        let err = step(&config, "verify_main_page").run(&driver).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AssertionMismatch);
    }

    #[tokio::test]
    async fn test_missing_station_page() {
        let config = RunnerConfig::default();
        let driver = dashboard_page().source_at(
            "https://iot-fakeapi.vercel.app/kalimantan",
            "<h1>404</h1><p>This page could not be found.</p>",
        );
        driver.open("https://iot-fakeapi.vercel.app/").await.unwrap();

        step(&config, "visit_station:Petangoran Main")
            .run(&driver)
            .await
            .unwrap();
        let err = step(&config, "visit_station:Kalimantan Main")
            .run(&driver)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AssertionMismatch);
        assert!(err.message.contains("Kalimantan Main"));
    }

    #[tokio::test]
    async fn test_sensor_completeness() {
        let config = RunnerConfig::default();
        let driver = FakeDriver::with_page("Microclimate Dashboard", STATION_PAGE)
            .present(locators::body());
        driver.open(&config.target.base_url).await.unwrap();

        let metadata = step(&config, "validate_sensors").run(&driver).await.unwrap();
        assert_eq!(metadata.get("found").map(String::as_str), Some("6/9"));
        assert_eq!(metadata.get("Wind Speed").map(String::as_str), Some("2.3"));

        let mut strict = config.clone();
        strict.run.sensor_cutoff = 0.9;
        let err = step(&strict, "validate_sensors").run(&driver).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AssertionMismatch);
        assert!(err.message.contains("Pyrano"));
    }

    #[tokio::test]
    async fn test_visuals_need_one_rendering_station() {
        let config = RunnerConfig::default();
        let blank = dashboard_page();
        blank.open(&config.target.base_url).await.unwrap();
        let err = step(&config, "validate_visuals").run(&blank).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AssertionMismatch);

        let charts = dashboard_page().count_of(locators::canvas(), 3);
        charts.open(&config.target.base_url).await.unwrap();
        let metadata = step(&config, "validate_visuals").run(&charts).await.unwrap();
        assert_eq!(
            metadata.get("Kalimantan Station 2").map(String::as_str),
            Some("canvas=3 svg=0 containers=0")
        );
    }

    #[tokio::test]
    async fn test_time_filter() {
        let config = RunnerConfig::default();
        let driver = dashboard_page().present(locators::labelled("7 Hari"));

        step(&config, "time_filter:7 Hari").run(&driver).await.unwrap();
        assert_eq!(
            driver.state.lock().unwrap().clicked,
            vec![locators::labelled("7 Hari")]
        );

        let err = step(&config, "time_filter:30 Hari")
            .run(&driver)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ElementNotFound);

        let stuck = dashboard_page()
            .present(locators::labelled("1 Hari"))
            .present(locators::loading());
        let err = step(&config, "time_filter:1 Hari").run(&stuck).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_two_of_three() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let driver = dashboard_page()
            .present(locators::download_trigger())
            .present(locators::modal())
            .present(locators::password_input())
            .present(locators::submit())
            .present(locators::error_message());
        driver.open(&config.target.base_url).await.unwrap();

        let metadata = step(&config, "download_with_password")
            .run(&driver)
            .await
            .unwrap();
        assert_eq!(metadata.get("modal").map(String::as_str), Some("passed"));
        assert_eq!(metadata.get("wrong_password").map(String::as_str), Some("passed"));
        assert!(metadata["download"].starts_with("failed: timeout"));

        let filled = driver.state.lock().unwrap().filled.clone();
        assert_eq!(filled.len(), 2);
        assert_eq!(filled[0].1, "wrongpass");
        assert_eq!(filled[1].1, "admin123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_timeout_stays_within_default_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunnerConfig::default();
        config.browser.download_dir = Some(dir.path().to_path_buf());
        let driver = dashboard_page()
            .present(locators::download_trigger())
            .present(locators::modal())
            .present(locators::password_input())
            .present(locators::submit())
            .present(locators::error_message());
        driver.open(&config.target.base_url).await.unwrap();

        let download = step(&config, "download_with_password");
        let operation = Step::<FakeDriver>::operation(&download);
        let executor = Executor::new(config.thresholds.clone(), config.retry.clone());
        let mut logger = StructuredLogger::console_only(chrono::Utc::now());
        let execution = executor
            .execute_default(&mut logger, &operation, || download.run(&driver))
            .await;

        let metadata = execution.value.as_ref().unwrap();
        assert!(metadata["download"].starts_with("failed: timeout"));
        assert!(execution.record.duration_seconds >= 30.0);
        assert_eq!(execution.outcome(), Outcome::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_without_dialog_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let driver = dashboard_page();
        driver.open(&config.target.base_url).await.unwrap();

        let err = step(&config, "download_with_password")
            .run(&driver)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AssertionMismatch);
        assert!(err.message.contains("0/3"));
    }

    #[test]
    fn test_find_fresh_download() {
        let dir = tempfile::tempdir().unwrap();
        let before = SystemTime::now() - Duration::from_secs(60);

        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("partial.csv"), "a,b").unwrap();
        std::fs::write(dir.path().join("partial.csv.crdownload"), "").unwrap();
        assert_eq!(find_fresh_download(dir.path(), before), None);

        let export = dir.path().join("iot_data.json");
        std::fs::write(&export, "[]").unwrap();
        assert_eq!(find_fresh_download(dir.path(), before), Some(export));

        let later = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(find_fresh_download(dir.path(), later), None);
    }
}
