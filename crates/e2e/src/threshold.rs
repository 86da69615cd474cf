//! Duration thresholds per operation category

use std::time::Duration;

use dashprobe_common::{Category, Outcome};
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// Warn/fail boundaries in seconds. `warn_at < fail_at` must hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn_at: f64,
    pub fail_at: f64,
}

impl Thresholds {
    pub fn new(warn_at: f64, fail_at: f64) -> E2eResult<Self> {
        let thresholds = Self { warn_at, fail_at };
        thresholds.validate("thresholds")?;
        Ok(thresholds)
    }

    fn validate(&self, label: &str) -> E2eResult<()> {
        if !(self.warn_at >= 0.0 && self.warn_at < self.fail_at) {
            return Err(E2eError::InvalidConfig(format!(
                "{}: warn_at ({}) must be >= 0 and < fail_at ({})",
                label, self.warn_at, self.fail_at
            )));
        }
        Ok(())
    }

    pub fn classify(&self, duration: Duration) -> Outcome {
        let secs = duration.as_secs_f64();
        if secs >= self.fail_at {
            Outcome::Fail
        } else if secs >= self.warn_at {
            Outcome::Warning
        } else {
            Outcome::Pass
        }
    }
}

/// Thresholds per category. A category left unset always classifies as pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    #[serde(default)]
    pub page_load: Option<Thresholds>,
    #[serde(default)]
    pub action: Option<Thresholds>,
    #[serde(default)]
    pub element_wait: Option<Thresholds>,
    #[serde(default)]
    pub webdriver_init: Option<Thresholds>,
    #[serde(default)]
    pub sensor_validation: Option<Thresholds>,
    #[serde(default)]
    pub visual_validation: Option<Thresholds>,
    #[serde(default)]
    pub download_test: Option<Thresholds>,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            page_load: Some(Thresholds { warn_at: 7.0, fail_at: 10.0 }),
            action: Some(Thresholds { warn_at: 3.0, fail_at: 5.0 }),
            element_wait: Some(Thresholds { warn_at: 5.0, fail_at: 8.0 }),
            webdriver_init: Some(Thresholds { warn_at: 10.0, fail_at: 15.0 }),
            sensor_validation: Some(Thresholds { warn_at: 42.0, fail_at: 60.0 }),
            visual_validation: Some(Thresholds { warn_at: 63.0, fail_at: 90.0 }),
            download_test: Some(Thresholds { warn_at: 31.5, fail_at: 45.0 }),
        }
    }
}

impl ThresholdPolicy {
    /// A policy with no thresholds at all
    pub fn permissive() -> Self {
        Self {
            page_load: None,
            action: None,
            element_wait: None,
            webdriver_init: None,
            sensor_validation: None,
            visual_validation: None,
            download_test: None,
        }
    }

    pub fn with(mut self, category: Category, thresholds: Thresholds) -> Self {
        *self.slot_mut(category) = Some(thresholds);
        self
    }

    pub fn get(&self, category: Category) -> Option<Thresholds> {
        match category {
            Category::PageLoad => self.page_load,
            Category::Action => self.action,
            Category::ElementWait => self.element_wait,
            Category::WebdriverInit => self.webdriver_init,
            Category::SensorValidation => self.sensor_validation,
            Category::VisualValidation => self.visual_validation,
            Category::DownloadTest => self.download_test,
        }
    }

    fn slot_mut(&mut self, category: Category) -> &mut Option<Thresholds> {
        match category {
            Category::PageLoad => &mut self.page_load,
            Category::Action => &mut self.action,
            Category::ElementWait => &mut self.element_wait,
            Category::WebdriverInit => &mut self.webdriver_init,
            Category::SensorValidation => &mut self.sensor_validation,
            Category::VisualValidation => &mut self.visual_validation,
            Category::DownloadTest => &mut self.download_test,
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        for category in Category::ALL {
            if let Some(thresholds) = self.get(category) {
                thresholds.validate(&format!("thresholds.{}", category))?;
            }
        }
        Ok(())
    }

    pub fn classify(&self, category: Category, duration: Duration) -> Outcome {
        self.get(category)
            .map(|t| t.classify(duration))
            .unwrap_or(Outcome::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_classify_boundaries() {
        let policy = ThresholdPolicy::default();

        assert_eq!(policy.classify(Category::PageLoad, secs(6.99)), Outcome::Pass);
        assert_eq!(policy.classify(Category::PageLoad, secs(7.0)), Outcome::Warning);
        assert_eq!(policy.classify(Category::PageLoad, secs(9.99)), Outcome::Warning);
        assert_eq!(policy.classify(Category::PageLoad, secs(10.0)), Outcome::Fail);
        assert_eq!(policy.classify(Category::Action, secs(4.0)), Outcome::Warning);
        assert_eq!(policy.classify(Category::Action, Duration::ZERO), Outcome::Pass);
    }

    #[test]
    fn test_classify_sweep_matches_definition() {
        let t = Thresholds::new(2.5, 4.0).unwrap();
        for tenth in 0..80 {
            let d = tenth as f64 / 10.0;
            let expected = if d >= 4.0 {
                Outcome::Fail
            } else if d >= 2.5 {
                Outcome::Warning
            } else {
                Outcome::Pass
            };
            assert_eq!(t.classify(secs(d)), expected, "duration {}", d);
        }
    }

    #[test]
    fn test_multi_page_steps_get_wider_bands() {
        let policy = ThresholdPolicy::default();

        assert_eq!(policy.classify(Category::DownloadTest, secs(30.0)), Outcome::Pass);
        assert_eq!(policy.classify(Category::DownloadTest, secs(40.0)), Outcome::Warning);
        assert_eq!(policy.classify(Category::SensorValidation, secs(20.0)), Outcome::Pass);
        assert_eq!(policy.classify(Category::SensorValidation, secs(60.0)), Outcome::Fail);
        assert_eq!(policy.classify(Category::VisualValidation, secs(75.0)), Outcome::Warning);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_missing_category_is_permissive() {
        let policy = ThresholdPolicy::permissive()
            .with(Category::Action, Thresholds { warn_at: 1.0, fail_at: 2.0 });

        assert_eq!(policy.classify(Category::PageLoad, secs(600.0)), Outcome::Pass);
        assert_eq!(policy.classify(Category::Action, secs(3.0)), Outcome::Fail);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        assert!(Thresholds::new(5.0, 5.0).is_err());
        assert!(Thresholds::new(6.0, 5.0).is_err());

        let policy = ThresholdPolicy::default()
            .with(Category::ElementWait, Thresholds { warn_at: 9.0, fail_at: 8.0 });
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("thresholds.element_wait"));
    }
}
