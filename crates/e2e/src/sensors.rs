//! Sensor readings scraped from station pages

use std::collections::BTreeMap;
use std::fmt;

use dashprobe_common::Metadata;
use regex::Regex;

use crate::error::E2eResult;

const NUM: &str = r"(\d+(?:\.\d+)?)";

/// The nine parameters every station is expected to publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sensor {
    Timestamp,
    Temperature,
    Humidity,
    WindDirection,
    WindSpeed,
    RainGauge,
    Pyrano,
    AirPressure,
    Watertemp,
}

impl Sensor {
    pub const ALL: [Sensor; 9] = [
        Sensor::Timestamp,
        Sensor::Temperature,
        Sensor::Humidity,
        Sensor::WindDirection,
        Sensor::WindSpeed,
        Sensor::RainGauge,
        Sensor::Pyrano,
        Sensor::AirPressure,
        Sensor::Watertemp,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Sensor::Timestamp => "Timestamp",
            Sensor::Temperature => "Temperature",
            Sensor::Humidity => "Humidity",
            Sensor::WindDirection => "Wind Direction",
            Sensor::WindSpeed => "Wind Speed",
            Sensor::RainGauge => "Rain Gauge",
            Sensor::Pyrano => "Pyrano",
            Sensor::AirPressure => "Air Pressure",
            Sensor::Watertemp => "Watertemp",
        }
    }

    /// Tried in order; the first capture group is the value.
    /// Keyed (JSON-ish) forms come before unit forms.
    fn patterns(&self) -> Vec<String> {
        let keyed = |key: &str| format!(r#"(?i)\b{}["']?\s*[:=]\s*["']?{}"#, key, NUM);
        match self {
            Sensor::Timestamp => vec![
                r"(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2})?)".to_string(),
                r#"(?i)\btime(?:stamp)?["']?\s*:\s*["']([^"']+)["']"#.to_string(),
            ],
            Sensor::Temperature => vec![
                keyed("(?:sht85_?)?temp(?:erature)?"),
                format!(r"(?i){}\s*°\s*C", NUM),
            ],
            Sensor::Humidity => vec![
                keyed("humidity"),
                format!(r"(?i)humidity\D{{0,20}}{}\s*%", NUM),
                format!(r"{}\s*%", NUM),
            ],
            Sensor::WindDirection => vec![
                keyed("wind_?dir(?:ection)?"),
                format!(r"{}\s*°(?:[^C\d]|$)", NUM),
            ],
            Sensor::WindSpeed => vec![keyed("wind_?speed"), format!(r"{}\s*m/s", NUM)],
            Sensor::RainGauge => vec![
                keyed("rain(?:_?gauge|fall)?"),
                format!(r"(?i){}\s*mm\b", NUM),
            ],
            Sensor::Pyrano => vec![
                keyed("(?:pyrano|solar)"),
                format!(r"{}\s*W/m(?:²|2)", NUM),
            ],
            Sensor::AirPressure => vec![
                keyed("air_?pressure"),
                format!(r"(?i){}\s*(?:hPa|mb)\b", NUM),
            ],
            Sensor::Watertemp => vec![
                keyed("water_?temp(?:erature)?"),
                format!(r"(?i)water\s*temp(?:erature)?\D{{0,20}}{}", NUM),
            ],
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Values found so far, first hit per sensor wins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReadings {
    values: BTreeMap<Sensor, String>,
}

impl SensorReadings {
    pub fn get(&self, sensor: Sensor) -> Option<&str> {
        self.values.get(&sensor).map(String::as_str)
    }

    pub fn found(&self) -> usize {
        self.values.len()
    }

    pub fn missing(&self) -> Vec<Sensor> {
        Sensor::ALL
            .into_iter()
            .filter(|s| !self.values.contains_key(s))
            .collect()
    }

    /// Found share of the nine parameters
    pub fn completeness(&self) -> f64 {
        self.found() as f64 / Sensor::ALL.len() as f64
    }

    pub fn merge(&mut self, other: SensorReadings) {
        for (sensor, value) in other.values {
            self.values.entry(sensor).or_insert(value);
        }
    }

    pub fn to_metadata(&self) -> Metadata {
        self.values
            .iter()
            .map(|(s, v)| (s.label().to_string(), v.clone()))
            .collect()
    }
}

/// Compiled patterns for all nine sensors
pub struct SensorExtractor {
    patterns: Vec<(Sensor, Vec<Regex>)>,
    tags: Regex,
}

impl SensorExtractor {
    pub fn new() -> E2eResult<Self> {
        let mut patterns = Vec::with_capacity(Sensor::ALL.len());
        for sensor in Sensor::ALL {
            let compiled = sensor
                .patterns()
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<Vec<_>, _>>()?;
            patterns.push((sensor, compiled));
        }
        Ok(Self {
            patterns,
            tags: Regex::new(r"<[^>]*>")?,
        })
    }

    /// Scan the page with every tag replaced by a space, so values split
    /// across elements still line up with their labels and units
    pub fn extract(&self, source: &str) -> SensorReadings {
        let text = self.tags.replace_all(source, " ");
        let mut readings = SensorReadings::default();

        for (sensor, patterns) in &self.patterns {
            let hit = patterns.iter().find_map(|re| {
                re.captures(&text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|v| !v.is_empty())
            });
            if let Some(value) = hit {
                readings.values.insert(*sensor, value);
            }
        }
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATION_MARKUP: &str = r#"
<html><body>
  <div class="card"><h3>Timestamp</h3><span>2024-05-01 13:45:10</span></div>
  <div class="card"><h3>Temperature</h3><span>25.5</span> °C</div>
  <div class="card"><h3>Humidity</h3><span>65</span> %</div>
  <div class="card"><h3>Wind Direction</h3><span>180°</span></div>
  <div class="card"><h3>Wind Speed</h3><span>2.3 m/s</span></div>
  <div class="card"><h3>Rain Gauge</h3><span>0.5 mm</span></div>
  <div class="card"><h3>Pyrano</h3><span>450 W/m²</span></div>
  <div class="card"><h3>Air Pressure</h3><span>1013 hPa</span></div>
  <div class="card"><h3>Water Temperature</h3><span>22.8</span></div>
</body></html>
"#;

    #[test]
    fn test_extracts_all_nine_from_markup() {
        let extractor = SensorExtractor::new().unwrap();
        let readings = extractor.extract(STATION_MARKUP);

        assert_eq!(readings.found(), 9, "missing: {:?}", readings.missing());
        assert_eq!(readings.get(Sensor::Timestamp), Some("2024-05-01 13:45:10"));
        assert_eq!(readings.get(Sensor::Temperature), Some("25.5"));
        assert_eq!(readings.get(Sensor::Humidity), Some("65"));
        assert_eq!(readings.get(Sensor::WindDirection), Some("180"));
        assert_eq!(readings.get(Sensor::WindSpeed), Some("2.3"));
        assert_eq!(readings.get(Sensor::RainGauge), Some("0.5"));
        assert_eq!(readings.get(Sensor::Pyrano), Some("450"));
        assert_eq!(readings.get(Sensor::AirPressure), Some("1013"));
        assert_eq!(readings.get(Sensor::Watertemp), Some("22.8"));
        assert!((readings.completeness() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_keyed_json_payload() {
        let extractor = SensorExtractor::new().unwrap();
        let source = r#"<script>window.__DATA__ = {"temp": 27.1, "humidity": 80, "watertemp": 24.0, "air_pressure": 1009.5};</script>"#;
        let readings = extractor.extract(source);

        assert_eq!(readings.get(Sensor::Temperature), Some("27.1"));
        assert_eq!(readings.get(Sensor::Humidity), Some("80"));
        assert_eq!(readings.get(Sensor::Watertemp), Some("24.0"));
        assert_eq!(readings.get(Sensor::AirPressure), Some("1009.5"));
    }

    #[test]
    fn test_watertemp_does_not_feed_temperature() {
        let extractor = SensorExtractor::new().unwrap();
        let readings = extractor.extract(r#"{"watertemp": 21.0}"#);
        assert_eq!(readings.get(Sensor::Temperature), None);
        assert_eq!(readings.get(Sensor::Watertemp), Some("21.0"));
    }

    #[test]
    fn test_merge_keeps_first_value() {
        let extractor = SensorExtractor::new().unwrap();
        let mut readings = extractor.extract("<span>2.3 m/s</span>");
        readings.merge(extractor.extract("<span>9.9 m/s</span><span>0.5 mm</span>"));

        assert_eq!(readings.get(Sensor::WindSpeed), Some("2.3"));
        assert_eq!(readings.get(Sensor::RainGauge), Some("0.5"));
        assert_eq!(readings.found(), 2);
        assert_eq!(readings.missing().len(), 7);
        assert_eq!(
            readings.to_metadata().get("Wind Speed").map(String::as_str),
            Some("2.3")
        );
    }

    #[test]
    fn test_empty_page() {
        let extractor = SensorExtractor::new().unwrap();
        let readings = extractor.extract("<html><body>Loading...</body></html>");
        assert_eq!(readings.found(), 0);
        assert_eq!(readings.completeness(), 0.0);
    }
}
