use std::path::Path;

use serde::{Deserialize, Serialize};

/// Named record of the algorithmic constants governing the rate
/// estimator and the scheduler. Threaded explicitly through the
/// functions that need it rather than read from a global, so that
/// every estimate or tick is reproducible from its arguments alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub lead_factor: f64,
    pub alpha: f64,
    pub min_interval_hours: f64,
    pub max_interval_hours: f64,
    pub default_interval_hours: f64,
    pub sample_size: usize,
    pub tick_ms: u64,
    pub concurrency: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            lead_factor: 0.6,
            alpha: 0.3,
            min_interval_hours: 0.25,
            max_interval_hours: 24.0,
            default_interval_hours: 1.0,
            sample_size: 20,
            tick_ms: 60_000,
            concurrency: 5,
        }
    }
}

impl EstimatorConfig {
    /// Loads an override file if present, falling back to defaults on
    /// any read or parse failure. A partial file (missing fields) is
    /// filled in from the default via `#[serde(default)]` on every
    /// field of the on-disk representation.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawOverride>(&contents) {
                Ok(raw) => raw.into_config(),
                Err(err) => {
                    tracing::warn!(?err, path = %path.display(), "ignoring malformed estimator config override");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOverride {
    #[serde(default)]
    lead_factor: Option<f64>,
    #[serde(default)]
    alpha: Option<f64>,
    #[serde(default)]
    min_interval_hours: Option<f64>,
    #[serde(default)]
    max_interval_hours: Option<f64>,
    #[serde(default)]
    default_interval_hours: Option<f64>,
    #[serde(default)]
    sample_size: Option<usize>,
    #[serde(default)]
    tick_ms: Option<u64>,
    #[serde(default)]
    concurrency: Option<usize>,
}

impl RawOverride {
    fn into_config(self) -> EstimatorConfig {
        let default = EstimatorConfig::default();
        EstimatorConfig {
            lead_factor: self.lead_factor.unwrap_or(default.lead_factor),
            alpha: self.alpha.unwrap_or(default.alpha),
            min_interval_hours: self.min_interval_hours.unwrap_or(default.min_interval_hours),
            max_interval_hours: self.max_interval_hours.unwrap_or(default.max_interval_hours),
            default_interval_hours: self
                .default_interval_hours
                .unwrap_or(default.default_interval_hours),
            sample_size: self.sample_size.unwrap_or(default.sample_size),
            tick_ms: self.tick_ms.unwrap_or(default.tick_ms),
            concurrency: self.concurrency.unwrap_or(default.concurrency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = EstimatorConfig::default();
        assert_eq!(cfg.lead_factor, 0.6);
        assert_eq!(cfg.alpha, 0.3);
        assert_eq!(cfg.min_interval_hours, 0.25);
        assert_eq!(cfg.max_interval_hours, 24.0);
        assert_eq!(cfg.default_interval_hours, 1.0);
        assert_eq!(cfg.sample_size, 20);
        assert_eq!(cfg.tick_ms, 60_000);
        assert_eq!(cfg.concurrency, 5);
    }

    #[test]
    fn from_file_falls_back_to_default_when_missing() {
        let cfg = EstimatorConfig::from_file(Path::new("/nonexistent/estimator.json"));
        assert_eq!(cfg, EstimatorConfig::default());
    }

    #[test]
    fn from_file_applies_partial_override() {
        let dir = std::env::temp_dir().join(format!("feedwatch-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("estimator.json");
        std::fs::write(&path, r#"{"min_interval_hours": 0.5}"#).unwrap();

        let cfg = EstimatorConfig::from_file(&path);
        assert_eq!(cfg.min_interval_hours, 0.5);
        assert_eq!(cfg.alpha, EstimatorConfig::default().alpha);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
