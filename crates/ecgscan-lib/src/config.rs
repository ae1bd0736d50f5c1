use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Moving-average window in samples.
pub const WINDOW_SIZE: usize = 5;
/// Peaks must exceed this fraction of the filtered maximum.
pub const PEAK_THRESHOLD_RATIO: f64 = 0.6;
/// RR intervals further than this many standard deviations from the mean are anomalous.
pub const DETECTION_SIGMA: f64 = 2.0;
/// Deviation, in standard deviations, at which the anomaly score saturates at 1.0.
pub const SATURATION_SIGMA: f64 = 3.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunable policy of the smoothing → peaks → rhythm pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Trailing moving-average window (samples).
    pub window: usize,
    /// Relative amplitude threshold for peak picking.
    pub peak_threshold_ratio: f64,
    /// Detection bound in standard deviations.
    pub detection_sigma: f64,
    /// Score saturation point in standard deviations.
    pub saturation_sigma: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window: WINDOW_SIZE,
            peak_threshold_ratio: PEAK_THRESHOLD_RATIO,
            detection_sigma: DETECTION_SIGMA,
            saturation_sigma: SATURATION_SIGMA,
        }
    }
}

/// Per-field overrides, typically collected from command-line flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigOverrides {
    pub window: Option<usize>,
    pub peak_threshold_ratio: Option<f64>,
    pub detection_sigma: Option<f64>,
    pub saturation_sigma: Option<f64>,
}

impl AnalyzerConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(window) = overrides.window {
            self.window = window;
        }
        if let Some(ratio) = overrides.peak_threshold_ratio {
            self.peak_threshold_ratio = ratio;
        }
        if let Some(sigma) = overrides.detection_sigma {
            self.detection_sigma = sigma;
        }
        if let Some(sigma) = overrides.saturation_sigma {
            self.saturation_sigma = sigma;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::Invalid("window must be at least 1".into()));
        }
        if !self.peak_threshold_ratio.is_finite() {
            return Err(ConfigError::Invalid(
                "peak_threshold_ratio must be finite".into(),
            ));
        }
        if !(self.detection_sigma.is_finite() && self.detection_sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "detection_sigma must be positive, got {}",
                self.detection_sigma
            )));
        }
        if !(self.saturation_sigma.is_finite() && self.saturation_sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "saturation_sigma must be positive, got {}",
                self.saturation_sigma
            )));
        }
        Ok(())
    }
}
