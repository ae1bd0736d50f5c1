use crate::signal::TimeSeries;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Invalid JSON payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Analysis request as sent by the calling process.
///
/// Both fields are optional. `sampling_rate` is kept as the JSON number it
/// arrived as so the response can echo it back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub data_points: Vec<f64>,
    #[serde(default = "zero_rate")]
    pub sampling_rate: Number,
}

fn zero_rate() -> Number {
    Number::from(0u8)
}

impl Default for AnalyzeRequest {
    fn default() -> Self {
        Self {
            data_points: Vec::new(),
            sampling_rate: zero_rate(),
        }
    }
}

impl AnalyzeRequest {
    pub fn from_json_str(text: &str) -> Result<Self, PayloadError> {
        Self::from_json_slice(text.as_bytes())
    }

    /// Decode raw payload bytes. Invalid UTF-8 is a decode failure like any
    /// other. Repeated keys are legal JSON and the last occurrence wins.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Build a request from an already-loaded series, e.g. a decoded WAV file.
    pub fn from_series(ts: TimeSeries) -> Self {
        Self {
            sampling_rate: rate_number(ts.fs),
            data_points: ts.data,
        }
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        self.sampling_rate.as_f64().unwrap_or(0.0)
    }

    pub fn to_series(&self) -> TimeSeries {
        TimeSeries::new(self.sampling_rate_hz(), self.data_points.clone())
    }
}

/// Whole rates become JSON integers, everything else a float.
pub(crate) fn rate_number(fs: f64) -> Number {
    if fs.fract() == 0.0 && fs >= 0.0 && fs <= u32::MAX as f64 {
        Number::from(fs as u32)
    } else {
        Number::from_f64(fs).unwrap_or_else(zero_rate)
    }
}
