use serde::{Deserialize, Serialize};

/// Single-lead amplitude series sampled at a uniform rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Sampling frequency in Hz. Zero or negative means the series has no usable time axis.
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: f64, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn has_time_axis(&self) -> bool {
        self.fs > 0.0
    }
    /// Recording length in seconds, 0 without a usable time axis.
    pub fn duration(&self) -> f64 {
        if self.has_time_axis() {
            self.data.len() as f64 / self.fs
        } else {
            0.0
        }
    }
}

/// Detected beats as sample indices, strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let rr = events
            .indices
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64) / fs)
            .collect();
        Self { rr }
    }
    pub fn len(&self) -> usize {
        self.rr.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}
