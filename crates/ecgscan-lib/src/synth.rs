use crate::signal::TimeSeries;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Parameters of a synthetic single-lead spike train.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeTrainSpec {
    /// Sampling rate (Hz).
    pub fs: f64,
    /// Number of beats.
    pub beats: usize,
    /// Nominal RR interval (seconds).
    pub rr_s: f64,
    /// Uniform RR jitter amplitude (seconds), drawn from a seeded generator.
    pub jitter_s: f64,
    pub seed: u64,
    /// Gaussian R-wave width (seconds).
    pub width_s: f64,
    pub amplitude: f64,
    /// Slow sinusoidal baseline amplitude.
    pub baseline: f64,
    /// Stretch the interval following beat `k` by the given factor.
    pub stretch: Option<(usize, f64)>,
}

impl Default for SpikeTrainSpec {
    fn default() -> Self {
        Self {
            fs: 100.0,
            beats: 10,
            rr_s: 0.8,
            jitter_s: 0.0,
            seed: 0,
            width_s: 0.02,
            amplitude: 1.0,
            baseline: 0.0,
            stretch: None,
        }
    }
}

/// Sample indices of each beat. Beats sit exactly on samples so R-waves stay symmetric.
pub fn beat_indices(spec: &SpikeTrainSpec) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut beats = Vec::with_capacity(spec.beats);
    let mut t = 0.5;
    for k in 0..spec.beats {
        beats.push((t * spec.fs).round() as usize);
        let mut rr = spec.rr_s;
        if spec.jitter_s > 0.0 {
            rr += rng.gen_range(-spec.jitter_s..=spec.jitter_s);
        }
        if let Some((at, factor)) = spec.stretch {
            if at == k {
                rr *= factor;
            }
        }
        t += rr.max(0.0);
    }
    beats
}

pub fn spike_train(spec: &SpikeTrainSpec) -> TimeSeries {
    let beats = beat_indices(spec);
    let tail = (spec.fs * 0.5).round() as usize;
    let samples = beats.last().map(|&b| b + tail).unwrap_or(0);
    let width = (spec.width_s * spec.fs).max(f64::EPSILON);
    let reach = (width * 6.0).ceil() as usize;

    let mut data: Vec<f64> = (0..samples)
        .map(|i| spec.baseline * (2.0 * PI * 0.3 * i as f64 / spec.fs).sin())
        .collect();
    for &b in &beats {
        let lo = b.saturating_sub(reach);
        let hi = (b + reach).min(samples.saturating_sub(1));
        for (i, value) in data.iter_mut().enumerate().take(hi + 1).skip(lo) {
            let d = (i as f64 - b as f64) / width;
            *value += spec.amplitude * (-0.5 * d * d).exp();
        }
    }
    TimeSeries::new(spec.fs, data)
}
