use crate::{
    config::AnalyzerConfig,
    signal::{Events, RRSeries},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Time window between two beats whose RR interval is a statistical outlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub start_time: f64,
    pub end_time: f64,
    /// Severity in `[0, 1]`.
    pub score: f64,
}

/// Mean and population standard deviation of an RR series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RhythmStats {
    pub n: usize,
    pub mean_rr: f64,
    pub std_rr: f64,
}

pub fn rhythm_stats(rr: &RRSeries) -> Option<RhythmStats> {
    let n = rr.len();
    if n == 0 {
        return None;
    }
    let mean_rr = rr.rr.iter().sum::<f64>() / n as f64;
    let variance = rr.rr.iter().map(|x| (x - mean_rr).powi(2)).sum::<f64>() / n as f64;
    Some(RhythmStats {
        n,
        mean_rr,
        std_rr: variance.sqrt(),
    })
}

/// Flag RR intervals deviating from the mean rhythm.
///
/// `fs` must be positive. `sample_count` is the length of the series the
/// peaks were picked from.
pub fn detect_anomalies(
    peaks: &Events,
    fs: f64,
    sample_count: usize,
    cfg: &AnalyzerConfig,
) -> Vec<Anomaly> {
    if peaks.len() < 2 {
        return Vec::new();
    }
    let rr = RRSeries::from_events(peaks, fs);
    let Some(stats) = rhythm_stats(&rr) else {
        return Vec::new();
    };
    debug!(
        "rhythm: {} intervals, mean {:.4}s, std {:.4}s",
        stats.n, stats.mean_rr, stats.std_rr
    );
    // A perfectly regular rhythm has no outliers.
    if stats.std_rr == 0.0 {
        return Vec::new();
    }

    let bound = cfg.detection_sigma * stats.std_rr;
    let saturation = cfg.saturation_sigma * stats.std_rr;
    rr.rr
        .iter()
        .enumerate()
        .filter_map(|(k, &interval)| {
            let deviation = (interval - stats.mean_rr).abs();
            if deviation <= bound {
                return None;
            }
            let start = peaks.indices[k];
            let end = interval_end_index(&peaks.indices, k, sample_count);
            Some(Anomaly {
                start_time: start as f64 / fs,
                end_time: end as f64 / fs,
                score: (deviation / saturation).min(1.0),
            })
        })
        .collect()
}

/// Sample index closing the interval that starts at peak `k`.
///
/// For every `k` an RR interval exists for, `k + 1` is a valid peak. The
/// last-sample fallback only triggers when called with the final peak.
pub(crate) fn interval_end_index(peaks: &[usize], k: usize, sample_count: usize) -> usize {
    match peaks.get(k + 1) {
        Some(&next) => next,
        None => sample_count.saturating_sub(1),
    }
}

/// Coarse severity band of an anomaly score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    High,
}

impl Severity {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Severity::High
        } else if score >= 0.5 {
            Severity::Moderate
        } else {
            Severity::Mild
        }
    }

    pub fn describe(&self, score: f64) -> String {
        match self {
            Severity::High => format!(
                "This interval is irregular with {}% likelihood.",
                (score * 100.0) as u32
            ),
            Severity::Moderate => "Irregular pattern observed.".into(),
            Severity::Mild => "Minor variation detected.".into(),
        }
    }
}
