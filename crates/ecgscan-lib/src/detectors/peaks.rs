use crate::signal::{Events, TimeSeries};

/// Pick local maxima of an already-smoothed series.
///
/// An interior index `i` is a peak when `data[i]` exceeds `threshold_ratio`
/// times the series maximum and is strictly greater than both neighbours.
/// Plateaus never qualify and the first and last samples are never peaks.
pub fn detect_peaks(data: &[f64], threshold_ratio: f64) -> Events {
    if data.len() < 3 {
        return Events::default();
    }
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = max * threshold_ratio;

    let indices = (1..data.len() - 1)
        .filter(|&i| data[i] > threshold && data[i] > data[i - 1] && data[i] > data[i + 1])
        .collect();
    Events::from_indices(indices)
}

/// Peak detection gated on a usable time axis: series without one yield no beats.
pub fn detect_beats(filtered: &TimeSeries, threshold_ratio: f64) -> Events {
    if filtered.is_empty() || !filtered.has_time_axis() {
        return Events::default();
    }
    detect_peaks(&filtered.data, threshold_ratio)
}
