/// Trailing moving average with front padding.
///
/// Each output past the first `window - 1` samples is the mean of the `window`
/// inputs ending at that index. The first `window - 1` outputs repeat the first
/// average so the result keeps the input length and stays index-aligned with
/// the raw signal. That leading region is flat and does not reflect the signal.
///
/// Inputs that are empty, no longer than `window`, or paired with `window <= 1`
/// are returned unchanged.
pub fn smooth(data: &[f64], window: usize) -> Vec<f64> {
    if data.is_empty() || window <= 1 || data.len() <= window {
        return data.to_vec();
    }

    let averages: Vec<f64> = data
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect();

    let mut out = Vec::with_capacity(data.len());
    out.extend(std::iter::repeat(averages[0]).take(window - 1));
    out.extend(averages);
    out
}
