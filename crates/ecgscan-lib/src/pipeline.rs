use crate::{
    config::AnalyzerConfig,
    detectors::peaks::detect_beats,
    filters::smooth,
    io::request::{AnalyzeRequest, PayloadError},
    metrics::rhythm::{detect_anomalies, Anomaly, Severity},
    signal::{Events, TimeSeries},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredData {
    pub sampling_rate: Number,
    pub data_points: Vec<f64>,
}

/// Successful analysis: the smoothed signal plus the flagged RR windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub filtered_data: FilteredData,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Everything the analyze channel can answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeOutcome {
    Success(AnalyzeResponse),
    Failure(ErrorResponse),
}

/// Intermediate products of one pipeline run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub filtered: TimeSeries,
    pub peaks: Events,
    pub anomalies: Vec<Anomaly>,
}

/// Smooth, pick beats and score the rhythm of a series.
pub fn run_pipeline(ts: &TimeSeries, cfg: &AnalyzerConfig) -> Analysis {
    let filtered = TimeSeries::new(ts.fs, smooth(&ts.data, cfg.window));
    debug!("smoothed {} samples (window {})", filtered.len(), cfg.window);

    let peaks = detect_beats(&filtered, cfg.peak_threshold_ratio);
    debug!("detected {} peaks", peaks.len());

    let anomalies = if peaks.len() < 2 {
        Vec::new()
    } else {
        detect_anomalies(&peaks, filtered.fs, filtered.len(), cfg)
    };
    debug!("flagged {} anomalies", anomalies.len());

    Analysis {
        filtered,
        peaks,
        anomalies,
    }
}

pub fn analyze(request: &AnalyzeRequest, cfg: &AnalyzerConfig) -> AnalyzeResponse {
    let analysis = run_pipeline(&request.to_series(), cfg);
    AnalyzeResponse {
        filtered_data: FilteredData {
            sampling_rate: request.sampling_rate.clone(),
            data_points: analysis.filtered.data,
        },
        anomalies: analysis.anomalies,
    }
}

/// Decode a raw payload and analyze it. Decode failures become the error shape.
pub fn analyze_payload(payload: impl AsRef<[u8]>, cfg: &AnalyzerConfig) -> AnalyzeOutcome {
    match AnalyzeRequest::from_json_slice(payload.as_ref()) {
        Ok(request) => AnalyzeOutcome::Success(analyze(&request, cfg)),
        Err(err) => failure(err),
    }
}

pub fn failure(err: PayloadError) -> AnalyzeOutcome {
    warn!("{}", err);
    AnalyzeOutcome::Failure(ErrorResponse {
        error: err.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAnomaly {
    pub start_time: f64,
    pub end_time: f64,
    pub anomaly_score: f64,
    pub severity: Severity,
    pub message: String,
}

impl From<&Anomaly> for ReportAnomaly {
    fn from(a: &Anomaly) -> Self {
        let severity = Severity::from_score(a.score);
        Self {
            start_time: a.start_time,
            end_time: a.end_time,
            anomaly_score: a.score,
            severity,
            message: severity.describe(a.score),
        }
    }
}

/// Extended, human-facing view of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub success: bool,
    pub sampling_rate: Number,
    pub duration: f64,
    pub data_points: Vec<f64>,
    pub peaks: Vec<usize>,
    pub anomalies: Vec<ReportAnomaly>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportError {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportOutcome {
    Success(Report),
    Failure(ReportError),
}

pub fn build_report(request: &AnalyzeRequest, cfg: &AnalyzerConfig) -> Report {
    let started = Instant::now();
    let ts = request.to_series();
    let duration = ts.duration();
    let analysis = run_pipeline(&ts, cfg);
    Report {
        success: true,
        sampling_rate: request.sampling_rate.clone(),
        duration,
        data_points: analysis.filtered.data,
        peaks: analysis.peaks.indices,
        anomalies: analysis.anomalies.iter().map(ReportAnomaly::from).collect(),
        processing_time_ms: started.elapsed().as_millis() as u64,
    }
}

pub fn report_payload(payload: impl AsRef<[u8]>, cfg: &AnalyzerConfig) -> ReportOutcome {
    match AnalyzeRequest::from_json_slice(payload.as_ref()) {
        Ok(request) => ReportOutcome::Success(build_report(&request, cfg)),
        Err(err) => {
            warn!("{}", err);
            ReportOutcome::Failure(ReportError {
                success: false,
                error: err.to_string(),
            })
        }
    }
}
