use crate::{metrics::rhythm::Anomaly, pipeline::Analysis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

/// 0xRRGGBB
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Markers(MarkerSeries),
}

/// Highlighted time span, shaded with an opacity scaled by `weight` in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub start: f64,
    pub end: f64,
    pub weight: f64,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
    pub spans: Vec<Span>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
            spans: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Bounding box over all series as `(x_min, x_max, y_min, y_max)`.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| match s {
            Series::Line(line) => line.points.iter(),
            Series::Markers(markers) => markers.points.iter(),
        });
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

/// Keep at most `max_points`, sampling evenly spaced buckets.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points || max_points == 0 {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

/// Filtered signal, detected beats and anomaly windows on a seconds axis.
pub fn figure_from_analysis(analysis: &Analysis, max_points: usize) -> Figure {
    let ts = &analysis.filtered;
    let dt = if ts.has_time_axis() { 1.0 / ts.fs } else { 1.0 };
    let points: Vec<[f64; 2]> = ts
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();

    let mut fig = Figure::new(Some("Filtered ECG".to_string()));
    fig.x.label = Some(if ts.has_time_axis() { "time (s)" } else { "sample" }.into());
    fig.y.label = Some("amplitude".into());
    fig.add_series(Series::Line(LineSeries {
        name: "filtered".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.4,
            color: Color(0x1F77B4),
        },
    }));
    if !analysis.peaks.is_empty() {
        fig.add_series(Series::Markers(MarkerSeries {
            name: "peaks".into(),
            points: analysis.peaks.indices.iter().map(|&i| points[i]).collect(),
            color: Color(0x2CA02C),
        }));
    }
    fig.spans = analysis.anomalies.iter().map(anomaly_span).collect();
    fig
}

fn anomaly_span(a: &Anomaly) -> Span {
    Span {
        start: a.start_time,
        end: a.end_time,
        weight: a.score,
        color: Color(0xFF0077),
    }
}
