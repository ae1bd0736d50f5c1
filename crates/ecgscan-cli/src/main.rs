use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ecgscan_lib::{
    config::{AnalyzerConfig, ConfigOverrides},
    detectors::peaks::detect_peaks,
    filters::smooth,
    io::{
        request::AnalyzeRequest,
        text as text_io,
        wav::{self as wav_io, WavOptions},
    },
    pipeline::{self, run_pipeline, AnalyzeOutcome, ReportOutcome},
    plot::{figure_from_analysis, Figure, PlotBackend, Series},
    synth::{spike_train, SpikeTrainSpec},
};
use log::info;
use plotters::prelude::*;
use std::{
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "ecgscan",
    version,
    about = "ecgscan: ECG smoothing, beat detection and RR anomaly scoring"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the recording comes from. Defaults to a JSON request on stdin.
#[derive(Args, Debug)]
struct InputArgs {
    /// JSON request file ({"data_points": [...], "sampling_rate": ...})
    #[arg(long, conflicts_with = "wav")]
    input: Option<PathBuf>,
    /// Mono PCM WAV recording
    #[arg(long)]
    wav: Option<PathBuf>,
    /// Accept WAV sample rates outside the supported recorder rates
    #[arg(long, default_value_t = false)]
    any_rate: bool,
}

#[derive(Args, Debug)]
struct TuningArgs {
    /// TOML file with analyzer settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    window: Option<usize>,
    #[arg(long)]
    peak_threshold: Option<f64>,
    #[arg(long)]
    detection_sigma: Option<f64>,
    #[arg(long)]
    saturation_sigma: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Smooth, detect beats and flag irregular RR intervals; emits filtered data + anomalies
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Like analyze, with peaks, duration, severity labels and timing
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Detect beat peaks from newline-delimited samples read from stdin or --input file
    FindPeaks {
        #[arg(long)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Skip smoothing before peak picking
        #[arg(long, default_value_t = false)]
        raw: bool,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Render the filtered signal with anomaly windows to a PNG via plotters
    Plot {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Emit a synthetic spike-train request payload
    Simulate {
        #[arg(long, default_value_t = 100.0)]
        fs: f64,
        #[arg(long, default_value_t = 10)]
        beats: usize,
        #[arg(long, default_value_t = 0.8)]
        rr: f64,
        #[arg(long, default_value_t = 0.0)]
        jitter: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Stretch the interval after this beat
        #[arg(long, requires = "stretch_factor")]
        stretch_beat: Option<usize>,
        #[arg(long, requires = "stretch_beat")]
        stretch_factor: Option<f64>,
        /// Write a 16-bit PCM WAV instead of a JSON request
        #[arg(long)]
        wav_out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze { input, tuning } => cmd_analyze(&input, &tuning)?,
        Commands::Report { input, tuning } => cmd_report(&input, &tuning)?,
        Commands::FindPeaks {
            fs,
            input,
            raw,
            tuning,
        } => cmd_find_peaks(fs, input.as_deref(), raw, &tuning)?,
        Commands::Plot { input, tuning, out } => cmd_plot(&input, &tuning, &out)?,
        Commands::Simulate {
            fs,
            beats,
            rr,
            jitter,
            seed,
            stretch_beat,
            stretch_factor,
            wav_out,
        } => {
            let spec = SpikeTrainSpec {
                fs,
                beats,
                rr_s: rr,
                jitter_s: jitter,
                seed,
                stretch: stretch_beat.zip(stretch_factor),
                ..Default::default()
            };
            cmd_simulate(&spec, wav_out.as_deref())?
        }
    }
    Ok(())
}

fn load_config(tuning: &TuningArgs) -> Result<AnalyzerConfig> {
    let base = match &tuning.config {
        Some(path) => AnalyzerConfig::load(path)?,
        None => AnalyzerConfig::default(),
    };
    let cfg = base.with_overrides(&ConfigOverrides {
        window: tuning.window,
        peak_threshold_ratio: tuning.peak_threshold,
        detection_sigma: tuning.detection_sigma,
        saturation_sigma: tuning.saturation_sigma,
    });
    cfg.validate()?;
    Ok(cfg)
}

/// Raw payload bytes; decoding (including UTF-8 validation) is left to the request parser.
fn read_payload(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn wav_request(path: &Path, any_rate: bool) -> Result<AnalyzeRequest> {
    let opts = WavOptions {
        restrict_rates: !any_rate,
    };
    Ok(AnalyzeRequest::from_series(wav_io::read_wav(path, &opts)?))
}

fn emit<T: serde::Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    serde_json::to_writer(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn cmd_analyze(input: &InputArgs, tuning: &TuningArgs) -> Result<()> {
    let cfg = load_config(tuning)?;
    info!("analyze: window {}", cfg.window);
    let outcome = match &input.wav {
        Some(path) => AnalyzeOutcome::Success(pipeline::analyze(
            &wav_request(path, input.any_rate)?,
            &cfg,
        )),
        None => pipeline::analyze_payload(&read_payload(input.input.as_deref())?, &cfg),
    };
    if let AnalyzeOutcome::Success(response) = &outcome {
        info!("analyze: {} anomalies", response.anomalies.len());
    }
    emit(&outcome)
}

fn cmd_report(input: &InputArgs, tuning: &TuningArgs) -> Result<()> {
    let cfg = load_config(tuning)?;
    let outcome = match &input.wav {
        Some(path) => {
            ReportOutcome::Success(pipeline::build_report(&wav_request(path, input.any_rate)?, &cfg))
        }
        None => pipeline::report_payload(&read_payload(input.input.as_deref())?, &cfg),
    };
    emit(&outcome)
}

fn cmd_find_peaks(fs: f64, input: Option<&Path>, raw: bool, tuning: &TuningArgs) -> Result<()> {
    let cfg = load_config(tuning)?;
    let samples = match input {
        Some(path) => text_io::read_samples(path)?,
        None => {
            let text = String::from_utf8(read_payload(None)?).context("stdin is not valid UTF-8")?;
            text_io::parse_samples(&text)?
        }
    };
    let data = if raw {
        samples
    } else {
        smooth(&samples, cfg.window)
    };
    let events = if fs > 0.0 {
        detect_peaks(&data, cfg.peak_threshold_ratio)
    } else {
        Default::default()
    };
    info!("find-peaks: {} peaks in {} samples", events.len(), data.len());
    emit(&events)
}

fn cmd_plot(input: &InputArgs, tuning: &TuningArgs, out: &Path) -> Result<()> {
    let cfg = load_config(tuning)?;
    let request = match &input.wav {
        Some(path) => wav_request(path, input.any_rate)?,
        None => AnalyzeRequest::from_json_slice(&read_payload(input.input.as_deref())?)?,
    };
    let analysis = run_pipeline(&request.to_series(), &cfg);
    let fig = figure_from_analysis(&analysis, 4096);
    PngBackend::new(out).draw(&fig)?;
    info!("plot: wrote {}", out.display());
    Ok(())
}

fn cmd_simulate(spec: &SpikeTrainSpec, wav_out: Option<&Path>) -> Result<()> {
    match wav_out {
        Some(path) => {
            let rate = spec.fs.round() as u32;
            wav_io::pcm16_byte_rate(rate)?;
            let ts = spike_train(spec);
            let samples: Vec<i16> = ts
                .data
                .iter()
                .map(|v| (v * 10_000.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
                .collect();
            let bytes = wav_io::encode_pcm16(rate, &samples)?;
            std::fs::write(path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("simulate: wrote {} samples to {}", samples.len(), path.display());
            Ok(())
        }
        None => emit(&AnalyzeRequest::from_series(spike_train(spec))),
    }
}

struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            size: (1200, 480),
        }
    }
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let (x_min, x_max, y_min, y_max) = fig.bounds().unwrap_or((0.0, 1.0, 0.0, 1.0));
        let x_max = if x_max > x_min { x_max } else { x_min + 1.0 };
        let pad = ((y_max - y_min) * 0.05).max(1e-6);
        let (y_lo, y_hi) = (y_min - pad, y_max + pad);

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, y_lo..y_hi)?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;

        chart.draw_series(fig.spans.iter().map(|span| {
            let (r, g, b) = span.color.rgb();
            let alpha = 0.15 + 0.35 * span.weight.clamp(0.0, 1.0);
            Rectangle::new(
                [(span.start, y_lo), (span.end, y_hi)],
                RGBAColor(r, g, b, alpha).filled(),
            )
        }))?;

        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let (r, g, b) = line.style.color.rgb();
                    chart.draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        RGBColor(r, g, b).stroke_width(line.style.width.ceil() as u32),
                    ))?;
                }
                Series::Markers(markers) => {
                    let (r, g, b) = markers.color.rgb();
                    chart.draw_series(
                        markers
                            .points
                            .iter()
                            .map(|p| Circle::new((p[0], p[1]), 3, RGBColor(r, g, b).filled())),
                    )?;
                }
            }
        }
        root.present()?;
        Ok(())
    }
}
