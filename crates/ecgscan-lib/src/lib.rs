pub mod config;
pub mod detectors;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod signal;
pub mod synth;

pub use config::*;
pub use detectors::*;
pub use metrics::*;
pub use signal::*;
