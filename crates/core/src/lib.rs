//! Core library for the Drive Scope visualiser.
//!
//! Two pieces cooperate across the audio/UI thread boundary. [`SampleTap`]
//! is written by the audio callback once per block and never blocks or
//! allocates. [`AnalysisEngine`] runs on a UI or timer thread, pulls the most
//! recent window out of the tap and fills a caller-owned [`VisualizerFrame`]
//! with waveforms, spectra, crest factors and a low/high spectral balance.

pub mod analysis;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tap;
pub mod window;

pub use analysis::{AnalysisEngine, VisualizerFrame};
pub use config::{AnalysisConfig, AppConfig, AudioConfig};
pub use error::{DriveScopeError, Result};
pub use metrics::TrackMetrics;
pub use tap::SampleTap;
pub use window::WindowKind;
