use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, WindowKind};

/// Top-level configuration structure for the visualiser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Parses a configuration from JSON. Missing fields fall back to their
    /// defaults; out-of-range sizes are clamped later by the engine.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a JSON configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded configuration");
        Ok(config)
    }

    /// Renders the configuration as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Configuration of the capture side (processing chain and tap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    pub tap_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            block_size: 512,
            tap_capacity: crate::tap::DEFAULT_CAPACITY,
        }
    }
}

/// Configuration of the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub fft_size: usize,
    pub scope_size: usize,
    pub window: WindowKind,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: crate::analysis::DEFAULT_FFT_SIZE,
            scope_size: crate::analysis::DEFAULT_SCOPE_SIZE,
            window: WindowKind::default(),
        }
    }
}
