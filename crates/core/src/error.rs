/// Result alias that carries the custom [`DriveScopeError`] type.
pub type Result<T> = std::result::Result<T, DriveScopeError>;

/// Common error type for the core crate.
///
/// The tap and the analysis engine never surface errors to their callers;
/// this type covers the configuration layer and the FFT backend.
#[derive(Debug, thiserror::Error)]
pub enum DriveScopeError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed or rendered.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// The FFT backend rejected a buffer.
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl DriveScopeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
