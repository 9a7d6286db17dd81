//! Error types for spectral denoising

use thiserror::Error;

/// Denoising error types
#[derive(Error, Debug)]
pub enum DenoiseError {
    /// Frame grid cannot produce well-defined frames
    #[error("Invalid frame grid: {0}")]
    InvalidFrameGrid(String),

    /// Not enough analysis frames for the requested operation
    #[error("Insufficient frames: need {required}, have {available}")]
    InsufficientFrames {
        /// Frames needed
        required: usize,
        /// Frames present
        available: usize,
    },

    /// Magnitude/phase table shapes disagree
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected (bins, frames)
        expected: (usize, usize),
        /// Actual (bins, frames)
        got: (usize, usize),
    },

    /// Subtraction produced a non-real or non-finite value
    #[error("Numeric domain error at bin {bin}, frame {frame}: {value}")]
    NumericDomain {
        /// Frequency bin
        bin: usize,
        /// Frame index
        frame: usize,
        /// Offending value
        value: f64,
    },

    /// Subtraction parameter out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid sample rate
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    /// Unrecognized subtraction policy name
    #[error("Unknown subtraction policy: {0}")]
    UnknownPolicy(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// FFT backend failure
    #[error("FFT error: {0}")]
    Fft(String),
}

impl From<realfft::FftError> for DenoiseError {
    fn from(err: realfft::FftError) -> Self {
        Self::Fft(err.to_string())
    }
}

/// Result type for denoising operations
pub type DenoiseResult<T> = Result<T, DenoiseError>;
