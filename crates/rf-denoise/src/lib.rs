//! ReelForge Spectral Denoise
//!
//! Offline single-channel noise reduction by spectral subtraction:
//!
//! ## Spectral Transform
//! - Windowed STFT with zero-padding to the FFT size
//! - Weighted overlap-add resynthesis from magnitude + phase
//!
//! ## Noise Profile
//! - Stationary estimate from the leading (assumed silent) frames
//! - Magnitude-domain or power-domain averaging
//!
//! ## Subtraction
//! - Direct power or magnitude subtraction with zero clipping
//! - Over-subtraction with power-law exponent and spectral floor
//! - Temporal smoothing and residual noise suppression
//!
//! A run is a pure function of the input buffer and a [`DenoiseConfig`];
//! every intermediate table is returned in [`DenoiseOutput`].

#![warn(missing_docs)]

pub mod config;
pub mod noise;
pub mod pipeline;
pub mod stft;
pub mod subtract;

mod error;

pub use config::{DenoiseConfig, FrameGrid, WindowFunction};
pub use error::{DenoiseError, DenoiseResult};
pub use noise::{NoiseDomain, NoiseProfile};
pub use pipeline::{Denoiser, DenoiseOutput, Diagnostics, denoise};
pub use stft::{SpectralViews, Spectrogram, Stft};
pub use subtract::{OversubtractParams, SubtractionPolicy, SubtractionStats};

use serde::{Deserialize, Serialize};

/// Mono sample buffer at a fixed sample rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    /// Samples
    pub samples: Vec<f64>,
    /// Sample rate (Hz)
    pub sample_rate: u32,
}

impl Waveform {
    /// Create waveform; sample rate must be positive
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> DenoiseResult<Self> {
        if sample_rate == 0 {
            return Err(DenoiseError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create waveform from `f32` samples as delivered by decoders
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> DenoiseResult<Self> {
        Self::new(samples.iter().map(|&s| s as f64).collect(), sample_rate)
    }

    /// Samples converted to `f32` for encoders
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32).collect()
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when there are no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
