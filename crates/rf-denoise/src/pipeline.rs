//! End-to-end denoising run
//!
//! waveform → STFT → {magnitude, power, phase} → noise profile →
//! subtraction → enhanced magnitude → inverse STFT (original phase)

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::Waveform;
use crate::config::{DenoiseConfig, FrameGrid, WindowFunction};
use crate::error::{DenoiseError, DenoiseResult};
use crate::noise::{NoiseDomain, NoiseProfile};
use crate::stft::{SpectralViews, Spectrogram, Stft};
use crate::subtract::{SubtractionPolicy, SubtractionStats};

/// Observability record for one run; nothing depends on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Analysis frames
    pub num_frames: usize,
    /// Frequency bins per frame
    pub num_bins: usize,
    /// Input length in samples
    pub input_len: usize,
    /// Output length in samples
    pub output_len: usize,
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Frame grid used
    pub grid: FrameGrid,
    /// Window used
    pub window: WindowFunction,
    /// Policy applied
    pub policy: SubtractionPolicy,
    /// Leading frames averaged into the noise profile
    pub noise_frames: usize,
    /// Noise averaging domain
    pub noise_domain: NoiseDomain,
    /// Subtraction counters
    pub stats: SubtractionStats,
}

impl Diagnostics {
    /// Serialize to pretty JSON
    pub fn to_json(&self) -> DenoiseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct DenoiseOutput {
    /// Resynthesized waveform
    pub denoised: Waveform,
    /// Forward transform of the input
    pub spectrogram: Spectrogram,
    /// Magnitude, power and phase of the input
    pub views: SpectralViews,
    /// Noise estimate
    pub noise_profile: NoiseProfile,
    /// Magnitude after subtraction
    pub enhanced_magnitude: Array2<f64>,
    /// Run summary
    pub diagnostics: Diagnostics,
}

impl DenoiseOutput {
    /// Split into (denoised waveform, enhanced magnitude, diagnostics)
    pub fn into_parts(self) -> (Waveform, Array2<f64>, Diagnostics) {
        (self.denoised, self.enhanced_magnitude, self.diagnostics)
    }
}

/// Validated configuration with planned transforms, reusable across runs
pub struct Denoiser {
    config: DenoiseConfig,
    stft: Stft,
}

impl Denoiser {
    /// Validate configuration and plan the FFTs
    pub fn new(config: DenoiseConfig) -> DenoiseResult<Self> {
        config.validate()?;
        let stft = Stft::new(config.grid, config.window)?;
        Ok(Self { config, stft })
    }

    /// Configuration
    pub fn config(&self) -> &DenoiseConfig {
        &self.config
    }

    /// Denoise one waveform
    pub fn run(&self, waveform: &Waveform) -> DenoiseResult<DenoiseOutput> {
        if waveform.sample_rate == 0 {
            return Err(DenoiseError::InvalidSampleRate(waveform.sample_rate));
        }

        let config = &self.config;
        let span = tracing::debug_span!(
            "denoise",
            samples = waveform.len(),
            sample_rate = waveform.sample_rate,
            policy = %config.policy,
        );
        let _enter = span.enter();

        let spectrogram = self.stft.forward(&waveform.samples)?;
        let views = spectrogram.views();

        let noise_profile =
            NoiseProfile::estimate(&views.magnitude, config.noise_frames, config.noise_domain)?;

        let subtraction = config.policy.apply(
            &views.magnitude,
            &views.power,
            &noise_profile,
            config.residual_frames,
        )?;

        let samples = self.stft.inverse(&subtraction.enhanced_magnitude, &views.phase)?;

        let diagnostics = Diagnostics {
            num_frames: spectrogram.num_frames(),
            num_bins: spectrogram.num_bins(),
            input_len: waveform.len(),
            output_len: samples.len(),
            sample_rate: waveform.sample_rate,
            grid: config.grid,
            window: config.window,
            policy: config.policy,
            noise_frames: noise_profile.frame_count(),
            noise_domain: noise_profile.domain(),
            stats: subtraction.stats,
        };

        tracing::debug!(
            frames = diagnostics.num_frames,
            bins = diagnostics.num_bins,
            output_len = diagnostics.output_len,
            "denoise complete"
        );

        Ok(DenoiseOutput {
            denoised: Waveform {
                samples,
                sample_rate: waveform.sample_rate,
            },
            spectrogram,
            views,
            noise_profile,
            enhanced_magnitude: subtraction.enhanced_magnitude,
            diagnostics,
        })
    }
}

/// Denoise a waveform with a one-off [`Denoiser`]
pub fn denoise(waveform: &Waveform, config: &DenoiseConfig) -> DenoiseResult<DenoiseOutput> {
    Denoiser::new(config.clone())?.run(waveform)
}
