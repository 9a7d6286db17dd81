//! Configuration types for spectral denoising

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{DenoiseError, DenoiseResult};
use crate::noise::NoiseDomain;
use crate::subtract::SubtractionPolicy;

/// Default number of leading frames assumed to be noise only
pub const DEFAULT_NOISE_FRAMES: usize = 30;

/// Default number of leading frames scanned for the maximum noise residual
pub const DEFAULT_RESIDUAL_FRAMES: usize = 31;

/// STFT frame layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGrid {
    /// FFT size (frequency resolution)
    pub fft_size: usize,
    /// Analysis window length, zero-padded up to `fft_size`
    pub window_length: usize,
    /// Hop between consecutive frames
    pub hop_length: usize,
}

impl Default for FrameGrid {
    fn default() -> Self {
        Self {
            fft_size: 256,
            window_length: 256,
            hop_length: 128,
        }
    }
}

impl FrameGrid {
    /// Create and validate a frame grid
    pub fn new(fft_size: usize, window_length: usize, hop_length: usize) -> DenoiseResult<Self> {
        let grid = Self {
            fft_size,
            window_length,
            hop_length,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Grid with `window_length == fft_size` and 50% overlap
    pub fn half_overlap(fft_size: usize) -> DenoiseResult<Self> {
        Self::new(fft_size, fft_size, fft_size / 2)
    }

    /// Check the grid can produce well-defined frames
    pub fn validate(&self) -> DenoiseResult<()> {
        if self.fft_size == 0 {
            return Err(DenoiseError::InvalidFrameGrid(
                "fft_size must be positive".into(),
            ));
        }
        if self.window_length == 0 {
            return Err(DenoiseError::InvalidFrameGrid(
                "window_length must be positive".into(),
            ));
        }
        if self.hop_length == 0 {
            return Err(DenoiseError::InvalidFrameGrid(
                "hop_length must be positive".into(),
            ));
        }
        if self.window_length > self.fft_size {
            return Err(DenoiseError::InvalidFrameGrid(format!(
                "window_length {} exceeds fft_size {}",
                self.window_length, self.fft_size
            )));
        }
        Ok(())
    }

    /// Number of non-negative frequency bins
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Number of full frames that fit in `len` samples
    pub fn num_frames(&self, len: usize) -> usize {
        if len < self.window_length {
            0
        } else {
            1 + (len - self.window_length) / self.hop_length
        }
    }

    /// Length of the overlap-add output for `num_frames` frames
    pub fn output_len(&self, num_frames: usize) -> usize {
        if num_frames == 0 {
            0
        } else {
            self.window_length + self.hop_length * (num_frames - 1)
        }
    }
}

/// Analysis/synthesis window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowFunction {
    /// Periodic Hann
    #[default]
    Hann,
    /// Periodic Hamming
    Hamming,
    /// Periodic Blackman
    Blackman,
    /// No tapering
    Rectangular,
}

impl WindowFunction {
    /// Generate window coefficients of the given length
    pub fn coefficients(&self, length: usize) -> Vec<f64> {
        // A single-sample window is unity for every shape
        if length == 1 {
            return vec![1.0];
        }
        let n = length as f64;
        (0..length)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / n;
                match self {
                    Self::Hann => 0.5 * (1.0 - phase.cos()),
                    Self::Hamming => 0.54 - 0.46 * phase.cos(),
                    Self::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
                    Self::Rectangular => 1.0,
                }
            })
            .collect()
    }
}

/// Full denoising configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// Frame layout
    pub grid: FrameGrid,
    /// Analysis/synthesis window
    pub window: WindowFunction,
    /// Leading frames used to estimate the noise profile
    pub noise_frames: usize,
    /// Domain the noise profile is averaged in
    pub noise_domain: NoiseDomain,
    /// Leading frames scanned for the maximum noise residual
    pub residual_frames: usize,
    /// Subtraction policy
    pub policy: SubtractionPolicy,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            grid: FrameGrid::default(),
            window: WindowFunction::default(),
            noise_frames: DEFAULT_NOISE_FRAMES,
            noise_domain: NoiseDomain::default(),
            residual_frames: DEFAULT_RESIDUAL_FRAMES,
            policy: SubtractionPolicy::default(),
        }
    }
}

impl DenoiseConfig {
    /// Parse configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> DenoiseResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> DenoiseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate every part of the configuration
    pub fn validate(&self) -> DenoiseResult<()> {
        self.grid.validate()?;
        if self.noise_frames == 0 {
            return Err(DenoiseError::InsufficientFrames {
                required: 1,
                available: 0,
            });
        }
        if self.residual_frames == 0 {
            return Err(DenoiseError::InvalidParameter(
                "residual_frames must be positive".into(),
            ));
        }
        self.policy.validate()
    }

    /// Set frame grid
    pub fn with_grid(mut self, grid: FrameGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Set window function
    pub fn with_window(mut self, window: WindowFunction) -> Self {
        self.window = window;
        self
    }

    /// Set noise estimation frame count
    pub fn with_noise_frames(mut self, frames: usize) -> Self {
        self.noise_frames = frames;
        self
    }

    /// Set noise estimation domain
    pub fn with_noise_domain(mut self, domain: NoiseDomain) -> Self {
        self.noise_domain = domain;
        self
    }

    /// Set residual scan frame count
    pub fn with_residual_frames(mut self, frames: usize) -> Self {
        self.residual_frames = frames;
        self
    }

    /// Set subtraction policy
    pub fn with_policy(mut self, policy: SubtractionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtract::OversubtractParams;

    #[test]
    fn test_grid_default() {
        let grid = FrameGrid::default();
        assert_eq!(grid.fft_size, 256);
        assert_eq!(grid.num_bins(), 129);
        assert!(grid.validate().is_ok());
    }

    #[test]
    fn test_grid_rejects_zero_hop() {
        let err = FrameGrid::new(256, 256, 0).unwrap_err();
        assert!(matches!(err, DenoiseError::InvalidFrameGrid(_)));
    }

    #[test]
    fn test_grid_rejects_zero_window() {
        assert!(matches!(
            FrameGrid::new(256, 0, 64),
            Err(DenoiseError::InvalidFrameGrid(_))
        ));
    }

    #[test]
    fn test_grid_rejects_window_longer_than_fft() {
        assert!(matches!(
            FrameGrid::new(256, 512, 128),
            Err(DenoiseError::InvalidFrameGrid(_))
        ));
    }

    #[test]
    fn test_frame_count() {
        let grid = FrameGrid::new(256, 256, 128).unwrap();
        assert_eq!(grid.num_frames(0), 0);
        assert_eq!(grid.num_frames(255), 0);
        assert_eq!(grid.num_frames(256), 1);
        assert_eq!(grid.num_frames(383), 1);
        assert_eq!(grid.num_frames(384), 2);
        assert_eq!(grid.num_frames(8000), 61);
        assert_eq!(grid.output_len(61), 256 + 128 * 60);
    }

    #[test]
    fn test_window_shapes() {
        let hann = WindowFunction::Hann.coefficients(8);
        assert_eq!(hann[0], 0.0);
        assert!((hann[4] - 1.0).abs() < 1e-12);

        let rect = WindowFunction::Rectangular.coefficients(4);
        assert_eq!(rect, vec![1.0; 4]);

        let hamming = WindowFunction::Hamming.coefficients(8);
        assert!((hamming[0] - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample_window_is_unity() {
        for window in [
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
            WindowFunction::Rectangular,
        ] {
            assert_eq!(window.coefficients(1), vec![1.0]);
        }
    }

    #[test]
    fn test_config_json_defaults() {
        let config = DenoiseConfig::from_json("{}").unwrap();
        assert_eq!(config, DenoiseConfig::default());
        assert_eq!(config.noise_frames, DEFAULT_NOISE_FRAMES);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = DenoiseConfig::default()
            .with_window(WindowFunction::Hamming)
            .with_noise_frames(12)
            .with_policy(SubtractionPolicy::Oversubtract(OversubtractParams {
                alpha: 2.0,
                gamma: 0.5,
                beta: 0.01,
                smooth: false,
            }));

        let json = config.to_json().unwrap();
        let parsed = DenoiseConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_json_rejects_bad_grid() {
        let json = r#"{ "grid": { "fft_size": 128, "window_length": 256, "hop_length": 64 } }"#;
        assert!(matches!(
            DenoiseConfig::from_json(json),
            Err(DenoiseError::InvalidFrameGrid(_))
        ));
    }

    #[test]
    fn test_config_json_rejects_garbage() {
        assert!(matches!(
            DenoiseConfig::from_json("not json"),
            Err(DenoiseError::Config(_))
        ));
    }
}
