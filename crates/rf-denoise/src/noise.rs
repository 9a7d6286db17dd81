//! Noise profile estimation from leading frames
//!
//! The first `k` frames of a recording are assumed to hold noise only. The
//! profile is their per-bin average and stays fixed for the whole run.

use ndarray::{Array1, Array2, Axis, s};
use serde::{Deserialize, Serialize};

use crate::error::{DenoiseError, DenoiseResult};

/// Domain the leading frames are averaged in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoiseDomain {
    /// Mean magnitude; power is its square
    #[default]
    Magnitude,
    /// Mean power; magnitude is its square root
    Power,
}

/// Stationary per-bin noise estimate
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseProfile {
    magnitude: Array1<f64>,
    power: Array1<f64>,
    frame_count: usize,
    domain: NoiseDomain,
}

impl NoiseProfile {
    /// Average the first `frames` columns of a magnitude table
    pub fn estimate(
        magnitude: &Array2<f64>,
        frames: usize,
        domain: NoiseDomain,
    ) -> DenoiseResult<Self> {
        let available = magnitude.ncols();
        if frames == 0 || frames > available {
            return Err(DenoiseError::InsufficientFrames {
                required: frames.max(1),
                available,
            });
        }

        let leading = magnitude.slice(s![.., ..frames]);
        let (magnitude, power) = match domain {
            NoiseDomain::Magnitude => {
                let mean = mean_columns(leading.to_owned());
                let power = mean.mapv(|m| m * m);
                (mean, power)
            }
            NoiseDomain::Power => {
                let power = mean_columns(leading.mapv(|m| m * m));
                let mean = power.mapv(f64::sqrt);
                (mean, power)
            }
        };

        log::debug!(
            "Noise profile: {} bins from {} of {} frames ({:?} domain)",
            magnitude.len(),
            frames,
            available,
            domain
        );

        Ok(Self {
            magnitude,
            power,
            frame_count: frames,
            domain,
        })
    }

    /// Build a profile directly from a per-bin magnitude column
    pub fn from_magnitude(magnitude: Array1<f64>) -> Self {
        let power = magnitude.mapv(|m| m * m);
        Self {
            magnitude,
            power,
            frame_count: 0,
            domain: NoiseDomain::Magnitude,
        }
    }

    /// Per-bin noise magnitude
    pub fn magnitude(&self) -> &Array1<f64> {
        &self.magnitude
    }

    /// Per-bin noise power
    pub fn power(&self) -> &Array1<f64> {
        &self.power
    }

    /// Number of frames averaged (0 for profiles built directly)
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Averaging domain
    pub fn domain(&self) -> NoiseDomain {
        self.domain
    }

    /// Number of frequency bins
    pub fn num_bins(&self) -> usize {
        self.magnitude.len()
    }
}

fn mean_columns(table: Array2<f64>) -> Array1<f64> {
    let frames = table.ncols() as f64;
    table.sum_axis(Axis(1)) / frames
}
