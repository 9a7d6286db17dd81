//! Spectral subtraction policies
//!
//! Features:
//! - Direct power or magnitude subtraction with zero clipping
//! - Over-subtraction with power-law exponent and spectral floor
//! - Three-frame magnitude smoothing before subtraction
//! - Residual noise suppression with a three-frame minimum filter
//!
//! Every policy reads the magnitude/power tables and the noise profile and
//! writes a fresh enhanced-magnitude table. Smoothing and suppression read
//! neighbouring frames from an immutable source buffer, never from their
//! own output.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis, s};
use serde::{Deserialize, Serialize};

use crate::error::{DenoiseError, DenoiseResult};
use crate::noise::NoiseProfile;

// ============ Policy Configuration ============

/// Over-subtraction parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OversubtractParams {
    /// Over-subtraction factor (>= 1)
    pub alpha: f64,
    /// Power-law exponent (> 0)
    pub gamma: f64,
    /// Spectral floor as a fraction of noise power, in `[0, 1)`
    pub beta: f64,
    /// Temporal smoothing and residual noise suppression
    pub smooth: bool,
}

impl Default for OversubtractParams {
    fn default() -> Self {
        Self {
            alpha: 4.0,
            gamma: 1.0,
            beta: 0.0001,
            smooth: false,
        }
    }
}

impl OversubtractParams {
    /// Default parameters with smoothing enabled
    pub fn smoothed() -> Self {
        Self {
            smooth: true,
            ..Default::default()
        }
    }

    /// Check parameter ranges
    pub fn validate(&self) -> DenoiseResult<()> {
        if !self.alpha.is_finite() || self.alpha < 1.0 {
            return Err(DenoiseError::InvalidParameter(format!(
                "alpha must be >= 1, got {}",
                self.alpha
            )));
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(DenoiseError::InvalidParameter(format!(
                "gamma must be > 0, got {}",
                self.gamma
            )));
        }
        if !(0.0..1.0).contains(&self.beta) {
            return Err(DenoiseError::InvalidParameter(format!(
                "beta must be in [0, 1), got {}",
                self.beta
            )));
        }
        Ok(())
    }
}

/// Subtraction policy selector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SubtractionPolicy {
    /// `sqrt(max(power - noise_power, 0))`
    #[default]
    PlainPower,
    /// `max(magnitude - noise_magnitude, 0)`
    PlainMagnitude,
    /// Over-subtraction with spectral floor
    Oversubtract(OversubtractParams),
}

impl SubtractionPolicy {
    /// Map the legacy numeric mode selector: 1 = power, 2 = smoothed
    /// over-subtraction, anything else = magnitude
    pub fn from_mode(mode: u8) -> Self {
        match mode {
            1 => Self::PlainPower,
            2 => Self::Oversubtract(OversubtractParams::smoothed()),
            _ => Self::PlainMagnitude,
        }
    }

    /// Short policy name
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlainPower => "plain-power",
            Self::PlainMagnitude => "plain-magnitude",
            Self::Oversubtract(_) => "oversubtract",
        }
    }

    /// Whether the policy looks at neighbouring frames
    pub fn requires_smoothing(&self) -> bool {
        matches!(self, Self::Oversubtract(params) if params.smooth)
    }

    /// Check policy parameters
    pub fn validate(&self) -> DenoiseResult<()> {
        match self {
            Self::Oversubtract(params) => params.validate(),
            _ => Ok(()),
        }
    }

    /// Apply the policy
    ///
    /// `magnitude` and `power` must share a shape whose row count matches
    /// the profile's bin count. `residual_frames` bounds the leading frames
    /// scanned for the residual noise ceiling (smoothing only).
    pub fn apply(
        &self,
        magnitude: &Array2<f64>,
        power: &Array2<f64>,
        noise: &NoiseProfile,
        residual_frames: usize,
    ) -> DenoiseResult<SubtractionOutput> {
        self.validate()?;
        check_shapes(magnitude, power, noise)?;

        let output = match self {
            Self::PlainPower => subtract_direct(power, noise, true)?,
            Self::PlainMagnitude => subtract_direct(power, noise, false)?,
            Self::Oversubtract(params) => {
                oversubtract(magnitude, power, noise, params, residual_frames)?
            }
        };

        log::debug!(
            "Subtraction ({}): clipped={} floored={} suppressed={}",
            self.name(),
            output.stats.clipped,
            output.stats.floored,
            output.stats.suppressed
        );

        Ok(output)
    }
}

impl fmt::Display for SubtractionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubtractionPolicy {
    type Err = DenoiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain-power" | "power" => Ok(Self::PlainPower),
            "plain-magnitude" | "magnitude" => Ok(Self::PlainMagnitude),
            "oversubtract" => Ok(Self::Oversubtract(OversubtractParams::default())),
            other => Err(DenoiseError::UnknownPolicy(other.to_string())),
        }
    }
}

// ============ Subtraction Output ============

/// Per-run counters, for diagnostics only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtractionStats {
    /// Entries whose subtracted energy went negative and were clipped to zero
    pub clipped: usize,
    /// Entries raised to the spectral floor
    pub floored: usize,
    /// Entries replaced by the residual minimum filter
    pub suppressed: usize,
}

/// Enhanced magnitude plus counters
#[derive(Debug, Clone)]
pub struct SubtractionOutput {
    /// Enhanced magnitude, same shape as the input
    pub enhanced_magnitude: Array2<f64>,
    /// Counters
    pub stats: SubtractionStats,
}

// ============ Policy A: Direct Subtraction ============

/// Direct subtraction in the power (`by_power`) or magnitude domain
pub fn subtract_direct(
    power: &Array2<f64>,
    noise: &NoiseProfile,
    by_power: bool,
) -> DenoiseResult<SubtractionOutput> {
    let noise_power = noise.power();
    let noise_mag = noise.magnitude();
    let mut stats = SubtractionStats::default();
    let mut enhanced = Array2::zeros(power.dim());

    for ((bin, frame), &p) in power.indexed_iter() {
        let diff = if by_power {
            p - noise_power[bin]
        } else {
            p.sqrt() - noise_mag[bin]
        };
        let clipped = if diff < 0.0 {
            stats.clipped += 1;
            0.0
        } else {
            diff
        };
        let value = if by_power { clipped.sqrt() } else { clipped };
        enhanced[[bin, frame]] = finite(value, bin, frame)?;
    }

    Ok(SubtractionOutput {
        enhanced_magnitude: enhanced,
        stats,
    })
}

// ============ Policy B: Over-subtraction ============

/// Over-subtraction with spectral floor and optional smoothing
pub fn oversubtract(
    magnitude: &Array2<f64>,
    power: &Array2<f64>,
    noise: &NoiseProfile,
    params: &OversubtractParams,
    residual_frames: usize,
) -> DenoiseResult<SubtractionOutput> {
    params.validate()?;
    check_shapes(magnitude, power, noise)?;

    if params.smooth && magnitude.ncols() == 0 {
        return Err(DenoiseError::InsufficientFrames {
            required: 1,
            available: 0,
        });
    }

    let smoothed_power;
    let power = if params.smooth {
        smoothed_power = smooth_frames(magnitude).mapv(|m| m * m);
        &smoothed_power
    } else {
        power
    };

    let noise_power = noise.power();
    let inv_gamma = 1.0 / params.gamma;
    let mut stats = SubtractionStats::default();
    let mut enhanced = Array2::zeros(power.dim());

    for ((bin, frame), &p) in power.indexed_iter() {
        let np = noise_power[bin];
        let base = finite(
            p.powf(params.gamma) - params.alpha * np.powf(params.gamma),
            bin,
            frame,
        )?;

        // Negative base has no real root for fractional 1/gamma: clamp to zero
        if base < 0.0 {
            stats.clipped += 1;
        }
        let raw = if base > 0.0 { base.powf(inv_gamma) } else { 0.0 };

        let floor = params.beta * np;
        let enhanced_power = if raw >= floor {
            raw
        } else {
            stats.floored += 1;
            floor
        };

        enhanced[[bin, frame]] = finite(enhanced_power.sqrt(), bin, frame)?;
    }

    if params.smooth {
        let ceiling = residual_ceiling(magnitude, noise, residual_frames);
        let (suppressed, count) = suppress_residual(&enhanced, &ceiling);
        enhanced = suppressed;
        stats.suppressed = count;
    }

    Ok(SubtractionOutput {
        enhanced_magnitude: enhanced,
        stats,
    })
}

/// Replace each interior frame by the mean of itself and its two neighbours
///
/// Edge frames are copied unchanged.
pub fn smooth_frames(magnitude: &Array2<f64>) -> Array2<f64> {
    let frames = magnitude.ncols();
    let mut smoothed = magnitude.clone();
    for t in 1..frames.saturating_sub(1) {
        let mean = magnitude.slice(s![.., t - 1..=t + 1]).sum_axis(Axis(1)) / 3.0;
        smoothed.column_mut(t).assign(&mean);
    }
    smoothed
}

/// Per-bin maximum of `magnitude - noise_magnitude` over the leading frames
///
/// The scan covers `min(frames, num_frames)` frames.
pub fn residual_ceiling(
    magnitude: &Array2<f64>,
    noise: &NoiseProfile,
    frames: usize,
) -> Array1<f64> {
    let available = magnitude.ncols();
    if frames > available {
        log::warn!(
            "Residual scan wants {} frames but only {} available; using {}",
            frames,
            available,
            available
        );
    }
    let frames = frames.min(available);
    let leading = magnitude.slice(s![.., ..frames]);

    Array1::from_shape_fn(magnitude.nrows(), |bin| {
        let noise_mag = noise.magnitude()[bin];
        leading
            .row(bin)
            .iter()
            .map(|&m| m - noise_mag)
            .fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Three-frame minimum filter applied where a value falls below the ceiling
///
/// Returns the filtered table and the number of entries visited by the
/// filter. Edge frames are copied unchanged.
pub fn suppress_residual(enhanced: &Array2<f64>, ceiling: &Array1<f64>) -> (Array2<f64>, usize) {
    let frames = enhanced.ncols();
    let mut output = enhanced.clone();
    let mut count = 0;

    for t in 1..frames.saturating_sub(1) {
        let neighbourhood = enhanced.slice(s![.., t - 1..=t + 1]);
        for (bin, &max_residual) in ceiling.iter().enumerate() {
            if enhanced[[bin, t]] < max_residual {
                output[[bin, t]] = neighbourhood
                    .row(bin)
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min);
                count += 1;
            }
        }
    }

    (output, count)
}

fn finite(value: f64, bin: usize, frame: usize) -> DenoiseResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DenoiseError::NumericDomain { bin, frame, value })
    }
}

fn check_shapes(
    magnitude: &Array2<f64>,
    power: &Array2<f64>,
    noise: &NoiseProfile,
) -> DenoiseResult<()> {
    if magnitude.dim() != power.dim() {
        return Err(DenoiseError::ShapeMismatch {
            expected: magnitude.dim(),
            got: power.dim(),
        });
    }
    if magnitude.nrows() != noise.num_bins() {
        return Err(DenoiseError::ShapeMismatch {
            expected: (noise.num_bins(), magnitude.ncols()),
            got: magnitude.dim(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use crate::noise::NoiseDomain;

    fn magnitude() -> Array2<f64> {
        array![
            [1.0, 1.0, 3.0, 0.5, 2.0],
            [0.2, 0.4, 0.3, 4.0, 0.1],
        ]
    }

    fn profile(mag: &Array2<f64>) -> NoiseProfile {
        NoiseProfile::estimate(mag, 2, NoiseDomain::Magnitude).unwrap()
    }

    #[test]
    fn test_plain_power() {
        let mag = magnitude();
        let power = mag.mapv(|m| m * m);
        let noise = profile(&mag);
        let out = SubtractionPolicy::PlainPower.apply(&mag, &power, &noise, 31).unwrap();

        // bin 0 noise magnitude 1.0, power 1.0
        assert_abs_diff_eq!(out.enhanced_magnitude[[0, 2]], 8.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(out.enhanced_magnitude[[0, 3]], 0.0);
        // bin 1 noise magnitude 0.3, power 0.09
        assert_abs_diff_eq!(
            out.enhanced_magnitude[[1, 3]],
            (16.0_f64 - 0.09).sqrt(),
            epsilon = 1e-12
        );
        assert!(out.stats.clipped > 0);
    }

    #[test]
    fn test_plain_magnitude() {
        let mag = magnitude();
        let power = mag.mapv(|m| m * m);
        let noise = profile(&mag);
        let out = SubtractionPolicy::PlainMagnitude.apply(&mag, &power, &noise, 31).unwrap();

        assert_abs_diff_eq!(out.enhanced_magnitude[[0, 2]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.enhanced_magnitude[[1, 3]], 3.7, epsilon = 1e-12);
        assert_eq!(out.enhanced_magnitude[[1, 4]], 0.0);
    }

    #[test]
    fn test_oversubtract_floor() {
        let mag = magnitude();
        let power = mag.mapv(|m| m * m);
        let noise = profile(&mag);
        let params = OversubtractParams {
            alpha: 4.0,
            gamma: 1.0,
            beta: 0.5,
            smooth: false,
        };
        let out = oversubtract(&mag, &power, &noise, &params, 31).unwrap();

        // 9 - 4 = 5 survives
        assert_abs_diff_eq!(out.enhanced_magnitude[[0, 2]], 5.0_f64.sqrt(), epsilon = 1e-12);
        // 0.25 - 4 < 0 -> floor 0.5 * 1.0
        assert_abs_diff_eq!(out.enhanced_magnitude[[0, 3]], 0.5_f64.sqrt(), epsilon = 1e-12);
        assert!(out.stats.floored > 0);
    }

    #[test]
    fn test_fractional_gamma_negative_base_is_clamped() {
        let mag = magnitude();
        let power = mag.mapv(|m| m * m);
        let noise = profile(&mag);
        let params = OversubtractParams {
            alpha: 3.0,
            gamma: 0.5,
            beta: 0.01,
            smooth: false,
        };
        let out = oversubtract(&mag, &power, &noise, &params, 31).unwrap();
        assert!(out.enhanced_magnitude.iter().all(|v| v.is_finite() && *v >= 0.0));
        // 0.25^0.5 - 3 * 1^0.5 < 0 -> floor
        assert_abs_diff_eq!(out.enhanced_magnitude[[0, 3]], 0.01_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_matches_plain_power_when_neutral() {
        let mag = magnitude();
        let power = mag.mapv(|m| m * m);
        let noise = profile(&mag);
        let params = OversubtractParams {
            alpha: 1.0,
            gamma: 1.0,
            beta: 0.0,
            smooth: false,
        };
        let a = SubtractionPolicy::PlainPower.apply(&mag, &power, &noise, 31).unwrap();
        let b = SubtractionPolicy::Oversubtract(params).apply(&mag, &power, &noise, 31).unwrap();
        assert_eq!(a.enhanced_magnitude, b.enhanced_magnitude);
    }

    #[test]
    fn test_smoothed_oversubtract_composition() {
        // Smoothed: [1, 2, 5/3, 5/3, 1]. Ceiling from the raw table is 3,
        // from the smoothed one it would be 1.
        let mag = array![[1.0, 1.0, 4.0, 0.0, 1.0]];
        let power = mag.mapv(|m| m * m);
        let noise = profile(&mag);
        let params = OversubtractParams {
            alpha: 1.0,
            gamma: 1.0,
            beta: 0.0,
            smooth: true,
        };
        let out = oversubtract(&mag, &power, &noise, &params, 3).unwrap();

        // Floored: [0, sqrt(3), 4/3, 4/3, 0]; every interior value is below 3
        let expected = [0.0, 0.0, 4.0 / 3.0, 0.0, 0.0];
        for (t, &value) in expected.iter().enumerate() {
            assert_abs_diff_eq!(out.enhanced_magnitude[[0, t]], value, epsilon = 1e-12);
        }
        assert_eq!(out.stats.suppressed, 3);
        assert_eq!(out.stats.clipped, 0);
        assert_eq!(out.stats.floored, 0);
    }

    #[test]
    fn test_clipped_counts_only_negative_energy() {
        let silent = Array2::<f64>::zeros((2, 5));
        let noise = profile(&silent);
        let params = OversubtractParams::default();
        let out = oversubtract(&silent, &silent, &noise, &params, 31).unwrap();
        assert_eq!(out.stats.clipped, 0);
        assert!(out.enhanced_magnitude.iter().all(|&v| v == 0.0));

        let mag = magnitude();
        let power = mag.mapv(|m| m * m);
        let noise = profile(&mag);
        let out = oversubtract(&mag, &power, &noise, &params, 31).unwrap();
        assert!(out.stats.clipped > 0);
    }

    #[test]
    fn test_smooth_frames_keeps_edges() {
        let mag = magnitude();
        let smoothed = smooth_frames(&mag);
        assert_eq!(smoothed.column(0), mag.column(0));
        assert_eq!(smoothed.column(4), mag.column(4));
        assert_abs_diff_eq!(smoothed[[0, 1]], 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(smoothed[[1, 3]], 4.4 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_smooth_frames_short_input() {
        let mag = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(smooth_frames(&mag), mag);
    }

    #[test]
    fn test_residual_ceiling() {
        let mag = magnitude();
        let noise = profile(&mag);
        let ceiling = residual_ceiling(&mag, &noise, 3);
        // bin 0: max(1, 1, 3) - 1
        assert_abs_diff_eq!(ceiling[0], 2.0, epsilon = 1e-12);
        // bin 1: max(0.2, 0.4, 0.3) - 0.3
        assert_abs_diff_eq!(ceiling[1], 0.1, epsilon = 1e-12);

        // Clamped to available frames
        let all = residual_ceiling(&mag, &noise, 31);
        assert_abs_diff_eq!(all[1], 3.7, epsilon = 1e-12);
    }

    #[test]
    fn test_suppress_residual_reads_source() {
        let enhanced = array![[5.0, 1.0, 0.5, 2.0, 9.0]];
        let ceiling = array![3.0];
        let (out, count) = suppress_residual(&enhanced, &ceiling);

        assert_eq!(out[[0, 0]], 5.0);
        assert_eq!(out[[0, 4]], 9.0);
        assert_eq!(out[[0, 1]], 0.5);
        assert_eq!(out[[0, 2]], 0.5);
        // min(0.5, 2.0, 9.0) from the source, not from the updated column 2
        assert_eq!(out[[0, 3]], 0.5);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_suppress_residual_above_ceiling_untouched() {
        let enhanced = array![[1.0, 4.0, 1.0]];
        let ceiling = array![3.0];
        let (out, count) = suppress_residual(&enhanced, &ceiling);
        assert_eq!(out, enhanced);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_smoothed_needs_frames() {
        let mag = Array2::<f64>::zeros((2, 0));
        let noise = NoiseProfile::from_magnitude(array![0.1, 0.1]);
        let params = OversubtractParams::smoothed();
        let err = oversubtract(&mag, &mag, &noise, &params, 31).unwrap_err();
        assert!(matches!(err, DenoiseError::InsufficientFrames { .. }));
    }

    #[test]
    fn test_nan_is_reported() {
        let mag = array![[1.0, f64::NAN, 1.0]];
        let power = mag.mapv(|m| m * m);
        let noise = NoiseProfile::from_magnitude(array![0.5]);
        let params = OversubtractParams::default();
        let err = oversubtract(&mag, &power, &noise, &params, 31).unwrap_err();
        assert!(matches!(err, DenoiseError::NumericDomain { bin: 0, frame: 1, .. }));

        let err = subtract_direct(&power, &noise, true).unwrap_err();
        assert!(matches!(err, DenoiseError::NumericDomain { bin: 0, frame: 1, .. }));
    }

    #[test]
    fn test_profile_bin_mismatch() {
        let mag = magnitude();
        let noise = NoiseProfile::from_magnitude(array![0.1, 0.1, 0.1]);
        assert!(matches!(
            SubtractionPolicy::PlainPower.apply(&mag, &mag, &noise, 31),
            Err(DenoiseError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_param_validation() {
        let bad_alpha = OversubtractParams { alpha: 0.5, ..Default::default() };
        let bad_gamma = OversubtractParams { gamma: 0.0, ..Default::default() };
        let bad_beta = OversubtractParams { beta: 1.0, ..Default::default() };
        for params in [bad_alpha, bad_gamma, bad_beta] {
            assert!(matches!(
                SubtractionPolicy::Oversubtract(params).validate(),
                Err(DenoiseError::InvalidParameter(_))
            ));
        }
        assert!(OversubtractParams::default().validate().is_ok());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "plain-power".parse::<SubtractionPolicy>().unwrap(),
            SubtractionPolicy::PlainPower
        );
        assert_eq!(
            " Plain-Magnitude ".parse::<SubtractionPolicy>().unwrap(),
            SubtractionPolicy::PlainMagnitude
        );
        assert_eq!(
            "oversubtract".parse::<SubtractionPolicy>().unwrap(),
            SubtractionPolicy::Oversubtract(OversubtractParams::default())
        );
        assert!(matches!(
            "wiener".parse::<SubtractionPolicy>(),
            Err(DenoiseError::UnknownPolicy(_))
        ));
        assert_eq!(SubtractionPolicy::PlainMagnitude.to_string(), "plain-magnitude");
    }

    #[test]
    fn test_policy_from_mode() {
        assert_eq!(SubtractionPolicy::from_mode(1), SubtractionPolicy::PlainPower);
        assert!(SubtractionPolicy::from_mode(2).requires_smoothing());
        assert_eq!(SubtractionPolicy::from_mode(0), SubtractionPolicy::PlainMagnitude);
    }

    #[test]
    fn test_policy_json_tagging() {
        let policy = SubtractionPolicy::Oversubtract(OversubtractParams::smoothed());
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"mode\":\"oversubtract\""));
        let parsed: SubtractionPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, policy);

        let plain: SubtractionPolicy = serde_json::from_str(r#"{"mode":"plain-power"}"#).unwrap();
        assert_eq!(plain, SubtractionPolicy::PlainPower);
    }
}
