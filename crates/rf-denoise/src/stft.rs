//! Short-time Fourier transform and weighted overlap-add resynthesis
//!
//! Frames are `window_length` samples taken every `hop_length` samples,
//! windowed, zero-padded at the end to `fft_size` and transformed with a
//! real FFT. Only the `fft_size / 2 + 1` non-negative frequency bins are
//! kept. The inverse divides the overlap-added output by the accumulated
//! squared window, which reconstructs the input exactly wherever that sum
//! is non-zero.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::config::{FrameGrid, WindowFunction};
use crate::error::{DenoiseError, DenoiseResult};

/// Squared-window sums at or below this are left unnormalized
const WINDOW_SUM_FLOOR: f64 = 1e-12;

/// Per-worker (input, spectrum, scratch) buffers
type ForwardScratch = (Vec<f64>, Vec<Complex64>, Vec<Complex64>);
type InverseScratch = (Vec<Complex64>, Vec<f64>, Vec<Complex64>);

// ============ Spectrogram ============

/// Complex STFT table indexed by (bin, frame)
#[derive(Debug, Clone)]
pub struct Spectrogram {
    data: Array2<Complex64>,
    grid: FrameGrid,
    window: WindowFunction,
}

impl Spectrogram {
    /// Empty spectrogram (no frames) for the given grid
    pub fn empty(grid: FrameGrid, window: WindowFunction) -> Self {
        Self {
            data: Array2::zeros((grid.num_bins(), 0)),
            grid,
            window,
        }
    }

    /// Build a spectrogram from polar parts
    pub fn from_parts(
        magnitude: &Array2<f64>,
        phase: &Array2<f64>,
        grid: FrameGrid,
        window: WindowFunction,
    ) -> DenoiseResult<Self> {
        check_shapes(magnitude, phase, &grid)?;
        let data = Array2::from_shape_fn(magnitude.dim(), |idx| {
            Complex64::from_polar(magnitude[idx], phase[idx])
        });
        Ok(Self { data, grid, window })
    }

    /// Complex values, shape `(num_bins, num_frames)`
    pub fn data(&self) -> &Array2<Complex64> {
        &self.data
    }

    /// Grid that produced this spectrogram
    pub fn grid(&self) -> &FrameGrid {
        &self.grid
    }

    /// Window that produced this spectrogram
    pub fn window(&self) -> WindowFunction {
        self.window
    }

    /// Number of frequency bins
    pub fn num_bins(&self) -> usize {
        self.data.nrows()
    }

    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.data.ncols()
    }

    /// True when there are no frames
    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// `|value|` per bin and frame
    pub fn magnitude(&self) -> Array2<f64> {
        self.data.mapv(|c| c.norm())
    }

    /// `|value|²` per bin and frame
    pub fn power(&self) -> Array2<f64> {
        self.data.mapv(|c| c.norm_sqr())
    }

    /// Phase angle in `(-π, π]`
    pub fn phase(&self) -> Array2<f64> {
        self.data.mapv(|c| {
            let angle = c.arg();
            if angle <= -PI { PI } else { angle }
        })
    }

    /// Compute all derived views at once
    pub fn views(&self) -> SpectralViews {
        let magnitude = self.magnitude();
        let power = magnitude.mapv(|m| m * m);
        SpectralViews {
            magnitude,
            power,
            phase: self.phase(),
        }
    }
}

/// Read-only projections of a spectrogram, computed once per run
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralViews {
    /// Magnitude
    pub magnitude: Array2<f64>,
    /// Power (magnitude squared)
    pub power: Array2<f64>,
    /// Phase in radians
    pub phase: Array2<f64>,
}

// ============ STFT Processor ============

/// Planned forward/inverse transform for one grid and window
pub struct Stft {
    grid: FrameGrid,
    window: WindowFunction,
    /// Window coefficients, `window_length` long
    coeffs: Vec<f64>,
    fft_forward: Arc<dyn RealToComplex<f64>>,
    fft_inverse: Arc<dyn ComplexToReal<f64>>,
}

impl Stft {
    /// Validate the grid and plan both transforms
    pub fn new(grid: FrameGrid, window: WindowFunction) -> DenoiseResult<Self> {
        grid.validate()?;

        let mut planner = RealFftPlanner::<f64>::new();
        let fft_forward = planner.plan_fft_forward(grid.fft_size);
        let fft_inverse = planner.plan_fft_inverse(grid.fft_size);

        Ok(Self {
            grid,
            window,
            coeffs: window.coefficients(grid.window_length),
            fft_forward,
            fft_inverse,
        })
    }

    /// Frame grid
    pub fn grid(&self) -> &FrameGrid {
        &self.grid
    }

    /// Window function
    pub fn window(&self) -> WindowFunction {
        self.window
    }

    /// Analyze: time domain -> spectrogram
    pub fn forward(&self, samples: &[f64]) -> DenoiseResult<Spectrogram> {
        let num_frames = self.grid.num_frames(samples.len());
        if num_frames == 0 {
            log::debug!(
                "STFT forward: {} samples shorter than window {}, no frames",
                samples.len(),
                self.grid.window_length
            );
            return Ok(Spectrogram::empty(self.grid, self.window));
        }

        let hop = self.grid.hop_length;
        let win_len = self.grid.window_length;

        let columns = (0..num_frames)
            .into_par_iter()
            .map_init(
                || {
                    (
                        self.fft_forward.make_input_vec(),
                        self.fft_forward.make_output_vec(),
                        self.fft_forward.make_scratch_vec(),
                    )
                },
                |state: &mut ForwardScratch, t| -> DenoiseResult<Vec<Complex64>> {
                    let (input, spectrum, scratch) = state;
                    let frame = &samples[t * hop..t * hop + win_len];
                    input.fill(0.0);
                    let windowed = frame.iter().zip(&self.coeffs);
                    for (dst, (&sample, &win)) in input.iter_mut().zip(windowed) {
                        *dst = sample * win;
                    }
                    self.fft_forward.process_with_scratch(input, spectrum, scratch)?;
                    Ok(spectrum.clone())
                },
            )
            .collect::<DenoiseResult<Vec<_>>>()?;

        let data = Array2::from_shape_fn((self.grid.num_bins(), num_frames), |(bin, frame)| {
            columns[frame][bin]
        });

        log::debug!(
            "STFT forward: {} bins x {} frames (fft={}, win={}, hop={})",
            data.nrows(),
            data.ncols(),
            self.grid.fft_size,
            win_len,
            hop
        );

        Ok(Spectrogram {
            data,
            grid: self.grid,
            window: self.window,
        })
    }

    /// Synthesize: magnitude + phase -> time domain
    pub fn inverse(&self, magnitude: &Array2<f64>, phase: &Array2<f64>) -> DenoiseResult<Vec<f64>> {
        check_shapes(magnitude, phase, &self.grid)?;

        let num_frames = magnitude.ncols();
        if num_frames == 0 {
            return Ok(Vec::new());
        }

        let fft_size = self.grid.fft_size;
        let win_len = self.grid.window_length;
        let hop = self.grid.hop_length;
        let last_bin = self.grid.num_bins() - 1;
        let norm = 1.0 / fft_size as f64;

        let frames = (0..num_frames)
            .into_par_iter()
            .map_init(
                || {
                    (
                        self.fft_inverse.make_input_vec(),
                        self.fft_inverse.make_output_vec(),
                        self.fft_inverse.make_scratch_vec(),
                    )
                },
                |state: &mut InverseScratch, t| -> DenoiseResult<Vec<f64>> {
                    let (spectrum, output, scratch) = state;
                    for (bin, value) in spectrum.iter_mut().enumerate() {
                        *value = Complex64::from_polar(magnitude[[bin, t]], phase[[bin, t]]);
                    }
                    // DC and Nyquist must be real for a real-valued inverse
                    spectrum[0].im = 0.0;
                    if fft_size % 2 == 0 {
                        spectrum[last_bin].im = 0.0;
                    }
                    self.fft_inverse.process_with_scratch(spectrum, output, scratch)?;
                    Ok(output[..win_len]
                        .iter()
                        .zip(&self.coeffs)
                        .map(|(&sample, &win)| sample * norm * win)
                        .collect())
                },
            )
            .collect::<DenoiseResult<Vec<_>>>()?;

        // Overlap-add
        let out_len = self.grid.output_len(num_frames);
        let mut output = vec![0.0; out_len];
        let mut window_sum = vec![0.0; out_len];
        for (t, frame) in frames.iter().enumerate() {
            let start = t * hop;
            for (i, (&sample, &win)) in frame.iter().zip(&self.coeffs).enumerate() {
                output[start + i] += sample;
                window_sum[start + i] += win * win;
            }
        }

        for (sample, &sum) in output.iter_mut().zip(&window_sum) {
            if sum > WINDOW_SUM_FLOOR {
                *sample /= sum;
            }
        }

        log::debug!("STFT inverse: {} frames -> {} samples", num_frames, out_len);

        Ok(output)
    }
}

/// Forward transform with a freshly planned [`Stft`]
pub fn forward(
    samples: &[f64],
    grid: FrameGrid,
    window: WindowFunction,
) -> DenoiseResult<Spectrogram> {
    Stft::new(grid, window)?.forward(samples)
}

/// Inverse transform with a freshly planned [`Stft`]
pub fn inverse(
    magnitude: &Array2<f64>,
    phase: &Array2<f64>,
    grid: FrameGrid,
    window: WindowFunction,
) -> DenoiseResult<Vec<f64>> {
    Stft::new(grid, window)?.inverse(magnitude, phase)
}

fn check_shapes(
    magnitude: &Array2<f64>,
    phase: &Array2<f64>,
    grid: &FrameGrid,
) -> DenoiseResult<()> {
    if magnitude.dim() != phase.dim() {
        return Err(DenoiseError::ShapeMismatch {
            expected: magnitude.dim(),
            got: phase.dim(),
        });
    }
    if magnitude.nrows() != grid.num_bins() {
        return Err(DenoiseError::ShapeMismatch {
            expected: (grid.num_bins(), magnitude.ncols()),
            got: magnitude.dim(),
        });
    }
    Ok(())
}
