//! Frequency-domain filters.
//!
//! The band-pass is designed once per run for the trial length and applied to
//! every channel of every trial. It multiplies the spectrum by a gain that is
//! 1 inside `[lo, hi]`, 0 outside, with raised-cosine transitions of
//! `transition` Hz on either side.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VprojError};
use crate::types::Band;

pub const DEFAULT_TRANSITION_HZ: f64 = 1.0;

/// Filter settings for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub band: Band,
    pub sample_rate: f64,
    /// Trial length in samples; every filtered signal has this length
    pub num_samples: usize,
    /// Width of each transition band (Hz)
    pub transition: f64,
}

impl FilterConfig {
    pub fn new(band: Band, sample_rate: f64, num_samples: usize) -> Self {
        Self {
            band,
            sample_rate,
            num_samples,
            transition: DEFAULT_TRANSITION_HZ,
        }
    }

    pub fn with_transition(mut self, transition: f64) -> Self {
        self.transition = transition;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let nyquist = self.sample_rate / 2.0;
        if self.sample_rate <= 0.0 {
            return Err(VprojError::InvalidParameter(format!(
                "Sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.num_samples == 0 {
            return Err(VprojError::InvalidParameter(
                "Cannot design a filter for empty trials".to_string(),
            ));
        }
        if self.band.lo < 0.0 || self.band.lo >= self.band.hi {
            return Err(VprojError::InvalidParameter(format!(
                "Band must satisfy 0 <= lo < hi, got [{}, {}]",
                self.band.lo, self.band.hi
            )));
        }
        if self.band.hi > nyquist {
            return Err(VprojError::InvalidParameter(format!(
                "High cutoff ({} Hz) exceeds Nyquist ({} Hz)",
                self.band.hi, nyquist
            )));
        }
        if self.transition < 0.0 {
            return Err(VprojError::InvalidParameter(format!(
                "Transition width must not be negative, got {}",
                self.transition
            )));
        }
        Ok(())
    }
}

/// Band-pass filter applied to one channel at a time
pub trait BandPassFilter {
    fn apply(&self, signal: &[f64]) -> Result<Vec<f64>>;
}

/// Real signal → complex analytic signal
pub trait AnalyticTransform {
    fn analytic(&self, signal: &[f64]) -> Result<Vec<Complex64>>;
}

/// Forward and inverse plans for one transform length
#[derive(Clone)]
struct FftPair {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftPair {
    fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    fn check_len(&self, signal: &[f64]) -> Result<()> {
        if signal.len() != self.len {
            return Err(VprojError::InvalidParameter(format!(
                "Filter designed for {} samples, got {}",
                self.len,
                signal.len()
            )));
        }
        Ok(())
    }

    /// Forward transform, scale each bin, inverse transform, normalise.
    fn shape(&self, signal: &[f64], gain: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = signal.iter().map(|&x| Complex64::new(x, 0.0)).collect();
        self.forward.process(&mut buffer);
        for (bin, &g) in buffer.iter_mut().zip(gain) {
            *bin *= g;
        }
        self.inverse.process(&mut buffer);
        let scale = 1.0 / self.len as f64;
        for value in buffer.iter_mut() {
            *value *= scale;
        }
        buffer
    }
}

pub struct FftBandPass {
    fft: FftPair,
    gain: Vec<f64>,
}

impl FftBandPass {
    pub fn design(config: &FilterConfig) -> Result<Self> {
        config.validate()?;
        let n = config.num_samples;
        let resolution = config.sample_rate / n as f64;
        let gain = (0..n)
            .map(|k| {
                let bin = if k <= n / 2 { k } else { n - k };
                band_gain(bin as f64 * resolution, config.band, config.transition)
            })
            .collect();

        log::debug!(
            "Designed FFT band-pass [{}, {}] Hz, {} samples at {} Hz",
            config.band.lo,
            config.band.hi,
            n,
            config.sample_rate
        );

        Ok(Self {
            fft: FftPair::new(n),
            gain,
        })
    }

    /// Gain applied to each FFT bin
    pub fn gain(&self) -> &[f64] {
        &self.gain
    }
}

fn band_gain(freq: f64, band: Band, transition: f64) -> f64 {
    if freq >= band.lo && freq <= band.hi {
        1.0
    } else if transition > 0.0 && freq < band.lo && freq > band.lo - transition {
        0.5 * (1.0 + (PI * (band.lo - freq) / transition).cos())
    } else if transition > 0.0 && freq > band.hi && freq < band.hi + transition {
        0.5 * (1.0 + (PI * (freq - band.hi) / transition).cos())
    } else {
        0.0
    }
}

impl BandPassFilter for FftBandPass {
    fn apply(&self, signal: &[f64]) -> Result<Vec<f64>> {
        self.fft.check_len(signal)?;
        Ok(self
            .fft
            .shape(signal, &self.gain)
            .into_iter()
            .map(|c| c.re)
            .collect())
    }
}

/// Analytic signal via the one-sided spectrum
pub struct FftHilbert {
    fft: FftPair,
    weights: Vec<f64>,
}

impl FftHilbert {
    pub fn new(len: usize) -> Self {
        let mut weights = vec![0.0; len];
        if len > 0 {
            weights[0] = 1.0;
            let half = len / 2;
            if len % 2 == 0 {
                weights[half] = 1.0;
                weights[1..half].iter_mut().for_each(|w| *w = 2.0);
            } else {
                weights[1..=half].iter_mut().for_each(|w| *w = 2.0);
            }
        }
        Self {
            fft: FftPair::new(len),
            weights,
        }
    }
}

impl AnalyticTransform for FftHilbert {
    fn analytic(&self, signal: &[f64]) -> Result<Vec<Complex64>> {
        self.fft.check_len(signal)?;
        Ok(self.fft.shape(signal, &self.weights))
    }
}
