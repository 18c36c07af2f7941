//! Per-trial filtering with a small cache of recently filtered trials.
//!
//! Segments are visited in `(trial, offset)` order, so with the default
//! capacity of one every distinct trial is read and filtered exactly once.
//! A larger capacity only saves work when segments are visited out of order;
//! lookups are by exact trial index either way.

use std::collections::VecDeque;

use rustfft::num_complex::Complex64;

use crate::error::{Result, VprojError};
use crate::filter::{AnalyticTransform, BandPassFilter, FftBandPass, FftHilbert, FilterConfig};
use crate::noise::{population_std, NoiseSource, PinkNoise};
use crate::recording::{RecordingReader, TrialData};
use crate::types::NumericKind;

/// Raw samples are Tesla; filtered output is picoTesla.
pub const UNIT_SCALE: f64 = 1e12;

pub const DEFAULT_CACHE_TRIALS: usize = 1;

/// Filtered signal of one trial, one row per channel
#[derive(Debug, Clone, PartialEq)]
pub enum FilteredTrial {
    Real(Vec<Vec<f64>>),
    Complex(Vec<Vec<Complex64>>),
}

impl FilteredTrial {
    pub fn kind(&self) -> NumericKind {
        match self {
            FilteredTrial::Real(_) => NumericKind::Real,
            FilteredTrial::Complex(_) => NumericKind::Complex,
        }
    }

    pub fn num_channels(&self) -> usize {
        match self {
            FilteredTrial::Real(rows) => rows.len(),
            FilteredTrial::Complex(rows) => rows.len(),
        }
    }

    pub fn num_samples(&self) -> usize {
        match self {
            FilteredTrial::Real(rows) => rows.first().map_or(0, Vec::len),
            FilteredTrial::Complex(rows) => rows.first().map_or(0, Vec::len),
        }
    }
}

/// Multiply every sample by [`UNIT_SCALE`].
pub fn rescale(raw: &[f64]) -> Vec<f64> {
    raw.iter().map(|v| v * UNIT_SCALE).collect()
}

/// Subtract the mean of the whole series.
pub fn remove_mean(x: &mut [f64]) {
    if x.is_empty() {
        return;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    x.iter_mut().for_each(|v| *v -= mean);
}

/// Turns a raw trial into its filtered signal
pub struct TrialProcessor {
    band_pass: Box<dyn BandPassFilter>,
    hilbert: Option<Box<dyn AnalyticTransform>>,
    noise: Option<Box<dyn NoiseSource>>,
}

impl TrialProcessor {
    pub fn new(band_pass: Box<dyn BandPassFilter>) -> Self {
        Self {
            band_pass,
            hilbert: None,
            noise: None,
        }
    }

    pub fn with_hilbert(mut self, hilbert: Box<dyn AnalyticTransform>) -> Self {
        self.hilbert = Some(hilbert);
        self
    }

    pub fn with_noise(mut self, noise: Box<dyn NoiseSource>) -> Self {
        self.noise = Some(noise);
        self
    }

    /// FFT band-pass, plus FFT Hilbert and pink-noise substitution when asked.
    pub fn from_config(
        config: &FilterConfig,
        hilbert: bool,
        noise: bool,
        seed: Option<u64>,
    ) -> Result<Self> {
        let mut processor = Self::new(Box::new(FftBandPass::design(config)?));
        if hilbert {
            processor = processor.with_hilbert(Box::new(FftHilbert::new(config.num_samples)));
        }
        if noise {
            processor = processor.with_noise(Box::new(PinkNoise::new(seed)));
        }
        Ok(processor)
    }

    pub fn output_kind(&self) -> NumericKind {
        NumericKind::from_hilbert(self.hilbert.is_some())
    }

    pub fn process(&mut self, raw: &TrialData) -> Result<FilteredTrial> {
        let mut real_rows = Vec::new();
        let mut complex_rows = Vec::new();

        for channel in raw {
            let mut x = rescale(channel);
            remove_mean(&mut x);
            if let Some(noise) = self.noise.as_mut() {
                let std = population_std(&x);
                x = noise.generate(x.len()).into_iter().map(|v| v * std).collect();
            }
            let filtered = self.band_pass.apply(&x)?;
            match &self.hilbert {
                Some(hilbert) => complex_rows.push(hilbert.analytic(&filtered)?),
                None => real_rows.push(filtered),
            }
        }

        Ok(match self.output_kind() {
            NumericKind::Real => FilteredTrial::Real(real_rows),
            NumericKind::Complex => FilteredTrial::Complex(complex_rows),
        })
    }
}

/// Filtered trials keyed by trial index, least recently used evicted first
pub struct TrialFilterCache<'a, R: RecordingReader + ?Sized> {
    reader: &'a R,
    processor: TrialProcessor,
    capacity: usize,
    entries: VecDeque<(usize, FilteredTrial)>,
    fetches: usize,
}

impl<'a, R: RecordingReader + ?Sized> TrialFilterCache<'a, R> {
    pub fn new(reader: &'a R, processor: TrialProcessor) -> Self {
        Self::with_capacity(reader, processor, DEFAULT_CACHE_TRIALS)
    }

    pub fn with_capacity(reader: &'a R, processor: TrialProcessor, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            reader,
            processor,
            capacity,
            entries: VecDeque::with_capacity(capacity),
            fetches: 0,
        }
    }

    pub fn output_kind(&self) -> NumericKind {
        self.processor.output_kind()
    }

    /// Number of raw trial reads so far
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Filtered signal of `trial`, computed on a miss.
    pub fn get(&mut self, trial: usize) -> Result<&FilteredTrial> {
        if let Some(pos) = self.entries.iter().position(|(t, _)| *t == trial) {
            if pos != 0 {
                if let Some(entry) = self.entries.remove(pos) {
                    self.entries.push_front(entry);
                }
            }
            return Ok(&self.entries[0].1);
        }

        log::info!("Trial {}", trial);
        let raw = self.reader.read_trial(trial)?;
        self.fetches += 1;
        if raw.len() != self.reader.num_channels() {
            return Err(VprojError::Format(format!(
                "Trial {} has {} channels, recording declares {}",
                trial,
                raw.len(),
                self.reader.num_channels()
            )));
        }
        let filtered = self.processor.process(&raw)?;

        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((trial, filtered));
        Ok(&self.entries[0].1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::MarkerEvent;
    use crate::types::Band;
    use std::cell::Cell;

    struct CountingReader {
        trials: Vec<TrialData>,
        reads: Cell<usize>,
    }

    impl CountingReader {
        fn new(num_trials: usize) -> Self {
            let trials = (0..num_trials)
                .map(|t| {
                    (0..2)
                        .map(|ch| {
                            (0..64)
                                .map(|i| ((i * (ch + 1) + t) as f64 * 0.3).sin() * 1e-13)
                                .collect()
                        })
                        .collect()
                })
                .collect();
            Self {
                trials,
                reads: Cell::new(0),
            }
        }
    }

    impl RecordingReader for CountingReader {
        fn sample_rate(&self) -> f64 {
            64.0
        }
        fn num_samples(&self) -> usize {
            64
        }
        fn num_channels(&self) -> usize {
            2
        }
        fn num_trials(&self) -> usize {
            self.trials.len()
        }
        fn read_trial(&self, trial: usize) -> Result<TrialData> {
            self.reads.set(self.reads.get() + 1);
            self.trials
                .get(trial)
                .cloned()
                .ok_or_else(|| VprojError::InvalidParameter(format!("no trial {}", trial)))
        }
        fn marker_events(&self, _label: &str) -> Vec<MarkerEvent> {
            Vec::new()
        }
    }

    /// Pass-through filter so scaling and mean removal are observable.
    struct Identity;

    impl BandPassFilter for Identity {
        fn apply(&self, signal: &[f64]) -> Result<Vec<f64>> {
            Ok(signal.to_vec())
        }
    }

    fn processor(hilbert: bool) -> TrialProcessor {
        let config = FilterConfig::new(Band::new(2.0, 20.0), 64.0, 64);
        TrialProcessor::from_config(&config, hilbert, false, None).unwrap()
    }

    #[test]
    fn test_same_trial_fetched_once() {
        let reader = CountingReader::new(3);
        let mut cache = TrialFilterCache::new(&reader, processor(false));

        let first = cache.get(1).unwrap().clone();
        for _ in 0..5 {
            assert_eq!(cache.get(1).unwrap(), &first);
        }
        assert_eq!(reader.reads.get(), 1);
        assert_eq!(cache.fetches(), 1);
    }

    #[test]
    fn test_single_entry_evicts_previous() {
        let reader = CountingReader::new(3);
        let mut cache = TrialFilterCache::new(&reader, processor(false));

        let t0 = cache.get(0).unwrap().clone();
        cache.get(1).unwrap();
        // Miss: trial 0 was discarded, recomputed identically
        assert_eq!(cache.get(0).unwrap(), &t0);
        assert_eq!(reader.reads.get(), 3);
    }

    #[test]
    fn test_larger_capacity_keeps_recent_trials() {
        let reader = CountingReader::new(3);
        let mut cache = TrialFilterCache::with_capacity(&reader, processor(false), 2);

        cache.get(0).unwrap();
        cache.get(1).unwrap();
        cache.get(0).unwrap();
        cache.get(2).unwrap(); // evicts 1, the least recently used
        cache.get(0).unwrap();
        assert_eq!(reader.reads.get(), 3);
        cache.get(1).unwrap();
        assert_eq!(reader.reads.get(), 4);
    }

    #[test]
    fn test_fetch_failure_propagates() {
        let reader = CountingReader::new(1);
        let mut cache = TrialFilterCache::new(&reader, processor(false));
        assert!(cache.get(4).is_err());
    }

    #[test]
    fn test_hilbert_output_is_complex() {
        let reader = CountingReader::new(1);
        let mut cache = TrialFilterCache::new(&reader, processor(true));
        assert_eq!(cache.output_kind(), NumericKind::Complex);
        let trial = cache.get(0).unwrap();
        assert_eq!(trial.kind(), NumericKind::Complex);
        assert_eq!(trial.num_channels(), 2);
        assert_eq!(trial.num_samples(), 64);
    }

    #[test]
    fn test_rescale_is_exact() {
        let raw = [1.5e-13, -2.0e-12, 3.3e-15, 0.0];
        let scaled = rescale(&raw);
        for (s, v) in scaled.iter().zip(raw) {
            assert_eq!(*s, v * 1e12);
        }
    }

    #[test]
    fn test_mean_removed_over_whole_trial() {
        let reader = CountingReader::new(1);
        let mut processor = TrialProcessor::new(Box::new(Identity));
        let raw = reader.read_trial(0).unwrap();
        let FilteredTrial::Real(rows) = processor.process(&raw).unwrap() else {
            panic!("expected real output");
        };
        for (row, raw_row) in rows.iter().zip(&raw) {
            let mean = row.iter().sum::<f64>() / row.len() as f64;
            assert!(mean.abs() < 1e-9);
            let scaled = rescale(raw_row);
            assert!((row[1] - row[0] - (scaled[1] - scaled[0])).abs() < 1e-9);
        }
    }

    #[test]
    fn test_noise_matches_channel_std() {
        let reader = CountingReader::new(1);
        let raw = reader.read_trial(0).unwrap();
        let mut processor =
            TrialProcessor::new(Box::new(Identity)).with_noise(Box::new(PinkNoise::new(Some(1))));
        let FilteredTrial::Real(rows) = processor.process(&raw).unwrap() else {
            panic!("expected real output");
        };
        for (row, raw_row) in rows.iter().zip(&raw) {
            let mut expected = rescale(raw_row);
            remove_mean(&mut expected);
            assert!((population_std(row) - population_std(&expected)).abs() < 1e-9);
            assert_ne!(row, &expected);
        }
    }
}
