//! Surrogate noise used in place of real data for null runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rustfft::{num_complex::Complex64, FftPlanner};

/// Produces zero-mean, unit-variance surrogate signals
pub trait NoiseSource {
    fn generate(&mut self, len: usize) -> Vec<f64>;
}

/// 1/f ("pink") noise, the dominant shape of sensor background activity
pub struct PinkNoise {
    rng: StdRng,
    planner: FftPlanner<f64>,
}

impl PinkNoise {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            planner: FftPlanner::new(),
        }
    }

    /// Independent standard normal draws
    fn white(&mut self, len: usize) -> Vec<f64> {
        (&mut self.rng).sample_iter(StandardNormal).take(len).collect()
    }
}

impl NoiseSource for PinkNoise {
    fn generate(&mut self, len: usize) -> Vec<f64> {
        if len < 2 {
            return vec![0.0; len];
        }

        let mut buffer: Vec<Complex64> = self
            .white(len)
            .into_iter()
            .map(|x| Complex64::new(x, 0.0))
            .collect();

        let forward = self.planner.plan_fft_forward(len);
        let inverse = self.planner.plan_fft_inverse(len);
        forward.process(&mut buffer);

        // Amplitude ∝ 1/sqrt(f) gives power ∝ 1/f; DC removed.
        buffer[0] = Complex64::new(0.0, 0.0);
        for (k, bin) in buffer.iter_mut().enumerate().skip(1) {
            let f = k.min(len - k) as f64;
            *bin /= f.sqrt();
        }
        inverse.process(&mut buffer);

        let mut signal: Vec<f64> = buffer.iter().map(|c| c.re).collect();
        let mean = signal.iter().sum::<f64>() / len as f64;
        signal.iter_mut().for_each(|x| *x -= mean);
        let std = population_std(&signal);
        if std > 0.0 {
            signal.iter_mut().for_each(|x| *x /= std);
        }
        signal
    }
}

/// Standard deviation with divisor `n`
pub fn population_std(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    (x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt()
}
