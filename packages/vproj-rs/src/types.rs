use serde::{Deserialize, Serialize};

use crate::error::{Result, VprojError};

/// Pass band in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lo: f64,
    pub hi: f64,
}

impl Band {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Parse a `"lo hi"` string as given on the command line.
    pub fn parse(s: &str) -> Result<Self> {
        let (lo, hi) = parse_pair(s, "band")?;
        Ok(Self { lo, hi })
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.lo, self.hi]
    }
}

/// Segment window in seconds, relative to each marker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub t0: f64,
    pub t1: f64,
}

impl TimeWindow {
    pub fn new(t0: f64, t1: f64) -> Self {
        Self { t0, t1 }
    }

    /// Parse a `"t0 t1"` string as given on the command line.
    pub fn parse(s: &str) -> Result<Self> {
        let (t0, t1) = parse_pair(s, "time")?;
        Ok(Self { t0, t1 })
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.t0, self.t1]
    }

    /// Window length in samples at the given rate.
    pub fn sample_len(&self, sample_rate: f64) -> i64 {
        round_half_up((self.t1 - self.t0) * sample_rate)
    }
}

fn parse_pair(s: &str, what: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(VprojError::InvalidParameter(format!(
            "{} must be two numbers, got '{}'",
            what, s
        )));
    }
    let a = parts[0].parse::<f64>().map_err(|_| {
        VprojError::InvalidParameter(format!("{}: '{}' is not a number", what, parts[0]))
    })?;
    let b = parts[1].parse::<f64>().map_err(|_| {
        VprojError::InvalidParameter(format!("{}: '{}' is not a number", what, parts[1]))
    })?;
    Ok((a, b))
}

/// `floor(x + 0.5)`, the rounding used for every time → sample conversion
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// One labeled window inside a trial's filtered signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub trial: usize,
    pub offset: usize,
    pub label: String,
}

/// Element type of a stored payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericKind {
    Real,
    Complex,
}

impl NumericKind {
    /// Hilbert runs store the complex analytic signal, all others real samples.
    pub fn from_hilbert(hilbert: bool) -> Self {
        if hilbert {
            NumericKind::Complex
        } else {
            NumericKind::Real
        }
    }

    /// Number of f64 values per element.
    pub fn width(&self) -> usize {
        match self {
            NumericKind::Real => 1,
            NumericKind::Complex => 2,
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            NumericKind::Real => 0,
            NumericKind::Complex => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(NumericKind::Real),
            1 => Ok(NumericKind::Complex),
            other => Err(VprojError::Format(format!("Unknown numeric kind tag {}", other))),
        }
    }
}

/// 4×4 voxel → head-space transform, row major
pub type Affine = [[f64; 4]; 4];
