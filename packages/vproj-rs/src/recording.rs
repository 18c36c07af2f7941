//! Raw recording access.
//!
//! The pipeline only needs a handful of things from a recording: its geometry,
//! the raw samples of one trial at a time and the marker table. Those are
//! captured by [`RecordingReader`]; [`DatasetReader`] implements it for the
//! on-disk dataset layout
//!
//! ```text
//! NAME.ds/
//!   dataset.json      geometry and channel names
//!   samples.bin       f64 little endian, [trial][channel][sample]
//!   MarkerFile.mrk    optional marker table
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VprojError};
use crate::markers::{MarkerEvent, Markers, MARKER_FILE_NAME};
use crate::mmap_utils::{f64_le_values, mmap_file};

pub const HEADER_FILE_NAME: &str = "dataset.json";
pub const SAMPLES_FILE_NAME: &str = "samples.bin";

/// Raw samples of one trial, one row per channel
pub type TrialData = Vec<Vec<f64>>;

/// Read-only view of a multi-trial recording
pub trait RecordingReader {
    fn sample_rate(&self) -> f64;

    /// Samples per trial
    fn num_samples(&self) -> usize;

    fn num_channels(&self) -> usize;

    fn num_trials(&self) -> usize;

    /// Samples before the sync point of each trial; marker times are
    /// relative to it.
    fn pre_trigger_samples(&self) -> usize {
        0
    }

    /// Raw samples of one trial in the recording's physical unit (Tesla).
    fn read_trial(&self, trial: usize) -> Result<TrialData>;

    /// Occurrences of a marker, empty when the label is unknown.
    fn marker_events(&self, label: &str) -> Vec<MarkerEvent>;
}

/// Geometry stored in `dataset.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetHeader {
    pub sample_rate: f64,
    pub num_samples: usize,
    pub num_channels: usize,
    pub num_trials: usize,
    #[serde(default)]
    pub pre_trigger_samples: usize,
    #[serde(default)]
    pub channel_names: Vec<String>,
}

impl DatasetHeader {
    fn trial_len(&self) -> usize {
        self.num_channels * self.num_samples
    }

    /// Size of `samples.bin`; `None` when the geometry overflows `usize`.
    fn expected_bytes(&self) -> Option<usize> {
        self.num_channels
            .checked_mul(self.num_samples)?
            .checked_mul(8)?
            .checked_mul(self.num_trials)
    }
}

pub struct DatasetReader {
    path: PathBuf,
    header: DatasetHeader,
    samples: Mmap,
    markers: Markers,
}

impl DatasetReader {
    /// Open a dataset directory. A missing directory or header is fatal, a
    /// missing marker file is not.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(VprojError::DatasetNotFound(path.display().to_string()));
        }

        let header_path = path.join(HEADER_FILE_NAME);
        if !header_path.exists() {
            return Err(VprojError::DatasetNotFound(format!(
                "{} has no {}",
                path.display(),
                HEADER_FILE_NAME
            )));
        }
        let header: DatasetHeader = serde_json::from_str(&std::fs::read_to_string(&header_path)?)?;
        if header.sample_rate <= 0.0 {
            return Err(VprojError::Format(format!(
                "Sample rate must be positive, got {}",
                header.sample_rate
            )));
        }

        let expected_bytes = header.expected_bytes().ok_or_else(|| {
            VprojError::Format(format!(
                "{} describes {} trials × {} channels × {} samples, too large to address",
                HEADER_FILE_NAME, header.num_trials, header.num_channels, header.num_samples
            ))
        })?;
        let samples = mmap_file(&path.join(SAMPLES_FILE_NAME))?;
        if samples.len() != expected_bytes {
            return Err(VprojError::Format(format!(
                "{} holds {} bytes, header describes {} trials × {} channels × {} samples ({} bytes)",
                SAMPLES_FILE_NAME,
                samples.len(),
                header.num_trials,
                header.num_channels,
                header.num_samples,
                expected_bytes
            )));
        }

        let markers = Markers::load(&path)?;

        log::info!(
            "Opened dataset {}: {} trials, {} channels, {} samples/trial at {} Hz",
            path.display(),
            header.num_trials,
            header.num_channels,
            header.num_samples,
            header.sample_rate
        );

        Ok(Self {
            path,
            header,
            samples,
            markers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &DatasetHeader {
        &self.header
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }
}

impl RecordingReader for DatasetReader {
    fn sample_rate(&self) -> f64 {
        self.header.sample_rate
    }

    fn num_samples(&self) -> usize {
        self.header.num_samples
    }

    fn num_channels(&self) -> usize {
        self.header.num_channels
    }

    fn num_trials(&self) -> usize {
        self.header.num_trials
    }

    fn pre_trigger_samples(&self) -> usize {
        self.header.pre_trigger_samples
    }

    fn read_trial(&self, trial: usize) -> Result<TrialData> {
        if trial >= self.header.num_trials {
            return Err(VprojError::InvalidParameter(format!(
                "Trial {} out of range (dataset has {})",
                trial, self.header.num_trials
            )));
        }

        let row_bytes = self.header.num_samples * 8;
        let start = trial * self.header.trial_len() * 8;

        Ok((0..self.header.num_channels)
            .map(|ch| {
                let row = start + ch * row_bytes;
                f64_le_values(&self.samples[row..row + row_bytes]).collect()
            })
            .collect())
    }

    fn marker_events(&self, label: &str) -> Vec<MarkerEvent> {
        self.markers.get(label).to_vec()
    }
}

/// Writes a dataset directory readable by [`DatasetReader`]
pub struct DatasetWriter {
    path: PathBuf,
    header: DatasetHeader,
    samples: BufWriter<File>,
    trials_written: usize,
}

impl DatasetWriter {
    pub fn create<P: AsRef<Path>>(path: P, header: DatasetHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        std::fs::write(
            path.join(HEADER_FILE_NAME),
            serde_json::to_string_pretty(&header)?,
        )?;
        let samples = BufWriter::new(File::create(path.join(SAMPLES_FILE_NAME))?);

        Ok(Self {
            path,
            header,
            samples,
            trials_written: 0,
        })
    }

    /// Append the next trial, one row per channel.
    pub fn write_trial(&mut self, data: &[Vec<f64>]) -> Result<()> {
        if self.trials_written >= self.header.num_trials {
            return Err(VprojError::InvalidParameter(format!(
                "Dataset declares {} trials",
                self.header.num_trials
            )));
        }
        if data.len() != self.header.num_channels
            || data.iter().any(|row| row.len() != self.header.num_samples)
        {
            return Err(VprojError::InvalidParameter(format!(
                "Trial must be {} channels × {} samples",
                self.header.num_channels, self.header.num_samples
            )));
        }

        for row in data {
            for value in row {
                self.samples.write_all(&value.to_le_bytes())?;
            }
        }
        self.trials_written += 1;
        Ok(())
    }

    /// Write the marker table in the acquisition software's layout.
    pub fn write_markers(&self, classes: &[(&str, &[MarkerEvent])]) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!("PATH OF DATASET:\n{}\n\n\n", self.path.display()));
        out.push_str(&format!("NUMBER OF MARKERS:\n{}\n\n\n", classes.len()));
        for (id, (name, events)) in classes.iter().enumerate() {
            out.push_str("CLASSGROUPID:\n3\n");
            out.push_str(&format!("NAME:\n{}\n", name));
            out.push_str("COMMENT:\n\n");
            out.push_str(&format!("CLASSID:\n{}\n", id + 1));
            out.push_str(&format!("NUMBER OF SAMPLES:\n{}\n", events.len()));
            out.push_str("LIST OF SAMPLES:\n");
            out.push_str("TRIAL NUMBER\t\tTIME FROM SYNC POINT (in seconds)\n");
            for event in events.iter() {
                out.push_str(&format!(
                    "                  +{}\t\t\t\t     {:+.10e}\n",
                    event.trial, event.time
                ));
            }
            out.push_str("\n\n");
        }
        std::fs::write(self.path.join(MARKER_FILE_NAME), out)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        if self.trials_written != self.header.num_trials {
            return Err(VprojError::InvalidParameter(format!(
                "Wrote {} of {} trials",
                self.trials_written, self.header.num_trials
            )));
        }
        self.samples.flush()?;
        Ok(self.path)
    }
}
