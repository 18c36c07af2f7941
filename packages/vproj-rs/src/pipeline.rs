//! The two pipeline stages, wired to their file-backed collaborators.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::{TrialFilterCache, TrialProcessor, DEFAULT_CACHE_TRIALS};
use crate::dual::{DualBasis, PseudoInverseDual};
use crate::error::{Result, VprojError};
use crate::filter::{FilterConfig, DEFAULT_TRANSITION_HZ};
use crate::interchange::{write_interchange, InterchangeFile, InterchangeHeader};
use crate::profile_scope;
use crate::projection::write_projection;
use crate::recording::{DatasetReader, RecordingReader};
use crate::segments::{resolve_segments, MarkerSegmentLookup, SegmentLookup};
use crate::types::{Band, TimeWindow};
use crate::voxels::resolve_active_voxels;
use crate::weights::{resolve_weights_path, FileWeightsReader, WeightsFile, WeightsReader};

/// Everything needed to extract and filter one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRunConfig {
    pub dataset: PathBuf,
    pub output: PathBuf,
    pub marks: Vec<String>,
    pub band: Band,
    pub time: TimeWindow,
    pub noise: bool,
    pub hilbert: bool,
    pub transition: f64,
    pub cache_trials: usize,
    pub seed: Option<u64>,
}

impl FilterRunConfig {
    pub fn new(
        dataset: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        band: Band,
        time: TimeWindow,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            output: output.into(),
            marks: Vec::new(),
            band,
            time,
            noise: false,
            hilbert: false,
            transition: DEFAULT_TRANSITION_HZ,
            cache_trials: DEFAULT_CACHE_TRIALS,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub output: PathBuf,
    pub segments: usize,
    pub channels: usize,
    pub seg_len: usize,
    /// Raw trial reads, one per distinct trial when segments are sorted
    pub trials_filtered: usize,
}

/// Extract and filter segments from an open recording.
pub fn filter_recording<R: RecordingReader + ?Sized>(
    reader: &R,
    lookup: &dyn SegmentLookup,
    config: &FilterRunConfig,
) -> Result<FilterSummary> {
    let sample_rate = reader.sample_rate();
    let plan = {
        profile_scope!("Segment lookup");
        resolve_segments(&config.marks, config.time, sample_rate, lookup)?
    };

    let filter = FilterConfig::new(config.band, sample_rate, reader.num_samples())
        .with_transition(config.transition);
    let processor = TrialProcessor::from_config(&filter, config.hilbert, config.noise, config.seed)?;
    let mut cache = TrialFilterCache::with_capacity(reader, processor, config.cache_trials);

    let header = InterchangeHeader::new(
        sample_rate,
        config.band,
        config.time,
        config.marks.clone(),
        config.noise,
        config.hilbert,
        &plan,
    );

    let output = {
        profile_scope!("Filter and write segments");
        write_interchange(&config.output, &header, &plan, &mut cache, reader.num_channels())?
    };

    Ok(FilterSummary {
        output,
        segments: plan.len(),
        channels: reader.num_channels(),
        seg_len: plan.seg_len,
        trials_filtered: cache.fetches(),
    })
}

/// `filterds`: dataset directory → interchange file.
pub fn run_filter(config: &FilterRunConfig) -> Result<FilterSummary> {
    profile_scope!("filter run");
    let reader = DatasetReader::open(&config.dataset)?;
    let lookup = MarkerSegmentLookup::new(&reader);
    filter_recording(&reader, &lookup, config)
}

/// Everything needed to project one interchange file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRunConfig {
    pub dataset: PathBuf,
    pub interchange: PathBuf,
    pub weights: PathBuf,
    pub output: PathBuf,
    pub dual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectionSummary {
    pub output: PathBuf,
    pub voxels: usize,
    pub segments: usize,
    pub seg_len: usize,
}

/// Project an interchange file through already loaded weights.
///
/// The channel count is checked before anything is written. The dual basis,
/// when given, is applied before inactive voxels are masked out.
pub fn project_interchange(
    input: &InterchangeFile,
    weights: WeightsFile,
    dual: Option<&dyn DualBasis>,
    output: &Path,
) -> Result<ProjectionSummary> {
    weights.check_channels(input.num_channels())?;

    let weights = match dual {
        Some(dual) => {
            profile_scope!("Dual basis");
            WeightsFile {
                tensor: dual.transform(&weights.tensor)?,
                affine: weights.affine,
            }
        }
        None => weights,
    };
    let active = resolve_active_voxels(&weights.tensor);

    let output = {
        profile_scope!("Projection");
        write_projection(output, input, &weights, &active, dual.is_some())?
    };

    Ok(ProjectionSummary {
        output,
        voxels: active.len(),
        segments: input.num_segments(),
        seg_len: input.seg_len(),
    })
}

/// `projds`: interchange file + weights → projection file.
pub fn run_projection(config: &ProjectRunConfig) -> Result<ProjectionSummary> {
    run_projection_with(config, &FileWeightsReader)
}

pub fn run_projection_with(
    config: &ProjectRunConfig,
    weights_reader: &dyn WeightsReader,
) -> Result<ProjectionSummary> {
    profile_scope!("projection run");
    if !config.dataset.is_dir() {
        return Err(VprojError::DatasetNotFound(
            config.dataset.display().to_string(),
        ));
    }
    let weights_path = resolve_weights_path(&config.weights, &config.dataset);
    let weights = weights_reader.read_weights(&weights_path)?;
    let input = InterchangeFile::read(&config.interchange)?;

    let dual = PseudoInverseDual::default();
    let dual: Option<&dyn DualBasis> = if config.dual { Some(&dual) } else { None };
    project_interchange(&input, weights, dual, &config.output)
}
