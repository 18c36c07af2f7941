pub mod cache;
pub mod container;
pub mod dual;
pub mod error;
pub mod filter;
pub mod interchange;
pub mod markers;
pub mod mmap_utils;
pub mod noise;
pub mod params;
pub mod pipeline;
pub mod profiling;
pub mod projection;
pub mod recording;
pub mod segments;
pub mod types;
pub mod voxels;
pub mod weights;

pub use error::{Result, VprojError};
pub use interchange::{InterchangeFile, InterchangeHeader};
pub use params::ParamFile;
pub use pipeline::{
    run_filter, run_projection, FilterRunConfig, FilterSummary, ProjectRunConfig,
    ProjectionSummary,
};
pub use projection::{ProjectionFile, ProjectionHeader};
pub use recording::{DatasetHeader, DatasetReader, DatasetWriter, RecordingReader};
pub use types::*;
