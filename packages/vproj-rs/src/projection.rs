//! Beamformer projection of interchange segments onto voxels.
//!
//! Each active voxel yields one `(segments, seg_len)` slab: the dot product of
//! its weight vector with the channel vector at every sample of every
//! segment. Slabs are written to the output as soon as they are complete, so
//! only the interchange payload and one slab are held in memory.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::container::{read_container, ContainerKind, ContainerWriter, Payload, PayloadData};
use crate::error::{Result, VprojError};
use crate::interchange::{InterchangeFile, InterchangeHeader};
use crate::types::{Affine, NumericKind};
use crate::voxels::{ActiveVoxels, VoxelIndex};
use crate::weights::WeightsFile;

/// Header of a projection file: the interchange header it was made from plus
/// the voxel geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionHeader {
    pub head: InterchangeHeader,
    /// `[voxels]` for flat weights, `[nz, ny, nx]` for grids
    pub shape: Vec<usize>,
    pub idx: VoxelIndex,
    pub affine: Option<Affine>,
    pub dual: bool,
}

/// How a weighted channel sum becomes an output sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projector {
    /// Real payload: the dot product itself
    Linear,
    /// Analytic payload: magnitude of the complex dot product
    Magnitude,
}

impl Projector {
    pub fn for_kind(kind: NumericKind) -> Self {
        match kind {
            NumericKind::Real => Projector::Linear,
            NumericKind::Complex => Projector::Magnitude,
        }
    }
}

/// Weighted sum over channels of one segment, written into `out`.
fn project_real(weights: &[f64], segment: &[f64], seg_len: usize, out: &mut [f64]) {
    out.fill(0.0);
    for (w, channel) in weights.iter().zip(segment.chunks_exact(seg_len)) {
        for (acc, x) in out.iter_mut().zip(channel) {
            *acc += w * x;
        }
    }
}

fn project_complex(weights: &[f64], segment: &[Complex64], seg_len: usize, out: &mut [f64]) {
    let mut acc = vec![Complex64::new(0.0, 0.0); seg_len];
    for (w, channel) in weights.iter().zip(segment.chunks_exact(seg_len)) {
        for (a, x) in acc.iter_mut().zip(channel) {
            *a += *x * *w;
        }
    }
    for (o, a) in out.iter_mut().zip(acc) {
        *o = a.norm();
    }
}

/// Project every segment of `payload` through one voxel's weights.
///
/// `slab` must hold `segments × seg_len` values.
pub fn project_voxel(
    projector: Projector,
    weights: &[f64],
    payload: &Payload,
    slab: &mut [f64],
) -> Result<()> {
    let [_, num_channels, seg_len] = payload.dims;
    if seg_len == 0 {
        return Ok(());
    }
    if num_channels == 0 {
        slab.fill(0.0);
        return Ok(());
    }
    let row_len = num_channels * seg_len;

    match (projector, &payload.data) {
        (Projector::Linear, PayloadData::Real(values)) => {
            slab.par_chunks_mut(seg_len)
                .zip(values.par_chunks(row_len))
                .for_each(|(out, segment)| project_real(weights, segment, seg_len, out));
        }
        (Projector::Magnitude, PayloadData::Complex(values)) => {
            slab.par_chunks_mut(seg_len)
                .zip(values.par_chunks(row_len))
                .for_each(|(out, segment)| project_complex(weights, segment, seg_len, out));
        }
        (projector, _) => {
            return Err(VprojError::InvalidParameter(format!(
                "{:?} projection does not apply to a {:?} payload",
                projector,
                payload.kind()
            )));
        }
    }
    Ok(())
}

/// Project an interchange file through resolved weights and write the result.
///
/// The weights must already be validated against the interchange channel
/// count and, if requested, transformed to the dual basis.
pub fn write_projection(
    path: &Path,
    input: &InterchangeFile,
    weights: &WeightsFile,
    active: &ActiveVoxels,
    dual: bool,
) -> Result<PathBuf> {
    weights.check_channels(input.num_channels())?;

    let projector = Projector::for_kind(input.payload.kind());
    let num_segments = input.num_segments();
    let seg_len = input.seg_len();

    let header = ProjectionHeader {
        head: input.header.clone(),
        shape: weights.tensor.layout().shape(),
        idx: active.index.clone(),
        affine: weights.affine,
        dual,
    };
    let mut writer = ContainerWriter::create(
        path,
        ContainerKind::Projection,
        &header,
        NumericKind::Real,
        [active.len(), num_segments, seg_len],
    )?;

    log::info!(
        "Projecting {} segments onto {} voxels ({:?})",
        num_segments,
        active.len(),
        projector
    );

    let mut slab = vec![0.0; num_segments * seg_len];
    for (n, &row) in active.rows.iter().enumerate() {
        project_voxel(projector, weights.tensor.row(row), &input.payload, &mut slab)?;
        writer.write_real_row(&slab)?;
        log::debug!("Voxel {} (row {}) done", n, row);
    }

    writer.finish()
}

/// Projection file as read back
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionFile {
    pub header: ProjectionHeader,
    pub payload: Payload,
}

impl ProjectionFile {
    pub fn read(path: &Path) -> Result<Self> {
        let (header, payload): (ProjectionHeader, Payload) =
            read_container(path, ContainerKind::Projection)?;
        if payload.kind() != NumericKind::Real {
            return Err(VprojError::Format(format!(
                "{}: projections must be real",
                path.display()
            )));
        }
        if header.idx.len() != payload.dims[0] {
            return Err(VprojError::Format(format!(
                "{}: {} voxel ids for {} voxel rows",
                path.display(),
                header.idx.len(),
                payload.dims[0]
            )));
        }
        Ok(Self { header, payload })
    }

    /// Output of voxel `voxel` for segment `segment`
    pub fn series(&self, voxel: usize, segment: usize) -> Option<&[f64]> {
        let seg_len = self.payload.dims[2];
        self.payload
            .real_row(voxel)
            .and_then(|row| row.get(segment * seg_len..(segment + 1) * seg_len))
    }
}
