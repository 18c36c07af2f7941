//! Which voxels get projected, and in what order.

use serde::{Deserialize, Serialize};

use crate::weights::{VoxelLayout, WeightTensor};

/// Identifiers of the projected voxels, in output order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoxelIndex {
    Flat(Vec<usize>),
    /// `[z, y, x]` grid cells
    Grid(Vec<[usize; 3]>),
}

impl VoxelIndex {
    pub fn len(&self) -> usize {
        match self {
            VoxelIndex::Flat(idx) => idx.len(),
            VoxelIndex::Grid(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Active voxels and the tensor row holding each one's weights
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveVoxels {
    pub index: VoxelIndex,
    pub rows: Vec<usize>,
}

impl ActiveVoxels {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flat tensors keep every voxel in natural order. Grids are scanned x
/// outermost, then y, then z, and a cell is kept unless its weights sum to
/// exactly zero.
pub fn resolve_active_voxels(tensor: &WeightTensor) -> ActiveVoxels {
    match tensor.layout() {
        VoxelLayout::Flat(n) => ActiveVoxels {
            index: VoxelIndex::Flat((0..n).collect()),
            rows: (0..n).collect(),
        },
        VoxelLayout::Grid { nz, ny, nx } => {
            let mut cells = Vec::new();
            let mut rows = Vec::new();
            for x in 0..nx {
                for y in 0..ny {
                    for z in 0..nz {
                        let row = (z * ny + y) * nx + x;
                        if tensor.row(row).iter().sum::<f64>() != 0.0 {
                            cells.push([z, y, x]);
                            rows.push(row);
                        }
                    }
                }
            }
            log::info!(
                "{} of {} grid voxels active",
                rows.len(),
                tensor.num_voxels()
            );
            ActiveVoxels {
                index: VoxelIndex::Grid(cells),
                rows,
            }
        }
    }
}
