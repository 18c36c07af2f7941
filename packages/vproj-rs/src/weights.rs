//! Beamformer weights.
//!
//! Two on-disk forms are understood:
//!
//! - NIfTI volumes (`.nii`, `.nii.gz`) indexed `(x, y, z, channel)`, which
//!   carry a voxel grid and its affine.
//! - Flat SAM coefficient files: `SAMCOEFF`, u32 LE version (1), u32 LE voxel
//!   count, u32 LE channel count, then f64 LE weights one voxel after another.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::{Result, VprojError};
use crate::mmap_utils::{f64_le_values, mmap_file};
use crate::types::Affine;

pub const FLAT_MAGIC: &[u8; 8] = b"SAMCOEFF";
pub const FLAT_VERSION: u32 = 1;
const FLAT_HEADER_LEN: usize = 8 + 4 + 4 + 4;

/// Directory inside a dataset that holds its weight files
pub const SAM_DIR: &str = "SAM";

/// Arrangement of the voxels of a weight tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoxelLayout {
    /// Voxels `0..n` with no spatial structure
    Flat(usize),
    /// Dense grid, rows stored in `(z, y, x)` order
    Grid { nz: usize, ny: usize, nx: usize },
}

impl VoxelLayout {
    pub fn num_voxels(&self) -> usize {
        match *self {
            VoxelLayout::Flat(n) => n,
            VoxelLayout::Grid { nz, ny, nx } => nz * ny * nx,
        }
    }

    /// Spatial dimensions: `[n]` or `[nz, ny, nx]`
    pub fn shape(&self) -> Vec<usize> {
        match *self {
            VoxelLayout::Flat(n) => vec![n],
            VoxelLayout::Grid { nz, ny, nx } => vec![nz, ny, nx],
        }
    }
}

/// One weight vector per voxel, one weight per channel
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTensor {
    layout: VoxelLayout,
    num_channels: usize,
    data: Vec<f64>,
}

impl WeightTensor {
    /// `data` holds `layout.num_voxels()` rows of `num_channels` weights.
    pub fn new(layout: VoxelLayout, num_channels: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != layout.num_voxels() * num_channels {
            return Err(VprojError::Weights(format!(
                "{} weights do not fill {} voxels × {} channels",
                data.len(),
                layout.num_voxels(),
                num_channels
            )));
        }
        Ok(Self {
            layout,
            num_channels,
            data,
        })
    }

    pub fn layout(&self) -> VoxelLayout {
        self.layout
    }

    pub fn num_voxels(&self) -> usize {
        self.layout.num_voxels()
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Weights of the voxel stored at row `index`.
    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.num_channels..(index + 1) * self.num_channels]
    }

    /// Row of grid cell `(z, y, x)`; `None` for flat tensors.
    pub fn grid_row_index(&self, z: usize, y: usize, x: usize) -> Option<usize> {
        match self.layout {
            VoxelLayout::Grid { ny, nx, .. } => Some((z * ny + y) * nx + x),
            VoxelLayout::Flat(_) => None,
        }
    }

    /// All weights, voxel-major
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// A weight tensor and, for grids, its voxel → head transform
#[derive(Debug, Clone, PartialEq)]
pub struct WeightsFile {
    pub tensor: WeightTensor,
    pub affine: Option<Affine>,
}

impl WeightsFile {
    /// Fail unless the weights have one entry per recorded channel.
    pub fn check_channels(&self, num_channels: usize) -> Result<()> {
        if self.tensor.num_channels() != num_channels {
            return Err(VprojError::Validation(format!(
                "wrong number of weights for this dataset: weights have {} channels, data has {}",
                self.tensor.num_channels(),
                num_channels
            )));
        }
        Ok(())
    }
}

pub trait WeightsReader {
    fn read_weights(&self, path: &Path) -> Result<WeightsFile>;
}

/// Chooses the format by file name
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWeightsReader;

impl WeightsReader for FileWeightsReader {
    fn read_weights(&self, path: &Path) -> Result<WeightsFile> {
        let weights = if is_nifti(path) {
            read_nifti_weights(path)?
        } else {
            read_flat_weights(path)?
        };
        log::info!(
            "Loaded weights {}: {:?}, {} channels",
            path.display(),
            weights.tensor.layout(),
            weights.tensor.num_channels()
        );
        Ok(weights)
    }
}

fn is_nifti(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// The weights path as given if it exists, otherwise `DATASET/SAM/NAME`.
pub fn resolve_weights_path(weights: &Path, dataset: &Path) -> PathBuf {
    if weights.exists() {
        return weights.to_path_buf();
    }
    match weights.file_name() {
        Some(name) => {
            let candidate = dataset.join(SAM_DIR).join(name);
            if candidate.exists() {
                log::debug!("Using weights from {}", candidate.display());
                candidate
            } else {
                weights.to_path_buf()
            }
        }
        None => weights.to_path_buf(),
    }
}

pub fn read_flat_weights(path: &Path) -> Result<WeightsFile> {
    let map = mmap_file(path)?;
    if map.len() < FLAT_HEADER_LEN || &map[..8] != FLAT_MAGIC {
        return Err(VprojError::Weights(format!(
            "{} is not a SAM coefficient file",
            path.display()
        )));
    }

    let field = |at: usize| {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&map[at..at + 4]);
        u32::from_le_bytes(buf)
    };
    let version = field(8);
    if version != FLAT_VERSION {
        return Err(VprojError::Weights(format!(
            "Unsupported SAM coefficient version {}",
            version
        )));
    }
    let num_voxels = field(12) as usize;
    let num_channels = field(16) as usize;

    let body = &map[FLAT_HEADER_LEN..];
    let expected = num_voxels
        .checked_mul(num_channels)
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| {
            VprojError::Weights(format!(
                "{}: {} voxels × {} channels overflows the addressable size",
                path.display(),
                num_voxels,
                num_channels
            ))
        })?;
    if body.len() != expected {
        return Err(VprojError::Weights(format!(
            "{}: {} bytes of weights for {} voxels × {} channels",
            path.display(),
            body.len(),
            num_voxels,
            num_channels
        )));
    }

    let tensor = WeightTensor::new(
        VoxelLayout::Flat(num_voxels),
        num_channels,
        f64_le_values(body).collect(),
    )?;
    Ok(WeightsFile {
        tensor,
        affine: None,
    })
}

/// Write weights in the flat SAM coefficient format.
pub fn write_flat_weights(path: &Path, tensor: &WeightTensor) -> Result<()> {
    let to_u32 = |n: usize| {
        u32::try_from(n).map_err(|_| VprojError::Weights(format!("{} does not fit in u32", n)))
    };
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(FLAT_MAGIC)?;
    out.write_all(&FLAT_VERSION.to_le_bytes())?;
    out.write_all(&to_u32(tensor.num_voxels())?.to_le_bytes())?;
    out.write_all(&to_u32(tensor.num_channels())?.to_le_bytes())?;
    for value in tensor.as_slice() {
        out.write_all(&value.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_nifti_weights(path: &Path) -> Result<WeightsFile> {
    let obj = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| VprojError::Weights(format!("Failed to open NIfTI file: {}", e)))?;
    let affine = nifti_affine(obj.header());

    let volume = obj
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| VprojError::Weights(format!("Failed to convert NIfTI volume: {}", e)))?;

    let shape = volume.shape().to_vec();
    if shape.len() != 4 {
        return Err(VprojError::Weights(format!(
            "Expected a 4-D (x, y, z, channel) volume, got shape {:?}",
            shape
        )));
    }
    let (nx, ny, nz, num_channels) = (shape[0], shape[1], shape[2], shape[3]);

    let mut data = Vec::with_capacity(nx * ny * nz * num_channels);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                for c in 0..num_channels {
                    data.push(volume[[x, y, z, c]]);
                }
            }
        }
    }

    let tensor = WeightTensor::new(VoxelLayout::Grid { nz, ny, nx }, num_channels, data)?;
    Ok(WeightsFile {
        tensor,
        affine: Some(affine),
    })
}

/// sform rows when present, else a diagonal from the voxel sizes.
fn nifti_affine(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let row = |r: [f32; 4]| r.map(f64::from);
        [
            row(header.srow_x),
            row(header.srow_y),
            row(header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        let d = |i: usize| f64::from(header.pixdim[i]);
        [
            [d(1), 0.0, 0.0, 0.0],
            [0.0, d(2), 0.0, 0.0],
            [0.0, 0.0, d(3), 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use nifti::writer::WriterOptions;

    fn flat(rows: &[&[f64]]) -> WeightTensor {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        WeightTensor::new(VoxelLayout::Flat(rows.len()), rows[0].len(), data).unwrap()
    }

    #[test]
    fn test_flat_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.wts");
        let tensor = flat(&[&[1.0, 0.5, -0.25], &[0.0, 0.0, 0.0]]);
        write_flat_weights(&path, &tensor).unwrap();

        let file = FileWeightsReader.read_weights(&path).unwrap();
        assert_eq!(file.tensor, tensor);
        assert!(file.affine.is_none());
        assert_eq!(file.tensor.row(0), &[1.0, 0.5, -0.25]);
    }

    #[test]
    fn test_flat_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wts");
        std::fs::write(&path, b"not weights at all").unwrap();
        assert!(matches!(
            read_flat_weights(&path),
            Err(VprojError::Weights(_))
        ));

        let tensor = flat(&[&[1.0, 2.0]]);
        write_flat_weights(&path, &tensor).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 4);
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            read_flat_weights(&path),
            Err(VprojError::Weights(_))
        ));
    }

    #[test]
    fn test_flat_oversized_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.wts");
        let mut bytes = FLAT_MAGIC.to_vec();
        bytes.extend_from_slice(&FLAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_flat_weights(&path),
            Err(VprojError::Weights(_))
        ));
    }

    #[test]
    fn test_channel_check() {
        let file = WeightsFile {
            tensor: flat(&[&[1.0, 2.0, 3.0, 4.0]]),
            affine: None,
        };
        assert!(file.check_channels(4).is_ok());
        assert!(matches!(
            file.check_channels(3),
            Err(VprojError::Validation(_))
        ));
    }

    #[test]
    fn test_tensor_shape_checked() {
        assert!(WeightTensor::new(VoxelLayout::Grid { nz: 2, ny: 2, nx: 2 }, 3, vec![0.0; 23]).is_err());
    }

    #[test]
    fn test_weights_path_falls_back_to_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dir.path().join("subj.ds");
        std::fs::create_dir_all(ds.join(SAM_DIR)).unwrap();
        std::fs::write(ds.join(SAM_DIR).join("beta.wts"), b"x").unwrap();

        let resolved = resolve_weights_path(Path::new("beta.wts"), &ds);
        assert_eq!(resolved, ds.join(SAM_DIR).join("beta.wts"));

        let missing = resolve_weights_path(Path::new("gamma.wts"), &ds);
        assert_eq!(missing, PathBuf::from("gamma.wts"));
    }

    #[test]
    fn test_nifti_grid_and_affine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.nii");

        // (x, y, z, channel) with value encoding its position
        let volume = Array4::from_shape_fn((3, 2, 2, 2), |(x, y, z, c)| {
            (x * 1000 + y * 100 + z * 10 + c) as f64
        });
        let mut header = NiftiHeader::default();
        header.sform_code = 1;
        header.srow_x = [5.0, 0.0, 0.0, -7.5];
        header.srow_y = [0.0, 5.0, 0.0, -2.5];
        header.srow_z = [0.0, 0.0, 5.0, 1.0];
        WriterOptions::new(&path)
            .reference_header(&header)
            .write_nifti(&volume)
            .unwrap();

        let file = FileWeightsReader.read_weights(&path).unwrap();
        assert_eq!(file.tensor.layout(), VoxelLayout::Grid { nz: 2, ny: 2, nx: 3 });
        assert_eq!(file.tensor.num_channels(), 2);
        let row = file.tensor.grid_row_index(1, 0, 2).unwrap();
        assert_eq!(file.tensor.row(row), &[2010.0, 2011.0]);

        let affine = file.affine.unwrap();
        assert_eq!(affine[0], [5.0, 0.0, 0.0, -7.5]);
        assert_eq!(affine[2][3], 1.0);
        assert_eq!(affine[3], [0.0, 0.0, 0.0, 1.0]);
    }
}
