//! Dual basis of a weight tensor.
//!
//! For weights `W` (voxels × channels) the dual is `W (WᵀW)⁻¹`, the transpose
//! of the Moore–Penrose pseudo-inverse, so `Wᵀ · dual(W) = I`. Rows that are
//! zero in `W` stay exactly zero.

use nalgebra::DMatrix;

use crate::error::{Result, VprojError};
use crate::weights::WeightTensor;

/// Shape-preserving transform applied to weights before projection
pub trait DualBasis {
    fn transform(&self, tensor: &WeightTensor) -> Result<WeightTensor>;
}

#[derive(Debug, Clone, Copy)]
pub struct PseudoInverseDual {
    /// Singular values below this are treated as zero in the SVD fallback
    pub epsilon: f64,
}

impl Default for PseudoInverseDual {
    fn default() -> Self {
        Self { epsilon: 1e-12 }
    }
}

impl DualBasis for PseudoInverseDual {
    fn transform(&self, tensor: &WeightTensor) -> Result<WeightTensor> {
        let n = tensor.num_voxels();
        let m = tensor.num_channels();
        let w = DMatrix::from_row_slice(n, m, tensor.as_slice());

        let gram = w.transpose() * &w;
        let dual = match gram.try_inverse() {
            Some(inverse) => &w * inverse,
            None => {
                log::warn!("Weight Gram matrix is singular, using SVD pseudo-inverse");
                w.clone()
                    .pseudo_inverse(self.epsilon)
                    .map_err(|e| VprojError::Weights(format!("Pseudo-inverse failed: {}", e)))?
                    .transpose()
            }
        };

        // DMatrix is column-major; back to voxel-major rows
        let data = dual.transpose().as_slice().to_vec();
        WeightTensor::new(tensor.layout(), m, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::VoxelLayout;

    fn tensor(layout: VoxelLayout, m: usize, data: &[f64]) -> WeightTensor {
        WeightTensor::new(layout, m, data.to_vec()).unwrap()
    }

    #[test]
    fn test_dual_is_biorthogonal() {
        let w = tensor(
            VoxelLayout::Flat(4),
            3,
            &[1.0, 2.0, 0.0, 0.5, -1.0, 1.0, 3.0, 0.0, 1.0, 0.0, 1.0, 2.0],
        );
        let dual = PseudoInverseDual::default().transform(&w).unwrap();
        assert_eq!(dual.layout(), w.layout());

        let wm = DMatrix::from_row_slice(4, 3, w.as_slice());
        let dm = DMatrix::from_row_slice(4, 3, dual.as_slice());
        let product = wm.transpose() * dm;
        let identity = DMatrix::<f64>::identity(3, 3);
        assert!((product - identity).abs().max() < 1e-10);
    }

    #[test]
    fn test_zero_rows_stay_zero() {
        let w = tensor(
            VoxelLayout::Grid { nz: 1, ny: 2, nx: 2 },
            2,
            &[1.0, 0.0, 0.0, 0.0, 0.5, 2.0, 0.0, 0.0],
        );
        let dual = PseudoInverseDual::default().transform(&w).unwrap();
        assert_eq!(dual.row(1), &[0.0, 0.0]);
        assert_eq!(dual.row(3), &[0.0, 0.0]);
        assert!(dual.row(0).iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_rank_deficient_uses_svd() {
        // Second channel never used: WᵀW is singular
        let w = tensor(VoxelLayout::Flat(2), 2, &[1.0, 0.0, 2.0, 0.0]);
        let dual = PseudoInverseDual::default().transform(&w).unwrap();
        assert!((dual.row(0)[0] - 0.2).abs() < 1e-12);
        assert!((dual.row(1)[0] - 0.4).abs() < 1e-12);
        assert!(dual.row(0)[1].abs() < 1e-12);
    }
}
