//! Degree-normalized adjacency matrices over the 17-joint skeleton.
//!
//! Matrices are assembled on the host with nalgebra, then uploaded once per
//! model as constant tensors. No branch ever writes to them.

use candle_core::{Device, Tensor};
use nalgebra::{DMatrix, DVector};
use pgception_core::{Branch, Error, Keypoint, Result, Topology};

/// Degree normalization applied to a raw adjacency matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// D^-1/2 · A · D^-1/2
    #[default]
    Symmetric,
    /// D^-1 · A
    RowStochastic,
}

/// Normalized joint adjacency matrix
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyMatrix {
    matrix: DMatrix<f32>,
}

impl AdjacencyMatrix {
    /// Build a normalized adjacency matrix.
    ///
    /// `neighbors[i]` lists the joints that joint `i` aggregates from; joints
    /// past the end of the table have no neighbors. `None` connects every
    /// joint to every joint.
    ///
    /// A joint with no neighbors has degree zero and turns the result
    /// non-finite; see [`AdjacencyMatrix::is_finite`].
    pub fn build(
        neighbors: Option<&[&[usize]]>,
        joint_count: usize,
        normalization: Normalization,
    ) -> Result<Self> {
        let n = joint_count;

        let a = match neighbors {
            Some(table) => {
                if table.len() > n {
                    return Err(Error::InvalidInput(format!(
                        "neighbor table has {} rows for {n} joints",
                        table.len()
                    )));
                }
                let mut a = DMatrix::<f32>::zeros(n, n);
                for (i, row) in table.iter().enumerate() {
                    for &j in row.iter() {
                        if j >= n {
                            return Err(Error::InvalidInput(format!(
                                "joint {i} lists neighbor {j}, out of range for {n} joints"
                            )));
                        }
                        a[(i, j)] = 1.0;
                    }
                }
                a
            }
            None => DMatrix::<f32>::from_element(n, n, 1.0),
        };

        let degree = DVector::<f32>::from_iterator(n, a.row_iter().map(|row| row.sum()));

        let matrix = match normalization {
            Normalization::Symmetric => {
                let d = DMatrix::from_diagonal(&degree.map(|x| x.powf(-0.5)));
                &d * &a * &d
            }
            Normalization::RowStochastic => {
                let d = DMatrix::from_diagonal(&degree.map(|x| x.powi(-1)));
                &d * &a
            }
        };

        Ok(Self { matrix })
    }

    /// Self-only aggregation
    pub fn identity(joint_count: usize) -> Self {
        Self {
            matrix: DMatrix::identity(joint_count, joint_count),
        }
    }

    /// The fixed, symmetric-normalized matrix used by `branch`
    pub fn for_branch(branch: Branch) -> Result<Self> {
        match branch.topology() {
            Topology::SelfOnly => Ok(Self::identity(Keypoint::COUNT)),
            Topology::Table(table) => {
                Self::build(Some(&table[..]), Keypoint::COUNT, Normalization::Symmetric)
            }
            Topology::Complete => Self::build(None, Keypoint::COUNT, Normalization::Symmetric),
        }
    }

    pub fn joint_count(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.matrix[(row, col)]
    }

    pub fn matrix(&self) -> &DMatrix<f32> {
        &self.matrix
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }

    /// Upload as a `[joints, joints]` row-major tensor
    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        let n = self.joint_count();
        // nalgebra stores column-major
        let row_major = self.matrix.transpose();
        Tensor::from_slice(row_major.as_slice(), (n, n), device)
    }
}

/// The four branch adjacencies of one model, uploaded once
#[derive(Debug, Clone)]
pub struct BranchAdjacency {
    matrices: [Tensor; Branch::COUNT],
}

impl BranchAdjacency {
    pub fn new(device: &Device) -> candle_core::Result<Self> {
        let upload = |branch: Branch| -> candle_core::Result<Tensor> {
            AdjacencyMatrix::for_branch(branch)
                .map_err(candle_core::Error::wrap)?
                .to_tensor(device)
        };

        Ok(Self {
            matrices: [
                upload(Branch::Identity)?,
                upload(Branch::Local)?,
                upload(Branch::Extended)?,
                upload(Branch::Dense)?,
            ],
        })
    }

    pub fn get(&self, branch: Branch) -> &Tensor {
        &self.matrices[branch.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::SymmetricEigen;
    use pgception_core::{EXTENDED_NEIGHBORS, LOCAL_NEIGHBORS};

    const EPS: f32 = 1e-5;

    #[test]
    fn test_dense_entries_are_uniform() -> Result<()> {
        let adj = AdjacencyMatrix::build(None, Keypoint::COUNT, Normalization::Symmetric)?;
        for i in 0..Keypoint::COUNT {
            for j in 0..Keypoint::COUNT {
                assert!((adj.get(i, j) - 1.0 / 17.0).abs() < EPS);
            }
        }
        Ok(())
    }

    #[test]
    fn test_symmetric_eigenvalues_bounded() -> Result<()> {
        for table in [&LOCAL_NEIGHBORS, &EXTENDED_NEIGHBORS] {
            let adj =
                AdjacencyMatrix::build(Some(&table[..]), Keypoint::COUNT, Normalization::Symmetric)?;
            assert!(adj.is_finite());

            let eigen = SymmetricEigen::new(adj.matrix().clone());
            for &lambda in eigen.eigenvalues.iter() {
                assert!((-1.0 - EPS..=1.0 + EPS).contains(&lambda), "eigenvalue {lambda}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_symmetric_normalization_entries() -> Result<()> {
        let adj = AdjacencyMatrix::build(
            Some(&LOCAL_NEIGHBORS[..]),
            Keypoint::COUNT,
            Normalization::Symmetric,
        )?;
        // nose has degree 5, left eye degree 3
        let expected = 1.0 / (5.0f32 * 3.0).sqrt();
        assert!((adj.get(0, 1) - expected).abs() < EPS);
        assert!((adj.get(1, 0) - expected).abs() < EPS);
        assert_eq!(adj.get(0, 3), 0.0);
        Ok(())
    }

    #[test]
    fn test_row_stochastic_rows_sum_to_one() -> Result<()> {
        let adj = AdjacencyMatrix::build(
            Some(&EXTENDED_NEIGHBORS[..]),
            Keypoint::COUNT,
            Normalization::RowStochastic,
        )?;
        for row in adj.matrix().row_iter() {
            assert!((row.sum() - 1.0).abs() < EPS);
        }
        Ok(())
    }

    #[test]
    fn test_directed_edges_are_kept() -> Result<()> {
        let table: [&[usize]; 3] = [&[0, 1], &[1], &[2]];
        let adj = AdjacencyMatrix::build(Some(&table[..]), 3, Normalization::RowStochastic)?;
        assert!((adj.get(0, 1) - 0.5).abs() < EPS);
        assert_eq!(adj.get(1, 0), 0.0);
        Ok(())
    }

    #[test]
    fn test_isolated_joint_is_not_finite() -> Result<()> {
        let table: [&[usize]; 3] = [&[0, 1], &[0, 1], &[]];
        let adj = AdjacencyMatrix::build(Some(&table[..]), 3, Normalization::Symmetric)?;
        assert!(!adj.is_finite());
        Ok(())
    }

    #[test]
    fn test_out_of_range_neighbor_rejected() {
        let table: [&[usize]; 2] = [&[0, 5], &[1]];
        let result = AdjacencyMatrix::build(Some(&table[..]), 2, Normalization::Symmetric);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_branch_tensors() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let adjacency = BranchAdjacency::new(&device)?;

        let identity: Vec<Vec<f32>> = adjacency.get(Branch::Identity).to_vec2()?;
        for (i, row) in identity.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                assert_eq!(*v, if i == j { 1.0 } else { 0.0 });
            }
        }

        let local = AdjacencyMatrix::for_branch(Branch::Local).map_err(candle_core::Error::wrap)?;
        let uploaded: Vec<Vec<f32>> = adjacency.get(Branch::Local).to_vec2()?;
        assert!((uploaded[5][11] - local.get(5, 11)).abs() < EPS);
        assert_eq!(adjacency.get(Branch::Dense).dims(), &[17, 17]);
        Ok(())
    }
}
