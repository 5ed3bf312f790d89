use core::fmt;

use crate::config::AggregationConfig;
use crate::error::GraphError;
use crate::graph::WeightedGraph;
use crate::partitioner::{pairwise_aggregation, Aggregation};
use crate::CsrMatrix;

#[derive(Debug, Clone, Copy)]
pub struct HierarchyLimits {
    /// Total number of levels, the fine level included.
    pub max_levels: usize,
    /// Stop coarsening once a level has at most this many rows.
    pub min_coarse_size: usize,
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self {
            max_levels: 10,
            min_coarse_size: 16,
        }
    }
}

/// Levels of Galerkin coarse matrices built from repeated pairwise aggregation.
#[derive(Clone)]
pub struct Hierarchy {
    matrices: Vec<CsrMatrix>,
    partition_matrices: Vec<CsrMatrix>,
    aggregations: Vec<Aggregation>,
}

impl fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<usize> = self.matrices.iter().map(|a| a.rows()).collect();
        let nnzs: Vec<usize> = self.matrices.iter().map(|a| a.nnz()).collect();
        let coarsening_factors: Vec<f32> = sizes
            .iter()
            .zip(sizes.iter().skip(1))
            .map(|(a, b)| (*a as f32) / (*b as f32))
            .collect();

        f.debug_struct("Hierarchy")
            .field("levels", &self.levels())
            .field("sizes", &sizes)
            .field("coarsening_factors", &coarsening_factors)
            .field("nnz", &nnzs)
            .field("op_complexity", &self.op_complexity())
            .finish()
    }
}

impl Hierarchy {
    pub fn new(mat: CsrMatrix) -> Self {
        Self {
            matrices: vec![mat],
            partition_matrices: Vec::new(),
            aggregations: Vec::new(),
        }
    }

    /// Coarsens `mat` level by level until a limit is reached or an
    /// aggregation stops reducing the problem size.
    pub fn build(
        mat: CsrMatrix,
        config: &AggregationConfig,
        limits: HierarchyLimits,
    ) -> Result<Self, GraphError> {
        let mut hierarchy = Self::new(mat.to_csr());

        while hierarchy.levels() < limits.max_levels {
            let fine = hierarchy.get_matrix(hierarchy.levels() - 1);
            let fine_size = fine.rows();
            if fine_size <= limits.min_coarse_size {
                debug!("stopping at {fine_size} rows");
                break;
            }

            let graph = WeightedGraph::from_matrix(fine)?;
            let aggregation = pairwise_aggregation(&graph, config);
            if aggregation.naggs() == fine_size {
                warn!("aggregation did not coarsen a level with {fine_size} rows, stopping");
                break;
            }

            info!("level {}: {:?}", hierarchy.levels(), aggregation);
            hierarchy.push(aggregation);
        }
        Ok(hierarchy)
    }

    /// Adds a level from an aggregation of the current coarsest matrix.
    pub fn push(&mut self, aggregation: Aggregation) {
        let level = self.partition_matrices.len();
        assert_eq!(aggregation.nnodes(), self.matrices[level].rows());
        let partition_mat = aggregation.interpolation();
        let p_transpose = partition_mat.transpose_view().to_owned();
        let coarse_mat = (&p_transpose * &(&self.matrices[level] * &partition_mat)).to_csr();
        self.matrices.push(coarse_mat);
        self.partition_matrices.push(partition_mat);
        self.aggregations.push(aggregation);
    }

    /// Number of levels in the hierarchy. (Number of P matrices is one less)
    pub fn levels(&self) -> usize {
        self.matrices.len()
    }

    pub fn get_matrix(&self, level: usize) -> &CsrMatrix {
        &self.matrices[level]
    }

    pub fn get_partition(&self, level: usize) -> &CsrMatrix {
        &self.partition_matrices[level]
    }

    pub fn get_aggregation(&self, level: usize) -> &Aggregation {
        &self.aggregations[level]
    }

    pub fn get_matrices(&self) -> &Vec<CsrMatrix> {
        &self.matrices
    }

    pub fn get_partitions(&self) -> &Vec<CsrMatrix> {
        &self.partition_matrices
    }

    pub fn get_aggregations(&self) -> &Vec<Aggregation> {
        &self.aggregations
    }

    /// Total nnz / finest level nnz
    pub fn op_complexity(&self) -> f64 {
        let fine_nnz = self.matrices[0].nnz();
        let total_nnz = self.matrices.iter().map(|a| a.nnz()).sum::<usize>() as f64;
        total_nnz / (fine_nnz as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FallbackMode;
    use approx::assert_relative_eq;
    use sprs::TriMat;
    use test_generator::test_resources;

    /// 5 point Laplacian on an `n x n` grid.
    fn laplace_2d(n: usize) -> CsrMatrix {
        let mut tri = TriMat::new((n * n, n * n));
        for i in 0..n {
            for j in 0..n {
                let row = i * n + j;
                tri.add_triplet(row, row, 4.0);
                if i > 0 {
                    tri.add_triplet(row, row - n, -1.0);
                }
                if i + 1 < n {
                    tri.add_triplet(row, row + n, -1.0);
                }
                if j > 0 {
                    tri.add_triplet(row, row - 1, -1.0);
                }
                if j + 1 < n {
                    tri.add_triplet(row, row + 1, -1.0);
                }
            }
        }
        tri.to_csr()
    }

    fn total_sum(mat: &CsrMatrix) -> f64 {
        mat.data().iter().sum()
    }

    #[test]
    fn laplace_hierarchy_coarsens() {
        let mat = laplace_2d(20);
        let hierarchy = Hierarchy::build(
            mat,
            &AggregationConfig::default(),
            HierarchyLimits {
                max_levels: 4,
                min_coarse_size: 4,
            },
        )
        .unwrap();

        assert_eq!(hierarchy.levels(), 4);
        let sizes: Vec<usize> = hierarchy.get_matrices().iter().map(|a| a.rows()).collect();
        assert!(sizes.windows(2).all(|pair| pair[1] < pair[0]));

        let fine_sum = total_sum(hierarchy.get_matrix(0));
        for (level, mat) in hierarchy.get_matrices().iter().enumerate() {
            assert_eq!(mat.rows(), mat.cols());
            // piecewise constant P keeps 1^T A 1
            assert_relative_eq!(total_sum(mat), fine_sum, epsilon = 1e-9);
            if level > 0 {
                assert_eq!(hierarchy.get_aggregation(level - 1).naggs(), mat.rows());
            }
        }
        assert!(hierarchy.op_complexity() > 1.0);
    }

    #[test]
    fn stops_at_min_coarse_size() {
        let hierarchy = Hierarchy::build(
            laplace_2d(4),
            &AggregationConfig::default(),
            HierarchyLimits {
                max_levels: 10,
                min_coarse_size: 16,
            },
        )
        .unwrap();
        assert_eq!(hierarchy.levels(), 1);
        assert!(hierarchy.get_partitions().is_empty());
    }

    #[test]
    fn stops_when_nothing_coarsens() {
        // diagonal matrix: every node is isolated
        let mut tri = TriMat::new((30, 30));
        for i in 0..30 {
            tri.add_triplet(i, i, 2.0);
        }
        let hierarchy = Hierarchy::build(
            tri.to_csr(),
            &AggregationConfig::default(),
            HierarchyLimits::default(),
        )
        .unwrap();
        assert_eq!(hierarchy.levels(), 1);
    }

    #[test]
    fn rejects_rectangular_input() {
        let mut tri = TriMat::new((20, 30));
        tri.add_triplet(0, 29, 1.0);
        let result = Hierarchy::build(
            tri.to_csr(),
            &AggregationConfig::default(),
            HierarchyLimits::default(),
        );
        assert!(matches!(result, Err(GraphError::NotSquare { .. })));
    }

    #[test_resources("test_matrices/*")]
    fn partition_times_ones_is_ones(mat_path: &str) {
        let mat: CsrMatrix = sprs::io::read_matrix_market::<f64, usize, _>(mat_path)
            .unwrap()
            .to_csr();

        for fallback in [FallbackMode::Snapshot, FallbackMode::InPlace] {
            let config = AggregationConfig {
                fallback,
                ..AggregationConfig::default()
            };
            let hierarchy = Hierarchy::build(
                mat.clone(),
                &config,
                HierarchyLimits {
                    max_levels: 3,
                    min_coarse_size: 1,
                },
            )
            .unwrap();

            for p in hierarchy.get_partitions().iter() {
                let result: Vec<f64> = p
                    .outer_iterator()
                    .map(|row| row.data().iter().sum())
                    .collect();
                let inner_product: f64 = result.iter().map(|x| x * x).sum();
                assert_relative_eq!(inner_product, result.len() as f64, epsilon = 1e-9);
            }
        }
    }
}
