//! Weight graph of a sparse matrix in the form the aggregation engine expects.
//! Edge weights are the symmetrized magnitudes `(|A| + |A|^T) / 2` and the
//! diagonal scale is `|a_ii|` (zero for rows without a stored diagonal).

use crate::error::GraphError;
use crate::graph::WeightedGraph;
use crate::CsrMatrix;

impl WeightedGraph {
    pub fn from_matrix(mat: &CsrMatrix) -> Result<Self, GraphError> {
        if mat.rows() != mat.cols() {
            return Err(GraphError::NotSquare {
                rows: mat.rows(),
                cols: mat.cols(),
            });
        }
        let abs = mat.to_csr().map(|val| val.abs());
        let abs_t = abs.transpose_view().to_csr();
        let weights = (&abs + &abs_t).map(|val| 0.5 * val);

        let diagonal: Vec<f64> = abs
            .outer_iterator()
            .enumerate()
            .map(|(i, row)| row.get(i).copied().unwrap_or(0.0))
            .collect();

        let mut row_offsets = Vec::with_capacity(weights.rows() + 1);
        let mut col_indices = Vec::with_capacity(weights.nnz());
        let mut values = Vec::with_capacity(weights.nnz());
        row_offsets.push(0);
        for row in weights.outer_iterator() {
            col_indices.extend_from_slice(row.indices());
            values.extend_from_slice(row.data());
            row_offsets.push(col_indices.len());
        }

        trace!(
            "weight graph: {} nodes, {} stored edges",
            diagonal.len(),
            col_indices.len()
        );
        Self::try_new(row_offsets, col_indices, values, diagonal)
    }
}
