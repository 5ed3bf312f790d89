//! Compressed row weight graph consumed by the aggregation engine.
//!
//! The graph is read-only for the lifetime of an aggregation: every phase of
//! the engine shares it by reference across rayon workers.

use crate::error::GraphError;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedGraph {
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    weights: Vec<f64>,
    diagonal: Vec<f64>,
}

impl WeightedGraph {
    /// Builds a graph from raw compressed row arrays, rejecting anything that
    /// would let the engine index out of bounds. Numerically degenerate values
    /// (zero diagonal, NaN weights) are accepted as is.
    pub fn try_new(
        row_offsets: Vec<usize>,
        col_indices: Vec<usize>,
        weights: Vec<f64>,
        diagonal: Vec<f64>,
    ) -> Result<Self, GraphError> {
        let first = *row_offsets.first().ok_or(GraphError::EmptyRowOffsets)?;
        if first != 0 {
            return Err(GraphError::NonZeroFirstOffset(first));
        }
        for (row, pair) in row_offsets.windows(2).enumerate() {
            if pair[0] > pair[1] {
                return Err(GraphError::DecreasingRowOffsets {
                    row,
                    start: pair[0],
                    end: pair[1],
                });
            }
        }

        let nodes = row_offsets.len() - 1;
        let edges = col_indices.len();
        let last = row_offsets[nodes];
        if last != edges {
            return Err(GraphError::EdgeCountMismatch { last, edges });
        }
        if weights.len() != edges {
            return Err(GraphError::WeightCountMismatch {
                weights: weights.len(),
                edges,
            });
        }
        if diagonal.len() != nodes {
            return Err(GraphError::DiagonalLengthMismatch {
                diagonal: diagonal.len(),
                nodes,
            });
        }
        if let Some((edge, col)) = col_indices
            .iter()
            .copied()
            .enumerate()
            .find(|(_, col)| *col >= nodes)
        {
            return Err(GraphError::ColumnOutOfRange { edge, col, nodes });
        }

        Ok(Self {
            row_offsets,
            col_indices,
            weights,
            diagonal,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn num_edges(&self) -> usize {
        self.col_indices.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn diagonal(&self) -> &[f64] {
        &self.diagonal
    }

    /// Stored `(col, value)` entries of a row, self loops included.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.weights[range].iter().copied())
    }

    /// Off-diagonal neighbors of `row` with their diagonally scaled strength.
    pub fn scaled_neighbors(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.row(row)
            .filter(move |(col, _)| *col != row)
            .map(move |(col, value)| (col, self.scaled_weight(row, col, value)))
    }

    /// `value / max(|d_row|, |d_col|)`
    pub fn scaled_weight(&self, row: usize, col: usize, value: f64) -> f64 {
        value / self.diagonal[row].abs().max(self.diagonal[col].abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn path3() -> WeightedGraph {
        WeightedGraph::try_new(
            vec![0, 1, 3, 4],
            vec![1, 0, 2, 1],
            vec![1.0, 1.0, 2.0, 2.0],
            vec![1.0, 4.0, 2.0],
        )
        .unwrap()
    }

    #[test]
    fn accepts_well_formed_input() {
        let graph = path3();
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_edges(), 4);
        assert_eq!(graph.row(1).collect::<Vec<_>>(), vec![(0, 1.0), (2, 2.0)]);
    }

    #[test]
    fn scales_by_larger_diagonal_magnitude() {
        let graph = WeightedGraph::try_new(
            vec![0, 1, 2],
            vec![1, 0],
            vec![3.0, 3.0],
            vec![-6.0, 2.0],
        )
        .unwrap();
        let neighbors: Vec<_> = graph.scaled_neighbors(0).collect();
        assert_eq!(neighbors.len(), 1);
        assert_relative_eq!(neighbors[0].1, 0.5);
    }

    #[test]
    fn self_loops_are_not_neighbors() {
        let graph = WeightedGraph::try_new(
            vec![0, 2, 3],
            vec![0, 1, 0],
            vec![5.0, 1.0, 1.0],
            vec![1.0, 1.0],
        )
        .unwrap();
        let neighbors: Vec<usize> = graph.scaled_neighbors(0).map(|(col, _)| col).collect();
        assert_eq!(neighbors, vec![1]);
    }

    #[test]
    fn empty_graph_is_valid() {
        let graph = WeightedGraph::try_new(vec![0], vec![], vec![], vec![]).unwrap();
        assert_eq!(graph.num_nodes(), 0);
    }

    #[test]
    fn rejects_malformed_offsets() {
        assert_eq!(
            WeightedGraph::try_new(vec![], vec![], vec![], vec![]),
            Err(GraphError::EmptyRowOffsets)
        );
        assert_eq!(
            WeightedGraph::try_new(vec![1, 1], vec![0], vec![1.0], vec![1.0]),
            Err(GraphError::NonZeroFirstOffset(1))
        );
        assert_eq!(
            WeightedGraph::try_new(vec![0, 2, 1], vec![0, 1], vec![1.0; 2], vec![1.0; 2]),
            Err(GraphError::DecreasingRowOffsets {
                row: 1,
                start: 2,
                end: 1
            })
        );
        assert_eq!(
            WeightedGraph::try_new(vec![0, 1, 1], vec![1, 0], vec![1.0; 2], vec![1.0; 2]),
            Err(GraphError::EdgeCountMismatch { last: 1, edges: 2 })
        );
    }

    #[test]
    fn rejects_mismatched_lengths_and_columns() {
        assert_eq!(
            WeightedGraph::try_new(vec![0, 1, 2], vec![1, 0], vec![1.0], vec![1.0; 2]),
            Err(GraphError::WeightCountMismatch {
                weights: 1,
                edges: 2
            })
        );
        assert_eq!(
            WeightedGraph::try_new(vec![0, 1, 2], vec![1, 0], vec![1.0; 2], vec![1.0]),
            Err(GraphError::DiagonalLengthMismatch {
                diagonal: 1,
                nodes: 2
            })
        );
        assert_eq!(
            WeightedGraph::try_new(vec![0, 1, 2], vec![1, 2], vec![1.0; 2], vec![1.0; 2]),
            Err(GraphError::ColumnOutOfRange {
                edge: 1,
                col: 2,
                nodes: 2
            })
        );
    }

    #[test]
    fn nan_weights_are_accepted() {
        let graph = WeightedGraph::try_new(
            vec![0, 1, 2],
            vec![1, 0],
            vec![f64::NAN, f64::NAN],
            vec![0.0, 0.0],
        );
        assert!(graph.is_ok());
    }
}
