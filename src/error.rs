use thiserror::Error;

/// Contract violations of a weighted graph handed to the aggregation engine.
/// These are caught when the graph is built, never in the middle of a round.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("row offsets must contain at least one entry")]
    EmptyRowOffsets,
    #[error("row offsets must start at 0, found {0}")]
    NonZeroFirstOffset(usize),
    #[error("row offsets decrease at row {row}: {start} > {end}")]
    DecreasingRowOffsets { row: usize, start: usize, end: usize },
    #[error("last row offset is {last} but there are {edges} column indices")]
    EdgeCountMismatch { last: usize, edges: usize },
    #[error("{weights} weights given for {edges} column indices")]
    WeightCountMismatch { weights: usize, edges: usize },
    #[error("diagonal has {diagonal} entries for {nodes} nodes")]
    DiagonalLengthMismatch { diagonal: usize, nodes: usize },
    #[error("column index {col} at edge {edge} is out of range for {nodes} nodes")]
    ColumnOutOfRange { edge: usize, col: usize, nodes: usize },
    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("max_unassigned_ratio must be within [0, 1], got {0}")]
    InvalidRatio(f64),
}
