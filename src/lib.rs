//! Parallel pairwise aggregation for algebraic multigrid coarsening.
//!
//! <br>
//!
//! Given the weight graph of a sparse linear system, the nodes are grouped into
//! small aggregates which become the unknowns of the next coarser level. The
//! aggregation is built by greedy mutual matching: every free node proposes to
//! its strongest free neighbor (edge weight scaled by the larger of the two
//! diagonal magnitudes, ties going to the larger index), and pairs that propose
//! to each other merge. A few rounds of this pair up most of the graph. Nodes
//! that are left over join the aggregate of their strongest aggregated neighbor
//! or stay alone, and the aggregates are finally numbered densely in order of
//! their representative node.
//!
//! All phases run as rayon loops over nodes without locks. The leftover pass
//! comes in a reproducible snapshot flavor and a faster in-place flavor, see
//! [`config::FallbackMode`].
//!
//! ```
//! use pgm_match::{config::AggregationConfig, graph::WeightedGraph, partitioner::pairwise_aggregation};
//!
//! // path 0 - 1 - 2 - 3 with unit weights
//! let graph = WeightedGraph::try_new(
//!     vec![0, 1, 3, 5, 6],
//!     vec![1, 0, 2, 1, 3, 2],
//!     vec![1.0; 6],
//!     vec![1.0; 4],
//! )
//! .unwrap();
//! let aggregation = pairwise_aggregation(&graph, &AggregationConfig::default());
//! assert_eq!(aggregation.node_assignments(), &[0, 0, 1, 1]);
//! ```

use sprs::CsMatBase;

#[macro_use]
extern crate log;
extern crate approx;

pub mod config;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod parallel_ops;
pub mod partitioner;
pub mod strength;

pub type CsrMatrix = CsMatBase<f64, usize, Vec<usize>, Vec<usize>, Vec<f64>, usize>;

pub use config::{AggregationConfig, FallbackMode};
pub use error::{ConfigError, GraphError};
pub use graph::WeightedGraph;
pub use hierarchy::{Hierarchy, HierarchyLimits};
pub use partitioner::{pairwise_aggregation, Aggregation, AggregationStats};
