//! Parallel pairwise aggregation.
//!
//! Nodes are paired by repeated rounds of greedy mutual matching on the
//! diagonally scaled weight graph. Whatever is still unpaired once the rounds
//! stop is attached to the strongest neighboring aggregate (or becomes a
//! singleton), and finally the representative ids are compacted to `0..naggs`.
//!
//! Working assignments use `isize` with [`UNAGGREGATED`] marking free nodes.
//! While matching, a non-negative entry is the index of the aggregate's
//! representative node `r`, which always satisfies `agg[r] == r`.
//!
//! Every phase is a rayon loop over nodes and the phases run strictly one after
//! another. Within a phase a worker only ever writes its own node's slot:
//! - neighbor selection decides against the assignments as they were when the
//!   round started, then writes its own `agg`/`strongest` entries,
//! - edge matching is symmetric, both ends of a mutual pair compute the same
//!   representative (the smaller index) and each stores it in its own slot,
//! - in-place fallback reads neighbors' slots that are written at most once.

use std::{
    fmt,
    sync::atomic::{AtomicIsize, Ordering},
};

use rayon::prelude::*;
use serde::Serialize;
use sprs::TriMat;

use crate::{
    config::{AggregationConfig, FallbackMode},
    graph::WeightedGraph,
    parallel_ops::{count_where, exclusive_prefix_sum},
    CsrMatrix,
};

pub const UNAGGREGATED: isize = -1;
pub const NO_CANDIDATE: isize = -1;

/// Running maximum of `(weight, neighbor)` keys compared lexicographically, so
/// equal weights are broken in favor of the larger neighbor index. The empty
/// maximum is the key `(0, none)`, so negative weights never qualify. NaN
/// compares false against everything and never wins either.
#[derive(Debug, Clone, Copy, Default)]
struct Strongest {
    best: Option<(f64, usize)>,
}

impl Strongest {
    fn offer(&mut self, weight: f64, col: usize) {
        let wins = match self.best {
            None => weight >= 0.0,
            Some((best_weight, best_col)) => {
                weight > best_weight || (weight == best_weight && col > best_col)
            }
        };
        if wins {
            self.best = Some((weight, col));
        }
    }

    fn neighbor(&self) -> Option<usize> {
        self.best.map(|(_, col)| col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Selection {
    Aggregated,
    Attach(isize),
    Candidate(usize),
}

fn select_neighbor(graph: &WeightedGraph, agg: &[isize], row: usize) -> Selection {
    if agg[row] != UNAGGREGATED {
        return Selection::Aggregated;
    }
    let mut free = Strongest::default();
    let mut taken = Strongest::default();
    for (col, weight) in graph.scaled_neighbors(row) {
        if agg[col] == UNAGGREGATED {
            free.offer(weight, col);
        } else {
            taken.offer(weight, col);
        }
    }
    match (free.neighbor(), taken.neighbor()) {
        (Some(col), _) => Selection::Candidate(col),
        (None, Some(col)) => Selection::Attach(agg[col]),
        (None, None) => Selection::Candidate(row),
    }
}

/// For every unaggregated node, records its strongest unaggregated neighbor in
/// `strongest` (itself when it has none). A node whose neighbors are all
/// aggregated joins the aggregate of the strongest of them right away.
pub fn find_strongest_neighbor(graph: &WeightedGraph, agg: &mut [isize], strongest: &mut [isize]) {
    let selections: Vec<Selection> = {
        let round_start: &[isize] = agg;
        (0..graph.num_nodes())
            .into_par_iter()
            .map(|row| select_neighbor(graph, round_start, row))
            .collect()
    };

    agg.par_iter_mut()
        .zip(strongest.par_iter_mut())
        .zip(selections.into_par_iter())
        .for_each(|((agg, strongest), selection)| match selection {
            Selection::Aggregated => {}
            Selection::Attach(representative) => *agg = representative,
            Selection::Candidate(col) => *strongest = col as isize,
        });
}

/// Pairs every unaggregated node with the neighbor that selected it back.
/// The smaller index of the pair becomes the representative. A node that
/// selected itself forms a singleton.
pub fn match_edge(strongest: &[isize], agg: &mut [isize]) {
    agg.par_iter_mut().enumerate().for_each(|(row, agg)| {
        if *agg != UNAGGREGATED {
            return;
        }
        let neighbor = strongest[row];
        if neighbor != NO_CANDIDATE && strongest[neighbor as usize] == row as isize {
            *agg = neighbor.min(row as isize);
        }
    });
}

pub fn count_unaggregated(agg: &[isize]) -> usize {
    count_where(agg, UNAGGREGATED)
}

pub fn round_limit_reached(round: usize, max_rounds: usize) -> bool {
    round >= max_rounds
}

pub fn fully_aggregated(unaggregated: usize) -> bool {
    unaggregated == 0
}

pub fn below_unassigned_ratio(unaggregated: usize, num_nodes: usize, ratio: f64) -> bool {
    num_nodes > 0 && (unaggregated as f64) / (num_nodes as f64) < ratio
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundExit {
    FullyAggregated,
    UnassignedRatio,
    RoundLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub rounds: usize,
    pub exit: RoundExit,
    pub unaggregated: usize,
}

/// Runs matching rounds until every node is aggregated, the unaggregated
/// fraction drops below the configured ratio, or `max_rounds` is hit.
pub fn run_rounds(
    graph: &WeightedGraph,
    config: &AggregationConfig,
    agg: &mut [isize],
) -> RoundSummary {
    let num_nodes = graph.num_nodes();
    let mut strongest = vec![NO_CANDIDATE; num_nodes];
    let mut unaggregated = count_unaggregated(agg);
    let mut round = 0;

    loop {
        if round_limit_reached(round, config.max_rounds) {
            return RoundSummary {
                rounds: round,
                exit: RoundExit::RoundLimit,
                unaggregated,
            };
        }

        strongest.par_iter_mut().for_each(|s| *s = NO_CANDIDATE);
        find_strongest_neighbor(graph, agg, &mut strongest);
        match_edge(&strongest, agg);
        unaggregated = count_unaggregated(agg);
        round += 1;
        trace!("round {round}: {unaggregated} of {num_nodes} nodes unaggregated");

        let exit = if fully_aggregated(unaggregated) {
            RoundExit::FullyAggregated
        } else if below_unassigned_ratio(unaggregated, num_nodes, config.max_unassigned_ratio) {
            RoundExit::UnassignedRatio
        } else {
            continue;
        };
        return RoundSummary {
            rounds: round,
            exit,
            unaggregated,
        };
    }
}

fn strongest_aggregate<F>(graph: &WeightedGraph, row: usize, membership: F) -> isize
where
    F: Fn(usize) -> isize,
{
    let mut taken = Strongest::default();
    for (col, weight) in graph.scaled_neighbors(row) {
        if membership(col) != UNAGGREGATED {
            taken.offer(weight, col);
        }
    }
    match taken.neighbor() {
        Some(col) => membership(col),
        None => row as isize,
    }
}

/// Attaches every remaining unaggregated node to the aggregate of its
/// strongest aggregated neighbor, or makes it a singleton.
///
/// In [`FallbackMode::Snapshot`] all decisions read a frozen copy of `agg`, so
/// the result does not depend on scheduling. [`FallbackMode::InPlace`] works on
/// the live assignments: a node may or may not see a neighbor that was attached
/// earlier in the same pass.
pub fn assign_to_existing(graph: &WeightedGraph, agg: &mut Vec<isize>, mode: FallbackMode) {
    match mode {
        FallbackMode::Snapshot => {
            let frozen: &[isize] = agg;
            let assigned: Vec<isize> = frozen
                .par_iter()
                .enumerate()
                .map(|(row, current)| match *current {
                    UNAGGREGATED => strongest_aggregate(graph, row, |col| frozen[col]),
                    representative => representative,
                })
                .collect();
            *agg = assigned;
        }
        FallbackMode::InPlace => {
            // same layout, so both conversions reuse the allocation
            let live: Vec<AtomicIsize> = std::mem::take(agg)
                .into_iter()
                .map(AtomicIsize::new)
                .collect();
            live.par_iter().enumerate().for_each(|(row, slot)| {
                if slot.load(Ordering::Relaxed) != UNAGGREGATED {
                    return;
                }
                let representative =
                    strongest_aggregate(graph, row, |col| live[col].load(Ordering::Relaxed));
                slot.store(representative, Ordering::Relaxed);
            });
            *agg = live.into_iter().map(AtomicIsize::into_inner).collect();
        }
    }
}

/// Rewrites representative ids as dense aggregate ids ordered by
/// representative index and returns the number of aggregates.
/// Every entry must already point at a representative (`agg[agg[i]] == agg[i]`).
pub fn renumber(agg: &mut [isize]) -> usize {
    let num_nodes = agg.len();
    let mut agg_map: Vec<usize> = Vec::with_capacity(num_nodes + 1);
    agg.par_iter()
        .enumerate()
        .map(|(row, representative)| usize::from(*representative == row as isize))
        .collect_into_vec(&mut agg_map);
    agg_map.push(0);

    let num_agg = exclusive_prefix_sum(&mut agg_map);
    debug_assert_eq!(num_agg, agg_map[num_nodes]);

    agg.par_iter_mut().for_each(|representative| {
        debug_assert!(*representative >= 0);
        *representative = agg_map[*representative as usize] as isize;
    });
    num_agg
}

/// Node to aggregate assignment produced by [`pairwise_aggregation`].
#[derive(Clone)]
pub struct Aggregation {
    node_to_agg: Vec<usize>,
    num_agg: usize,
    rounds: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AggregationStats {
    pub aggs: usize,
    pub nodes: usize,
    pub cf: f64,
    pub agg_size_min: usize,
    pub agg_size_max: usize,
    pub agg_size_avg: f64,
    pub rounds: usize,
}

impl Aggregation {
    /// Aggregate id of every node, each within `0..naggs()`.
    pub fn node_assignments(&self) -> &[usize] {
        &self.node_to_agg
    }

    pub fn into_node_assignments(self) -> Vec<usize> {
        self.node_to_agg
    }

    pub fn naggs(&self) -> usize {
        self.num_agg
    }

    pub fn nnodes(&self) -> usize {
        self.node_to_agg.len()
    }

    /// Matching rounds that were run before the fallback.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Coarsening factor, nodes per aggregate.
    pub fn cf(&self) -> f64 {
        self.nnodes() as f64 / self.naggs() as f64
    }

    pub fn aggregate_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_agg];
        for agg_id in self.node_to_agg.iter().copied() {
            sizes[agg_id] += 1;
        }
        sizes
    }

    /// Piecewise constant interpolation: row `i` holds a single `1.0` in the
    /// column of node `i`'s aggregate.
    pub fn interpolation(&self) -> CsrMatrix {
        let mut partition_mat = TriMat::new((self.nnodes(), self.naggs()));
        for (node, agg_id) in self.node_to_agg.iter().copied().enumerate() {
            partition_mat.add_triplet(node, agg_id, 1.0);
        }
        partition_mat.to_csr()
    }

    pub fn stats(&self) -> AggregationStats {
        let sizes = self.aggregate_sizes();
        let aggs = self.naggs();
        let nodes = self.nnodes();
        if aggs == 0 {
            return AggregationStats {
                aggs,
                nodes,
                cf: 0.0,
                agg_size_min: 0,
                agg_size_max: 0,
                agg_size_avg: 0.0,
                rounds: self.rounds,
            };
        }
        AggregationStats {
            aggs,
            nodes,
            cf: self.cf(),
            agg_size_min: sizes.iter().copied().min().unwrap_or(0),
            agg_size_max: sizes.iter().copied().max().unwrap_or(0),
            agg_size_avg: nodes as f64 / aggs as f64,
            rounds: self.rounds,
        }
    }
}

impl fmt::Debug for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        write!(
            f,
            "Aggregation {{ aggs: {}, nodes: {}, cf: {:.2}, agg_size_min: {}, agg_size_max: {}, agg_size_avg: {:.2}, rounds: {} }}",
            stats.aggs,
            stats.nodes,
            stats.cf,
            stats.agg_size_min,
            stats.agg_size_max,
            stats.agg_size_avg,
            stats.rounds,
        )
    }
}

/// Partitions the nodes of `graph` into aggregates of mostly two nodes.
pub fn pairwise_aggregation(graph: &WeightedGraph, config: &AggregationConfig) -> Aggregation {
    let num_nodes = graph.num_nodes();
    let mut agg = vec![UNAGGREGATED; num_nodes];

    let summary = run_rounds(graph, config, &mut agg);
    debug!(
        "matching stopped after {} rounds ({:?}), {} of {} nodes unaggregated",
        summary.rounds, summary.exit, summary.unaggregated, num_nodes
    );

    if summary.unaggregated > 0 {
        debug!(
            "attaching {} leftover nodes ({} fallback)",
            summary.unaggregated, config.fallback
        );
        assign_to_existing(graph, &mut agg, config.fallback);
    }

    let num_agg = renumber(&mut agg);
    let node_to_agg = agg.into_iter().map(|agg_id| agg_id as usize).collect();

    Aggregation {
        node_to_agg,
        num_agg,
        rounds: summary.rounds,
    }
}

#[cfg(test)]
extern crate test_generator;
