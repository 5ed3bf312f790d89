//! Parallel primitives the aggregation phases are written against. Each call
//! returns only once every rayon task has finished, so consecutive calls are
//! separated by a full barrier.

use rayon::prelude::*;

const SCAN_CHUNK: usize = 1 << 14;

/// In-place exclusive prefix sum. Returns the total of the original values.
pub fn exclusive_prefix_sum(values: &mut [usize]) -> usize {
    if values.len() <= SCAN_CHUNK {
        return sequential_exclusive_scan(values, 0);
    }

    let chunk_totals: Vec<usize> = values
        .par_chunks(SCAN_CHUNK)
        .map(|chunk| chunk.iter().sum())
        .collect();

    let mut offsets = chunk_totals;
    let total = sequential_exclusive_scan(&mut offsets, 0);

    values
        .par_chunks_mut(SCAN_CHUNK)
        .zip(offsets.par_iter())
        .for_each(|(chunk, offset)| {
            sequential_exclusive_scan(chunk, *offset);
        });
    total
}

fn sequential_exclusive_scan(values: &mut [usize], start: usize) -> usize {
    let mut acc = start;
    for val in values.iter_mut() {
        let next = acc + *val;
        *val = acc;
        acc = next;
    }
    acc
}

/// Number of entries equal to `value`.
pub fn count_where(values: &[isize], value: isize) -> usize {
    values.par_iter().filter(|v| **v == value).count()
}
