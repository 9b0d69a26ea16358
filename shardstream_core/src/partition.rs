use std::ops::Range;

use crate::error::{Error, Result};

/// Contiguous slice of the global sample range owned by one reader worker.
///
/// For `W` workers over `[start, end)` each worker gets a block of
/// `ceil((end - start) / W)` indices; worker `k` owns
/// `[start + k·block, start + (k+1)·block)` clamped to `end`. Workers past the
/// end of the data get an empty range. The split is deterministic, disjoint,
/// and covers the range exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPartition {
    pub worker_id: usize,
    pub num_workers: usize,
    pub start: u64,
    pub end: u64,
}

impl WorkerPartition {
    /// Partition for a single worker reading everything in `range`.
    pub fn whole(range: Range<u64>) -> Self {
        Self {
            worker_id: 0,
            num_workers: 1,
            start: range.start,
            end: range.end.max(range.start),
        }
    }

    /// Compute worker `worker_id`'s share of `range`.
    pub fn compute(range: Range<u64>, worker_id: usize, num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(Error::config("number of workers must be greater than 0"));
        }
        if worker_id >= num_workers {
            return Err(Error::config(format!(
                "worker id {worker_id} out of range (total workers: {num_workers})"
            )));
        }

        let overall_start = range.start;
        let overall_end = range.end.max(range.start);
        let per_worker = (overall_end - overall_start).div_ceil(num_workers as u64);

        let start = overall_start
            .saturating_add(per_worker.saturating_mul(worker_id as u64))
            .min(overall_end);
        let end = start.saturating_add(per_worker).min(overall_end);

        Ok(Self {
            worker_id,
            num_workers,
            start,
            end,
        })
    }

    /// Partitions for every worker, in worker order.
    pub fn all(range: Range<u64>, num_workers: usize) -> Result<Vec<Self>> {
        (0..num_workers)
            .map(|k| Self::compute(range.clone(), k, num_workers))
            .collect()
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(len: u64, workers: usize) {
        let parts = WorkerPartition::all(0..len, workers).unwrap();
        assert_eq!(parts.len(), workers);

        // First partition starts at 0, each starts where the previous ended.
        assert_eq!(parts[0].start, 0);
        for i in 1..parts.len() {
            assert_eq!(
                parts[i].start,
                parts[i - 1].end,
                "gap or overlap between worker {} and {} (len={len}, workers={workers})",
                i - 1,
                i
            );
        }
        assert_eq!(parts.last().unwrap().end, len);

        let covered: u64 = parts.iter().map(WorkerPartition::len).sum();
        assert_eq!(covered, len);
    }

    #[test]
    fn partitions_cover_range_exactly() {
        for len in [0u64, 1, 3, 10, 97, 1000] {
            let mut counts = vec![1usize, 2, 7, len as usize, len as usize + 5];
            counts.retain(|&w| w > 0);
            for workers in counts {
                assert_exact_cover(len, workers);
            }
        }
    }

    #[test]
    fn three_samples_two_workers() {
        let parts = WorkerPartition::all(0..3, 2).unwrap();
        assert_eq!(parts[0].range(), 0..2);
        assert_eq!(parts[1].range(), 2..3);
    }

    #[test]
    fn surplus_workers_get_empty_ranges() {
        let parts = WorkerPartition::all(0..3, 8).unwrap();
        assert_eq!(parts.iter().filter(|p| !p.is_empty()).count(), 3);
        assert!(parts[7].is_empty());
        assert_eq!(parts[7].start, 3);
    }

    #[test]
    fn respects_nonzero_start() {
        let p = WorkerPartition::compute(10..20, 1, 3).unwrap();
        assert_eq!(p.range(), 14..18);
    }

    #[test]
    fn zero_workers_is_an_error() {
        assert!(WorkerPartition::compute(0..10, 0, 0).is_err());
        assert!(WorkerPartition::compute(0..10, 3, 3).is_err());
    }

    #[test]
    fn same_inputs_same_assignment() {
        let a = WorkerPartition::all(0..12345, 7).unwrap();
        let b = WorkerPartition::all(0..12345, 7).unwrap();
        assert_eq!(a, b);
    }
}
