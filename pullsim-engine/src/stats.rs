//! Order-independent tallies, percentiles and frequency tables.
use num_traits::cast::cast;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{HIGH_PERCENTILE, LOW_PERCENTILE};
use crate::numbers::{u64_to_f64, u128_to_f64};

/// Linear interpolation between closest ranks over an ascending sample,
/// with `rank = p / 100 × (n − 1)`.
#[must_use]
pub fn percentile(sorted: &[u64], pct: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * u64_to_f64(cast::<usize, u64>(last)?);
    let lower = rank.floor();
    let fraction = rank - lower;
    let lower_index = cast::<f64, usize>(lower).unwrap_or(last).min(last);
    let upper_index = (lower_index + 1).min(last);
    let low = u64_to_f64(sorted[lower_index]);
    let high = u64_to_f64(sorted[upper_index]);
    Some(low + (high - low) * fraction)
}

/// Summary of one distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p5: f64,
    pub p95: f64,
}

impl Summary {
    /// Combine a tally with its sorted sample. `None` for an empty sample.
    #[must_use]
    pub fn from_parts(tally: &Tally, sorted: &[u64]) -> Option<Self> {
        if tally.count == 0 {
            return None;
        }
        Some(Self {
            count: tally.count,
            min: tally.min,
            max: tally.max,
            mean: tally.mean(),
            p5: percentile(sorted, LOW_PERCENTILE)?,
            p95: percentile(sorted, HIGH_PERCENTILE)?,
        })
    }
}

/// Commutative accumulator folded per worker and merged after the barrier.
///
/// All fields are integers, so merge order never changes the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub sum: u128,
    pub histogram: FrequencyTable,
}

impl Tally {
    #[must_use]
    pub fn new(bin_width: u64) -> Self {
        Self {
            count: 0,
            min: u64::MAX,
            max: 0,
            sum: 0,
            histogram: FrequencyTable::new(bin_width),
        }
    }

    pub fn ingest(&mut self, value: u64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += u128::from(value);
        self.histogram.record(value);
    }

    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.histogram.merge(&other.histogram);
        self
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        u128_to_f64(self.sum) / u64_to_f64(self.count)
    }
}

/// Counts per bucket; a value lands in bucket `⌊value / width⌋ × width`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyTable {
    pub bin_width: u64,
    pub buckets: BTreeMap<u64, u64>,
}

impl FrequencyTable {
    /// A zero width is treated as one.
    #[must_use]
    pub fn new(bin_width: u64) -> Self {
        Self {
            bin_width: bin_width.max(1),
            buckets: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn bucket_of(&self, value: u64) -> u64 {
        (value / self.bin_width) * self.bin_width
    }

    pub fn record(&mut self, value: u64) {
        *self.buckets.entry(self.bucket_of(value)).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &Self) {
        for (&bucket, &count) in &other.buckets {
            *self.buckets.entry(bucket).or_insert(0) += count;
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// Every bucket from the lowest to the highest observed, zeros included.
    #[must_use]
    pub fn dense(&self) -> Vec<(u64, u64)> {
        let (Some(&first), Some(&last)) =
            (self.buckets.keys().next(), self.buckets.keys().next_back())
        else {
            return Vec::new();
        };
        (first..=last)
            .step_by(usize::try_from(self.bin_width).unwrap_or(usize::MAX))
            .map(|bucket| (bucket, self.buckets.get(&bucket).copied().unwrap_or(0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        // numpy.percentile([1, 2, 3, 4, 10], [5, 50, 95]) -> [1.2, 3.0, 8.8]
        let sample = [1, 2, 3, 4, 10];
        assert!(close(percentile(&sample, 5.0).unwrap(), 1.2));
        assert!(close(percentile(&sample, 50.0).unwrap(), 3.0));
        assert!(close(percentile(&sample, 95.0).unwrap(), 8.8));
        // numpy.percentile(range(1, 101), 95) -> 95.05
        let hundred: Vec<u64> = (1..=100).collect();
        assert!(close(percentile(&hundred, 95.0).unwrap(), 95.05));
        assert!(close(percentile(&hundred, 5.0).unwrap(), 5.95));
    }

    #[test]
    fn percentile_edge_cases() {
        assert_eq!(percentile(&[], 50.0), None);
        assert!(close(percentile(&[7], 95.0).unwrap(), 7.0));
        assert!(close(percentile(&[3, 9], 0.0).unwrap(), 3.0));
        assert!(close(percentile(&[3, 9], 100.0).unwrap(), 9.0));
    }

    #[test]
    fn tally_merge_matches_single_pass() {
        let values = [12_u64, 80, 3, 45, 45, 160, 7];
        let mut whole = Tally::new(10);
        for v in values {
            whole.ingest(v);
        }
        let (left, right) = values.split_at(3);
        let mut a = Tally::new(10);
        left.iter().for_each(|&v| a.ingest(v));
        let mut b = Tally::new(10);
        right.iter().for_each(|&v| b.ingest(v));
        assert_eq!(b.clone().merge(a.clone()), whole);
        assert_eq!(a.merge(b), whole);
        assert_eq!(whole.min, 3);
        assert_eq!(whole.max, 160);
        assert!(close(whole.mean(), 352.0 / 7.0));
    }

    #[test]
    fn buckets_floor_to_bin_width() {
        let mut table = FrequencyTable::new(10);
        for v in [0, 9, 10, 19, 20, 45] {
            table.record(v);
        }
        assert_eq!(table.buckets.get(&0), Some(&2));
        assert_eq!(table.buckets.get(&10), Some(&2));
        assert_eq!(table.buckets.get(&40), Some(&1));
        assert_eq!(table.total(), 6);
        assert_eq!(
            table.dense(),
            vec![(0, 2), (10, 2), (20, 1), (30, 0), (40, 1)]
        );
        assert_eq!(FrequencyTable::new(0).bin_width, 1);
    }

    #[test]
    fn summary_of_empty_tally_is_none() {
        assert_eq!(Summary::from_parts(&Tally::new(1), &[]), None);
    }
}
