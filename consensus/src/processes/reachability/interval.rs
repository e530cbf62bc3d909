use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A closed integer interval `[start, end]` used as a reachability tree
/// label. The last point of the interval is the number allocated to the
/// block itself; the prefix `[start, end - 1]` is the capacity from which
/// children are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

impl From<Interval> for (u64, u64) {
    fn from(val: Interval) -> Self {
        (val.start, val.end)
    }
}

impl Interval {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start.saturating_sub(1), "interval must be valid or exactly empty");
        Interval { start, end }
    }

    /// The maximal allocatable interval. The extremes are avoided so that
    /// sentinel arithmetic (`start - 1`, `end + 1`) never wraps.
    pub fn maximal() -> Self {
        Self::new(1, u64::MAX - 1)
    }

    pub fn empty() -> Self {
        Self::new(1, 0)
    }

    pub fn size(&self) -> u64 {
        // The interval is either well-formed or exactly the empty convention
        // `[start, start - 1]`, so this expression never underflows below 0
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn increase_start(&self, offset: u64) -> Self {
        Self::new(self.start + offset, self.end)
    }

    pub fn decrease_end(&self, offset: u64) -> Self {
        Self::new(self.start, self.end - offset)
    }

    /// Whether `other` is contained in `self`
    pub fn contains(&self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether `other` is strictly contained in `self`
    pub fn strictly_contains(&self, other: Self) -> bool {
        self.start <= other.start && other.end < self.end
    }

    /// Splits the interval into `sizes.len()` consecutive sub-intervals of
    /// the exact given sizes. The sum of sizes must not exceed the interval.
    pub fn split_exact(&self, sizes: &[u64]) -> Vec<Interval> {
        debug_assert!(sizes.iter().sum::<u64>() <= self.size(), "sizes overflow the interval");
        let mut start = self.start;
        sizes
            .iter()
            .map(|&size| {
                let interval = Self::new(start, start + size - 1);
                start += size;
                interval
            })
            .collect()
    }

    /// Splits the interval into `sizes.len()` consecutive sub-intervals,
    /// distributing the spare capacity with an exponential bias towards the
    /// largest subtrees. Subtrees which are (exponentially) larger thus get
    /// nearly all the slack, matching the expectation that future growth
    /// concentrates under the heaviest subtree.
    pub fn split_exponential(&self, sizes: &[u64]) -> Vec<Interval> {
        let interval_size = self.size();
        let sizes_sum = sizes.iter().sum::<u64>();
        assert!(interval_size >= sizes_sum, "interval (size {interval_size}) cannot contain sizes summing to {sizes_sum}");

        if interval_size == sizes_sum {
            return self.split_exact(sizes);
        }

        let mut remaining_bias = interval_size - sizes_sum;
        let total_bias = remaining_bias as f64;

        let fractions = exponential_fractions(sizes);
        let mut biased_sizes = Vec::<u64>::with_capacity(sizes.len());
        for (i, (&size, fraction)) in sizes.iter().zip(fractions).enumerate() {
            let bias = if i == sizes.len() - 1 {
                remaining_bias
            } else {
                remaining_bias.min((total_bias * fraction).round() as u64)
            };
            biased_sizes.push(size + bias);
            remaining_bias -= bias;
        }
        self.split_exact(&biased_sizes)
    }
}

/// For each size, computes a fraction in (0, 1] proportional to 2^size,
/// normalized so that the fractions sum to one. Offsetting by the maximal
/// size keeps the computation within f64 range.
fn exponential_fractions(sizes: &[u64]) -> Vec<f64> {
    let max_size = sizes.iter().copied().max().unwrap_or_default();
    let mut fractions: Vec<f64> = sizes.iter().map(|&s| (s as f64 - max_size as f64).exp2()).collect();
    let fractions_sum: f64 = fractions.iter().sum();
    for fraction in fractions.iter_mut() {
        *fraction /= fractions_sum;
    }
    fractions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_basics() {
        let interval = Interval::new(101, 164);
        assert_eq!(interval.size(), 64);
        assert!(Interval::empty().is_empty());
        assert_eq!(Interval::empty().size(), 0);
        assert_eq!(Interval::maximal().size(), u64::MAX - 1);

        assert!(interval.contains(interval));
        assert!(!interval.strictly_contains(interval));
        assert!(interval.strictly_contains(Interval::new(101, 163)));
        assert!(!interval.contains(Interval::new(100, 164)));
    }

    #[test]
    fn test_split_exact() {
        let sizes = [5u64, 10, 15, 20];
        let intervals = Interval::new(1, 100).split_exact(&sizes);
        assert_eq!(intervals.len(), sizes.len());
        for (interval, size) in intervals.iter().zip(sizes) {
            assert_eq!(interval.size(), size);
        }
        assert_eq!(intervals[0].start, 1);
        assert_eq!(intervals.last().unwrap().end, 50);
        // Consecutiveness
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn test_split_exponential_allocates_all_capacity() {
        let interval = Interval::new(1, 1000);
        let sizes = [10u64, 10, 30];
        let intervals = interval.split_exponential(&sizes);

        assert_eq!(intervals[0].start, interval.start);
        assert_eq!(intervals.last().unwrap().end, interval.end);
        for (sub, &size) in intervals.iter().zip(sizes.iter()) {
            assert!(sub.size() >= size);
        }
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        // The largest subtree gets the lion's share of the slack
        assert!(intervals[2].size() > intervals[0].size() + intervals[1].size());
    }
}
