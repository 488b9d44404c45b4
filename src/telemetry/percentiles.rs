//! Fixed-capacity sliding-window percentile aggregator.
//!
//! Percentiles are computed by linear interpolation over a sorted copy of
//! the window, not by truncating index `(len as f64 * p) as usize` — the
//! truncating form undercounts the tail for small windows.

use std::collections::VecDeque;

pub struct PercentileAggregator {
    window: VecDeque<f64>,
    capacity: usize,
}

impl PercentileAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, sample: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// `p` in `[0, 100]`. Returns `None` on an empty window.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let n = sorted.len();
        if n == 1 {
            return Some(sorted[0]);
        }
        let index = (p / 100.0) * (n - 1) as f64;
        let lo = index.floor() as usize;
        let hi = index.ceil() as usize;
        let w = index - index.floor();
        Some(sorted[lo] * (1.0 - w) + sorted[hi.min(n - 1)] * w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_worked_example() {
        let mut agg = PercentileAggregator::new(50);
        for v in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0] {
            agg.record(v);
        }
        assert!((agg.percentile(50.0).unwrap() - 55.0).abs() < 1e-9);
        assert!((agg.percentile(95.0).unwrap() - 95.5).abs() < 1e-9);
        assert!((agg.percentile(99.0).unwrap() - 99.1).abs() < 1e-9);
    }

    #[test]
    fn evicts_oldest_sample_past_capacity() {
        let mut agg = PercentileAggregator::new(3);
        agg.record(1.0);
        agg.record(2.0);
        agg.record(3.0);
        agg.record(4.0);
        assert_eq!(agg.len(), 3);
        assert_eq!(agg.percentile(0.0), Some(2.0));
    }

    #[test]
    fn empty_window_has_no_percentile() {
        let agg = PercentileAggregator::new(10);
        assert_eq!(agg.percentile(50.0), None);
    }
}
