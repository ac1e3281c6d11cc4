//! Fixed-capacity sliding window over scalar samples.
//!
//! Shared by the smoothing filters and the metrics aggregator. Pushing into a
//! full window evicts the oldest sample, so the window never grows past its
//! capacity.

use std::collections::VecDeque;

/// Bounded FIFO of `f64` samples
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl SlidingWindow {
    /// Create an empty window holding at most `capacity` samples
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Window size must be greater than 0");
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, returning the evicted one if the window was full
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(value);
        evicted
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Most recently pushed sample
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Arithmetic mean, `None` when empty
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Median (mean of the two middle values for even lengths), `None` when empty
    #[must_use]
    pub fn median(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let len = sorted.len();
        if len % 2 == 0 {
            Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0)
        } else {
            Some(sorted[len / 2])
        }
    }

    /// Summary statistics of the current contents, `None` when empty
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> Option<Statistics> {
        let mean = self.mean()?;
        let n = self.samples.len() as f64;
        let variance = self.samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Statistics {
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        })
    }
}

/// Statistical summary of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    /// Mean value of the data
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Minimum value in the window
    pub min: f64,
    /// Maximum value in the window
    pub max: f64,
}
