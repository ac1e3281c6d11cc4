use super::SmoothingFilter;
use crate::window::SlidingWindow;

/// Median over the last `window_size` samples.
///
/// A single-frame outlier cannot move the output as long as it stays a
/// minority of the window.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    buffer: SlidingWindow,
}

impl MedianFilter {
    /// # Panics
    ///
    /// Panics if `window_size` is 0
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: SlidingWindow::new(window_size),
        }
    }

    /// Median of the current contents without pushing a new sample
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        self.buffer.median()
    }
}

impl SmoothingFilter for MedianFilter {
    fn apply(&mut self, value: f64) -> f64 {
        self.buffer.push(value);
        self.buffer.median().unwrap_or(value)
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }

    fn name(&self) -> &str {
        "MedianFilter"
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}
