use super::SmoothingFilter;
use crate::window::SlidingWindow;

/// Moving average filter
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    buffer: SlidingWindow,
}

impl MovingAverageFilter {
    /// # Panics
    ///
    /// Panics if `window_size` is 0
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: SlidingWindow::new(window_size),
        }
    }
}

impl SmoothingFilter for MovingAverageFilter {
    fn apply(&mut self, value: f64) -> f64 {
        self.buffer.push(value);
        self.buffer.mean().unwrap_or(value)
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }

    fn name(&self) -> &str {
        "MovingAverageFilter"
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}
