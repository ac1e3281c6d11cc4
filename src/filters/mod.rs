//! Temporal smoothing filters for per-frame scalar signals.
//!
//! The eye-state classifier runs one filter per eye over the raw eye aspect
//! ratio to absorb landmark jitter before thresholding.

/// Median filter for outlier rejection
pub mod median;

/// Moving average filter for simple smoothing
pub mod moving_average;

use crate::Result;

/// Trait for all smoothing filters
pub trait SmoothingFilter: Send + Sync {
    /// Push a raw sample and return the smoothed value
    fn apply(&mut self, value: f64) -> f64;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;

    /// Number of samples currently held
    fn len(&self) -> usize;

    /// Maximum number of samples held
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create a smoothing filter by type name
///
/// # Errors
///
/// Returns an error if the filter type is unknown or the window is 0
pub fn create_filter(filter_type: &str, window_size: usize) -> Result<Box<dyn SmoothingFilter>> {
    if window_size == 0 {
        return Err(crate::Error::InvalidInput(
            "Window size must be greater than 0".to_string(),
        ));
    }
    match filter_type.to_lowercase().as_str() {
        "median" => Ok(Box::new(median::MedianFilter::new(window_size))),
        "moving_average" | "movingaverage" | "mean" => {
            Ok(Box::new(moving_average::MovingAverageFilter::new(window_size)))
        }
        _ => Err(crate::Error::InvalidInput(format!("Unknown filter type: {filter_type}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_filter() {
        assert_eq!(create_filter("median", 5).unwrap().name(), "MedianFilter");
        assert_eq!(create_filter("Moving_Average", 5).unwrap().name(), "MovingAverageFilter");
        assert!(create_filter("kalman", 5).is_err());
        assert!(create_filter("median", 0).is_err());
    }

    #[test]
    fn test_default_is_empty() {
        let filter = create_filter("median", 3).unwrap();
        assert!(filter.is_empty());
        assert_eq!(filter.capacity(), 3);
    }
}
