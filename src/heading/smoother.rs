use crate::geo::normalize_degrees;
use std::collections::VecDeque;

/// Circular (vector) mean over the last `window` headings.
///
/// Averaging unit vectors instead of raw angles keeps 359° and 1° from
/// averaging to 180°.
#[derive(Debug, Clone)]
pub struct HeadingSmoother {
    window: usize,
    samples: VecDeque<f64>,
}

impl HeadingSmoother {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    /// Add a raw heading and return the smoothed value
    pub fn push(&mut self, heading: f64) -> f64 {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(heading);
        self.mean().unwrap_or(heading)
    }

    /// Current smoothed heading, `None` before the first sample
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let (sin_sum, cos_sum) = self
            .samples
            .iter()
            .map(|h| h.to_radians())
            .fold((0.0, 0.0), |(s, c), r| (s + r.sin(), c + r.cos()));
        let n = self.samples.len() as f64;
        Some(normalize_degrees((sin_sum / n).atan2(cos_sum / n).to_degrees()))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_across_north() {
        let mut s = HeadingSmoother::new(12);
        s.push(350.0);
        let m = s.push(10.0);
        assert!(m < 1e-9 || (360.0 - m) < 1e-9, "got {}", m);
    }

    #[test]
    fn test_window_drops_oldest() {
        let mut s = HeadingSmoother::new(3);
        for h in [180.0, 90.0, 90.0, 90.0] {
            s.push(h);
        }
        assert_eq!(s.len(), 3);
        assert!((s.mean().unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_passthrough() {
        let mut s = HeadingSmoother::new(12);
        assert!(s.mean().is_none());
        assert!((s.push(123.4) - 123.4).abs() < 1e-9);
        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let mut s = HeadingSmoother::new(0);
        s.push(10.0);
        assert!((s.push(20.0) - 20.0).abs() < 1e-9);
    }
}
