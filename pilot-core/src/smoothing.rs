use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 8;

/// Sliding window over raw angular-rate samples. The mean of the window is
/// the smoothed signal; the sample standard deviation doubles as a
/// standstill detector (a vehicle that is not moving produces a flat trace).
#[derive(Debug, Clone)]
pub struct SignalSmoother {
    window: VecDeque<f64>,
    capacity: usize,
}

impl SignalSmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes one raw sample, evicting the oldest once the window is full,
    /// and returns the smoothed value.
    pub fn push(&mut self, raw: f64) -> f64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw);
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Sample standard deviation of the current window contents.
    pub fn dispersion(&self) -> f64 {
        let n = self.window.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance =
            self.window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothed_value_is_the_window_mean() {
        let mut smoother = SignalSmoother::new(4);
        assert_eq!(smoother.push(4.0), 4.0);
        assert_eq!(smoother.push(8.0), 6.0);
        assert_eq!(smoother.push(0.0), 4.0);
        assert_eq!(smoother.push(0.0), 3.0);
    }

    #[test]
    fn oldest_sample_is_evicted_at_capacity() {
        let mut smoother = SignalSmoother::new(2);
        smoother.push(100.0);
        smoother.push(0.0);
        // 100.0 falls out of the window here
        assert_eq!(smoother.push(0.0), 0.0);
        assert_eq!(smoother.len(), 2);
    }

    #[test]
    fn dispersion_is_zero_for_a_flat_trace() {
        let mut smoother = SignalSmoother::new(8);
        for _ in 0..20 {
            smoother.push(42.0);
        }
        assert_eq!(smoother.dispersion(), 0.0);
    }

    #[test]
    fn dispersion_is_the_sample_standard_deviation() {
        let mut smoother = SignalSmoother::new(8);
        smoother.push(0.0);
        smoother.push(10.0);
        assert!((smoother.dispersion() - 50.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn empty_window_is_harmless() {
        let smoother = SignalSmoother::new(8);
        assert_eq!(smoother.mean(), 0.0);
        assert_eq!(smoother.dispersion(), 0.0);
        assert!(smoother.is_empty());
    }
}
