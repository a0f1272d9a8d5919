use std::collections::VecDeque;

/// Rolling frame-rate average over the last `window` frames.
#[derive(Debug, Clone)]
pub struct FrameStats {
    samples: VecDeque<f64>,
    window: usize,
    total: f64,
    last_dt: f64,
}

impl FrameStats {
    pub const DEFAULT_WINDOW: usize = 60;

    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            total: 0.0,
            last_dt: 0.0,
        }
    }

    pub fn record(&mut self, dt: f64) {
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.total -= old;
            }
        }
        self.samples.push_back(dt);
        self.total += dt;
        self.last_dt = dt;
    }

    /// Frames per second over the window; zero before the first sample.
    pub fn frames_per_second(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.total
    }

    pub fn last_delta(&self) -> f64 {
        self.last_dt
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_report_zero() {
        assert_eq!(FrameStats::new().frames_per_second(), 0.0);
    }

    #[test]
    fn average_uses_only_the_window() {
        let mut stats = FrameStats::with_window(4);
        for _ in 0..10 {
            stats.record(0.5);
        }
        for _ in 0..4 {
            stats.record(0.25);
        }
        assert_eq!(stats.sample_count(), 4);
        assert!((stats.frames_per_second() - 4.0).abs() < 1e-9);
        assert_eq!(stats.last_delta(), 0.25);
    }
}
