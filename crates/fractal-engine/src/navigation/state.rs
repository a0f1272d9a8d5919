use glam::DVec2;

/// Bounds and rates for navigation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NavigationLimits {
    pub min_range: f64,
    pub max_range: f64,
    pub min_iterations: u32,
    pub max_iterations: u32,
    pub iteration_step: u32,
    /// Fraction of the half range gained or lost per second of zooming.
    pub zoom_rate_per_second: f64,
    /// Half ranges travelled per second of panning.
    pub pan_rate_per_second: f64,
}

impl Default for NavigationLimits {
    fn default() -> Self {
        Self {
            min_range: 1e-5,
            max_range: 2.0,
            min_iterations: 128,
            max_iterations: 8192,
            iteration_step: 128,
            zoom_rate_per_second: 0.9,
            pan_rate_per_second: 1.0,
        }
    }
}

/// The visible region of the complex plane and the iteration budget.
///
/// Fields are private; outside this module the state is read-only and only
/// `NavigationInput` mutates it, keeping every value inside its limits.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NavigationState {
    center: DVec2,
    half_range: f64,
    iteration_budget: u32,
}

impl NavigationState {
    pub const DEFAULT_CENTER: DVec2 = DVec2::new(-0.25, 0.0);
    pub const DEFAULT_HALF_RANGE: f64 = 2.0;
    pub const DEFAULT_ITERATIONS: u32 = 256;

    /// Builds a state clamped into `limits`.
    pub fn new(center: DVec2, half_range: f64, iteration_budget: u32, limits: &NavigationLimits) -> Self {
        let mut state = Self {
            center,
            half_range,
            iteration_budget,
        };
        state.half_range = clamp_range(half_range, limits);
        state.iteration_budget = iteration_budget.clamp(limits.min_iterations, limits.max_iterations);
        state
    }

    pub fn with_limits(limits: &NavigationLimits) -> Self {
        Self::new(
            Self::DEFAULT_CENTER,
            Self::DEFAULT_HALF_RANGE,
            Self::DEFAULT_ITERATIONS,
            limits,
        )
    }

    #[inline]
    pub fn center(&self) -> DVec2 {
        self.center
    }

    #[inline]
    pub fn half_range(&self) -> f64 {
        self.half_range
    }

    #[inline]
    pub fn iteration_budget(&self) -> u32 {
        self.iteration_budget
    }

    /// Viewport as `(x, y, width, height)` for a target of the given
    /// width/height ratio. The horizontal extent is always `2 * half_range`.
    pub fn range_rect(&self, aspect: f64) -> [f32; 4] {
        let h = self.half_range;
        let aspect = if aspect > 0.0 { aspect } else { 1.0 };
        [
            (self.center.x - h) as f32,
            (self.center.y - h / aspect) as f32,
            (2.0 * h) as f32,
            (2.0 * h / aspect) as f32,
        ]
    }

    pub(super) fn pan(&mut self, delta: DVec2) {
        self.center += delta;
    }

    pub(super) fn scale_range(&mut self, factor: f64, limits: &NavigationLimits) {
        self.half_range = clamp_range(self.half_range * factor, limits);
    }

    /// Moves the budget by `steps` fixed steps, clamped.
    pub(super) fn step_iterations(&mut self, steps: i64, limits: &NavigationLimits) {
        let next = i64::from(self.iteration_budget) + steps * i64::from(limits.iteration_step);
        self.iteration_budget = next.clamp(
            i64::from(limits.min_iterations),
            i64::from(limits.max_iterations),
        ) as u32;
    }
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::with_limits(&NavigationLimits::default())
    }
}

fn clamp_range(value: f64, limits: &NavigationLimits) -> f64 {
    if value.is_nan() {
        return limits.max_range;
    }
    value.clamp(limits.min_range, limits.max_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_initial_view() {
        let s = NavigationState::default();
        assert_eq!(s.center(), DVec2::new(-0.25, 0.0));
        assert_eq!(s.half_range(), 2.0);
        assert_eq!(s.iteration_budget(), 256);
    }

    #[test]
    fn construction_clamps() {
        let limits = NavigationLimits::default();
        let s = NavigationState::new(DVec2::ZERO, 50.0, 1, &limits);
        assert_eq!(s.half_range(), limits.max_range);
        assert_eq!(s.iteration_budget(), limits.min_iterations);
    }

    #[test]
    fn range_rect_follows_aspect() {
        let s = NavigationState::default();
        assert_eq!(s.range_rect(2.0), [-2.25, -1.0, 4.0, 2.0]);
        assert_eq!(s.range_rect(1.0), [-2.25, -2.0, 4.0, 4.0]);
    }

    #[test]
    fn iteration_steps_saturate() {
        let limits = NavigationLimits::default();
        let mut s = NavigationState::default();
        s.step_iterations(-10, &limits);
        assert_eq!(s.iteration_budget(), 128);
        s.step_iterations(1000, &limits);
        assert_eq!(s.iteration_budget(), 8192);
    }
}
