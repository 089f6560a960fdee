//! Runtime stereo parameters, adjusted by hotkey edges.
//!
//! Separation is derived from an integer step count rather than
//! accumulated in floating point, so N increase edges followed by M
//! decrease edges land on exactly `base + (N - M) * SEPARATION_STEP`.

/// Separation change per hotkey edge.
pub const SEPARATION_STEP: f32 = 0.005;

/// Default convergence carried through to the compositor.
pub const DEFAULT_CONVERGENCE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoParams {
    base_separation: f32,
    steps: i32,
    pub convergence: f32,
}

impl Default for StereoParams {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SEPARATION)
    }
}

impl StereoParams {
    pub fn new(separation: f32) -> Self {
        Self {
            base_separation: separation,
            steps: 0,
            convergence: DEFAULT_CONVERGENCE,
        }
    }

    /// Current separation in texture-space units.
    pub fn separation(&self) -> f32 {
        self.base_separation + self.steps as f32 * SEPARATION_STEP
    }

    /// Apply one frame's worth of hotkey edges.
    pub fn nudge(&mut self, increase: bool, decrease: bool) {
        if increase {
            self.steps += 1;
        }
        if decrease {
            self.steps -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_separation() {
        let params = StereoParams::default();
        assert_eq!(params.separation(), crate::config::DEFAULT_SEPARATION);
        assert_eq!(params.convergence, DEFAULT_CONVERGENCE);
    }

    #[test]
    fn test_five_up_two_down_is_exactly_three_steps() {
        let mut params = StereoParams::new(0.02);
        for _ in 0..5 {
            params.nudge(true, false);
        }
        for _ in 0..2 {
            params.nudge(false, true);
        }
        assert_eq!(params.separation(), 0.02 + 3.0 * SEPARATION_STEP);
    }

    #[test]
    fn test_simultaneous_edges_cancel() {
        let mut params = StereoParams::new(0.02);
        params.nudge(true, true);
        assert_eq!(params.separation(), 0.02);
    }

    #[test]
    fn test_steps_can_go_negative() {
        let mut params = StereoParams::new(0.02);
        params.nudge(false, true);
        assert_eq!(params.separation(), 0.02 - SEPARATION_STEP);
    }
}
