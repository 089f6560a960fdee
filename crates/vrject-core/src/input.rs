//! Edge detection for hotkeys.
//!
//! The frame interceptor samples key *levels* once per presented frame; a
//! held key must count as one adjustment, not one per frame. `EdgeDetector`
//! latches the previous level and reports only the down transition.

#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeDetector {
    was_down: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current level; returns true only on the up->down edge.
    pub fn update(&mut self, down: bool) -> bool {
        let edge = down && !self.was_down;
        self.was_down = down;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_edge_per_press() {
        let mut key = EdgeDetector::new();
        assert!(key.update(true));
        assert!(!key.update(true));
        assert!(!key.update(true));
        assert!(!key.update(false));
        assert!(key.update(true));
    }

    #[test]
    fn test_idle_produces_nothing() {
        let mut key = EdgeDetector::new();
        for _ in 0..10 {
            assert!(!key.update(false));
        }
    }
}
