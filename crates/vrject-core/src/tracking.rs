//! Head-orientation to mouse-look conversion.
//!
//! The HMD reports a full orientation quaternion every frame; the host
//! application only understands relative horizontal mouse motion. This
//! module extracts planar yaw from the quaternion, takes the shortest
//! angular delta against the previous frame (with ±π wrap correction),
//! suppresses jitter below a dead-zone, and scales the remainder into a
//! pointer delta.
//!
//! Pitch and roll are ignored by design: mouse-look games map horizontal
//! motion to yaw, and feeding them pitch would fight the player's own
//! vertical aim.

use glam::Quat;

/// Deltas at or below this magnitude (radians) are treated as sensor rest.
pub const DEAD_ZONE_RAD: f32 = 0.001;

/// Pointer counts emitted per radian of yaw.
pub const MOUSE_SENSITIVITY: f32 = 1000.0;

/// Extract planar yaw (rotation about the vertical axis) from a quaternion.
///
/// `yaw = atan2(2(wy + zx), 1 - 2(y² + z²))` — exact when the orientation
/// is yaw-then-pitch, a good approximation for the small roll angles a
/// seated head produces.
pub fn yaw_from_quat(q: Quat) -> f32 {
    let siny_cosp = 2.0 * (q.w * q.y + q.z * q.x);
    let cosy_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
    siny_cosp.atan2(cosy_cosp)
}

/// Fold an angle into (-π, π], so a crossing of the ±π seam reads as a
/// small step rather than a full turn.
pub fn wrap_angle(mut delta: f32) -> f32 {
    while delta > std::f32::consts::PI {
        delta -= 2.0 * std::f32::consts::PI;
    }
    while delta < -std::f32::consts::PI {
        delta += 2.0 * std::f32::consts::PI;
    }
    delta
}

/// Per-frame yaw delta tracker.
///
/// Holds only the last emitted yaw; starts at zero at process start and is
/// never persisted.
#[derive(Debug, Default)]
pub struct YawTracker {
    last_yaw: f32,
}

impl YawTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current head orientation; returns the pointer delta to
    /// emit, or `None` while inside the dead-zone.
    ///
    /// The stored yaw only advances when a delta is emitted, matching the
    /// rest-suppression behavior: tiny drifts accumulate until they clear
    /// the dead-zone instead of being discarded.
    pub fn update(&mut self, orientation: Quat) -> Option<i32> {
        let yaw = yaw_from_quat(orientation);
        let delta = wrap_angle(yaw - self.last_yaw);
        if delta.abs() > DEAD_ZONE_RAD {
            self.last_yaw = yaw;
            Some((delta * MOUSE_SENSITIVITY) as i32)
        } else {
            None
        }
    }

    /// Last yaw a pointer event was emitted for.
    pub fn last_yaw(&self) -> f32 {
        self.last_yaw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn head_quat(yaw: f32, pitch: f32) -> Quat {
        // Yaw about +Y applied first, then pitch about +X.
        Quat::from_rotation_x(pitch) * Quat::from_rotation_y(yaw)
    }

    #[test]
    fn test_yaw_roundtrip() {
        for &yaw in &[-3.0, -1.5, -0.25, 0.0, 0.25, 1.5, 3.0] {
            let q = Quat::from_rotation_y(yaw);
            assert!(
                (yaw_from_quat(q) - yaw).abs() < 1e-5,
                "yaw {yaw} extracted as {}",
                yaw_from_quat(q)
            );
        }
    }

    #[test]
    fn test_yaw_invariant_under_pitch() {
        for &yaw in &[-2.0, -0.5, 0.0, 0.7, 2.4] {
            let base = yaw_from_quat(head_quat(yaw, 0.0));
            for &pitch in &[-1.0, -0.3, 0.3, 1.0] {
                let perturbed = yaw_from_quat(head_quat(yaw, pitch));
                assert!(
                    (perturbed - base).abs() < 1e-4,
                    "yaw {yaw} moved to {perturbed} under pitch {pitch}"
                );
            }
        }
    }

    #[test]
    fn test_wrap_at_pi_boundary() {
        // 3.14 -> -3.14 is a ~0.0032 rad step, not a full turn.
        let delta = wrap_angle(-3.14 - 3.14);
        assert!(delta.abs() < 0.01, "wrapped delta was {delta}");
        assert!(delta > 0.0);
    }

    #[test]
    fn test_dead_zone_suppresses_small_deltas() {
        let mut tracker = YawTracker::new();
        assert_eq!(tracker.update(Quat::from_rotation_y(0.0005)), None);
        assert_eq!(tracker.update(Quat::from_rotation_y(0.001)), None);
        assert_eq!(tracker.last_yaw(), 0.0);
    }

    #[test]
    fn test_delta_above_dead_zone_emits_scaled_event() {
        let mut tracker = YawTracker::new();
        let q = Quat::from_rotation_y(0.1);
        let dx = tracker.update(q).unwrap();
        assert_eq!(dx, (yaw_from_quat(q) * MOUSE_SENSITIVITY) as i32);
        assert!((tracker.last_yaw() - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_wrap_crossing_emits_small_delta() {
        let mut tracker = YawTracker::new();
        tracker.update(Quat::from_rotation_y(3.1)).unwrap();
        // Cross the seam: 3.1 -> -3.1 should read as +0.083 rad, not -6.2.
        let last = tracker.last_yaw();
        let dx = tracker.update(Quat::from_rotation_y(-3.1)).unwrap();
        let expected = wrap_angle(yaw_from_quat(Quat::from_rotation_y(-3.1)) - last);
        assert_eq!(dx, (expected * MOUSE_SENSITIVITY) as i32);
        assert!(dx.abs() < 200, "seam crossing produced {dx}");
    }

    #[test]
    fn test_drift_accumulates_until_dead_zone_cleared() {
        let mut tracker = YawTracker::new();
        // Two sub-threshold steps in the same direction; the second clears
        // the dead-zone because last_yaw never advanced.
        assert_eq!(tracker.update(Quat::from_rotation_y(0.0008)), None);
        assert!(tracker.update(Quat::from_rotation_y(0.0016)).is_some());
    }

    #[test]
    fn test_half_turn_is_not_wrapped() {
        assert!((wrap_angle(PI) - PI).abs() < 1e-6);
        assert!((wrap_angle(-PI + 0.01) - (-PI + 0.01)).abs() < 1e-6);
    }
}
