//! Per-frame branch decisions, separated from the runtime calls they gate.
//!
//! The frame protocol has two forks: whether to touch the frame at all and,
//! once begun, whether to acquire an eye image or submit an empty layer
//! list; the composite pass has one: stereo reprojection or a flat mono
//! copy. The runtime-facing code asks these functions and only executes the
//! answer.

/// What to do with the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Session not running; do not wait, begin, acquire, or submit.
    Skip,
    /// End the frame with an empty layer list without acquiring an image.
    SubmitEmpty,
    /// Acquire an eye image, composite into it, submit the layer.
    Render,
}

/// Decide the frame action from the session phase and the runtime's
/// should-render flag. An empty submission is a valid frame, not an error.
pub fn plan_frame(can_submit: bool, should_render: bool) -> FrameAction {
    if !can_submit {
        FrameAction::Skip
    } else if !should_render {
        FrameAction::SubmitEmpty
    } else {
        FrameAction::Render
    }
}

/// How to fill the eye slices this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// Depth-shifted reprojection through the stereo shader pass.
    Stereo,
    /// Identical copy of the mono source into both eye slices.
    MonoCopy,
}

/// Choose the composite pass. The stereo shader path needs a captured depth
/// buffer and working compositor resources; missing either degrades to the
/// flat duplicate rather than failing the frame.
pub fn composite_mode(depth_available: bool, stereo_available: bool) -> CompositeMode {
    if depth_available && stereo_available {
        CompositeMode::Stereo
    } else {
        CompositeMode::MonoCopy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_session_skips_frame_entirely() {
        assert_eq!(plan_frame(false, true), FrameAction::Skip);
        assert_eq!(plan_frame(false, false), FrameAction::Skip);
    }

    #[test]
    fn test_should_render_false_submits_empty_without_acquiring() {
        assert_eq!(plan_frame(true, false), FrameAction::SubmitEmpty);
    }

    #[test]
    fn test_running_and_should_render_acquires() {
        assert_eq!(plan_frame(true, true), FrameAction::Render);
    }

    #[test]
    fn test_missing_depth_never_selects_stereo() {
        assert_eq!(composite_mode(false, true), CompositeMode::MonoCopy);
    }

    #[test]
    fn test_failed_compositor_falls_back_to_mono() {
        assert_eq!(composite_mode(true, false), CompositeMode::MonoCopy);
    }

    #[test]
    fn test_depth_with_working_compositor_renders_stereo() {
        assert_eq!(composite_mode(true, true), CompositeMode::Stereo);
    }
}
