//! VR session state machine.
//!
//! Transitions are driven only by the display runtime's event stream, never
//! by application input. Frame submission is valid only in `Running`.

/// Lifecycle phase of the head-mounted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing acquired yet.
    Uninitialized,
    /// Runtime instance and system exist; no session yet.
    InstanceReady,
    /// Session created and bound to the rendering device.
    SessionReady,
    /// Session begun; frames may be submitted.
    Running,
    /// Runtime asked us to stop; submission disabled until a new ready event.
    Stopping,
}

/// Session-state-changed notifications, abstracted from the runtime's event
/// stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Runtime is ready for the session to begin.
    Ready,
    /// Runtime wants the session ended.
    Stopping,
    /// Session or instance is going away for good.
    Exiting,
}

/// Action the session owner must take in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Call the runtime's begin-session operation.
    BeginSession,
    /// Call the runtime's end-session operation.
    EndSession,
    /// Tear down; no further frames will ever be submitted.
    Shutdown,
}

#[derive(Debug)]
pub struct SessionTracker {
    phase: SessionPhase,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Instance and system acquired.
    pub fn instance_created(&mut self) {
        if self.phase == SessionPhase::Uninitialized {
            self.phase = SessionPhase::InstanceReady;
        }
    }

    /// Session created and bound to the device.
    pub fn session_created(&mut self) {
        if self.phase == SessionPhase::InstanceReady {
            self.phase = SessionPhase::SessionReady;
        }
    }

    /// Frame submission is only valid while running.
    pub fn can_submit(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Apply a runtime event, returning what the session owner must do.
    pub fn handle(&mut self, event: SessionEvent) -> Transition {
        match (self.phase, event) {
            (SessionPhase::InstanceReady | SessionPhase::SessionReady, SessionEvent::Ready)
            | (SessionPhase::Stopping, SessionEvent::Ready) => {
                self.phase = SessionPhase::Running;
                Transition::BeginSession
            }
            (SessionPhase::Running, SessionEvent::Stopping) => {
                self.phase = SessionPhase::Stopping;
                Transition::EndSession
            }
            (_, SessionEvent::Exiting) => {
                self.phase = SessionPhase::Uninitialized;
                Transition::Shutdown
            }
            _ => Transition::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_tracker() -> SessionTracker {
        let mut t = SessionTracker::new();
        t.instance_created();
        t.session_created();
        t
    }

    #[test]
    fn test_ready_event_enables_submission() {
        let mut t = ready_tracker();
        assert!(!t.can_submit());
        assert_eq!(t.handle(SessionEvent::Ready), Transition::BeginSession);
        assert_eq!(t.phase(), SessionPhase::Running);
        assert!(t.can_submit());
    }

    #[test]
    fn test_ready_from_instance_ready() {
        let mut t = SessionTracker::new();
        t.instance_created();
        assert_eq!(t.handle(SessionEvent::Ready), Transition::BeginSession);
        assert!(t.can_submit());
    }

    #[test]
    fn test_stopping_disables_submission() {
        let mut t = ready_tracker();
        t.handle(SessionEvent::Ready);
        assert_eq!(t.handle(SessionEvent::Stopping), Transition::EndSession);
        assert!(!t.can_submit());
    }

    #[test]
    fn test_resume_after_stop() {
        let mut t = ready_tracker();
        t.handle(SessionEvent::Ready);
        t.handle(SessionEvent::Stopping);
        assert_eq!(t.handle(SessionEvent::Ready), Transition::BeginSession);
        assert!(t.can_submit());
    }

    #[test]
    fn test_stopping_outside_running_is_ignored() {
        let mut t = ready_tracker();
        assert_eq!(t.handle(SessionEvent::Stopping), Transition::None);
        assert_eq!(t.phase(), SessionPhase::SessionReady);
    }

    #[test]
    fn test_exiting_shuts_down_from_any_phase() {
        let mut t = ready_tracker();
        t.handle(SessionEvent::Ready);
        assert_eq!(t.handle(SessionEvent::Exiting), Transition::Shutdown);
        assert!(!t.can_submit());
    }
}
