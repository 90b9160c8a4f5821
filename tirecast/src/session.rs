//! Session lifecycle state machine.
//!
//! ```text
//!          SessionChanged          SampleObserved
//!   Idle ─────────────────► Active ──────────────► Collecting
//!    ▲                        │                        │
//!    │ PassesCompleted        │ SessionEnded           │ SessionEnded
//!    │                        ▼                        │
//!    └──────────────────── Ending ◄────────────────────┘
//! ```
//!
//! A `SessionChanged` with a new id while Active or Collecting ends the
//! running session first. A `SessionChanged` while Ending starts the new
//! session straight away; the previous session's training and storage
//! passes finish in the background. Duplicate `SessionEnded` signals in
//! Idle or Ending are ignored.
//!
//! The machine only decides; the engine carries out the returned
//! [`LifecycleAction`].

use tracing::debug;

use crate::telemetry::SessionInfo;

/// Where the engine is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session.
    #[default]
    Idle,

    /// A session was announced; no sample yet.
    Active,

    /// Samples are flowing.
    Collecting,

    /// Session ended; background passes running.
    Ending,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Active => write!(f, "active"),
            SessionPhase::Collecting => write!(f, "collecting"),
            SessionPhase::Ending => write!(f, "ending"),
        }
    }
}

/// Named lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionChanged(SessionInfo),
    SampleObserved,
    SessionEnded,
    PassesCompleted,
}

/// What the engine must do for a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleAction {
    None,
    Begin(SessionInfo),
    End(SessionInfo),
    EndThenBegin {
        ending: SessionInfo,
        next: SessionInfo,
    },
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub action: LifecycleAction,
}

/// Tracks the current session and phase.
#[derive(Debug, Default)]
pub struct SessionLifecycle {
    phase: SessionPhase,
    current: Option<SessionInfo>,

    /// Ended sessions whose passes have not completed.
    pending_passes: usize,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current(&self) -> Option<&SessionInfo> {
        self.current.as_ref()
    }

    pub fn pending_passes(&self) -> usize {
        self.pending_passes
    }

    pub fn handle(&mut self, event: SessionEvent) -> Transition {
        let from = self.phase;
        let action = match (from, event) {
            (SessionPhase::Idle | SessionPhase::Ending, SessionEvent::SessionChanged(info)) => {
                self.phase = SessionPhase::Active;
                self.current = Some(info.clone());
                LifecycleAction::Begin(info)
            }
            (SessionPhase::Active | SessionPhase::Collecting, SessionEvent::SessionChanged(info)) => {
                match self.current.take() {
                    Some(current) if current.session_id == info.session_id => {
                        self.current = Some(current);
                        LifecycleAction::None
                    }
                    Some(current) => {
                        self.pending_passes += 1;
                        self.phase = SessionPhase::Active;
                        self.current = Some(info.clone());
                        LifecycleAction::EndThenBegin {
                            ending: current,
                            next: info,
                        }
                    }
                    None => {
                        self.phase = SessionPhase::Active;
                        self.current = Some(info.clone());
                        LifecycleAction::Begin(info)
                    }
                }
            }
            (SessionPhase::Active, SessionEvent::SampleObserved) => {
                self.phase = SessionPhase::Collecting;
                LifecycleAction::None
            }
            (SessionPhase::Active | SessionPhase::Collecting, SessionEvent::SessionEnded) => {
                self.phase = SessionPhase::Ending;
                match self.current.take() {
                    Some(current) => {
                        self.pending_passes += 1;
                        LifecycleAction::End(current)
                    }
                    None => LifecycleAction::None,
                }
            }
            (_, SessionEvent::PassesCompleted) => {
                self.pending_passes = self.pending_passes.saturating_sub(1);
                if self.phase == SessionPhase::Ending && self.pending_passes == 0 {
                    self.phase = SessionPhase::Idle;
                }
                LifecycleAction::None
            }
            // Samples outside a session and duplicate end signals
            (_, SessionEvent::SampleObserved) | (_, SessionEvent::SessionEnded) => {
                LifecycleAction::None
            }
        };

        if from != self.phase {
            debug!(from = %from, to = %self.phase, "Session phase changed");
        }
        Transition {
            from,
            to: self.phase,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> SessionInfo {
        SessionInfo::new(id, "mclaren_720s", "gt3", "suzuka")
    }

    #[test]
    fn test_full_lifecycle() {
        let mut lifecycle = SessionLifecycle::new();

        let t = lifecycle.handle(SessionEvent::SessionChanged(info("a")));
        assert_eq!((t.from, t.to), (SessionPhase::Idle, SessionPhase::Active));
        assert_eq!(t.action, LifecycleAction::Begin(info("a")));

        let t = lifecycle.handle(SessionEvent::SampleObserved);
        assert_eq!(t.to, SessionPhase::Collecting);

        let t = lifecycle.handle(SessionEvent::SessionEnded);
        assert_eq!(t.to, SessionPhase::Ending);
        assert_eq!(t.action, LifecycleAction::End(info("a")));
        assert_eq!(lifecycle.pending_passes(), 1);

        let t = lifecycle.handle(SessionEvent::PassesCompleted);
        assert_eq!(t.to, SessionPhase::Idle);
        assert!(lifecycle.current().is_none());
    }

    #[test]
    fn test_duplicate_end_is_ignored() {
        let mut lifecycle = SessionLifecycle::new();
        assert_eq!(
            lifecycle.handle(SessionEvent::SessionEnded).action,
            LifecycleAction::None
        );

        lifecycle.handle(SessionEvent::SessionChanged(info("a")));
        lifecycle.handle(SessionEvent::SessionEnded);
        let t = lifecycle.handle(SessionEvent::SessionEnded);
        assert_eq!(t.action, LifecycleAction::None);
        assert_eq!(t.to, SessionPhase::Ending);
        assert_eq!(lifecycle.pending_passes(), 1);
    }

    #[test]
    fn test_new_session_ends_running_one() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.handle(SessionEvent::SessionChanged(info("a")));
        lifecycle.handle(SessionEvent::SampleObserved);

        let t = lifecycle.handle(SessionEvent::SessionChanged(info("b")));
        assert_eq!(t.to, SessionPhase::Active);
        assert_eq!(
            t.action,
            LifecycleAction::EndThenBegin {
                ending: info("a"),
                next: info("b")
            }
        );

        // The old session's passes finishing does not disturb the new one
        let t = lifecycle.handle(SessionEvent::PassesCompleted);
        assert_eq!(t.to, SessionPhase::Active);
        assert_eq!(lifecycle.current(), Some(&info("b")));
    }

    #[test]
    fn test_same_session_announced_twice() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.handle(SessionEvent::SessionChanged(info("a")));
        lifecycle.handle(SessionEvent::SampleObserved);

        let t = lifecycle.handle(SessionEvent::SessionChanged(info("a")));
        assert_eq!(t.action, LifecycleAction::None);
        assert_eq!(t.to, SessionPhase::Collecting);
    }

    #[test]
    fn test_new_session_while_ending() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.handle(SessionEvent::SessionChanged(info("a")));
        lifecycle.handle(SessionEvent::SessionEnded);

        let t = lifecycle.handle(SessionEvent::SessionChanged(info("b")));
        assert_eq!(t.action, LifecycleAction::Begin(info("b")));
        assert_eq!(lifecycle.pending_passes(), 1);
    }

    #[test]
    fn test_samples_without_session_are_ignored() {
        let mut lifecycle = SessionLifecycle::new();
        let t = lifecycle.handle(SessionEvent::SampleObserved);
        assert_eq!(t.to, SessionPhase::Idle);
    }
}
