//! Remote-session state machine.
//!
//! Provides [`SessionPhase`] plus the auxiliary "disconnect pending"
//! flag, with validated transitions that return `Result` instead of
//! panicking. Only the controller drives these transitions, in response
//! to an explicit command or a session event.

use std::time::Instant;

use crate::error::HoloError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of the remote session.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲               │              │
///       └───────────────┴──────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session. Initial state and terminal state of an explicit stop.
    #[default]
    Disconnected,

    /// Connect or Listen issued; waiting for the peer.
    Connecting,

    /// The session is established.
    Connected {
        /// When the session entered the `Connected` phase.
        since: Instant,
    },
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
        }
    }
}

// ── RemoteSessionState ───────────────────────────────────────────

/// Session phase plus the "disconnect pending" flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteSessionState {
    phase: SessionPhase,
    /// A disconnect was requested but the session has not confirmed it.
    disconnect_pending: bool,
}

impl RemoteSessionState {
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn disconnect_pending(&self) -> bool {
        self.disconnect_pending
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self.phase, SessionPhase::Disconnected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.phase, SessionPhase::Connecting)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, SessionPhase::Connected { .. })
    }

    /// Connecting or Connected.
    pub fn is_active(&self) -> bool {
        !self.is_disconnected()
    }

    /// How long the session has been connected, `None` otherwise.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self.phase {
            SessionPhase::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), HoloError> {
        match self.phase {
            SessionPhase::Disconnected => {
                self.phase = SessionPhase::Connecting;
                self.disconnect_pending = false;
                Ok(())
            }
            _ => Err(HoloError::InvalidTransition(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), HoloError> {
        match self.phase {
            SessionPhase::Connecting => {
                self.phase = SessionPhase::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(HoloError::InvalidTransition(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Mark a disconnect as requested.
    ///
    /// Valid from: `Connecting`, `Connected`. The phase itself changes
    /// only when the session confirms.
    pub fn request_disconnect(&mut self) -> Result<(), HoloError> {
        match self.phase {
            SessionPhase::Connecting | SessionPhase::Connected { .. } => {
                self.disconnect_pending = true;
                Ok(())
            }
            SessionPhase::Disconnected => Err(HoloError::InvalidTransition(
                "cannot disconnect: not in Connecting or Connected state",
            )),
        }
    }

    /// Transition to `Disconnected` and clear the pending flag.
    ///
    /// Valid from: `Connecting`, `Connected`.
    pub fn finish_disconnect(&mut self) -> Result<(), HoloError> {
        match self.phase {
            SessionPhase::Connecting | SessionPhase::Connected { .. } => {
                self.phase = SessionPhase::Disconnected;
                self.disconnect_pending = false;
                Ok(())
            }
            SessionPhase::Disconnected => Err(HoloError::InvalidTransition(
                "cannot finish disconnect: already Disconnected",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    pub fn force_disconnect(&mut self) {
        self.phase = SessionPhase::Disconnected;
        self.disconnect_pending = false;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut state = RemoteSessionState::default();
        assert!(state.is_disconnected());

        state.begin_connect().unwrap();
        assert!(state.is_connecting());

        state.complete_connect().unwrap();
        assert!(state.is_connected());
        assert!(state.connected_duration().is_some());

        state.request_disconnect().unwrap();
        assert!(state.disconnect_pending());
        assert!(state.is_connected());

        state.finish_disconnect().unwrap();
        assert!(state.is_disconnected());
        assert!(!state.disconnect_pending());
    }

    #[test]
    fn connect_only_from_disconnected() {
        let mut state = RemoteSessionState::default();
        state.begin_connect().unwrap();
        assert!(state.begin_connect().is_err());
        state.complete_connect().unwrap();
        assert!(state.begin_connect().is_err());
    }

    #[test]
    fn complete_requires_connecting() {
        let mut state = RemoteSessionState::default();
        assert!(state.complete_connect().is_err());
    }

    #[test]
    fn disconnect_from_connecting() {
        let mut state = RemoteSessionState::default();
        state.begin_connect().unwrap();
        state.request_disconnect().unwrap();
        state.finish_disconnect().unwrap();
        assert!(state.is_disconnected());
    }

    #[test]
    fn disconnect_requires_active_session() {
        let mut state = RemoteSessionState::default();
        assert!(state.request_disconnect().is_err());
        assert!(state.finish_disconnect().is_err());
    }

    #[test]
    fn force_disconnect_from_any_state() {
        let mut state = RemoteSessionState::default();
        state.begin_connect().unwrap();
        state.complete_connect().unwrap();
        state.request_disconnect().unwrap();
        state.force_disconnect();
        assert!(state.is_disconnected());
        assert!(!state.disconnect_pending());
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionPhase::Disconnected.to_string(), "Disconnected");
        assert_eq!(SessionPhase::Connecting.to_string(), "Connecting");
        assert_eq!(
            SessionPhase::Connected {
                since: Instant::now()
            }
            .to_string(),
            "Connected"
        );
    }
}
