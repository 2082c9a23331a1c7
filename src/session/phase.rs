use tracing::{debug, warn};

/// Phase of one consultation's audio-streaming session.
///
/// `Attached` and `IdleAfterStop` are resumable: streaming can restart from
/// them without a new handshake. `Stopped` is terminal for the session
/// instance, and `Error` does not auto-recover — a new session is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Connecting,
    Authenticating,
    Attaching,
    Attached,
    Streaming,
    Interrupted,
    Finishing,
    IdleAfterStop,
    Stopping,
    Stopped,
    Error,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Stopped | SessionPhase::Error)
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self, SessionPhase::Attached | SessionPhase::IdleAfterStop)
    }
}

/// Whether `from -> to` is a defined transition.
///
/// `Error` is reachable from any non-terminal phase; `Connecting` is
/// re-enterable from the handshake and streaming phases because a dropped
/// socket re-runs the whole handshake. Teardown (`Stopping`) is allowed from
/// any live phase, including `Error`, so the consultation status update can
/// always run.
fn is_valid_transition(from: SessionPhase, to: SessionPhase) -> bool {
    use SessionPhase::*;

    match (from, to) {
        (Stopped, _) => false,
        (Stopping, Stopped) => true,
        (Stopping, _) => false,
        (_, Stopping) => true,
        (Error, _) => false,
        (_, Error) => true,
        _ => matches!(
            (from, to),
            (Initializing, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Attaching)
                | (Authenticating, Connecting)
                | (Attaching, Attached)
                | (Attaching, Connecting)
                | (Attached, Streaming)
                | (Attached, Connecting)
                | (Streaming, Interrupted)
                | (Streaming, Finishing)
                | (Streaming, Connecting)
                | (Interrupted, Streaming)
                | (Interrupted, Finishing)
                | (Interrupted, Connecting)
                | (Finishing, IdleAfterStop)
                | (Finishing, Connecting)
                | (IdleAfterStop, Streaming)
                | (IdleAfterStop, Connecting)
        ),
    }
}

/// The single source of truth for one session's state.
///
/// Owned exclusively by the session manager actor; every mutation happens on
/// that one task.
#[derive(Debug)]
pub struct SessionState {
    phase: SessionPhase,
    /// Absent until the handshake context exists; the backend may create it.
    pub consultation_id: Option<String>,
    pub patient_id: String,
    /// Next sequence number for the current audio stream.
    sequence: u64,
    /// Failed reconnect attempts since the last successful attach.
    pub retry_attempts: u32,
    /// Capture paused by an OS-level audio interruption.
    pub interrupted_by_audio: bool,
    /// Capture paused because the network dropped. Distinct from an OS
    /// interruption: on re-attach this triggers a fresh stream.
    pub paused_by_network: bool,
    /// The caller wants audio flowing (survives reconnects).
    pub capture_active: bool,
    /// A `SessionStart` was sent and not yet matched by a `SessionEnd`.
    pub stream_open: bool,
}

impl SessionState {
    pub fn new(patient_id: String, consultation_id: Option<String>) -> Self {
        Self {
            phase: SessionPhase::Initializing,
            consultation_id,
            patient_id,
            sequence: 0,
            retry_attempts: 0,
            interrupted_by_audio: false,
            paused_by_network: false,
            capture_active: false,
            stream_open: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Move to a new phase, refusing undefined transitions.
    pub fn transition(&mut self, to: SessionPhase) -> bool {
        if self.phase == to {
            return true;
        }
        if !is_valid_transition(self.phase, to) {
            warn!("refusing transition {:?} -> {:?}", self.phase, to);
            return false;
        }

        debug!("session phase {:?} -> {:?}", self.phase, to);
        self.phase = to;
        true
    }

    /// Start a new audio stream: numbering restarts at 0.
    pub fn begin_stream(&mut self) {
        self.sequence = 0;
        self.stream_open = true;
    }

    /// Claim the next sequence number. Call only after a successful send.
    pub fn advance_sequence(&mut self) {
        self.sequence += 1;
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// End the current stream, returning the final chunk count.
    pub fn end_stream(&mut self) -> u64 {
        self.stream_open = false;
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new("patient-1".to_string(), None)
    }

    #[test]
    fn handshake_path() {
        let mut s = state();
        assert!(s.transition(SessionPhase::Connecting));
        assert!(s.transition(SessionPhase::Authenticating));
        assert!(s.transition(SessionPhase::Attaching));
        assert!(s.transition(SessionPhase::Attached));
        assert!(s.transition(SessionPhase::Streaming));
    }

    #[test]
    fn skipping_handshake_steps_is_refused() {
        let mut s = state();
        assert!(!s.transition(SessionPhase::Attached));
        assert_eq!(s.phase(), SessionPhase::Initializing);
    }

    #[test]
    fn interruption_round_trip() {
        let mut s = state();
        s.transition(SessionPhase::Connecting);
        s.transition(SessionPhase::Authenticating);
        s.transition(SessionPhase::Attaching);
        s.transition(SessionPhase::Attached);
        s.transition(SessionPhase::Streaming);

        assert!(s.transition(SessionPhase::Interrupted));
        assert!(s.transition(SessionPhase::Streaming));
        assert!(s.transition(SessionPhase::Finishing));
        assert!(s.transition(SessionPhase::IdleAfterStop));
        assert!(s.transition(SessionPhase::Stopping));
        assert!(s.transition(SessionPhase::Stopped));
    }

    #[test]
    fn reconnect_reenters_connecting() {
        let mut s = state();
        s.transition(SessionPhase::Connecting);
        s.transition(SessionPhase::Authenticating);
        s.transition(SessionPhase::Attaching);
        s.transition(SessionPhase::Attached);
        s.transition(SessionPhase::Streaming);

        assert!(s.transition(SessionPhase::Connecting));
    }

    #[test]
    fn error_reachable_from_any_non_terminal_phase() {
        let mut s = state();
        assert!(s.transition(SessionPhase::Error));

        let mut s = state();
        s.transition(SessionPhase::Connecting);
        assert!(s.transition(SessionPhase::Error));
    }

    #[test]
    fn teardown_allowed_from_error() {
        let mut s = state();
        s.transition(SessionPhase::Error);
        assert!(!s.transition(SessionPhase::Connecting));
        assert!(s.transition(SessionPhase::Stopping));
        assert!(s.transition(SessionPhase::Stopped));
    }

    #[test]
    fn terminal_phases_stay_terminal() {
        let mut s = state();
        s.transition(SessionPhase::Error);
        assert!(!s.transition(SessionPhase::Connecting));
        assert!(!s.transition(SessionPhase::Streaming));

        let mut s = state();
        s.transition(SessionPhase::Connecting);
        s.transition(SessionPhase::Authenticating);
        s.transition(SessionPhase::Attaching);
        s.transition(SessionPhase::Attached);
        s.transition(SessionPhase::Stopping);
        s.transition(SessionPhase::Stopped);
        assert!(!s.transition(SessionPhase::Streaming));
    }

    #[test]
    fn stream_numbering_resets_per_stream() {
        let mut s = state();
        s.begin_stream();
        assert_eq!(s.sequence(), 0);
        s.advance_sequence();
        s.advance_sequence();
        assert_eq!(s.end_stream(), 2);

        s.begin_stream();
        assert_eq!(s.sequence(), 0);
    }
}
