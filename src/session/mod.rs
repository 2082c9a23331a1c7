//! Streaming session management
//!
//! This module provides the session manager that ties together:
//! - Audio capture and pause/resume across interruptions
//! - The connect/authorize/attach handshake and reconnect loop
//! - The session phase state machine
//! - Observer events for the presentation layer

mod events;
mod manager;
mod phase;

pub use events::SessionEvent;
pub use manager::{SessionConfig, SessionManager};
pub use phase::{SessionPhase, SessionState};
