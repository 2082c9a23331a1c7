//! Error taxonomy for the streaming session engine
//!
//! Raw transport and OS errors are classified here before they cross into
//! the session manager. Only `NetworkUnavailable` is retryable; it drives
//! the reconnect loop. Everything else is fatal for the current attempt.

use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Classified errors surfaced by the streaming components.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A message could not be encoded. Internal bug; should not occur for
    /// internally constructed messages.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A send was requested while no socket is open.
    #[error("no open connection")]
    ConnectionUnavailable,

    /// A single send failed for a non-network reason.
    #[error("transmission failed: {0}")]
    TransmissionFailed(String),

    /// The network dropped out from under us. Retryable.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The backend reported an error; the message is passed through verbatim.
    #[error("{0}")]
    ServerReported(String),

    /// An inbound payload matched none of the recognized message shapes.
    /// Logged and ignored, never propagated as a failure.
    #[error("unrecognized message")]
    UnrecognizedMessage,

    /// The capture device could not be started.
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The credential provider could not supply a token.
    #[error("authorization failed: {0}")]
    AuthFailed(String),
}

impl StreamError {
    /// Whether this error should enter the reconnect-with-backoff loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::NetworkUnavailable(_))
    }
}

/// Fold low-level socket error kinds into the taxonomy.
///
/// Kinds meaning "not connected", "timed out", or "connection reset" all
/// become `NetworkUnavailable` and drive the retry loop.
pub fn classify_io(err: &io::Error) -> StreamError {
    match err.kind() {
        io::ErrorKind::NotConnected
        | io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::NetworkDown => StreamError::NetworkUnavailable(err.to_string()),
        _ => StreamError::TransmissionFailed(err.to_string()),
    }
}

/// Classify a WebSocket-layer error.
pub fn classify_ws(err: &tungstenite::Error) -> StreamError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            StreamError::NetworkUnavailable("connection closed".to_string())
        }
        tungstenite::Error::Io(io_err) => classify_io(io_err),
        tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => StreamError::NetworkUnavailable("connection reset".to_string()),
        other => StreamError::TransmissionFailed(other.to_string()),
    }
}
