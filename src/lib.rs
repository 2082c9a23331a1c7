pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod services;
pub mod session;

pub use audio::{
    AudioFrame, CaptureDevice, CaptureEvent, CaptureFormat, InterruptionHandle, SyntheticCapture,
};
pub use config::Config;
pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionPhase, RetryPolicy, Transport, WsTransport,
};
pub use error::StreamError;
pub use protocol::{InboundMessage, OutboundMessage, StatusKind};
pub use services::{Consultation, ConsultationService, ConsultationStatus, CredentialProvider};
pub use session::{SessionConfig, SessionEvent, SessionManager, SessionPhase};
