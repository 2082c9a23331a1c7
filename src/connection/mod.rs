pub mod manager;
pub mod retry;
pub mod transport;

pub use manager::{ConnectionEvent, ConnectionManager, ConnectionPhase};
pub use retry::RetryPolicy;
pub use transport::{MessageSink, MessageStream, Transport, WsTransport};
