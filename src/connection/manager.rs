use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::transport::{MessageSink, MessageStream, Transport};
use crate::error::StreamError;
use crate::protocol::{self, InboundMessage, OutboundMessage};

/// Lifecycle phase of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// What the connection surfaces to its owner.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A decoded inbound message.
    Message(InboundMessage),
    /// The socket closed without an explicit `close` call. `error` is the
    /// classified cause, if the closure came with one.
    Closed { error: Option<StreamError> },
}

/// Owns the single socket to the backend.
///
/// There is never more than one live socket: `open` always closes the
/// previous socket first. The receive loop decodes inbound frames and
/// forwards them on the event channel; unrecognized payloads are logged at
/// debug level and dropped. Explicit `close` suppresses the `Closed` event
/// so a graceful teardown never looks like a network loss.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    url: String,
    sink: Option<Box<dyn MessageSink>>,
    recv_task: Option<JoinHandle<()>>,
    stop_receiving: Arc<AtomicBool>,
    phase: ConnectionPhase,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, url: String) -> Self {
        Self {
            transport,
            url,
            sink: None,
            recv_task: None,
            stop_receiving: Arc::new(AtomicBool::new(false)),
            phase: ConnectionPhase::Idle,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    /// Establish a socket and start the receive loop.
    ///
    /// Returns once the transport is up; handshake completion is reported
    /// asynchronously through the event channel as status messages arrive.
    pub async fn open(
        &mut self,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<(), StreamError> {
        // Replace, never hold two live sockets.
        self.close("reopening").await;

        self.phase = ConnectionPhase::Connecting;
        let (sink, stream) = match self.transport.connect(&self.url).await {
            Ok(halves) => halves,
            Err(e) => {
                self.phase = ConnectionPhase::Closed;
                return Err(e);
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(receive_loop(stream, events, Arc::clone(&stop)));

        self.sink = Some(sink);
        self.recv_task = Some(task);
        self.stop_receiving = stop;
        self.phase = ConnectionPhase::Open;

        info!("connection open: {}", self.url);
        Ok(())
    }

    /// Encode and write one message.
    pub async fn send(&mut self, message: &OutboundMessage) -> Result<(), StreamError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or(StreamError::ConnectionUnavailable)?;

        let text =
            protocol::encode(message).map_err(|e| StreamError::InvalidPayload(e.to_string()))?;
        sink.send(text).await
    }

    /// First handshake step: present the bearer token.
    pub async fn authorize(&mut self, token: String) -> Result<(), StreamError> {
        self.send(&OutboundMessage::Authorize { token }).await
    }

    /// Second handshake step: bind the socket to the consultation context.
    pub async fn attach(
        &mut self,
        consultation_id: String,
        patient_id: String,
        expert_id: String,
        practice_id: String,
    ) -> Result<(), StreamError> {
        self.send(&OutboundMessage::AttachSession {
            consultation_id,
            patient_id,
            expert_id,
            practice_id,
        })
        .await
    }

    /// Close gracefully. Safe to call on an already-closed connection.
    pub async fn close(&mut self, reason: &str) {
        if self.sink.is_none() && self.recv_task.is_none() {
            self.phase = ConnectionPhase::Closed;
            return;
        }

        debug!("closing connection: {}", reason);
        self.phase = ConnectionPhase::Closing;

        // Pre-empt the receive loop's next iteration; it is checked before
        // re-arming, not enforced by forcible interruption.
        self.stop_receiving.store(true, Ordering::SeqCst);

        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
        if let Some(task) = self.recv_task.take() {
            let _ = task.await;
        }

        self.phase = ConnectionPhase::Closed;
    }
}

async fn receive_loop(
    mut stream: Box<dyn MessageStream>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match stream.next().await {
            Some(Ok(text)) => match protocol::decode::<InboundMessage>(text.as_bytes()) {
                Ok(message) => {
                    if events.send(ConnectionEvent::Message(message)).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    // Non-fatal: unknown shapes are ignored.
                    debug!("ignoring unrecognized inbound message");
                }
            },
            Some(Err(e)) => {
                if !stop.load(Ordering::SeqCst) {
                    let _ = events.send(ConnectionEvent::Closed { error: Some(e) });
                }
                break;
            }
            None => {
                if !stop.load(Ordering::SeqCst) {
                    let _ = events.send(ConnectionEvent::Closed { error: None });
                }
                break;
            }
        }
    }

    debug!("receive loop stopped");
}
