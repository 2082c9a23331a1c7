use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::events::SessionEvent;
use super::phase::{SessionPhase, SessionState};
use crate::audio::{CaptureDevice, CaptureEvent, CaptureFormat};
use crate::connection::{ConnectionEvent, ConnectionManager, RetryPolicy, Transport};
use crate::error::StreamError;
use crate::protocol::{InboundMessage, OutboundMessage, StatusKind};
use crate::services::{Consultation, ConsultationService, ConsultationStatus, CredentialProvider};

/// Configuration for one streaming session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Streaming endpoint URL
    pub url: String,
    pub patient_id: String,
    pub expert_id: String,
    pub practice_id: String,
    /// Reuse an existing consultation instead of creating a new one.
    pub consultation_id: Option<String>,
    /// Fixed capture format announced in every `SessionStart`
    pub format: CaptureFormat,
    pub retry: RetryPolicy,
    /// Local tag for log correlation
    pub session_tag: String,
}

impl SessionConfig {
    pub fn new(url: String, patient_id: String, expert_id: String, practice_id: String) -> Self {
        Self {
            url,
            patient_id,
            expert_id,
            practice_id,
            consultation_id: None,
            format: CaptureFormat::default(),
            retry: RetryPolicy::default(),
            session_tag: format!("session-{}", uuid::Uuid::new_v4()),
        }
    }
}

enum Command {
    Start { done: oneshot::Sender<()> },
    Stop { done: oneshot::Sender<()> },
    Close { finish: bool, done: oneshot::Sender<()> },
}

/// Everything that reaches the session actor. Capture frames, inbound
/// messages, reconnect timers, and API commands all funnel through one
/// channel so every state mutation happens on one task.
enum ActorInput {
    Command(Command),
    Connection(ConnectionEvent),
    Capture(CaptureEvent),
    ReconnectDue { token: u64 },
}

/// Façade over one consultation's streaming session.
///
/// Spawns a single actor task that owns the session state, the capture
/// device, and the connection. Side effects are observable through the
/// [`SessionEvent`] channel returned by [`SessionManager::spawn`].
pub struct SessionManager {
    inbox: mpsc::UnboundedSender<ActorInput>,
    #[allow(dead_code)]
    task: JoinHandle<()>,
}

impl SessionManager {
    /// Create the session and start its actor task.
    pub fn spawn(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        capture: Box<dyn CaptureDevice>,
        credentials: Arc<dyn CredentialProvider>,
        consultations: Arc<dyn ConsultationService>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        info!("creating streaming session: {}", config.session_tag);

        let actor = SessionActor {
            state: SessionState::new(config.patient_id.clone(), config.consultation_id.clone()),
            connection: ConnectionManager::new(transport, config.url.clone()),
            config,
            capture,
            credentials,
            consultations,
            events: event_tx,
            inbox: inbox_tx.clone(),
            consultation: None,
            pending_start: false,
            init_completed: false,
            reconnect: None,
            reconnect_token: 0,
        };

        let task = tokio::spawn(actor.run(inbox_rx));

        (
            Self {
                inbox: inbox_tx,
                task,
            },
            event_rx,
        )
    }

    /// Begin (or resume) capturing and streaming audio. Idempotent while
    /// already active; triggers the handshake first if not yet attached.
    pub async fn start_streaming(&self) -> Result<()> {
        self.command(|done| Command::Start { done }).await
    }

    /// Stop local capture and end the audio stream with its final sequence
    /// count.
    pub async fn stop_streaming(&self) -> Result<()> {
        self.command(|done| Command::Stop { done }).await
    }

    /// Update the consultation status (`finished` or back to `idle`) and
    /// tear down the connection. The status update is always attempted, even
    /// if the socket is already gone.
    pub async fn close_connection(&self, finish_consultation: bool) -> Result<()> {
        self.command(|done| Command::Close {
            finish: finish_consultation,
            done,
        })
        .await
    }

    async fn command(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.inbox
            .send(ActorInput::Command(make(done_tx)))
            .map_err(|_| anyhow::anyhow!("session task has stopped"))?;
        done_rx.await.context("session task dropped the command")?;
        Ok(())
    }
}

struct ReconnectState {
    /// Failed attempts since the loss that opened this loop
    attempts: u32,
    /// When the loop was entered; bounds total retry time
    since: Instant,
}

struct SessionActor {
    config: SessionConfig,
    state: SessionState,
    connection: ConnectionManager,
    capture: Box<dyn CaptureDevice>,
    credentials: Arc<dyn CredentialProvider>,
    consultations: Arc<dyn ConsultationService>,
    events: mpsc::UnboundedSender<SessionEvent>,
    inbox: mpsc::UnboundedSender<ActorInput>,
    consultation: Option<Consultation>,
    /// Start was requested before the handshake finished.
    pending_start: bool,
    /// `InitCompleted` is emitted once per session, not per reconnect.
    init_completed: bool,
    reconnect: Option<ReconnectState>,
    /// Invalidates reconnect timers that outlived their loop.
    reconnect_token: u64,
}

impl SessionActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<ActorInput>) {
        while let Some(input) = inbox.recv().await {
            match input {
                ActorInput::Command(cmd) => self.handle_command(cmd).await,
                ActorInput::Connection(ev) => self.handle_connection_event(ev).await,
                ActorInput::Capture(ev) => self.handle_capture_event(ev).await,
                ActorInput::ReconnectDue { token } => self.handle_reconnect_due(token).await,
            }

            if self.state.phase() == SessionPhase::Stopped {
                break;
            }
        }

        debug!("session actor stopped: {}", self.config.session_tag);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { done } => {
                self.handle_start().await;
                let _ = done.send(());
            }
            Command::Stop { done } => {
                self.handle_stop().await;
                let _ = done.send(());
            }
            Command::Close { finish, done } => {
                self.handle_close(finish).await;
                let _ = done.send(());
            }
        }
    }

    async fn handle_start(&mut self) {
        match self.state.phase() {
            SessionPhase::Streaming | SessionPhase::Interrupted => {
                debug!("start requested while already recording");
            }
            SessionPhase::Attached | SessionPhase::IdleAfterStop => {
                self.pending_start = true;
                self.begin_streaming(false).await;
            }
            SessionPhase::Initializing => {
                self.pending_start = true;
                self.initialize().await;
            }
            SessionPhase::Connecting | SessionPhase::Authenticating | SessionPhase::Attaching => {
                // Handshake in flight; streaming starts once attached.
                self.pending_start = true;
            }
            phase => {
                warn!("start requested in phase {:?}; ignoring", phase);
            }
        }
    }

    async fn handle_stop(&mut self) {
        match self.state.phase() {
            SessionPhase::Streaming | SessionPhase::Interrupted => {
                if let Err(e) = self.capture.stop().await {
                    warn!("failed to stop capture: {e:#}");
                }
                self.state.capture_active = false;
                self.state.interrupted_by_audio = false;

                let final_count = self.state.end_stream();
                self.state.transition(SessionPhase::Finishing);

                let end = OutboundMessage::SessionEnd {
                    final_sequence_count: final_count,
                };
                if let Err(e) = self.connection.send(&end).await {
                    // No summary will arrive over a dead socket; settle
                    // without waiting for one.
                    warn!("failed to send session end: {e}");
                    self.state.transition(SessionPhase::IdleAfterStop);
                    self.emit(SessionEvent::Message {
                        line: "recording stopped without backend confirmation".to_string(),
                    });
                }
            }
            _ if self.state.paused_by_network && self.state.capture_active => {
                info!("stop requested while reconnecting; capture will not resume");
                self.state.capture_active = false;
                self.state.paused_by_network = false;
            }
            _ => {
                debug!("stop requested while not recording");
            }
        }
    }

    async fn handle_close(&mut self, finish: bool) {
        // The status update always runs, even when the socket is gone.
        let status = if finish {
            ConsultationStatus::Finished
        } else {
            ConsultationStatus::Idle
        };

        let mut consultation = self.consultation.clone();
        if let Some(id) = self.state.consultation_id.clone() {
            match self.consultations.update(&id, status).await {
                Ok(updated) => consultation = Some(updated),
                Err(e) => warn!("failed to update consultation status: {e:#}"),
            }
        }

        self.reconnect = None;
        self.reconnect_token += 1;

        if let Err(e) = self.capture.stop().await {
            warn!("failed to stop capture: {e:#}");
        }
        self.state.capture_active = false;

        self.state.transition(SessionPhase::Stopping);
        self.connection.close("session closed").await;
        self.state.transition(SessionPhase::Stopped);

        if let Some(consultation) = consultation {
            self.emit(SessionEvent::Stopped { consultation });
        }
    }

    /// Session init: make sure a consultation exists, then connect.
    async fn initialize(&mut self) {
        if self.state.consultation_id.is_none() {
            match self.consultations.initiate(&self.state.patient_id).await {
                Ok(consultation) => {
                    self.state.consultation_id = Some(consultation.id.clone());
                    self.consultation = Some(consultation);
                }
                Err(e) => {
                    self.fail(format!("failed to initiate consultation: {e:#}"))
                        .await;
                    return;
                }
            }
        }

        self.open_connection().await;
    }

    async fn open_connection(&mut self) {
        let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            while let Some(ev) = conn_rx.recv().await {
                if inbox.send(ActorInput::Connection(ev)).is_err() {
                    break;
                }
            }
        });

        match self.connection.open(conn_tx).await {
            Ok(()) => {
                self.state.transition(SessionPhase::Connecting);
            }
            Err(e) if e.is_retryable() => self.enter_network_loss(e).await,
            Err(e) => self.fail(e.to_string()).await,
        }
    }

    async fn handle_connection_event(&mut self, ev: ConnectionEvent) {
        match ev {
            ConnectionEvent::Message(msg) => self.handle_inbound(msg).await,
            ConnectionEvent::Closed { error } => {
                if matches!(
                    self.state.phase(),
                    SessionPhase::Stopping | SessionPhase::Stopped | SessionPhase::Error
                ) {
                    return;
                }

                let err = error.unwrap_or_else(|| {
                    StreamError::NetworkUnavailable("connection closed unexpectedly".to_string())
                });
                if err.is_retryable() {
                    self.enter_network_loss(err).await;
                } else {
                    self.fail(err.to_string()).await;
                }
            }
        }
    }

    async fn handle_inbound(&mut self, msg: InboundMessage) {
        match msg {
            InboundMessage::Status {
                kind: StatusKind::Connected,
                ..
            } => {
                if self.state.phase() != SessionPhase::Connecting {
                    debug!("connected status outside handshake; ignoring");
                    return;
                }
                self.state.transition(SessionPhase::Authenticating);

                // A fresh token for every authorize step, reconnects included.
                let token = match self.credentials.valid_auth_header().await {
                    Ok(token) => token,
                    Err(e) => {
                        let err = StreamError::AuthFailed(e.to_string());
                        self.fail(err.to_string()).await;
                        return;
                    }
                };

                if let Err(e) = self.connection.authorize(token).await {
                    self.after_send_failure(e).await;
                }
            }

            InboundMessage::Status {
                kind: StatusKind::Authenticated,
                ..
            } => {
                if self.state.phase() != SessionPhase::Authenticating {
                    debug!("authenticated status outside handshake; ignoring");
                    return;
                }
                self.state.transition(SessionPhase::Attaching);

                let consultation_id = self.state.consultation_id.clone().unwrap_or_default();
                if let Err(e) = self
                    .connection
                    .attach(
                        consultation_id,
                        self.state.patient_id.clone(),
                        self.config.expert_id.clone(),
                        self.config.practice_id.clone(),
                    )
                    .await
                {
                    self.after_send_failure(e).await;
                }
            }

            InboundMessage::Status {
                kind: StatusKind::Attached,
                ..
            } => {
                if self.state.phase() != SessionPhase::Attaching {
                    debug!("attached status outside handshake; ignoring");
                    return;
                }
                self.state.transition(SessionPhase::Attached);

                // A successful attach resets the retry budget.
                self.state.retry_attempts = 0;
                self.reconnect = None;
                self.reconnect_token += 1;

                if !self.init_completed {
                    self.init_completed = true;
                    if let Some(id) = self.state.consultation_id.clone() {
                        self.emit(SessionEvent::InitCompleted {
                            consultation_id: id,
                        });
                    }
                }

                let resume = self.state.capture_active && self.state.paused_by_network;
                if self.pending_start || resume {
                    self.begin_streaming(resume).await;
                }
            }

            InboundMessage::Status {
                kind: StatusKind::Error,
                error,
            } => {
                let message =
                    error.unwrap_or_else(|| "backend reported an unspecified error".to_string());
                self.fail(StreamError::ServerReported(message).to_string())
                    .await;
            }

            InboundMessage::Status {
                kind: StatusKind::Other,
                ..
            } => {
                debug!("ignoring unrecognized status kind");
            }

            InboundMessage::Event { name } => {
                self.emit(SessionEvent::Message {
                    line: format!("backend event: {name}"),
                });
            }

            InboundMessage::Summary => {
                if self.state.phase() == SessionPhase::Finishing {
                    self.state.transition(SessionPhase::IdleAfterStop);
                    self.emit(SessionEvent::RecordingStopped);
                } else {
                    debug!("summary received outside finishing phase; ignoring");
                }
            }
        }
    }

    async fn handle_capture_event(&mut self, ev: CaptureEvent) {
        match ev {
            CaptureEvent::Frame(frame) => {
                if self.state.phase() != SessionPhase::Streaming {
                    // Stale frame delivered across a pause; drop it.
                    return;
                }

                let chunk =
                    OutboundMessage::audio_chunk(&frame.pcm_bytes(), self.state.sequence());
                match self.connection.send(&chunk).await {
                    Ok(()) => self.state.advance_sequence(),
                    Err(e) => self.after_send_failure(e).await,
                }
            }

            CaptureEvent::InterruptionBegan => {
                if self.state.phase() == SessionPhase::Streaming {
                    info!("audio interruption began");
                    self.state.interrupted_by_audio = true;
                    self.state.transition(SessionPhase::Interrupted);
                    self.emit(SessionEvent::RecordInterrupted);
                } else {
                    debug!("interruption began outside streaming; ignoring");
                }
            }

            CaptureEvent::InterruptionEnded => {
                // Without a prior `InterruptionBegan` this is a no-op.
                if self.state.phase() == SessionPhase::Interrupted
                    && self.state.interrupted_by_audio
                {
                    info!("audio interruption ended; resuming");
                    self.state.interrupted_by_audio = false;

                    if !self.capture.is_active() {
                        match self.capture.start(self.config.format).await {
                            Ok(rx) => self.spawn_capture_forwarder(rx),
                            Err(e) => {
                                let err = StreamError::CaptureUnavailable(e.to_string());
                                self.fail(err.to_string()).await;
                                return;
                            }
                        }
                    }

                    // The same stream continues; sequence numbering does not
                    // reset across an OS-level pause.
                    self.state.transition(SessionPhase::Streaming);
                    self.emit(SessionEvent::RecordResumed);
                } else {
                    debug!("interruption ended without matching begin; ignoring");
                }
            }
        }
    }

    /// Announce a fresh stream and start the capture device.
    async fn begin_streaming(&mut self, resume: bool) {
        let start = OutboundMessage::SessionStart {
            sample_rate: self.config.format.sample_rate,
            bit_depth: self.config.format.bit_depth,
            channel_count: self.config.format.channel_count,
        };
        if let Err(e) = self.connection.send(&start).await {
            self.after_send_failure(e).await;
            return;
        }
        self.state.begin_stream();

        if !self.capture.is_active() {
            match self.capture.start(self.config.format).await {
                Ok(rx) => self.spawn_capture_forwarder(rx),
                Err(e) => {
                    let err = StreamError::CaptureUnavailable(e.to_string());
                    self.fail(err.to_string()).await;
                    return;
                }
            }
        }

        self.pending_start = false;
        self.state.capture_active = true;
        self.state.paused_by_network = false;
        self.state.interrupted_by_audio = false;
        self.state.transition(SessionPhase::Streaming);

        if resume {
            self.emit(SessionEvent::RecordResumed);
        } else {
            self.emit(SessionEvent::RecordStarted);
        }
    }

    fn spawn_capture_forwarder(&self, mut rx: mpsc::Receiver<CaptureEvent>) {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                if inbox.send(ActorInput::Capture(ev)).is_err() {
                    break;
                }
            }
        });
    }

    async fn after_send_failure(&mut self, err: StreamError) {
        if err.is_retryable() {
            self.enter_network_loss(err).await;
        } else {
            self.fail(err.to_string()).await;
        }
    }

    /// Pause capture, drop the dead socket, and enter (or stay in) the
    /// reconnect loop.
    async fn enter_network_loss(&mut self, err: StreamError) {
        info!("network loss: {err}");

        if matches!(
            self.state.phase(),
            SessionPhase::Streaming | SessionPhase::Interrupted
        ) {
            // No audio may be captured and discarded while disconnected.
            if self.state.phase() == SessionPhase::Streaming {
                self.emit(SessionEvent::RecordInterrupted);
            }
            if let Err(e) = self.capture.stop().await {
                warn!("failed to pause capture: {e:#}");
            }
            self.state.paused_by_network = true;
            self.state.interrupted_by_audio = false;

            // The in-flight stream dies with the socket; the next attach
            // starts a fresh one at sequence 0.
            self.state.end_stream();
        }

        self.connection.close("network loss").await;
        self.state.transition(SessionPhase::Connecting);

        if self.reconnect.is_none() {
            self.reconnect = Some(ReconnectState {
                attempts: 0,
                since: Instant::now(),
            });
        }
        self.schedule_reconnect().await;
    }

    async fn schedule_reconnect(&mut self) {
        let Some(reconnect) = &self.reconnect else {
            return;
        };

        let elapsed = reconnect.since.elapsed();
        if self.config.retry.exhausted(reconnect.attempts, elapsed) {
            let attempts = reconnect.attempts;
            self.reconnect = None;
            self.fail(format!(
                "connection lost; unable to reconnect after {attempts} attempts"
            ))
            .await;
            return;
        }

        let next_attempt = reconnect.attempts + 1;
        let delay = self.config.retry.delay_for(next_attempt);
        debug!("scheduling reconnect attempt {next_attempt} in {delay:?}");

        self.reconnect_token += 1;
        let token = self.reconnect_token;
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(ActorInput::ReconnectDue { token });
        });
    }

    async fn handle_reconnect_due(&mut self, token: u64) {
        if token != self.reconnect_token {
            return; // stale timer from an abandoned loop
        }
        let Some(reconnect) = &mut self.reconnect else {
            return;
        };

        reconnect.attempts += 1;
        let attempt = reconnect.attempts;
        self.state.retry_attempts = attempt;

        info!("reconnect attempt {attempt}");
        self.emit(SessionEvent::ReconnectAttempt { attempt });

        // Every attempt re-runs the full authorize/attach handshake.
        self.open_connection().await;
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Terminal failure: reported exactly once, no recovery.
    async fn fail(&mut self, message: String) {
        if self.state.phase().is_terminal() {
            return;
        }

        error!("session failed: {message}");

        if let Err(e) = self.capture.stop().await {
            warn!("failed to stop capture: {e:#}");
        }
        self.state.capture_active = false;
        self.reconnect = None;
        self.reconnect_token += 1;

        self.connection.close("fatal error").await;
        self.state.transition(SessionPhase::Error);
        self.emit(SessionEvent::Error { message });
    }
}
