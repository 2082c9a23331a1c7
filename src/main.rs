use anyhow::{Context, Result};
use clap::Parser;
use consult_stream::{
    Config, Consultation, ConsultationService, ConsultationStatus, CredentialProvider,
    SessionConfig, SessionEvent, SessionManager, SyntheticCapture, WsTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Stream a synthetic audio session to a transcription backend.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file path (without extension)
    #[arg(long, default_value = "config/consult-stream")]
    config: String,

    /// Override the streaming endpoint URL from the config file
    #[arg(long)]
    url: Option<String>,

    /// Patient to open the consultation for
    #[arg(long)]
    patient_id: String,
}

/// Reads the bearer token from CONSULT_STREAM_TOKEN on each authorize step.
struct EnvCredentials;

#[async_trait::async_trait]
impl CredentialProvider for EnvCredentials {
    async fn valid_auth_header(&self) -> Result<String> {
        std::env::var("CONSULT_STREAM_TOKEN")
            .context("CONSULT_STREAM_TOKEN is not set")
    }
}

/// Stand-in record service for manual runs against a dev backend: keeps the
/// consultation in memory instead of calling the record API.
struct LocalConsultations;

#[async_trait::async_trait]
impl ConsultationService for LocalConsultations {
    async fn initiate(&self, patient_id: &str) -> Result<Consultation> {
        Ok(Consultation {
            id: format!("consultation-{}", uuid::Uuid::new_v4()),
            patient_id: patient_id.to_string(),
            status: ConsultationStatus::Idle,
            updated_at: chrono::Utc::now(),
        })
    }

    async fn update(
        &self,
        consultation_id: &str,
        status: ConsultationStatus,
    ) -> Result<Consultation> {
        info!("consultation {} -> {:?}", consultation_id, status);
        Ok(Consultation {
            id: consultation_id.to_string(),
            patient_id: String::new(),
            status,
            updated_at: chrono::Utc::now(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v0.1.0", cfg.service.name);

    let mut session_config = SessionConfig::new(
        args.url.unwrap_or(cfg.streaming.url),
        args.patient_id,
        cfg.streaming.expert_id,
        cfg.streaming.practice_id,
    );
    session_config.format.sample_rate = cfg.audio.sample_rate;
    session_config.format.bit_depth = cfg.audio.bit_depth;
    session_config.format.channel_count = cfg.audio.channels;

    info!(
        "streaming to {} ({} Hz, {}-bit, {} ch)",
        session_config.url,
        session_config.format.sample_rate,
        session_config.format.bit_depth,
        session_config.format.channel_count,
    );

    let capture = SyntheticCapture::new(Duration::from_millis(100));
    let (manager, mut events) = SessionManager::spawn(
        session_config,
        Arc::new(WsTransport),
        Box::new(capture),
        Arc::new(EnvCredentials),
        Arc::new(LocalConsultations),
    );

    // Log session events until shutdown.
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Error { message } => warn!("session error: {message}"),
                other => info!("session event: {other:?}"),
            }
        }
    });

    manager.start_streaming().await?;
    info!("recording; press ctrl-c to finish");

    tokio::signal::ctrl_c().await?;
    info!("stopping");

    manager.stop_streaming().await?;
    manager.close_connection(true).await?;
    event_task.abort();

    Ok(())
}
