//! External collaborator interfaces
//!
//! The session engine depends on a credential provider and a consultation
//! record service; both are supplied by the embedding application.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a consultation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Idle,
    Finished,
}

/// One consultation record, as held by the record service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: String,
    pub patient_id: String,
    pub status: ConsultationStatus,
    pub updated_at: DateTime<Utc>,
}

/// Supplies a short-lived bearer token on demand.
///
/// Called once at the start of each authorize step, including every
/// reconnect attempt.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn valid_auth_header(&self) -> Result<String>;
}

/// Creates and updates consultation records.
#[async_trait::async_trait]
pub trait ConsultationService: Send + Sync {
    /// Create a consultation for a patient. Called at session init when no
    /// consultation id exists yet.
    async fn initiate(&self, patient_id: &str) -> Result<Consultation>;

    /// Update a consultation's lifecycle status. Called at every
    /// connection close.
    async fn update(&self, consultation_id: &str, status: ConsultationStatus)
        -> Result<Consultation>;
}
