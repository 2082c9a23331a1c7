use base64::Engine;
use serde::{Deserialize, Serialize};

/// Control and data messages sent to the transcription backend.
///
/// Audio payloads travel base64-encoded in a text field so the same channel
/// carries control and data messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// First handshake step: present the bearer token.
    Authorize { token: String },

    /// Second handshake step: bind this socket to a consultation context.
    AttachSession {
        consultation_id: String,
        patient_id: String,
        expert_id: String,
        practice_id: String,
    },

    /// Announce a new audio stream and its fixed format.
    SessionStart {
        sample_rate: u32,
        bit_depth: u16,
        channel_count: u16,
    },

    /// One chunk of PCM audio. `payload` is base64-encoded bytes.
    AudioChunk { payload: String, sequence: u64 },

    /// End of the current audio stream.
    SessionEnd { final_sequence_count: u64 },
}

impl OutboundMessage {
    /// Build an audio chunk from raw PCM bytes.
    pub fn audio_chunk(pcm_bytes: &[u8], sequence: u64) -> Self {
        OutboundMessage::AudioChunk {
            payload: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sequence,
        }
    }
}

/// Messages received from the transcription backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Connection/handshake progress or a server-reported failure.
    Status {
        kind: StatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A named backend event, forwarded to observers as a log line.
    Event { name: String },

    /// The final consultation summary is ready.
    Summary,
}

/// Recognized status kinds. Anything else folds into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Connected,
    Authenticated,
    Attached,
    Error,
    #[serde(other)]
    Other,
}
