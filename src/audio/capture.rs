use anyhow::Result;
use tokio::sync::mpsc;

/// Fixed audio format for one capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bit_depth: u16,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channel_count: u16,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz, what the transcription backend expects
            bit_depth: 16,
            channel_count: 1, // Mono
        }
    }
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Little-endian PCM bytes, ready for the wire.
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Everything a capture device pushes to its consumer.
///
/// Interruption signals come from the host audio subsystem out-of-band and
/// may arrive in any session phase; an `InterruptionEnded` with no prior
/// `InterruptionBegan` must be tolerated as a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Frame(AudioFrame),
    /// The device was preempted (e.g. an incoming phone call).
    InterruptionBegan,
    /// The device is available again.
    InterruptionEnded,
}

/// Microphone capture device
///
/// Owns exactly one capture stream at a time. Host applications provide the
/// platform implementation; [`SyntheticCapture`](super::SyntheticCapture)
/// ships in-crate for tests and the demo binary.
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Start capturing audio in the given format.
    ///
    /// Returns a channel receiver that will receive frames and interruption
    /// signals.
    async fn start(&mut self, format: CaptureFormat) -> Result<mpsc::Receiver<CaptureEvent>>;

    /// Stop capturing audio. Idempotent: calling it twice, or before
    /// `start`, is a no-op.
    async fn stop(&mut self) -> Result<()>;

    /// Whether frames are currently flowing.
    fn is_active(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}
