use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::capture::{AudioFrame, CaptureDevice, CaptureEvent, CaptureFormat};

/// Capture device that generates silent frames on a timer.
///
/// Stands in for a real microphone in the demo binary and in tests. The
/// paired [`InterruptionHandle`] injects host-audio interruption signals into
/// the running stream.
pub struct SyntheticCapture {
    frame_duration: Duration,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    injector: Arc<tokio::sync::Mutex<Option<mpsc::Sender<CaptureEvent>>>>,
}

/// Injects interruption signals into a running [`SyntheticCapture`] stream.
#[derive(Clone)]
pub struct InterruptionHandle {
    injector: Arc<tokio::sync::Mutex<Option<mpsc::Sender<CaptureEvent>>>>,
}

impl InterruptionHandle {
    pub async fn begin_interruption(&self) {
        self.send(CaptureEvent::InterruptionBegan).await;
    }

    pub async fn end_interruption(&self) {
        self.send(CaptureEvent::InterruptionEnded).await;
    }

    async fn send(&self, event: CaptureEvent) {
        let guard = self.injector.lock().await;
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event).await;
        }
    }
}

impl SyntheticCapture {
    /// Create a device producing one frame per `frame_duration`.
    pub fn new(frame_duration: Duration) -> Self {
        Self {
            frame_duration,
            active: Arc::new(AtomicBool::new(false)),
            task: None,
            injector: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn interruption_handle(&self) -> InterruptionHandle {
        InterruptionHandle {
            injector: Arc::clone(&self.injector),
        }
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait::async_trait]
impl CaptureDevice for SyntheticCapture {
    async fn start(&mut self, format: CaptureFormat) -> Result<mpsc::Receiver<CaptureEvent>> {
        if self.active.load(Ordering::SeqCst) {
            anyhow::bail!("capture already active");
        }

        let (tx, rx) = mpsc::channel(32);
        *self.injector.lock().await = Some(tx.clone());
        self.active.store(true, Ordering::SeqCst);

        let samples_per_frame = (format.sample_rate as u64
            * format.channel_count as u64
            * self.frame_duration.as_millis() as u64
            / 1000) as usize;
        let frame_ms = self.frame_duration.as_millis() as u64;
        let active = Arc::clone(&self.active);
        let period = self.frame_duration;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut elapsed_ms = 0u64;

            loop {
                interval.tick().await;
                if !active.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: vec![0i16; samples_per_frame],
                    timestamp_ms: elapsed_ms,
                };
                elapsed_ms += frame_ms;

                if tx.send(CaptureEvent::Frame(frame)).await.is_err() {
                    break;
                }
            }

            debug!("synthetic capture task stopped");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        *self.injector.lock().await = None;

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
