pub mod capture;
pub mod synthetic;

pub use capture::{AudioFrame, CaptureDevice, CaptureEvent, CaptureFormat};
pub use synthetic::{InterruptionHandle, SyntheticCapture};
