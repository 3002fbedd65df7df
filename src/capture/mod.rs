//! Microphone capture
//!
//! `AudioCaptureSession` owns the input device for one recording at a time:
//! - probes platform support and picks an encoding
//! - buffers audio in 100ms chunks, conformed to the recognizer's format
//! - enforces the duration cap even if nobody calls `stop()`
//! - rejects oversized and near-silent recordings
//! - always releases the device on stop, cancel or failure

mod config;
mod result;
mod session;

pub use config::CaptureConfig;
pub use result::CaptureResult;
pub use session::{AudioCaptureSession, CaptureStatus};
