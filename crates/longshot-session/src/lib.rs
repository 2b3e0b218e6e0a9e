//! Capture session orchestration: lifecycle against the external capture
//! service, the frame pump feeding reconciler and compositor, and the
//! passthrough-rect plumbing through the stage region manager.

pub mod controller;
pub mod service;

pub use controller::{Phase, SessionController, SessionStats};
pub use service::{CaptureEvent, CaptureService};
