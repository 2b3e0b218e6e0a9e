//! Contract with the external native capture service.
//!
//! The service is the sole producer of the frame stream: it grabs pixels,
//! emits wire messages (see `longshot-stream::frame`), and performs all file/
//! clipboard I/O on our behalf. Frames and progress notifications arrive over
//! tokio channels handed to [`crate::SessionController::run`] at session
//! start; this trait carries only the command surface.

use async_trait::async_trait;
use longshot_core::{DecodedBitmap, Rect, SessionError};

// ── CaptureService ────────────────────────────────────────────────────────────

/// Command interface of the external capture service.
#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Begin streaming frames for the long-screenshot session.
    async fn start_capture(&self) -> Result<(), SessionError>;

    /// Request the stream to stop. Cooperative: a few in-flight frames may
    /// still arrive afterwards and must be absorbed by the session pump.
    async fn stop_capture(&self) -> Result<(), SessionError>;

    /// Discard service-side capture state for a fresh start.
    async fn reset_capture(&self) -> Result<(), SessionError>;

    /// Toggle service-driven auto-scrolling of the captured window.
    async fn set_auto_scroll(&self, enabled: bool) -> Result<(), SessionError>;

    /// Physical-pixel regions where the capture overlay must not intercept
    /// pointer input (toolbars, preview panels).
    async fn set_passthrough_rects(&self, rects: Vec<Rect>) -> Result<(), SessionError>;

    /// Hand the finished composite over for save-to-file.
    async fn save_composite(&self, composite: DecodedBitmap) -> Result<(), SessionError>;

    /// Hand the finished composite over for copy-to-clipboard.
    async fn copy_composite(&self, composite: DecodedBitmap) -> Result<(), SessionError>;
}

// ── CaptureEvent ──────────────────────────────────────────────────────────────

/// Notifications emitted by the capture service alongside the frame stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Frame-count progress, shown in the capture HUD.
    Progress { frame_count: u32 },
    /// The service confirmed the stream stopped.
    Stopped,
}
