//! Session controller — drives enter/start/stop/save/copy/reset against the
//! capture service and pumps the frame stream into reconciler + compositor.
//!
//! Reconciliation and GPU uploads run single-threaded inside the pump: one
//! producer (the stream) feeds one consumer (the compositor) within the same
//! turn, so no locking is needed anywhere on the frame path.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use longshot_compositor::ChunkCompositor;
use longshot_core::{DecodedBitmap, EngineConfig, Rect, SessionError};
use longshot_decoder::{DecodePool, MonitorSource};
use longshot_stage::StageRegionManager;
use longshot_stream::{FrameHeader, Outcome, Reconciler};

use crate::service::{CaptureEvent, CaptureService};

// ── Phase ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Entered: monitor geometry snapshotted, backgrounds decoded.
    Ready,
    Capturing,
    /// Stop requested; in-flight frames still drain into the buffer.
    Stopping,
    Stopped,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Ready => "Ready",
            Phase::Capturing => "Capturing",
            Phase::Stopping => "Stopping…",
            Phase::Stopped => "Stopped",
        }
    }
}

// ── SessionStats ──────────────────────────────────────────────────────────────

/// Per-session frame counters, reset between sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_applied: u64,
    pub frames_dropped: u64,
    pub bytes_received: u64,
}

impl SessionStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received={} applied={} dropped={} bytes={}",
            self.frames_received, self.frames_applied, self.frames_dropped, self.bytes_received
        )
    }
}

// ── SessionController ─────────────────────────────────────────────────────────

/// One capture session's owned state: decode pool, reconciler, optional
/// compositor, and the stage geometry snapshot. Everything is created and
/// destroyed with the session; no module-scope caches survive it.
pub struct SessionController {
    service: Arc<dyn CaptureService>,
    stage: StageRegionManager,
    pool: DecodePool,
    reconciler: Reconciler,
    compositor: Option<ChunkCompositor>,
    stats: SessionStats,
    phase: Phase,
    auto_scroll: bool,
}

impl SessionController {
    pub fn new(service: Arc<dyn CaptureService>, stage: StageRegionManager, config: &EngineConfig) -> Self {
        Self {
            service,
            stage,
            pool: DecodePool::new(config.decode_workers),
            reconciler: Reconciler::new(),
            compositor: None,
            stats: SessionStats::default(),
            phase: Phase::Idle,
            auto_scroll: false,
        }
    }

    /// Attach the GPU compositor. Skipped when the adapter probe failed;
    /// the live preview stays dark but capture keeps working.
    pub fn attach_compositor(&mut self, compositor: ChunkCompositor) {
        self.compositor = Some(compositor);
    }

    pub fn preview_enabled(&self) -> bool {
        self.compositor.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn stage(&self) -> &StageRegionManager {
        &self.stage
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Enter the session: decode every monitor's static background through
    /// the pool and push the UI passthrough rects (in physical pixels) to the
    /// capture service. Returns the decoded backgrounds in monitor order.
    pub async fn enter(
        &mut self,
        monitors: &[MonitorSource],
        ui_rects: &[Rect],
    ) -> Result<Vec<DecodedBitmap>, SessionError> {
        info!(
            "Entering capture session: {} monitor(s), {} worker(s)",
            monitors.len(),
            self.pool.size()
        );
        let backgrounds = self.pool.decode_all(monitors).await?;

        let passthrough = self.stage.passthrough_rects(ui_rects);
        self.service.set_passthrough_rects(passthrough).await?;

        self.phase = Phase::Ready;
        Ok(backgrounds)
    }

    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.service.start_capture().await?;
        self.stats.reset();
        self.phase = Phase::Capturing;
        info!("Capture started");
        Ok(())
    }

    /// Request a stop. Cooperative: frames already in flight keep landing
    /// in the buffer until the service confirms.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        self.service.stop_capture().await?;
        self.phase = Phase::Stopping;
        Ok(())
    }

    pub async fn set_auto_scroll(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.service.set_auto_scroll(enabled).await?;
        self.auto_scroll = enabled;
        Ok(())
    }

    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    pub async fn save(&self) -> Result<(), SessionError> {
        let composite = self.reconciler.composite_bitmap().ok_or(SessionError::NoComposite)?;
        self.service.save_composite(composite).await
    }

    pub async fn copy(&self) -> Result<(), SessionError> {
        let composite = self.reconciler.composite_bitmap().ok_or(SessionError::NoComposite)?;
        self.service.copy_composite(composite).await
    }

    /// Reset for another go. The service is asked first; buffers are only
    /// cleared once it succeeds, so a failed reset stays retriable.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.service.reset_capture().await?;
        self.clear_buffers();
        self.phase = Phase::Ready;
        info!("Session reset");
        Ok(())
    }

    /// Destroy all session resources: accumulation buffer, GPU chunks, and
    /// the decode pool (workers joined). Called on cancel or host teardown.
    pub fn teardown(&mut self) {
        info!("Session teardown: {}", self.stats);
        self.clear_buffers();
        self.pool.close();
        self.phase = Phase::Idle;
    }

    fn clear_buffers(&mut self) {
        self.reconciler.reset();
        if let Some(compositor) = self.compositor.as_mut() {
            compositor.destroy();
        }
        self.stats.reset();
    }

    // ── Frame pump ────────────────────────────────────────────────────────────

    /// Drive the session until the frame stream closes. Frames and service
    /// events are both consumed here, strictly in arrival order.
    pub async fn run(
        &mut self,
        frame_rx: &mut mpsc::Receiver<Bytes>,
        event_rx: &mut mpsc::Receiver<CaptureEvent>,
    ) {
        debug!("Session pump running");
        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    self.handle_message(&frame);
                }

                Some(event) = event_rx.recv() => {
                    self.handle_event(event);
                }
            }
        }
        info!("Session pump exited ({})", self.stats);
    }

    /// Ingest one wire message. Malformed or rejected frames are dropped and
    /// counted; transient stream noise is not user-visible.
    pub fn handle_message(&mut self, message: &Bytes) {
        self.stats.frames_received += 1;
        self.stats.bytes_received += message.len() as u64;

        let (header, payload) = match FrameHeader::parse(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.frames_dropped += 1;
                debug!("Dropping malformed frame: {e}");
                return;
            }
        };

        match self.reconciler.apply(&header, &payload) {
            Ok(outcome) => {
                self.stats.frames_applied += 1;
                self.update_preview(outcome);
            }
            Err(e) => {
                self.stats.frames_dropped += 1;
                warn!("Dropping frame ({:?}): {e}", header.frame_type);
            }
        }
    }

    pub fn handle_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Progress { frame_count } => {
                debug!("Capture progress: {frame_count} frame(s)");
            }
            CaptureEvent::Stopped => {
                // Late frames may still drain after this.
                info!("Capture service confirmed stop ({})", self.stats);
                self.phase = Phase::Stopped;
            }
        }
    }

    fn update_preview(&mut self, outcome: Outcome) {
        let Some(compositor) = self.compositor.as_mut() else { return };
        match outcome {
            Outcome::Rebuilt { width, total_height } => {
                compositor.ensure_chunks(width, total_height);
                compositor.upload(self.reconciler.data(), 0, total_height);
            }
            Outcome::Appended { start_row, rows, total_height } => {
                compositor.ensure_chunks(self.reconciler.width(), total_height);
                compositor.upload(self.reconciler.data(), start_row, rows);
            }
            // Tail frames live outside the accumulation buffer; the host
            // draws the pending tail directly.
            Outcome::TailUpdated | Outcome::TailCleared => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use longshot_core::{PixelFormat, ScreenRegion};
    use longshot_decoder::RawPixelSource;
    use longshot_stream::FrameType;

    // ── Mock service ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct MockService {
        calls: Mutex<Vec<String>>,
        passthrough: Mutex<Vec<Rect>>,
        fail_save: bool,
    }

    impl MockService {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl CaptureService for MockService {
        async fn start_capture(&self) -> Result<(), SessionError> {
            self.record("start");
            Ok(())
        }
        async fn stop_capture(&self) -> Result<(), SessionError> {
            self.record("stop");
            Ok(())
        }
        async fn reset_capture(&self) -> Result<(), SessionError> {
            self.record("reset");
            Ok(())
        }
        async fn set_auto_scroll(&self, enabled: bool) -> Result<(), SessionError> {
            self.record(if enabled { "auto_scroll on" } else { "auto_scroll off" });
            Ok(())
        }
        async fn set_passthrough_rects(&self, rects: Vec<Rect>) -> Result<(), SessionError> {
            self.record("passthrough");
            *self.passthrough.lock().unwrap() = rects;
            Ok(())
        }
        async fn save_composite(&self, _composite: DecodedBitmap) -> Result<(), SessionError> {
            if self.fail_save {
                return Err(SessionError::Service { op: "save", reason: "disk full".into() });
            }
            self.record("save");
            Ok(())
        }
        async fn copy_composite(&self, _composite: DecodedBitmap) -> Result<(), SessionError> {
            self.record("copy");
            Ok(())
        }
    }

    struct StubSource(Vec<u8>);

    impl RawPixelSource for StubSource {
        fn fetch(&self) -> Result<Vec<u8>, longshot_core::DecodeError> {
            Ok(self.0.clone())
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn dual_stage() -> StageRegionManager {
        StageRegionManager::new(vec![
            ScreenRegion::new(longshot_core::Rect::new(0.0, 0.0, 1920.0, 1080.0), 2.0),
            ScreenRegion::new(longshot_core::Rect::new(1920.0, 0.0, 1920.0, 1080.0), 1.0),
        ])
    }

    fn controller(service: Arc<MockService>) -> SessionController {
        SessionController::new(service, dual_stage(), &EngineConfig::default())
    }

    fn append_message(width: u32, total_height: u32, start_row: u32, send_height: u32) -> Bytes {
        let header = FrameHeader {
            frame_type: FrameType::AppendPreview,
            width,
            total_height,
            start_row,
            send_height,
        };
        let payload = vec![0x42u8; header.payload_len()];
        Bytes::from(header.encode(&payload))
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn enter_decodes_backgrounds_and_pushes_physical_rects() {
        let service = Arc::new(MockService::default());
        let mut ctl = controller(Arc::clone(&service));

        let monitors = vec![MonitorSource {
            source: Arc::new(StubSource(vec![0xFF; 2 * 2 * 4])),
            width: 2,
            height: 2,
            format: PixelFormat::Bgra,
        }];
        let ui = [Rect::new(100.0, 50.0, 200.0, 40.0)];

        let backgrounds = ctl.enter(&monitors, &ui).await.unwrap();
        assert_eq!(backgrounds.len(), 1);
        assert_eq!(ctl.phase(), Phase::Ready);

        // Rect on the 2× screen arrives at the service in physical pixels.
        let pushed = service.passthrough.lock().unwrap().clone();
        assert_eq!(pushed, vec![Rect::new(200.0, 100.0, 400.0, 80.0)]);
    }

    #[tokio::test]
    async fn pump_reconciles_frames_and_exits_on_close() {
        let service = Arc::new(MockService::default());
        let mut ctl = controller(Arc::clone(&service));
        ctl.start().await.unwrap();

        let (frame_tx, mut frame_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(16);

        frame_tx.send(append_message(8, 500, 0, 500)).await.unwrap();
        frame_tx.send(append_message(8, 1000, 500, 500)).await.unwrap();
        event_tx.send(CaptureEvent::Progress { frame_count: 2 }).await.unwrap();
        drop(frame_tx);
        drop(event_tx);

        ctl.run(&mut frame_rx, &mut event_rx).await;

        assert_eq!(ctl.stats().frames_received, 2);
        assert_eq!(ctl.stats().frames_applied, 2);
        assert_eq!(ctl.reconciler().total_height(), 1000);
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_not_fatal() {
        let service = Arc::new(MockService::default());
        let mut ctl = controller(service);

        ctl.handle_message(&Bytes::from_static(&[0x01, 0x02]));
        ctl.handle_message(&append_message(4, 100, 0, 100));

        assert_eq!(ctl.stats().frames_dropped, 1);
        assert_eq!(ctl.stats().frames_applied, 1);
        assert_eq!(ctl.reconciler().total_height(), 100);
    }

    #[tokio::test]
    async fn late_frames_after_stop_are_absorbed() {
        let service = Arc::new(MockService::default());
        let mut ctl = controller(Arc::clone(&service));

        ctl.start().await.unwrap();
        ctl.handle_message(&append_message(4, 200, 0, 200));
        ctl.stop().await.unwrap();
        assert_eq!(ctl.phase(), Phase::Stopping);

        // A frame still in flight when the stop request went out.
        ctl.handle_message(&append_message(4, 400, 200, 200));
        assert_eq!(ctl.reconciler().total_height(), 400);
        assert_eq!(ctl.stats().frames_applied, 2);
    }

    #[tokio::test]
    async fn save_failure_leaves_buffers_intact() {
        let service = Arc::new(MockService { fail_save: true, ..Default::default() });
        let mut ctl = controller(Arc::clone(&service));

        ctl.handle_message(&append_message(4, 100, 0, 100));
        let err = ctl.save().await.unwrap_err();
        assert!(matches!(err, SessionError::Service { op: "save", .. }));

        // Buffer survives the failed service call and stays saveable.
        assert_eq!(ctl.reconciler().total_height(), 100);
        assert!(ctl.reconciler().composite_bitmap().is_some());
    }

    #[tokio::test]
    async fn save_before_any_frame_reports_no_composite() {
        let service = Arc::new(MockService::default());
        let ctl = controller(service);
        assert!(matches!(ctl.save().await.unwrap_err(), SessionError::NoComposite));
    }

    #[tokio::test]
    async fn reset_clears_state_for_next_run() {
        let service = Arc::new(MockService::default());
        let mut ctl = controller(Arc::clone(&service));

        ctl.start().await.unwrap();
        ctl.handle_message(&append_message(4, 100, 0, 100));
        ctl.reset().await.unwrap();

        assert_eq!(ctl.phase(), Phase::Ready);
        assert_eq!(ctl.stats(), SessionStats::default());
        assert!(!ctl.reconciler().has_content());
        assert_eq!(service.calls().last().map(String::as_str), Some("reset"));
    }

    #[tokio::test]
    async fn teardown_shuts_the_pool() {
        let service = Arc::new(MockService::default());
        let mut ctl = controller(service);
        ctl.teardown();
        assert_eq!(ctl.phase(), Phase::Idle);

        let monitors = vec![MonitorSource {
            source: Arc::new(StubSource(vec![0; 4])),
            width: 1,
            height: 1,
            format: PixelFormat::Rgba,
        }];
        let err = ctl.enter(&monitors, &[]).await.unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }
}
