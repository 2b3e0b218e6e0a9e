use serde::{Deserialize, Serialize};

/// Engine tuning knobs shared by the compositor, stage manager, and session
/// controller. Arrives from the host application's settings store as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed height of one GPU texture chunk, in source rows.
    #[serde(alias = "maxChunkHeight")]
    pub max_chunk_height: u32,
    /// Logical on-screen width of the live preview strip.
    #[serde(alias = "previewWidth")]
    pub preview_width: u32,
    /// Distance from the preview's top/bottom edge at which hover starts
    /// auto-scrolling, in displayed pixels.
    #[serde(alias = "edgeScrollThreshold")]
    pub edge_scroll_threshold: f64,
    /// Auto-scroll speed in displayed pixels per tick.
    #[serde(alias = "edgeScrollSpeed")]
    pub edge_scroll_speed: f64,
    /// Edge-to-edge distance below which two screens count as adjacent.
    #[serde(alias = "adjacencyTolerance")]
    pub adjacency_tolerance: f64,
    /// Decode pool size. `None` sizes it from hardware concurrency (1–4).
    #[serde(alias = "decodeWorkers")]
    pub decode_workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chunk_height: 4096,
            preview_width: 216,
            edge_scroll_threshold: 30.0,
            edge_scroll_speed: 8.0,
            adjacency_tolerance: 2.0,
            decode_workers: None,
        }
    }
}
