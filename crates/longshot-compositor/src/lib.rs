//! Chunked GPU compositor for the long-screenshot live preview.
//!
//! Target texture dimensions are hardware-bounded; an unbounded-height
//! composite therefore tiles into fixed-height chunks, each backed by one GPU
//! texture, and incremental frames upload only the rows they changed.

pub mod gpu;
pub mod layout;
pub mod viewport;

use thiserror::Error;

pub use gpu::{ChunkCompositor, GpuContext, PREVIEW_FORMAT};
pub use layout::{ChunkLayout, ChunkSlot, MAX_CHUNK_HEIGHT};
pub use viewport::{HoverMapper, ScrollHint, ViewportMapping};

// ── CompositorError ───────────────────────────────────────────────────────────

/// GPU-side failures. `GpuUnavailable` is non-fatal to the capture session:
/// the host disables the live preview and the state machine keeps running.
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("No compatible GPU adapter found")]
    GpuUnavailable,

    #[error("Failed to initialize GPU device: {0}")]
    Init(String),
}
