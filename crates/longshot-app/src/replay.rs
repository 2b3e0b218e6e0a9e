//! Replays a recorded capture stream (raw concatenated wire messages — the
//! header makes each message self-delimiting) through the parser and
//! reconciler, reporting what a live session would have assembled.

use anyhow::{bail, Result};
use bytes::Bytes;
use longshot_compositor::ChunkLayout;
use longshot_stream::{FrameHeader, Reconciler, HEADER_SIZE};
use tracing::{debug, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub frames: u64,
    pub dropped: u64,
    pub width: u32,
    pub total_height: u32,
    pub chunk_count: usize,
    pub pending_tail: bool,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frame(s), {} dropped → composite {}×{} in {} chunk(s){}",
            self.frames,
            self.dropped,
            self.width,
            self.total_height,
            self.chunk_count,
            if self.pending_tail { " + pending tail" } else { "" }
        )
    }
}

/// Pump every message in `stream` through a fresh reconciler.
pub fn run(stream: Bytes) -> Result<Summary> {
    let mut reconciler = Reconciler::new();
    let mut summary = Summary::default();
    let mut offset = 0usize;

    while offset < stream.len() {
        let remaining = stream.slice(offset..);
        if remaining.len() < HEADER_SIZE {
            bail!("{} trailing byte(s) after the last complete message", remaining.len());
        }

        let (header, payload) = match FrameHeader::parse(&remaining) {
            Ok(parsed) => parsed,
            Err(e) => {
                // A live session would drop and resync on the next message;
                // in a recording we cannot find the next boundary, so stop.
                bail!("Unreadable message at offset {offset}: {e}");
            }
        };

        summary.frames += 1;
        match reconciler.apply(&header, &payload) {
            Ok(outcome) => debug!(
                "#{} {:?} rows [{}..{}) → {:?}",
                summary.frames,
                header.frame_type,
                header.start_row,
                header.start_row + header.send_height,
                outcome
            ),
            Err(e) => {
                summary.dropped += 1;
                warn!("#{} dropped: {e}", summary.frames);
            }
        }

        offset += header.message_len();
    }

    summary.width = reconciler.width();
    summary.total_height = reconciler.total_height();
    summary.chunk_count = ChunkLayout::new(summary.width, summary.total_height).chunk_count();
    summary.pending_tail = reconciler.pending_tail().is_some();
    Ok(summary)
}
