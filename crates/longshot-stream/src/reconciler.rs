//! Frame reconciler — maintains the single growing accumulation buffer that
//! represents the full composite captured so far.
//!
//! Frames are applied strictly in arrival order; the wire format carries no
//! sequence number, so transport-level ordering is assumed (known limitation).
//! A rejected frame leaves the buffer untouched and is dropped by the caller.

use bytes::Bytes;
use longshot_core::{DecodedBitmap, ReconcileError};
use tracing::{debug, trace};

use crate::frame::{FrameHeader, FrameType};

// ── AccumulationBuffer ────────────────────────────────────────────────────────

/// Row-major RGBA composite. Exclusively owned here; grown or shifted in
/// place, never aliased externally (readers get `&[u8]`).
#[derive(Debug)]
struct AccumulationBuffer {
    width: u32,
    total_height: u32,
    data: Vec<u8>,
}

impl AccumulationBuffer {
    fn row_bytes(&self) -> usize {
        self.width as usize * 4
    }

    /// Grow-only: allocation is extended (zero-filled) when a frame reports a
    /// larger total height, never shrunk mid-session.
    fn grow_to(&mut self, total_height: u32) {
        if total_height > self.total_height {
            self.total_height = total_height;
            self.data.resize(total_height as usize * self.row_bytes(), 0);
        }
    }
}

// ── TailFrame ─────────────────────────────────────────────────────────────────

/// Pending realtime tail. Bypasses accumulation entirely; held uncommitted
/// so the host can render the live bottom edge, cleared by a zero-size tail.
#[derive(Debug, Clone)]
pub struct TailFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What a successfully applied frame changed, so the compositor can upload
/// O(delta rows) instead of the whole composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Buffer replaced or shifted wholesale (baseline resync, insert-at-top);
    /// every chunk must re-upload.
    Rebuilt { width: u32, total_height: u32 },
    /// Rows `[start_row, start_row + rows)` overwritten in place.
    Appended { start_row: u32, rows: u32, total_height: u32 },
    /// Pending tail replaced; accumulation untouched.
    TailUpdated,
    /// Pending tail cleared; accumulation untouched.
    TailCleared,
}

// ── Reconciler ────────────────────────────────────────────────────────────────

/// Stream ingest state: one accumulation buffer plus one pending tail slot.
/// Created on the first frame of a session, destroyed on reset/teardown.
#[derive(Debug, Default)]
pub struct Reconciler {
    buffer: Option<AccumulationBuffer>,
    pending_tail: Option<TailFrame>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one parsed frame. Writes never touch rows outside
    /// `[start_row, start_row + send_height)`.
    pub fn apply(&mut self, header: &FrameHeader, payload: &Bytes) -> Result<Outcome, ReconcileError> {
        match header.frame_type {
            FrameType::RealtimeTail => Ok(self.apply_tail(header, payload)),
            FrameType::InsertTopPreview => self.apply_insert_top(header, payload),
            FrameType::AppendPreview => {
                if header.width == 0 || header.send_height == 0 {
                    return Err(ReconcileError::ZeroSizeFrame);
                }
                if header.start_row == 0 {
                    Ok(self.apply_baseline(header, payload))
                } else {
                    self.apply_append(header, payload)
                }
            }
        }
    }

    fn apply_tail(&mut self, header: &FrameHeader, payload: &Bytes) -> Outcome {
        if header.is_tail_clear() {
            self.pending_tail = None;
            trace!("Pending tail cleared");
            return Outcome::TailCleared;
        }
        self.pending_tail = Some(TailFrame {
            width: header.width,
            height: header.send_height,
            data: payload.clone(),
        });
        Outcome::TailUpdated
    }

    /// Append with `start_row == 0`: the payload becomes the new baseline.
    /// This is the full-resync path and the only legal width change.
    fn apply_baseline(&mut self, header: &FrameHeader, payload: &Bytes) -> Outcome {
        let total_height = header.total_height.max(header.send_height);
        let row_bytes = header.width as usize * 4;
        let mut data = vec![0u8; total_height as usize * row_bytes];
        data[..payload.len()].copy_from_slice(payload);

        debug!(
            "Baseline replace: {}×{} ({} rows sent)",
            header.width, total_height, header.send_height
        );
        self.buffer = Some(AccumulationBuffer { width: header.width, total_height, data });
        Outcome::Rebuilt { width: header.width, total_height }
    }

    /// Newly captured content that logically precedes what was already
    /// captured (scrolled upward): payload lands at row 0, previous content
    /// shifts down by `send_height` rows.
    fn apply_insert_top(&mut self, header: &FrameHeader, payload: &Bytes) -> Result<Outcome, ReconcileError> {
        if header.width == 0 || header.send_height == 0 {
            return Err(ReconcileError::ZeroSizeFrame);
        }

        let Some(prev) = self.buffer.take() else {
            // Nothing captured yet — inserting above emptiness is a baseline.
            return Ok(self.apply_baseline(header, payload));
        };
        if prev.width != header.width {
            self.buffer = Some(prev);
            return Err(ReconcileError::WidthChanged { current: self.width(), incoming: header.width });
        }

        let row_bytes = prev.row_bytes();
        let total_height = header.total_height.max(prev.total_height + header.send_height);
        let mut data = vec![0u8; total_height as usize * row_bytes];

        let inserted = header.send_height as usize * row_bytes;
        data[..payload.len()].copy_from_slice(payload);
        data[inserted..inserted + prev.data.len()].copy_from_slice(&prev.data);

        debug!(
            "Insert-at-top: {} rows inserted, composite now {}×{}",
            header.send_height, header.width, total_height
        );
        self.buffer = Some(AccumulationBuffer { width: header.width, total_height, data });
        Ok(Outcome::Rebuilt { width: header.width, total_height })
    }

    /// Mid-stream append: grow the allocation if the reported total height
    /// exceeds it, then overwrite the covered row range in place.
    fn apply_append(&mut self, header: &FrameHeader, payload: &Bytes) -> Result<Outcome, ReconcileError> {
        let end_row = header.start_row + header.send_height;
        if end_row > header.total_height {
            return Err(ReconcileError::RowsOutOfRange {
                start_row: header.start_row,
                end_row,
                total_height: header.total_height,
            });
        }

        // First frame of a session may arrive mid-stream; start from a
        // zero-filled composite and let grow_to size it.
        let buffer = self.buffer.get_or_insert_with(|| AccumulationBuffer {
            width: header.width,
            total_height: 0,
            data: Vec::new(),
        });
        if buffer.width != header.width {
            return Err(ReconcileError::WidthChanged {
                current: buffer.width,
                incoming: header.width,
            });
        }

        buffer.grow_to(header.total_height);

        let row_bytes = buffer.row_bytes();
        let start = header.start_row as usize * row_bytes;
        buffer.data[start..start + payload.len()].copy_from_slice(payload);

        Ok(Outcome::Appended {
            start_row: header.start_row,
            rows: header.send_height,
            total_height: buffer.total_height,
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn width(&self) -> u32 {
        self.buffer.as_ref().map_or(0, |b| b.width)
    }

    pub fn total_height(&self) -> u32 {
        self.buffer.as_ref().map_or(0, |b| b.total_height)
    }

    pub fn has_content(&self) -> bool {
        self.buffer.is_some()
    }

    /// Row-major RGBA bytes of the composite so far (empty before the first frame).
    pub fn data(&self) -> &[u8] {
        self.buffer.as_ref().map_or(&[], |b| &b.data)
    }

    pub fn pending_tail(&self) -> Option<&TailFrame> {
        self.pending_tail.as_ref()
    }

    /// Snapshot of the finished composite, handed to the capture service for
    /// save-to-file or copy-to-clipboard.
    pub fn composite_bitmap(&self) -> Option<DecodedBitmap> {
        self.buffer.as_ref().map(|b| DecodedBitmap {
            data: Bytes::copy_from_slice(&b.data),
            width: b.width,
            height: b.total_height,
        })
    }

    /// Drop buffer and tail. Called on session end/cancel/teardown.
    pub fn reset(&mut self) {
        self.buffer = None;
        self.pending_tail = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameType;

    fn append(width: u32, total_height: u32, start_row: u32, send_height: u32) -> FrameHeader {
        FrameHeader { frame_type: FrameType::AppendPreview, width, total_height, start_row, send_height }
    }

    fn rows(width: u32, count: u32, fill: u8) -> Bytes {
        Bytes::from(vec![fill; width as usize * count as usize * 4])
    }

    /// Payload whose every row carries its absolute row index, so stitching
    /// mistakes show up as value mismatches.
    fn indexed_rows(width: u32, start_row: u32, count: u32) -> Bytes {
        let mut data = Vec::with_capacity(width as usize * count as usize * 4);
        for row in start_row..start_row + count {
            data.extend(std::iter::repeat(row as u8).take(width as usize * 4));
        }
        Bytes::from(data)
    }

    #[test]
    fn baseline_then_append_covers_full_height() {
        let mut r = Reconciler::new();

        let out = r.apply(&append(8, 500, 0, 500), &indexed_rows(8, 0, 500)).unwrap();
        assert_eq!(out, Outcome::Rebuilt { width: 8, total_height: 500 });

        let out = r.apply(&append(8, 1000, 500, 500), &indexed_rows(8, 500, 500)).unwrap();
        assert_eq!(out, Outcome::Appended { start_row: 500, rows: 500, total_height: 1000 });

        assert_eq!(r.total_height(), 1000);
        let expected = indexed_rows(8, 0, 1000);
        assert_eq!(r.data(), &expected[..]);
    }

    #[test]
    fn identical_append_is_idempotent() {
        let mut r = Reconciler::new();
        r.apply(&append(4, 100, 0, 100), &indexed_rows(4, 0, 100)).unwrap();

        let frame = append(4, 100, 30, 20);
        let payload = rows(4, 20, 0xCD);
        r.apply(&frame, &payload).unwrap();
        let first: Vec<u8> = r.data().to_vec();

        r.apply(&frame, &payload).unwrap();
        assert_eq!(r.data(), &first[..]);
    }

    #[test]
    fn arbitrary_chunking_equals_single_write() {
        let full = indexed_rows(6, 0, 240);

        let mut chunked = Reconciler::new();
        chunked.apply(&append(6, 240, 0, 7), &indexed_rows(6, 0, 7)).unwrap();
        let mut row = 7;
        for step in [1u32, 64, 13, 100, 55] {
            chunked
                .apply(&append(6, 240, row, step), &indexed_rows(6, row, step))
                .unwrap();
            row += step;
        }
        assert_eq!(row, 240);

        let mut direct = Reconciler::new();
        direct.apply(&append(6, 240, 0, 240), &full).unwrap();

        assert_eq!(chunked.data(), direct.data());
    }

    #[test]
    fn insert_top_shifts_existing_rows() {
        let mut r = Reconciler::new();
        r.apply(&append(4, 100, 0, 100), &indexed_rows(4, 0, 100)).unwrap();

        let inserted = rows(4, 40, 0xEE);
        let header = FrameHeader {
            frame_type: FrameType::InsertTopPreview,
            width: 4,
            total_height: 140,
            start_row: 0,
            send_height: 40,
        };
        let out = r.apply(&header, &inserted).unwrap();
        assert_eq!(out, Outcome::Rebuilt { width: 4, total_height: 140 });

        let row_bytes = 16;
        assert_eq!(&r.data()[..40 * row_bytes], &inserted[..]);
        let original = indexed_rows(4, 0, 100);
        assert_eq!(&r.data()[40 * row_bytes..], &original[..]);
    }

    #[test]
    fn baseline_replace_resyncs_dimensions() {
        let mut r = Reconciler::new();
        r.apply(&append(4, 300, 0, 300), &rows(4, 300, 1)).unwrap();

        // Full resync at a new width replaces the buffer outright.
        let out = r.apply(&append(8, 120, 0, 120), &rows(8, 120, 2)).unwrap();
        assert_eq!(out, Outcome::Rebuilt { width: 8, total_height: 120 });
        assert_eq!(r.width(), 8);
        assert_eq!(r.total_height(), 120);
        assert_eq!(r.data(), &rows(8, 120, 2)[..]);
    }

    #[test]
    fn append_outside_total_height_is_rejected() {
        let mut r = Reconciler::new();
        r.apply(&append(4, 100, 0, 100), &rows(4, 100, 1)).unwrap();

        let before: Vec<u8> = r.data().to_vec();
        let err = r.apply(&append(4, 100, 90, 20), &rows(4, 20, 2)).unwrap_err();
        assert!(matches!(err, ReconcileError::RowsOutOfRange { end_row: 110, .. }));
        assert_eq!(r.data(), &before[..], "rejected frame must not touch the buffer");
    }

    #[test]
    fn mid_stream_width_change_is_rejected() {
        let mut r = Reconciler::new();
        r.apply(&append(4, 100, 0, 100), &rows(4, 100, 1)).unwrap();

        let err = r.apply(&append(6, 200, 100, 50), &rows(6, 50, 2)).unwrap_err();
        assert!(matches!(err, ReconcileError::WidthChanged { current: 4, incoming: 6 }));
    }

    #[test]
    fn tail_frames_bypass_accumulation() {
        let mut r = Reconciler::new();
        r.apply(&append(4, 100, 0, 100), &rows(4, 100, 1)).unwrap();
        let committed: Vec<u8> = r.data().to_vec();

        let tail = FrameHeader {
            frame_type: FrameType::RealtimeTail,
            width: 4,
            total_height: 0,
            start_row: 0,
            send_height: 10,
        };
        let out = r.apply(&tail, &rows(4, 10, 0x99)).unwrap();
        assert_eq!(out, Outcome::TailUpdated);
        assert_eq!(r.pending_tail().unwrap().height, 10);
        assert_eq!(r.data(), &committed[..]);

        let clear = FrameHeader { width: 0, send_height: 0, ..tail };
        let out = r.apply(&clear, &Bytes::new()).unwrap();
        assert_eq!(out, Outcome::TailCleared);
        assert!(r.pending_tail().is_none());
    }

    #[test]
    fn reset_drops_everything() {
        let mut r = Reconciler::new();
        r.apply(&append(4, 100, 0, 100), &rows(4, 100, 1)).unwrap();
        r.reset();
        assert!(!r.has_content());
        assert_eq!(r.total_height(), 0);
        assert!(r.data().is_empty());
    }
}
