use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

// MARK: - PixelFormat

/// Byte order of 4-byte-per-pixel raw data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Display-native order used everywhere past the decode pool.
    Rgba,
    /// Source-native order emitted by the raw per-monitor capture.
    Bgra,
}

// MARK: - DecodedBitmap

/// A displayable bitmap produced by the decode pool (always RGBA).
#[derive(Debug, Clone)]
pub struct DecodedBitmap {
    pub data: bytes::Bytes,
    pub width: u32,
    pub height: u32,
}

impl DecodedBitmap {
    pub fn row_bytes(&self) -> usize {
        self.width as usize * 4
    }
}

// MARK: - ScreenRegion

/// One physical monitor's rectangle within the unified virtual desktop.
///
/// Snapshot taken once at session start and held immutable; the whole set is
/// replaced if monitor topology changes. Region interiors never overlap;
/// edge contact between neighbours is what adjacency queries detect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenRegion {
    /// Rectangle in logical (scale-independent) coordinates.
    pub logical: Rect,
    /// Rectangle in physical device pixels.
    pub physical: Rect,
    #[serde(alias = "scaleFactor")]
    pub scale_factor: f64,
}

impl Default for ScreenRegion {
    fn default() -> Self {
        Self {
            logical: Rect::default(),
            physical: Rect::default(),
            scale_factor: 1.0,
        }
    }
}

impl ScreenRegion {
    pub fn new(logical: Rect, scale_factor: f64) -> Self {
        Self {
            logical,
            physical: logical.scaled(scale_factor),
            scale_factor,
        }
    }
}

impl std::fmt::Display for ScreenRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @{}x", self.logical, self.scale_factor)
    }
}
