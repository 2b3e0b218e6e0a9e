//! Hover/viewport mapping — translates a pointer position over the scaled
//! preview strip back into source-buffer coordinates, so the host can render
//! a pixel-exact crop under the original selection overlay and auto-scroll
//! the preview when the pointer nears an edge.

use longshot_core::{EngineConfig, Rect};

// ── ScrollHint ────────────────────────────────────────────────────────────────

/// Auto-scroll signal for the preview window, in displayed pixels per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollHint {
    None,
    Up(f64),
    Down(f64),
}

// ── ViewportMapping ───────────────────────────────────────────────────────────

/// Ephemeral result of one pointer move; recomputed every event, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMapping {
    /// Pointer position in the displayed (scaled) preview.
    pub pointer_y: f64,
    /// The same position in source-buffer rows.
    pub natural_y: f64,
    /// Source-space crop rect, sized to the original selection's aspect
    /// ratio and clamped inside the composite.
    pub viewport: Rect,
    /// natural rows per displayed pixel.
    pub scale: f64,
    pub scroll: ScrollHint,
}

// ── HoverMapper ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct HoverMapper {
    edge_threshold: f64,
    scroll_speed: f64,
}

impl HoverMapper {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            edge_threshold: config.edge_scroll_threshold,
            scroll_speed: config.edge_scroll_speed,
        }
    }

    /// Map a pointer Y in the displayed preview into a source-space viewport.
    ///
    /// The viewport spans the full composite width and matches the aspect
    /// ratio of the original `selection_width × selection_height` capture
    /// rect, centered on the pointer and clamped into
    /// `[0, natural_height − viewport_height]`.
    pub fn map(
        &self,
        pointer_y: f64,
        displayed_height: f64,
        natural_width: u32,
        natural_height: u32,
        selection_width: u32,
        selection_height: u32,
    ) -> ViewportMapping {
        let natural_height = natural_height as f64;
        let scale = if displayed_height > 0.0 {
            natural_height / displayed_height
        } else {
            1.0
        };
        let natural_y = pointer_y * scale;

        let viewport_height = if selection_width > 0 {
            (natural_width as f64 * selection_height as f64 / selection_width as f64)
                .min(natural_height)
        } else {
            natural_height
        };
        let viewport_y = (natural_y - viewport_height / 2.0)
            .clamp(0.0, (natural_height - viewport_height).max(0.0));

        let scroll = if pointer_y < self.edge_threshold {
            ScrollHint::Up(self.scroll_speed)
        } else if pointer_y > displayed_height - self.edge_threshold {
            ScrollHint::Down(self.scroll_speed)
        } else {
            ScrollHint::None
        };

        ViewportMapping {
            pointer_y,
            natural_y,
            viewport: Rect::new(0.0, viewport_y, natural_width as f64, viewport_height),
            scale,
            scroll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> HoverMapper {
        HoverMapper::new(&EngineConfig::default())
    }

    #[test]
    fn pointer_maps_through_display_scale() {
        // 8000 natural rows shown at 800px → 10 rows per displayed pixel.
        let m = mapper().map(400.0, 800.0, 1080, 8000, 1080, 607);
        assert_eq!(m.scale, 10.0);
        assert_eq!(m.natural_y, 4000.0);
        // Viewport keeps the selection aspect: 1080 × 607.
        assert_eq!(m.viewport.height, 607.0);
        assert_eq!(m.viewport.width, 1080.0);
        // Centered on the pointer.
        assert_eq!(m.viewport.y, 4000.0 - 303.5);
        assert_eq!(m.scroll, ScrollHint::None);
    }

    #[test]
    fn viewport_clamps_at_both_ends() {
        let top = mapper().map(40.0, 800.0, 1080, 8000, 1080, 600);
        assert_eq!(top.viewport.y, 100.0); // 400 − 300
        let pinned = mapper().map(33.0, 800.0, 1080, 8000, 1080, 600);
        assert_eq!(pinned.viewport.y, 30.0);

        let bottom = mapper().map(799.0, 800.0, 1080, 8000, 1080, 600);
        assert_eq!(bottom.viewport.y, 8000.0 - 600.0);
    }

    #[test]
    fn edge_proximity_emits_scroll_hints() {
        let cfg = EngineConfig::default();
        let m = HoverMapper::new(&cfg);
        assert_eq!(m.map(10.0, 800.0, 100, 1000, 100, 50).scroll, ScrollHint::Up(8.0));
        assert_eq!(m.map(790.0, 800.0, 100, 1000, 100, 50).scroll, ScrollHint::Down(8.0));
        assert_eq!(m.map(400.0, 800.0, 100, 1000, 100, 50).scroll, ScrollHint::None);
    }

    #[test]
    fn short_composite_never_yields_negative_clamp() {
        // Viewport taller than the composite collapses to the full height.
        let m = mapper().map(10.0, 100.0, 1080, 300, 1080, 600);
        assert_eq!(m.viewport.height, 300.0);
        assert_eq!(m.viewport.y, 0.0);
    }
}
