//! Stage region manager — the session's snapshot of physical monitor
//! geometry.
//!
//! UI elements (preview panels, toolbars) must stay visible on whatever
//! monitor they are dragged to, while a selection rectangle must be allowed to
//! straddle two adjacent monitors that form one continuous desktop. Adjacency
//! is detected from edge contact: region interiors never overlap, and a
//! neighbour's opposite edge within a small tolerance means the desktop
//! continues past that edge.

use longshot_core::{Edge, Point, Rect, ScreenRegion};
use tracing::debug;

/// Edge-to-edge distance below which two screens count as adjacent.
pub const ADJACENCY_TOLERANCE: f64 = 2.0;

// ── ConstrainBehavior ─────────────────────────────────────────────────────────

/// How [`StageRegionManager::constrain_rect`] resolves an offending edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstrainBehavior {
    /// Translate the rect back inside, preserving its size (dragged panels).
    Move,
    /// Shrink the offending dimension (resized selections).
    Resize,
}

// ── StageRegionManager ────────────────────────────────────────────────────────

/// Immutable per-session set of monitor rectangles plus derived union bounds.
/// Replaced wholesale if monitor topology changes. Never fails: an empty
/// region set degrades to passing rectangles through unchanged.
#[derive(Debug, Clone)]
pub struct StageRegionManager {
    regions: Vec<ScreenRegion>,
    bounds: Rect,
    tolerance: f64,
}

impl StageRegionManager {
    pub fn new(regions: Vec<ScreenRegion>) -> Self {
        Self::with_tolerance(regions, ADJACENCY_TOLERANCE)
    }

    pub fn with_tolerance(regions: Vec<ScreenRegion>, tolerance: f64) -> Self {
        let bounds = regions
            .iter()
            .map(|r| r.logical)
            .reduce(|acc, r| acc.union(&r))
            .unwrap_or_default();
        debug!("Stage: {} region(s), union bounds {}", regions.len(), bounds);
        Self { regions, bounds, tolerance }
    }

    pub fn regions(&self) -> &[ScreenRegion] {
        &self.regions
    }

    /// Union bounding rectangle of every region's logical rect.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// True if the point falls inside any region.
    pub fn is_point_in_bounds(&self, x: f64, y: f64) -> bool {
        let p = Point::new(x, y);
        self.regions.iter().any(|r| r.logical.contains(p))
    }

    /// True if another region's opposite edge lies within the adjacency
    /// tolerance of `region`'s `edge` and their perpendicular extents overlap.
    pub fn has_adjacent_screen(&self, region: &ScreenRegion, edge: Edge) -> bool {
        let r = region.logical;
        self.regions
            .iter()
            .filter(|other| other.logical != r)
            .any(|other| {
                let o = other.logical;
                let (edge_gap, overlaps) = match edge {
                    Edge::Left => ((o.right() - r.x).abs(), Self::spans_overlap(o.y, o.bottom(), r.y, r.bottom())),
                    Edge::Right => ((o.x - r.right()).abs(), Self::spans_overlap(o.y, o.bottom(), r.y, r.bottom())),
                    Edge::Top => ((o.bottom() - r.y).abs(), Self::spans_overlap(o.x, o.right(), r.x, r.right())),
                    Edge::Bottom => ((o.y - r.bottom()).abs(), Self::spans_overlap(o.x, o.right(), r.x, r.right())),
                };
                edge_gap <= self.tolerance && overlaps
            })
    }

    fn spans_overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> bool {
        a0 < b1 && b0 < a1
    }

    /// Region containing the point, else nearest region center by Euclidean
    /// distance (ties resolved by array order).
    pub fn nearest_screen(&self, x: f64, y: f64) -> Option<&ScreenRegion> {
        let p = Point::new(x, y);
        if let Some(hit) = self.regions.iter().find(|r| r.logical.contains(p)) {
            return Some(hit);
        }
        self.regions.iter().min_by(|a, b| {
            let da = a.logical.center().distance_to(p);
            let db = b.logical.center().distance_to(p);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    // ── Constraining ──────────────────────────────────────────────────────────

    /// Keep `rect` visible: clamp each edge that pokes past the nearest
    /// screen with no adjacent screen beyond it, then backstop against the
    /// union bounds. Rects legitimately straddling adjacent monitors are
    /// left alone on the shared edge.
    pub fn constrain_rect(&self, rect: Rect, behavior: ConstrainBehavior) -> Rect {
        let Some(nearest) = self.nearest_screen(rect.center().x, rect.center().y).copied() else {
            return rect;
        };

        let mut out = rect;
        let screen = nearest.logical;

        for edge in Edge::ALL {
            let offending = match edge {
                Edge::Left => out.x < screen.x,
                Edge::Right => out.right() > screen.right(),
                Edge::Top => out.y < screen.y,
                Edge::Bottom => out.bottom() > screen.bottom(),
            };
            if !offending || self.has_adjacent_screen(&nearest, edge) {
                continue;
            }
            // Only clamp once the far corners are confirmed to hang outside
            // every region; a rect reaching into a diagonal neighbour stays.
            if self.corners_inside_any(&out, edge) {
                continue;
            }
            out = Self::clamp_edge(out, edge, screen, behavior);
        }

        out = self.backstop(out, behavior);
        out.width = out.width.max(0.0);
        out.height = out.height.max(0.0);
        out
    }

    /// True if either far corner on `edge`'s side falls inside some region.
    fn corners_inside_any(&self, rect: &Rect, edge: Edge) -> bool {
        let (a, b) = match edge {
            Edge::Left => (Point::new(rect.x, rect.y), Point::new(rect.x, rect.bottom())),
            Edge::Right => (Point::new(rect.right(), rect.y), Point::new(rect.right(), rect.bottom())),
            Edge::Top => (Point::new(rect.x, rect.y), Point::new(rect.right(), rect.y)),
            Edge::Bottom => (Point::new(rect.x, rect.bottom()), Point::new(rect.right(), rect.bottom())),
        };
        self.is_point_in_bounds(a.x, a.y) || self.is_point_in_bounds(b.x, b.y)
    }

    fn clamp_edge(rect: Rect, edge: Edge, screen: Rect, behavior: ConstrainBehavior) -> Rect {
        let mut out = rect;
        match (edge, behavior) {
            (Edge::Left, ConstrainBehavior::Move) => out.x = screen.x,
            (Edge::Left, ConstrainBehavior::Resize) => {
                out.width -= screen.x - out.x;
                out.x = screen.x;
            }
            (Edge::Right, ConstrainBehavior::Move) => out.x = screen.right() - out.width,
            (Edge::Right, ConstrainBehavior::Resize) => out.width = screen.right() - out.x,
            (Edge::Top, ConstrainBehavior::Move) => out.y = screen.y,
            (Edge::Top, ConstrainBehavior::Resize) => {
                out.height -= screen.y - out.y;
                out.y = screen.y;
            }
            (Edge::Bottom, ConstrainBehavior::Move) => out.y = screen.bottom() - out.height,
            (Edge::Bottom, ConstrainBehavior::Resize) => out.height = screen.bottom() - out.y,
        }
        out
    }

    /// Final clamp against the union bounding rect.
    fn backstop(&self, rect: Rect, behavior: ConstrainBehavior) -> Rect {
        if self.regions.is_empty() {
            return rect;
        }
        let mut out = rect;
        let b = self.bounds;
        match behavior {
            ConstrainBehavior::Move => {
                out.x = out.x.clamp(b.x, (b.right() - out.width).max(b.x));
                out.y = out.y.clamp(b.y, (b.bottom() - out.height).max(b.y));
            }
            ConstrainBehavior::Resize => {
                if out.x < b.x {
                    out.width -= b.x - out.x;
                    out.x = b.x;
                }
                if out.y < b.y {
                    out.height -= b.y - out.y;
                    out.y = b.y;
                }
                out.width = out.width.min(b.right() - out.x);
                out.height = out.height.min(b.bottom() - out.y);
            }
        }
        out
    }

    // ── Physical conversion ───────────────────────────────────────────────────

    /// Constrain each UI rect, then convert to physical device pixels via the
    /// owning region's scale factor. These are the input-passthrough rects
    /// handed to the capture service.
    pub fn passthrough_rects(&self, logical: &[Rect]) -> Vec<Rect> {
        logical
            .iter()
            .map(|&r| {
                let constrained = self.constrain_rect(r, ConstrainBehavior::Move);
                let center = constrained.center();
                match self.nearest_screen(center.x, center.y) {
                    Some(region) => Rect {
                        x: region.physical.x + (constrained.x - region.logical.x) * region.scale_factor,
                        y: region.physical.y + (constrained.y - region.logical.y) * region.scale_factor,
                        width: constrained.width * region.scale_factor,
                        height: constrained.height * region.scale_factor,
                    },
                    None => constrained,
                }
            })
            .collect()
    }
}
