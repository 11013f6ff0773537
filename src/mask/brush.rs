//! Brush and eraser rasterisation on a binary mask

use super::codec::BinaryMask;
use serde::{Deserialize, Serialize};

/// Which value a stroke writes into the mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrokeTool {
    /// Marks pixels as dust
    Brush,
    /// Clears dust pixels
    Eraser,
}

impl StrokeTool {
    fn paints_on(self) -> bool {
        matches!(self, Self::Brush)
    }
}

/// Point in mask pixel space; fractional coordinates are allowed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskPoint {
    pub x: f32,
    pub y: f32,
}

impl MaskPoint {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(&self, other: &MaskPoint) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    #[must_use]
    pub fn lerp(&self, other: &MaskPoint, t: f32) -> MaskPoint {
        MaskPoint::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Axis-aligned pixel rectangle, `max` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl DirtyRect {
    /// Smallest rectangle covering both
    #[must_use]
    pub fn union(&self, other: &DirtyRect) -> DirtyRect {
        DirtyRect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }
}

/// Merge an optional accumulated rectangle with a new one
#[must_use]
pub fn merge_dirty(acc: Option<DirtyRect>, next: Option<DirtyRect>) -> Option<DirtyRect> {
    match (acc, next) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Paint a filled disk of `radius` centred on `center`
///
/// The centre is truncated to a pixel and covers every `(x, y)` with
/// `(x - cx)^2 + (y - cy)^2 <= radius^2`. A centre outside the mask is
/// ignored and yields `None`; otherwise the touched rectangle is returned.
pub fn stamp_disk(
    mask: &mut BinaryMask,
    center: MaskPoint,
    radius: f32,
    tool: StrokeTool,
) -> Option<DirtyRect> {
    if !(center.x >= 0.0 && center.y >= 0.0) {
        return None;
    }
    let cx = center.x as i64;
    let cy = center.y as i64;
    let width = i64::from(mask.width());
    let height = i64::from(mask.height());
    if cx >= width || cy >= height {
        return None;
    }

    let radius = radius.max(0.0);
    let reach = radius.floor() as i64;
    let r2 = f64::from(radius) * f64::from(radius);
    let min_x = (cx - reach).max(0);
    let max_x = (cx + reach).min(width - 1);
    let min_y = (cy - reach).max(0);
    let max_y = (cy + reach).min(height - 1);
    let on = tool.paints_on();

    for y in min_y..=max_y {
        let dy = (y - cy) as f64;
        for x in min_x..=max_x {
            let dx = (x - cx) as f64;
            if dx * dx + dy * dy <= r2 {
                mask.set(x as u32, y as u32, on);
            }
        }
    }

    Some(DirtyRect {
        min_x: min_x as u32,
        min_y: min_y as u32,
        max_x: max_x as u32 + 1,
        max_y: max_y as u32 + 1,
    })
}

/// Paint a continuous stroke from `start` to `end`
///
/// Points closer than one pixel collapse to a single stamp at `end`.
/// Otherwise stamps are placed every `max(1, radius / 4)` pixels along the
/// segment, both endpoints included.
pub fn stamp_segment(
    mask: &mut BinaryMask,
    start: MaskPoint,
    end: MaskPoint,
    radius: f32,
    tool: StrokeTool,
) -> Option<DirtyRect> {
    let distance = start.distance_to(&end);
    if distance < 1.0 {
        return stamp_disk(mask, end, radius, tool);
    }

    let spacing = (radius * 0.25).max(1.0);
    let steps = ((distance / spacing).floor() as u32).max(1);
    let mut dirty = None;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        dirty = merge_dirty(dirty, stamp_disk(mask, start.lerp(&end, t), radius, tool));
    }
    dirty
}
