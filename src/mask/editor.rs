//! Dual-resolution mask editing with bounded undo
//!
//! Strokes are rasterised into a low-resolution working copy so per-event
//! cost stays bounded on multi-megapixel scans. The full-resolution mask is
//! only rewritten from the working copy when a stroke ends, and only inside
//! the rectangle the stroke touched. A display copy of the full-resolution
//! mask is refreshed eagerly while the stroke is in progress.

use super::brush::{merge_dirty, stamp_disk, stamp_segment, DirtyRect, MaskPoint, StrokeTool};
use super::codec::{nearest_index_map, BinaryMask, MASK_OFF};
use super::history::MaskHistory;
use crate::config::EditingConfig;
use crate::types::ImageSize;
use crate::view::ImagePoint;

/// Size of the low-resolution working copy for a full-resolution mask
///
/// The scale is `min(fraction, max_resolution / max(width, height))`; each
/// side is truncated and never smaller than one pixel.
#[must_use]
pub fn low_res_size(full: ImageSize, fraction: f32, max_resolution: u32) -> ImageSize {
    let longest = full.width.max(full.height).max(1);
    let capped = f64::from(fraction) * f64::from(longest) > f64::from(max_resolution);
    let side = |len: u32| {
        let scaled = if capped {
            (u64::from(len) * u64::from(max_resolution) / u64::from(longest)) as u32
        } else {
            (f64::from(len) * f64::from(fraction)) as u32
        };
        scaled.max(1)
    };
    ImageSize::new(side(full.width), side(full.height))
}

/// Owner of the full-resolution, low-resolution and display masks
#[derive(Debug, Clone)]
pub struct MaskEditor {
    full: BinaryMask,
    display: BinaryMask,
    low_res: BinaryMask,
    // full-res column/row -> low-res column/row
    x_map: Vec<usize>,
    y_map: Vec<usize>,
    history: MaskHistory,
    stroke_active: bool,
    last_brush_point: Option<MaskPoint>,
    last_eraser_point: Option<MaskPoint>,
    stroke_dirty: Option<DirtyRect>,
    edited: bool,
    // history depth at which `full` equals the mask that was last installed
    clean_depth: Option<usize>,
}

impl MaskEditor {
    /// Start editing `mask` with the given settings
    #[must_use]
    pub fn new(mask: BinaryMask, settings: &EditingConfig) -> Self {
        let low_size = low_res_size(
            mask.size(),
            settings.low_res_fraction,
            settings.max_drawing_resolution,
        );
        let low_res = mask.resize_nearest(low_size);
        Self {
            x_map: nearest_index_map(low_size.width, mask.width()),
            y_map: nearest_index_map(low_size.height, mask.height()),
            display: mask.clone(),
            full: mask,
            low_res,
            history: MaskHistory::with_capacity(settings.history_capacity),
            stroke_active: false,
            last_brush_point: None,
            last_eraser_point: None,
            stroke_dirty: None,
            edited: false,
            clean_depth: Some(0),
        }
    }

    /// Authoritative full-resolution mask
    #[must_use]
    pub fn full_mask(&self) -> &BinaryMask {
        &self.full
    }

    /// Full-resolution mask including the in-progress stroke
    #[must_use]
    pub fn display_mask(&self) -> &BinaryMask {
        &self.display
    }

    #[must_use]
    pub fn low_res_mask(&self) -> &BinaryMask {
        &self.low_res
    }

    #[must_use]
    pub fn size(&self) -> ImageSize {
        self.full.size()
    }

    #[must_use]
    pub fn is_stroke_active(&self) -> bool {
        self.stroke_active
    }

    /// Whether any brush or eraser mutation happened since the mask was set
    #[must_use]
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Replace the mask wholesale (re-threshold); history is kept
    pub fn replace_mask(&mut self, mask: BinaryMask) {
        self.reset_stroke_tracking();
        self.full = mask;
        self.regenerate_derived();
        self.edited = false;
        self.clean_depth = Some(self.history.len());
    }

    /// Open a stroke session; the first call snapshots the mask for undo
    pub fn begin_stroke(&mut self) {
        if !self.stroke_active {
            if self.history.push(self.full.clone()) {
                self.clean_depth = self.clean_depth.and_then(|depth| depth.checked_sub(1));
            }
            self.stroke_active = true;
        }
    }

    /// Paint or erase a disk of `radius` image pixels at `point`
    ///
    /// Returns `false` when the point lies outside the mask.
    pub fn apply_point(&mut self, point: ImagePoint, tool: StrokeTool, radius: f32) -> bool {
        self.begin_stroke();
        let center = self.to_low_res(point);
        let radius = self.low_res_radius(radius);
        let dirty = stamp_disk(&mut self.low_res, center, radius, tool);
        self.remember(tool, center);
        self.mark_dirty(dirty)
    }

    /// Paint or erase along the segment `start -> end`
    ///
    /// Returns `false` when no stamp landed inside the mask.
    pub fn apply_stroke_segment(
        &mut self,
        start: ImagePoint,
        end: ImagePoint,
        tool: StrokeTool,
        radius: f32,
    ) -> bool {
        self.begin_stroke();
        let from = self.to_low_res(start);
        let to = self.to_low_res(end);
        let radius = self.low_res_radius(radius);
        let dirty = stamp_segment(&mut self.low_res, from, to, radius, tool);
        self.remember(tool, to);
        self.mark_dirty(dirty)
    }

    /// Continue the current stroke of `tool` to `point`
    ///
    /// Interpolates from the previous point of the same tool, or stamps a
    /// single disk when the stroke has just started.
    pub fn stroke_to(&mut self, point: ImagePoint, tool: StrokeTool, radius: f32) -> bool {
        let last = match tool {
            StrokeTool::Brush => self.last_brush_point,
            StrokeTool::Eraser => self.last_eraser_point,
        };
        match last {
            Some(previous) => {
                self.begin_stroke();
                let to = self.to_low_res(point);
                let radius = self.low_res_radius(radius);
                let dirty = stamp_segment(&mut self.low_res, previous, to, radius, tool);
                self.remember(tool, to);
                self.mark_dirty(dirty)
            },
            None => self.apply_point(point, tool, radius),
        }
    }

    /// Close the stroke session and make its edits durable
    ///
    /// Returns `true` if the full-resolution mask changed.
    pub fn end_stroke(&mut self) -> bool {
        self.stroke_active = false;
        self.last_brush_point = None;
        self.last_eraser_point = None;
        match self.stroke_dirty.take() {
            Some(rect) => {
                self.sync_region(rect, true);
                true
            },
            None => false,
        }
    }

    /// Restore the most recent snapshot; no-op on empty history
    ///
    /// Undoing back to the installed mask clears [`MaskEditor::is_edited`].
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        self.reset_stroke_tracking();
        self.full = snapshot;
        self.regenerate_derived();
        let depth = self.history.len();
        if self.clean_depth.is_some_and(|clean| depth < clean) {
            // undid past the install, so that mask is no longer reachable
            self.clean_depth = None;
        }
        self.edited = self.clean_depth != Some(depth);
        true
    }

    fn reset_stroke_tracking(&mut self) {
        self.stroke_active = false;
        self.last_brush_point = None;
        self.last_eraser_point = None;
        self.stroke_dirty = None;
    }

    fn regenerate_derived(&mut self) {
        self.low_res = self.full.resize_nearest(self.low_res.size());
        self.display = self.full.clone();
    }

    fn to_low_res(&self, point: ImagePoint) -> MaskPoint {
        let full = self.full.size();
        let low = self.low_res.size();
        MaskPoint::new(
            point.x * low.width as f32 / full.width.max(1) as f32,
            point.y * low.height as f32 / full.height.max(1) as f32,
        )
    }

    fn low_res_radius(&self, radius: f32) -> f32 {
        let scale = self.low_res.width() as f32 / self.full.width().max(1) as f32;
        (radius * scale).max(1.0)
    }

    fn remember(&mut self, tool: StrokeTool, point: MaskPoint) {
        match tool {
            StrokeTool::Brush => self.last_brush_point = Some(point),
            StrokeTool::Eraser => self.last_eraser_point = Some(point),
        }
    }

    fn mark_dirty(&mut self, dirty: Option<DirtyRect>) -> bool {
        let Some(rect) = dirty else {
            return false;
        };
        self.stroke_dirty = merge_dirty(self.stroke_dirty, Some(rect));
        self.edited = true;
        self.sync_region(rect, false);
        true
    }

    /// Copy the nearest-neighbour upscale of a low-res rectangle into the
    /// display mask, and into the full mask when `durable`
    fn sync_region(&mut self, rect: DirtyRect, durable: bool) {
        if rect.is_empty() {
            return;
        }
        let (x_start, x_end) = covering_range(&self.x_map, rect.min_x, rect.max_x);
        let (y_start, y_end) = covering_range(&self.y_map, rect.min_y, rect.max_y);
        let low_width = self.low_res.width() as usize;
        let full_width = self.full.width() as usize;
        let low = self.low_res.as_raw();

        for y in y_start..y_end {
            let Some(&low_y) = self.y_map.get(y) else {
                continue;
            };
            for x in x_start..x_end {
                let Some(&low_x) = self.x_map.get(x) else {
                    continue;
                };
                let value = low.get(low_y * low_width + low_x).copied().unwrap_or(MASK_OFF);
                let index = y * full_width + x;
                if let Some(px) = self.display.as_raw_mut().get_mut(index) {
                    *px = value;
                }
                if durable {
                    if let Some(px) = self.full.as_raw_mut().get_mut(index) {
                        *px = value;
                    }
                }
            }
        }
    }
}

/// Full-resolution index range whose nearest low-res source lies in `[lo, hi)`
fn covering_range(map: &[usize], lo: u32, hi: u32) -> (usize, usize) {
    let start = map.partition_point(|&m| m < lo as usize);
    let end = map.partition_point(|&m| m < hi as usize);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor(width: u32, height: u32) -> MaskEditor {
        MaskEditor::new(BinaryMask::new(width, height), &EditingConfig::default())
    }

    #[test]
    fn test_low_res_size() {
        assert_eq!(
            low_res_size(ImageSize::new(400, 200), 0.25, 1024),
            ImageSize::new(100, 50)
        );
        // 8000 * 0.25 = 2000 > 1024, so the drawing cap wins
        assert_eq!(
            low_res_size(ImageSize::new(8000, 4000), 0.25, 1024),
            ImageSize::new(1024, 512)
        );
        assert_eq!(
            low_res_size(ImageSize::new(3, 1), 0.25, 1024),
            ImageSize::new(1, 1)
        );
    }

    #[test]
    fn test_begin_stroke_is_idempotent() {
        let mut editor = editor(80, 80);
        editor.begin_stroke();
        editor.begin_stroke();
        editor.apply_point(ImagePoint::new(40.0, 40.0), StrokeTool::Brush, 8.0);
        editor.apply_point(ImagePoint::new(20.0, 40.0), StrokeTool::Brush, 8.0);
        assert_eq!(editor.history_len(), 1);
        editor.end_stroke();
        editor.begin_stroke();
        assert_eq!(editor.history_len(), 2);
    }

    #[test]
    fn test_display_refreshes_before_end_stroke() {
        let mut editor = editor(80, 80);
        editor.begin_stroke();
        assert!(editor.apply_point(ImagePoint::new(40.0, 40.0), StrokeTool::Brush, 8.0));
        assert!(editor.display_mask().is_on(40, 40));
        assert!(!editor.full_mask().is_on(40, 40));

        assert!(editor.end_stroke());
        assert!(editor.full_mask().is_on(40, 40));
        assert_eq!(editor.full_mask(), editor.display_mask());
        assert!(editor.is_edited());
    }

    #[test]
    fn test_stroke_preserves_detail_outside_touched_region() {
        let mut detailed = BinaryMask::new(80, 80);
        detailed.set(1, 1, true);
        let mut editor = MaskEditor::new(detailed, &EditingConfig::default());
        editor.begin_stroke();
        editor.apply_point(ImagePoint::new(60.0, 60.0), StrokeTool::Brush, 4.0);
        editor.end_stroke();
        assert!(editor.full_mask().is_on(1, 1));
        assert!(editor.full_mask().is_on(60, 60));
    }

    #[test]
    fn test_undo_restores_pre_stroke_mask() {
        let mut start = BinaryMask::new(64, 48);
        start.set(10, 10, true);
        let mut editor = MaskEditor::new(start.clone(), &EditingConfig::default());

        editor.begin_stroke();
        editor.apply_point(ImagePoint::new(12.0, 12.0), StrokeTool::Eraser, 10.0);
        editor.apply_stroke_segment(
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(63.0, 47.0),
            StrokeTool::Brush,
            6.0,
        );
        assert!(editor.undo());
        assert_eq!(editor.full_mask(), &start);
        assert_eq!(editor.display_mask(), &start);
        assert!(!editor.is_stroke_active());
        assert!(!editor.undo());
    }

    #[test]
    fn test_undo_to_installed_mask_clears_edited() {
        let mut editor = editor(64, 64);
        for x in [16.0, 48.0] {
            editor.begin_stroke();
            editor.apply_point(ImagePoint::new(x, 32.0), StrokeTool::Brush, 4.0);
            editor.end_stroke();
        }
        assert!(editor.undo());
        assert!(editor.is_edited());
        assert!(editor.undo());
        assert!(!editor.is_edited());

        // re-threshold, then undo past it into the older stroke history
        editor.begin_stroke();
        editor.apply_point(ImagePoint::new(16.0, 16.0), StrokeTool::Brush, 4.0);
        editor.end_stroke();
        editor.replace_mask(BinaryMask::new(64, 64));
        assert!(!editor.is_edited());
        assert!(editor.undo());
        assert!(editor.is_edited());
    }

    #[test]
    fn test_evicting_installed_snapshot_keeps_edited() {
        let settings = EditingConfig {
            history_capacity: 2,
            ..EditingConfig::default()
        };
        let mut editor = MaskEditor::new(BinaryMask::new(64, 64), &settings);
        for x in [8.0, 24.0, 40.0] {
            editor.begin_stroke();
            editor.apply_point(ImagePoint::new(x, 32.0), StrokeTool::Brush, 4.0);
            editor.end_stroke();
        }
        assert!(editor.undo());
        assert!(editor.undo());
        assert!(!editor.can_undo());
        // the first stroke survives, so this is still an edited mask
        assert!(editor.full_mask().is_on(8, 32));
        assert!(editor.is_edited());
    }

    #[test]
    fn test_point_outside_is_ignored() {
        let mut editor = editor(40, 40);
        editor.begin_stroke();
        assert!(!editor.apply_point(ImagePoint::new(-5.0, 3.0), StrokeTool::Brush, 4.0));
        assert!(!editor.end_stroke());
        assert!(editor.full_mask().is_all_off());
    }

    #[test]
    fn test_stroke_to_interpolates_from_last_point() {
        let mut editor = editor(400, 40);
        editor.begin_stroke();
        editor.stroke_to(ImagePoint::new(20.0, 20.0), StrokeTool::Brush, 8.0);
        editor.stroke_to(ImagePoint::new(380.0, 20.0), StrokeTool::Brush, 8.0);
        editor.end_stroke();
        for x in (24..376).step_by(8) {
            assert!(editor.full_mask().is_on(x, 20), "gap at x={x}");
        }
    }

    #[test]
    fn test_replace_mask_keeps_history() {
        let mut editor = editor(32, 32);
        editor.begin_stroke();
        editor.apply_point(ImagePoint::new(16.0, 16.0), StrokeTool::Brush, 4.0);
        editor.end_stroke();
        editor.replace_mask(BinaryMask::new(32, 32));
        assert!(editor.full_mask().is_all_off());
        assert!(!editor.is_edited());
        assert!(editor.can_undo());
    }
}
