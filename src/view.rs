//! Canvas placement, zoom/pan state and canvas-to-image projection
//!
//! The image is fitted into the canvas keeping its aspect ratio, scaled by
//! the zoom factor, centred, then shifted by the pan offset. Every pointer
//! event goes through the inverse of that transform before it reaches the
//! mask editor.

use crate::mask::StrokeTool;
use crate::types::ImageSize;
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 5.0;
/// Multiplicative step for zoom buttons
pub const BUTTON_ZOOM_STEP: f32 = 1.5;
/// Multiplicative step per wheel notch
pub const WHEEL_ZOOM_STEP: f32 = 1.10;
/// Zoom changes smaller than this are ignored
const ZOOM_EPSILON: f32 = 1e-3;

/// Point in canvas (widget) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

impl CanvasPoint {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Point in source image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f32,
    pub y: f32,
}

impl ImagePoint {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Canvas dimensions in widget pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

impl CanvasSize {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn center(&self) -> CanvasPoint {
        CanvasPoint::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Rectangle on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CanvasRect {
    #[must_use]
    pub fn contains(&self, point: CanvasPoint) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }
}

/// Active pointer tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToolMode {
    /// Pointer events are ignored
    #[default]
    None,
    Brush,
    Eraser,
    Pan,
}

impl ToolMode {
    /// Mask tool this mode edits with, if any
    #[must_use]
    pub fn stroke_tool(self) -> Option<StrokeTool> {
        match self {
            Self::Brush => Some(StrokeTool::Brush),
            Self::Eraser => Some(StrokeTool::Eraser),
            Self::None | Self::Pan => None,
        }
    }
}

/// How source and result are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    Single,
    SideBySide,
    SplitSlider,
}

/// Fit `image` into `canvas` keeping aspect ratio, centred, without zoom
#[must_use]
pub fn fit_rect(canvas: CanvasSize, image: ImageSize) -> CanvasRect {
    if image.is_empty() || canvas.width <= 0.0 || canvas.height <= 0.0 {
        return CanvasRect {
            x: canvas.width / 2.0,
            y: canvas.height / 2.0,
            width: 0.0,
            height: 0.0,
        };
    }
    let scale = (canvas.width / image.width as f32).min(canvas.height / image.height as f32);
    let width = image.width as f32 * scale;
    let height = image.height as f32 * scale;
    CanvasRect {
        x: (canvas.width - width) / 2.0,
        y: (canvas.height - height) / 2.0,
        width,
        height,
    }
}

/// Map a canvas point to image pixels given the rendered image rectangle
///
/// `image_bounds` is the unzoomed fit rectangle; `zoom` and `pan` are
/// applied around its centre the same way the renderer does. Points outside
/// the rendered image yield `None`.
#[must_use]
pub fn canvas_to_image(
    point: CanvasPoint,
    image_bounds: CanvasRect,
    image: ImageSize,
    zoom: f32,
    pan: (f32, f32),
) -> Option<ImagePoint> {
    let rendered = zoomed_rect(image_bounds, zoom, pan);
    if rendered.width <= 0.0 || rendered.height <= 0.0 || !rendered.contains(point) {
        return None;
    }
    let u = (point.x - rendered.x) / rendered.width;
    let v = (point.y - rendered.y) / rendered.height;
    let x = u * image.width as f32;
    let y = v * image.height as f32;
    if x < 0.0 || y < 0.0 || x >= image.width as f32 || y >= image.height as f32 {
        return None;
    }
    Some(ImagePoint::new(x, y))
}

/// Inverse of [`canvas_to_image`]
#[must_use]
pub fn image_to_canvas(
    point: ImagePoint,
    image_bounds: CanvasRect,
    image: ImageSize,
    zoom: f32,
    pan: (f32, f32),
) -> CanvasPoint {
    let rendered = zoomed_rect(image_bounds, zoom, pan);
    CanvasPoint::new(
        rendered.x + point.x / image.width.max(1) as f32 * rendered.width,
        rendered.y + point.y / image.height.max(1) as f32 * rendered.height,
    )
}

fn zoomed_rect(bounds: CanvasRect, zoom: f32, pan: (f32, f32)) -> CanvasRect {
    let width = bounds.width * zoom;
    let height = bounds.height * zoom;
    let cx = bounds.x + bounds.width / 2.0 + pan.0;
    let cy = bounds.y + bounds.height / 2.0 + pan.1;
    CanvasRect {
        x: cx - width / 2.0,
        y: cy - height / 2.0,
        width,
        height,
    }
}

/// Per-image view settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    zoom: f32,
    pan: (f32, f32),
    pub tool: ToolMode,
    brush_radius: u32,
    overlay_opacity: f32,
    pub view_mode: ViewMode,
    split_position: f32,
    pub hide_detections: bool,
    pub showing_original: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            pan: (0.0, 0.0),
            tool: ToolMode::None,
            brush_radius: 15,
            overlay_opacity: 0.6,
            view_mode: ViewMode::Single,
            split_position: 0.5,
            hide_detections: false,
            showing_original: false,
        }
    }
}

impl ViewState {
    /// View with brush radius and opacity taken from settings
    #[must_use]
    pub fn with_settings(brush_radius: u32, overlay_opacity: f32) -> Self {
        let mut view = Self::default();
        view.set_brush_radius(brush_radius);
        view.set_overlay_opacity(overlay_opacity);
        view
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Pan offset relative to the canvas centre
    #[must_use]
    pub fn pan(&self) -> (f32, f32) {
        self.pan
    }

    #[must_use]
    pub fn brush_radius(&self) -> u32 {
        self.brush_radius
    }

    pub fn set_brush_radius(&mut self, radius: u32) {
        self.brush_radius = radius.clamp(1, 500);
    }

    #[must_use]
    pub fn overlay_opacity(&self) -> f32 {
        self.overlay_opacity
    }

    pub fn set_overlay_opacity(&mut self, opacity: f32) {
        self.overlay_opacity = opacity.clamp(0.0, 1.0);
    }

    #[must_use]
    pub fn split_position(&self) -> f32 {
        self.split_position
    }

    pub fn set_split_position(&mut self, position: f32) {
        self.split_position = position.clamp(0.0, 1.0);
    }

    /// Set zoom, clamped to `[1, 5]`; returning to 1 recentres the image
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        if self.zoom <= MIN_ZOOM {
            self.pan = (0.0, 0.0);
        }
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * BUTTON_ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / BUTTON_ZOOM_STEP);
    }

    pub fn reset_view(&mut self) {
        self.zoom = MIN_ZOOM;
        self.pan = (0.0, 0.0);
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan.0 += dx;
        self.pan.1 += dy;
    }

    /// Zoom by `factor` keeping the image point under `cursor` stationary
    ///
    /// Returns `false` when clamping leaves the zoom effectively unchanged.
    pub fn zoom_at(&mut self, cursor: CanvasPoint, canvas: CanvasSize, factor: f32) -> bool {
        let old_zoom = self.zoom;
        let new_zoom = (old_zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if (new_zoom - old_zoom).abs() < ZOOM_EPSILON {
            return false;
        }

        let canvas_center = canvas.center();
        let center_x = canvas_center.x + self.pan.0;
        let center_y = canvas_center.y + self.pan.1;
        let ratio = new_zoom / old_zoom;
        let new_center_x = cursor.x - (cursor.x - center_x) * ratio;
        let new_center_y = cursor.y - (cursor.y - center_y) * ratio;

        self.zoom = new_zoom;
        self.pan = (
            new_center_x - canvas_center.x,
            new_center_y - canvas_center.y,
        );
        true
    }

    /// One wheel notch; positive `delta` zooms in, zero does nothing
    pub fn wheel_zoom(&mut self, cursor: CanvasPoint, canvas: CanvasSize, delta: f32) -> bool {
        let factor = if delta > 0.0 {
            WHEEL_ZOOM_STEP
        } else if delta < 0.0 {
            1.0 / WHEEL_ZOOM_STEP
        } else {
            return false;
        };
        self.zoom_at(cursor, canvas, factor)
    }

    /// Rendered image rectangle on `canvas`
    #[must_use]
    pub fn image_rect(&self, canvas: CanvasSize, image: ImageSize) -> CanvasRect {
        zoomed_rect(fit_rect(canvas, image), self.zoom, self.pan)
    }

    /// Project a canvas point into image pixels under the current view
    #[must_use]
    pub fn canvas_to_image(
        &self,
        point: CanvasPoint,
        canvas: CanvasSize,
        image: ImageSize,
    ) -> Option<ImagePoint> {
        canvas_to_image(point, fit_rect(canvas, image), image, self.zoom, self.pan)
    }

    #[must_use]
    pub fn image_to_canvas(
        &self,
        point: ImagePoint,
        canvas: CanvasSize,
        image: ImageSize,
    ) -> CanvasPoint {
        image_to_canvas(point, fit_rect(canvas, image), image, self.zoom, self.pan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const CANVAS: CanvasSize = CanvasSize {
        width: 800.0,
        height: 600.0,
    };

    #[test]
    fn test_fit_rect_keeps_aspect() {
        let rect = fit_rect(CANVAS, ImageSize::new(4000, 2000));
        assert_abs_diff_eq!(rect.width, 800.0);
        assert_abs_diff_eq!(rect.height, 400.0);
        assert_abs_diff_eq!(rect.y, 100.0);
    }

    #[test]
    fn test_canvas_to_image_bounds() {
        let view = ViewState::default();
        let image = ImageSize::new(4000, 2000);
        let center = view
            .canvas_to_image(CanvasPoint::new(400.0, 300.0), CANVAS, image)
            .unwrap();
        assert_abs_diff_eq!(center.x, 2000.0, epsilon = 0.01);
        assert_abs_diff_eq!(center.y, 1000.0, epsilon = 0.01);

        // letterbox band above the image
        assert!(view
            .canvas_to_image(CanvasPoint::new(400.0, 50.0), CANVAS, image)
            .is_none());
    }

    #[test]
    fn test_zoom_clamped_and_pan_reset() {
        let mut view = ViewState::default();
        for _ in 0..10 {
            view.zoom_in();
        }
        assert_abs_diff_eq!(view.zoom(), MAX_ZOOM);
        view.pan_by(30.0, -20.0);
        for _ in 0..10 {
            view.zoom_out();
        }
        assert_abs_diff_eq!(view.zoom(), MIN_ZOOM);
        assert_eq!(view.pan(), (0.0, 0.0));
    }

    #[test]
    fn test_wheel_zoom_keeps_cursor_anchored() {
        let image = ImageSize::new(3000, 2000);
        let mut view = ViewState::default();
        let cursor = CanvasPoint::new(250.0, 410.0);

        for delta in [1.0, 1.0, 1.0, -1.0, 1.0, -1.0, -1.0] {
            let before = view.canvas_to_image(cursor, CANVAS, image).unwrap();
            view.wheel_zoom(cursor, CANVAS, delta);
            let after = view.canvas_to_image(cursor, CANVAS, image).unwrap();
            assert_abs_diff_eq!(before.x, after.x, epsilon = 1.0);
            assert_abs_diff_eq!(before.y, after.y, epsilon = 1.0);
        }
    }

    #[test]
    fn test_wheel_zoom_at_limit_is_noop() {
        let mut view = ViewState::default();
        assert!(!view.wheel_zoom(CanvasPoint::new(10.0, 10.0), CANVAS, -1.0));
        assert_eq!(view.pan(), (0.0, 0.0));
    }

    #[test]
    fn test_wheel_zoom_ignores_zero_delta() {
        let mut view = ViewState::default();
        view.set_zoom(2.0);
        view.pan_by(12.0, -7.0);
        assert!(!view.wheel_zoom(CanvasPoint::new(100.0, 80.0), CANVAS, 0.0));
        assert_abs_diff_eq!(view.zoom(), 2.0);
        assert_eq!(view.pan(), (12.0, -7.0));
    }

    #[test]
    fn test_projection_round_trip_under_zoom_and_pan() {
        let image = ImageSize::new(1200, 900);
        let mut view = ViewState::default();
        view.set_zoom(2.5);
        view.pan_by(-40.0, 25.0);
        let point = ImagePoint::new(500.0, 420.0);
        let canvas = view.image_to_canvas(point, CANVAS, image);
        let back = view.canvas_to_image(canvas, CANVAS, image).unwrap();
        assert_abs_diff_eq!(back.x, point.x, epsilon = 0.01);
        assert_abs_diff_eq!(back.y, point.y, epsilon = 0.01);
    }
}
