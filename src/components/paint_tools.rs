// ============================================================================
// PAINT TOOLS - brush, eraser, bucket fill, colour picker
// ============================================================================

use std::sync::Arc;

use egui::Pos2;
use image::Rgba;

use crate::components::tools::{StrokeTracker, ToolContext, ToolHandler, ToolInput, ToolKind};
use crate::ops::brushes::{StrokeInterpolator, dab_spacing};
use crate::ops::fill::{flood_fill, tolerance_from_percent};
use crate::selection::SelectionMask;

fn pixel_coords(pos: Pos2) -> (i32, i32) {
    (pos.x.floor() as i32, pos.y.floor() as i32)
}

// ============================================================================
// BRUSH / ERASER
// ============================================================================

/// Dab-based painting. The layer is edited in place; the tracker keeps the
/// pre-stroke copy so the whole stroke becomes one command on release.
pub struct PaintTool {
    erase: bool,
    tracker: StrokeTracker,
    interpolator: StrokeInterpolator,
    mask: Option<Arc<SelectionMask>>,
    color: Rgba<u8>,
}

impl PaintTool {
    pub fn brush() -> Self {
        Self::new(false)
    }

    pub fn eraser() -> Self {
        Self::new(true)
    }

    fn new(erase: bool) -> Self {
        Self {
            erase,
            tracker: StrokeTracker::default(),
            interpolator: StrokeInterpolator::default(),
            mask: None,
            color: Rgba([0, 0, 0, 255]),
        }
    }

    fn description(&self) -> &'static str {
        if self.erase { "Eraser Stroke" } else { "Brush Stroke" }
    }

    fn dab(&mut self, ctx: &mut ToolContext<'_>, pos: Pos2, pressure: f32) {
        let Some(layer_id) = self.tracker.layer() else {
            return;
        };
        let brush = ctx.props.brush();
        let size = ctx.props.size;
        let Some(layer) = ctx.doc.layer_mut(layer_id) else {
            return;
        };
        let (w, h) = (layer.width(), layer.height());
        let touched = if self.erase {
            brush.erase_dab(&mut layer.pixels, w, h, pos.x, pos.y, size, pressure)
        } else {
            brush.render_dab(&mut layer.pixels, w, h, pos.x, pos.y, size, self.color, pressure)
        };
        let Some(rect) = touched else {
            return;
        };
        if let Some(mask) = &self.mask {
            self.tracker.restore_unselected(layer, rect, mask);
        }
        self.tracker.expand_bounds(rect);
        ctx.doc.notify_pixels(layer_id, rect);
    }

    fn reset(&mut self) {
        self.interpolator.end();
        self.mask = None;
    }
}

impl ToolHandler for PaintTool {
    fn kind(&self) -> ToolKind {
        if self.erase { ToolKind::Eraser } else { ToolKind::Brush }
    }

    fn begin_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        let Some(layer) = ctx.doc.active_layer_id() else {
            return;
        };
        if !self.tracker.start(ctx.doc, layer, self.description()) {
            return;
        }
        self.mask = ctx.doc.selection_mask_for(layer);
        self.color = ctx.props.color_for(input);
        let first = self.interpolator.begin(input.pos);
        self.dab(ctx, first, input.pressure);
    }

    fn continue_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        if !self.tracker.is_active() {
            return;
        }
        let spacing = dab_spacing(ctx.props.size, ctx.props.spacing);
        for pos in self.interpolator.advance(input.pos, spacing) {
            self.dab(ctx, pos, input.pressure);
        }
    }

    fn end_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        self.continue_stroke(ctx, input);
        if let Some(cmd) = self.tracker.finish(ctx.doc) {
            ctx.bus.dispatch(ctx.doc, Some(Box::new(cmd)));
        }
        self.reset();
    }

    fn cancel_stroke(&mut self, ctx: &mut ToolContext<'_>) {
        self.tracker.cancel(ctx.doc);
        self.reset();
    }
}

// ============================================================================
// FILL
// ============================================================================

/// Bucket fill. Fills on press; the command is dispatched on release so the
/// gesture stays cancellable.
#[derive(Default)]
pub struct FillTool {
    tracker: StrokeTracker,
}

impl ToolHandler for FillTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Fill
    }

    fn begin_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        let Some(layer_id) = ctx.doc.active_layer_id() else {
            return;
        };
        if !self.tracker.start(ctx.doc, layer_id, "Fill") {
            return;
        }
        let mask = ctx.doc.selection_mask_for(layer_id);
        let color = ctx.props.color_for(input);
        let tolerance = tolerance_from_percent(ctx.props.fill_tolerance);
        let (x, y) = pixel_coords(input.pos);
        let Some(layer) = ctx.doc.layer_mut(layer_id) else {
            return;
        };
        let result = flood_fill(&mut layer.pixels, x, y, color, tolerance, mask.as_deref());
        if let Some(bounds) = result.bounds {
            self.tracker.expand_bounds(bounds);
            ctx.doc.notify_pixels(layer_id, bounds);
        }
    }

    fn continue_stroke(&mut self, _ctx: &mut ToolContext<'_>, _input: &ToolInput) {}

    fn end_stroke(&mut self, ctx: &mut ToolContext<'_>, _input: &ToolInput) {
        if let Some(cmd) = self.tracker.finish(ctx.doc) {
            ctx.bus.dispatch(ctx.doc, Some(Box::new(cmd)));
        }
    }

    fn cancel_stroke(&mut self, ctx: &mut ToolContext<'_>) {
        self.tracker.cancel(ctx.doc);
    }
}

// ============================================================================
// COLOUR PICKER
// ============================================================================

/// Reads the active layer under the pointer into the primary colour
/// (secondary with the secondary button). Never touches history.
pub struct ColorPickerTool;

impl ColorPickerTool {
    fn pick(ctx: &mut ToolContext<'_>, input: &ToolInput) {
        let (x, y) = pixel_coords(input.pos);
        let Some(color) = ctx.doc.active_layer().and_then(|l| l.pixel(x, y)) else {
            return;
        };
        if input.buttons.secondary {
            ctx.props.secondary_color = color;
        } else {
            ctx.props.primary_color = color;
        }
    }
}

impl ToolHandler for ColorPickerTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ColorPicker
    }

    fn begin_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        Self::pick(ctx, input);
    }

    fn continue_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        Self::pick(ctx, input);
    }

    fn end_stroke(&mut self, _ctx: &mut ToolContext<'_>, _input: &ToolInput) {}

    fn cancel_stroke(&mut self, _ctx: &mut ToolContext<'_>) {}
}
