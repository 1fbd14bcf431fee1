use std::sync::Arc;

use egui::{Modifiers, Pos2};
use image::{GrayImage, Rgba};

use crate::canvas::{Document, Layer, LayerId, PixelRect};
use crate::components::history::{CommandBus, PixelSnapshot, RegionCommand};
use crate::components::paint_tools::{ColorPickerTool, FillTool, PaintTool};
use crate::components::select_tools::{FreeSelectTool, MoveTool, ShapeSelectTool};
use crate::ops::brushes::Brush;
use crate::ops::floating::FloatingBuffer;
use crate::ops::transform::TransformState;
use crate::selection::{SelectionMask, SelectionMode};
use crate::settings::EditorSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ToolKind {
    #[default]
    Brush,
    Eraser,
    Fill,
    ColorPicker,
    MovePixels,
    RectangleSelect,
    EllipseSelect,
    FreeSelect,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Brush => "Brush",
            ToolKind::Eraser => "Eraser",
            ToolKind::Fill => "Fill",
            ToolKind::ColorPicker => "Color Picker",
            ToolKind::MovePixels => "Move Pixels",
            ToolKind::RectangleSelect => "Rectangle Select",
            ToolKind::EllipseSelect => "Ellipse Select",
            ToolKind::FreeSelect => "Free Select",
        }
    }

    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            ToolKind::RectangleSelect | ToolKind::EllipseSelect | ToolKind::FreeSelect
        )
    }

    /// Fresh gesture handler for this tool.
    pub fn create_handler(self) -> Box<dyn ToolHandler> {
        match self {
            ToolKind::Brush => Box::new(PaintTool::brush()),
            ToolKind::Eraser => Box::new(PaintTool::eraser()),
            ToolKind::Fill => Box::new(FillTool::default()),
            ToolKind::ColorPicker => Box::new(ColorPickerTool),
            ToolKind::MovePixels => Box::new(MoveTool::default()),
            ToolKind::RectangleSelect => Box::new(ShapeSelectTool::rectangle()),
            ToolKind::EllipseSelect => Box::new(ShapeSelectTool::ellipse()),
            ToolKind::FreeSelect => Box::new(FreeSelectTool::default()),
        }
    }
}

/// Gesture lifecycle. `Commit` only exists for the duration of `on_release`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolState {
    #[default]
    Idle,
    Active,
    Commit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PointerButtons {
    pub primary: bool,
    pub secondary: bool,
    pub middle: bool,
}

/// One pointer sample in canvas space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolInput {
    pub pos: Pos2,
    pub buttons: PointerButtons,
    pub modifiers: Modifiers,
    /// 0..1, 1 for devices without pressure.
    pub pressure: f32,
}

impl ToolInput {
    /// Primary button at `pos`, full pressure, no modifiers.
    pub fn at(pos: Pos2) -> Self {
        Self {
            pos,
            buttons: PointerButtons {
                primary: true,
                ..Default::default()
            },
            modifiers: Modifiers::NONE,
            pressure: 1.0,
        }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure.clamp(0.0, 1.0);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn secondary(mut self) -> Self {
        self.buttons = PointerButtons {
            secondary: true,
            ..Default::default()
        };
        self
    }

    /// Shift adds to the selection, Alt subtracts; otherwise `default`.
    pub fn selection_mode(&self, default: SelectionMode) -> SelectionMode {
        if self.modifiers.shift {
            SelectionMode::Add
        } else if self.modifiers.alt {
            SelectionMode::Subtract
        } else {
            default
        }
    }
}

/// Identifies a brush tip: the procedural circle or a greyscale image.
#[derive(Clone, Debug, Default)]
pub enum BrushTip {
    #[default]
    Circle,
    Image(Arc<GrayImage>),
}

impl BrushTip {
    pub fn is_circle(&self) -> bool {
        matches!(self, BrushTip::Circle)
    }
}

#[derive(Clone, Debug)]
pub struct ToolProperties {
    pub size: f32,
    pub hardness: f32,
    /// Dab spacing as a fraction of the brush diameter.
    pub spacing: f32,
    pub primary_color: Rgba<u8>,
    pub secondary_color: Rgba<u8>,
    /// Fill tolerance in percent (0–100).
    pub fill_tolerance: f32,
    /// Grab radius of transform handles, in canvas pixels.
    pub handle_radius: f32,
    pub selection_mode: SelectionMode,
    pub tip: BrushTip,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            size: 10.0,
            hardness: 0.75,
            spacing: 0.25,
            primary_color: Rgba([0, 0, 0, 255]),
            secondary_color: Rgba([255, 255, 255, 255]),
            fill_tolerance: 5.0,
            handle_radius: 6.0,
            selection_mode: SelectionMode::Replace,
            tip: BrushTip::Circle,
        }
    }
}

impl ToolProperties {
    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            size: settings.brush_size,
            hardness: settings.brush_hardness,
            spacing: settings.brush_spacing,
            fill_tolerance: settings.fill_tolerance,
            handle_radius: settings.handle_radius,
            ..Default::default()
        }
    }

    /// Dab strategy for the current tip and hardness.
    pub fn brush(&self) -> Brush {
        match &self.tip {
            BrushTip::Image(tip) => Brush::Stamp { tip: Arc::clone(tip) },
            BrushTip::Circle if self.hardness >= 1.0 => Brush::Solid,
            BrushTip::Circle => Brush::Soft {
                hardness: self.hardness.clamp(0.0, 1.0),
            },
        }
    }

    pub fn color_for(&self, input: &ToolInput) -> Rgba<u8> {
        if input.buttons.secondary {
            self.secondary_color
        } else {
            self.primary_color
        }
    }
}

/// What a handler may touch during a gesture.
pub struct ToolContext<'a> {
    pub doc: &'a mut Document,
    pub bus: &'a mut CommandBus,
    pub props: &'a mut ToolProperties,
}

impl<'a> ToolContext<'a> {
    pub fn new(doc: &'a mut Document, bus: &'a mut CommandBus, props: &'a mut ToolProperties) -> Self {
        Self { doc, bus, props }
    }
}

/// Per-tool gesture callbacks driven by [`ActiveTool`].
pub trait ToolHandler: Send {
    fn kind(&self) -> ToolKind;
    fn begin_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput);
    fn continue_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput);
    fn end_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput);
    /// Undo everything the gesture did so far; nothing is dispatched.
    fn cancel_stroke(&mut self, ctx: &mut ToolContext<'_>);

    /// Pixels currently lifted off the layer, for preview rendering.
    fn floating(&self) -> Option<(&FloatingBuffer, &TransformState)> {
        None
    }
}

/// The one active tool of a document and its Idle → Active → Commit cycle.
pub struct ActiveTool {
    kind: ToolKind,
    state: ToolState,
    handler: Box<dyn ToolHandler>,
}

impl Default for ActiveTool {
    fn default() -> Self {
        Self::new(ToolKind::default())
    }
}

impl ActiveTool {
    pub fn new(kind: ToolKind) -> Self {
        Self::with_handler(kind.create_handler())
    }

    pub fn with_handler(handler: Box<dyn ToolHandler>) -> Self {
        Self {
            kind: handler.kind(),
            state: ToolState::Idle,
            handler,
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn state(&self) -> ToolState {
        self.state
    }

    pub fn floating(&self) -> Option<(&FloatingBuffer, &TransformState)> {
        self.handler.floating()
    }

    /// Start a gesture. `false` if one is already running.
    pub fn on_press(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) -> bool {
        if self.state != ToolState::Idle {
            return false;
        }
        self.handler.begin_stroke(ctx, input);
        self.state = ToolState::Active;
        true
    }

    pub fn on_move(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) -> bool {
        if self.state != ToolState::Active {
            return false;
        }
        self.handler.continue_stroke(ctx, input);
        true
    }

    pub fn on_release(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) -> bool {
        if self.state != ToolState::Active {
            return false;
        }
        self.state = ToolState::Commit;
        self.handler.end_stroke(ctx, input);
        self.state = ToolState::Idle;
        true
    }

    /// Abort a running gesture. No-op when idle.
    pub fn reset(&mut self, ctx: &mut ToolContext<'_>) {
        if self.state == ToolState::Active {
            self.handler.cancel_stroke(ctx);
        }
        self.state = ToolState::Idle;
    }

    /// Cancel any running gesture, then make `kind` the active tool.
    pub fn switch_to(&mut self, kind: ToolKind, ctx: &mut ToolContext<'_>) {
        self.reset(ctx);
        if kind != self.kind {
            log_info!("tool: {} → {}", self.kind.name(), kind.name());
            self.handler = kind.create_handler();
            self.kind = kind;
        }
    }
}

// ============================================================================
// STROKE TRACKER - before-state bookkeeping for direct-edit tools
// ============================================================================

/// Tracks one gesture that edits a layer in place: a copy of the layer from
/// before the gesture plus the union of everything touched since.
#[derive(Default)]
pub struct StrokeTracker {
    layer: Option<LayerId>,
    bounds: Option<PixelRect>,
    snapshot: Option<Layer>,
    description: String,
}

impl StrokeTracker {
    /// Snapshot `layer` and start tracking. `false` if the layer is missing.
    pub fn start(&mut self, doc: &Document, layer: LayerId, description: &str) -> bool {
        let Some(current) = doc.layer(layer) else {
            log_warn!("StrokeTracker::start: layer {} not found", layer);
            self.reset();
            return false;
        };
        self.layer = Some(layer);
        self.bounds = None;
        self.snapshot = Some(current.clone());
        self.description = description.to_string();
        true
    }

    pub fn is_active(&self) -> bool {
        self.layer.is_some()
    }

    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    pub fn bounds(&self) -> Option<PixelRect> {
        self.bounds
    }

    pub fn expand_bounds(&mut self, rect: PixelRect) {
        if rect.is_empty() {
            return;
        }
        self.bounds = Some(match self.bounds {
            Some(existing) => existing.union(&rect),
            None => rect,
        });
    }

    /// Put back the pre-gesture pixels of `rect` that fall outside `mask`.
    pub fn restore_unselected(&self, layer: &mut Layer, rect: PixelRect, mask: &SelectionMask) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let rect = rect.intersect(&layer.bounds()).intersect(&snapshot.bounds());
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if !mask.contains(x, y) {
                    let px = *snapshot.pixels.get_pixel(x as u32, y as u32);
                    layer.pixels.put_pixel(x as u32, y as u32, px);
                }
            }
        }
    }

    /// Build the gesture's command from the snapshot and the live layer.
    /// `None` when nothing was touched or the pixels ended up unchanged.
    pub fn finish(&mut self, doc: &Document) -> Option<RegionCommand> {
        let layer = self.layer?;
        let result = match (self.bounds, &self.snapshot, doc.layer(layer)) {
            (Some(bounds), Some(snapshot), Some(live)) => {
                let before = PixelSnapshot::capture(snapshot, bounds);
                let after = PixelSnapshot::capture(live, bounds);
                if before.is_empty() || before == after {
                    None
                } else {
                    Some(RegionCommand::with_snapshots(self.description.clone(), layer, before, after))
                }
            }
            _ => None,
        };
        self.reset();
        result
    }

    /// Restore the layer to its pre-gesture pixels and stop tracking.
    pub fn cancel(&mut self, doc: &mut Document) {
        if let (Some(layer), Some(bounds), Some(snapshot)) = (self.layer, self.bounds, &self.snapshot) {
            let before = PixelSnapshot::capture(snapshot, bounds);
            if let Some(live) = doc.layer_mut(layer) {
                let written = before.restore(live);
                if !written.is_empty() {
                    doc.notify_pixels(layer, written);
                }
            }
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.layer = None;
        self.bounds = None;
        self.snapshot = None;
        self.description.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;
    use std::sync::Mutex;

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ToolHandler for Recorder {
        fn kind(&self) -> ToolKind {
            ToolKind::Brush
        }
        fn begin_stroke(&mut self, _: &mut ToolContext<'_>, _: &ToolInput) {
            self.log.lock().unwrap().push("begin");
        }
        fn continue_stroke(&mut self, _: &mut ToolContext<'_>, _: &ToolInput) {
            self.log.lock().unwrap().push("continue");
        }
        fn end_stroke(&mut self, _: &mut ToolContext<'_>, _: &ToolInput) {
            self.log.lock().unwrap().push("end");
        }
        fn cancel_stroke(&mut self, _: &mut ToolContext<'_>) {
            self.log.lock().unwrap().push("cancel");
        }
    }

    fn recorder() -> (ActiveTool, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tool = ActiveTool::with_handler(Box::new(Recorder { log: Arc::clone(&log) }));
        (tool, log)
    }

    #[test]
    fn lifecycle_follows_idle_active_idle() {
        let (mut tool, log) = recorder();
        let mut doc = Document::new(4, 4);
        let mut bus = CommandBus::default();
        let mut props = ToolProperties::default();
        let mut ctx = ToolContext::new(&mut doc, &mut bus, &mut props);
        let input = ToolInput::at(pos2(1.0, 1.0));

        assert!(!tool.on_move(&mut ctx, &input));
        assert!(!tool.on_release(&mut ctx, &input));
        assert!(tool.on_press(&mut ctx, &input));
        assert_eq!(tool.state(), ToolState::Active);
        assert!(!tool.on_press(&mut ctx, &input));
        assert!(tool.on_move(&mut ctx, &input));
        assert!(tool.on_release(&mut ctx, &input));
        assert_eq!(tool.state(), ToolState::Idle);
        assert_eq!(*log.lock().unwrap(), vec!["begin", "continue", "end"]);
    }

    #[test]
    fn reset_cancels_only_active_gestures() {
        let (mut tool, log) = recorder();
        let mut doc = Document::new(4, 4);
        let mut bus = CommandBus::default();
        let mut props = ToolProperties::default();
        let mut ctx = ToolContext::new(&mut doc, &mut bus, &mut props);

        tool.reset(&mut ctx);
        assert!(log.lock().unwrap().is_empty());
        tool.on_press(&mut ctx, &ToolInput::at(pos2(0.0, 0.0)));
        tool.reset(&mut ctx);
        assert_eq!(tool.state(), ToolState::Idle);
        assert_eq!(*log.lock().unwrap(), vec!["begin", "cancel"]);
    }

    #[test]
    fn switching_tools_cancels_first() {
        let (mut tool, log) = recorder();
        let mut doc = Document::new(4, 4);
        let mut bus = CommandBus::default();
        let mut props = ToolProperties::default();
        let mut ctx = ToolContext::new(&mut doc, &mut bus, &mut props);
        tool.on_press(&mut ctx, &ToolInput::at(pos2(0.0, 0.0)));
        tool.switch_to(ToolKind::Fill, &mut ctx);
        assert_eq!(tool.kind(), ToolKind::Fill);
        assert_eq!(*log.lock().unwrap(), vec!["begin", "cancel"]);
    }

    #[test]
    fn modifiers_pick_selection_mode() {
        let input = ToolInput::at(pos2(0.0, 0.0));
        assert_eq!(input.selection_mode(SelectionMode::Replace), SelectionMode::Replace);
        let shift = input.with_modifiers(Modifiers::SHIFT);
        assert_eq!(shift.selection_mode(SelectionMode::Replace), SelectionMode::Add);
        let alt = input.with_modifiers(Modifiers::ALT);
        assert_eq!(alt.selection_mode(SelectionMode::Replace), SelectionMode::Subtract);
    }

    #[test]
    fn hardness_one_is_solid() {
        let mut props = ToolProperties::default();
        assert_eq!(props.brush().name(), "Soft");
        props.hardness = 1.0;
        assert_eq!(props.brush().name(), "Solid");
        props.tip = BrushTip::Image(Arc::new(GrayImage::new(2, 2)));
        assert_eq!(props.brush().name(), "Stamp");
    }

    #[test]
    fn tracker_builds_one_command_and_cancel_restores() {
        let mut doc = Document::new(8, 8);
        let id = doc.active_layer_id().unwrap();
        let mut tracker = StrokeTracker::default();
        assert!(tracker.start(&doc, id, "Test"));
        doc.layer_mut(id).unwrap().pixels.put_pixel(2, 2, Rgba([1, 2, 3, 255]));
        tracker.expand_bounds(PixelRect::new(1, 1, 3, 3));
        let cmd = tracker.finish(&doc).unwrap();
        assert_eq!(cmd.rect(), PixelRect::new(1, 1, 3, 3));
        assert!(!tracker.is_active());

        tracker.start(&doc, id, "Test");
        doc.layer_mut(id).unwrap().pixels.put_pixel(5, 5, Rgba([9, 9, 9, 255]));
        tracker.expand_bounds(PixelRect::new(5, 5, 1, 1));
        tracker.cancel(&mut doc);
        assert_eq!(doc.layer(id).unwrap().pixel(5, 5), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(doc.layer(id).unwrap().pixel(2, 2), Some(Rgba([1, 2, 3, 255])));
    }

    #[test]
    fn untouched_stroke_yields_nothing() {
        let doc = Document::new(8, 8);
        let id = doc.active_layer_id().unwrap();
        let mut tracker = StrokeTracker::default();
        tracker.start(&doc, id, "Test");
        assert!(tracker.finish(&doc).is_none());
        tracker.start(&doc, id, "Test");
        tracker.expand_bounds(PixelRect::new(0, 0, 2, 2));
        assert!(tracker.finish(&doc).is_none());
    }
}
