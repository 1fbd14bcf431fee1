// ============================================================================
// SELECTION TOOLS - rectangle / ellipse / free selection, move pixels
// ============================================================================

use std::sync::Arc;

use egui::Pos2;

use crate::canvas::LayerId;
use crate::components::history::{MoveCommand, SelectionCommand};
use crate::components::tools::{StrokeTracker, ToolContext, ToolHandler, ToolInput, ToolKind};
use crate::ops::floating::FloatingBuffer;
use crate::ops::transform::{HandleKind, TransformState};
use crate::selection::{SelectionMask, SelectionMode, SelectionPath, SelectionShape, SelectionState};

fn snap(pos: Pos2) -> Pos2 {
    Pos2::new(pos.x.round(), pos.y.round())
}

/// Combine `path` into the committed selection through the bus. Returns
/// whether a command was dispatched.
fn commit_selection(ctx: &mut ToolContext<'_>, description: &str, path: &SelectionPath, mode: SelectionMode) -> bool {
    let before = ctx.doc.selection().snapshot();
    let Some(after) = before.combined(path, mode) else {
        log_info!("{}: {} left the selection unchanged", description, mode.name());
        return false;
    };
    let cmd = SelectionCommand::new(description, before, after);
    ctx.bus.dispatch(ctx.doc, Some(Box::new(cmd)))
}

// ============================================================================
// RECTANGLE / ELLIPSE
// ============================================================================

/// Drag-out rectangle or ellipse selection.
pub struct ShapeSelectTool {
    shape: SelectionShape,
    start: Option<Pos2>,
    mode: SelectionMode,
}

impl ShapeSelectTool {
    pub fn rectangle() -> Self {
        Self::new(SelectionShape::Rectangle)
    }

    pub fn ellipse() -> Self {
        Self::new(SelectionShape::Ellipse)
    }

    fn new(shape: SelectionShape) -> Self {
        Self {
            shape,
            start: None,
            mode: SelectionMode::Replace,
        }
    }

    fn path_to(&self, pos: Pos2) -> Option<SelectionPath> {
        let start = self.start?;
        let end = snap(pos);
        Some(match self.shape {
            SelectionShape::Ellipse => SelectionPath::ellipse(start, end),
            _ => SelectionPath::rect(start, end),
        })
    }
}

impl ToolHandler for ShapeSelectTool {
    fn kind(&self) -> ToolKind {
        match self.shape {
            SelectionShape::Ellipse => ToolKind::EllipseSelect,
            _ => ToolKind::RectangleSelect,
        }
    }

    fn begin_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        self.start = Some(snap(input.pos));
        self.mode = input.selection_mode(ctx.props.selection_mode);
    }

    fn continue_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        if let Some(path) = self.path_to(input.pos) {
            ctx.doc.selection_mut().set_preview(path, self.mode);
        }
    }

    fn end_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        ctx.doc.selection_mut().clear_preview();
        if let Some(path) = self.path_to(input.pos) {
            let description = match self.shape {
                SelectionShape::Ellipse => "Ellipse Select",
                _ => "Rectangle Select",
            };
            commit_selection(ctx, description, &path, self.mode);
        }
        self.start = None;
    }

    fn cancel_stroke(&mut self, ctx: &mut ToolContext<'_>) {
        ctx.doc.selection_mut().clear_preview();
        self.start = None;
    }
}

// ============================================================================
// FREE (LASSO)
// ============================================================================

/// Freehand polygon selection from the pointer trail.
#[derive(Default)]
pub struct FreeSelectTool {
    points: Vec<Pos2>,
    mode: SelectionMode,
}

impl FreeSelectTool {
    fn push(&mut self, pos: Pos2) {
        if self.points.last().is_none_or(|last| last.distance(pos) >= 1.0) {
            self.points.push(pos);
        }
    }
}

impl ToolHandler for FreeSelectTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FreeSelect
    }

    fn begin_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        self.points.clear();
        self.points.push(input.pos);
        self.mode = input.selection_mode(ctx.props.selection_mode);
    }

    fn continue_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        self.push(input.pos);
        if self.points.len() >= 3 {
            ctx.doc
                .selection_mut()
                .set_preview(SelectionPath::polygon(&self.points), self.mode);
        }
    }

    fn end_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        self.push(input.pos);
        ctx.doc.selection_mut().clear_preview();
        if self.points.len() >= 3 {
            let path = SelectionPath::polygon(&self.points);
            commit_selection(ctx, "Free Select", &path, self.mode);
        }
        self.points.clear();
    }

    fn cancel_stroke(&mut self, ctx: &mut ToolContext<'_>) {
        ctx.doc.selection_mut().clear_preview();
        self.points.clear();
    }
}

// ============================================================================
// MOVE PIXELS
// ============================================================================

struct MoveSession {
    layer: LayerId,
    floating: FloatingBuffer,
    transform: TransformState,
    tracker: StrokeTracker,
    selection_before: Option<SelectionState>,
}

/// Lifts the selected pixels (the whole layer without a selection) into a
/// floating buffer, lets the pointer translate/scale/rotate it, and pastes it
/// back on release as one command.
#[derive(Default)]
pub struct MoveTool {
    session: Option<MoveSession>,
}

impl MoveTool {
    fn lift(ctx: &mut ToolContext<'_>, input: &ToolInput) -> Option<MoveSession> {
        let layer_id = ctx.doc.active_layer_id()?;
        let selection_before = ctx.doc.has_selection().then(|| ctx.doc.selection().snapshot());
        let mask = match ctx.doc.selection_mask_for(layer_id) {
            Some(mask) => mask,
            None => Arc::new(SelectionMask::full(ctx.doc.layer(layer_id)?.bounds())),
        };
        let floating = FloatingBuffer::extract_with_mask(ctx.doc.layer(layer_id)?, Arc::clone(&mask))?;

        let mut transform = TransformState::new(floating.source_rect().to_rect());
        let hit = transform.hit_test(input.pos, ctx.props.handle_radius);
        // With a selection, a press must land on a handle or on selected pixels.
        if selection_before.is_some()
            && hit.is_none_or(|h| h == HandleKind::Move)
            && !mask.contains(input.pos.x.floor() as i32, input.pos.y.floor() as i32)
        {
            return None;
        }

        let mut tracker = StrokeTracker::default();
        if !tracker.start(ctx.doc, layer_id, "Move Pixels") {
            return None;
        }
        let cleared = floating.clear_source_pixels(ctx.doc.layer_mut(layer_id)?);
        tracker.expand_bounds(cleared);
        ctx.doc.notify_pixels(layer_id, cleared);

        transform.begin_drag(hit.unwrap_or(HandleKind::Move), input.pos);

        Some(MoveSession {
            layer: layer_id,
            floating,
            transform,
            tracker,
            selection_before,
        })
    }

    fn commit(ctx: &mut ToolContext<'_>, mut session: MoveSession) {
        if session.transform.is_identity() {
            session.tracker.cancel(ctx.doc);
            return;
        }
        let placed = session.floating.transformed(&session.transform);
        let Some(layer) = ctx.doc.layer_mut(session.layer) else {
            log_warn!("move: layer {} vanished before commit", session.layer);
            session.tracker.cancel(ctx.doc);
            return;
        };
        let pasted = placed.paste_to_layer(layer, (0, 0));
        session.tracker.expand_bounds(pasted);
        ctx.doc.notify_pixels(session.layer, pasted);

        let selection = session.selection_before.map(|before| {
            let after = SelectionState::from_path(session.transform.map_path(&before.path));
            (before, after)
        });
        match session.tracker.finish(ctx.doc) {
            Some(region) => {
                ctx.bus
                    .dispatch(ctx.doc, Some(Box::new(MoveCommand::new(region, selection))));
            }
            None => {
                if let Some((before, after)) = selection
                    && before != after
                {
                    let cmd = SelectionCommand::new("Move Selection", before, after);
                    ctx.bus.dispatch(ctx.doc, Some(Box::new(cmd)));
                }
            }
        }
    }
}

impl ToolHandler for MoveTool {
    fn kind(&self) -> ToolKind {
        ToolKind::MovePixels
    }

    fn begin_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        self.session = Self::lift(ctx, input);
        if self.session.is_none() {
            log_info!("move: nothing to lift");
        }
    }

    fn continue_stroke(&mut self, _ctx: &mut ToolContext<'_>, input: &ToolInput) {
        if let Some(session) = &mut self.session {
            session.transform.drag_to(input.pos, input.modifiers.shift);
        }
    }

    fn end_stroke(&mut self, ctx: &mut ToolContext<'_>, input: &ToolInput) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.transform.drag_to(input.pos, input.modifiers.shift);
        session.transform.end_drag();
        Self::commit(ctx, session);
    }

    fn cancel_stroke(&mut self, ctx: &mut ToolContext<'_>) {
        if let Some(mut session) = self.session.take() {
            session.tracker.cancel(ctx.doc);
        }
    }

    fn floating(&self) -> Option<(&FloatingBuffer, &TransformState)> {
        self.session.as_ref().map(|s| (&s.floating, &s.transform))
    }
}
