use std::collections::VecDeque;

use image::Rgba;

use crate::canvas::{Document, Layer, LayerId, PixelRect};
use crate::events::{EditorEvent, Notifier};
use crate::selection::SelectionState;

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// Undoable unit of work. `apply` and `undo` replay captured state verbatim,
/// so calling either twice in a row leaves the document as calling it once.
pub trait Command: Send + Sync {
    fn apply(&self, doc: &mut Document);
    fn undo(&self, doc: &mut Document);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// PIXEL SNAPSHOT - rectangular sub-window of a layer buffer
// ============================================================================

/// Copy of a rectangular region of one layer. `data.len()` is always
/// `rect.width * rect.height * 4`; the rect is clipped to the layer at capture
/// time and may be empty, in which case restoring does nothing.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PixelSnapshot {
    rect: PixelRect,
    data: Vec<u8>,
}

impl PixelSnapshot {
    pub fn capture(layer: &Layer, rect: PixelRect) -> Self {
        let rect = rect.intersect(&layer.bounds());
        if rect.is_empty() {
            return Self::default();
        }
        let layer_w = layer.width() as usize;
        let row_bytes = rect.width as usize * 4;
        let raw = layer.pixels.as_raw();
        let mut data = Vec::with_capacity(row_bytes * rect.height as usize);
        for y in rect.y..rect.bottom() {
            let start = (y as usize * layer_w + rect.x as usize) * 4;
            data.extend_from_slice(&raw[start..start + row_bytes]);
        }
        Self { rect, data }
    }

    /// Write the snapshot back row by row at its original offset. Pixels
    /// outside the rect are never touched. Returns the rect actually written.
    pub fn restore(&self, layer: &mut Layer) -> PixelRect {
        let clip = self.rect.intersect(&layer.bounds());
        if clip.is_empty() {
            return PixelRect::EMPTY;
        }
        let layer_w = layer.width() as usize;
        let src_row = self.rect.width as usize * 4;
        let len = clip.width as usize * 4;
        let raw: &mut [u8] = &mut layer.pixels;
        for y in clip.y..clip.bottom() {
            let src = (y - self.rect.y) as usize * src_row + (clip.x - self.rect.x) as usize * 4;
            let dst = (y as usize * layer_w + clip.x as usize) * 4;
            raw[dst..dst + len].copy_from_slice(&self.data[src..src + len]);
        }
        clip
    }

    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at absolute canvas coordinates, if captured.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        if !self.rect.contains(x, y) {
            return None;
        }
        let i = (((y - self.rect.y) * self.rect.width + (x - self.rect.x)) * 4) as usize;
        Some(Rgba([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]))
    }

    pub fn memory_size(&self) -> usize {
        self.data.len()
    }
}

fn restore_snapshot(doc: &mut Document, layer: LayerId, snapshot: &PixelSnapshot) {
    if snapshot.is_empty() {
        return;
    }
    let Some(target) = doc.layer_mut(layer) else {
        log_warn!("restore_snapshot: layer {} no longer exists", layer);
        return;
    };
    let written = snapshot.restore(target);
    if !written.is_empty() {
        doc.notify_pixels(layer, written);
    }
}

// ============================================================================
// REGION COMMAND - before/after snapshots of one layer region
// ============================================================================

/// Generic draw/paste/move/fill command over one rectangle of one layer.
pub struct RegionCommand {
    description: String,
    layer: LayerId,
    requested: PixelRect,
    before: PixelSnapshot,
    after: Option<PixelSnapshot>,
}

impl RegionCommand {
    /// Empty command targeting `rect` of `layer`. Call
    /// [`RegionCommand::capture_before`] before mutating and
    /// [`RegionCommand::capture_after`] once done.
    pub fn new(description: impl Into<String>, layer: LayerId, rect: PixelRect) -> Self {
        Self {
            description: description.into(),
            layer,
            requested: rect,
            before: PixelSnapshot::default(),
            after: None,
        }
    }

    /// Build from snapshots captured elsewhere (e.g. a stroke tracker).
    pub fn with_snapshots(
        description: impl Into<String>,
        layer: LayerId,
        before: PixelSnapshot,
        after: PixelSnapshot,
    ) -> Self {
        Self {
            description: description.into(),
            layer,
            requested: before.rect(),
            before,
            after: Some(after),
        }
    }

    pub fn capture_before(&mut self, doc: &Document) {
        self.before = self.capture(doc);
    }

    pub fn capture_after(&mut self, doc: &Document) {
        self.after = Some(self.capture(doc));
    }

    fn capture(&self, doc: &Document) -> PixelSnapshot {
        match doc.layer(self.layer) {
            Some(layer) => PixelSnapshot::capture(layer, self.requested),
            None => {
                log_warn!("RegionCommand::capture: layer {} not found", self.layer);
                PixelSnapshot::default()
            }
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// The rectangle after clipping to the layer.
    pub fn rect(&self) -> PixelRect {
        self.before.rect()
    }

    pub fn before(&self) -> &PixelSnapshot {
        &self.before
    }

    pub fn after(&self) -> Option<&PixelSnapshot> {
        self.after.as_ref()
    }
}

impl Command for RegionCommand {
    fn apply(&self, doc: &mut Document) {
        match &self.after {
            Some(after) => restore_snapshot(doc, self.layer, after),
            None => log_warn!("RegionCommand: '{}' has no after state", self.description),
        }
    }

    fn undo(&self, doc: &mut Document) {
        restore_snapshot(doc, self.layer, &self.before);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.memory_size() + self.after.as_ref().map_or(0, |a| a.memory_size())
    }
}

// ============================================================================
// SELECTION COMMAND
// ============================================================================

pub struct SelectionCommand {
    description: String,
    before: SelectionState,
    after: SelectionState,
}

impl SelectionCommand {
    pub fn new(description: impl Into<String>, before: SelectionState, after: SelectionState) -> Self {
        Self {
            description: description.into(),
            before,
            after,
        }
    }
}

impl Command for SelectionCommand {
    fn apply(&self, doc: &mut Document) {
        doc.restore_selection(&self.after);
    }

    fn undo(&self, doc: &mut Document) {
        doc.restore_selection(&self.before);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        (self.before.path.len() + self.after.path.len()) * std::mem::size_of::<crate::selection::PathElement>()
    }
}

// ============================================================================
// MOVE COMMAND - pixels and the selection that travelled with them
// ============================================================================

pub struct MoveCommand {
    region: RegionCommand,
    selection: Option<(SelectionState, SelectionState)>,
}

impl MoveCommand {
    pub fn new(region: RegionCommand, selection: Option<(SelectionState, SelectionState)>) -> Self {
        Self { region, selection }
    }

    pub fn region(&self) -> &RegionCommand {
        &self.region
    }
}

impl Command for MoveCommand {
    fn apply(&self, doc: &mut Document) {
        self.region.apply(doc);
        if let Some((_, after)) = &self.selection {
            doc.restore_selection(after);
        }
    }

    fn undo(&self, doc: &mut Document) {
        self.region.undo(doc);
        if let Some((before, _)) = &self.selection {
            doc.restore_selection(before);
        }
    }

    fn description(&self) -> String {
        self.region.description()
    }

    fn memory_size(&self) -> usize {
        let sel = self.selection.as_ref().map_or(0, |(a, b)| {
            (a.path.len() + b.path.len()) * std::mem::size_of::<crate::selection::PathElement>()
        });
        self.region.memory_size() + sel
    }
}

// ============================================================================
// LAYER OPERATION COMMAND - For layer add/delete/reorder/opacity changes
// ============================================================================

/// Types of layer operations that can be undone/redone
#[derive(Clone)]
pub enum LayerOperation {
    /// A transparent layer was added at `index`.
    Add {
        id: LayerId,
        index: usize,
        name: String,
        width: u32,
        height: u32,
    },
    /// A layer was deleted (stores the full layer for restore).
    Delete { index: usize, layer: Layer },
    /// Layer was moved from one index to another
    Move {
        id: LayerId,
        from_index: usize,
        to_index: usize,
    },
    Opacity {
        id: LayerId,
        old_opacity: f32,
        new_opacity: f32,
    },
    Visibility { id: LayerId, was_visible: bool },
    Rename {
        id: LayerId,
        old_name: String,
        new_name: String,
    },
    /// `layer` is the copy inserted at `new_index`.
    Duplicate {
        source: LayerId,
        new_index: usize,
        layer: Layer,
    },
}

/// Command for layer structure operations
pub struct LayerOpCommand {
    operation: LayerOperation,
}

impl LayerOpCommand {
    pub fn new(operation: LayerOperation) -> Self {
        Self { operation }
    }

    pub fn operation(&self) -> &LayerOperation {
        &self.operation
    }

    fn set_metadata(doc: &mut Document, id: LayerId, f: impl FnOnce(&mut Layer)) {
        match doc.layer_mut(id) {
            Some(layer) => f(layer),
            None => {
                log_warn!("LayerOpCommand: layer {} not found", id);
                return;
            }
        }
        doc.notify_layers(Some(id));
    }
}

impl Command for LayerOpCommand {
    fn apply(&self, doc: &mut Document) {
        match &self.operation {
            LayerOperation::Add { id, index, name, width, height } => {
                let layer = Layer::new(*id, name.clone(), *width, *height, Rgba([0, 0, 0, 0]));
                doc.insert_layer(*index, layer);
            }
            LayerOperation::Delete { layer, .. } => {
                if doc.layer_count() > 1 {
                    doc.remove_layer(layer.id);
                } else {
                    log_warn!("LayerOpCommand: refusing to delete the last layer");
                }
            }
            LayerOperation::Move { id, to_index, .. } => {
                doc.move_layer(*id, *to_index);
            }
            LayerOperation::Opacity { id, new_opacity, .. } => {
                let v = new_opacity.clamp(0.0, 1.0);
                Self::set_metadata(doc, *id, |l| l.opacity = v);
            }
            LayerOperation::Visibility { id, was_visible } => {
                let v = !*was_visible;
                Self::set_metadata(doc, *id, |l| l.visible = v);
            }
            LayerOperation::Rename { id, new_name, .. } => {
                Self::set_metadata(doc, *id, |l| l.name = new_name.clone());
            }
            LayerOperation::Duplicate { new_index, layer, .. } => {
                doc.insert_layer(*new_index, layer.clone());
            }
        }
    }

    fn undo(&self, doc: &mut Document) {
        match &self.operation {
            LayerOperation::Add { id, .. } => {
                doc.remove_layer(*id);
            }
            LayerOperation::Delete { index, layer } => {
                if doc.layer(layer.id).is_none() {
                    doc.insert_layer(*index, layer.clone());
                }
            }
            LayerOperation::Move { id, from_index, .. } => {
                doc.move_layer(*id, *from_index);
            }
            LayerOperation::Opacity { id, old_opacity, .. } => {
                let v = *old_opacity;
                Self::set_metadata(doc, *id, |l| l.opacity = v);
            }
            LayerOperation::Visibility { id, was_visible } => {
                let v = *was_visible;
                Self::set_metadata(doc, *id, |l| l.visible = v);
            }
            LayerOperation::Rename { id, old_name, .. } => {
                Self::set_metadata(doc, *id, |l| l.name = old_name.clone());
            }
            LayerOperation::Duplicate { source, layer, .. } => {
                doc.remove_layer(layer.id);
                doc.set_active_layer(*source);
            }
        }
    }

    fn description(&self) -> String {
        match &self.operation {
            LayerOperation::Add { name, .. } => format!("Add Layer: {}", name),
            LayerOperation::Delete { layer, .. } => format!("Delete Layer: {}", layer.name),
            LayerOperation::Move { from_index, to_index, .. } => {
                format!("Move Layer {} → {}", from_index, to_index)
            }
            LayerOperation::Opacity { id, new_opacity, .. } => {
                format!("Layer {} Opacity: {:.0}%", id, new_opacity * 100.0)
            }
            LayerOperation::Visibility { id, was_visible } => {
                if *was_visible {
                    format!("Hide Layer {}", id)
                } else {
                    format!("Show Layer {}", id)
                }
            }
            LayerOperation::Rename { old_name, new_name, .. } => {
                format!("Rename: {} → {}", old_name, new_name)
            }
            LayerOperation::Duplicate { layer, .. } => format!("Duplicate: {}", layer.name),
        }
    }

    fn memory_size(&self) -> usize {
        match &self.operation {
            LayerOperation::Delete { layer, .. } | LayerOperation::Duplicate { layer, .. } => {
                layer.memory_bytes() + layer.name.len()
            }
            LayerOperation::Add { name, .. } => name.len(),
            LayerOperation::Rename { old_name, new_name, .. } => old_name.len() + new_name.len(),
            _ => std::mem::size_of::<LayerOperation>(),
        }
    }
}

// ============================================================================
// CANVAS SNAPSHOT COMMAND - whole-canvas undo for crop / resize
// ============================================================================

/// Canvas dimensions, every layer, the active layer and the selection.
#[derive(Clone)]
pub struct CanvasSnapshot {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub active: Option<LayerId>,
    pub selection: SelectionState,
}

impl CanvasSnapshot {
    pub fn capture(doc: &Document) -> Self {
        Self {
            width: doc.width(),
            height: doc.height(),
            layers: doc.layers().cloned().collect(),
            active: doc.active_layer_id(),
            selection: doc.selection().snapshot(),
        }
    }

    /// Dimensions first, then layers, then the selection.
    pub fn restore_into(&self, doc: &mut Document) {
        doc.set_canvas_size(self.width, self.height);
        doc.replace_layers(self.layers.clone(), self.active);
        doc.selection_mut().clear_preview();
        doc.restore_selection(&self.selection);
    }

    fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.memory_bytes() + l.name.len()).sum()
    }
}

pub struct CanvasSnapshotCommand {
    description: String,
    before: CanvasSnapshot,
    after: Option<CanvasSnapshot>,
}

impl CanvasSnapshotCommand {
    /// Capture the "before" state. Call BEFORE performing the operation, then
    /// [`CanvasSnapshotCommand::set_after`] once it completes.
    pub fn new(description: impl Into<String>, doc: &Document) -> Self {
        Self {
            description: description.into(),
            before: CanvasSnapshot::capture(doc),
            after: None,
        }
    }

    pub fn set_after(&mut self, doc: &Document) {
        self.after = Some(CanvasSnapshot::capture(doc));
    }

    /// Use a precomputed "after" state instead of capturing a live document.
    pub fn with_after(mut self, after: CanvasSnapshot) -> Self {
        self.after = Some(after);
        self
    }

    pub fn before(&self) -> &CanvasSnapshot {
        &self.before
    }
}

impl Command for CanvasSnapshotCommand {
    fn apply(&self, doc: &mut Document) {
        if let Some(after) = &self.after {
            after.restore_into(doc);
        }
    }

    fn undo(&self, doc: &mut Document) {
        self.before.restore_into(doc);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.memory_bytes() + self.after.as_ref().map_or(0, |a| a.memory_bytes())
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

pub const DEFAULT_MAX_STEPS: usize = 50;
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 100 * 1024 * 1024;

/// Undo/redo history with count and memory limits. No branching: every push
/// discards the redo stack.
pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
    /// Bumped by every push, undo and redo.
    revision: u64,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(DEFAULT_MAX_MEMORY_BYTES),
            total_memory: 0,
            revision: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self
    }

    pub fn set_limits(&mut self, max_history_size: usize, max_memory_bytes: Option<usize>) {
        self.max_history_size = max_history_size.max(1);
        self.max_memory_bytes = max_memory_bytes;
        self.prune();
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }
        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);
        self.revision += 1;
        self.prune();
    }

    /// Undo the most recent command. `false` when there is nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> bool {
        match self.undo_stack.pop_back() {
            Some(command) => {
                command.undo(doc);
                self.redo_stack.push_back(command);
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self, doc: &mut Document) -> bool {
        match self.redo_stack.pop_back() {
            Some(command) => {
                command.apply(doc);
                self.undo_stack.push_back(command);
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        if self.undo_stack.is_empty() && self.redo_stack.is_empty() {
            return;
        }
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
        self.revision += 1;
    }

    /// Undo `count` steps (0 = nothing). Returns how many were undone.
    pub fn undo_to(&mut self, count: usize, doc: &mut Document) -> usize {
        let mut done = 0;
        while done < count && self.undo(doc) {
            done += 1;
        }
        done
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Changes whenever the document state the history describes changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

// ============================================================================
// COMMAND BUS - single entry point for applying + recording commands
// ============================================================================

pub struct CommandBus {
    history: HistoryManager,
    notifier: Notifier,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new(HistoryManager::default())
    }
}

impl CommandBus {
    pub fn new(history: HistoryManager) -> Self {
        Self {
            history,
            notifier: Notifier::default(),
        }
    }

    pub fn set_notifier(&mut self, notifier: Notifier) {
        self.notifier = notifier;
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryManager {
        &mut self.history
    }

    /// Apply `command` and record it. `None` is accepted and ignored.
    pub fn dispatch(&mut self, doc: &mut Document, command: Option<Box<dyn Command>>) -> bool {
        let Some(command) = command else {
            return false;
        };
        log_info!("dispatch: {}", command.description());
        command.apply(doc);
        self.history.push(command);
        self.publish_counts();
        true
    }

    pub fn undo(&mut self, doc: &mut Document) -> bool {
        let done = self.history.undo(doc);
        if done {
            self.publish_counts();
        }
        done
    }

    pub fn redo(&mut self, doc: &mut Document) -> bool {
        let done = self.history.redo(doc);
        if done {
            self.publish_counts();
        }
        done
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.publish_counts();
    }

    fn publish_counts(&self) {
        self.notifier.publish(EditorEvent::HistoryChanged {
            undo_count: self.history.undo_count(),
            redo_count: self.history.redo_count(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{SelectionMode, SelectionPath};
    use egui::pos2;
    use std::sync::mpsc;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn fill(doc: &mut Document, id: LayerId, rect: PixelRect, color: Rgba<u8>) {
        let layer = doc.layer_mut(id).unwrap();
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                layer.pixels.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    fn region_all(doc: &Document, id: LayerId, rect: PixelRect, color: Rgba<u8>) -> bool {
        let layer = doc.layer(id).unwrap();
        (rect.y..rect.bottom()).all(|y| (rect.x..rect.right()).all(|x| layer.pixel(x, y) == Some(color)))
    }

    /// Command that paints `rect` of the background a given colour.
    fn draw_command(doc: &mut Document, rect: PixelRect, color: Rgba<u8>) -> RegionCommand {
        let id = doc.layer_ids()[0];
        let mut cmd = RegionCommand::new("Draw", id, rect);
        cmd.capture_before(doc);
        let clipped = rect.intersect(&doc.bounds());
        fill(doc, id, clipped, color);
        cmd.capture_after(doc);
        cmd
    }

    #[test]
    fn draw_command_undo_apply_is_stable() {
        let mut doc = Document::new(100, 100);
        let id = doc.layer_ids()[0];
        let region = PixelRect::new(10, 10, 30, 40);
        fill(&mut doc, id, region, RED);
        let cmd = draw_command(&mut doc, region, GREEN);

        for _ in 0..2 {
            cmd.undo(&mut doc);
            assert!(region_all(&doc, id, region, RED));
            cmd.apply(&mut doc);
            assert!(region_all(&doc, id, region, GREEN));
        }
        cmd.apply(&mut doc);
        assert!(region_all(&doc, id, region, GREEN));
    }

    #[test]
    fn command_rect_is_clipped_and_outside_untouched() {
        let mut doc = Document::new(100, 100);
        let id = doc.layer_ids()[0];
        let cmd = draw_command(&mut doc, PixelRect::new(80, 80, 50, 50), GREEN);
        assert_eq!(cmd.rect(), PixelRect::new(80, 80, 20, 20));
        assert_eq!(cmd.before().data().len(), 20 * 20 * 4);

        // Paint outside the command's rect; undo/apply must leave it alone.
        fill(&mut doc, id, PixelRect::new(0, 0, 80, 80), RED);
        cmd.undo(&mut doc);
        assert!(region_all(&doc, id, PixelRect::new(80, 80, 20, 20), WHITE));
        assert!(region_all(&doc, id, PixelRect::new(0, 0, 80, 80), RED));
        cmd.apply(&mut doc);
        assert!(region_all(&doc, id, PixelRect::new(80, 80, 20, 20), GREEN));
        assert!(region_all(&doc, id, PixelRect::new(0, 0, 80, 80), RED));
    }

    #[test]
    fn fully_outside_rect_gives_noop_command() {
        let mut doc = Document::new(10, 10);
        let cmd = draw_command(&mut doc, PixelRect::new(50, 50, 5, 5), GREEN);
        assert!(cmd.before().is_empty());
        assert_eq!(cmd.memory_size(), 0);
        cmd.undo(&mut doc);
        cmd.apply(&mut doc);
        assert!(region_all(&doc, doc.layer_ids()[0], doc.bounds(), WHITE));
    }

    #[test]
    fn unknown_layer_is_tolerated() {
        let mut doc = Document::new(10, 10);
        let mut cmd = RegionCommand::new("Ghost", LayerId(77), PixelRect::new(0, 0, 5, 5));
        cmd.capture_before(&doc);
        cmd.capture_after(&doc);
        cmd.apply(&mut doc);
        cmd.undo(&mut doc);
        assert!(cmd.rect().is_empty());
    }

    #[test]
    fn push_after_undo_clears_redo() {
        let mut doc = Document::new(20, 20);
        let mut history = HistoryManager::new(10);
        let a = draw_command(&mut doc, PixelRect::new(0, 0, 5, 5), RED);
        history.push(Box::new(a));
        let b = draw_command(&mut doc, PixelRect::new(5, 5, 5, 5), GREEN);
        history.push(Box::new(b));

        assert!(history.undo(&mut doc));
        assert!(history.undo(&mut doc));
        assert!(!history.undo(&mut doc));
        assert_eq!(history.redo_count(), 2);

        let c = draw_command(&mut doc, PixelRect::new(10, 10, 5, 5), RED);
        history.push(Box::new(c));
        assert_eq!(history.redo_count(), 0);
        assert!(!history.can_redo());
        assert!(!history.redo(&mut doc));
        let id = doc.layer_ids()[0];
        assert!(region_all(&doc, id, PixelRect::new(5, 5, 5, 5), WHITE));
    }

    #[test]
    fn undo_all_then_redo_all_restores_final_state() {
        let mut doc = Document::new(32, 32);
        let mut bus = CommandBus::default();
        for i in 0..5 {
            let rect = PixelRect::new(i * 4, i * 3, 10, 10);
            let id = doc.layer_ids()[0];
            let mut cmd = RegionCommand::new(format!("Draw {i}"), id, rect);
            cmd.capture_before(&doc);
            let color = Rgba([i as u8 * 40, 0, 255 - i as u8 * 40, 255]);
            let clipped = rect.intersect(&doc.bounds());
            fill(&mut doc, id, clipped, color);
            cmd.capture_after(&doc);
            // Pixels already mutated by the tool; dispatch replays the after state.
            assert!(bus.dispatch(&mut doc, Some(Box::new(cmd))));
        }
        let final_pixels = doc.active_layer().unwrap().pixels.clone();

        for _ in 0..5 {
            assert!(bus.undo(&mut doc));
        }
        assert!(region_all(&doc, doc.layer_ids()[0], doc.bounds(), WHITE));
        for _ in 0..5 {
            assert!(bus.redo(&mut doc));
        }
        assert_eq!(doc.active_layer().unwrap().pixels, final_pixels);
        assert_eq!(bus.history().undo_history()[0], "Draw 4");
    }

    #[test]
    fn dispatch_none_is_noop() {
        let mut doc = Document::new(4, 4);
        let mut bus = CommandBus::default();
        assert!(!bus.dispatch(&mut doc, None));
        assert_eq!(bus.history().undo_count(), 0);
    }

    #[test]
    fn bus_publishes_history_counts() {
        let (tx, rx) = mpsc::channel();
        let mut doc = Document::new(8, 8);
        let mut bus = CommandBus::default();
        bus.set_notifier(Notifier::channel(tx));
        let cmd = draw_command(&mut doc, PixelRect::new(0, 0, 2, 2), RED);
        bus.dispatch(&mut doc, Some(Box::new(cmd)));
        bus.undo(&mut doc);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                EditorEvent::HistoryChanged { undo_count: 1, redo_count: 0 },
                EditorEvent::HistoryChanged { undo_count: 0, redo_count: 1 },
            ]
        );
    }

    #[test]
    fn prune_by_count_and_memory() {
        let mut doc = Document::new(10, 10);
        let mut history = HistoryManager::new(3);
        for _ in 0..5 {
            history.push(Box::new(draw_command(&mut doc, PixelRect::new(0, 0, 10, 10), RED)));
        }
        assert_eq!(history.undo_count(), 3);
        // 2 × 10×10×4 bytes per command.
        assert_eq!(history.memory_usage(), 3 * 800);

        history.set_limits(10, Some(1000));
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.memory_usage(), 800);

        history.set_limits(10, Some(10));
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn undo_to_stops_at_empty_stack() {
        let mut doc = Document::new(10, 10);
        let mut history = HistoryManager::new(10);
        history.push(Box::new(draw_command(&mut doc, PixelRect::new(0, 0, 2, 2), RED)));
        history.push(Box::new(draw_command(&mut doc, PixelRect::new(2, 2, 2, 2), RED)));
        assert_eq!(history.undo_to(5, &mut doc), 2);
        assert_eq!(history.redo_description().as_deref(), Some("Draw"));
    }

    #[test]
    fn selection_command_round_trip() {
        let mut doc = Document::new(50, 50);
        let before = doc.selection().snapshot();
        doc.apply_selection(&SelectionPath::rect(pos2(1.0, 1.0), pos2(9.0, 9.0)), SelectionMode::Replace);
        let after = doc.selection().snapshot();
        let cmd = SelectionCommand::new("Select", before, after.clone());
        cmd.undo(&mut doc);
        assert!(!doc.has_selection());
        cmd.apply(&mut doc);
        cmd.apply(&mut doc);
        assert_eq!(doc.selection().snapshot(), after);
    }

    #[test]
    fn layer_ops_are_reversible() {
        let mut doc = Document::new(6, 6);
        let bg = doc.layer_ids()[0];
        let id = doc.alloc_layer_id();
        let add = LayerOpCommand::new(LayerOperation::Add {
            id,
            index: 1,
            name: "Ink".into(),
            width: 6,
            height: 6,
        });
        add.apply(&mut doc);
        assert_eq!(doc.layer_ids(), &[bg, id]);

        let rename = LayerOpCommand::new(LayerOperation::Rename {
            id,
            old_name: "Ink".into(),
            new_name: "Lines".into(),
        });
        rename.apply(&mut doc);
        assert_eq!(doc.layer(id).unwrap().name, "Lines");
        rename.undo(&mut doc);
        assert_eq!(doc.layer(id).unwrap().name, "Ink");

        let mv = LayerOpCommand::new(LayerOperation::Move { id, from_index: 1, to_index: 0 });
        mv.apply(&mut doc);
        assert_eq!(doc.layer_ids(), &[id, bg]);
        mv.undo(&mut doc);
        assert_eq!(doc.layer_ids(), &[bg, id]);

        add.undo(&mut doc);
        assert_eq!(doc.layer_ids(), &[bg]);
    }

    #[test]
    fn delete_never_removes_last_layer() {
        let mut doc = Document::new(4, 4);
        let bg = doc.layer_ids()[0];
        let layer = doc.layer(bg).unwrap().clone();
        let del = LayerOpCommand::new(LayerOperation::Delete { index: 0, layer });
        del.apply(&mut doc);
        assert_eq!(doc.layer_count(), 1);
    }

    #[test]
    fn canvas_snapshot_restores_dims_layers_and_selection() {
        let mut doc = Document::new(20, 10);
        doc.apply_selection(&SelectionPath::rect(pos2(2.0, 2.0), pos2(6.0, 6.0)), SelectionMode::Replace);
        let mut cmd = CanvasSnapshotCommand::new("Resize", &doc);
        let id = doc.layer_ids()[0];
        let layer = Layer::new(id, "Background".into(), 5, 5, RED);
        doc.set_canvas_size(5, 5);
        doc.replace_layers(vec![layer], Some(id));
        doc.clear_selection();
        cmd.set_after(&doc);

        cmd.undo(&mut doc);
        assert_eq!((doc.width(), doc.height()), (20, 10));
        assert_eq!(doc.active_layer().unwrap().width(), 20);
        assert!(doc.has_selection());

        cmd.apply(&mut doc);
        assert_eq!((doc.width(), doc.height()), (5, 5));
        assert_eq!(doc.active_layer().unwrap().pixel(0, 0), Some(RED));
        assert!(!doc.has_selection());
    }

    #[test]
    fn clearing_history_moves_revision() {
        let mut doc = Document::new(20, 20);
        let mut history = HistoryManager::new(10);
        let before = history.revision();
        history.clear();
        assert_eq!(history.revision(), before);

        let cmd = draw_command(&mut doc, PixelRect::new(0, 0, 5, 5), RED);
        history.push(Box::new(cmd));
        let pushed = history.revision();
        history.clear();
        assert_ne!(history.revision(), pushed);
        assert!(!history.can_undo());
        assert_eq!(history.memory_usage(), 0);
    }
}
