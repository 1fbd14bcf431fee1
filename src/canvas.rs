use std::collections::HashMap;
use std::sync::Arc;

use egui::{Rect, pos2};
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::events::{EditorEvent, Notifier};
use crate::selection::{SelectionManager, SelectionMask, SelectionMode, SelectionPath, SelectionState};

/// Maximum pixel count accepted for a single layer (~256 megapixels).
pub const MAX_LAYER_PIXELS: u64 = 256_000_000;

// ============================================================================
// PIXEL RECT - integer rectangle in canvas space
// ============================================================================

/// Integer rectangle, `x..x+width` × `y..y+height`. May be empty
/// (non-positive width or height) after clipping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub const EMPTY: PixelRect = PixelRect { x: 0, y: 0, width: 0, height: 0 };

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// From exclusive max corner.
    pub fn from_min_max(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    /// Rect covering `0..w` × `0..h`.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Smallest pixel rect containing a float rect (floor min, ceil max).
    pub fn enclosing(rect: Rect) -> Self {
        Self::from_min_max(
            rect.min.x.floor() as i32,
            rect.min.y.floor() as i32,
            rect.max.x.ceil() as i32,
            rect.max.y.ceil() as i32,
        )
    }

    pub fn to_rect(self) -> Rect {
        Rect::from_min_max(
            pos2(self.x as f32, self.y as f32),
            pos2(self.right() as f32, self.bottom() as f32),
        )
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Pixel count (0 for empty rects).
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Intersection. Empty results keep the clamped origin and a zero size.
    pub fn intersect(&self, other: &PixelRect) -> PixelRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        PixelRect::from_min_max(x0, y0, x1.max(x0), y1.max(y0))
    }

    /// Bounding union; empty rects do not contribute.
    pub fn union(&self, other: &PixelRect) -> PixelRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        PixelRect::from_min_max(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> PixelRect {
        PixelRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

// ============================================================================
// BLEND MODES - consumed by the compositor, stored per layer
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Additive,
    Overlay,
    Lighten,
    Darken,
    Difference,
    Exclusion,
    ColorBurn,
    ColorDodge,
    HardLight,
    SoftLight,
    Subtract,
    Divide,
    Overwrite,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Additive,
            BlendMode::Overlay,
            BlendMode::Lighten,
            BlendMode::Darken,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::ColorBurn,
            BlendMode::ColorDodge,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Subtract,
            BlendMode::Divide,
            BlendMode::Overwrite,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Additive => "Additive",
            BlendMode::Overlay => "Overlay",
            BlendMode::Lighten => "Lighten",
            BlendMode::Darken => "Darken",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Subtract => "Subtract",
            BlendMode::Divide => "Divide",
            BlendMode::Overwrite => "Overwrite",
        }
    }

    /// Stable byte for the project file's layer chunk.
    pub fn to_u8(&self) -> u8 {
        match self {
            BlendMode::Normal => 0,
            BlendMode::Multiply => 1,
            BlendMode::Screen => 2,
            BlendMode::Additive => 3,
            BlendMode::Overlay => 4,
            BlendMode::Lighten => 5,
            BlendMode::Darken => 6,
            BlendMode::Difference => 7,
            BlendMode::Exclusion => 8,
            BlendMode::ColorBurn => 9,
            BlendMode::ColorDodge => 10,
            BlendMode::HardLight => 11,
            BlendMode::SoftLight => 12,
            BlendMode::Subtract => 13,
            BlendMode::Divide => 14,
            BlendMode::Overwrite => 15,
        }
    }

    /// Reconstruct from a byte (unknown values fall back to Normal).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => BlendMode::Multiply,
            2 => BlendMode::Screen,
            3 => BlendMode::Additive,
            4 => BlendMode::Overlay,
            5 => BlendMode::Lighten,
            6 => BlendMode::Darken,
            7 => BlendMode::Difference,
            8 => BlendMode::Exclusion,
            9 => BlendMode::ColorBurn,
            10 => BlendMode::ColorDodge,
            11 => BlendMode::HardLight,
            12 => BlendMode::SoftLight,
            13 => BlendMode::Subtract,
            14 => BlendMode::Divide,
            15 => BlendMode::Overwrite,
            _ => BlendMode::Normal,
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// Stable identifier of a layer inside its document. Never reused while the
/// document is open, so commands can refer to layers across structural edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One raster layer: a fixed-size RGBA8 row-major buffer plus metadata.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    /// 0.0–1.0
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub pixels: RgbaImage,
}

impl Layer {
    pub fn new(id: LayerId, name: String, width: u32, height: u32, fill_color: Rgba<u8>) -> Self {
        let (width, height) = clamp_dimensions(width, height);
        Self {
            id,
            name,
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            pixels: RgbaImage::from_pixel(width, height, fill_color),
        }
    }

    /// Wrap an existing buffer.
    pub fn from_image(id: LayerId, name: String, pixels: RgbaImage) -> Self {
        Self {
            id,
            name,
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::from_size(self.width(), self.height())
    }

    /// Pixel at (x, y), or `None` outside the buffer.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        if self.bounds().contains(x, y) {
            Some(*self.pixels.get_pixel(x as u32, y as u32))
        } else {
            None
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

fn clamp_dimensions(width: u32, height: u32) -> (u32, u32) {
    let total = width as u64 * height as u64;
    if total > MAX_LAYER_PIXELS || width == 0 || height == 0 {
        log_warn!("Layer::new: dimensions {}×{} rejected, clamped to 1×1", width, height);
        (1, 1)
    } else {
        (width, height)
    }
}

// ============================================================================
// DOCUMENT - layer arena + stack order + selection
// ============================================================================

/// One open image: canvas dimensions, an arena of layers addressed by
/// [`LayerId`], the bottom→top stacking order, and the selection.
pub struct Document {
    pub id: Uuid,
    width: u32,
    height: u32,
    layers: HashMap<LayerId, Layer>,
    /// Bottom → top.
    order: Vec<LayerId>,
    active: Option<LayerId>,
    next_layer_id: u64,
    selection: SelectionManager,
    notifier: Notifier,
}

impl Document {
    /// New document with an opaque white "Background" layer.
    pub fn new(width: u32, height: u32) -> Self {
        let mut doc = Self::empty(width, height);
        let id = doc.alloc_layer_id();
        let (w, h) = (doc.width, doc.height);
        doc.push_layer(Layer::new(id, "Background".to_string(), w, h, Rgba([255, 255, 255, 255])));
        doc
    }

    /// New document without any layers.
    pub fn empty(width: u32, height: u32) -> Self {
        let (width, height) = clamp_dimensions(width, height);
        Self {
            id: Uuid::new_v4(),
            width,
            height,
            layers: HashMap::new(),
            order: Vec::new(),
            active: None,
            next_layer_id: 1,
            selection: SelectionManager::new(),
            notifier: Notifier::default(),
        }
    }

    pub fn set_notifier(&mut self, notifier: Notifier) {
        self.notifier = notifier;
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::from_size(self.width, self.height)
    }

    /// Change the canvas dimensions. Layer buffers are untouched; structural
    /// edits replace them separately.
    pub(crate) fn set_canvas_size(&mut self, width: u32, height: u32) {
        let (width, height) = clamp_dimensions(width, height);
        self.width = width;
        self.height = height;
    }

    // ---- layer arena ---------------------------------------------------------

    pub fn alloc_layer_id(&mut self) -> LayerId {
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        id
    }

    pub fn layer_count(&self) -> usize {
        self.order.len()
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(&id)
    }

    /// Layer ids, bottom → top.
    pub fn layer_ids(&self) -> &[LayerId] {
        &self.order
    }

    /// Layers, bottom → top.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.order.iter().filter_map(|id| self.layers.get(id))
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.order.iter().position(|l| *l == id)
    }

    pub fn layer_at(&self, index: usize) -> Option<&Layer> {
        self.order.get(index).and_then(|id| self.layers.get(id))
    }

    pub fn active_layer_id(&self) -> Option<LayerId> {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.layers.get(&id))
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        match self.active {
            Some(id) => self.layers.get_mut(&id),
            None => None,
        }
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> bool {
        if !self.layers.contains_key(&id) {
            return false;
        }
        if self.active != Some(id) {
            self.active = Some(id);
            self.notify_layers(Some(id));
        }
        true
    }

    /// Append a layer on top and make it active.
    pub fn push_layer(&mut self, layer: Layer) -> LayerId {
        let index = self.order.len();
        self.insert_layer(index, layer)
    }

    /// Insert a layer at `index` (clamped) and make it active. Re-inserting a
    /// previously removed id keeps that id.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> LayerId {
        let id = layer.id;
        if self.layers.contains_key(&id) {
            log_warn!("Document::insert_layer: layer {} already present, replacing", id);
            self.order.retain(|l| *l != id);
        }
        self.next_layer_id = self.next_layer_id.max(id.0 + 1);
        let index = index.min(self.order.len());
        self.order.insert(index, id);
        self.layers.insert(id, layer);
        self.active = Some(id);
        self.notify_layers(Some(id));
        id
    }

    /// Add a new transparent canvas-sized layer on top.
    pub fn add_layer(&mut self, name: &str) -> LayerId {
        let id = self.alloc_layer_id();
        let layer = Layer::new(id, name.to_string(), self.width, self.height, Rgba([0, 0, 0, 0]));
        self.push_layer(layer)
    }

    /// Remove a layer, returning its former index and data.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<(usize, Layer)> {
        let index = self.index_of(id)?;
        self.order.remove(index);
        let layer = self.layers.remove(&id)?;
        if self.active == Some(id) {
            let next = index.min(self.order.len().saturating_sub(1));
            self.active = self.order.get(next).copied();
        }
        self.notify_layers(Some(id));
        Some((index, layer))
    }

    /// Move a layer to `to_index` in the stack (clamped).
    pub fn move_layer(&mut self, id: LayerId, to_index: usize) -> bool {
        let Some(from) = self.index_of(id) else {
            return false;
        };
        self.order.remove(from);
        let to = to_index.min(self.order.len());
        self.order.insert(to, id);
        self.notify_layers(Some(id));
        true
    }

    /// Replace the entire stack in one go (whole-canvas restore).
    pub(crate) fn replace_layers(&mut self, layers: Vec<Layer>, active: Option<LayerId>) {
        self.layers.clear();
        self.order.clear();
        for layer in layers {
            self.next_layer_id = self.next_layer_id.max(layer.id.0 + 1);
            self.order.push(layer.id);
            self.layers.insert(layer.id, layer);
        }
        self.active = active
            .filter(|id| self.layers.contains_key(id))
            .or_else(|| self.order.last().copied());
        self.notify_layers(None);
    }

    // ---- selection -----------------------------------------------------------

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    /// Mutable access for preview updates. Committed changes should go through
    /// [`Document::apply_selection`] / [`Document::restore_selection`] so the
    /// host gets notified.
    pub fn selection_mut(&mut self) -> &mut SelectionManager {
        &mut self.selection
    }

    pub fn has_selection(&self) -> bool {
        self.selection.has_selection()
    }

    /// Combine `path` into the committed selection.
    pub fn apply_selection(&mut self, path: &SelectionPath, mode: SelectionMode) -> bool {
        let changed = self.selection.apply_selection(path, mode);
        if changed {
            self.notify_selection();
        }
        changed
    }

    pub fn restore_selection(&mut self, state: &SelectionState) {
        if self.selection.snapshot() != *state {
            self.selection.restore(state);
            self.notify_selection();
        }
    }

    pub fn clear_selection(&mut self) -> bool {
        let changed = self.selection.clear();
        if changed {
            self.notify_selection();
        }
        changed
    }

    pub fn translate_selection(&mut self, dx: f32, dy: f32) -> bool {
        let changed = self.selection.translate(dx, dy);
        if changed {
            self.notify_selection();
        }
        changed
    }

    /// Mask of the committed selection, clipped to a layer's bounds. `None`
    /// when nothing is selected.
    pub fn selection_mask_for(&mut self, layer: LayerId) -> Option<Arc<SelectionMask>> {
        if !self.selection.has_selection() {
            return None;
        }
        let bounds = self.layers.get(&layer)?.bounds();
        Some(self.selection.mask_for(bounds))
    }

    // ---- notifications -------------------------------------------------------

    pub fn notify_pixels(&self, layer: LayerId, rect: PixelRect) {
        self.notifier.publish(EditorEvent::LayerPixelsChanged { layer, rect });
    }

    pub fn notify_layers(&self, affected: Option<LayerId>) {
        self.notifier.publish(EditorEvent::LayerStackChanged {
            layer_count: self.order.len(),
            active: self.active,
            affected,
        });
    }

    pub fn notify_selection(&self) {
        self.notifier.publish(EditorEvent::SelectionChanged {
            bounds: self.selection.bounds(),
            shape: self.selection.shape(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_clips_to_layer() {
        let layer = PixelRect::from_size(100, 100);
        let r = PixelRect::new(80, 80, 50, 50).intersect(&layer);
        assert_eq!(r, PixelRect::new(80, 80, 20, 20));
        let outside = PixelRect::new(150, 10, 5, 5).intersect(&layer);
        assert!(outside.is_empty());
        assert_eq!(outside.area(), 0);
    }

    #[test]
    fn rect_union_ignores_empty() {
        let a = PixelRect::new(1, 2, 3, 4);
        assert_eq!(a.union(&PixelRect::EMPTY), a);
        assert_eq!(PixelRect::EMPTY.union(&a), a);
        assert_eq!(a.union(&PixelRect::new(10, 10, 1, 1)), PixelRect::from_min_max(1, 2, 11, 11));
    }

    #[test]
    fn enclosing_rounds_outward() {
        let r = PixelRect::enclosing(Rect::from_min_max(pos2(1.2, 3.8), pos2(4.1, 5.0)));
        assert_eq!(r, PixelRect::from_min_max(1, 3, 5, 5));
    }

    #[test]
    fn blend_mode_byte_round_trip() {
        for mode in BlendMode::all() {
            assert_eq!(BlendMode::from_u8(mode.to_u8()), *mode);
        }
        assert_eq!(BlendMode::from_u8(200), BlendMode::Normal);
    }

    #[test]
    fn new_document_has_white_background() {
        let doc = Document::new(8, 4);
        assert_eq!(doc.layer_count(), 1);
        let bg = doc.active_layer().unwrap();
        assert_eq!(bg.name, "Background");
        assert_eq!(bg.pixels.as_raw().len(), 8 * 4 * 4);
        assert_eq!(bg.pixel(7, 3), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(bg.pixel(8, 0), None);
    }

    #[test]
    fn layer_ids_are_stable_across_remove_and_reinsert() {
        let mut doc = Document::new(4, 4);
        let a = doc.add_layer("A");
        let b = doc.add_layer("B");
        assert_eq!(doc.index_of(b), Some(2));

        let (index, layer) = doc.remove_layer(a).unwrap();
        assert_eq!(index, 1);
        assert_eq!(doc.index_of(b), Some(1));
        assert_eq!(doc.active_layer_id(), Some(b));

        doc.insert_layer(index, layer);
        assert_eq!(doc.index_of(a), Some(1));
        assert_eq!(doc.layer(a).unwrap().name, "A");

        let c = doc.add_layer("C");
        assert!(c.0 > b.0);
    }

    #[test]
    fn move_layer_clamps_index() {
        let mut doc = Document::new(2, 2);
        let bg = doc.layer_ids()[0];
        let a = doc.add_layer("A");
        assert!(doc.move_layer(bg, 99));
        assert_eq!(doc.layer_ids(), &[a, bg]);
        assert!(!doc.move_layer(LayerId(999), 0));
    }
}
