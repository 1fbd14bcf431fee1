// ============================================================================
// CANVAS-LEVEL OPERATIONS - crop / resize, add / delete / duplicate layers
// ============================================================================
//
// Every function here builds an undoable command from the current document
// without mutating it; the caller hands the result to `CommandBus::dispatch`,
// which applies it. `None` means the edit would change nothing.

use egui::Pos2;
use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::canvas::{Document, Layer, LayerId, PixelRect};
use crate::components::history::{
    CanvasSnapshot, CanvasSnapshotCommand, Command, LayerOpCommand, LayerOperation,
};
use crate::ops::transform::Interpolation;
use crate::selection::SelectionState;

fn boxed<C: Command + 'static>(cmd: C) -> Option<Box<dyn Command>> {
    Some(Box::new(cmd))
}

/// After-state sharing the document's layer ids and active layer.
fn canvas_after(doc: &Document, width: u32, height: u32, layers: Vec<Layer>, selection: SelectionState) -> CanvasSnapshot {
    CanvasSnapshot {
        width,
        height,
        layers,
        active: doc.active_layer_id(),
        selection,
    }
}

fn translated_selection(doc: &Document, dx: i32, dy: i32) -> SelectionState {
    let current = doc.selection().snapshot();
    if current.is_empty() || (dx == 0 && dy == 0) {
        return current;
    }
    SelectionState {
        path: current.path.translated(dx as f32, dy as f32),
        shape: current.shape,
    }
}

// ============================================================================
// CROP
// ============================================================================

/// Crop every layer to `rect` (clipped to the canvas). The selection moves
/// with the content.
pub fn crop_to_rect(doc: &Document, rect: PixelRect) -> Option<Box<dyn Command>> {
    let rect = rect.intersect(&doc.bounds());
    if rect.is_empty() || rect == doc.bounds() {
        return None;
    }
    let (w, h) = (rect.width as u32, rect.height as u32);
    let layers: Vec<Layer> = doc
        .layers()
        .map(|layer| {
            let mut out = layer.clone();
            out.pixels = crop_layer_pixels(&layer.pixels, rect);
            out
        })
        .collect();
    let selection = translated_selection(doc, -rect.x, -rect.y);
    log_info!("crop_to_rect: {}×{} → {}×{} at ({}, {})", doc.width(), doc.height(), w, h, rect.x, rect.y);
    let after = canvas_after(doc, w, h, layers, selection);
    boxed(CanvasSnapshotCommand::new("Crop", doc).with_after(after))
}

/// Crop to the bounding box of the committed selection, then drop the
/// selection. `None` without a selection.
pub fn crop_to_selection(doc: &Document) -> Option<Box<dyn Command>> {
    let bounds = doc.selection().bounds()?;
    let rect = bounds.intersect(&doc.bounds());
    if rect.is_empty() {
        return None;
    }
    let (w, h) = (rect.width as u32, rect.height as u32);
    let layers: Vec<Layer> = doc
        .layers()
        .map(|layer| {
            let mut out = layer.clone();
            out.pixels = crop_layer_pixels(&layer.pixels, rect);
            out
        })
        .collect();
    log_info!("crop_to_selection: {}×{} → {}×{}", doc.width(), doc.height(), w, h);
    let after = canvas_after(doc, w, h, layers, SelectionState::default());
    boxed(CanvasSnapshotCommand::new("Crop to Selection", doc).with_after(after))
}

fn crop_layer_pixels(pixels: &RgbaImage, rect: PixelRect) -> RgbaImage {
    let clipped = rect.intersect(&PixelRect::from_size(pixels.width(), pixels.height()));
    let mut out = RgbaImage::new(rect.width as u32, rect.height as u32);
    if clipped.is_empty() {
        return out;
    }
    let view = imageops::crop_imm(
        pixels,
        clipped.x as u32,
        clipped.y as u32,
        clipped.width as u32,
        clipped.height as u32,
    );
    imageops::replace(&mut out, &view.to_image(), (clipped.x - rect.x) as i64, (clipped.y - rect.y) as i64);
    out
}

// ============================================================================
// RESIZE
// ============================================================================

/// Offset of the old content inside the new canvas for an anchor
/// (0 = start, 1 = centre, 2 = end) along one axis.
pub fn anchor_offset(anchor: u32, old: u32, new: u32) -> i32 {
    match anchor {
        0 => 0,
        1 => (new as i32 - old as i32) / 2,
        _ => new as i32 - old as i32,
    }
}

/// Change the canvas size without scaling content. New area is filled with
/// `fill`; `anchor` places the old content per axis.
pub fn resize_canvas(
    doc: &Document,
    width: u32,
    height: u32,
    anchor: (u32, u32),
    fill: Rgba<u8>,
) -> Option<Box<dyn Command>> {
    if width == 0 || height == 0 || (width == doc.width() && height == doc.height()) {
        return None;
    }
    let offset_x = anchor_offset(anchor.0, doc.width(), width);
    let offset_y = anchor_offset(anchor.1, doc.height(), height);

    let layers: Vec<Layer> = doc
        .layers()
        .map(|layer| {
            let mut out = layer.clone();
            out.pixels = shift_into(&layer.pixels, width, height, offset_x, offset_y, fill);
            out
        })
        .collect();
    let selection = translated_selection(doc, offset_x, offset_y);
    log_info!(
        "resize_canvas: {}×{} → {}×{}, anchor {:?}",
        doc.width(),
        doc.height(),
        width,
        height,
        anchor
    );
    let after = canvas_after(doc, width, height, layers, selection);
    boxed(CanvasSnapshotCommand::new("Resize Canvas", doc).with_after(after))
}

fn shift_into(src: &RgbaImage, width: u32, height: u32, offset_x: i32, offset_y: i32, fill: Rgba<u8>) -> RgbaImage {
    let (sw, sh) = (src.width() as i32, src.height() as i32);
    let row_bytes = width as usize * 4;
    let mut data = vec![0u8; row_bytes * height as usize];
    data.par_chunks_mut(row_bytes).enumerate().for_each(|(y, row)| {
        let sy = y as i32 - offset_y;
        for x in 0..width as i32 {
            let sx = x - offset_x;
            let px = if sx >= 0 && sy >= 0 && sx < sw && sy < sh {
                *src.get_pixel(sx as u32, sy as u32)
            } else {
                fill
            };
            let i = x as usize * 4;
            row[i..i + 4].copy_from_slice(&px.0);
        }
    });
    RgbaImage::from_raw(width, height, data).unwrap_or_else(|| RgbaImage::from_pixel(width, height, fill))
}

/// Scale every layer to `width`×`height`. The selection path scales along.
pub fn resize_image(doc: &Document, width: u32, height: u32, interpolation: Interpolation) -> Option<Box<dyn Command>> {
    if width == 0 || height == 0 || (width == doc.width() && height == doc.height()) {
        return None;
    }
    let filter = interpolation.to_filter();
    let layers: Vec<Layer> = doc
        .layers()
        .collect::<Vec<_>>()
        .par_iter()
        .map(|layer| {
            let mut out = (*layer).clone();
            out.pixels = imageops::resize(&layer.pixels, width, height, filter);
            out
        })
        .collect();

    let sx = width as f32 / doc.width() as f32;
    let sy = height as f32 / doc.height() as f32;
    let current = doc.selection().snapshot();
    let selection = if current.is_empty() {
        current
    } else {
        SelectionState {
            path: current.path.map_points(|p| Pos2::new(p.x * sx, p.y * sy)),
            shape: current.shape,
        }
    };
    log_info!(
        "resize_image: {}×{} → {}×{} ({})",
        doc.width(),
        doc.height(),
        width,
        height,
        interpolation.name()
    );
    let after = canvas_after(doc, width, height, layers, selection);
    boxed(CanvasSnapshotCommand::new("Resize Image", doc).with_after(after))
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Add a new transparent layer above the active layer.
pub fn add_layer(doc: &mut Document) -> Option<Box<dyn Command>> {
    let index = doc
        .active_layer_id()
        .and_then(|id| doc.index_of(id))
        .map_or(doc.layer_count(), |i| i + 1);
    let name = format!("Layer {}", doc.layer_count() + 1);
    let id = doc.alloc_layer_id();
    boxed(LayerOpCommand::new(LayerOperation::Add {
        id,
        index,
        name,
        width: doc.width(),
        height: doc.height(),
    }))
}

/// Delete a layer (must keep at least one layer).
pub fn delete_layer(doc: &Document, id: LayerId) -> Option<Box<dyn Command>> {
    if doc.layer_count() <= 1 {
        return None;
    }
    let index = doc.index_of(id)?;
    let layer = doc.layer(id)?.clone();
    boxed(LayerOpCommand::new(LayerOperation::Delete { index, layer }))
}

/// Duplicate a layer directly above itself.
pub fn duplicate_layer(doc: &mut Document, id: LayerId) -> Option<Box<dyn Command>> {
    let index = doc.index_of(id)?;
    let src = doc.layer(id)?.clone();
    let new_id = doc.alloc_layer_id();
    let mut dup = src;
    dup.id = new_id;
    dup.name = format!("{} Copy", dup.name);
    boxed(LayerOpCommand::new(LayerOperation::Duplicate {
        source: id,
        new_index: index + 1,
        layer: dup,
    }))
}

pub fn move_layer(doc: &Document, id: LayerId, to_index: usize) -> Option<Box<dyn Command>> {
    let from_index = doc.index_of(id)?;
    let to_index = to_index.min(doc.layer_count().saturating_sub(1));
    if from_index == to_index {
        return None;
    }
    boxed(LayerOpCommand::new(LayerOperation::Move { id, from_index, to_index }))
}

pub fn set_layer_opacity(doc: &Document, id: LayerId, opacity: f32) -> Option<Box<dyn Command>> {
    let old_opacity = doc.layer(id)?.opacity;
    let new_opacity = opacity.clamp(0.0, 1.0);
    if (old_opacity - new_opacity).abs() < f32::EPSILON {
        return None;
    }
    boxed(LayerOpCommand::new(LayerOperation::Opacity {
        id,
        old_opacity,
        new_opacity,
    }))
}

pub fn set_layer_visibility(doc: &Document, id: LayerId, visible: bool) -> Option<Box<dyn Command>> {
    let was_visible = doc.layer(id)?.visible;
    if was_visible == visible {
        return None;
    }
    boxed(LayerOpCommand::new(LayerOperation::Visibility { id, was_visible }))
}

pub fn rename_layer(doc: &Document, id: LayerId, name: &str) -> Option<Box<dyn Command>> {
    let old_name = doc.layer(id)?.name.clone();
    if old_name == name || name.is_empty() {
        return None;
    }
    boxed(LayerOpCommand::new(LayerOperation::Rename {
        id,
        old_name,
        new_name: name.to_string(),
    }))
}
