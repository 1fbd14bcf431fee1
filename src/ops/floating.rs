// ============================================================================
// FLOATING BUFFER - pixels lifted out of a layer for move / transform
// ============================================================================

use std::sync::Arc;

use egui::Pos2;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{Layer, PixelRect};
use crate::io::MAX_DIMENSION;
use crate::ops::brushes::alpha_blend;
use crate::ops::transform::TransformState;
use crate::selection::{SelectionMask, SelectionPath, SelectionShape, rasterize};

/// Owned copy of the selected pixels of a layer. `mask` covers exactly
/// `source_rect` and is the mask used at extraction time; unselected pixels of
/// `pixels` are fully transparent.
#[derive(Clone, Debug)]
pub struct FloatingBuffer {
    pixels: RgbaImage,
    source_rect: PixelRect,
    mask: Arc<SelectionMask>,
}

impl FloatingBuffer {
    /// Rasterize `path` against the layer and copy the selected pixels.
    /// `None` when nothing of the path lands on the layer.
    pub fn extract_from_layer(layer: &Layer, path: &SelectionPath, shape: SelectionShape) -> Option<Self> {
        let mask = rasterize(path, shape, layer.bounds());
        Self::extract_with_mask(layer, Arc::new(mask))
    }

    /// Copy the pixels selected by an already rasterized mask.
    pub fn extract_with_mask(layer: &Layer, mask: Arc<SelectionMask>) -> Option<Self> {
        let rect = mask.rect().intersect(&layer.bounds());
        if rect.is_empty() || rect != mask.rect() || mask.selected_count() == 0 {
            return None;
        }
        let mut pixels = RgbaImage::new(rect.width as u32, rect.height as u32);
        for row in 0..rect.height {
            for col in 0..rect.width {
                if !mask.get(col, row) {
                    continue;
                }
                let src = layer.pixels.get_pixel((rect.x + col) as u32, (rect.y + row) as u32);
                pixels.put_pixel(col as u32, row as u32, *src);
            }
        }
        Some(Self {
            pixels,
            source_rect: rect,
            mask,
        })
    }

    /// Zero the selected pixels in the layer the buffer was lifted from.
    /// Uses the extraction mask, so the cleared set is exactly the copied set.
    pub fn clear_source_pixels(&self, layer: &mut Layer) -> PixelRect {
        let rect = self.source_rect.intersect(&layer.bounds());
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if self.mask.contains(x, y) {
                    layer.pixels.put_pixel(x as u32, y as u32, Rgba([0, 0, 0, 0]));
                }
            }
        }
        rect
    }

    /// Composite the selected pixels onto `layer` at `source_rect` origin plus
    /// `offset`. Pixels landing outside the layer are dropped. Returns the
    /// touched rect (possibly empty).
    pub fn paste_to_layer(&self, layer: &mut Layer, offset: (i32, i32)) -> PixelRect {
        let dest = self.source_rect.translate(offset.0, offset.1);
        let clipped = dest.intersect(&layer.bounds());
        for y in clipped.y..clipped.bottom() {
            let row = y - dest.y;
            for x in clipped.x..clipped.right() {
                let col = x - dest.x;
                if !self.mask.get(col, row) {
                    continue;
                }
                let src = *self.pixels.get_pixel(col as u32, row as u32);
                let dst = *layer.pixels.get_pixel(x as u32, y as u32);
                layer.pixels.put_pixel(x as u32, y as u32, alpha_blend(dst, src));
            }
        }
        clipped
    }

    /// Resampled copy at the given scale factors, anchored at the same origin.
    /// Pixels are bilinear, the mask nearest-neighbour. The stored buffer is
    /// left untouched. Each side ends up in `1..=MAX_DIMENSION`.
    pub fn get_scaled(&self, scale_x: f32, scale_y: f32) -> FloatingBuffer {
        let w = self.pixels.width();
        let h = self.pixels.height();
        let nw = scaled_side(w, scale_x);
        let nh = scaled_side(h, scale_y);
        if nw == w && nh == h {
            return self.clone();
        }
        let sx = w as f32 / nw as f32;
        let sy = h as f32 / nh as f32;
        let rect = PixelRect::new(self.source_rect.x, self.source_rect.y, nw as i32, nh as i32);
        self.resample(rect, |x, y| {
            Some(Pos2::new((x as f32 + 0.5) * sx - 0.5, (y as f32 + 0.5) * sy - 0.5))
        })
    }

    /// The buffer as it lands after `transform`, positioned in canvas space.
    /// Pure translations shift without resampling.
    pub fn transformed(&self, transform: &TransformState) -> FloatingBuffer {
        if transform.is_translation_only() {
            let (dx, dy) = transform.pixel_offset();
            return FloatingBuffer {
                pixels: self.pixels.clone(),
                source_rect: self.source_rect.translate(dx, dy),
                mask: Arc::new(self.mask.translated(dx, dy)),
            };
        }

        if transform.rotation.abs() < 1e-4 {
            let rect = transform.current_rect();
            let scaled = self.get_scaled(
                rect.width() / self.width() as f32,
                rect.height() / self.height() as f32,
            );
            let dx = rect.min.x.round() as i32 - scaled.source_rect.x;
            let dy = rect.min.y.round() as i32 - scaled.source_rect.y;
            return FloatingBuffer {
                source_rect: scaled.source_rect.translate(dx, dy),
                mask: Arc::new(scaled.mask.translated(dx, dy)),
                pixels: scaled.pixels,
            };
        }

        // Shave float noise so an exact quarter turn does not grow a pixel.
        let dest = PixelRect::enclosing(transform.current_rect().shrink(1e-3));
        if dest.is_empty() {
            let rect = PixelRect::new(dest.x, dest.y, 1, 1);
            return FloatingBuffer {
                pixels: RgbaImage::new(1, 1),
                source_rect: rect,
                mask: Arc::new(SelectionMask::from_bits(rect, vec![false]).unwrap_or_else(SelectionMask::empty)),
            };
        }
        let origin = self.source_rect;
        self.resample(dest, |x, y| {
            let canvas = Pos2::new((dest.x + x) as f32 + 0.5, (dest.y + y) as f32 + 0.5);
            transform
                .unmap_point(canvas)
                .map(|p| Pos2::new(p.x - origin.x as f32 - 0.5, p.y - origin.y as f32 - 0.5))
        })
    }

    /// Fill `rect` by sampling this buffer at the source-local position
    /// `locate(col, row)` returns (pixel-centre convention).
    fn resample<F>(&self, rect: PixelRect, locate: F) -> FloatingBuffer
    where
        F: Fn(i32, i32) -> Option<Pos2> + Sync,
    {
        let w = self.pixels.width();
        let h = self.pixels.height();
        let out_w = rect.width as usize;
        let mut data = vec![0u8; rect.area() * 4];
        let mut bits = vec![false; rect.area()];

        data.par_chunks_mut(out_w * 4)
            .zip(bits.par_chunks_mut(out_w))
            .enumerate()
            .for_each(|(row, (pixel_row, mask_row))| {
                for col in 0..out_w {
                    let Some(p) = locate(col as i32, row as i32) else {
                        continue;
                    };
                    let mx = (p.x + 0.5).floor() as i32;
                    let my = (p.y + 0.5).floor() as i32;
                    if !self.mask.get(mx, my) {
                        continue;
                    }
                    let px = sample_bilinear(&self.pixels, p.x, p.y, w, h);
                    mask_row[col] = true;
                    pixel_row[col * 4..col * 4 + 4].copy_from_slice(&px.0);
                }
            });

        let pixels = RgbaImage::from_raw(rect.width as u32, rect.height as u32, data)
            .unwrap_or_else(|| RgbaImage::new(rect.width as u32, rect.height as u32));
        let mask = SelectionMask::from_bits(rect, bits).unwrap_or_else(|| SelectionMask::full(rect));
        FloatingBuffer {
            pixels,
            source_rect: rect,
            mask: Arc::new(mask),
        }
    }

    pub fn source_rect(&self) -> PixelRect {
        self.source_rect
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn mask(&self) -> &Arc<SelectionMask> {
        &self.mask
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Bilinear sample at a fractional position, clamping to the edge.
fn scaled_side(side: u32, scale: f32) -> u32 {
    // NaN casts to 0 and lands on the lower bound.
    ((side as f32 * scale).round().min(MAX_DIMENSION as f32) as u32).max(1)
}

fn sample_bilinear(img: &RgbaImage, x: f32, y: f32, w: u32, h: u32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        let cx = sx.clamp(0, w as i32 - 1) as u32;
        let cy = sy.clamp(0, h as i32 - 1) as u32;
        let p = img.get_pixel(cx, cy).0;
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let p00 = sample(x0, y0);
    let p10 = sample(x0 + 1, y0);
    let p01 = sample(x0, y0 + 1);
    let p11 = sample(x0 + 1, y0 + 1);

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let mut out = [0u8; 4];
    for (i, c) in out.iter_mut().enumerate() {
        *c = (p00[i] * w00 + p10[i] * w10 + p01[i] * w01 + p11[i] * w11)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
