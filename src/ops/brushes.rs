// ============================================================================
// BRUSH DABS - solid / soft / stamp tips composited source-over
// ============================================================================

use std::sync::Arc;

use egui::{Pos2, Vec2};
use image::{GrayImage, Rgba};

use crate::canvas::PixelRect;

/// Tip strategy used to render one dab.
#[derive(Clone, Debug)]
pub enum Brush {
    /// Hard-edged disk.
    Solid,
    /// Gaussian falloff mixed with a hard disk. `hardness` 1 is a pure hard
    /// edge, 0 a pure Gaussian.
    Soft { hardness: f32 },
    /// Greyscale tip image stretched to the dab diameter; luminance is coverage.
    Stamp { tip: Arc<GrayImage> },
}

impl Default for Brush {
    fn default() -> Self {
        Brush::Soft { hardness: 0.75 }
    }
}

impl Brush {
    pub fn name(&self) -> &'static str {
        match self {
            Brush::Solid => "Solid",
            Brush::Soft { .. } => "Soft",
            Brush::Stamp { .. } => "Stamp",
        }
    }

    /// Blend one dab of diameter `size` centred at (`x`, `y`) into `target`
    /// (RGBA8, `target_w`×`target_h`). Pressure scales the effective alpha.
    /// Returns the clipped rect that was visited, `None` if nothing could be.
    pub fn render_dab(
        &self,
        target: &mut [u8],
        target_w: u32,
        target_h: u32,
        x: f32,
        y: f32,
        size: f32,
        color: Rgba<u8>,
        pressure: f32,
    ) -> Option<PixelRect> {
        let strength = color[3] as f32 / 255.0 * pressure.clamp(0.0, 1.0);
        self.for_each_covered(target, target_w, target_h, x, y, size, |px, coverage| {
            let a = (strength * coverage * 255.0).round().clamp(0.0, 255.0) as u8;
            if a == 0 {
                return;
            }
            let dst = Rgba([px[0], px[1], px[2], px[3]]);
            let out = alpha_blend(dst, Rgba([color[0], color[1], color[2], a]));
            px.copy_from_slice(&out.0);
        })
    }

    /// Reduce alpha under the dab. Pressure scales the amount removed.
    pub fn erase_dab(
        &self,
        target: &mut [u8],
        target_w: u32,
        target_h: u32,
        x: f32,
        y: f32,
        size: f32,
        pressure: f32,
    ) -> Option<PixelRect> {
        let strength = pressure.clamp(0.0, 1.0);
        self.for_each_covered(target, target_w, target_h, x, y, size, |px, coverage| {
            let keep = 1.0 - (strength * coverage).clamp(0.0, 1.0);
            px[3] = (px[3] as f32 * keep).round().clamp(0.0, 255.0) as u8;
            if px[3] == 0 {
                px[..3].fill(0);
            }
        })
    }

    /// Coverage (0..1) for a pixel centre at `offset` from the dab centre.
    fn coverage(&self, offset: Vec2, radius: f32, centre_pixel: bool) -> f32 {
        let dist = offset.length();
        // The pixel under the pointer is always covered so tiny brushes paint.
        let hard = if dist <= radius || centre_pixel { 1.0 } else { 0.0 };
        match self {
            Brush::Solid => hard,
            Brush::Soft { hardness } => {
                let h = hardness.clamp(0.0, 1.0);
                let sigma = (radius / 2.0).max(0.5);
                let gauss = if dist <= radius || centre_pixel {
                    (-(dist * dist) / (2.0 * sigma * sigma)).exp()
                } else {
                    0.0
                };
                h * hard + (1.0 - h) * gauss
            }
            Brush::Stamp { tip } => {
                let (tw, th) = tip.dimensions();
                if tw == 0 || th == 0 || radius <= 0.0 {
                    return 0.0;
                }
                let u = (offset.x + radius) / (2.0 * radius);
                let v = (offset.y + radius) / (2.0 * radius);
                if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                    return 0.0;
                }
                let tx = ((u * tw as f32) as u32).min(tw - 1);
                let ty = ((v * th as f32) as u32).min(th - 1);
                tip.get_pixel(tx, ty).0[0] as f32 / 255.0
            }
        }
    }

    fn for_each_covered(
        &self,
        target: &mut [u8],
        target_w: u32,
        target_h: u32,
        x: f32,
        y: f32,
        size: f32,
        mut f: impl FnMut(&mut [u8], f32),
    ) -> Option<PixelRect> {
        if size <= 0.0 || !x.is_finite() || !y.is_finite() {
            return None;
        }
        if target.len() < target_w as usize * target_h as usize * 4 {
            log_warn!("Brush::render_dab: buffer smaller than {}×{}", target_w, target_h);
            return None;
        }
        let radius = size / 2.0;
        let dab = PixelRect::from_min_max(
            (x - radius).floor() as i32,
            (y - radius).floor() as i32,
            (x + radius).ceil() as i32,
            (y + radius).ceil() as i32,
        );
        let rect = dab.intersect(&PixelRect::from_size(target_w, target_h));
        if rect.is_empty() {
            return None;
        }
        let (cx, cy) = (x.floor() as i32, y.floor() as i32);
        let stride = target_w as usize * 4;
        for py in rect.y..rect.bottom() {
            let row = py as usize * stride;
            for px in rect.x..rect.right() {
                let offset = Vec2::new(px as f32 + 0.5 - x, py as f32 + 0.5 - y);
                let coverage = self.coverage(offset, radius, px == cx && py == cy);
                if coverage <= 0.0 {
                    continue;
                }
                let i = row + px as usize * 4;
                f(&mut target[i..i + 4], coverage);
            }
        }
        Some(rect)
    }
}

/// Straight-alpha Porter-Duff source-over.
pub fn alpha_blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 || dst[3] == 0 {
        return src;
    }
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }
    let inv = 1.0 / out_a;
    Rgba([
        ((src[0] as f32 * sa + dst[0] as f32 * da * (1.0 - sa)) * inv).round().clamp(0.0, 255.0) as u8,
        ((src[1] as f32 * sa + dst[1] as f32 * da * (1.0 - sa)) * inv).round().clamp(0.0, 255.0) as u8,
        ((src[2] as f32 * sa + dst[2] as f32 * da * (1.0 - sa)) * inv).round().clamp(0.0, 255.0) as u8,
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

// ============================================================================
// STROKE INTERPOLATION
// ============================================================================

/// Emits evenly spaced dab positions along consecutive pointer samples,
/// carrying the leftover distance between segments.
#[derive(Clone, Debug, Default)]
pub struct StrokeInterpolator {
    last: Option<Pos2>,
    /// Distance travelled since the last emitted dab.
    travelled: f32,
}

impl StrokeInterpolator {
    /// Start a stroke; the first dab goes at `pos`.
    pub fn begin(&mut self, pos: Pos2) -> Pos2 {
        self.last = Some(pos);
        self.travelled = 0.0;
        pos
    }

    /// Dab positions between the previous sample and `pos`.
    pub fn advance(&mut self, pos: Pos2, spacing: f32) -> Vec<Pos2> {
        let Some(last) = self.last else {
            return vec![self.begin(pos)];
        };
        let spacing = spacing.max(0.5);
        let seg = pos - last;
        let len = seg.length();
        if len <= f32::EPSILON {
            return Vec::new();
        }
        let dir = seg / len;
        let mut out = Vec::new();
        let mut t = spacing - self.travelled;
        while t <= len {
            out.push(last + dir * t);
            t += spacing;
        }
        self.travelled = len - (t - spacing);
        self.last = Some(pos);
        out
    }

    pub fn end(&mut self) {
        self.last = None;
        self.travelled = 0.0;
    }
}

/// Dab spacing in pixels for a brush `size` and a spacing fraction.
pub fn dab_spacing(size: f32, fraction: f32) -> f32 {
    (size * fraction).max(1.0)
}
