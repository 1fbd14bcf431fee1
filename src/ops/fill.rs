// ============================================================================
// FLOOD FILL - stack-based scanline bucket fill
// ============================================================================

use image::{Rgba, RgbaImage};

use crate::canvas::PixelRect;
use crate::selection::SelectionMask;

/// Outcome of a flood fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FillResult {
    pub painted: usize,
    pub bounds: Option<PixelRect>,
}

/// Map a 0–100 % tolerance to the 0–255 per-channel distance used by
/// [`colors_match`].
pub fn tolerance_from_percent(percent: f32) -> f32 {
    (percent.clamp(0.0, 100.0) / 100.0) * 255.0
}

/// Max per-channel distance (alpha included) within `tolerance`. Two fully
/// transparent pixels always match whatever their colour channels hold.
pub fn colors_match(a: &Rgba<u8>, b: &Rgba<u8>, tolerance: f32) -> bool {
    if a.0[3] == 0 && b.0[3] == 0 {
        return true;
    }
    if a.0[3] == 0 || b.0[3] == 0 {
        return (a.0[3] as f32 - b.0[3] as f32).abs() <= tolerance;
    }
    let r = (a.0[0] as f32 - b.0[0] as f32).abs();
    let g = (a.0[1] as f32 - b.0[1] as f32).abs();
    let bl = (a.0[2] as f32 - b.0[2] as f32).abs();
    let al = (a.0[3] as f32 - b.0[3] as f32).abs();
    r.max(g).max(bl).max(al) <= tolerance
}

/// Fill the 4-connected region around (`x`, `y`) whose colour matches the
/// origin pixel within `tolerance`. With a `mask`, only selected pixels are
/// candidates. Filling a region that already holds `fill` paints nothing.
pub fn flood_fill(
    pixels: &mut RgbaImage,
    x: i32,
    y: i32,
    fill: Rgba<u8>,
    tolerance: f32,
    mask: Option<&SelectionMask>,
) -> FillResult {
    let (w, h) = (pixels.width() as i32, pixels.height() as i32);
    if x < 0 || y < 0 || x >= w || y >= h {
        return FillResult::default();
    }
    if let Some(m) = mask
        && !m.contains(x, y)
    {
        return FillResult::default();
    }
    let origin = *pixels.get_pixel(x as u32, y as u32);
    if origin == fill {
        return FillResult::default();
    }

    let wu = w as usize;
    let mut visited = vec![false; wu * h as usize];
    let fillable = |img: &RgbaImage, visited: &[bool], px: i32, py: i32| -> bool {
        !visited[py as usize * wu + px as usize]
            && mask.is_none_or(|m| m.contains(px, py))
            && colors_match(&origin, img.get_pixel(px as u32, py as u32), tolerance)
    };

    let mut painted = 0usize;
    let mut bounds = PixelRect::EMPTY;
    let mut stack: Vec<(i32, i32)> = Vec::with_capacity(256);
    stack.push((x, y));

    while let Some((sx, sy)) = stack.pop() {
        if !fillable(pixels, &visited, sx, sy) {
            continue;
        }
        let mut lx = sx;
        while lx > 0 && fillable(pixels, &visited, lx - 1, sy) {
            lx -= 1;
        }
        let mut rx = sx;
        while rx + 1 < w && fillable(pixels, &visited, rx + 1, sy) {
            rx += 1;
        }

        for px in lx..=rx {
            visited[sy as usize * wu + px as usize] = true;
            pixels.put_pixel(px as u32, sy as u32, fill);
        }
        painted += (rx - lx + 1) as usize;
        bounds = bounds.union(&PixelRect::from_min_max(lx, sy, rx + 1, sy + 1));

        // One seed per contiguous matching run above and below the span.
        for ny in [sy - 1, sy + 1] {
            if ny < 0 || ny >= h {
                continue;
            }
            let mut in_run = false;
            for px in lx..=rx {
                if fillable(pixels, &visited, px, ny) {
                    if !in_run {
                        stack.push((px, ny));
                        in_run = true;
                    }
                } else {
                    in_run = false;
                }
            }
        }
    }

    FillResult {
        painted,
        bounds: if painted > 0 { Some(bounds) } else { None },
    }
}
