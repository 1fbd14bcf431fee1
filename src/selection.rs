// ============================================================================
// SELECTION SYSTEM - geometric paths, shape-keyed mask rasterization
// ============================================================================

use std::sync::Arc;

use egui::{Pos2, Rect, pos2};
use image::GrayImage;
use rayon::prelude::*;

use crate::canvas::PixelRect;

/// Cubic Bézier control-point distance for a quarter circle.
const KAPPA: f32 = 0.552_284_8;

/// Segments used when flattening one cubic curve.
const CURVE_SEGMENTS: usize = 16;

/// Kind byte of a stored path element. Values are persisted in project files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathElementKind {
    /// Starts an additive subpath.
    MoveTo,
    LineTo,
    /// First control point of a cubic; followed by two `CurveToData`.
    CurveTo,
    /// Second control point and end point of a cubic.
    CurveToData,
    /// Starts a subpath whose interior is removed from what came before.
    SubtractMoveTo,
}

impl PathElementKind {
    pub fn to_u8(self) -> u8 {
        match self {
            PathElementKind::MoveTo => 0,
            PathElementKind::LineTo => 1,
            PathElementKind::CurveTo => 2,
            PathElementKind::CurveToData => 3,
            PathElementKind::SubtractMoveTo => 4,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PathElementKind::MoveTo),
            1 => Some(PathElementKind::LineTo),
            2 => Some(PathElementKind::CurveTo),
            3 => Some(PathElementKind::CurveToData),
            4 => Some(PathElementKind::SubtractMoveTo),
            _ => None,
        }
    }

    fn starts_subpath(self) -> bool {
        matches!(self, PathElementKind::MoveTo | PathElementKind::SubtractMoveTo)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathElement {
    pub kind: PathElementKind,
    pub x: f32,
    pub y: f32,
}

impl PathElement {
    pub fn new(kind: PathElementKind, x: f32, y: f32) -> Self {
        Self { kind, x, y }
    }

    pub fn pos(&self) -> Pos2 {
        pos2(self.x, self.y)
    }
}

/// One flattened subpath: closed polygon plus whether it adds or removes.
#[derive(Clone, Debug, PartialEq)]
pub struct Subpath {
    pub additive: bool,
    pub points: Vec<Pos2>,
}

// ============================================================================
// SELECTION PATH
// ============================================================================

/// Ordered list of move/line/curve elements in canvas coordinates. Subpaths
/// are implicitly closed and filled even-odd, then composed in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionPath {
    elements: Vec<PathElement>,
}

impl SelectionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<PathElement>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn move_to(&mut self, p: Pos2) -> &mut Self {
        self.elements.push(PathElement::new(PathElementKind::MoveTo, p.x, p.y));
        self
    }

    pub fn line_to(&mut self, p: Pos2) -> &mut Self {
        self.elements.push(PathElement::new(PathElementKind::LineTo, p.x, p.y));
        self
    }

    pub fn cubic_to(&mut self, c1: Pos2, c2: Pos2, end: Pos2) -> &mut Self {
        self.elements.push(PathElement::new(PathElementKind::CurveTo, c1.x, c1.y));
        self.elements.push(PathElement::new(PathElementKind::CurveToData, c2.x, c2.y));
        self.elements.push(PathElement::new(PathElementKind::CurveToData, end.x, end.y));
        self
    }

    /// Quadratic curve, stored as the equivalent cubic.
    pub fn quad_to(&mut self, ctrl: Pos2, end: Pos2) -> &mut Self {
        let start = self.current_point().unwrap_or(ctrl);
        let c1 = start + (ctrl - start) * (2.0 / 3.0);
        let c2 = end + (ctrl - end) * (2.0 / 3.0);
        self.cubic_to(c1, c2, end)
    }

    /// Close the current subpath with a line back to its start point.
    pub fn close(&mut self) -> &mut Self {
        let start = self
            .elements
            .iter()
            .rposition(|e| e.kind.starts_subpath())
            .map(|i| self.elements[i].pos());
        if let (Some(start), Some(current)) = (start, self.current_point())
            && start != current
        {
            self.line_to(start);
        }
        self
    }

    fn current_point(&self) -> Option<Pos2> {
        self.elements.last().map(|e| e.pos())
    }

    /// Axis-aligned rectangle spanned by two corner points (any order).
    pub fn rect(a: Pos2, b: Pos2) -> Self {
        let r = Rect::from_two_pos(a, b);
        let mut path = Self::new();
        path.move_to(r.left_top())
            .line_to(r.right_top())
            .line_to(r.right_bottom())
            .line_to(r.left_bottom())
            .line_to(r.left_top());
        path
    }

    /// Ellipse inscribed in the rectangle spanned by two corner points, as
    /// four cubic arcs starting at the rightmost point.
    pub fn ellipse(a: Pos2, b: Pos2) -> Self {
        let r = Rect::from_two_pos(a, b);
        let (cx, cy) = (r.center().x, r.center().y);
        let (rx, ry) = (r.width() * 0.5, r.height() * 0.5);
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);
        let mut path = Self::new();
        path.move_to(pos2(cx + rx, cy))
            .cubic_to(pos2(cx + rx, cy + ky), pos2(cx + kx, cy + ry), pos2(cx, cy + ry))
            .cubic_to(pos2(cx - kx, cy + ry), pos2(cx - rx, cy + ky), pos2(cx - rx, cy))
            .cubic_to(pos2(cx - rx, cy - ky), pos2(cx - kx, cy - ry), pos2(cx, cy - ry))
            .cubic_to(pos2(cx + kx, cy - ry), pos2(cx + rx, cy - ky), pos2(cx + rx, cy));
        path
    }

    /// Closed polygon through the given points (lasso).
    pub fn polygon(points: &[Pos2]) -> Self {
        let mut path = Self::new();
        let Some((first, rest)) = points.split_first() else {
            return path;
        };
        path.move_to(*first);
        for p in rest {
            path.line_to(*p);
        }
        path.close();
        path
    }

    /// Flatten curves and split into closed polygons.
    pub fn subpaths(&self) -> Vec<Subpath> {
        let mut out: Vec<Subpath> = Vec::new();
        let els = &self.elements;
        let mut i = 0;
        while i < els.len() {
            let e = els[i];
            match e.kind {
                PathElementKind::MoveTo | PathElementKind::SubtractMoveTo => {
                    out.push(Subpath {
                        additive: e.kind == PathElementKind::MoveTo,
                        points: vec![e.pos()],
                    });
                    i += 1;
                }
                PathElementKind::CurveTo
                    if i + 2 < els.len()
                        && els[i + 1].kind == PathElementKind::CurveToData
                        && els[i + 2].kind == PathElementKind::CurveToData =>
                {
                    let current = current_subpath(&mut out, e.pos());
                    let start = current.points.last().copied().unwrap_or(e.pos());
                    let (c1, c2, end) = (e.pos(), els[i + 1].pos(), els[i + 2].pos());
                    for s in 1..=CURVE_SEGMENTS {
                        let t = s as f32 / CURVE_SEGMENTS as f32;
                        current.points.push(cubic_point(start, c1, c2, end, t));
                    }
                    i += 3;
                }
                _ => {
                    // Lines, and malformed curve data degrade to lines.
                    current_subpath(&mut out, e.pos()).points.push(e.pos());
                    i += 1;
                }
            }
        }
        out
    }

    /// Float bounds of the additive subpaths, `None` if there are none.
    pub fn bounds(&self) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        for sub in self.subpaths().iter().filter(|s| s.additive) {
            for p in &sub.points {
                bounds = Some(match bounds {
                    Some(b) => b.union(Rect::from_min_max(*p, *p)),
                    None => Rect::from_min_max(*p, *p),
                });
            }
        }
        bounds
    }

    /// Smallest pixel rectangle enclosing [`SelectionPath::bounds`].
    pub fn pixel_bounds(&self) -> Option<PixelRect> {
        self.bounds().map(PixelRect::enclosing)
    }

    /// True when the path selects no area at all.
    pub fn is_degenerate(&self) -> bool {
        match self.bounds() {
            Some(b) => b.width() <= f32::EPSILON || b.height() <= f32::EPSILON,
            None => true,
        }
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        self.map_points(|p| pos2(p.x + dx, p.y + dy))
    }

    /// Apply a point transform to every element.
    pub fn map_points(&self, f: impl Fn(Pos2) -> Pos2) -> Self {
        Self {
            elements: self
                .elements
                .iter()
                .map(|e| {
                    let p = f(e.pos());
                    PathElement::new(e.kind, p.x, p.y)
                })
                .collect(),
        }
    }

    /// `self ∪ other`: other's subpaths are appended unchanged.
    pub fn union(&self, other: &SelectionPath) -> Self {
        let mut elements = self.elements.clone();
        elements.extend_from_slice(&other.elements);
        Self { elements }
    }

    /// `self − other`: every subpath of `other` is appended as a subtractive
    /// subpath. Subtracting from an empty path yields an empty path.
    pub fn subtract(&self, other: &SelectionPath) -> Self {
        if self.is_empty() {
            return Self::new();
        }
        let mut elements = self.elements.clone();
        elements.extend(other.elements.iter().map(|e| {
            let kind = if e.kind.starts_subpath() {
                PathElementKind::SubtractMoveTo
            } else {
                e.kind
            };
            PathElement::new(kind, e.x, e.y)
        }));
        Self { elements }
    }
}

fn current_subpath(out: &mut Vec<Subpath>, fallback: Pos2) -> &mut Subpath {
    if out.is_empty() {
        out.push(Subpath {
            additive: true,
            points: vec![fallback],
        });
    }
    let last = out.len() - 1;
    &mut out[last]
}

fn cubic_point(p0: Pos2, p1: Pos2, p2: Pos2, p3: Pos2, t: f32) -> Pos2 {
    let mt = 1.0 - t;
    let a = mt * mt * mt;
    let b = 3.0 * mt * mt * t;
    let c = 3.0 * mt * t * t;
    let d = t * t * t;
    pos2(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}

// ============================================================================
// SHAPE TAG & MODE
// ============================================================================

/// Picks the rasterization strategy for a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum SelectionShape {
    Rectangle,
    Ellipse,
    #[default]
    Freeform,
}

impl SelectionShape {
    /// Recognise the exact rectangle / ellipse forms produced by
    /// [`SelectionPath::rect`] and [`SelectionPath::ellipse`]; anything else is
    /// freeform.
    pub fn classify(path: &SelectionPath) -> Self {
        if is_rect_path(path) {
            SelectionShape::Rectangle
        } else if is_ellipse_path(path) {
            SelectionShape::Ellipse
        } else {
            SelectionShape::Freeform
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionShape::Rectangle => "Rectangle",
            SelectionShape::Ellipse => "Ellipse",
            SelectionShape::Freeform => "Freeform",
        }
    }
}

fn is_rect_path(path: &SelectionPath) -> bool {
    let els = path.elements();
    if els.len() != 5
        || els[0].kind != PathElementKind::MoveTo
        || els[1..].iter().any(|e| e.kind != PathElementKind::LineTo)
        || els[0].pos() != els[4].pos()
    {
        return false;
    }
    let Some(b) = path.bounds() else {
        return false;
    };
    if b.width() <= 0.0 || b.height() <= 0.0 {
        return false;
    }
    let on_corner = |p: Pos2| (p.x == b.min.x || p.x == b.max.x) && (p.y == b.min.y || p.y == b.max.y);
    els.iter().all(|e| on_corner(e.pos()))
        && els.windows(2).all(|w| (w[0].x == w[1].x) != (w[0].y == w[1].y))
}

fn is_ellipse_path(path: &SelectionPath) -> bool {
    let els = path.elements();
    if els.len() != 13 || els[0].kind != PathElementKind::MoveTo {
        return false;
    }
    let curves_ok = els[1..].chunks(3).all(|c| {
        c[0].kind == PathElementKind::CurveTo
            && c[1].kind == PathElementKind::CurveToData
            && c[2].kind == PathElementKind::CurveToData
    });
    if !curves_ok {
        return false;
    }
    let Some(b) = path.bounds() else {
        return false;
    };
    let tol = 1e-3 * b.width().max(b.height()).max(1.0);
    let reference = SelectionPath::ellipse(b.min, b.max);
    els.iter()
        .zip(reference.elements())
        .all(|(a, r)| (a.x - r.x).abs() <= tol && (a.y - r.y).abs() <= tol)
}

/// How a new selection path combines with the committed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum SelectionMode {
    #[default]
    Replace,
    Add,
    Subtract,
}

impl SelectionMode {
    pub fn name(&self) -> &'static str {
        match self {
            SelectionMode::Replace => "Replace",
            SelectionMode::Add => "Add",
            SelectionMode::Subtract => "Subtract",
        }
    }
}

/// Committed selection: path plus its shape tag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionState {
    pub path: SelectionPath,
    pub shape: SelectionShape,
}

impl SelectionState {
    /// State for a path, deriving its shape tag.
    pub fn from_path(path: SelectionPath) -> Self {
        let shape = SelectionShape::classify(&path);
        Self { path, shape }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Combine `path` into this state. `None` when the combination changes
    /// nothing (degenerate input, or subtracting from an empty selection).
    pub fn combined(&self, path: &SelectionPath, mode: SelectionMode) -> Option<SelectionState> {
        if path.is_degenerate() {
            return None;
        }
        let next = match mode {
            SelectionMode::Replace => SelectionState::from_path(path.clone()),
            SelectionMode::Add if self.is_empty() => SelectionState::from_path(path.clone()),
            SelectionMode::Add => SelectionState::from_path(self.path.union(path)),
            SelectionMode::Subtract if self.is_empty() => return None,
            SelectionMode::Subtract => SelectionState::from_path(self.path.subtract(path)),
        };
        if next == *self { None } else { Some(next) }
    }
}

// ============================================================================
// SELECTION MASK
// ============================================================================

/// Per-pixel membership for `rect`, row-major, one entry per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionMask {
    rect: PixelRect,
    bits: Vec<bool>,
}

impl SelectionMask {
    pub fn empty() -> Self {
        Self {
            rect: PixelRect::EMPTY,
            bits: Vec::new(),
        }
    }

    /// Every pixel of `rect` selected.
    pub fn full(rect: PixelRect) -> Self {
        Self {
            rect,
            bits: vec![true; rect.area()],
        }
    }

    /// Wrap precomputed membership. `None` if `bits` does not match `rect`.
    pub fn from_bits(rect: PixelRect, bits: Vec<bool>) -> Option<Self> {
        (bits.len() == rect.area()).then_some(Self { rect, bits })
    }

    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }

    /// Membership at (col, row) relative to the mask origin.
    pub fn get(&self, col: i32, row: i32) -> bool {
        if col < 0 || row < 0 || col >= self.rect.width || row >= self.rect.height {
            return false;
        }
        self.bits[(row * self.rect.width + col) as usize]
    }

    /// Membership at absolute canvas coordinates.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.get(x - self.rect.x, y - self.rect.y)
    }

    pub fn selected_count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Same membership at a shifted origin.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            rect: self.rect.translate(dx, dy),
            bits: self.bits.clone(),
        }
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

/// Rasterize `path` over its pixel bounds intersected with `clip`, using the
/// strategy keyed by `shape`.
pub fn rasterize(path: &SelectionPath, shape: SelectionShape, clip: PixelRect) -> SelectionMask {
    let Some(bounds) = path.bounds() else {
        return SelectionMask::empty();
    };
    let rect = PixelRect::enclosing(bounds).intersect(&clip);
    if rect.is_empty() {
        return SelectionMask::empty();
    }
    let width = rect.width as usize;
    let mut bits = vec![false; rect.area()];

    match shape {
        SelectionShape::Rectangle => {
            // Everything inside the clipped pixel bounds is selected.
            bits.fill(true);
        }
        SelectionShape::Ellipse => {
            let cx = (bounds.min.x + bounds.max.x) * 0.5;
            let cy = (bounds.min.y + bounds.max.y) * 0.5;
            let rx = bounds.width() * 0.5;
            let ry = bounds.height() * 0.5;
            bits.par_chunks_mut(width).enumerate().for_each(|(row, out)| {
                let py = (rect.y + row as i32) as f32;
                for (col, bit) in out.iter_mut().enumerate() {
                    let px = (rect.x + col as i32) as f32;
                    *bit = inside_ellipse(px, py, cx, cy, rx, ry);
                }
            });
        }
        SelectionShape::Freeform => {
            let coverage = render_coverage(path, rect);
            bits.par_iter_mut()
                .zip(coverage.as_raw().par_iter())
                .for_each(|(bit, c)| *bit = *c > 0);
        }
    }

    SelectionMask { rect, bits }
}

fn inside_ellipse(px: f32, py: f32, cx: f32, cy: f32, rx: f32, ry: f32) -> bool {
    if rx <= 0.0 || ry <= 0.0 {
        return false;
    }
    let dx = (px - cx) / rx;
    let dy = (py - cy) / ry;
    dx * dx + dy * dy <= 1.0
}

/// Scanline-fill each subpath into a single-channel coverage bitmap covering
/// `rect`. Pixels are sampled at their centres; additive subpaths write 255,
/// subtractive ones write 0, in path order.
fn render_coverage(path: &SelectionPath, rect: PixelRect) -> GrayImage {
    let subpaths = path.subpaths();
    let mut coverage = GrayImage::new(rect.width as u32, rect.height as u32);
    let width = rect.width as usize;

    coverage.par_chunks_mut(width).enumerate().for_each(|(row, out)| {
        let yf = (rect.y + row as i32) as f32 + 0.5;
        let mut nodes: Vec<f32> = Vec::new();
        for sub in &subpaths {
            nodes.clear();
            let pts = &sub.points;
            let n = pts.len();
            if n < 3 {
                continue;
            }
            for i in 0..n {
                let j = (i + 1) % n;
                let (yi, yj) = (pts[i].y, pts[j].y);
                if (yi < yf && yj >= yf) || (yj < yf && yi >= yf) {
                    let t = (yf - yi) / (yj - yi);
                    nodes.push(pts[i].x + t * (pts[j].x - pts[i].x));
                }
            }
            nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let value = if sub.additive { 255u8 } else { 0u8 };
            for pair in nodes.chunks_exact(2) {
                // Pixel x is covered when its centre x + 0.5 lies in [a, b).
                let x0 = ((pair[0] - 0.5).ceil() as i32 - rect.x).clamp(0, rect.width);
                let x1 = ((pair[1] - 0.5).ceil() as i32 - rect.x).clamp(0, rect.width);
                for v in &mut out[x0 as usize..x1 as usize] {
                    *v = value;
                }
            }
        }
    });

    coverage
}

// ============================================================================
// SELECTION MANAGER - committed + preview slots, per document
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct SelectionManager {
    committed: SelectionState,
    preview: Option<(SelectionPath, SelectionMode)>,
    mask_cache: Option<Arc<SelectionMask>>,
    mask_clip: PixelRect,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> &SelectionPath {
        &self.committed.path
    }

    pub fn shape(&self) -> SelectionShape {
        self.committed.shape
    }

    pub fn has_selection(&self) -> bool {
        !self.committed.is_empty()
    }

    pub fn bounds(&self) -> Option<PixelRect> {
        self.committed.path.pixel_bounds()
    }

    /// Combine `path` into the committed selection. Returns whether anything
    /// changed; degenerate paths are ignored.
    pub fn apply_selection(&mut self, path: &SelectionPath, mode: SelectionMode) -> bool {
        match self.committed.combined(path, mode) {
            Some(next) => {
                self.set_committed(next);
                true
            }
            None => false,
        }
    }

    pub fn set_preview(&mut self, path: SelectionPath, mode: SelectionMode) {
        self.preview = Some((path, mode));
    }

    pub fn clear_preview(&mut self) {
        self.preview = None;
    }

    pub fn preview(&self) -> Option<&(SelectionPath, SelectionMode)> {
        self.preview.as_ref()
    }

    /// Path to draw: committed combined with the preview, if any.
    pub fn display_path(&self) -> SelectionPath {
        match &self.preview {
            Some((path, mode)) => match self.committed.combined(path, *mode) {
                Some(state) => state.path,
                None => self.committed.path.clone(),
            },
            None => self.committed.path.clone(),
        }
    }

    pub fn clear(&mut self) -> bool {
        self.preview = None;
        if self.committed.is_empty() {
            return false;
        }
        self.set_committed(SelectionState::default());
        true
    }

    pub fn translate(&mut self, dx: f32, dy: f32) -> bool {
        if self.committed.is_empty() || (dx == 0.0 && dy == 0.0) {
            return false;
        }
        let path = self.committed.path.translated(dx, dy);
        let shape = self.committed.shape;
        self.set_committed(SelectionState { path, shape });
        true
    }

    pub fn snapshot(&self) -> SelectionState {
        self.committed.clone()
    }

    pub fn restore(&mut self, state: &SelectionState) {
        self.set_committed(state.clone());
    }

    /// Mask of the committed selection for `clip`, cached until the
    /// selection or the clip changes.
    pub fn mask_for(&mut self, clip: PixelRect) -> Arc<SelectionMask> {
        if let Some(mask) = &self.mask_cache
            && self.mask_clip == clip
        {
            return Arc::clone(mask);
        }
        let mask = Arc::new(rasterize(&self.committed.path, self.committed.shape, clip));
        self.mask_cache = Some(Arc::clone(&mask));
        self.mask_clip = clip;
        mask
    }

    fn set_committed(&mut self, state: SelectionState) {
        self.committed = state;
        self.mask_cache = None;
    }
}

impl PartialEq for SelectionManager {
    fn eq(&self, other: &Self) -> bool {
        self.committed == other.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_clip() -> PixelRect {
        PixelRect::from_size(100, 100)
    }

    #[test]
    fn rect_mask_matches_bounds() {
        let path = SelectionPath::rect(pos2(10.0, 20.0), pos2(40.0, 35.0));
        assert_eq!(SelectionShape::classify(&path), SelectionShape::Rectangle);
        let mask = rasterize(&path, SelectionShape::Rectangle, layer_clip());
        assert_eq!(mask.rect(), PixelRect::new(10, 20, 30, 15));
        for row in 0..mask.rect().height {
            for col in 0..mask.rect().width {
                assert!(mask.get(col, row));
            }
        }
        assert!(!mask.contains(9, 20));
        assert!(!mask.contains(40, 20));
    }

    #[test]
    fn ellipse_mask_matches_normalized_distance() {
        let path = SelectionPath::ellipse(pos2(10.0, 10.0), pos2(50.0, 30.0));
        assert_eq!(SelectionShape::classify(&path), SelectionShape::Ellipse);
        let mask = rasterize(&path, SelectionShape::Ellipse, layer_clip());
        let (cx, cy, rx, ry) = (30.0f32, 20.0f32, 20.0f32, 10.0f32);
        let r = mask.rect();
        for py in r.y..r.bottom() {
            for px in r.x..r.right() {
                let dx = (px as f32 - cx) / rx;
                let dy = (py as f32 - cy) / ry;
                assert_eq!(mask.contains(px, py), dx * dx + dy * dy <= 1.0, "({px},{py})");
            }
        }
    }

    #[test]
    fn freeform_of_rect_agrees_with_fast_path() {
        let path = SelectionPath::rect(pos2(5.0, 5.0), pos2(25.0, 15.0));
        let fast = rasterize(&path, SelectionShape::Rectangle, layer_clip());
        let slow = rasterize(&path, SelectionShape::Freeform, layer_clip());
        assert_eq!(fast, slow);
    }

    #[test]
    fn mask_is_clipped_to_layer() {
        let path = SelectionPath::rect(pos2(80.0, 80.0), pos2(130.0, 130.0));
        let mask = rasterize(&path, SelectionShape::Rectangle, layer_clip());
        assert_eq!(mask.rect(), PixelRect::new(80, 80, 20, 20));
        let outside = SelectionPath::rect(pos2(200.0, 200.0), pos2(210.0, 210.0));
        assert!(rasterize(&outside, SelectionShape::Rectangle, layer_clip()).is_empty());
    }

    #[test]
    fn lasso_triangle_covers_pixel_centres() {
        let path = SelectionPath::polygon(&[pos2(0.0, 0.0), pos2(10.0, 0.0), pos2(0.0, 10.0)]);
        assert_eq!(SelectionShape::classify(&path), SelectionShape::Freeform);
        let mask = rasterize(&path, SelectionShape::Freeform, layer_clip());
        assert!(mask.contains(0, 0));
        assert!(mask.contains(8, 0));
        assert!(!mask.contains(9, 9));
        assert!(mask.contains(0, 8));
        assert!(!mask.contains(0, 9));
    }

    #[test]
    fn subtract_punches_hole() {
        let mut mgr = SelectionManager::new();
        assert!(mgr.apply_selection(&SelectionPath::rect(pos2(0.0, 0.0), pos2(20.0, 20.0)), SelectionMode::Replace));
        assert!(mgr.apply_selection(&SelectionPath::rect(pos2(5.0, 5.0), pos2(10.0, 10.0)), SelectionMode::Subtract));
        assert_eq!(mgr.shape(), SelectionShape::Freeform);
        let mask = mgr.mask_for(layer_clip());
        assert!(mask.contains(0, 0));
        assert!(!mask.contains(7, 7));
        assert!(mask.contains(12, 12));
        assert_eq!(mask.selected_count(), 400 - 25);
    }

    #[test]
    fn add_unions_disjoint_regions() {
        let mut mgr = SelectionManager::new();
        mgr.apply_selection(&SelectionPath::rect(pos2(0.0, 0.0), pos2(4.0, 4.0)), SelectionMode::Add);
        assert_eq!(mgr.shape(), SelectionShape::Rectangle);
        mgr.apply_selection(&SelectionPath::rect(pos2(10.0, 0.0), pos2(14.0, 4.0)), SelectionMode::Add);
        let mask = mgr.mask_for(layer_clip());
        assert_eq!(mask.selected_count(), 32);
        assert!(!mask.contains(6, 1));
    }

    #[test]
    fn degenerate_and_empty_subtract_are_noops() {
        let mut mgr = SelectionManager::new();
        let point = SelectionPath::rect(pos2(3.0, 3.0), pos2(3.0, 3.0));
        assert!(!mgr.apply_selection(&point, SelectionMode::Replace));
        let r = SelectionPath::rect(pos2(0.0, 0.0), pos2(5.0, 5.0));
        assert!(!mgr.apply_selection(&r, SelectionMode::Subtract));
        assert!(!mgr.has_selection());
        assert!(mgr.apply_selection(&r, SelectionMode::Replace));
        assert!(!mgr.apply_selection(&r, SelectionMode::Replace));
    }

    #[test]
    fn preview_never_touches_committed() {
        let mut mgr = SelectionManager::new();
        let a = SelectionPath::rect(pos2(0.0, 0.0), pos2(10.0, 10.0));
        mgr.apply_selection(&a, SelectionMode::Replace);
        let b = SelectionPath::rect(pos2(20.0, 20.0), pos2(30.0, 30.0));
        mgr.set_preview(b.clone(), SelectionMode::Add);
        assert_eq!(mgr.display_path(), a.union(&b));
        assert_eq!(mgr.path(), &a);
        mgr.clear_preview();
        assert_eq!(mgr.display_path(), a);
    }

    #[test]
    fn mask_cache_invalidates_on_change() {
        let mut mgr = SelectionManager::new();
        mgr.apply_selection(&SelectionPath::rect(pos2(0.0, 0.0), pos2(10.0, 10.0)), SelectionMode::Replace);
        let first = mgr.mask_for(layer_clip());
        assert!(Arc::ptr_eq(&first, &mgr.mask_for(layer_clip())));
        mgr.translate(5.0, 0.0);
        let moved = mgr.mask_for(layer_clip());
        assert_eq!(moved.rect(), PixelRect::new(5, 0, 10, 10));
    }

    #[test]
    fn shape_survives_element_round_trip() {
        let ellipse = SelectionPath::ellipse(pos2(1.5, 2.0), pos2(33.0, 17.25));
        let rebuilt = SelectionPath::from_elements(
            ellipse
                .elements()
                .iter()
                .map(|e| PathElement::new(PathElementKind::from_u8(e.kind.to_u8()).unwrap(), e.x, e.y))
                .collect(),
        );
        assert_eq!(SelectionShape::classify(&rebuilt), SelectionShape::Ellipse);
        let subtracted = SelectionPath::rect(pos2(0.0, 0.0), pos2(9.0, 9.0))
            .subtract(&SelectionPath::rect(pos2(1.0, 1.0), pos2(2.0, 2.0)));
        assert_eq!(subtracted.elements()[5].kind, PathElementKind::SubtractMoveTo);
    }

    #[test]
    fn quad_and_close_build_closed_subpath() {
        let mut path = SelectionPath::new();
        path.move_to(pos2(0.0, 0.0)).quad_to(pos2(10.0, 10.0), pos2(20.0, 0.0)).close();
        let subs = path.subpaths();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].points.last(), Some(&pos2(0.0, 0.0)));
        assert!(!path.is_degenerate());
    }
}
