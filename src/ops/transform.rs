// ============================================================================
// TRANSFORM STATE - translation / scale / rotation of a floating region
// ============================================================================

use egui::{Pos2, Rect, Vec2};
use image::imageops;

use crate::selection::SelectionPath;

/// Smallest edge length a handle drag may shrink the region to.
const MIN_EDGE: f32 = 1.0;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "Nearest",
            Interpolation::Bilinear => "Bilinear",
            Interpolation::Bicubic => "Bicubic",
            Interpolation::Lanczos3 => "Lanczos3",
        }
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Move,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
    Rotate,
}

impl HandleKind {
    pub fn is_resize(&self) -> bool {
        !matches!(self, HandleKind::Move | HandleKind::Rotate)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct DragStart {
    handle: HandleKind,
    mouse: Pos2,
    center: Pos2,
    scale_x: f32,
    scale_y: f32,
    rotation: f32,
}

/// Placement of a floating region relative to where it was lifted from:
/// `base` is the original rect, the region is drawn scaled about its centre,
/// rotated by `rotation` radians, with its centre at `center`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformState {
    base: Rect,
    pub center: Pos2,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    drag: Option<DragStart>,
}

impl TransformState {
    pub fn new(base: Rect) -> Self {
        Self {
            base,
            center: base.center(),
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            drag: None,
        }
    }

    pub fn base(&self) -> Rect {
        self.base
    }

    pub fn translation(&self) -> Vec2 {
        self.center - self.base.center()
    }

    pub fn is_translation_only(&self) -> bool {
        (self.scale_x - 1.0).abs() < 1e-4 && (self.scale_y - 1.0).abs() < 1e-4 && self.rotation.abs() < 1e-4
    }

    /// Whole-pixel offset used when the transform is a pure translation.
    pub fn pixel_offset(&self) -> (i32, i32) {
        let t = self.translation();
        (t.x.round() as i32, t.y.round() as i32)
    }

    /// True when committing would not move a single pixel.
    pub fn is_identity(&self) -> bool {
        self.is_translation_only() && self.pixel_offset() == (0, 0)
    }

    fn scaled_half(&self) -> Vec2 {
        Vec2::new(self.base.width() * self.scale_x, self.base.height() * self.scale_y) * 0.5
    }

    fn rotate_about_center(&self, p: Pos2, angle: f32) -> Pos2 {
        let d = p - self.center;
        let (sin, cos) = angle.sin_cos();
        self.center + Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
    }

    /// Corners in canvas space: TL, TR, BL, BR.
    pub fn corners(&self) -> [Pos2; 4] {
        let hs = self.scaled_half();
        let c = self.center;
        [
            self.rotate_about_center(Pos2::new(c.x - hs.x, c.y - hs.y), self.rotation),
            self.rotate_about_center(Pos2::new(c.x + hs.x, c.y - hs.y), self.rotation),
            self.rotate_about_center(Pos2::new(c.x - hs.x, c.y + hs.y), self.rotation),
            self.rotate_about_center(Pos2::new(c.x + hs.x, c.y + hs.y), self.rotation),
        ]
    }

    /// Edge midpoints in canvas space: top, bottom, left, right.
    pub fn edge_midpoints(&self) -> [Pos2; 4] {
        let hs = self.scaled_half();
        let c = self.center;
        [
            self.rotate_about_center(Pos2::new(c.x, c.y - hs.y), self.rotation),
            self.rotate_about_center(Pos2::new(c.x, c.y + hs.y), self.rotation),
            self.rotate_about_center(Pos2::new(c.x - hs.x, c.y), self.rotation),
            self.rotate_about_center(Pos2::new(c.x + hs.x, c.y), self.rotation),
        ]
    }

    /// Axis-aligned bounds of the transformed region.
    pub fn current_rect(&self) -> Rect {
        let corners = self.corners();
        let mut r = Rect::from_min_max(corners[0], corners[0]);
        for c in &corners[1..] {
            r.extend_with(*c);
        }
        r
    }

    fn rotate_handle_pos(&self, handle_radius: f32) -> Pos2 {
        let top = self.edge_midpoints()[0];
        let d = top - self.center;
        let dir = if d.length() > 0.1 {
            d.normalized()
        } else {
            Vec2::new(0.0, -1.0)
        };
        top + dir * (handle_radius * 4.0)
    }

    /// Every grab handle and where it sits.
    pub fn handle_positions(&self, handle_radius: f32) -> Vec<(HandleKind, Pos2)> {
        let corners = self.corners();
        let mids = self.edge_midpoints();
        vec![
            (HandleKind::TopLeft, corners[0]),
            (HandleKind::TopRight, corners[1]),
            (HandleKind::BottomLeft, corners[2]),
            (HandleKind::BottomRight, corners[3]),
            (HandleKind::Top, mids[0]),
            (HandleKind::Bottom, mids[1]),
            (HandleKind::Left, mids[2]),
            (HandleKind::Right, mids[3]),
            (HandleKind::Rotate, self.rotate_handle_pos(handle_radius)),
        ]
    }

    /// Handle under `pos`: rotate, then corners, then edges, then the body.
    pub fn hit_test(&self, pos: Pos2, handle_radius: f32) -> Option<HandleKind> {
        let handles = self.handle_positions(handle_radius);
        if let Some((kind, _)) = handles
            .iter()
            .rev()
            .take(1)
            .chain(handles.iter().take(8))
            .find(|(_, p)| p.distance(pos) <= handle_radius)
        {
            return Some(*kind);
        }
        if self.contains(pos) {
            return Some(HandleKind::Move);
        }
        None
    }

    /// Point inside the rotated region.
    pub fn contains(&self, pos: Pos2) -> bool {
        let local = self.rotate_about_center(pos, -self.rotation) - self.center;
        let hs = self.scaled_half();
        local.x.abs() <= hs.x && local.y.abs() <= hs.y
    }

    pub fn begin_drag(&mut self, handle: HandleKind, mouse: Pos2) {
        self.drag = Some(DragStart {
            handle,
            mouse,
            center: self.center,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            rotation: self.rotation,
        });
    }

    /// Update for the pointer at `mouse`. `constrain` locks the aspect ratio
    /// on resize handles and snaps rotation to 45°.
    pub fn drag_to(&mut self, mouse: Pos2, constrain: bool) {
        let Some(start) = self.drag else {
            return;
        };
        let delta = mouse - start.mouse;
        match start.handle {
            HandleKind::Move => {
                self.center = start.center + delta;
            }
            HandleKind::Rotate => {
                let a0 = (start.mouse.y - start.center.y).atan2(start.mouse.x - start.center.x);
                let a1 = (mouse.y - start.center.y).atan2(mouse.x - start.center.x);
                let mut rot = start.rotation + (a1 - a0);
                if constrain {
                    let snap = std::f32::consts::FRAC_PI_4;
                    rot = (rot / snap).round() * snap;
                }
                self.rotation = rot;
            }
            handle => self.handle_resize(&start, handle, delta, constrain),
        }
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Resize from an edge/corner so that the opposite edge stays fixed.
    fn handle_resize(&mut self, start: &DragStart, handle: HandleKind, delta: Vec2, keep_aspect: bool) {
        let src_w = self.base.width();
        let src_h = self.base.height();
        if src_w < 1.0 || src_h < 1.0 {
            return;
        }

        // Un-rotate delta to local axes.
        let (sin, cos) = (-self.rotation).sin_cos();
        let local_dx = delta.x * cos - delta.y * sin;
        let local_dy = delta.x * sin + delta.y * cos;

        let start_w = src_w * start.scale_x;
        let start_h = src_h * start.scale_y;

        // Which side each axis drags: +1 right/bottom, -1 left/top, 0 fixed.
        let (side_x, side_y) = match handle {
            HandleKind::Right => (1.0, 0.0),
            HandleKind::Left => (-1.0, 0.0),
            HandleKind::Bottom => (0.0, 1.0),
            HandleKind::Top => (0.0, -1.0),
            HandleKind::TopLeft => (-1.0, -1.0),
            HandleKind::TopRight => (1.0, -1.0),
            HandleKind::BottomLeft => (-1.0, 1.0),
            HandleKind::BottomRight => (1.0, 1.0),
            HandleKind::Move | HandleKind::Rotate => return,
        };

        let mut new_sx = if side_x != 0.0 {
            (start_w + side_x * local_dx).max(MIN_EDGE) / src_w
        } else {
            start.scale_x
        };
        let mut new_sy = if side_y != 0.0 {
            (start_h + side_y * local_dy).max(MIN_EDGE) / src_h
        } else {
            start.scale_y
        };

        if keep_aspect {
            let aspect = start.scale_x / start.scale_y;
            let factor = (new_sx / start.scale_x).max(new_sy / start.scale_y);
            new_sx = start.scale_x * factor;
            new_sy = new_sx / aspect;
        }

        // Shift the centre by half the achieved growth toward the dragged side.
        let offset_x = side_x * (new_sx * src_w - start_w) / 2.0;
        let offset_y = side_y * (new_sy * src_h - start_h) / 2.0;

        self.scale_x = new_sx;
        self.scale_y = new_sy;

        let (sin_r, cos_r) = self.rotation.sin_cos();
        self.center = Pos2::new(
            start.center.x + offset_x * cos_r - offset_y * sin_r,
            start.center.y + offset_x * sin_r + offset_y * cos_r,
        );
    }

    /// Map a point of the original region to where it ends up.
    pub fn map_point(&self, p: Pos2) -> Pos2 {
        if self.is_translation_only() {
            let (dx, dy) = self.pixel_offset();
            return Pos2::new(p.x + dx as f32, p.y + dy as f32);
        }
        let c0 = self.base.center();
        let scaled = Pos2::new(
            self.center.x + (p.x - c0.x) * self.scale_x,
            self.center.y + (p.y - c0.y) * self.scale_y,
        );
        self.rotate_about_center(scaled, self.rotation)
    }

    /// Inverse of [`TransformState::map_point`]. `None` for a collapsed scale.
    pub fn unmap_point(&self, p: Pos2) -> Option<Pos2> {
        if self.is_translation_only() {
            let (dx, dy) = self.pixel_offset();
            return Some(Pos2::new(p.x - dx as f32, p.y - dy as f32));
        }
        if self.scale_x.abs() < 1e-6 || self.scale_y.abs() < 1e-6 {
            return None;
        }
        let unrotated = self.rotate_about_center(p, -self.rotation);
        let c0 = self.base.center();
        Some(Pos2::new(
            c0.x + (unrotated.x - self.center.x) / self.scale_x,
            c0.y + (unrotated.y - self.center.y) / self.scale_y,
        ))
    }

    /// The selection path carried along with the region.
    pub fn map_path(&self, path: &SelectionPath) -> SelectionPath {
        path.map_points(|p| self.map_point(p))
    }
}
