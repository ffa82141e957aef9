//! Shared transform helpers for scene traversal.
//!
//! Decorators apply a forward transform when drawing and the matching
//! inverse when routing pointer coordinates down to their child. The two
//! must stay in lockstep, so both live here.

use raylib::prelude::Vector2;

/// Axis-aligned rectangle in local coordinates (y grows upwards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Bounds {
    /// Builds bounds from two corners given in any order.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            left: x1.min(x2),
            bottom: y1.min(y2),
            right: x1.max(x2),
            top: y1.max(y2),
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.bottom && y <= self.top
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }
}

/// Rotates `v` counter-clockwise by `degrees`.
pub fn rotate(v: Vector2, degrees: f32) -> Vector2 {
    let (s, c) = degrees.to_radians().sin_cos();
    Vector2 {
        x: v.x * c - v.y * s,
        y: v.x * s + v.y * c,
    }
}

/// Maps a parent-space point into the space of a `Rotate` node's child.
pub fn inverse_rotate(x: f32, y: f32, degrees: f32, cx: f32, cy: f32) -> (f32, f32) {
    let local = rotate(Vector2 { x: x - cx, y: y - cy }, -degrees);
    (local.x + cx, local.y + cy)
}

/// Maps a parent-space point into the space of a `Scale` node's child.
///
/// Returns `None` for degenerate scales, which have no inverse.
pub fn inverse_scale(x: f32, y: f32, sx: f32, sy: f32) -> Option<(f32, f32)> {
    if sx == 0.0 || sy == 0.0 {
        return None;
    }
    Some((x / sx, y / sy))
}

/// Point-in-triangle test using the sign of each edge's cross product.
pub fn triangle_contains(v: &[f32; 6], x: f32, y: f32) -> bool {
    let edge = |ax: f32, ay: f32, bx: f32, by: f32| (bx - ax) * (y - ay) - (by - ay) * (x - ax);
    let d1 = edge(v[0], v[1], v[2], v[3]);
    let d2 = edge(v[2], v[3], v[4], v[5]);
    let d3 = edge(v[4], v[5], v[0], v[1]);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Point-in-ellipse test for an axis-aligned ellipse.
pub fn ellipse_contains(cx: f32, cy: f32, rx: f32, ry: f32, x: f32, y: f32) -> bool {
    if rx <= 0.0 || ry <= 0.0 {
        return false;
    }
    let dx = (x - cx) / rx;
    let dy = (y - cy) / ry;
    dx * dx + dy * dy <= 1.0
}
