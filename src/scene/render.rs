//! Drawing interface consumed by the scene graph.
//!
//! The scene graph never talks to a graphics API directly. Every draw
//! traversal receives a [`RenderContext`] and only issues state-stack and
//! primitive calls on it. The binary supplies a raylib-backed context;
//! tests use [`RecordingContext`].

use crate::error::BridgeError;
use crate::scene::node::ImageQuad;
use crate::scene::transform::Bounds;

/// Blend mode applied by a `BlendMode` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
    Add,
    Subtract,
    Color,
    Off,
}

impl BlendMode {
    pub fn parse(name: &str) -> Result<Self, BridgeError> {
        match name {
            "normal" => Ok(BlendMode::Normal),
            "add" => Ok(BlendMode::Add),
            "subtract" => Ok(BlendMode::Subtract),
            "color" => Ok(BlendMode::Color),
            "off" => Ok(BlendMode::Off),
            other => Err(BridgeError::argument(format!("unknown blend mode: {}", other))),
        }
    }
}

/// Primitive assembly mode for a `DrawVector` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Triangles,
    TriangleStrip,
    TriangleFan,
    Points,
    Lines,
    LineStrip,
}

impl DrawMode {
    pub fn parse(name: &str) -> Result<Self, BridgeError> {
        match name {
            "triangles" => Ok(DrawMode::Triangles),
            "triangle_strip" => Ok(DrawMode::TriangleStrip),
            "triangle_fan" => Ok(DrawMode::TriangleFan),
            "points" => Ok(DrawMode::Points),
            "lines" => Ok(DrawMode::Lines),
            "line_strip" => Ok(DrawMode::LineStrip),
            other => Err(BridgeError::argument(format!("unknown draw mode: {}", other))),
        }
    }
}

/// Where each attribute lives inside a vertex buffer row (0-based columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: usize,
    pub dims: usize,
    pub color_offset: Option<usize>,
    pub tex_offset: Option<usize>,
}

pub trait RenderContext {
    fn push_matrix(&mut self);
    fn pop_matrix(&mut self);
    fn translate(&mut self, x: f32, y: f32, z: f32);
    /// Counter-clockwise rotation around the z axis.
    fn rotate(&mut self, degrees: f32);
    fn scale(&mut self, sx: f32, sy: f32);
    fn perspective(&mut self, near: f32, origin: f32, far: f32, depth_buffer: bool);
    fn pitch(&mut self, degrees: f32);

    fn push_tint(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn pop_tint(&mut self);
    fn push_blend_mode(&mut self, mode: BlendMode);
    fn pop_blend_mode(&mut self);

    fn draw_rect(&mut self, bounds: &Bounds, filled: bool);
    fn draw_ellipse(&mut self, x: f32, y: f32, rx: f32, ry: f32, filled: bool);
    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32);
    fn draw_triangle(&mut self, vertices: &[f32; 6]);
    fn draw_image(&mut self, image: &ImageQuad);
    /// Quads laid out as four strip-ordered rows of `x, y, s, t` from `column`.
    fn draw_textured_quads(&mut self, texture: &str, data: &[f32], stride: usize, column: usize);
    fn draw_vertices(
        &mut self,
        mode: DrawMode,
        data: &[f32],
        layout: &VertexLayout,
        texture: Option<&str>,
    );
}

/// One recorded [`RenderContext`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    PushMatrix,
    PopMatrix,
    Translate(f32, f32, f32),
    Rotate(f32),
    Scale(f32, f32),
    Perspective(f32, f32, f32, bool),
    Pitch(f32),
    PushTint(f32, f32, f32, f32),
    PopTint,
    PushBlend(BlendMode),
    PopBlend,
    Rect(Bounds, bool),
    Ellipse(f32, f32, f32, f32, bool),
    Line(f32, f32, f32, f32),
    Triangle([f32; 6]),
    Image(String),
    TexturedQuads { texture: String, quads: usize },
    Vertices { mode: DrawMode, vertices: usize, textured: bool },
}

/// Render context that records every call, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingContext {
    pub calls: Vec<DrawCall>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the calls that put pixels on screen.
    pub fn primitives(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    DrawCall::Rect(..)
                        | DrawCall::Ellipse(..)
                        | DrawCall::Line(..)
                        | DrawCall::Triangle(..)
                        | DrawCall::Image(..)
                        | DrawCall::TexturedQuads { .. }
                        | DrawCall::Vertices { .. }
                )
            })
            .collect()
    }
}

impl RenderContext for RecordingContext {
    fn push_matrix(&mut self) {
        self.calls.push(DrawCall::PushMatrix);
    }
    fn pop_matrix(&mut self) {
        self.calls.push(DrawCall::PopMatrix);
    }
    fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.calls.push(DrawCall::Translate(x, y, z));
    }
    fn rotate(&mut self, degrees: f32) {
        self.calls.push(DrawCall::Rotate(degrees));
    }
    fn scale(&mut self, sx: f32, sy: f32) {
        self.calls.push(DrawCall::Scale(sx, sy));
    }
    fn perspective(&mut self, near: f32, origin: f32, far: f32, depth_buffer: bool) {
        self.calls
            .push(DrawCall::Perspective(near, origin, far, depth_buffer));
    }
    fn pitch(&mut self, degrees: f32) {
        self.calls.push(DrawCall::Pitch(degrees));
    }
    fn push_tint(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.calls.push(DrawCall::PushTint(r, g, b, a));
    }
    fn pop_tint(&mut self) {
        self.calls.push(DrawCall::PopTint);
    }
    fn push_blend_mode(&mut self, mode: BlendMode) {
        self.calls.push(DrawCall::PushBlend(mode));
    }
    fn pop_blend_mode(&mut self) {
        self.calls.push(DrawCall::PopBlend);
    }
    fn draw_rect(&mut self, bounds: &Bounds, filled: bool) {
        self.calls.push(DrawCall::Rect(*bounds, filled));
    }
    fn draw_ellipse(&mut self, x: f32, y: f32, rx: f32, ry: f32, filled: bool) {
        self.calls.push(DrawCall::Ellipse(x, y, rx, ry, filled));
    }
    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.calls.push(DrawCall::Line(x1, y1, x2, y2));
    }
    fn draw_triangle(&mut self, vertices: &[f32; 6]) {
        self.calls.push(DrawCall::Triangle(*vertices));
    }
    fn draw_image(&mut self, image: &ImageQuad) {
        self.calls.push(DrawCall::Image(image.texture.clone()));
    }
    fn draw_textured_quads(&mut self, texture: &str, data: &[f32], stride: usize, _column: usize) {
        let rows = if stride == 0 { 0 } else { data.len() / stride };
        self.calls.push(DrawCall::TexturedQuads {
            texture: texture.to_string(),
            quads: rows / 4,
        });
    }
    fn draw_vertices(
        &mut self,
        mode: DrawMode,
        data: &[f32],
        layout: &VertexLayout,
        texture: Option<&str>,
    ) {
        let vertices = if layout.stride == 0 {
            0
        } else {
            data.len() / layout.stride
        };
        self.calls.push(DrawCall::Vertices {
            mode,
            vertices,
            textured: texture.is_some(),
        });
    }
}
