//! Raylib rendering.
//!
//! [`RaylibRenderContext`] implements the scene graph's [`RenderContext`] on
//! top of rlgl's matrix stack, so every primitive raylib draws inside a
//! decorator picks up the composed transform. The viewport origin is the
//! window centre with y growing upwards; [`render_system`] sets that up
//! before handing the context to the scripts.
use bevy_ecs::prelude::*;
use raylib::ffi;
use raylib::prelude::{Color, RaylibDraw, Rectangle, Vector2};

use crate::resources::lua_runtime::LuaRuntime;
use crate::resources::texturestore::TextureStore;
use crate::scene::node::ImageQuad;
use crate::scene::render::{BlendMode, DrawMode, RenderContext, VertexLayout};
use crate::scene::transform::Bounds;

/// How a vertex buffer is handed to rlgl after index expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
    Lines,
    Points,
}

/// Expands strips and fans into plain triangle or line lists.
///
/// Trailing vertices that do not complete a primitive are dropped.
pub fn primitive_indices(mode: DrawMode, count: usize) -> (Primitive, Vec<usize>) {
    match mode {
        DrawMode::Triangles => (Primitive::Triangles, (0..count - count % 3).collect()),
        DrawMode::TriangleStrip => {
            let mut indices = Vec::new();
            for i in 0..count.saturating_sub(2) {
                // Every other triangle flips to keep a consistent winding.
                if i % 2 == 0 {
                    indices.extend([i, i + 1, i + 2]);
                } else {
                    indices.extend([i + 1, i, i + 2]);
                }
            }
            (Primitive::Triangles, indices)
        }
        DrawMode::TriangleFan => {
            let mut indices = Vec::new();
            for i in 1..count.saturating_sub(1) {
                indices.extend([0, i, i + 1]);
            }
            (Primitive::Triangles, indices)
        }
        DrawMode::Lines => (Primitive::Lines, (0..count - count % 2).collect()),
        DrawMode::LineStrip => {
            let mut indices = Vec::new();
            for i in 0..count.saturating_sub(1) {
                indices.extend([i, i + 1]);
            }
            (Primitive::Lines, indices)
        }
        DrawMode::Points => (Primitive::Points, (0..count).collect()),
    }
}

/// Multiplies two RGBA tints component-wise.
pub fn combine_tint(outer: [f32; 4], inner: [f32; 4]) -> [f32; 4] {
    [
        outer[0] * inner[0],
        outer[1] * inner[1],
        outer[2] * inner[2],
        outer[3] * inner[3],
    ]
}

fn to_color(tint: [f32; 4]) -> Color {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color::new(channel(tint[0]), channel(tint[1]), channel(tint[2]), channel(tint[3]))
}

fn raylib_blend(mode: BlendMode) -> Option<ffi::BlendMode> {
    match mode {
        BlendMode::Normal => Some(ffi::BlendMode::BLEND_ALPHA),
        BlendMode::Add => Some(ffi::BlendMode::BLEND_ADDITIVE),
        BlendMode::Subtract => Some(ffi::BlendMode::BLEND_SUBTRACT_COLORS),
        BlendMode::Color => Some(ffi::BlendMode::BLEND_MULTIPLIED),
        BlendMode::Off => None,
    }
}

/// Scene graph drawing on a raylib draw handle.
pub struct RaylibRenderContext<'a, D: RaylibDraw> {
    d: &'a mut D,
    textures: &'a TextureStore,
    /// Accumulated tints; the last entry is the one in effect.
    tints: Vec<[f32; 4]>,
    blends: Vec<BlendMode>,
    /// One entry per pushed matrix: whether it turned the depth test on.
    depth: Vec<bool>,
}

impl<'a, D: RaylibDraw> RaylibRenderContext<'a, D> {
    pub fn new(d: &'a mut D, textures: &'a TextureStore) -> Self {
        Self {
            d,
            textures,
            tints: vec![[1.0; 4]],
            blends: Vec::new(),
            depth: Vec::new(),
        }
    }

    /// Moves the origin to the window centre and flips y upwards.
    pub fn begin_viewport(&mut self, width: f32, height: f32) {
        unsafe {
            // Flipping y reverses winding; nothing the scripts draw is culled.
            ffi::rlDisableBackfaceCulling();
            ffi::rlPushMatrix();
            ffi::rlTranslatef(width * 0.5, height * 0.5, 0.0);
            ffi::rlScalef(1.0, -1.0, 1.0);
        }
    }

    /// Restores the state changed by [`begin_viewport`](Self::begin_viewport)
    /// and anything a failing script left pushed.
    pub fn end_viewport(&mut self) {
        while !self.depth.is_empty() {
            self.pop_matrix();
        }
        if !self.blends.is_empty() {
            self.blends.clear();
            self.apply_blend(BlendMode::Normal);
        }
        self.tints.truncate(1);
        unsafe {
            ffi::rlPopMatrix();
            ffi::rlEnableBackfaceCulling();
        }
    }

    fn color(&self) -> Color {
        to_color(self.tints.last().copied().unwrap_or([1.0; 4]))
    }

    fn texture_id(&self, id: &str) -> Option<u32> {
        self.textures.get(id).map(|texture| texture.id)
    }

    fn apply_blend(&mut self, mode: BlendMode) {
        unsafe {
            ffi::rlDrawRenderBatchActive();
            match raylib_blend(mode) {
                Some(blend) => {
                    ffi::rlEnableColorBlend();
                    ffi::BeginBlendMode(blend as i32);
                }
                None => ffi::rlDisableColorBlend(),
            }
        }
    }

    /// Emits `corners` (x, y, s, t each) as one textured quad.
    fn textured_quad(&mut self, texture: u32, corners: [[f32; 4]; 4]) {
        let color = self.color();
        unsafe {
            ffi::rlSetTexture(texture);
            ffi::rlBegin(ffi::RL_QUADS as i32);
            ffi::rlColor4ub(color.r, color.g, color.b, color.a);
            for [x, y, s, t] in corners {
                ffi::rlTexCoord2f(s, t);
                ffi::rlVertex2f(x, y);
            }
            ffi::rlEnd();
            ffi::rlSetTexture(0);
        }
    }
}

impl<D: RaylibDraw> RenderContext for RaylibRenderContext<'_, D> {
    fn push_matrix(&mut self) {
        self.depth.push(false);
        unsafe { ffi::rlPushMatrix() };
    }

    fn pop_matrix(&mut self) {
        if self.depth.pop() == Some(true) {
            unsafe {
                ffi::rlDrawRenderBatchActive();
                ffi::rlDisableDepthTest();
            }
        }
        unsafe { ffi::rlPopMatrix() };
    }

    fn translate(&mut self, x: f32, y: f32, z: f32) {
        unsafe { ffi::rlTranslatef(x, y, z) };
    }

    fn rotate(&mut self, degrees: f32) {
        unsafe { ffi::rlRotatef(degrees, 0.0, 0.0, 1.0) };
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        unsafe { ffi::rlScalef(sx, sy, 1.0) };
    }

    fn perspective(&mut self, _near: f32, origin: f32, _far: f32, depth_buffer: bool) {
        if origin == 0.0 {
            return;
        }
        // Column-major; w = 1 - z / origin so z = 0 keeps its size.
        let matrix: [f32; 16] = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, -1.0 / origin, //
            0.0, 0.0, 0.0, 1.0,
        ];
        unsafe { ffi::rlMultMatrixf(matrix.as_ptr()) };
        if depth_buffer {
            if let Some(top) = self.depth.last_mut() {
                *top = true;
            }
            unsafe {
                ffi::rlDrawRenderBatchActive();
                ffi::rlEnableDepthTest();
            }
        }
    }

    fn pitch(&mut self, degrees: f32) {
        unsafe { ffi::rlRotatef(degrees, 1.0, 0.0, 0.0) };
    }

    fn push_tint(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let outer = self.tints.last().copied().unwrap_or([1.0; 4]);
        self.tints.push(combine_tint(outer, [r, g, b, a]));
    }

    fn pop_tint(&mut self) {
        if self.tints.len() > 1 {
            self.tints.pop();
        }
    }

    fn push_blend_mode(&mut self, mode: BlendMode) {
        self.blends.push(mode);
        self.apply_blend(mode);
    }

    fn pop_blend_mode(&mut self) {
        self.blends.pop();
        let mode = self.blends.last().copied().unwrap_or(BlendMode::Normal);
        self.apply_blend(mode);
    }

    fn draw_rect(&mut self, bounds: &Bounds, filled: bool) {
        let color = self.color();
        let rec = Rectangle::new(bounds.left, bounds.bottom, bounds.width(), bounds.height());
        if filled {
            self.d.draw_rectangle_rec(rec, color);
        } else {
            self.d.draw_rectangle_lines_ex(rec, 1.0, color);
        }
    }

    fn draw_ellipse(&mut self, x: f32, y: f32, rx: f32, ry: f32, filled: bool) {
        let color = self.color();
        // raylib takes an integer centre, so move the origin there instead.
        self.push_matrix();
        self.translate(x, y, 0.0);
        if filled {
            self.d.draw_ellipse(0, 0, rx, ry, color);
        } else {
            self.d.draw_ellipse_lines(0, 0, rx, ry, color);
        }
        self.pop_matrix();
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let color = self.color();
        self.d
            .draw_line_v(Vector2::new(x1, y1), Vector2::new(x2, y2), color);
    }

    fn draw_triangle(&mut self, v: &[f32; 6]) {
        let color = self.color();
        self.d.draw_triangle(
            Vector2::new(v[0], v[1]),
            Vector2::new(v[2], v[3]),
            Vector2::new(v[4], v[5]),
            color,
        );
    }

    fn draw_image(&mut self, image: &ImageQuad) {
        let Some(texture) = self.texture_id(&image.texture) else {
            return;
        };
        let (v, t) = (&image.world_vertices, &image.tex_coords);
        let corner = |i: usize| [v[i * 2], v[i * 2 + 1], t[i * 2], t[i * 2 + 1]];
        self.textured_quad(texture, [corner(0), corner(1), corner(2), corner(3)]);
    }

    fn draw_textured_quads(&mut self, texture: &str, data: &[f32], stride: usize, column: usize) {
        let Some(texture) = self.texture_id(texture) else {
            return;
        };
        if stride < column + 4 {
            return;
        }
        for quad in data.chunks_exact(stride * 4) {
            let corner = |row: usize| {
                let base = row * stride + column;
                [quad[base], quad[base + 1], quad[base + 2], quad[base + 3]]
            };
            // Rows are strip ordered; rlgl quads go around the edge.
            self.textured_quad(texture, [corner(0), corner(1), corner(3), corner(2)]);
        }
    }

    fn draw_vertices(
        &mut self,
        mode: DrawMode,
        data: &[f32],
        layout: &VertexLayout,
        texture: Option<&str>,
    ) {
        if layout.stride == 0 {
            return;
        }
        let tint = self.tints.last().copied().unwrap_or([1.0; 4]);
        let rows = data.len() / layout.stride;
        let row = |i: usize| &data[i * layout.stride..(i + 1) * layout.stride];
        let vertex_color = |r: &[f32]| match layout.color_offset {
            Some(c) => to_color(combine_tint(tint, [r[c], r[c + 1], r[c + 2], r[c + 3]])),
            None => to_color(tint),
        };

        let (primitive, indices) = primitive_indices(mode, rows);
        if primitive == Primitive::Points {
            for i in indices {
                let r = row(i);
                self.d.draw_pixel_v(Vector2::new(r[0], r[1]), vertex_color(r));
            }
            return;
        }

        let texture = texture.and_then(|id| self.texture_id(id));
        let rl_mode = match primitive {
            Primitive::Lines => ffi::RL_LINES,
            _ => ffi::RL_TRIANGLES,
        };
        unsafe {
            if let Some(id) = texture {
                ffi::rlSetTexture(id);
            }
            ffi::rlBegin(rl_mode as i32);
            for i in indices {
                let r = row(i);
                let color = vertex_color(r);
                ffi::rlColor4ub(color.r, color.g, color.b, color.a);
                if let (Some(t), Some(_)) = (layout.tex_offset, texture) {
                    ffi::rlTexCoord2f(r[t], r[t + 1]);
                }
                if layout.dims == 3 {
                    ffi::rlVertex3f(r[0], r[1], r[2]);
                } else {
                    ffi::rlVertex2f(r[0], r[1]);
                }
            }
            ffi::rlEnd();
            ffi::rlSetTexture(0);
        }
    }
}

/// Draw the frame: the scripts' `on_render` hook, or the stage.
pub fn render_system(
    mut rl: NonSendMut<raylib::RaylibHandle>,
    th: NonSend<raylib::RaylibThread>,
    textures: Res<TextureStore>,
    mut runtime: NonSendMut<LuaRuntime>,
) {
    let width = rl.get_screen_width() as f32;
    let height = rl.get_screen_height() as f32;
    let mut d = rl.begin_drawing(&th);
    d.clear_background(Color::BLACK);
    {
        let mut ctx = RaylibRenderContext::new(&mut d, &textures);
        ctx.begin_viewport(width, height);
        runtime.render(&mut ctx);
        ctx.end_viewport();
    }
    if runtime.is_suspended() {
        d.draw_text("Scripts suspended (F5 to reset)", 10, 10, 20, Color::RED);
    }
}
