//! Scene graph nodes.
//!
//! A node is one of three shapes: a [`Layer`] holding an ordered child list,
//! a decorator wrapping exactly one child, or a drawable leaf. Children are
//! shared through `Rc`; a node never tears down its children, it only stops
//! pointing at them.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::events::pointer::{PointerEventKind, PointerHandler};
use crate::objects::{ObjectType, WrapSlot};
use crate::physics::objects::Body;
use crate::scene::layer::Layer;
use crate::scene::render::{BlendMode, DrawMode, RenderContext, VertexLayout};
use crate::scene::transform::{
    Bounds, ellipse_contains, inverse_rotate, inverse_scale, rotate, triangle_contains,
};
use crate::scene::vector::FloatVector;

use raylib::prelude::Vector2;

/// A textured quad: world-space corners plus matching texture coordinates.
///
/// Both arrays list bottom-left, bottom-right, top-right, top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageQuad {
    pub texture: String,
    pub world_vertices: [f32; 8],
    pub tex_coords: [f32; 8],
}

impl ImageQuad {
    /// Quad of `width x height` centred on the origin, sampling the texture
    /// rectangle `[u1, v1, u2, v2]` where `v1` is the top edge.
    pub fn new(texture: &str, width: f32, height: f32, uv: [f32; 4]) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let [u1, v1, u2, v2] = uv;
        Self {
            texture: texture.to_string(),
            world_vertices: [-hw, -hh, hw, -hh, hw, hh, -hw, hh],
            tex_coords: [u1, v2, u2, v2, u2, v1, u1, v1],
        }
    }

    pub fn bounds(&self) -> Bounds {
        let v = &self.world_vertices;
        Bounds::from_corners(v[0], v[1], v[4], v[5])
    }
}

/// Follows a physics body around, optionally as a camera.
pub struct BodyTracker {
    pub body: Rc<Body>,
    /// Moves the world opposite to the body instead of moving the child.
    pub viewport_mode: bool,
    pub track_rotation: bool,
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    /// Grid size the tracked position snaps to; 0 disables snapping.
    pub snap_to: f32,
    /// Simulation-to-scene scale captured from the body's world.
    pub scale: f32,
}

impl BodyTracker {
    pub fn new(body: Rc<Body>, viewport_mode: bool, track_rotation: bool) -> Self {
        let scale = body.scale();
        Self {
            body,
            viewport_mode,
            track_rotation,
            min_x: f32::NEG_INFINITY,
            max_x: f32::INFINITY,
            min_y: f32::NEG_INFINITY,
            max_y: f32::INFINITY,
            snap_to: 0.0,
            scale,
        }
    }

    /// Scaled, snapped and clamped position plus angle in degrees.
    ///
    /// `None` while the body is destroyed.
    pub fn placement(&self) -> Option<(f32, f32, f32)> {
        let state = self.body.state()?;
        let mut x = state.x * self.scale;
        let mut y = state.y * self.scale;
        if self.snap_to > 0.0 {
            x = (x / self.snap_to).round() * self.snap_to;
            y = (y / self.snap_to).round() * self.snap_to;
        }
        x = x.max(self.min_x).min(self.max_x);
        y = y.max(self.min_y).min(self.max_y);
        Some((x, y, state.angle.to_degrees()))
    }
}

pub enum Decoration {
    Translate { x: f32, y: f32, z: f32 },
    Rotate { angle: f32, cx: f32, cy: f32 },
    Scale { sx: f32, sy: f32, s: f32 },
    Perspective { near: f32, origin: f32, far: f32, depth_buffer: bool },
    Pitch { pitch: f32 },
    Tint { r: f32, g: f32, b: f32, a: f32 },
    Blend(BlendMode),
    HitFilter(Bounds),
    DownFilter(Bounds),
    Wrap,
    BodyTracker(BodyTracker),
}

pub enum Leaf {
    Rect(Bounds),
    Line { x1: f32, y1: f32, x2: f32, y2: f32 },
    Triangle([f32; 6]),
    Ellipse { x: f32, y: f32, rx: f32, ry: f32 },
    Image(ImageQuad),
    /// Batch of textured quads read from a vector, `column` is 0-based.
    DrawQuads { vector: Rc<FloatVector>, column: usize, image: Rc<SceneNode> },
    DrawVector {
        vector: Rc<FloatVector>,
        mode: DrawMode,
        layout: VertexLayout,
        image: Option<Rc<SceneNode>>,
    },
}

pub enum NodeKind {
    Layer(Layer),
    Decorator { decoration: Decoration, child: Rc<SceneNode> },
    Leaf(Leaf),
}

/// Child a pointer event should be forwarded to, in the child's coordinates.
pub type EventTarget = (Rc<SceneNode>, f32, f32);

pub struct SceneNode {
    kind: RefCell<NodeKind>,
    handlers: RefCell<SmallVec<[Rc<PointerHandler>; 2]>>,
    slot: WrapSlot,
}

impl SceneNode {
    pub fn new(kind: NodeKind) -> Rc<Self> {
        Rc::new(Self {
            kind: RefCell::new(kind),
            handlers: RefCell::new(SmallVec::new()),
            slot: WrapSlot::default(),
        })
    }

    pub fn layer() -> Rc<Self> {
        Self::new(NodeKind::Layer(Layer::new()))
    }

    pub fn decorator(decoration: Decoration, child: Rc<SceneNode>) -> Rc<Self> {
        Self::new(NodeKind::Decorator { decoration, child })
    }

    pub fn leaf(leaf: Leaf) -> Rc<Self> {
        Self::new(NodeKind::Leaf(leaf))
    }

    pub fn wrap_slot(&self) -> &WrapSlot {
        &self.slot
    }

    pub fn kind(&self) -> Ref<'_, NodeKind> {
        self.kind.borrow()
    }

    pub fn kind_mut(&self) -> RefMut<'_, NodeKind> {
        self.kind.borrow_mut()
    }

    pub fn object_type(&self) -> ObjectType {
        match &*self.kind.borrow() {
            NodeKind::Layer(_) => ObjectType::Layer,
            NodeKind::Decorator { decoration, .. } => match decoration {
                Decoration::Translate { .. } => ObjectType::Translate,
                Decoration::Rotate { .. } => ObjectType::Rotate,
                Decoration::Scale { .. } => ObjectType::Scale,
                Decoration::Perspective { .. } => ObjectType::Perspective,
                Decoration::Pitch { .. } => ObjectType::Pitch,
                Decoration::Tint { .. } => ObjectType::Tint,
                Decoration::Blend(_) => ObjectType::Blend,
                Decoration::HitFilter(_) => ObjectType::HitFilter,
                Decoration::DownFilter(_) => ObjectType::DownFilter,
                Decoration::Wrap => ObjectType::Wrap,
                Decoration::BodyTracker(_) => ObjectType::BodyTracker,
            },
            NodeKind::Leaf(leaf) => match leaf {
                Leaf::Rect(_) => ObjectType::Rect,
                Leaf::Line { .. } => ObjectType::Line,
                Leaf::Triangle(_) => ObjectType::Triangle,
                Leaf::Ellipse { .. } => ObjectType::Ellipse,
                Leaf::Image(_) => ObjectType::Image,
                Leaf::DrawQuads { .. } => ObjectType::DrawQuads,
                Leaf::DrawVector { .. } => ObjectType::DrawVector,
            },
        }
    }

    /// Runs `f` on the child list if this node is a layer.
    pub fn with_layer<R>(&self, f: impl FnOnce(&mut Layer) -> R) -> Option<R> {
        match &mut *self.kind.borrow_mut() {
            NodeKind::Layer(layer) => Some(f(layer)),
            _ => None,
        }
    }

    /// The single child of a decorator.
    pub fn child(&self) -> Option<Rc<SceneNode>> {
        match &*self.kind.borrow() {
            NodeKind::Decorator { child, .. } => Some(child.clone()),
            _ => None,
        }
    }

    /// Swaps a decorator's child, returning the previous one.
    pub fn replace_child(&self, new_child: Rc<SceneNode>) -> Option<Rc<SceneNode>> {
        match &mut *self.kind.borrow_mut() {
            NodeKind::Decorator { child, .. } => Some(std::mem::replace(child, new_child)),
            _ => None,
        }
    }

    /// Quad data of an `Image` leaf.
    pub fn image(&self) -> Option<ImageQuad> {
        match &*self.kind.borrow() {
            NodeKind::Leaf(Leaf::Image(image)) => Some(image.clone()),
            _ => None,
        }
    }

    pub fn add_handler(&self, handler: PointerHandler) {
        self.handlers.borrow_mut().push(Rc::new(handler));
    }

    /// Snapshot of the handlers in registration order.
    pub fn handlers(&self) -> SmallVec<[Rc<PointerHandler>; 2]> {
        self.handlers.borrow().clone()
    }

    pub fn draw(&self, ctx: &mut dyn RenderContext) {
        match &*self.kind.borrow() {
            NodeKind::Layer(layer) => {
                for child in layer.children() {
                    child.draw(ctx);
                }
            }
            NodeKind::Decorator { decoration, child } => draw_decorated(decoration, child, ctx),
            NodeKind::Leaf(leaf) => draw_leaf(leaf, ctx),
        }
    }

    /// Containment test in this node's local coordinates.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        match &*self.kind.borrow() {
            NodeKind::Layer(layer) => layer.children().iter().any(|c| c.contains_point(x, y)),
            NodeKind::Decorator { decoration, child } => match decoration {
                Decoration::HitFilter(bounds) | Decoration::DownFilter(bounds) => {
                    bounds.contains(x, y)
                }
                _ => match to_child_space(decoration, x, y) {
                    Some((cx, cy)) => child.contains_point(cx, cy),
                    None => false,
                },
            },
            NodeKind::Leaf(leaf) => match leaf {
                Leaf::Rect(bounds) => bounds.contains(x, y),
                Leaf::Triangle(v) => triangle_contains(v, x, y),
                Leaf::Ellipse { x: cx, y: cy, rx, ry } => ellipse_contains(*cx, *cy, *rx, *ry, x, y),
                Leaf::Image(image) => image.bounds().contains(x, y),
                _ => false,
            },
        }
    }

    /// Children a pointer event continues to, front-most first.
    ///
    /// Filters drop the event here when it falls outside their rectangle;
    /// transforms without an inverse stop it entirely.
    pub fn event_targets(&self, x: f32, y: f32, kind: PointerEventKind) -> SmallVec<[EventTarget; 4]> {
        let mut targets = SmallVec::new();
        match &*self.kind.borrow() {
            NodeKind::Layer(layer) => {
                for child in layer.children().iter().rev() {
                    targets.push((child.clone(), x, y));
                }
            }
            NodeKind::Decorator { decoration, child } => {
                let blocked = match decoration {
                    Decoration::HitFilter(bounds) => !bounds.contains(x, y),
                    Decoration::DownFilter(bounds) => {
                        kind == PointerEventKind::Down && !bounds.contains(x, y)
                    }
                    _ => false,
                };
                if !blocked {
                    if let Some((cx, cy)) = to_child_space(decoration, x, y) {
                        targets.push((child.clone(), cx, cy));
                    }
                }
            }
            NodeKind::Leaf(_) => {}
        }
        targets
    }

    /// Reads a numeric property by script-facing name.
    pub fn field(&self, name: &str) -> Option<f32> {
        self.kind.borrow_mut().field_mut(name).map(|v| *v)
    }

    /// Writes a numeric property; false when the node has no such field.
    pub fn set_field(&self, name: &str, value: f32) -> bool {
        match self.kind.borrow_mut().field_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl NodeKind {
    fn field_mut(&mut self, name: &str) -> Option<&mut f32> {
        match self {
            NodeKind::Layer(_) => None,
            NodeKind::Decorator { decoration, .. } => match (decoration, name) {
                (Decoration::Translate { x, .. }, "x") => Some(x),
                (Decoration::Translate { y, .. }, "y") => Some(y),
                (Decoration::Translate { z, .. }, "z") => Some(z),
                (Decoration::Rotate { angle, .. }, "angle") => Some(angle),
                (Decoration::Rotate { cx, .. }, "cx") => Some(cx),
                (Decoration::Rotate { cy, .. }, "cy") => Some(cy),
                (Decoration::Scale { sx, .. }, "sx") => Some(sx),
                (Decoration::Scale { sy, .. }, "sy") => Some(sy),
                (Decoration::Scale { s, .. }, "s") => Some(s),
                (Decoration::Perspective { near, .. }, "near") => Some(near),
                (Decoration::Perspective { origin, .. }, "origin") => Some(origin),
                (Decoration::Perspective { far, .. }, "far") => Some(far),
                (Decoration::Pitch { pitch }, "pitch") => Some(pitch),
                (Decoration::Tint { r, .. }, "r") => Some(r),
                (Decoration::Tint { g, .. }, "g") => Some(g),
                (Decoration::Tint { b, .. }, "b") => Some(b),
                (Decoration::Tint { a, .. }, "a") => Some(a),
                (Decoration::HitFilter(bounds) | Decoration::DownFilter(bounds), _) => {
                    bounds_field(bounds, name)
                }
                (Decoration::BodyTracker(t), "min_x") => Some(&mut t.min_x),
                (Decoration::BodyTracker(t), "max_x") => Some(&mut t.max_x),
                (Decoration::BodyTracker(t), "min_y") => Some(&mut t.min_y),
                (Decoration::BodyTracker(t), "max_y") => Some(&mut t.max_y),
                (Decoration::BodyTracker(t), "snap_to") => Some(&mut t.snap_to),
                _ => None,
            },
            NodeKind::Leaf(leaf) => match (leaf, name) {
                (Leaf::Rect(bounds), _) => bounds_field(bounds, name),
                (Leaf::Line { x1, .. }, "x1") => Some(x1),
                (Leaf::Line { y1, .. }, "y1") => Some(y1),
                (Leaf::Line { x2, .. }, "x2") => Some(x2),
                (Leaf::Line { y2, .. }, "y2") => Some(y2),
                (Leaf::Triangle(v), _) => {
                    let i = ["x1", "y1", "x2", "y2", "x3", "y3"]
                        .iter()
                        .position(|n| *n == name)?;
                    Some(&mut v[i])
                }
                (Leaf::Ellipse { x, .. }, "x") => Some(x),
                (Leaf::Ellipse { y, .. }, "y") => Some(y),
                (Leaf::Ellipse { rx, .. }, "rx") => Some(rx),
                (Leaf::Ellipse { ry, .. }, "ry") => Some(ry),
                _ => None,
            },
        }
    }
}

fn bounds_field<'a>(bounds: &'a mut Bounds, name: &str) -> Option<&'a mut f32> {
    match name {
        "left" => Some(&mut bounds.left),
        "bottom" => Some(&mut bounds.bottom),
        "right" => Some(&mut bounds.right),
        "top" => Some(&mut bounds.top),
        _ => None,
    }
}

/// Maps a point from a decorator's space into its child's space.
fn to_child_space(decoration: &Decoration, x: f32, y: f32) -> Option<(f32, f32)> {
    match decoration {
        Decoration::Translate { x: tx, y: ty, .. } => Some((x - tx, y - ty)),
        Decoration::Rotate { angle, cx, cy } => Some(inverse_rotate(x, y, *angle, *cx, *cy)),
        Decoration::Scale { sx, sy, s } => inverse_scale(x, y, sx * s, sy * s),
        Decoration::Perspective { .. } | Decoration::Pitch { .. } => None,
        Decoration::BodyTracker(tracker) => {
            if tracker.viewport_mode {
                return None;
            }
            let (bx, by, degrees) = tracker.placement()?;
            let local = Vector2 { x: x - bx, y: y - by };
            let local = if tracker.track_rotation {
                rotate(local, -degrees)
            } else {
                local
            };
            Some((local.x, local.y))
        }
        Decoration::Tint { .. }
        | Decoration::Blend(_)
        | Decoration::HitFilter(_)
        | Decoration::DownFilter(_)
        | Decoration::Wrap => Some((x, y)),
    }
}

fn draw_decorated(decoration: &Decoration, child: &SceneNode, ctx: &mut dyn RenderContext) {
    match decoration {
        Decoration::Translate { x, y, z } => {
            ctx.push_matrix();
            ctx.translate(*x, *y, *z);
            child.draw(ctx);
            ctx.pop_matrix();
        }
        Decoration::Rotate { angle, cx, cy } => {
            ctx.push_matrix();
            ctx.translate(*cx, *cy, 0.0);
            ctx.rotate(*angle);
            ctx.translate(-cx, -cy, 0.0);
            child.draw(ctx);
            ctx.pop_matrix();
        }
        Decoration::Scale { sx, sy, s } => {
            ctx.push_matrix();
            ctx.scale(sx * s, sy * s);
            child.draw(ctx);
            ctx.pop_matrix();
        }
        Decoration::Perspective { near, origin, far, depth_buffer } => {
            ctx.push_matrix();
            ctx.perspective(*near, *origin, *far, *depth_buffer);
            child.draw(ctx);
            ctx.pop_matrix();
        }
        Decoration::Pitch { pitch } => {
            ctx.push_matrix();
            ctx.pitch(*pitch);
            child.draw(ctx);
            ctx.pop_matrix();
        }
        Decoration::Tint { r, g, b, a } => {
            ctx.push_tint(*r, *g, *b, *a);
            child.draw(ctx);
            ctx.pop_tint();
        }
        Decoration::Blend(mode) => {
            ctx.push_blend_mode(*mode);
            child.draw(ctx);
            ctx.pop_blend_mode();
        }
        Decoration::HitFilter(_) | Decoration::DownFilter(_) | Decoration::Wrap => child.draw(ctx),
        Decoration::BodyTracker(tracker) => {
            let Some((x, y, degrees)) = tracker.placement() else {
                return;
            };
            ctx.push_matrix();
            if tracker.viewport_mode {
                if tracker.track_rotation {
                    ctx.rotate(-degrees);
                }
                ctx.translate(-x, -y, 0.0);
            } else {
                ctx.translate(x, y, 0.0);
                if tracker.track_rotation {
                    ctx.rotate(degrees);
                }
            }
            child.draw(ctx);
            ctx.pop_matrix();
        }
    }
}

fn draw_leaf(leaf: &Leaf, ctx: &mut dyn RenderContext) {
    match leaf {
        Leaf::Rect(bounds) => ctx.draw_rect(bounds, true),
        Leaf::Line { x1, y1, x2, y2 } => ctx.draw_line(*x1, *y1, *x2, *y2),
        Leaf::Triangle(v) => ctx.draw_triangle(v),
        Leaf::Ellipse { x, y, rx, ry } => ctx.draw_ellipse(*x, *y, *rx, *ry, true),
        Leaf::Image(image) => ctx.draw_image(image),
        Leaf::DrawQuads { vector, column, image } => {
            if let Some(image) = image.image() {
                ctx.draw_textured_quads(&image.texture, &vector.data(), vector.stride(), *column);
            }
        }
        Leaf::DrawVector { vector, mode, layout, image } => {
            let texture = image.as_ref().and_then(|i| i.image()).map(|i| i.texture);
            ctx.draw_vertices(*mode, &vector.data(), layout, texture.as_deref());
        }
    }
}
