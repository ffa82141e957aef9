//! Native engine objects that scripts can hold handles to.
//!
//! Every object exposed to Lua is reference counted on the native side and
//! tagged with an [`ObjectType`]. The tag drives safe downcasting when a
//! script hands a handle back to the engine, and the [`WrapSlot`] remembers
//! where the object's wrapper lives in the weak store so repeated exposure
//! returns the same handle.

use std::cell::Cell;
use std::rc::Rc;

use crate::physics::objects::{Body, Fixture, PhysicsWorld};
use crate::scene::node::SceneNode;
use crate::scene::vector::FloatVector;

/// Type tag for every native object kind.
///
/// The tags form a shallow hierarchy: every scene node kind is a
/// `SceneNode`, and everything is an `Object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Object,
    SceneNode,
    Layer,
    Translate,
    Rotate,
    Scale,
    Perspective,
    Pitch,
    Tint,
    Blend,
    HitFilter,
    DownFilter,
    Wrap,
    BodyTracker,
    Rect,
    Line,
    Triangle,
    Ellipse,
    Image,
    DrawQuads,
    DrawVector,
    World,
    Body,
    Fixture,
    Vector,
}

impl ObjectType {
    /// Direct supertype, `None` for the root.
    pub fn parent(self) -> Option<ObjectType> {
        match self {
            ObjectType::Object => None,
            ObjectType::SceneNode
            | ObjectType::World
            | ObjectType::Body
            | ObjectType::Fixture
            | ObjectType::Vector => Some(ObjectType::Object),
            _ => Some(ObjectType::SceneNode),
        }
    }

    /// Whether `self` is `other` or one of its subtypes.
    pub fn is_a(self, other: ObjectType) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.parent();
        }
        false
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Object => "Object",
            ObjectType::SceneNode => "SceneNode",
            ObjectType::Layer => "Layer",
            ObjectType::Translate => "Translate",
            ObjectType::Rotate => "Rotate",
            ObjectType::Scale => "Scale",
            ObjectType::Perspective => "Perspective",
            ObjectType::Pitch => "Pitch",
            ObjectType::Tint => "Tint",
            ObjectType::Blend => "BlendMode",
            ObjectType::HitFilter => "HitFilter",
            ObjectType::DownFilter => "DownFilter",
            ObjectType::Wrap => "Wrap",
            ObjectType::BodyTracker => "BodyTracker",
            ObjectType::Rect => "Rect",
            ObjectType::Line => "Line",
            ObjectType::Triangle => "Triangle",
            ObjectType::Ellipse => "Ellipse",
            ObjectType::Image => "Image",
            ObjectType::DrawQuads => "DrawQuads",
            ObjectType::DrawVector => "DrawVector",
            ObjectType::World => "World",
            ObjectType::Body => "Body",
            ObjectType::Fixture => "Fixture",
            ObjectType::Vector => "Vector",
        }
    }
}

/// Weak-store slot of an object's Lua wrapper, if one was ever created.
///
/// The slot may point at an empty entry once the wrapper has been
/// collected; callers must treat that the same as "no wrapper".
#[derive(Debug, Default)]
pub struct WrapSlot(Cell<Option<i64>>);

impl WrapSlot {
    pub fn get(&self) -> Option<i64> {
        self.0.get()
    }

    pub fn set(&self, slot: i64) {
        self.0.set(Some(slot));
    }
}

/// Any native object a wrapper handle can point at.
#[derive(Clone)]
pub enum NativeObject {
    Node(Rc<SceneNode>),
    World(Rc<PhysicsWorld>),
    Body(Rc<Body>),
    Fixture(Rc<Fixture>),
    Vector(Rc<FloatVector>),
}

impl NativeObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            NativeObject::Node(node) => node.object_type(),
            NativeObject::World(_) => ObjectType::World,
            NativeObject::Body(_) => ObjectType::Body,
            NativeObject::Fixture(_) => ObjectType::Fixture,
            NativeObject::Vector(_) => ObjectType::Vector,
        }
    }

    pub fn wrap_slot(&self) -> &WrapSlot {
        match self {
            NativeObject::Node(node) => node.wrap_slot(),
            NativeObject::World(world) => world.wrap_slot(),
            NativeObject::Body(body) => body.wrap_slot(),
            NativeObject::Fixture(fixture) => fixture.wrap_slot(),
            NativeObject::Vector(vector) => vector.wrap_slot(),
        }
    }

    /// Identity comparison of the underlying allocation.
    pub fn ptr_eq(&self, other: &NativeObject) -> bool {
        match (self, other) {
            (NativeObject::Node(a), NativeObject::Node(b)) => Rc::ptr_eq(a, b),
            (NativeObject::World(a), NativeObject::World(b)) => Rc::ptr_eq(a, b),
            (NativeObject::Body(a), NativeObject::Body(b)) => Rc::ptr_eq(a, b),
            (NativeObject::Fixture(a), NativeObject::Fixture(b)) => Rc::ptr_eq(a, b),
            (NativeObject::Vector(a), NativeObject::Vector(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_node_kinds_are_scene_nodes() {
        assert!(ObjectType::Layer.is_a(ObjectType::SceneNode));
        assert!(ObjectType::HitFilter.is_a(ObjectType::SceneNode));
        assert!(ObjectType::Rect.is_a(ObjectType::Object));
    }

    #[test]
    fn test_physics_kinds_are_not_scene_nodes() {
        assert!(!ObjectType::Body.is_a(ObjectType::SceneNode));
        assert!(!ObjectType::Fixture.is_a(ObjectType::Body));
        assert!(ObjectType::World.is_a(ObjectType::Object));
    }

    #[test]
    fn test_supertype_is_not_a_subtype() {
        assert!(!ObjectType::SceneNode.is_a(ObjectType::Layer));
        assert!(!ObjectType::Object.is_a(ObjectType::Vector));
    }

    #[test]
    fn test_wrap_slot_starts_empty() {
        let slot = WrapSlot::default();
        assert_eq!(slot.get(), None);
        slot.set(7);
        assert_eq!(slot.get(), Some(7));
    }
}
