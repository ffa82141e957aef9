//! Object bridge between the Lua heap and natively owned objects.
//!
//! Every native object handed to a script is wrapped in a [`Handle`]
//! userdata. Handles are memoized through a registry-held weak table, so
//! wrapping the same object twice yields the same handle for as long as the
//! script can still see it. The same weak table also holds script
//! callbacks that natives refer to by slot number.
//!
//! Ownership is split in two. The Lua GC owns handles; a handle owns one
//! strong `Rc` on its native. When the GC finalizes a handle that `Rc` is
//! dropped, which deletes the native if nothing native still holds it.
//! Native teardown never frees anything reachable from Lua: it clears the
//! handle's pointer with [`Handle::clear`] and leaves finalization to the GC.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mlua::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::BridgeError;
use crate::objects::{NativeObject, ObjectType};
use crate::physics::objects::{Body, Fixture, PhysicsWorld};
use crate::scene::node::SceneNode;
use crate::scene::vector::FloatVector;

const WEAK_STORE_KEY: &str = "lantern.weak_store";

/// Per-state bridge bookkeeping, kept in Lua app data.
struct BridgeState {
    next_slot: Cell<i64>,
    /// Script-callable methods per object type, looked up by `__index`.
    methods: RefCell<FxHashMap<ObjectType, FxHashMap<String, LuaRegistryKey>>>,
}

/// Script-visible proxy for a native object.
///
/// The first user value of every handle is its `refs` table, the storage
/// for reference graph edges.
pub struct Handle {
    ty: ObjectType,
    object: RefCell<Option<NativeObject>>,
}

impl Handle {
    pub fn object_type(&self) -> ObjectType {
        self.ty
    }

    /// The native object, `None` once it was destroyed natively.
    pub fn object(&self) -> Option<NativeObject> {
        self.object.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        match &*self.object.borrow() {
            None => true,
            Some(NativeObject::Body(body)) => body.is_destroyed(),
            Some(NativeObject::Fixture(fixture)) => fixture.is_destroyed(),
            Some(_) => false,
        }
    }

    /// Drops the handle's reference to its native.
    pub fn clear(&self) {
        self.object.borrow_mut().take();
    }

    fn live_object(&self) -> Result<NativeObject, BridgeError> {
        match self.object() {
            Some(object) if !self.is_destroyed() => Ok(object),
            _ => Err(BridgeError::NullReference { ty: self.ty.name() }),
        }
    }

    fn index(&self, lua: &Lua, key: &str) -> LuaResult<LuaValue> {
        match key {
            "destroyed" => return Ok(LuaValue::Boolean(self.is_destroyed())),
            "type" => return lua.create_string(self.ty.name()).map(LuaValue::String),
            _ => {}
        }
        if let Some(method) = find_method(lua, self.ty, key)? {
            return Ok(LuaValue::Function(method));
        }
        let object = self.live_object()?;
        Ok(native_field(&object, key)
            .map(LuaValue::Number)
            .unwrap_or(LuaValue::Nil))
    }

    fn new_index(&self, key: &str, value: LuaValue) -> LuaResult<()> {
        let object = self.live_object()?;
        let value = number_arg(key, &value)?;
        set_native_field(&object, key, value)?;
        Ok(())
    }
}

impl LuaUserData for Handle {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(LuaMetaMethod::Index, |lua, this, key: String| {
            this.index(lua, &key)
        });
        methods.add_meta_method(
            LuaMetaMethod::NewIndex,
            |_, this, (key, value): (String, LuaValue)| this.new_index(&key, value),
        );
        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
            if this.is_destroyed() {
                Ok(format!("{} (destroyed)", this.ty.name()))
            } else {
                Ok(this.ty.name().to_string())
            }
        });
    }
}

/// Creates the weak store and bridge state on a fresh Lua state.
pub fn install(lua: &Lua) -> LuaResult<()> {
    let store: LuaTable = lua
        .load("return setmetatable({}, { __mode = 'v' })")
        .set_name("weak_store")
        .eval()?;
    lua.set_named_registry_value(WEAK_STORE_KEY, store)?;
    lua.set_app_data(BridgeState {
        next_slot: Cell::new(0),
        methods: RefCell::new(FxHashMap::default()),
    });
    Ok(())
}

fn weak_store(lua: &Lua) -> LuaResult<LuaTable> {
    lua.named_registry_value(WEAK_STORE_KEY)
}

fn next_slot(lua: &Lua) -> LuaResult<i64> {
    let state = lua
        .app_data_ref::<BridgeState>()
        .ok_or_else(|| LuaError::runtime("bridge is not installed"))?;
    let slot = state.next_slot.get() + 1;
    state.next_slot.set(slot);
    Ok(slot)
}

/// Puts `value` in the weak store without keeping it alive.
pub fn store_weak(lua: &Lua, value: impl IntoLua) -> LuaResult<i64> {
    let slot = next_slot(lua)?;
    weak_store(lua)?.raw_set(slot, value)?;
    Ok(slot)
}

/// Value at `slot`, or nil once it has been collected.
pub fn load_weak(lua: &Lua, slot: i64) -> LuaResult<LuaValue> {
    weak_store(lua)?.raw_get(slot)
}

/// Makes `name` callable as a method on handles of type `ty` and its subtypes.
pub fn register_method(lua: &Lua, ty: ObjectType, name: &str, func: LuaFunction) -> LuaResult<()> {
    let key = lua.create_registry_value(func)?;
    let state = lua
        .app_data_ref::<BridgeState>()
        .ok_or_else(|| LuaError::runtime("bridge is not installed"))?;
    state
        .methods
        .borrow_mut()
        .entry(ty)
        .or_default()
        .insert(name.to_string(), key);
    Ok(())
}

/// Publishes `func` as `engine.<name>(obj, ...)` and as `obj:<name>(...)`.
pub fn export_method(
    lua: &Lua,
    engine: &LuaTable,
    ty: ObjectType,
    name: &str,
    func: LuaFunction,
) -> LuaResult<()> {
    engine.set(name, func.clone())?;
    register_method(lua, ty, name, func)
}

fn find_method(lua: &Lua, ty: ObjectType, name: &str) -> LuaResult<Option<LuaFunction>> {
    let Some(state) = lua.app_data_ref::<BridgeState>() else {
        return Ok(None);
    };
    let methods = state.methods.borrow();
    let mut current = Some(ty);
    while let Some(ty) = current {
        if let Some(key) = methods.get(&ty).and_then(|m| m.get(name)) {
            return lua.registry_value(key).map(Some);
        }
        current = ty.parent();
    }
    Ok(None)
}

/// Returns the handle for `object`, creating it on first exposure.
pub fn wrap(lua: &Lua, object: NativeObject) -> LuaResult<LuaAnyUserData> {
    if let Some(handle) = existing_handle(lua, &object)? {
        return Ok(handle);
    }
    let ud = lua.create_userdata(Handle {
        ty: object.object_type(),
        object: RefCell::new(Some(object.clone())),
    })?;
    ud.set_user_value(lua.create_table()?)?;
    let slot = store_weak(lua, ud.clone())?;
    object.wrap_slot().set(slot);
    Ok(ud)
}

pub fn wrap_node(lua: &Lua, node: &Rc<SceneNode>) -> LuaResult<LuaAnyUserData> {
    wrap(lua, NativeObject::Node(node.clone()))
}

pub fn wrap_world(lua: &Lua, world: &Rc<PhysicsWorld>) -> LuaResult<LuaAnyUserData> {
    wrap(lua, NativeObject::World(world.clone()))
}

pub fn wrap_body(lua: &Lua, body: &Rc<Body>) -> LuaResult<LuaAnyUserData> {
    wrap(lua, NativeObject::Body(body.clone()))
}

pub fn wrap_fixture(lua: &Lua, fixture: &Rc<Fixture>) -> LuaResult<LuaAnyUserData> {
    wrap(lua, NativeObject::Fixture(fixture.clone()))
}

pub fn wrap_vector(lua: &Lua, vector: &Rc<FloatVector>) -> LuaResult<LuaAnyUserData> {
    wrap(lua, NativeObject::Vector(vector.clone()))
}

/// The live handle of `object`, if the script can still reach one.
pub fn existing_handle(lua: &Lua, object: &NativeObject) -> LuaResult<Option<LuaAnyUserData>> {
    let Some(slot) = object.wrap_slot().get() else {
        return Ok(None);
    };
    match load_weak(lua, slot)? {
        LuaValue::UserData(ud) if ud.is::<Handle>() => Ok(Some(ud)),
        _ => Ok(None),
    }
}

/// Clears the handle of a natively destroyed object and returns it.
pub fn invalidate(lua: &Lua, object: &NativeObject) -> LuaResult<Option<LuaAnyUserData>> {
    let handle = existing_handle(lua, object)?;
    if let Some(ud) = &handle {
        ud.borrow::<Handle>()?.clear();
    }
    Ok(handle)
}

/// Checks that `value` is a handle and returns it as userdata.
pub fn handle_of(value: &LuaValue, expected: ObjectType) -> Result<LuaAnyUserData, BridgeError> {
    match value {
        LuaValue::UserData(ud) if ud.is::<Handle>() => Ok(ud.clone()),
        other => Err(BridgeError::TypeError {
            expected: expected.name(),
            found: other.type_name().to_string(),
        }),
    }
}

/// Resolves a handle to its native object.
///
/// Fails with `TypeError` unless `value` is a handle of `expected` or one of
/// its subtypes, and with `NullReference` once the native was destroyed.
pub fn unwrap(value: &LuaValue, expected: ObjectType) -> Result<NativeObject, BridgeError> {
    let ud = handle_of(value, expected)?;
    let handle = ud.borrow::<Handle>().map_err(|_| BridgeError::TypeError {
        expected: expected.name(),
        found: "userdata".to_string(),
    })?;
    if !handle.ty.is_a(expected) {
        return Err(BridgeError::TypeError {
            expected: expected.name(),
            found: handle.ty.name().to_string(),
        });
    }
    handle.live_object()
}

fn mismatch(expected: ObjectType, found: &NativeObject) -> BridgeError {
    BridgeError::TypeError {
        expected: expected.name(),
        found: found.object_type().name().to_string(),
    }
}

pub fn unwrap_node(value: &LuaValue, expected: ObjectType) -> Result<Rc<SceneNode>, BridgeError> {
    match unwrap(value, expected)? {
        NativeObject::Node(node) => Ok(node),
        other => Err(mismatch(expected, &other)),
    }
}

pub fn unwrap_world(value: &LuaValue) -> Result<Rc<PhysicsWorld>, BridgeError> {
    match unwrap(value, ObjectType::World)? {
        NativeObject::World(world) => Ok(world),
        other => Err(mismatch(ObjectType::World, &other)),
    }
}

pub fn unwrap_body(value: &LuaValue) -> Result<Rc<Body>, BridgeError> {
    match unwrap(value, ObjectType::Body)? {
        NativeObject::Body(body) => Ok(body),
        other => Err(mismatch(ObjectType::Body, &other)),
    }
}

pub fn unwrap_fixture(value: &LuaValue) -> Result<Rc<Fixture>, BridgeError> {
    match unwrap(value, ObjectType::Fixture)? {
        NativeObject::Fixture(fixture) => Ok(fixture),
        other => Err(mismatch(ObjectType::Fixture, &other)),
    }
}

pub fn unwrap_vector(value: &LuaValue) -> Result<Rc<FloatVector>, BridgeError> {
    match unwrap(value, ObjectType::Vector)? {
        NativeObject::Vector(vector) => Ok(vector),
        other => Err(mismatch(ObjectType::Vector, &other)),
    }
}

fn number_arg(name: &str, value: &LuaValue) -> Result<f64, BridgeError> {
    match value {
        LuaValue::Number(n) => Ok(*n),
        LuaValue::Integer(i) => Ok(*i as f64),
        other => Err(BridgeError::argument(format!(
            "field '{}' expects a number, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Reads a numeric property of a native object by its script-facing name.
pub fn native_field(object: &NativeObject, name: &str) -> Option<f64> {
    match object {
        NativeObject::Node(node) => node.field(name).map(f64::from),
        NativeObject::Body(body) => {
            let state = body.state()?;
            let value = match name {
                "x" => state.x,
                "y" => state.y,
                "angle" => state.angle,
                "vx" => state.vx,
                "vy" => state.vy,
                "angular_velocity" => state.angular_velocity,
                "scale" => body.scale(),
                _ => return None,
            };
            Some(f64::from(value))
        }
        NativeObject::World(world) => {
            let (gx, gy) = world.gravity();
            match name {
                "gravity_x" => Some(f64::from(gx)),
                "gravity_y" => Some(f64::from(gy)),
                "scale" => Some(f64::from(world.scale())),
                _ => None,
            }
        }
        NativeObject::Vector(vector) => match name {
            "rows" => Some(vector.rows() as f64),
            "stride" => Some(vector.stride() as f64),
            _ => None,
        },
        NativeObject::Fixture(_) => None,
    }
}

/// Writes a numeric property of a native object.
pub fn set_native_field(object: &NativeObject, name: &str, value: f64) -> Result<(), BridgeError> {
    let v = value as f32;
    let written = match object {
        NativeObject::Node(node) => node.set_field(name, v),
        NativeObject::Body(body) => {
            let known = matches!(name, "x" | "y" | "angle" | "vx" | "vy" | "angular_velocity");
            known
                && body.update_state(|state| match name {
                    "x" => state.x = v,
                    "y" => state.y = v,
                    "angle" => state.angle = v,
                    "vx" => state.vx = v,
                    "vy" => state.vy = v,
                    _ => state.angular_velocity = v,
                })
        }
        NativeObject::World(world) => {
            let (gx, gy) = world.gravity();
            match name {
                "gravity_x" => {
                    world.set_gravity(v, gy);
                    true
                }
                "gravity_y" => {
                    world.set_gravity(gx, v);
                    true
                }
                _ => false,
            }
        }
        NativeObject::Vector(_) | NativeObject::Fixture(_) => false,
    };
    if written {
        return Ok(());
    }
    if native_field(object, name).is_some() {
        Err(BridgeError::argument(format!(
            "field '{}' of {} is read-only",
            name,
            object.object_type().name()
        )))
    } else {
        Err(BridgeError::argument(format!(
            "{} has no field '{}'",
            object.object_type().name(),
            name
        )))
    }
}
