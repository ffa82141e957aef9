//! Pointer handler registration and propagation from scripts.

use std::rc::Rc;

use mlua::prelude::*;

use super::bridge::{export_method, handle_of, load_weak, store_weak, unwrap_node};
use super::refgraph::{EdgeKey, add_edge};
use super::runtime::{LuaRuntime, app_data};
use crate::events::pointer::{
    CallbackDispatch, CallbackRef, PointerEvent, PointerEventKind, PointerHandler,
};
use crate::objects::ObjectType;
use crate::scene::node::SceneNode;

const EXCLUSIVE_KEY: &str = "lantern.exclusive_receiver";

/// Runs handler callbacks stored in the weak store.
pub struct LuaDispatch<'a> {
    lua: &'a Lua,
}

impl<'a> LuaDispatch<'a> {
    pub fn new(lua: &'a Lua) -> Self {
        Self { lua }
    }
}

impl CallbackDispatch for LuaDispatch<'_> {
    type Error = LuaError;

    fn invoke(&mut self, callback: CallbackRef, input_id: i64, x: f32, y: f32) -> LuaResult<bool> {
        let LuaValue::Function(func) = load_weak(self.lua, callback.0)? else {
            return Ok(false);
        };
        // Only an explicit boolean lets the event through; nil consumes.
        match func.call::<LuaValue>((input_id, x, y))? {
            LuaValue::Boolean(consumed) => Ok(consumed),
            _ => Ok(true),
        }
    }
}

/// Routes `event` into `root`, or to the exclusive receiver while one is set.
pub fn dispatch_pointer(lua: &Lua, root: &Rc<SceneNode>, event: &PointerEvent) -> LuaResult<bool> {
    let data = app_data(lua)?;
    data.router.dispatch(root, event, &mut LuaDispatch::new(lua))
}

/// Keeps `func` alive through `handle` and returns its capability.
fn capture(lua: &Lua, handle: &LuaAnyUserData, func: Option<LuaFunction>) -> LuaResult<Option<CallbackRef>> {
    let Some(func) = func else {
        return Ok(None);
    };
    add_edge(lua, handle, EdgeKey::Member, func.clone())?;
    Ok(Some(CallbackRef(store_weak(lua, func)?)))
}

fn register_handler(
    lua: &Lua,
    engine: &LuaTable,
    name: &str,
    make: fn(CallbackRef) -> PointerHandler,
) -> LuaResult<()> {
    export_method(
        lua,
        engine,
        ObjectType::SceneNode,
        name,
        lua.create_function(move |lua, (node, func): (LuaValue, LuaFunction)| {
            let native = unwrap_node(&node, ObjectType::SceneNode)?;
            let handle = handle_of(&node, ObjectType::SceneNode)?;
            if let Some(callback) = capture(lua, &handle, Some(func))? {
                native.add_handler(make(callback));
            }
            Ok(())
        })?,
    )
}

fn register_propagate(lua: &Lua, engine: &LuaTable, name: &str, kind: PointerEventKind) -> LuaResult<()> {
    export_method(
        lua,
        engine,
        ObjectType::SceneNode,
        name,
        lua.create_function(move |lua, (node, input_id, x, y): (LuaValue, i64, f32, f32)| {
            let root = unwrap_node(&node, ObjectType::SceneNode)?;
            dispatch_pointer(lua, &root, &PointerEvent::new(kind, input_id, x, y))
        })?,
    )
}

impl LuaRuntime {
    /// Registers handler attachment, manual propagation and the exclusive receiver.
    pub(super) fn register_event_api(&self) -> LuaResult<()> {
        let lua = self.lua();
        let engine: LuaTable = lua.globals().get("engine")?;

        register_handler(lua, &engine, "add_pointer_down_handler", PointerHandler::Down)?;
        register_handler(lua, &engine, "add_pointer_down_in_handler", PointerHandler::DownIn)?;
        register_handler(lua, &engine, "add_pointer_up_handler", PointerHandler::Up)?;
        register_handler(lua, &engine, "add_pointer_up_in_handler", PointerHandler::UpIn)?;
        register_handler(lua, &engine, "add_pointer_move_handler", PointerHandler::Move)?;

        // engine.add_pointer_over_handler(node, enter [, exit])
        export_method(
            lua,
            &engine,
            ObjectType::SceneNode,
            "add_pointer_over_handler",
            lua.create_function(
                |lua, (node, enter, exit): (LuaValue, Option<LuaFunction>, Option<LuaFunction>)| {
                    let native = unwrap_node(&node, ObjectType::SceneNode)?;
                    let handle = handle_of(&node, ObjectType::SceneNode)?;
                    let enter = capture(lua, &handle, enter)?;
                    let exit = capture(lua, &handle, exit)?;
                    native.add_handler(PointerHandler::over(enter, exit));
                    Ok(())
                },
            )?,
        )?;

        register_propagate(lua, &engine, "propagate_pointer_down", PointerEventKind::Down)?;
        register_propagate(lua, &engine, "propagate_pointer_up", PointerEventKind::Up)?;
        register_propagate(lua, &engine, "propagate_pointer_move", PointerEventKind::Move)?;

        // The registry entry keeps the receiver's handle alive while it is set.
        engine.set(
            "set_exclusive_receiver",
            lua.create_function(|lua, node: LuaValue| {
                let native = unwrap_node(&node, ObjectType::SceneNode)?;
                lua.set_named_registry_value(EXCLUSIVE_KEY, node)?;
                app_data(lua)?.router.set_exclusive(Some(native));
                Ok(())
            })?,
        )?;
        engine.set(
            "clear_exclusive_receiver",
            lua.create_function(|lua, ()| {
                lua.set_named_registry_value(EXCLUSIVE_KEY, LuaValue::Nil)?;
                app_data(lua)?.router.set_exclusive(None);
                Ok(())
            })?,
        )?;
        engine.set(
            "exclusive_receiver",
            lua.create_function(|lua, ()| lua.named_registry_value::<LuaValue>(EXCLUSIVE_KEY))?,
        )?;

        Ok(())
    }
}
