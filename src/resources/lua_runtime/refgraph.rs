//! Reference graph: strong fields on handles that keep related handles alive.
//!
//! Native composition (a layer's children, a decorator's child, a world's
//! bodies) is invisible to the Lua GC. Every such link is mirrored as an
//! edge stored in the source handle's `refs` user value, so a handle stays
//! reachable exactly as long as something that natively points at it does.
//!
//! Two edge shapes exist. A named edge `refs[name] = target` is used for
//! single-valued links and is overwritten by re-adding the same name. A
//! membership edge `refs[target] = true` is used for sets: layer children,
//! handler callbacks and many-to-many links.

use mlua::prelude::*;

use super::bridge::Handle;
use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKey<'a> {
    Named(&'a str),
    Member,
}

fn refs_of(source: &LuaAnyUserData) -> LuaResult<LuaTable> {
    source.user_value::<LuaTable>()
}

fn ensure_live_target(target: &LuaValue) -> Result<(), BridgeError> {
    if let LuaValue::UserData(ud) = target {
        if let Ok(handle) = ud.borrow::<Handle>() {
            if handle.is_destroyed() {
                return Err(BridgeError::NullReference {
                    ty: handle.object_type().name(),
                });
            }
        }
    }
    Ok(())
}

/// Installs an edge from `source` to `target`.
///
/// Edges to handles whose native is already destroyed are refused.
pub fn add_edge(lua: &Lua, source: &LuaAnyUserData, key: EdgeKey, target: impl IntoLua) -> LuaResult<()> {
    let target = target.into_lua(lua)?;
    ensure_live_target(&target)?;
    let refs = refs_of(source)?;
    match key {
        EdgeKey::Named(name) => refs.raw_set(name, target),
        EdgeKey::Member => refs.raw_set(target, true),
    }
}

/// Clears an edge; a named edge is cleared whatever it points at.
pub fn remove_edge(lua: &Lua, source: &LuaAnyUserData, key: EdgeKey, target: impl IntoLua) -> LuaResult<()> {
    let refs = refs_of(source)?;
    match key {
        EdgeKey::Named(name) => refs.raw_set(name, LuaValue::Nil),
        EdgeKey::Member => {
            let target = target.into_lua(lua)?;
            if target.is_nil() {
                return Ok(());
            }
            refs.raw_set(target, LuaValue::Nil)
        }
    }
}

/// Whether `source` has an edge of shape `key` to `target`.
pub fn has_edge(lua: &Lua, source: &LuaAnyUserData, key: EdgeKey, target: impl IntoLua) -> LuaResult<bool> {
    let target = target.into_lua(lua)?;
    if target.is_nil() {
        return Ok(false);
    }
    let refs = refs_of(source)?;
    match key {
        EdgeKey::Named(name) => Ok(refs.raw_get::<LuaValue>(name)? == target),
        EdgeKey::Member => Ok(!refs.raw_get::<LuaValue>(target)?.is_nil()),
    }
}

/// Target of the named edge `name`, nil when absent.
pub fn edge_target(source: &LuaAnyUserData, name: &str) -> LuaResult<LuaValue> {
    refs_of(source)?.raw_get(name)
}

/// Removes every edge from `source` that points at `target`, named or not.
pub fn prune_edges_to(source: &LuaAnyUserData, target: &LuaAnyUserData) -> LuaResult<()> {
    let refs = refs_of(source)?;
    let target = LuaValue::UserData(target.clone());
    let mut stale = Vec::new();
    for pair in refs.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        if key == target || value == target {
            stale.push(key);
        }
    }
    for key in stale {
        refs.raw_set(key, LuaValue::Nil)?;
    }
    Ok(())
}

/// Number of edges leaving `source`.
pub fn edge_count(source: &LuaAnyUserData) -> LuaResult<usize> {
    let refs = refs_of(source)?;
    let mut count = 0;
    for pair in refs.pairs::<LuaValue, LuaValue>() {
        pair?;
        count += 1;
    }
    Ok(count)
}
