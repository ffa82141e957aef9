//! Physics worlds, bodies and fixtures from scripts.
//!
//! World and body point at each other with membership edges, a body holds
//! each fixture with a membership edge and a fixture names its body. All of
//! them are pruned in both directions when a body or fixture is destroyed.

use std::rc::Rc;

use mlua::prelude::*;

use super::bridge::{
    Handle, existing_handle, export_method, handle_of, invalidate, unwrap_body, unwrap_fixture,
    unwrap_world, wrap_body, wrap_fixture, wrap_world,
};
use super::refgraph::{EdgeKey, add_edge, prune_edges_to};
use super::runtime::LuaRuntime;
use crate::error::BridgeError;
use crate::objects::{NativeObject, ObjectType};
use crate::physics::objects::{Body, PhysicsWorld};
use crate::physics::simulation::{BodyDef, BodyKind, BodyState, FixtureDef, Shape};
use crate::scene::transform::Bounds;

const DEFAULT_VELOCITY_ITERATIONS: u32 = 8;
const DEFAULT_POSITION_ITERATIONS: u32 = 3;

/// Reads `{x, y}` from `table[field]`.
fn pair_field(table: &LuaTable, field: &str) -> LuaResult<Option<(f32, f32)>> {
    match table.get::<LuaValue>(field)? {
        LuaValue::Nil => Ok(None),
        LuaValue::Table(pair) => Ok(Some((pair.raw_get(1)?, pair.raw_get(2)?))),
        other => Err(BridgeError::argument(format!(
            "expecting {} field to be a table, got {}",
            field,
            other.type_name()
        ))
        .into()),
    }
}

/// Body definition from a script table; angles are given in degrees.
fn body_def_from_table(table: &LuaTable) -> LuaResult<BodyDef> {
    let mut def = BodyDef::default();
    if let Some(kind) = table.get::<Option<String>>("type")? {
        def.kind = BodyKind::parse(&kind)?;
    }
    if let Some((x, y)) = pair_field(table, "position")? {
        def.state.x = x;
        def.state.y = y;
    }
    if let Some((vx, vy)) = pair_field(table, "velocity")? {
        def.state.vx = vx;
        def.state.vy = vy;
    }
    if let Some(angle) = table.get::<Option<f32>>("angle")? {
        def.state.angle = angle.to_radians();
    }
    if let Some(av) = table.get::<Option<f32>>("angular_velocity")? {
        def.state.angular_velocity = av.to_radians();
    }
    if let Some(damping) = table.get::<Option<f32>>("damping")? {
        def.linear_damping = damping;
    }
    if let Some(damping) = table.get::<Option<f32>>("angular_damping")? {
        def.angular_damping = damping;
    }
    if let Some(fixed) = table.get::<Option<bool>>("fixed_rotation")? {
        def.fixed_rotation = fixed;
    }
    Ok(def)
}

/// Fixture material: nothing, a bare density, or an attribute table.
fn fixture_def(lua: &Lua, attrs: LuaValue) -> LuaResult<FixtureDef> {
    match attrs {
        LuaValue::Nil => Ok(FixtureDef::default()),
        LuaValue::Integer(density) => Ok(FixtureDef {
            density: density as f32,
            ..FixtureDef::default()
        }),
        LuaValue::Number(density) => Ok(FixtureDef {
            density: density as f32,
            ..FixtureDef::default()
        }),
        table @ LuaValue::Table(_) => lua.from_value(table),
        other => Err(BridgeError::argument(format!(
            "fixture attributes must be a table, got {}",
            other.type_name()
        ))
        .into()),
    }
}

/// Wraps a new body and links it with its world both ways.
fn push_body(lua: &Lua, world_handle: &LuaAnyUserData, body: &Rc<Body>) -> LuaResult<LuaAnyUserData> {
    let handle = wrap_body(lua, body)?;
    add_edge(lua, world_handle, EdgeKey::Member, handle.clone())?;
    add_edge(lua, &handle, EdgeKey::Member, world_handle.clone())?;
    Ok(handle)
}

fn add_fixture(
    lua: &Lua,
    body_value: &LuaValue,
    shape: Shape,
    attrs: LuaValue,
) -> LuaResult<Option<LuaAnyUserData>> {
    let body = unwrap_body(body_value)?;
    let body_handle = handle_of(body_value, ObjectType::Body)?;
    let def = fixture_def(lua, attrs)?;
    let Some(fixture) = body.add_fixture(shape, &def) else {
        return Ok(None);
    };
    let handle = wrap_fixture(lua, &fixture)?;
    add_edge(lua, &body_handle, EdgeKey::Member, handle.clone())?;
    add_edge(lua, &handle, EdgeKey::Named("body"), body_handle)?;
    Ok(Some(handle))
}

fn unlink(a: &LuaAnyUserData, b: &LuaAnyUserData) -> LuaResult<()> {
    prune_edges_to(a, b)?;
    prune_edges_to(b, a)
}

/// Destroys a body, its fixtures, and every edge between them and the world.
fn destroy_body(lua: &Lua, value: &LuaValue) -> LuaResult<()> {
    let handle = handle_of(value, ObjectType::Body)?;
    let Some(NativeObject::Body(body)) = handle.borrow::<Handle>()?.object() else {
        return Ok(());
    };
    let world = body.world();
    for fixture in body.destroy() {
        if let Some(fixture_handle) = invalidate(lua, &NativeObject::Fixture(fixture))? {
            unlink(&handle, &fixture_handle)?;
        }
    }
    if let Some(world) = world {
        if let Some(world_handle) = existing_handle(lua, &NativeObject::World(world))? {
            unlink(&handle, &world_handle)?;
        }
    }
    invalidate(lua, &NativeObject::Body(body))?;
    Ok(())
}

fn destroy_fixture(lua: &Lua, value: &LuaValue) -> LuaResult<()> {
    let handle = handle_of(value, ObjectType::Fixture)?;
    let Some(NativeObject::Fixture(fixture)) = handle.borrow::<Handle>()?.object() else {
        return Ok(());
    };
    if let Some(body) = fixture.destroy() {
        if let Some(body_handle) = existing_handle(lua, &NativeObject::Body(body))? {
            unlink(&handle, &body_handle)?;
        }
    }
    invalidate(lua, &NativeObject::Fixture(fixture))?;
    Ok(())
}

impl LuaRuntime {
    /// Registers world, body and fixture functions.
    pub(super) fn register_physics_api(&self) -> LuaResult<()> {
        let lua = self.lua();
        let engine: LuaTable = lua.globals().get("engine")?;

        // engine.World([scale = 1])
        engine.set(
            "World",
            lua.create_function(|lua, scale: Option<f32>| {
                wrap_world(lua, &PhysicsWorld::new(scale.unwrap_or(1.0)))
            })?,
        )?;

        // engine.add_body(world, {type=, position={x, y}, angle=, ...})
        export_method(
            lua,
            &engine,
            ObjectType::World,
            "add_body",
            lua.create_function(|lua, (world, def): (LuaValue, LuaTable)| {
                let native = unwrap_world(&world)?;
                let def = body_def_from_table(&def)?;
                let body = native.add_body(&def);
                push_body(lua, &handle_of(&world, ObjectType::World)?, &body)
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::World,
            "add_static_body",
            lua.create_function(|lua, world: LuaValue| {
                let native = unwrap_world(&world)?;
                let body = native.add_body(&BodyDef {
                    kind: BodyKind::Static,
                    ..BodyDef::default()
                });
                push_body(lua, &handle_of(&world, ObjectType::World)?, &body)
            })?,
        )?;
        // engine.add_dynamic_body(world, x, y [, angle_degrees])
        export_method(
            lua,
            &engine,
            ObjectType::World,
            "add_dynamic_body",
            lua.create_function(
                |lua, (world, x, y, angle): (LuaValue, f32, f32, Option<f32>)| {
                    let native = unwrap_world(&world)?;
                    let body = native.add_body(&BodyDef {
                        kind: BodyKind::Dynamic,
                        state: BodyState {
                            x,
                            y,
                            angle: angle.unwrap_or(0.0).to_radians(),
                            ..BodyState::default()
                        },
                        ..BodyDef::default()
                    });
                    push_body(lua, &handle_of(&world, ObjectType::World)?, &body)
                },
            )?,
        )?;

        // engine.step_world(world, dt [, velocity_iterations [, position_iterations]])
        export_method(
            lua,
            &engine,
            ObjectType::World,
            "step_world",
            lua.create_function(
                |_, (world, dt, vel, pos): (LuaValue, f32, Option<u32>, Option<u32>)| {
                    unwrap_world(&world)?.step(
                        dt,
                        vel.unwrap_or(DEFAULT_VELOCITY_ITERATIONS),
                        pos.unwrap_or(DEFAULT_POSITION_ITERATIONS),
                    );
                    Ok(())
                },
            )?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::World,
            "set_gravity",
            lua.create_function(|_, (world, x, y): (LuaValue, f32, f32)| {
                unwrap_world(&world)?.set_gravity(x, y);
                Ok(())
            })?,
        )?;
        // engine.world_query_box(world, x1, y1, x2, y2) -> { fixture, ... }
        export_method(
            lua,
            &engine,
            ObjectType::World,
            "world_query_box",
            lua.create_function(
                |lua, (world, x1, y1, x2, y2): (LuaValue, f32, f32, f32, f32)| {
                    let area = Bounds::from_corners(x1, y1, x2, y2);
                    let found = lua.create_table()?;
                    for fixture in unwrap_world(&world)?.query_box(&area) {
                        found.push(wrap_fixture(lua, &fixture)?)?;
                    }
                    Ok(found)
                },
            )?,
        )?;

        // engine.add_rect_to_body(body, x1, y1, x2, y2 [, attrs | density])
        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "add_rect_to_body",
            lua.create_function(
                |lua, (body, x1, y1, x2, y2, attrs): (LuaValue, f32, f32, f32, f32, LuaValue)| {
                    add_fixture(lua, &body, Shape::rect(x1, y1, x2, y2), attrs)
                },
            )?,
        )?;
        // engine.add_circle_to_body(body, radius, x, y [, attrs])
        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "add_circle_to_body",
            lua.create_function(
                |lua, (body, radius, x, y, attrs): (LuaValue, f32, f32, f32, LuaValue)| {
                    if radius <= 0.0 {
                        return Err(BridgeError::argument("circle radius must be positive").into());
                    }
                    add_fixture(lua, &body, Shape::Circle { radius, x, y }, attrs)
                },
            )?,
        )?;
        // engine.add_polygon_to_body(body, {x1, y1, x2, y2, ...} [, attrs])
        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "add_polygon_to_body",
            lua.create_function(
                |lua, (body, coords, attrs): (LuaValue, Vec<f32>, LuaValue)| {
                    if coords.len() % 2 != 0 {
                        return Err(BridgeError::argument(
                            "polygon coordinates must come in x, y pairs",
                        )
                        .into());
                    }
                    let points: Vec<(f32, f32)> =
                        coords.chunks_exact(2).map(|p| (p[0], p[1])).collect();
                    let shape = Shape::polygon(&points).ok_or_else(|| {
                        BridgeError::argument(
                            "polygon needs 3 to 8 vertices enclosing a non-zero area",
                        )
                    })?;
                    add_fixture(lua, &body, shape, attrs)
                },
            )?,
        )?;

        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "destroy_body",
            lua.create_function(|lua, body: LuaValue| destroy_body(lua, &body))?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Fixture,
            "destroy_fixture",
            lua.create_function(|lua, fixture: LuaValue| destroy_fixture(lua, &fixture))?,
        )?;

        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "get_body_fixtures",
            lua.create_function(|lua, body: LuaValue| {
                let list = lua.create_table()?;
                for fixture in unwrap_body(&body)?.fixtures() {
                    list.push(wrap_fixture(lua, &fixture)?)?;
                }
                Ok(list)
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "apply_force",
            lua.create_function(|_, (body, fx, fy): (LuaValue, f32, f32)| {
                unwrap_body(&body)?.apply_force(fx, fy);
                Ok(())
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "apply_torque",
            lua.create_function(|_, (body, torque): (LuaValue, f32)| {
                unwrap_body(&body)?.apply_torque(torque);
                Ok(())
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "apply_impulse",
            lua.create_function(|_, (body, ix, iy): (LuaValue, f32, f32)| {
                unwrap_body(&body)?.apply_impulse(ix, iy);
                Ok(())
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Body,
            "clear_forces",
            lua.create_function(|_, body: LuaValue| {
                unwrap_body(&body)?.clear_forces();
                Ok(())
            })?,
        )?;

        export_method(
            lua,
            &engine,
            ObjectType::Fixture,
            "get_fixture_body",
            lua.create_function(|lua, fixture: LuaValue| {
                match unwrap_fixture(&fixture)?.body() {
                    Some(body) => wrap_body(lua, &body).map(Some),
                    None => Ok(None),
                }
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Fixture,
            "fixture_contains_point",
            lua.create_function(|_, (fixture, x, y): (LuaValue, f32, f32)| {
                Ok(unwrap_fixture(&fixture)?.contains_point(x, y))
            })?,
        )?;
        // engine.fixture_bounding_box(fixture) -> left, bottom, right, top
        export_method(
            lua,
            &engine,
            ObjectType::Fixture,
            "fixture_bounding_box",
            lua.create_function(|lua, fixture: LuaValue| {
                match unwrap_fixture(&fixture)?.bounds() {
                    Some(b) => (b.left, b.bottom, b.right, b.top).into_lua_multi(lua),
                    None => Ok(LuaMultiValue::new()),
                }
            })?,
        )?;

        Ok(())
    }
}
