//! Physics proxy integration tests driven through Lua scripts.

use mlua::prelude::*;

use lanternengine::error::{BridgeError, bridge_error};
use lanternengine::resources::lua_runtime::{ErrorPolicy, LuaRuntime};
use lanternengine::scene::render::{DrawCall, RecordingContext};

fn runtime(source: &str) -> LuaRuntime {
    let mut rt = LuaRuntime::new(ErrorPolicy::Development).unwrap();
    let ok = rt.run_main_source("main", source);
    assert!(ok, "main failed: {:?}", rt.last_error().map(|e| e.to_string()));
    rt
}

fn exec(rt: &LuaRuntime, source: &str) {
    rt.lua().load(source).exec().unwrap();
}

fn eval<T: FromLuaMulti>(rt: &LuaRuntime, source: &str) -> T {
    rt.lua().load(source).eval().unwrap()
}

#[test]
fn fixtures_and_bodies_keep_their_identity() {
    let rt = runtime(
        "world = engine.World() \
         body = engine.add_dynamic_body(world, 0, 0) \
         fixture = engine.add_rect_to_body(body, -1, -1, 1, 1)",
    );
    assert!(eval::<bool>(&rt, "return rawequal(engine.get_fixture_body(fixture), body)"));
    assert!(eval::<bool>(&rt, "return rawequal(body:get_body_fixtures()[1], fixture)"));
    assert!(eval::<bool>(
        &rt,
        "return rawequal(engine.world_query_box(world, -5, -5, 5, 5)[1], fixture)"
    ));
}

#[test]
fn world_keeps_bodies_alive() {
    let rt = runtime(
        "weak = setmetatable({}, { __mode = 'v' }) \
         world = engine.World() \
         weak.body = engine.add_static_body(world)",
    );
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.body ~= nil"));
}

#[test]
fn destroying_a_body_invalidates_its_fixtures() {
    let rt = runtime(
        "weak = setmetatable({}, { __mode = 'v' }) \
         world = engine.World() \
         local body = engine.add_dynamic_body(world, 0, 0) \
         fixture = engine.add_circle_to_body(body, 1, 0, 0) \
         weak.body = body \
         engine.destroy_body(body)",
    );
    assert!(eval::<bool>(&rt, "return weak.body.destroyed and fixture.destroyed"));
    assert!(eval::<bool>(&rt, "return engine.is_destroyed(fixture)"));

    let err = rt
        .lua()
        .load("engine.apply_force(weak.body, 1, 0)")
        .exec()
        .unwrap_err();
    assert_eq!(bridge_error(&err), Some(&BridgeError::NullReference { ty: "Body" }));

    // Destroying twice is harmless
    exec(&rt, "engine.destroy_body(weak.body)");

    // Neither the world nor the fixture still references the body
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.body == nil"));
}

#[test]
fn destroying_a_fixture_detaches_it_from_its_body() {
    let rt = runtime(
        "world = engine.World() \
         body = engine.add_dynamic_body(world, 0, 0) \
         first = engine.add_rect_to_body(body, -1, -1, 1, 1) \
         second = engine.add_rect_to_body(body, 2, 2, 3, 3) \
         engine.destroy_fixture(first)",
    );
    assert_eq!(eval::<i64>(&rt, "return #body:get_body_fixtures()"), 1);
    assert!(eval::<bool>(&rt, "return rawequal(body:get_body_fixtures()[1], second)"));
    assert!(eval::<bool>(&rt, "return first.destroyed and not second.destroyed"));
}

#[test]
fn gravity_moves_dynamic_bodies_only() {
    let rt = runtime(
        "world = engine.World() \
         world:set_gravity(0, -10) \
         falling = engine.add_body(world, { type = 'dynamic', position = { 0, 100 } }) \
         ground = engine.add_body(world, { type = 'static', position = { 0, 0 } }) \
         world:step_world(1)",
    );
    assert!(eval::<f64>(&rt, "return falling.vy") < 0.0);
    assert!(eval::<f64>(&rt, "return falling.y") < 100.0);
    assert_eq!(eval::<f64>(&rt, "return ground.y"), 0.0);
    assert_eq!(eval::<f64>(&rt, "return world.gravity_y"), -10.0);
}

#[test]
fn body_fields_can_be_written() {
    let rt = runtime(
        "world = engine.World() \
         body = engine.add_dynamic_body(world, 0, 0) \
         body.x = 12 \
         engine.set_field(body, 'vy', 3)",
    );
    assert_eq!(eval::<f64>(&rt, "return body.x"), 12.0);
    assert_eq!(eval::<f64>(&rt, "return engine.get_field(body, 'vy')"), 3.0);
    assert!(rt.lua().load("body.mass = 1").exec().is_err());
}

#[test]
fn fixture_queries() {
    let rt = runtime(
        "world = engine.World() \
         body = engine.add_dynamic_body(world, 10, 0) \
         fixture = engine.add_rect_to_body(body, -1, -1, 1, 1)",
    );
    assert!(eval::<bool>(&rt, "return engine.fixture_contains_point(fixture, 10.5, 0.5)"));
    assert!(!eval::<bool>(&rt, "return engine.fixture_contains_point(fixture, 0, 0)"));
    let (left, bottom, right, top): (f64, f64, f64, f64) =
        eval(&rt, "return engine.fixture_bounding_box(fixture)");
    assert_eq!((left, bottom, right, top), (9.0, -1.0, 11.0, 1.0));
}

#[test]
fn circle_needs_positive_radius() {
    let rt = runtime("world = engine.World() body = engine.add_dynamic_body(world, 0, 0)");
    let err = rt
        .lua()
        .load("engine.add_circle_to_body(body, 0, 0, 0)")
        .exec()
        .unwrap_err();
    assert!(matches!(bridge_error(&err), Some(BridgeError::Argument(_))));
}

#[test]
fn body_tracker_draws_child_at_body_position() {
    let mut rt = runtime(
        "world = engine.World() \
         body = engine.add_dynamic_body(world, 3, 4) \
         engine.set_stage(engine.BodyTracker(engine.Line(0, 0, 1, 0), body, false, false))",
    );
    let mut ctx = RecordingContext::new();
    rt.render(&mut ctx);
    assert_eq!(
        ctx.calls,
        vec![
            DrawCall::PushMatrix,
            DrawCall::Translate(3.0, 4.0, 0.0),
            DrawCall::Line(0.0, 0.0, 1.0, 0.0),
            DrawCall::PopMatrix,
        ]
    );

    // Once the body is gone the tracker draws nothing
    exec(&rt, "engine.destroy_body(body)");
    let mut ctx = RecordingContext::new();
    rt.render(&mut ctx);
    assert!(ctx.calls.is_empty());
}
