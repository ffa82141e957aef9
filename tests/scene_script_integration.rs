//! Scene graph integration tests driven through Lua scripts.
//!
//! Each test builds a scene with the `engine` table the way a game script
//! would, then checks drawing, containment and handle lifetime from both
//! sides of the bridge.

use mlua::prelude::*;

use lanternengine::error::{BridgeError, bridge_error};
use lanternengine::resources::lua_runtime::{ErrorPolicy, LuaRuntime};
use lanternengine::scene::render::{DrawCall, RecordingContext};
use lanternengine::scene::transform::Bounds;

fn runtime(source: &str) -> LuaRuntime {
    let mut rt = LuaRuntime::new(ErrorPolicy::Development).unwrap();
    let ok = rt.run_main_source("main", source);
    assert!(ok, "main failed: {:?}", rt.last_error().map(|e| e.to_string()));
    rt
}

fn exec(rt: &LuaRuntime, source: &str) {
    rt.lua().load(source).exec().unwrap();
}

fn eval<T: FromLua>(rt: &LuaRuntime, source: &str) -> T {
    rt.lua().load(source).eval().unwrap()
}

fn drawn_rects(rt: &mut LuaRuntime) -> Vec<Bounds> {
    let mut ctx = RecordingContext::new();
    rt.render(&mut ctx);
    ctx.calls
        .iter()
        .filter_map(|call| match call {
            DrawCall::Rect(bounds, _) => Some(*bounds),
            _ => None,
        })
        .collect()
}

#[test]
fn layer_arguments_are_listed_front_to_back() {
    let mut rt = runtime(
        "front = engine.Rect(0, 0, 1, 1) \
         back = engine.Rect(0, 0, 2, 2) \
         engine.set_stage(engine.Layer(front, back))",
    );
    let rects = drawn_rects(&mut rt);
    assert_eq!(rects.len(), 2);
    assert_eq!(rects[0].right, 2.0, "back-most child is painted first");
    assert_eq!(rects[1].right, 1.0);
}

#[test]
fn layer_insert_positions() {
    let mut rt = runtime(
        "local layer = engine.Layer() \
         local a = engine.Rect(0, 0, 1, 1) \
         local b = engine.Rect(0, 0, 2, 2) \
         local c = engine.Rect(0, 0, 3, 3) \
         local d = engine.Rect(0, 0, 4, 4) \
         layer:insert_front(a) \
         layer:insert_back(b) \
         layer:insert_above(b, c) \
         layer:insert_below(a, d) \
         count = layer:size() \
         engine.set_stage(layer)",
    );
    let order: Vec<f32> = drawn_rects(&mut rt).iter().map(|b| b.right).collect();
    assert_eq!(order, vec![2.0, 3.0, 4.0, 1.0]);
    assert_eq!(eval::<i64>(&rt, "return count"), 4);
}

#[test]
fn insert_relative_to_missing_child_does_nothing() {
    let rt = runtime(
        "layer = engine.Layer() \
         stranger = engine.Rect(0, 0, 1, 1) \
         inserted = layer:insert_above(stranger, engine.Rect(0, 0, 1, 1))",
    );
    assert!(!eval::<bool>(&rt, "return inserted"));
    assert_eq!(eval::<i64>(&rt, "return layer:size()"), 0);
}

#[test]
fn layer_cannot_contain_itself() {
    let rt = runtime("layer = engine.Layer()");
    let err = rt
        .lua()
        .load("layer:insert_front(layer)")
        .exec()
        .unwrap_err();
    assert!(matches!(bridge_error(&err), Some(BridgeError::Argument(_))));
}

#[test]
fn layer_child_lives_while_inserted() {
    let rt = runtime(
        "weak = setmetatable({}, { __mode = 'v' }) \
         layer = engine.Layer() \
         local child = engine.Rect(0, 0, 1, 1) \
         layer:insert_front(child) \
         weak.child = child",
    );
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.child ~= nil"));

    exec(&rt, "assert(layer:remove(weak.child))");
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.child == nil"));
    assert_eq!(eval::<i64>(&rt, "return layer:size()"), 0);
}

#[test]
fn node_inserted_twice_survives_one_removal() {
    let rt = runtime(
        "weak = setmetatable({}, { __mode = 'v' }) \
         layer = engine.Layer() \
         local child = engine.Rect(0, 0, 1, 1) \
         layer:insert_front(child) \
         layer:insert_back(child) \
         weak.child = child",
    );
    exec(&rt, "layer:remove(weak.child)");
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.child ~= nil"));
    assert_eq!(eval::<i64>(&rt, "return layer:size()"), 1);
}

#[test]
fn decorator_keeps_child_handle_alive() {
    let rt = runtime(
        "weak = setmetatable({}, { __mode = 'v' }) \
         local child = engine.Rect(0, 0, 1, 1) \
         moved = engine.Translate(child, 5, 5) \
         weak.child = child",
    );
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.child ~= nil"));

    exec(&rt, "moved = nil");
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.child == nil"));
}

#[test]
fn replaced_wrap_child_is_released() {
    let rt = runtime(
        "weak = setmetatable({}, { __mode = 'v' }) \
         local first = engine.Rect(0, 0, 1, 1) \
         wrap = engine.Wrap(first) \
         weak.first = first \
         wrap:replace_wrapped_child(engine.Rect(0, 0, 2, 2))",
    );
    rt.gc_collect().unwrap();
    assert!(eval::<bool>(&rt, "return weak.first == nil"));
    assert!(eval::<bool>(&rt, "return wrap:contains_point(1.5, 1.5)"));
}

#[test]
fn contains_point_composes_decorators() {
    let rt = runtime(
        "local rect = engine.Rect(0, 0, 10, 10) \
         moved = engine.Translate(rect, 5, 5) \
         turned = engine.Rotate(engine.Rect(0, -1, 10, 1), 90) \
         grown = engine.Scale(engine.Rect(-1, -1, 1, 1), 3)",
    );
    assert!(eval::<bool>(&rt, "return moved:contains_point(12, 12)"));
    assert!(!eval::<bool>(&rt, "return moved:contains_point(1, 1)"));
    assert!(eval::<bool>(&rt, "return turned:contains_point(0, 5)"));
    assert!(!eval::<bool>(&rt, "return turned:contains_point(5, 0)"));
    assert!(eval::<bool>(&rt, "return grown:contains_point(2.5, -2.5)"));
}

#[test]
fn tint_and_blend_wrap_their_child() {
    let mut rt = runtime(
        "engine.set_stage(engine.BlendMode(engine.Tint(engine.Line(0, 0, 1, 1), 1, 0, 0), 'add'))",
    );
    let mut ctx = RecordingContext::new();
    rt.render(&mut ctx);
    assert_eq!(
        ctx.calls,
        vec![
            DrawCall::PushBlend(lanternengine::scene::render::BlendMode::Add),
            DrawCall::PushTint(1.0, 0.0, 0.0, 1.0),
            DrawCall::Line(0.0, 0.0, 1.0, 1.0),
            DrawCall::PopTint,
            DrawCall::PopBlend,
        ]
    );
}

#[test]
fn unknown_enum_strings_are_rejected() {
    let rt = runtime("rect = engine.Rect(0, 0, 1, 1) vec = engine.Vector(4, 2)");
    for source in [
        "engine.BlendMode(rect, 'screen')",
        "engine.DrawVector(vec, 'quads', 2)",
        "engine.add_body(engine.World(), { type = 'ghost' })",
    ] {
        let err = rt.lua().load(source).exec().unwrap_err();
        assert!(
            matches!(bridge_error(&err), Some(BridgeError::Argument(_))),
            "{} should raise an argument error, got {}",
            source,
            err
        );
    }
}

#[test]
fn wrong_handle_type_is_a_type_error() {
    let rt = runtime("not_a_layer = engine.Rect(0, 0, 1, 1)");
    let err = rt
        .lua()
        .load("engine.insert_front(not_a_layer, engine.Rect(0, 0, 1, 1))")
        .exec()
        .unwrap_err();
    assert_eq!(
        bridge_error(&err),
        Some(&BridgeError::TypeError {
            expected: "Layer",
            found: "Rect".to_string()
        })
    );
    // Scripts can catch it
    assert!(eval::<bool>(
        &rt,
        "local ok, err = pcall(engine.insert_front, not_a_layer, not_a_layer) \
         return not ok and string.find(tostring(err), 'type error', 1, true) ~= nil"
    ));
}

#[test]
fn image_needs_positive_size() {
    let rt = runtime("");
    assert!(rt.lua().load("engine.Image('ball', 0, 1)").exec().is_err());
    exec(&rt, "img = engine.Image('ball', 2, 2)");
    assert!(eval::<bool>(&rt, "return img:contains_point(0.5, -0.5)"));
}

#[test]
fn quad_batch_draws_one_quad_per_four_rows() {
    let mut rt = runtime(
        "vec = engine.Vector(8, 4) \
         local offsets = engine.Vector({ { 0, 0 }, { 5, 0 } }) \
         local img = engine.Image('atlas', 1, 1) \
         vec:fill_vector_columns_with_image_quads(1, img, offsets, 1) \
         engine.set_stage(engine.DrawQuads(vec, img))",
    );
    assert_eq!(eval::<f64>(&rt, "return vec:get(1, 1)"), -0.5);
    assert_eq!(eval::<f64>(&rt, "return vec:get(5, 1)"), 4.5);
    let mut ctx = RecordingContext::new();
    rt.render(&mut ctx);
    assert_eq!(
        ctx.calls,
        vec![DrawCall::TexturedQuads {
            texture: "atlas".to_string(),
            quads: 2
        }]
    );
}

#[test]
fn vector_fields_and_cells() {
    let rt = runtime("vec = engine.Vector({ { 1, 2 }, { 3, 4 }, { 5, 6 } })");
    assert_eq!(eval::<i64>(&rt, "return vec.rows"), 3);
    assert_eq!(eval::<i64>(&rt, "return vec.stride"), 2);
    exec(&rt, "vec:set(2, 1, 30)");
    assert_eq!(eval::<f64>(&rt, "return engine.vector_get(vec, 2, 1)"), 30.0);
}

fn assert_argument_error(rt: &LuaRuntime, source: &str) {
    let err = rt.lua().load(source).exec().unwrap_err();
    assert!(
        matches!(bridge_error(&err), Some(BridgeError::Argument(_))),
        "{} should raise an argument error, got {}",
        source,
        err
    );
}

#[test]
fn oversized_vector_is_rejected() {
    let rt = runtime("");
    assert_argument_error(&rt, "engine.Vector(2^33, 2^33)");
    assert_argument_error(&rt, "engine.Vector(2^40, 1)");
    exec(&rt, "small = engine.Vector(16, 4)");
    assert_eq!(eval::<i64>(&rt, "return small.rows"), 16);
}

#[test]
fn draw_vector_validates_its_layout() {
    let rt = runtime(
        "narrow = engine.Vector(3, 1) \
         wide = engine.Vector(3, 4) \
         img = engine.Image('atlas', 1, 1)",
    );
    // dimensions
    assert_argument_error(&rt, "engine.DrawVector(wide, 'points', 4)");
    assert_argument_error(&rt, "engine.DrawVector(wide, 'points', 1)");
    assert_argument_error(&rt, "engine.DrawVector(narrow, 'points', 2)");
    // colour needs four columns from its offset
    assert_argument_error(&rt, "engine.DrawVector(wide, 'points', 2, 2)");
    assert_argument_error(&rt, "engine.DrawVector(wide, 'points', 2, 0)");
    // texture coordinates need two columns from their offset
    assert_argument_error(&rt, "engine.DrawVector(wide, 'points', 2, nil, 4, img)");
    // a texture offset without an image
    assert_argument_error(&rt, "engine.DrawVector(wide, 'points', 2, nil, 3)");
}

#[test]
fn draw_vector_with_full_layout_draws() {
    let mut rt = runtime(
        "local vec = engine.Vector(3, 8) \
         local img = engine.Image('atlas', 1, 1) \
         engine.set_stage(engine.DrawVector(vec, 'triangles', 2, 3, 7, img))",
    );
    let mut ctx = RecordingContext::new();
    rt.render(&mut ctx);
    assert_eq!(
        ctx.calls,
        vec![DrawCall::Vertices {
            mode: lanternengine::scene::render::DrawMode::Triangles,
            vertices: 3,
            textured: true
        }]
    );
}
