//! Scene graph construction and mutation from scripts.
//!
//! Every function here that changes native composition makes the matching
//! reference graph change on the same call: layer insertions add a
//! membership edge to the child, decorators hold their child under the
//! `child` name, batch nodes hold their vector and image.

use std::rc::Rc;

use mlua::prelude::*;

use super::bridge::{
    Handle, export_method, handle_of, native_field, register_method, set_native_field, unwrap,
    unwrap_body, unwrap_node, unwrap_vector, wrap_node, wrap_vector,
};
use super::commands::AssetCmd;
use super::refgraph::{EdgeKey, add_edge, remove_edge};
use super::runtime::{LuaRuntime, app_data};
use crate::error::BridgeError;
use crate::objects::ObjectType;
use crate::scene::node::{BodyTracker, Decoration, ImageQuad, Leaf, SceneNode};
use crate::scene::render::{BlendMode, DrawMode, VertexLayout};
use crate::scene::transform::Bounds;
use crate::scene::vector::FloatVector;

const STAGE_KEY: &str = "lantern.stage";

/// Where a child goes in a layer.
enum Placement {
    Front,
    Back,
    Above(Rc<SceneNode>),
    Below(Rc<SceneNode>),
}

fn insert_child(
    lua: &Lua,
    layer_value: &LuaValue,
    child_value: &LuaValue,
    placement: Placement,
) -> LuaResult<bool> {
    let layer = unwrap_node(layer_value, ObjectType::Layer)?;
    let layer_handle = handle_of(layer_value, ObjectType::Layer)?;
    let child = unwrap_node(child_value, ObjectType::SceneNode)?;
    if Rc::ptr_eq(&layer, &child) {
        return Err(BridgeError::argument("a layer cannot contain itself").into());
    }
    let inserted = layer
        .with_layer(|l| match placement {
            Placement::Front => {
                l.insert_front(child.clone());
                true
            }
            Placement::Back => {
                l.insert_back(child.clone());
                true
            }
            Placement::Above(existing) => l.insert_above(&existing, child.clone()),
            Placement::Below(existing) => l.insert_below(&existing, child.clone()),
        })
        .unwrap_or(false);
    if inserted {
        add_edge(lua, &layer_handle, EdgeKey::Member, child_value.clone())?;
    }
    Ok(inserted)
}

fn remove_child(lua: &Lua, layer_value: &LuaValue, child_value: &LuaValue) -> LuaResult<bool> {
    let layer = unwrap_node(layer_value, ObjectType::Layer)?;
    let layer_handle = handle_of(layer_value, ObjectType::Layer)?;
    let child = unwrap_node(child_value, ObjectType::SceneNode)?;
    let (removed, still_present) = layer
        .with_layer(|l| {
            let removed = l.remove(&child);
            (removed, l.contains(&child))
        })
        .unwrap_or((false, false));
    // A node inserted twice keeps its edge until its last occurrence goes.
    if removed && !still_present {
        remove_edge(lua, &layer_handle, EdgeKey::Member, child_value.clone())?;
    }
    Ok(removed)
}

/// Wraps `child` in a new decorator node held by a `child` edge.
fn decorate(lua: &Lua, child_value: &LuaValue, decoration: Decoration) -> LuaResult<LuaAnyUserData> {
    let child = unwrap_node(child_value, ObjectType::SceneNode)?;
    let node = SceneNode::decorator(decoration, child);
    let handle = wrap_node(lua, &node)?;
    add_edge(lua, &handle, EdgeKey::Named("child"), child_value.clone())?;
    Ok(handle)
}

fn image_of(value: &LuaValue) -> Result<ImageQuad, BridgeError> {
    unwrap_node(value, ObjectType::Image)?
        .image()
        .ok_or(BridgeError::TypeError {
            expected: ObjectType::Image.name(),
            found: "SceneNode".to_string(),
        })
}

/// Converts a 1-based script column into a 0-based offset.
fn column(col: i64, what: &str) -> Result<usize, BridgeError> {
    if col < 1 {
        return Err(BridgeError::argument(format!("invalid {}: {}", what, col)));
    }
    Ok((col - 1) as usize)
}

fn vector_from_value(lua: &Lua, first: LuaValue, stride: Option<i64>) -> LuaResult<FloatVector> {
    match (first, stride) {
        (LuaValue::Table(rows), None) => {
            let rows: Vec<Vec<f32>> = lua.unpack(LuaValue::Table(rows))?;
            Ok(FloatVector::from_rows(&rows)?)
        }
        (LuaValue::Integer(rows), Some(stride)) if rows >= 0 && stride >= 0 => {
            Ok(FloatVector::new(rows as usize, stride as usize)?)
        }
        (LuaValue::Number(rows), Some(stride)) if rows >= 0.0 && stride >= 0 => {
            Ok(FloatVector::new(rows as usize, stride as usize)?)
        }
        _ => Err(BridgeError::argument("Vector expects a table of rows or (rows, stride)").into()),
    }
}

impl LuaRuntime {
    /// Registers node constructors, layer mutation, fields and the stage.
    pub(super) fn register_scene_api(&self) -> LuaResult<()> {
        let lua = self.lua();
        let engine: LuaTable = lua.globals().get("engine")?;

        // engine.Layer(...) - first argument ends up front-most
        engine.set(
            "Layer",
            lua.create_function(|lua, nodes: LuaMultiValue| {
                let layer = SceneNode::layer();
                let handle = wrap_node(lua, &layer)?;
                let layer_value = LuaValue::UserData(handle.clone());
                for node in nodes.into_iter() {
                    insert_child(lua, &layer_value, &node, Placement::Back)?;
                }
                Ok(handle)
            })?,
        )?;

        export_method(
            lua,
            &engine,
            ObjectType::Layer,
            "insert_front",
            lua.create_function(|lua, (layer, node): (LuaValue, LuaValue)| {
                insert_child(lua, &layer, &node, Placement::Front).map(|_| ())
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Layer,
            "insert_back",
            lua.create_function(|lua, (layer, node): (LuaValue, LuaValue)| {
                insert_child(lua, &layer, &node, Placement::Back).map(|_| ())
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Layer,
            "insert_above",
            lua.create_function(
                |lua, (layer, existing, node): (LuaValue, LuaValue, LuaValue)| {
                    let existing = unwrap_node(&existing, ObjectType::SceneNode)?;
                    insert_child(lua, &layer, &node, Placement::Above(existing))
                },
            )?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Layer,
            "insert_below",
            lua.create_function(
                |lua, (layer, existing, node): (LuaValue, LuaValue, LuaValue)| {
                    let existing = unwrap_node(&existing, ObjectType::SceneNode)?;
                    insert_child(lua, &layer, &node, Placement::Below(existing))
                },
            )?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Layer,
            "remove",
            lua.create_function(|lua, (layer, node): (LuaValue, LuaValue)| {
                remove_child(lua, &layer, &node)
            })?,
        )?;
        export_method(
            lua,
            &engine,
            ObjectType::Layer,
            "size",
            lua.create_function(|_, layer: LuaValue| {
                let layer = unwrap_node(&layer, ObjectType::Layer)?;
                Ok(layer.with_layer(|l| l.size()).unwrap_or(0))
            })?,
        )?;

        self.register_decorators(&engine)?;
        self.register_leaves(&engine)?;
        self.register_vector_api(&engine)?;

        // engine.replace_wrapped_child(wrap, child) - swaps a Wrap node's child
        export_method(
            lua,
            &engine,
            ObjectType::Wrap,
            "replace_wrapped_child",
            lua.create_function(|lua, (wrap, child): (LuaValue, LuaValue)| {
                let wrap_node = unwrap_node(&wrap, ObjectType::Wrap)?;
                let wrap_handle = handle_of(&wrap, ObjectType::Wrap)?;
                let new_child = unwrap_node(&child, ObjectType::SceneNode)?;
                if Rc::ptr_eq(&wrap_node, &new_child) {
                    return Err(BridgeError::argument("a wrap node cannot wrap itself").into());
                }
                wrap_node.replace_child(new_child);
                add_edge(lua, &wrap_handle, EdgeKey::Named("child"), child)?;
                Ok(())
            })?,
        )?;

        export_method(
            lua,
            &engine,
            ObjectType::SceneNode,
            "contains_point",
            lua.create_function(|_, (node, x, y): (LuaValue, f32, f32)| {
                Ok(unwrap_node(&node, ObjectType::SceneNode)?.contains_point(x, y))
            })?,
        )?;

        // Generic field access, same as obj.name / obj.name = value
        engine.set(
            "get_field",
            lua.create_function(|_, (object, name): (LuaValue, String)| {
                let object = unwrap(&object, ObjectType::Object)?;
                Ok(native_field(&object, &name))
            })?,
        )?;
        engine.set(
            "set_field",
            lua.create_function(|_, (object, name, value): (LuaValue, String, f64)| {
                let object = unwrap(&object, ObjectType::Object)?;
                set_native_field(&object, &name, value)?;
                Ok(())
            })?,
        )?;
        engine.set(
            "is_destroyed",
            lua.create_function(|_, object: LuaValue| {
                let handle = handle_of(&object, ObjectType::Object)?;
                Ok(handle.borrow::<Handle>()?.is_destroyed())
            })?,
        )?;

        // engine.set_stage(node) - root drawn and fed input when no hooks are defined
        engine.set(
            "set_stage",
            lua.create_function(|lua, node: LuaValue| {
                let native = match &node {
                    LuaValue::Nil => None,
                    other => Some(unwrap_node(other, ObjectType::SceneNode)?),
                };
                lua.set_named_registry_value(STAGE_KEY, node)?;
                *app_data(lua)?.stage.borrow_mut() = native;
                Ok(())
            })?,
        )?;
        engine.set(
            "stage",
            lua.create_function(|lua, ()| lua.named_registry_value::<LuaValue>(STAGE_KEY))?,
        )?;

        engine.set(
            "load_texture",
            lua.create_function(|lua, (id, path): (String, String)| {
                app_data(lua)?
                    .asset_commands
                    .borrow_mut()
                    .push(AssetCmd::LoadTexture { id, path });
                Ok(())
            })?,
        )?;
        engine.set(
            "unload_texture",
            lua.create_function(|lua, id: String| {
                app_data(lua)?
                    .asset_commands
                    .borrow_mut()
                    .push(AssetCmd::UnloadTexture { id });
                Ok(())
            })?,
        )?;

        Ok(())
    }

    fn register_decorators(&self, engine: &LuaTable) -> LuaResult<()> {
        let lua = self.lua();

        engine.set(
            "Translate",
            lua.create_function(|lua, (child, x, y, z): (LuaValue, f32, f32, Option<f32>)| {
                decorate(lua, &child, Decoration::Translate { x, y, z: z.unwrap_or(0.0) })
            })?,
        )?;
        engine.set(
            "Rotate",
            lua.create_function(
                |lua, (child, angle, cx, cy): (LuaValue, f32, Option<f32>, Option<f32>)| {
                    let decoration = Decoration::Rotate {
                        angle,
                        cx: cx.unwrap_or(0.0),
                        cy: cy.unwrap_or(0.0),
                    };
                    decorate(lua, &child, decoration)
                },
            )?,
        )?;
        // Scale(child, s) is uniform; Scale(child, sx, sy [, s]) is not
        engine.set(
            "Scale",
            lua.create_function(
                |lua, (child, first, sy, s): (LuaValue, f32, Option<f32>, Option<f32>)| {
                    let decoration = match sy {
                        None => Decoration::Scale { sx: 1.0, sy: 1.0, s: first },
                        Some(sy) => Decoration::Scale { sx: first, sy, s: s.unwrap_or(1.0) },
                    };
                    decorate(lua, &child, decoration)
                },
            )?,
        )?;
        engine.set(
            "Perspective",
            lua.create_function(
                |lua, (child, near, origin, far, depth): (LuaValue, f32, f32, f32, Option<bool>)| {
                    let decoration = Decoration::Perspective {
                        near,
                        origin,
                        far,
                        depth_buffer: depth.unwrap_or(true),
                    };
                    decorate(lua, &child, decoration)
                },
            )?,
        )?;
        engine.set(
            "Pitch",
            lua.create_function(|lua, (child, pitch): (LuaValue, f32)| {
                decorate(lua, &child, Decoration::Pitch { pitch })
            })?,
        )?;
        engine.set(
            "Tint",
            lua.create_function(
                |lua, (child, r, g, b, a): (LuaValue, f32, f32, f32, Option<f32>)| {
                    decorate(lua, &child, Decoration::Tint { r, g, b, a: a.unwrap_or(1.0) })
                },
            )?,
        )?;
        engine.set(
            "BlendMode",
            lua.create_function(|lua, (child, mode): (LuaValue, String)| {
                let mode = BlendMode::parse(&mode)?;
                decorate(lua, &child, Decoration::Blend(mode))
            })?,
        )?;
        engine.set(
            "HitFilter",
            lua.create_function(
                |lua, (child, left, bottom, right, top): (LuaValue, f32, f32, f32, f32)| {
                    let bounds = Bounds::from_corners(left, bottom, right, top);
                    decorate(lua, &child, Decoration::HitFilter(bounds))
                },
            )?,
        )?;
        engine.set(
            "DownFilter",
            lua.create_function(
                |lua, (child, left, bottom, right, top): (LuaValue, f32, f32, f32, f32)| {
                    let bounds = Bounds::from_corners(left, bottom, right, top);
                    decorate(lua, &child, Decoration::DownFilter(bounds))
                },
            )?,
        )?;
        engine.set(
            "Wrap",
            lua.create_function(|lua, child: LuaValue| decorate(lua, &child, Decoration::Wrap))?,
        )?;
        // engine.BodyTracker(child, body [, viewport_mode = false [, track_rotation = true]])
        engine.set(
            "BodyTracker",
            lua.create_function(
                |lua, (child, body, viewport, rotation): (LuaValue, LuaValue, Option<bool>, Option<bool>)| {
                    let native_body = unwrap_body(&body)?;
                    let tracker = BodyTracker::new(
                        native_body,
                        viewport.unwrap_or(false),
                        rotation.unwrap_or(true),
                    );
                    let handle = decorate(lua, &child, Decoration::BodyTracker(tracker))?;
                    add_edge(lua, &handle, EdgeKey::Named("body"), body)?;
                    Ok(handle)
                },
            )?,
        )?;

        Ok(())
    }

    fn register_leaves(&self, engine: &LuaTable) -> LuaResult<()> {
        let lua = self.lua();

        engine.set(
            "Rect",
            lua.create_function(|lua, (x1, y1, x2, y2): (f32, f32, f32, f32)| {
                wrap_node(lua, &SceneNode::leaf(Leaf::Rect(Bounds::from_corners(x1, y1, x2, y2))))
            })?,
        )?;
        engine.set(
            "Line",
            lua.create_function(|lua, (x1, y1, x2, y2): (f32, f32, f32, f32)| {
                wrap_node(lua, &SceneNode::leaf(Leaf::Line { x1, y1, x2, y2 }))
            })?,
        )?;
        engine.set(
            "Triangle",
            lua.create_function(
                |lua, (x1, y1, x2, y2, x3, y3): (f32, f32, f32, f32, f32, f32)| {
                    wrap_node(lua, &SceneNode::leaf(Leaf::Triangle([x1, y1, x2, y2, x3, y3])))
                },
            )?,
        )?;
        engine.set(
            "Ellipse",
            lua.create_function(|lua, (x, y, rx, ry): (f32, f32, f32, Option<f32>)| {
                let ry = ry.unwrap_or(rx);
                wrap_node(lua, &SceneNode::leaf(Leaf::Ellipse { x, y, rx, ry }))
            })?,
        )?;
        // engine.Image(texture, width, height [, u1, v1, u2, v2])
        engine.set(
            "Image",
            lua.create_function(
                |lua,
                 (texture, width, height, u1, v1, u2, v2): (
                    String,
                    f32,
                    f32,
                    Option<f32>,
                    Option<f32>,
                    Option<f32>,
                    Option<f32>,
                )| {
                    if width <= 0.0 || height <= 0.0 {
                        return Err(BridgeError::argument("image size must be positive").into());
                    }
                    let uv = [
                        u1.unwrap_or(0.0),
                        v1.unwrap_or(0.0),
                        u2.unwrap_or(1.0),
                        v2.unwrap_or(1.0),
                    ];
                    let quad = ImageQuad::new(&texture, width, height, uv);
                    wrap_node(lua, &SceneNode::leaf(Leaf::Image(quad)))
                },
            )?,
        )?;
        // engine.DrawQuads(vector, image [, column = 1])
        engine.set(
            "DrawQuads",
            lua.create_function(
                |lua, (vector, image, col): (LuaValue, LuaValue, Option<i64>)| {
                    let native_vector = unwrap_vector(&vector)?;
                    let image_node = unwrap_node(&image, ObjectType::Image)?;
                    let col = column(col.unwrap_or(1), "column")?;
                    if native_vector.stride() < col + 4 {
                        return Err(BridgeError::argument("not enough columns (need 4)").into());
                    }
                    let node = SceneNode::leaf(Leaf::DrawQuads {
                        vector: native_vector,
                        column: col,
                        image: image_node,
                    });
                    let handle = wrap_node(lua, &node)?;
                    add_edge(lua, &handle, EdgeKey::Named("vector"), vector)?;
                    add_edge(lua, &handle, EdgeKey::Named("image"), image)?;
                    Ok(handle)
                },
            )?,
        )?;
        // engine.DrawVector(vector, mode, dims [, color_col [, tex_col, image]])
        engine.set(
            "DrawVector",
            lua.create_function(
                |lua,
                 (vector, mode, dims, color_col, tex_col, image): (
                    LuaValue,
                    String,
                    usize,
                    Option<i64>,
                    Option<i64>,
                    LuaValue,
                )| {
                    let native_vector = unwrap_vector(&vector)?;
                    let mode = DrawMode::parse(&mode)?;
                    if dims != 2 && dims != 3 {
                        return Err(BridgeError::argument("dimensions must be 2 or 3").into());
                    }
                    let stride = native_vector.stride();
                    if dims > stride {
                        return Err(BridgeError::argument("dimensions exceed vector stride").into());
                    }
                    let color_offset = match color_col {
                        Some(col) => {
                            let col = column(col, "color offset")?;
                            if col + 4 > stride {
                                return Err(BridgeError::argument("invalid color offset").into());
                            }
                            Some(col)
                        }
                        None => None,
                    };
                    let tex_offset = match tex_col {
                        Some(col) => {
                            let col = column(col, "texture offset")?;
                            if col + 2 > stride {
                                return Err(BridgeError::argument("invalid texture offset").into());
                            }
                            Some(col)
                        }
                        None => None,
                    };
                    let image_node = match (&image, tex_offset) {
                        (LuaValue::Nil, Some(_)) => {
                            return Err(BridgeError::argument(
                                "an image must be provided if a texture offset is given",
                            )
                            .into());
                        }
                        (LuaValue::Nil, None) => None,
                        (value, _) => Some(unwrap_node(value, ObjectType::Image)?),
                    };
                    let layout = VertexLayout {
                        stride,
                        dims,
                        color_offset,
                        tex_offset,
                    };
                    let node = SceneNode::leaf(Leaf::DrawVector {
                        vector: native_vector,
                        mode,
                        layout,
                        image: image_node,
                    });
                    let handle = wrap_node(lua, &node)?;
                    add_edge(lua, &handle, EdgeKey::Named("vector"), vector)?;
                    if !image.is_nil() {
                        add_edge(lua, &handle, EdgeKey::Named("image"), image)?;
                    }
                    Ok(handle)
                },
            )?,
        )?;

        Ok(())
    }

    fn register_vector_api(&self, engine: &LuaTable) -> LuaResult<()> {
        let lua = self.lua();

        // engine.Vector({{...}, {...}}) or engine.Vector(rows, stride)
        engine.set(
            "Vector",
            lua.create_function(|lua, (first, stride): (LuaValue, Option<i64>)| {
                let vector = Rc::new(vector_from_value(lua, first, stride)?);
                wrap_vector(lua, &vector)
            })?,
        )?;

        let get = lua.create_function(|_, (vector, row, col): (LuaValue, usize, usize)| {
            Ok(unwrap_vector(&vector)?.get(row, col))
        })?;
        engine.set("vector_get", get.clone())?;
        register_method(lua, ObjectType::Vector, "get", get)?;

        let set = lua.create_function(
            |_, (vector, row, col, value): (LuaValue, usize, usize, f32)| {
                let vector = unwrap_vector(&vector)?;
                if !vector.set(row, col, value) {
                    return Err(BridgeError::argument(format!(
                        "index ({}, {}) out of range for a {}x{} vector",
                        row,
                        col,
                        vector.rows(),
                        vector.stride()
                    ))
                    .into());
                }
                Ok(())
            },
        )?;
        engine.set("vector_set", set.clone())?;
        register_method(lua, ObjectType::Vector, "set", set)?;

        // engine.generate_vector_column(vector, col, lo [, hi])
        export_method(
            lua,
            engine,
            ObjectType::Vector,
            "generate_vector_column",
            lua.create_function(
                |_, (vector, col, lo, hi): (LuaValue, usize, f32, Option<f32>)| {
                    unwrap_vector(&vector)?.generate_column(col, lo, hi.unwrap_or(lo))?;
                    Ok(())
                },
            )?,
        )?;
        // engine.fill_vector_columns_with_image_quads(vector, col, image, offsets, offsets_col)
        export_method(
            lua,
            engine,
            ObjectType::Vector,
            "fill_vector_columns_with_image_quads",
            lua.create_function(
                |_,
                 (vector, col, image, offsets, offsets_col): (
                    LuaValue,
                    usize,
                    LuaValue,
                    LuaValue,
                    usize,
                )| {
                    let vector = unwrap_vector(&vector)?;
                    let image = image_of(&image)?;
                    let offsets = unwrap_vector(&offsets)?;
                    vector.fill_with_image_quads(col, &image, &offsets, offsets_col)?;
                    Ok(())
                },
            )?,
        )?;

        Ok(())
    }
}

