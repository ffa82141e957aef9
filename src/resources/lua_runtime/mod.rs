//! Lua scripting runtime for the Lantern engine.
//!
//! This module provides the Lua integration layer, exposing scene, event and
//! physics functionality through the global `engine` table in Lua scripts.
//!
//! # Architecture
//!
//! The module is split into focused submodules:
//!
//! - [`bridge`] - handles wrapping native objects, the weak store, per-type methods
//! - [`refgraph`] - edges between handles that keep related objects reachable
//! - [`pickle`] - tagged byte encoding of `engine.state`
//! - [`commands`] - requests queued for the host
//! - `scene_api`, `event_api`, `physics_api` - the `engine` table functions
//! - [`runtime`] - the `LuaRuntime` resource and script entry points
//!
//! # Example
//!
//! ```lua
//! local box = engine.Rect(-1, -1, 1, 1)
//! local moved = engine.Translate(box, 10, 10)
//! engine.add_pointer_down_in_handler(box, function(id, x, y)
//!     engine.log("box pressed")
//! end)
//! engine.set_stage(engine.Layer(moved))
//! ```

pub mod bridge;
mod commands;
mod event_api;
mod physics_api;
pub mod pickle;
pub mod refgraph;
mod runtime;
mod scene_api;

pub use commands::*;
pub use event_api::{LuaDispatch, dispatch_pointer};
pub use runtime::{ErrorPolicy, LuaRuntime};
