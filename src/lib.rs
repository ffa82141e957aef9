//! Lantern engine library.
//!
//! This module exposes the scene graph, the pointer event model, the physics
//! proxies and the Lua runtime that binds them, for use in integration
//! tests and as a reusable library.

pub mod error;
pub mod events;
pub mod objects;
pub mod physics;
pub mod resources;
pub mod scene;
pub mod systems;
