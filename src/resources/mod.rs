//! ECS resources made available to systems.
//!
//! This module groups the long-lived data injected into the ECS world and
//! accessed by systems during execution.
//!
//! Overview
//! - `engineconfig` – window, script and state-file settings from `config.ini`
//! - `lua_runtime` – the Lua state, the `engine` table and the script entry points
//! - `texturestore` – loaded textures keyed by string IDs
//! - `worldtime` – simulation time and delta
pub mod engineconfig;
pub mod lua_runtime;
pub mod texturestore;
pub mod worldtime;
