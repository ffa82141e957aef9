//! Systems that drive the Lua runtime.
//!
//! Pointer messages are handed to the scripts first, then the scripts
//! advance, then any asset requests they queued are serviced so the
//! textures exist by the time the frame is drawn.
use bevy_ecs::prelude::*;
use log::{info, warn};

use crate::events::pointer::PointerEvent;
use crate::resources::lua_runtime::{AssetCmd, LuaRuntime};
use crate::resources::texturestore::TextureStore;
use crate::resources::worldtime::WorldTime;

/// Feed this frame's pointer messages to the scripts.
pub fn dispatch_pointer_input(
    mut reader: MessageReader<PointerEvent>,
    mut runtime: NonSendMut<LuaRuntime>,
) {
    for event in reader.read() {
        runtime.pointer_event(event);
    }
}

/// Call the scripts' `on_advance` hook with the scaled frame delta.
pub fn advance_scripts(time: Res<WorldTime>, mut runtime: NonSendMut<LuaRuntime>) {
    runtime.advance(time.delta);
}

/// Load and unload textures requested through `engine.load_texture` and
/// `engine.unload_texture`.
pub fn process_asset_commands(
    runtime: NonSend<LuaRuntime>,
    mut rl: NonSendMut<raylib::RaylibHandle>,
    th: NonSend<raylib::RaylibThread>,
    mut textures: ResMut<TextureStore>,
) {
    for cmd in runtime.drain_asset_commands() {
        match cmd {
            AssetCmd::LoadTexture { id, path } => match rl.load_texture(&th, &path) {
                Ok(texture) => {
                    info!("Loaded texture '{}' from {}", id, path);
                    textures.insert(id, texture);
                }
                Err(err) => warn!("Failed to load texture '{}' from {}: {}", id, path, err),
            },
            AssetCmd::UnloadTexture { id } => {
                if !textures.remove(&id) {
                    warn!("Unload requested for unknown texture '{}'", id);
                }
            }
        }
    }
}
