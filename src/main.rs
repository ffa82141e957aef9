//! Lantern engine main entry point.
//!
//! A Lua-scripted 2D scene engine written in Rust using:
//! - **raylib** for windowing, input and drawing
//! - **bevy_ecs** for resources, messages and the frame schedule
//! - **mlua + LuaJIT** for everything the scripts build
//!
//! Scripts build a tree of scene nodes, attach pointer handlers and physics
//! bodies, and either hand a stage to the engine or take over the
//! `on_render` / `on_pointer_*` hooks themselves.
//!
//! # Main Loop
//!
//! 1. Load `config.ini` and apply command line overrides
//! 2. Open the raylib window and build the ECS world
//! 3. Restore `engine.state` from the state file and run the main script
//! 4. Each frame: poll input, dispatch pointer events, advance scripts,
//!    service asset requests, draw
//! 5. Pickle `engine.state` back to the state file on exit
//!
//! # Running
//!
//! ```sh
//! cargo run --release -- --script scripts/main.lua --dev
//! ```

// Do not create console on Windows
#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use std::path::PathBuf;

use bevy_ecs::prelude::*;
use clap::Parser;
use log::{info, warn};

use lanternengine::events::pointer::PointerEvent;
use lanternengine::resources::engineconfig::EngineConfig;
use lanternengine::resources::lua_runtime::LuaRuntime;
use lanternengine::resources::texturestore::TextureStore;
use lanternengine::resources::worldtime::WorldTime;
use lanternengine::systems::input::{
    dispatch_key_input, update_bevy_pointer_messages, update_pointer_input,
};
use lanternengine::systems::render::render_system;
use lanternengine::systems::scripts::{
    advance_scripts, dispatch_pointer_input, process_asset_commands,
};
use lanternengine::systems::time::update_world_time;

/// Lantern, a Lua-scripted scene engine
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Main script to run instead of the one named in the config file.
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,

    /// Configuration file (default: ./config.ini).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Suspend on script errors instead of aborting; F5 resets.
    #[arg(long)]
    dev: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => EngineConfig::with_path(path),
        None => EngineConfig::new(),
    };
    if let Err(e) = config.load_from_file() {
        warn!("{}; using defaults", e);
    }
    if let Some(script) = cli.script {
        config.main_script = script;
    }
    if cli.dev {
        config.dev_mode = true;
    }

    // --------------- Raylib window ---------------
    let (window_width, window_height) = config.window_size();
    let (mut rl, thread) = raylib::init()
        .size(window_width as i32, window_height as i32)
        .resizable()
        .title(&config.title)
        .build();
    rl.set_target_fps(config.target_fps);
    // Escape goes to the scripts, not to the window
    rl.set_exit_key(None);

    // --------------- Lua runtime ---------------
    let mut lua_runtime = match LuaRuntime::new(config.error_policy()) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating Lua runtime: {e}");
            std::process::exit(1);
        }
    };
    match std::fs::read(&config.state_path) {
        Ok(bytes) => {
            if let Err(e) = lua_runtime.restore_state(&bytes) {
                warn!("Ignoring unreadable state file {:?}: {}", config.state_path, e);
            }
        }
        Err(_) => info!("No saved state at {:?}", config.state_path),
    }
    let main_script = config.main_script.to_string_lossy().into_owned();
    lua_runtime.run_main(&main_script);

    // --------------- ECS world ---------------
    let mut world = World::new();
    world.insert_resource(WorldTime::default());
    world.insert_resource(TextureStore::default());
    world.insert_resource(Messages::<PointerEvent>::default());
    world.insert_resource(config);
    world.insert_non_send_resource(rl);
    world.insert_non_send_resource(thread);
    world.insert_non_send_resource(lua_runtime);

    let mut update = Schedule::default();
    update.add_systems(
        (
            update_pointer_input,
            update_bevy_pointer_messages,
            dispatch_pointer_input,
            dispatch_key_input,
            advance_scripts,
            process_asset_commands,
            render_system,
        )
            .chain(),
    );

    if let Err(e) = update.initialize(&mut world) {
        eprintln!("Error initializing schedule: {e}");
        std::process::exit(1);
    }

    // --------------- Main loop ---------------
    while !world
        .non_send_resource::<raylib::RaylibHandle>()
        .window_should_close()
    {
        let dt = world
            .non_send_resource::<raylib::RaylibHandle>()
            .get_frame_time();
        update_world_time(&mut world, dt);

        update.run(&mut world);
    }

    // Textures must go before the window does
    world.resource_mut::<TextureStore>().map.clear();

    // --------------- Persist script state ---------------
    let state_path = world.resource::<EngineConfig>().state_path.clone();
    match world.non_send_resource::<LuaRuntime>().save_state() {
        Ok(bytes) => match std::fs::write(&state_path, bytes) {
            Ok(()) => info!("Saved script state to {:?}", state_path),
            Err(e) => warn!("Could not write state file {:?}: {}", state_path, e),
        },
        Err(e) => warn!("Could not pickle script state: {}", e),
    }
}
