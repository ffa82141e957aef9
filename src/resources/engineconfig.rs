//! Engine configuration resource.
//!
//! Settings loaded from an INI configuration file, with defaults for a safe
//! startup when the file is missing or incomplete.
//!
//! # Configuration File Format
//!
//! ```ini
//! [window]
//! width = 960
//! height = 640
//! target_fps = 60
//! title = Lantern
//!
//! [script]
//! main = ./scripts/main.lua
//! dev_mode = true
//!
//! [state]
//! path = ./state.bin
//! ```

use bevy_ecs::prelude::*;
use configparser::ini::Ini;
use log::info;
use std::path::PathBuf;

use crate::resources::lua_runtime::ErrorPolicy;

/// Default safe values for startup
const DEFAULT_WINDOW_WIDTH: u32 = 960;
const DEFAULT_WINDOW_HEIGHT: u32 = 640;
const DEFAULT_TARGET_FPS: u32 = 60;
const DEFAULT_TITLE: &str = "Lantern";
const DEFAULT_MAIN_SCRIPT: &str = "./scripts/main.lua";
const DEFAULT_STATE_PATH: &str = "./state.bin";
const DEFAULT_CONFIG_PATH: &str = "./config.ini";

#[derive(Resource, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Window width in pixels.
    pub window_width: u32,
    /// Window height in pixels.
    pub window_height: u32,
    pub target_fps: u32,
    pub title: String,
    /// Script run at startup and again on every reset.
    pub main_script: PathBuf,
    /// Suspend on script errors instead of aborting.
    pub dev_mode: bool,
    /// Where `engine.state` is pickled on exit and read back on start.
    pub state_path: PathBuf,
    /// Path to the configuration file.
    pub config_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create a new configuration with safe default values.
    pub fn new() -> Self {
        Self {
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
            title: DEFAULT_TITLE.to_string(),
            main_script: PathBuf::from(DEFAULT_MAIN_SCRIPT),
            dev_mode: false,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Create a new configuration with a custom config file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Load configuration from the INI file.
    ///
    /// Missing values retain their current (default) values.
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(&mut self) -> Result<(), String> {
        let mut config = Ini::new();
        config
            .load(&self.config_path)
            .map_err(|e| format!("Failed to load config file: {}", e))?;
        self.apply(&config);

        info!(
            "Loaded config: {}x{} window, fps={}, main={:?}, dev_mode={}",
            self.window_width, self.window_height, self.target_fps, self.main_script, self.dev_mode
        );

        Ok(())
    }

    /// Load configuration from INI text instead of a file.
    pub fn load_from_str(&mut self, text: &str) -> Result<(), String> {
        let mut config = Ini::new();
        config
            .read(text.to_string())
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        self.apply(&config);
        Ok(())
    }

    fn apply(&mut self, config: &Ini) {
        // [window] section
        if let Some(width) = config.getuint("window", "width").ok().flatten() {
            self.window_width = width as u32;
        }
        if let Some(height) = config.getuint("window", "height").ok().flatten() {
            self.window_height = height as u32;
        }
        if let Some(fps) = config.getuint("window", "target_fps").ok().flatten() {
            self.target_fps = fps as u32;
        }
        if let Some(title) = config.get("window", "title") {
            self.title = title;
        }

        // [script] section
        if let Some(main) = config.get("script", "main") {
            self.main_script = PathBuf::from(main);
        }
        if let Some(dev) = config.getbool("script", "dev_mode").ok().flatten() {
            self.dev_mode = dev;
        }

        // [state] section
        if let Some(path) = config.get("state", "path") {
            self.state_path = PathBuf::from(path);
        }
    }

    /// Error policy handed to the Lua runtime.
    pub fn error_policy(&self) -> ErrorPolicy {
        if self.dev_mode {
            ErrorPolicy::Development
        } else {
            ErrorPolicy::Production
        }
    }

    /// Get the window size.
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }
}
