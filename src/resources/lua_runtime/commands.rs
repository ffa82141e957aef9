//! Commands scripts queue for the host.
//!
//! Asset loading needs the graphics handle, which the Lua side never sees.
//! Scripts push a command and the host drains the queue after each script
//! entry point returns.

/// Asset loading requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetCmd {
    /// Load a texture from a file path under `id`.
    LoadTexture { id: String, path: String },
    /// Drop a previously loaded texture.
    UnloadTexture { id: String },
}
