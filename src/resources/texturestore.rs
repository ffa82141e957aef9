use bevy_ecs::prelude::Resource;
use raylib::prelude::Texture2D;
use rustc_hash::FxHashMap;

/// Textures loaded on request of `engine.load_texture`, keyed by script id.
#[derive(Resource, Default)]
pub struct TextureStore {
    pub map: FxHashMap<String, Texture2D>,
}

impl TextureStore {
    pub fn get(&self, id: &str) -> Option<&Texture2D> {
        self.map.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, texture: Texture2D) {
        self.map.insert(id.into(), texture);
    }

    /// Drops the texture; false when nothing was loaded under `id`.
    pub fn remove(&mut self, id: &str) -> bool {
        self.map.remove(id).is_some()
    }
}
