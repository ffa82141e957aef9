use bevy_ecs::prelude::Resource;

/// Frame timing fed to the scripts' `on_advance` hook.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct WorldTime {
    pub elapsed: f32,
    /// Scaled seconds since the previous frame.
    pub delta: f32,
    pub time_scale: f32,
    pub frame: u64,
}

impl Default for WorldTime {
    fn default() -> Self {
        WorldTime {
            elapsed: 0.0,
            delta: 0.0,
            time_scale: 1.0,
            frame: 0,
        }
    }
}

impl WorldTime {
    /// Records a new frame that took `raw_delta` real seconds.
    pub fn tick(&mut self, raw_delta: f32) {
        self.delta = raw_delta.max(0.0) * self.time_scale;
        self.elapsed += self.delta;
        self.frame += 1;
    }
}
