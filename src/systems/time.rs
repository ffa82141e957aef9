//! Time update system.
//!
//! Updates the shared [`WorldTime`](crate::resources::worldtime::WorldTime)
//! resource once per frame, before the schedule runs.
use bevy_ecs::prelude::*;

use crate::resources::worldtime::WorldTime;

/// Record a frame of `dt` unscaled seconds on the `WorldTime` resource.
pub fn update_world_time(world: &mut World, dt: f32) {
    world.resource_mut::<WorldTime>().tick(dt);
}
