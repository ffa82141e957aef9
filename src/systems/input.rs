//! Input systems.
//!
//! - [`update_pointer_input`] reads the mouse from Raylib each frame and
//!   writes [`PointerEvent`] messages in viewport coordinates.
//! - [`update_bevy_pointer_messages`] advances the message queue so readers
//!   later in the frame see this frame's events.
//! - [`dispatch_key_input`] forwards key presses and releases straight to the
//!   script key hooks.
use bevy_ecs::prelude::*;
use log::{info, warn};
use raylib::ffi::{KeyboardKey, MouseButton};

use crate::events::pointer::{PointerEvent, PointerEventKind};
use crate::resources::engineconfig::EngineConfig;
use crate::resources::lua_runtime::LuaRuntime;

/// Mouse buttons reported to scripts, with the input id each one uses.
const POINTER_BUTTONS: [(MouseButton, i64); 3] = [
    (MouseButton::MOUSE_BUTTON_LEFT, 0),
    (MouseButton::MOUSE_BUTTON_RIGHT, 1),
    (MouseButton::MOUSE_BUTTON_MIDDLE, 2),
];

/// Keys forwarded to `on_key_down` / `on_key_up`, with the name scripts see.
const SCRIPT_KEYS: &[(KeyboardKey, &str)] = &[
    (KeyboardKey::KEY_LEFT, "left"),
    (KeyboardKey::KEY_RIGHT, "right"),
    (KeyboardKey::KEY_UP, "up"),
    (KeyboardKey::KEY_DOWN, "down"),
    (KeyboardKey::KEY_SPACE, "space"),
    (KeyboardKey::KEY_ENTER, "enter"),
    (KeyboardKey::KEY_ESCAPE, "escape"),
    (KeyboardKey::KEY_BACKSPACE, "backspace"),
    (KeyboardKey::KEY_TAB, "tab"),
    (KeyboardKey::KEY_A, "a"),
    (KeyboardKey::KEY_D, "d"),
    (KeyboardKey::KEY_S, "s"),
    (KeyboardKey::KEY_W, "w"),
    (KeyboardKey::KEY_Z, "z"),
    (KeyboardKey::KEY_X, "x"),
];

/// Rebuilds the Lua state in development mode.
const RESET_KEY: KeyboardKey = KeyboardKey::KEY_F5;

/// Last pointer position seen, used to emit moves only when it changes.
#[derive(Default)]
pub struct PointerTracker {
    last: Option<(f32, f32)>,
}

/// Maps a window pixel position to viewport coordinates.
///
/// The viewport origin is the window centre and y grows upwards.
pub fn screen_to_viewport(x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
    (x - width * 0.5, height * 0.5 - y)
}

/// Builds one frame of pointer events: a move when the position changed,
/// then button presses, then releases.
pub fn pointer_events(
    tracker: &mut PointerTracker,
    position: (f32, f32),
    pressed: &[i64],
    released: &[i64],
) -> Vec<PointerEvent> {
    let (x, y) = position;
    let mut events = Vec::with_capacity(1 + pressed.len() + released.len());
    if tracker.last != Some(position) {
        tracker.last = Some(position);
        events.push(PointerEvent::new(PointerEventKind::Move, 0, x, y));
    }
    events.extend(
        pressed
            .iter()
            .map(|&id| PointerEvent::new(PointerEventKind::Down, id, x, y)),
    );
    events.extend(
        released
            .iter()
            .map(|&id| PointerEvent::new(PointerEventKind::Up, id, x, y)),
    );
    events
}

/// Poll Raylib for the mouse and write pointer messages.
pub fn update_pointer_input(
    rl: NonSend<raylib::RaylibHandle>,
    mut tracker: Local<PointerTracker>,
    mut writer: MessageWriter<PointerEvent>,
) {
    let mouse = rl.get_mouse_position();
    let position = screen_to_viewport(
        mouse.x,
        mouse.y,
        rl.get_screen_width() as f32,
        rl.get_screen_height() as f32,
    );
    let pressed: Vec<i64> = POINTER_BUTTONS
        .iter()
        .filter(|(button, _)| rl.is_mouse_button_pressed(*button))
        .map(|(_, id)| *id)
        .collect();
    let released: Vec<i64> = POINTER_BUTTONS
        .iter()
        .filter(|(button, _)| rl.is_mouse_button_released(*button))
        .map(|(_, id)| *id)
        .collect();
    writer.write_batch(pointer_events(&mut tracker, position, &pressed, &released));
}

/// Advance the ECS message queue for [`PointerEvent`].
///
/// Run this after [`update_pointer_input`] so same-frame readers observe writes.
pub fn update_bevy_pointer_messages(mut msgs: ResMut<Messages<PointerEvent>>) {
    msgs.update();
}

/// Forward key presses and releases to the scripts.
///
/// In development mode F5 resets the runtime, which is the way out of a
/// suspended state.
pub fn dispatch_key_input(
    rl: NonSend<raylib::RaylibHandle>,
    config: Res<EngineConfig>,
    mut runtime: NonSendMut<LuaRuntime>,
) {
    if config.dev_mode && rl.is_key_pressed(RESET_KEY) {
        info!("Reset requested");
        if let Err(err) = runtime.reset() {
            warn!("Lua runtime reset failed: {}", err);
        }
        return;
    }
    for (key, name) in SCRIPT_KEYS {
        if rl.is_key_pressed(*key) {
            runtime.key_down(name);
        }
        if rl.is_key_released(*key) {
            runtime.key_up(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_to_viewport_centres_and_flips() {
        assert_eq!(screen_to_viewport(400.0, 300.0, 800.0, 600.0), (0.0, 0.0));
        assert_eq!(screen_to_viewport(0.0, 0.0, 800.0, 600.0), (-400.0, 300.0));
        assert_eq!(screen_to_viewport(800.0, 600.0, 800.0, 600.0), (400.0, -300.0));
    }

    #[test]
    fn test_moves_only_when_position_changes() {
        let mut tracker = PointerTracker::default();
        let first = pointer_events(&mut tracker, (1.0, 2.0), &[], &[]);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, PointerEventKind::Move);
        assert!(pointer_events(&mut tracker, (1.0, 2.0), &[], &[]).is_empty());
        assert_eq!(pointer_events(&mut tracker, (1.5, 2.0), &[], &[]).len(), 1);
    }

    #[test]
    fn test_presses_follow_the_move() {
        let mut tracker = PointerTracker::default();
        let events = pointer_events(&mut tracker, (3.0, 4.0), &[0], &[1]);
        let kinds: Vec<_> = events.iter().map(|e| (e.kind, e.input_id)).collect();
        assert_eq!(
            kinds,
            vec![
                (PointerEventKind::Move, 0),
                (PointerEventKind::Down, 0),
                (PointerEventKind::Up, 1),
            ]
        );
        assert!(events.iter().all(|e| e.x == 3.0 && e.y == 4.0));
    }
}
