//! Pointer events and their propagation through the scene graph.
//!
//! Propagation visits a node's handlers in registration order, then its
//! children front-most first. The first handler that consumes the event
//! ends the walk. Decorators translate the coordinate into their child's
//! space on the way down, so every handler sees the coordinate local to the
//! node it is attached to.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bevy_ecs::message::Message;

use crate::scene::node::SceneNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Down,
    Up,
    Move,
}

/// A pointer event in viewport coordinates.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub input_id: i64,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    pub fn new(kind: PointerEventKind, input_id: i64, x: f32, y: f32) -> Self {
        Self { kind, input_id, x, y }
    }
}

/// Capability to call a script callback, identified by its weak-store slot.
///
/// The callback itself is kept alive by a reference-graph edge from the
/// node's handle; if that edge is gone the slot resolves to nothing and the
/// handler stays silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackRef(pub i64);

/// Invokes script callbacks on behalf of handlers.
pub trait CallbackDispatch {
    type Error;

    /// Runs `callback` with `(input_id, x, y)` and reports whether the event
    /// was consumed. A missing callback consumes nothing.
    fn invoke(&mut self, callback: CallbackRef, input_id: i64, x: f32, y: f32)
    -> Result<bool, Self::Error>;
}

/// Enter/exit tracking for a pointer-over handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverState {
    pub first_time: bool,
    pub inside: bool,
}

impl Default for OverState {
    fn default() -> Self {
        Self {
            first_time: true,
            inside: false,
        }
    }
}

pub enum PointerHandler {
    Down(CallbackRef),
    /// Pointer down inside the node's own bounds.
    DownIn(CallbackRef),
    Up(CallbackRef),
    /// Pointer up inside the node's own bounds.
    UpIn(CallbackRef),
    Move(CallbackRef),
    Over {
        enter: Option<CallbackRef>,
        exit: Option<CallbackRef>,
        state: Cell<OverState>,
    },
}

impl PointerHandler {
    pub fn over(enter: Option<CallbackRef>, exit: Option<CallbackRef>) -> Self {
        PointerHandler::Over {
            enter,
            exit,
            state: Cell::new(OverState::default()),
        }
    }

    /// Every callback this handler may invoke.
    pub fn callbacks(&self) -> Vec<CallbackRef> {
        match self {
            PointerHandler::Down(cb)
            | PointerHandler::DownIn(cb)
            | PointerHandler::Up(cb)
            | PointerHandler::UpIn(cb)
            | PointerHandler::Move(cb) => vec![*cb],
            PointerHandler::Over { enter, exit, .. } => enter.iter().chain(exit.iter()).copied().collect(),
        }
    }

    /// Offers the event to this handler at local coordinate `(x, y)`.
    ///
    /// Event kinds a handler does not care about return false without
    /// touching any state. Pointer-over records the new containment before
    /// running a callback, so a failing callback cannot desynchronise it.
    pub fn consume<D: CallbackDispatch>(
        &self,
        node: &SceneNode,
        x: f32,
        y: f32,
        event: &PointerEvent,
        dispatch: &mut D,
    ) -> Result<bool, D::Error> {
        use PointerEventKind::*;
        let id = event.input_id;
        match (self, event.kind) {
            (PointerHandler::Down(cb), Down)
            | (PointerHandler::Up(cb), Up)
            | (PointerHandler::Move(cb), Move) => dispatch.invoke(*cb, id, x, y),
            (PointerHandler::DownIn(cb), Down) | (PointerHandler::UpIn(cb), Up) => {
                if node.contains_point(x, y) {
                    dispatch.invoke(*cb, id, x, y)
                } else {
                    Ok(false)
                }
            }
            (PointerHandler::Over { enter, exit, state }, Move) => {
                let inside = node.contains_point(x, y);
                let previous = state.replace(OverState {
                    first_time: false,
                    inside,
                });
                let callback = if previous.first_time {
                    if inside { *enter } else { None }
                } else if inside && !previous.inside {
                    *enter
                } else if !inside && previous.inside {
                    *exit
                } else {
                    None
                };
                match callback {
                    Some(cb) => dispatch.invoke(cb, id, x, y),
                    None => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }
}

/// Walks the tree rooted at `node` with the event at local `(x, y)`.
///
/// Returns whether some handler consumed the event. Child lists and
/// handler lists are snapshotted before any callback runs, so callbacks may
/// freely restructure the scene.
pub fn propagate<D: CallbackDispatch>(
    node: &Rc<SceneNode>,
    x: f32,
    y: f32,
    event: &PointerEvent,
    dispatch: &mut D,
) -> Result<bool, D::Error> {
    for handler in node.handlers() {
        if handler.consume(node, x, y, event, dispatch)? {
            return Ok(true);
        }
    }
    for (child, cx, cy) in node.event_targets(x, y, event.kind) {
        if propagate(&child, cx, cy, event, dispatch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Routes events either into a scene root or to the exclusive receiver.
#[derive(Default)]
pub struct PointerRouter {
    exclusive: RefCell<Option<Rc<SceneNode>>>,
}

impl PointerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `node` first claim on every event until cleared.
    pub fn set_exclusive(&self, node: Option<Rc<SceneNode>>) {
        *self.exclusive.borrow_mut() = node;
    }

    pub fn exclusive(&self) -> Option<Rc<SceneNode>> {
        self.exclusive.borrow().clone()
    }

    pub fn dispatch<D: CallbackDispatch>(
        &self,
        root: &Rc<SceneNode>,
        event: &PointerEvent,
        dispatch: &mut D,
    ) -> Result<bool, D::Error> {
        let target = self.exclusive().unwrap_or_else(|| root.clone());
        propagate(&target, event.x, event.y, event, dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::{Decoration, Leaf};
    use crate::scene::transform::Bounds;
    use rustc_hash::FxHashMap;

    /// Records invocations; callbacks consume unless told otherwise.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(i64, f32, f32)>,
        results: FxHashMap<i64, bool>,
        failing: Option<i64>,
    }

    impl CallbackDispatch for Recorder {
        type Error = String;

        fn invoke(&mut self, callback: CallbackRef, _input_id: i64, x: f32, y: f32) -> Result<bool, String> {
            self.calls.push((callback.0, x, y));
            if self.failing == Some(callback.0) {
                return Err(format!("callback {} failed", callback.0));
            }
            Ok(self.results.get(&callback.0).copied().unwrap_or(true))
        }
    }

    impl Recorder {
        fn ids(&self) -> Vec<i64> {
            self.calls.iter().map(|c| c.0).collect()
        }
    }

    fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Rc<SceneNode> {
        SceneNode::leaf(Leaf::Rect(Bounds::from_corners(x1, y1, x2, y2)))
    }

    fn down(x: f32, y: f32) -> PointerEvent {
        PointerEvent::new(PointerEventKind::Down, 1, x, y)
    }

    fn moved(x: f32, y: f32) -> PointerEvent {
        PointerEvent::new(PointerEventKind::Move, 1, x, y)
    }

    fn send(node: &Rc<SceneNode>, event: PointerEvent, rec: &mut Recorder) -> bool {
        propagate(node, event.x, event.y, &event, rec).unwrap()
    }

    #[test]
    fn test_handlers_filter_by_event_kind() {
        let node = rect(0.0, 0.0, 1.0, 1.0);
        node.add_handler(PointerHandler::Up(CallbackRef(1)));
        let mut rec = Recorder::default();
        assert!(!send(&node, down(0.5, 0.5), &mut rec));
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn test_hit_filter_forwards_only_inside() {
        let child = rect(-100.0, -100.0, 100.0, 100.0);
        child.add_handler(PointerHandler::Down(CallbackRef(1)));
        let filter = SceneNode::decorator(
            Decoration::HitFilter(Bounds::from_corners(0.0, 0.0, 10.0, 10.0)),
            child,
        );
        let mut rec = Recorder::default();
        assert!(send(&filter, down(5.0, 5.0), &mut rec));
        assert!(!send(&filter, down(15.0, 15.0), &mut rec));
        assert_eq!(rec.ids(), vec![1]);
    }

    #[test]
    fn test_down_filter_lets_moves_through() {
        let child = rect(-100.0, -100.0, 100.0, 100.0);
        child.add_handler(PointerHandler::Down(CallbackRef(1)));
        child.add_handler(PointerHandler::Move(CallbackRef(2)));
        let filter = SceneNode::decorator(
            Decoration::DownFilter(Bounds::from_corners(0.0, 0.0, 10.0, 10.0)),
            child,
        );
        let mut rec = Recorder::default();
        assert!(!send(&filter, down(50.0, 50.0), &mut rec));
        assert!(send(&filter, moved(50.0, 50.0), &mut rec));
        assert_eq!(rec.ids(), vec![2]);
    }

    #[test]
    fn test_front_most_child_consumes_first() {
        let back = rect(0.0, 0.0, 10.0, 10.0);
        let front = rect(0.0, 0.0, 10.0, 10.0);
        back.add_handler(PointerHandler::DownIn(CallbackRef(1)));
        front.add_handler(PointerHandler::DownIn(CallbackRef(2)));
        let layer = SceneNode::layer();
        layer.with_layer(|l| {
            l.insert_front(back.clone());
            l.insert_front(front.clone());
        });
        let mut rec = Recorder::default();
        assert!(send(&layer, down(5.0, 5.0), &mut rec));
        assert_eq!(rec.ids(), vec![2]);

        rec.results.insert(2, false);
        rec.calls.clear();
        assert!(send(&layer, down(5.0, 5.0), &mut rec));
        assert_eq!(rec.ids(), vec![2, 1]);
    }

    #[test]
    fn test_node_handlers_run_before_children() {
        let child = rect(0.0, 0.0, 10.0, 10.0);
        child.add_handler(PointerHandler::Down(CallbackRef(2)));
        let layer = SceneNode::layer();
        layer.with_layer(|l| l.insert_front(child));
        layer.add_handler(PointerHandler::Down(CallbackRef(1)));
        let mut rec = Recorder::default();
        assert!(send(&layer, down(5.0, 5.0), &mut rec));
        assert_eq!(rec.ids(), vec![1]);
    }

    #[test]
    fn test_down_in_uses_local_coordinates() {
        let child = rect(-1.0, -1.0, 1.0, 1.0);
        child.add_handler(PointerHandler::DownIn(CallbackRef(1)));
        let translated =
            SceneNode::decorator(Decoration::Translate { x: 10.0, y: 10.0, z: 0.0 }, child);
        let mut rec = Recorder::default();
        assert!(!send(&translated, down(0.0, 0.0), &mut rec));
        assert!(send(&translated, down(10.5, 10.0), &mut rec));
        assert_eq!(rec.calls, vec![(1, 0.5, 0.0)]);
    }

    #[test]
    fn test_pitch_does_not_forward_events() {
        let child = rect(-1.0, -1.0, 1.0, 1.0);
        child.add_handler(PointerHandler::Down(CallbackRef(1)));
        let pitched = SceneNode::decorator(Decoration::Pitch { pitch: 45.0 }, child);
        let mut rec = Recorder::default();
        assert!(!send(&pitched, down(0.0, 0.0), &mut rec));
    }

    #[test]
    fn test_pointer_over_enter_and_exit_once() {
        let node = rect(0.0, 0.0, 10.0, 10.0);
        node.add_handler(PointerHandler::over(Some(CallbackRef(1)), Some(CallbackRef(2))));
        let mut rec = Recorder::default();
        for (x, y) in [(20.0, 20.0), (5.0, 5.0), (6.0, 6.0), (7.0, 7.0), (20.0, 20.0), (30.0, 30.0)] {
            send(&node, moved(x, y), &mut rec);
        }
        assert_eq!(rec.ids(), vec![1, 2]);
    }

    #[test]
    fn test_pointer_over_first_move_inside_enters() {
        let node = rect(0.0, 0.0, 10.0, 10.0);
        node.add_handler(PointerHandler::over(Some(CallbackRef(1)), Some(CallbackRef(2))));
        let mut rec = Recorder::default();
        send(&node, moved(5.0, 5.0), &mut rec);
        send(&node, moved(5.0, 6.0), &mut rec);
        assert_eq!(rec.ids(), vec![1]);
    }

    #[test]
    fn test_pointer_over_state_survives_failing_callback() {
        let node = rect(0.0, 0.0, 10.0, 10.0);
        node.add_handler(PointerHandler::over(Some(CallbackRef(1)), Some(CallbackRef(2))));
        let mut rec = Recorder {
            failing: Some(1),
            ..Default::default()
        };
        send(&node, moved(20.0, 20.0), &mut rec);
        let event = moved(5.0, 5.0);
        assert!(propagate(&node, 5.0, 5.0, &event, &mut rec).is_err());
        rec.failing = None;
        // Still inside: no second enter.
        send(&node, moved(6.0, 6.0), &mut rec);
        send(&node, moved(20.0, 20.0), &mut rec);
        assert_eq!(rec.ids(), vec![1, 2]);
    }

    #[test]
    fn test_failing_callback_stops_propagation() {
        let back = rect(0.0, 0.0, 10.0, 10.0);
        let front = rect(0.0, 0.0, 10.0, 10.0);
        back.add_handler(PointerHandler::Down(CallbackRef(1)));
        front.add_handler(PointerHandler::Down(CallbackRef(2)));
        let layer = SceneNode::layer();
        layer.with_layer(|l| {
            l.insert_front(back);
            l.insert_front(front);
        });
        let mut rec = Recorder {
            failing: Some(2),
            ..Default::default()
        };
        let event = down(5.0, 5.0);
        assert!(propagate(&layer, 5.0, 5.0, &event, &mut rec).is_err());
        assert_eq!(rec.ids(), vec![2]);
    }

    #[test]
    fn test_exclusive_receiver_bypasses_tree() {
        let grabbed = rect(0.0, 0.0, 1.0, 1.0);
        grabbed.add_handler(PointerHandler::Move(CallbackRef(9)));
        let other = rect(0.0, 0.0, 100.0, 100.0);
        other.add_handler(PointerHandler::Move(CallbackRef(1)));
        let router = PointerRouter::new();
        let mut rec = Recorder::default();

        router.set_exclusive(Some(grabbed.clone()));
        assert!(router.dispatch(&other, &moved(50.0, 50.0), &mut rec).unwrap());
        router.set_exclusive(None);
        assert!(router.dispatch(&other, &moved(50.0, 50.0), &mut rec).unwrap());
        assert_eq!(rec.ids(), vec![9, 1]);
    }

    #[test]
    fn test_handler_callbacks() {
        let over = PointerHandler::over(Some(CallbackRef(3)), None);
        assert_eq!(over.callbacks(), vec![CallbackRef(3)]);
        assert_eq!(PointerHandler::Up(CallbackRef(4)).callbacks(), vec![CallbackRef(4)]);
    }
}
