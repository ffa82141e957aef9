//! Native proxies for physics worlds, bodies and fixtures.
//!
//! Ownership mirrors a rigid-body engine: a world owns its bodies and a body
//! owns its fixtures, while back-pointers are weak. Destroying a body or
//! fixture removes it from the simulation and marks the proxy destroyed; the
//! proxy itself lives on for as long as anything still holds it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::objects::WrapSlot;
use crate::physics::simulation::{
    BodyDef, BodyId, BodyState, FixtureDef, FixtureId, KinematicSimulation, Shape, Simulation,
};
use crate::scene::transform::Bounds;

pub struct PhysicsWorld {
    sim: RefCell<Box<dyn Simulation>>,
    scale: f32,
    bodies: RefCell<Vec<Rc<Body>>>,
    slot: WrapSlot,
}

impl PhysicsWorld {
    /// World backed by the bundled [`KinematicSimulation`].
    ///
    /// `scale` converts simulation units into scene units for body trackers.
    pub fn new(scale: f32) -> Rc<Self> {
        Self::with_simulation(Box::new(KinematicSimulation::new()), scale)
    }

    pub fn with_simulation(sim: Box<dyn Simulation>, scale: f32) -> Rc<Self> {
        Rc::new(Self {
            sim: RefCell::new(sim),
            scale,
            bodies: RefCell::new(Vec::new()),
            slot: WrapSlot::default(),
        })
    }

    pub fn wrap_slot(&self) -> &WrapSlot {
        &self.slot
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn add_body(self: &Rc<Self>, def: &BodyDef) -> Rc<Body> {
        let id = self.sim.borrow_mut().create_body(def);
        let body = Rc::new(Body {
            world: Rc::downgrade(self),
            id,
            destroyed: Cell::new(false),
            fixtures: RefCell::new(Vec::new()),
            slot: WrapSlot::default(),
        });
        self.bodies.borrow_mut().push(body.clone());
        body
    }

    pub fn bodies(&self) -> Vec<Rc<Body>> {
        self.bodies.borrow().clone()
    }

    pub fn step(&self, dt: f32, velocity_iterations: u32, position_iterations: u32) {
        self.sim
            .borrow_mut()
            .step(dt, velocity_iterations, position_iterations);
    }

    pub fn gravity(&self) -> (f32, f32) {
        self.sim.borrow().gravity()
    }

    pub fn set_gravity(&self, x: f32, y: f32) {
        self.sim.borrow_mut().set_gravity(x, y);
    }

    /// Live fixtures whose bounds overlap `area`.
    pub fn query_box(&self, area: &Bounds) -> Vec<Rc<Fixture>> {
        let ids = self.sim.borrow().query_box(area);
        let bodies = self.bodies.borrow();
        ids.into_iter()
            .filter_map(|id| {
                bodies
                    .iter()
                    .flat_map(|b| b.fixtures())
                    .find(|f| f.id == id)
            })
            .collect()
    }

    fn with_sim<R>(&self, f: impl FnOnce(&mut Box<dyn Simulation>) -> R) -> R {
        f(&mut self.sim.borrow_mut())
    }

    fn forget_body(&self, body: &Body) {
        self.bodies
            .borrow_mut()
            .retain(|b| !std::ptr::eq(Rc::as_ptr(b), body));
    }
}

pub struct Body {
    world: Weak<PhysicsWorld>,
    id: BodyId,
    destroyed: Cell<bool>,
    fixtures: RefCell<Vec<Rc<Fixture>>>,
    slot: WrapSlot,
}

impl Body {
    pub fn wrap_slot(&self) -> &WrapSlot {
        &self.slot
    }

    /// Destroyed explicitly, or orphaned because its world is gone.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get() || self.world.strong_count() == 0
    }

    pub fn world(&self) -> Option<Rc<PhysicsWorld>> {
        self.world.upgrade()
    }

    /// Simulation-to-scene scale of the owning world.
    pub fn scale(&self) -> f32 {
        self.world().map(|w| w.scale()).unwrap_or(1.0)
    }

    fn live_world(&self) -> Option<Rc<PhysicsWorld>> {
        if self.destroyed.get() {
            return None;
        }
        self.world()
    }

    pub fn state(&self) -> Option<BodyState> {
        self.live_world()?.with_sim(|sim| sim.body_state(self.id))
    }

    /// Applies `f` to the current state and writes it back.
    pub fn update_state(&self, f: impl FnOnce(&mut BodyState)) -> bool {
        let Some(world) = self.live_world() else {
            return false;
        };
        world.with_sim(|sim| match sim.body_state(self.id) {
            Some(mut state) => {
                f(&mut state);
                sim.set_body_state(self.id, state);
                true
            }
            None => false,
        })
    }

    pub fn apply_force(&self, fx: f32, fy: f32) {
        if let Some(world) = self.live_world() {
            world.with_sim(|sim| sim.apply_force(self.id, fx, fy));
        }
    }

    pub fn apply_torque(&self, torque: f32) {
        if let Some(world) = self.live_world() {
            world.with_sim(|sim| sim.apply_torque(self.id, torque));
        }
    }

    pub fn apply_impulse(&self, ix: f32, iy: f32) {
        if let Some(world) = self.live_world() {
            world.with_sim(|sim| sim.apply_impulse(self.id, ix, iy));
        }
    }

    pub fn clear_forces(&self) {
        if let Some(world) = self.live_world() {
            world.with_sim(|sim| sim.clear_forces(self.id));
        }
    }

    /// Attaches a new fixture; `None` once the body is destroyed.
    pub fn add_fixture(self: &Rc<Self>, shape: Shape, def: &FixtureDef) -> Option<Rc<Fixture>> {
        let world = self.live_world()?;
        let id = world.with_sim(|sim| sim.create_fixture(self.id, shape, def))?;
        let fixture = Rc::new(Fixture {
            body: Rc::downgrade(self),
            id,
            destroyed: Cell::new(false),
            slot: WrapSlot::default(),
        });
        self.fixtures.borrow_mut().push(fixture.clone());
        Some(fixture)
    }

    pub fn fixtures(&self) -> Vec<Rc<Fixture>> {
        self.fixtures.borrow().clone()
    }

    /// Removes the body and its fixtures from the simulation.
    ///
    /// Returns the fixtures that were attached so callers can invalidate
    /// their handles. Destroying twice is a no-op returning nothing.
    pub fn destroy(&self) -> Vec<Rc<Fixture>> {
        if self.destroyed.replace(true) {
            return Vec::new();
        }
        let fixtures: Vec<Rc<Fixture>> = self.fixtures.borrow_mut().drain(..).collect();
        for fixture in &fixtures {
            fixture.destroyed.set(true);
        }
        if let Some(world) = self.world() {
            world.with_sim(|sim| sim.destroy_body(self.id));
            world.forget_body(self);
        }
        fixtures
    }
}

pub struct Fixture {
    body: Weak<Body>,
    id: FixtureId,
    destroyed: Cell<bool>,
    slot: WrapSlot,
}

impl Fixture {
    pub fn wrap_slot(&self) -> &WrapSlot {
        &self.slot
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get() || self.body.upgrade().is_none_or(|b| b.is_destroyed())
    }

    /// Owning body while the fixture is alive.
    pub fn body(&self) -> Option<Rc<Body>> {
        if self.is_destroyed() {
            return None;
        }
        self.body.upgrade()
    }

    fn live_world(&self) -> Option<Rc<PhysicsWorld>> {
        self.body()?.live_world()
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        self.live_world()
            .is_some_and(|w| w.with_sim(|sim| sim.fixture_contains_point(self.id, x, y)))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.live_world()?
            .with_sim(|sim| sim.fixture_bounds(self.id))
    }

    /// Removes the fixture from its body; returns the body it was attached to.
    pub fn destroy(&self) -> Option<Rc<Body>> {
        let body = self.body();
        self.destroyed.set(true);
        if let Some(body) = &body {
            if let Some(world) = body.live_world() {
                world.with_sim(|sim| sim.destroy_fixture(self.id));
            }
            body.fixtures
                .borrow_mut()
                .retain(|f| !std::ptr::eq(Rc::as_ptr(f), self));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_body() -> (Rc<PhysicsWorld>, Rc<Body>) {
        let world = PhysicsWorld::new(1.0);
        let body = world.add_body(&BodyDef::default());
        (world, body)
    }

    #[test]
    fn test_add_body_registers_with_world() {
        let (world, body) = world_with_body();
        assert_eq!(world.bodies().len(), 1);
        assert!(!body.is_destroyed());
        assert_eq!(body.state(), Some(BodyState::default()));
    }

    #[test]
    fn test_destroy_body_invalidates_fixtures() {
        let (world, body) = world_with_body();
        let a = body
            .add_fixture(Shape::rect(-1.0, -1.0, 1.0, 1.0), &FixtureDef::default())
            .unwrap();
        let b = body
            .add_fixture(Shape::Circle { radius: 1.0, x: 0.0, y: 0.0 }, &FixtureDef::default())
            .unwrap();
        let detached = body.destroy();
        assert_eq!(detached.len(), 2);
        assert!(body.is_destroyed());
        assert!(a.is_destroyed());
        assert!(b.is_destroyed());
        assert!(world.bodies().is_empty());
        assert!(body.state().is_none());
        assert!(body.destroy().is_empty());
    }

    #[test]
    fn test_destroyed_body_rejects_fixtures() {
        let (_world, body) = world_with_body();
        body.destroy();
        assert!(body
            .add_fixture(Shape::rect(0.0, 0.0, 1.0, 1.0), &FixtureDef::default())
            .is_none());
    }

    #[test]
    fn test_destroy_fixture_detaches_from_body() {
        let (_world, body) = world_with_body();
        let fixture = body
            .add_fixture(Shape::rect(-1.0, -1.0, 1.0, 1.0), &FixtureDef::default())
            .unwrap();
        let owner = fixture.destroy().unwrap();
        assert!(Rc::ptr_eq(&owner, &body));
        assert!(fixture.is_destroyed());
        assert!(body.fixtures().is_empty());
        assert!(!fixture.contains_point(0.0, 0.0));
    }

    #[test]
    fn test_body_is_destroyed_when_world_drops() {
        let (world, body) = world_with_body();
        drop(world);
        assert!(body.is_destroyed());
        assert!(body.state().is_none());
    }

    #[test]
    fn test_query_box_returns_fixture_proxies() {
        let (world, body) = world_with_body();
        let fixture = body
            .add_fixture(Shape::rect(-1.0, -1.0, 1.0, 1.0), &FixtureDef::default())
            .unwrap();
        let hits = world.query_box(&Bounds::from_corners(0.0, 0.0, 5.0, 5.0));
        assert_eq!(hits.len(), 1);
        assert!(Rc::ptr_eq(&hits[0], &fixture));
    }
}
