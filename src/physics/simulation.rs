//! Stepped rigid-body simulation interface and the bundled integrator.
//!
//! The engine only ever talks to a physics backend through [`Simulation`]:
//! create and destroy bodies and fixtures, step, and read back positions,
//! velocities and shape queries. [`KinematicSimulation`] integrates
//! gravity, forces and velocities the same way the movement systems do for
//! rigid bodies; shapes are used for point tests and bounds only, there is
//! no collision response.

use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use smallvec::SmallVec;

use crate::error::BridgeError;
use crate::scene::transform::Bounds;

pub type BodyId = u32;
pub type FixtureId = u32;

/// Largest vertex count accepted for a polygon fixture.
pub const MAX_POLYGON_VERTICES: usize = 8;

const DEFAULT_GRAVITY: (f32, f32) = (0.0, -10.0);
const MIN_POLYGON_AREA: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    Static,
    #[default]
    Dynamic,
    Kinematic,
}

impl BodyKind {
    pub fn parse(name: &str) -> Result<Self, BridgeError> {
        match name {
            "static" => Ok(BodyKind::Static),
            "dynamic" => Ok(BodyKind::Dynamic),
            "kinematic" => Ok(BodyKind::Kinematic),
            other => Err(BridgeError::argument(format!("unknown body type: {}", other))),
        }
    }
}

/// Position, rotation (radians) and velocities of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyState {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub vx: f32,
    pub vy: f32,
    pub angular_velocity: f32,
}

#[derive(Debug, Clone, Default)]
pub struct BodyDef {
    pub kind: BodyKind,
    pub state: BodyState,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub fixed_rotation: bool,
}

/// Fixture material, read straight from a script attribute table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FixtureDef {
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub sensor: bool,
}

impl Default for FixtureDef {
    fn default() -> Self {
        Self {
            density: 0.0,
            friction: 0.2,
            restitution: 0.0,
            sensor: false,
        }
    }
}

/// Fixture geometry in body-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Polygon(ArrayVec<(f32, f32), MAX_POLYGON_VERTICES>),
    Circle { radius: f32, x: f32, y: f32 },
}

impl Shape {
    pub fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Shape {
        let b = Bounds::from_corners(x1, y1, x2, y2);
        let mut vertices = ArrayVec::new();
        vertices.push((b.left, b.bottom));
        vertices.push((b.right, b.bottom));
        vertices.push((b.right, b.top));
        vertices.push((b.left, b.top));
        Shape::Polygon(vertices)
    }

    /// Convex polygon with counter-clockwise winding.
    ///
    /// Clockwise input is reversed. Returns `None` for fewer than three or
    /// more than [`MAX_POLYGON_VERTICES`] points, or a degenerate area.
    pub fn polygon(points: &[(f32, f32)]) -> Option<Shape> {
        if points.len() < 3 || points.len() > MAX_POLYGON_VERTICES {
            return None;
        }
        let mut vertices: ArrayVec<(f32, f32), MAX_POLYGON_VERTICES> =
            points.iter().copied().collect();
        if signed_area(&vertices) < 0.0 {
            vertices.reverse();
        }
        if signed_area(&vertices) <= MIN_POLYGON_AREA {
            return None;
        }
        Some(Shape::Polygon(vertices))
    }

    pub fn area(&self) -> f32 {
        match self {
            Shape::Polygon(vertices) => signed_area(vertices).abs(),
            Shape::Circle { radius, .. } => std::f32::consts::PI * radius * radius,
        }
    }

    /// Point test in body-local coordinates.
    pub fn contains_local(&self, x: f32, y: f32) -> bool {
        match self {
            Shape::Polygon(vertices) => {
                let n = vertices.len();
                (0..n).all(|i| {
                    let (ax, ay) = vertices[i];
                    let (bx, by) = vertices[(i + 1) % n];
                    (bx - ax) * (y - ay) - (by - ay) * (x - ax) >= 0.0
                })
            }
            Shape::Circle { radius, x: cx, y: cy } => {
                let (dx, dy) = (x - cx, y - cy);
                dx * dx + dy * dy <= radius * radius
            }
        }
    }

    fn world_bounds(&self, state: &BodyState) -> Bounds {
        match self {
            Shape::Polygon(vertices) => {
                let mut iter = vertices.iter().map(|&(x, y)| to_world(state, x, y));
                let (x0, y0) = iter.next().unwrap_or((state.x, state.y));
                iter.fold(Bounds::from_corners(x0, y0, x0, y0), |b, (x, y)| Bounds {
                    left: b.left.min(x),
                    bottom: b.bottom.min(y),
                    right: b.right.max(x),
                    top: b.top.max(y),
                })
            }
            Shape::Circle { radius, x, y } => {
                let (cx, cy) = to_world(state, *x, *y);
                Bounds::from_corners(cx - radius, cy - radius, cx + radius, cy + radius)
            }
        }
    }
}

fn signed_area(vertices: &[(f32, f32)]) -> f32 {
    let n = vertices.len();
    let twice: f32 = (0..n)
        .map(|i| {
            let (ax, ay) = vertices[i];
            let (bx, by) = vertices[(i + 1) % n];
            ax * by - bx * ay
        })
        .sum();
    twice * 0.5
}

fn to_world(state: &BodyState, x: f32, y: f32) -> (f32, f32) {
    let (s, c) = state.angle.sin_cos();
    (state.x + c * x - s * y, state.y + s * x + c * y)
}

fn to_local(state: &BodyState, x: f32, y: f32) -> (f32, f32) {
    let (s, c) = state.angle.sin_cos();
    let (dx, dy) = (x - state.x, y - state.y);
    (c * dx + s * dy, -s * dx + c * dy)
}

/// An opaque, stepped physics simulation.
pub trait Simulation {
    fn create_body(&mut self, def: &BodyDef) -> BodyId;
    /// Destroys the body together with all of its fixtures.
    fn destroy_body(&mut self, body: BodyId);
    /// Returns `None` if the body does not exist.
    fn create_fixture(&mut self, body: BodyId, shape: Shape, def: &FixtureDef) -> Option<FixtureId>;
    fn destroy_fixture(&mut self, fixture: FixtureId);
    fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32);

    fn gravity(&self) -> (f32, f32);
    fn set_gravity(&mut self, x: f32, y: f32);

    fn body_state(&self, body: BodyId) -> Option<BodyState>;
    fn set_body_state(&mut self, body: BodyId, state: BodyState);
    fn apply_force(&mut self, body: BodyId, fx: f32, fy: f32);
    fn apply_torque(&mut self, body: BodyId, torque: f32);
    fn apply_impulse(&mut self, body: BodyId, ix: f32, iy: f32);
    fn clear_forces(&mut self, body: BodyId);

    fn fixture_contains_point(&self, fixture: FixtureId, x: f32, y: f32) -> bool;
    fn fixture_bounds(&self, fixture: FixtureId) -> Option<Bounds>;
    /// Fixtures whose bounds overlap `area`, in creation order.
    fn query_box(&self, area: &Bounds) -> Vec<FixtureId>;
}

struct SimBody {
    kind: BodyKind,
    state: BodyState,
    force: (f32, f32),
    torque: f32,
    linear_damping: f32,
    angular_damping: f32,
    fixed_rotation: bool,
    fixtures: SmallVec<[FixtureId; 4]>,
}

struct SimFixture {
    body: BodyId,
    shape: Shape,
    def: FixtureDef,
}

/// Integrates velocity and acceleration without resolving contacts.
///
/// Mass is the sum of fixture `density * area` (1 when that is zero) and
/// the same value stands in for rotational inertia.
pub struct KinematicSimulation {
    gravity: (f32, f32),
    bodies: FxHashMap<BodyId, SimBody>,
    fixtures: FxHashMap<FixtureId, SimFixture>,
    next_id: u32,
}

impl Default for KinematicSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl KinematicSimulation {
    pub fn new() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            bodies: FxHashMap::default(),
            fixtures: FxHashMap::default(),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn mass(&self, body: &SimBody) -> f32 {
        let mass: f32 = body
            .fixtures
            .iter()
            .filter_map(|id| self.fixtures.get(id))
            .map(|f| f.def.density * f.shape.area())
            .sum();
        if mass > 0.0 { mass } else { 1.0 }
    }
}

impl Simulation for KinematicSimulation {
    fn create_body(&mut self, def: &BodyDef) -> BodyId {
        let id = self.next_id();
        self.bodies.insert(
            id,
            SimBody {
                kind: def.kind,
                state: def.state,
                force: (0.0, 0.0),
                torque: 0.0,
                linear_damping: def.linear_damping,
                angular_damping: def.angular_damping,
                fixed_rotation: def.fixed_rotation,
                fixtures: SmallVec::new(),
            },
        );
        id
    }

    fn destroy_body(&mut self, body: BodyId) {
        if let Some(b) = self.bodies.remove(&body) {
            for fixture in b.fixtures {
                self.fixtures.remove(&fixture);
            }
        }
    }

    fn create_fixture(&mut self, body: BodyId, shape: Shape, def: &FixtureDef) -> Option<FixtureId> {
        if !self.bodies.contains_key(&body) {
            return None;
        }
        let id = self.next_id();
        self.fixtures.insert(id, SimFixture { body, shape, def: *def });
        if let Some(b) = self.bodies.get_mut(&body) {
            b.fixtures.push(id);
        }
        Some(id)
    }

    fn destroy_fixture(&mut self, fixture: FixtureId) {
        if let Some(f) = self.fixtures.remove(&fixture) {
            if let Some(b) = self.bodies.get_mut(&f.body) {
                b.fixtures.retain(|id| *id != fixture);
            }
        }
    }

    fn step(&mut self, dt: f32, _velocity_iterations: u32, _position_iterations: u32) {
        let masses: FxHashMap<BodyId, f32> = self
            .bodies
            .iter()
            .map(|(id, b)| (*id, self.mass(b)))
            .collect();
        let gravity = self.gravity;
        for (id, body) in self.bodies.iter_mut() {
            let s = &mut body.state;
            match body.kind {
                BodyKind::Static => {}
                BodyKind::Kinematic => {
                    s.x += s.vx * dt;
                    s.y += s.vy * dt;
                    s.angle += s.angular_velocity * dt;
                }
                BodyKind::Dynamic => {
                    let mass = masses.get(id).copied().unwrap_or(1.0);
                    s.vx += (gravity.0 + body.force.0 / mass) * dt;
                    s.vy += (gravity.1 + body.force.1 / mass) * dt;
                    let damping = 1.0 / (1.0 + dt * body.linear_damping);
                    s.vx *= damping;
                    s.vy *= damping;
                    if body.fixed_rotation {
                        s.angular_velocity = 0.0;
                    } else {
                        s.angular_velocity += body.torque / mass * dt;
                        s.angular_velocity *= 1.0 / (1.0 + dt * body.angular_damping);
                    }
                    s.x += s.vx * dt;
                    s.y += s.vy * dt;
                    s.angle += s.angular_velocity * dt;
                }
            }
            body.force = (0.0, 0.0);
            body.torque = 0.0;
        }
    }

    fn gravity(&self) -> (f32, f32) {
        self.gravity
    }

    fn set_gravity(&mut self, x: f32, y: f32) {
        self.gravity = (x, y);
    }

    fn body_state(&self, body: BodyId) -> Option<BodyState> {
        self.bodies.get(&body).map(|b| b.state)
    }

    fn set_body_state(&mut self, body: BodyId, state: BodyState) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.state = state;
        }
    }

    fn apply_force(&mut self, body: BodyId, fx: f32, fy: f32) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.force.0 += fx;
            b.force.1 += fy;
        }
    }

    fn apply_torque(&mut self, body: BodyId, torque: f32) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.torque += torque;
        }
    }

    fn apply_impulse(&mut self, body: BodyId, ix: f32, iy: f32) {
        let mass = match self.bodies.get(&body) {
            Some(b) if b.kind == BodyKind::Dynamic => self.mass(b),
            _ => return,
        };
        if let Some(b) = self.bodies.get_mut(&body) {
            b.state.vx += ix / mass;
            b.state.vy += iy / mass;
        }
    }

    fn clear_forces(&mut self, body: BodyId) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.force = (0.0, 0.0);
            b.torque = 0.0;
        }
    }

    fn fixture_contains_point(&self, fixture: FixtureId, x: f32, y: f32) -> bool {
        let Some(f) = self.fixtures.get(&fixture) else {
            return false;
        };
        let Some(b) = self.bodies.get(&f.body) else {
            return false;
        };
        let (lx, ly) = to_local(&b.state, x, y);
        f.shape.contains_local(lx, ly)
    }

    fn fixture_bounds(&self, fixture: FixtureId) -> Option<Bounds> {
        let f = self.fixtures.get(&fixture)?;
        let b = self.bodies.get(&f.body)?;
        Some(f.shape.world_bounds(&b.state))
    }

    fn query_box(&self, area: &Bounds) -> Vec<FixtureId> {
        let mut hits: Vec<FixtureId> = self
            .fixtures
            .keys()
            .copied()
            .filter(|id| {
                self.fixture_bounds(*id).is_some_and(|b| {
                    b.left <= area.right
                        && b.right >= area.left
                        && b.bottom <= area.top
                        && b.top >= area.bottom
                })
            })
            .collect();
        hits.sort_unstable();
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn dynamic_at(sim: &mut KinematicSimulation, x: f32, y: f32) -> BodyId {
        sim.create_body(&BodyDef {
            state: BodyState {
                x,
                y,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_polygon_reverses_clockwise_input() {
        let shape = Shape::polygon(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]).unwrap();
        assert!(shape.contains_local(0.5, 0.5));
        assert!(approx_eq(shape.area(), 1.0));
    }

    #[test]
    fn test_polygon_rejects_degenerate() {
        assert!(Shape::polygon(&[(0.0, 0.0), (1.0, 1.0)]).is_none());
        assert!(Shape::polygon(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).is_none());
    }

    #[test]
    fn test_gravity_accelerates_dynamic_bodies() {
        let mut sim = KinematicSimulation::new();
        let body = dynamic_at(&mut sim, 0.0, 0.0);
        sim.step(1.0, 8, 3);
        let s = sim.body_state(body).unwrap();
        assert!(approx_eq(s.vy, -10.0));
        assert!(approx_eq(s.y, -10.0));
    }

    #[test]
    fn test_static_bodies_do_not_move() {
        let mut sim = KinematicSimulation::new();
        let body = sim.create_body(&BodyDef {
            kind: BodyKind::Static,
            ..Default::default()
        });
        sim.step(1.0, 8, 3);
        assert_eq!(sim.body_state(body).unwrap(), BodyState::default());
    }

    #[test]
    fn test_forces_are_cleared_after_step() {
        let mut sim = KinematicSimulation::new();
        sim.set_gravity(0.0, 0.0);
        let body = dynamic_at(&mut sim, 0.0, 0.0);
        sim.apply_force(body, 2.0, 0.0);
        sim.step(1.0, 8, 3);
        sim.step(1.0, 8, 3);
        let s = sim.body_state(body).unwrap();
        assert!(approx_eq(s.vx, 2.0));
        assert!(approx_eq(s.x, 4.0));
    }

    #[test]
    fn test_fixture_point_test_follows_body() {
        let mut sim = KinematicSimulation::new();
        let body = dynamic_at(&mut sim, 10.0, 0.0);
        let fixture = sim
            .create_fixture(body, Shape::rect(-1.0, -1.0, 1.0, 1.0), &FixtureDef::default())
            .unwrap();
        assert!(sim.fixture_contains_point(fixture, 10.5, 0.5));
        assert!(!sim.fixture_contains_point(fixture, 0.0, 0.0));
        let b = sim.fixture_bounds(fixture).unwrap();
        assert!(approx_eq(b.left, 9.0));
        assert!(approx_eq(b.top, 1.0));
    }

    #[test]
    fn test_destroy_body_removes_fixtures() {
        let mut sim = KinematicSimulation::new();
        let body = dynamic_at(&mut sim, 0.0, 0.0);
        let fixture = sim
            .create_fixture(body, Shape::rect(-1.0, -1.0, 1.0, 1.0), &FixtureDef::default())
            .unwrap();
        sim.destroy_body(body);
        assert!(sim.body_state(body).is_none());
        assert!(sim.fixture_bounds(fixture).is_none());
        assert!(sim.create_fixture(body, Shape::rect(0.0, 0.0, 1.0, 1.0), &FixtureDef::default()).is_none());
    }

    #[test]
    fn test_query_box() {
        let mut sim = KinematicSimulation::new();
        let a = dynamic_at(&mut sim, 0.0, 0.0);
        let b = dynamic_at(&mut sim, 100.0, 0.0);
        let fa = sim
            .create_fixture(a, Shape::Circle { radius: 1.0, x: 0.0, y: 0.0 }, &FixtureDef::default())
            .unwrap();
        sim.create_fixture(b, Shape::Circle { radius: 1.0, x: 0.0, y: 0.0 }, &FixtureDef::default());
        let hits = sim.query_box(&Bounds::from_corners(-2.0, -2.0, 2.0, 2.0));
        assert_eq!(hits, vec![fa]);
    }
}
