//! The world and its fixed-substep stepper
//!
//! Each call to `step` splits the frame into `substeps` equal slices. Per
//! substep, strictly in this order:
//! 1. gravity + semi-implicit Euler integration
//! 2. constraint solve (insertion order)
//! 3. collision detection, handler dispatch, deferred removal, contact response

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::body::{BodyKind, RigidBody};
use super::collision::collide;
use super::constraint::{Constraint, ConstraintId, ConstraintSet};
use super::handler::{CollisionEvent, CollisionHandler, ContactResponse, HandlerRegistry};
use super::shape::{Aabb, Category, Material, Shape, WorldGeometry};
use super::store::{BodyHandle, BodyStore, ShapeHandle, ShapeView};
use crate::consts::{CONTACT_CORRECTION, CONTACT_SLOP, GRAVITY, SUBSTEPS};
use crate::error::PhysicsError;
use crate::{cross, wrap_angle};

/// Static world parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Uniform acceleration applied to every finite-mass body
    pub gravity: Vec2,
    /// Substeps per `step` call
    pub substeps: u32,
    /// Penetration tolerated before positional correction
    pub contact_slop: f32,
    /// Fraction of penetration beyond the slop removed per substep
    pub contact_correction: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::from(GRAVITY),
            substeps: SUBSTEPS,
            contact_slop: CONTACT_SLOP,
            contact_correction: CONTACT_CORRECTION,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig(format!(
                "gravity {} is not finite",
                self.gravity
            )));
        }
        if self.substeps == 0 {
            return Err(PhysicsError::InvalidConfig(
                "at least one substep per frame is required".into(),
            ));
        }
        if !(self.contact_slop.is_finite() && self.contact_slop >= 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "contact slop {} must be >= 0",
                self.contact_slop
            )));
        }
        if !(0.0..=1.0).contains(&self.contact_correction) {
            return Err(PhysicsError::InvalidConfig(format!(
                "contact correction {} outside [0, 1]",
                self.contact_correction
            )));
        }
        Ok(())
    }
}

/// Outcome of one `step` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub substeps: u32,
    /// Overlapping pairs found, summed over substeps
    pub contacts: usize,
    /// Pairs whose handler suppressed the physical response
    pub ignored: usize,
    /// Bodies removed by collision handlers during this step
    pub removed: Vec<BodyHandle>,
}

/// A live shape in world space, for render collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeSnapshot {
    pub category: Category,
    pub geometry: WorldGeometry,
    /// Owning body's position
    pub position: Vec2,
    /// Owning body's orientation, wrapped to [-π, π]
    pub angle: f32,
}

/// Receives every live shape once per draw call
pub trait DebugDraw {
    fn draw_shape(&mut self, shape: &ShapeSnapshot);
}

impl DebugDraw for Vec<ShapeSnapshot> {
    fn draw_shape(&mut self, shape: &ShapeSnapshot) {
        self.push(shape.clone());
    }
}

/// Shape data copied out of the store for one detection pass
struct Candidate {
    handle: ShapeHandle,
    body: BodyHandle,
    category: Category,
    material: Material,
    immovable: bool,
    world: WorldGeometry,
    aabb: Aabb,
}

/// Gravity, bodies, shapes, constraints and collision handlers
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    store: BodyStore,
    constraints: ConstraintSet,
    handlers: HandlerRegistry,
    /// Set while a collision batch is being dispatched
    in_batch: bool,
    /// Substeps taken since construction
    ticks: u64,
}

impl World {
    pub fn new(config: WorldConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self {
            config,
            store: BodyStore::new(),
            constraints: ConstraintSet::new(),
            handlers: HandlerRegistry::new(),
            in_batch: false,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    /// Substeps taken since construction
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn store(&self) -> &BodyStore {
        &self.store
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// The implicit world-static body
    pub fn static_body(&self) -> BodyHandle {
        self.store.static_body()
    }

    pub fn add_body(&mut self, body: RigidBody, shapes: Vec<Shape>) -> BodyHandle {
        self.store.insert(body, shapes)
    }

    pub fn attach_shape(
        &mut self,
        body: BodyHandle,
        shape: Shape,
    ) -> Result<ShapeHandle, PhysicsError> {
        self.store.attach_shape(body, shape)
    }

    /// Remove a body, its shapes and any constraint attached to it
    ///
    /// Inside a collision batch the handle goes stale at once but storage is
    /// only freed after the batch.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        self.store.remove_body(handle)?;
        let dropped = self.constraints.remove_attached(handle);
        if !dropped.is_empty() {
            log::debug!("Dropped {} constraints with removed body", dropped.len());
        }
        if !self.in_batch {
            self.store.flush();
        }
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Result<&RigidBody, PhysicsError> {
        self.store.body(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody, PhysicsError> {
        self.store.body_mut(handle)
    }

    pub fn is_live(&self, handle: BodyHandle) -> bool {
        self.store.is_live(handle)
    }

    pub fn add_constraint(
        &mut self,
        constraint: impl Into<Constraint>,
    ) -> Result<ConstraintId, PhysicsError> {
        self.constraints.insert(constraint.into(), &self.store)
    }

    /// Retarget a damped rotary spring
    pub fn set_spring_rest_angle(
        &mut self,
        id: ConstraintId,
        angle: f32,
    ) -> Result<(), PhysicsError> {
        self.constraints.set_rest_angle(id, angle)
    }

    /// Register the reaction to contacts between two categories
    pub fn register_handler(
        &mut self,
        first: Category,
        second: Category,
        handler: impl CollisionHandler + 'static,
    ) {
        self.handlers.register(first, second, handler);
    }

    pub fn has_handler(&self, a: Category, b: Category) -> bool {
        self.handlers.contains(a, b)
    }

    /// Lazy traversal of live shapes in world space
    pub fn shapes(&self) -> impl Iterator<Item = ShapeView<'_>> + '_ {
        self.store.shapes()
    }

    /// Hand every live shape to a render collaborator
    pub fn debug_draw(&self, drawer: &mut impl DebugDraw) {
        self.store.for_each_shape(|view| {
            if let Ok(body) = self.store.body(view.body) {
                drawer.draw_shape(&ShapeSnapshot {
                    category: view.category(),
                    geometry: view.world,
                    position: body.position,
                    angle: wrap_angle(body.angle),
                });
            }
        });
    }

    /// Owned copy of every live shape in world space
    pub fn snapshot(&self) -> Vec<ShapeSnapshot> {
        let mut shapes = Vec::new();
        self.debug_draw(&mut shapes);
        shapes
    }

    /// Advance by one frame of `frame_time` seconds
    ///
    /// Collision handlers may not step the world they are reacting to.
    pub fn step(&mut self, frame_time: f32) -> Result<StepReport, PhysicsError> {
        if self.in_batch {
            return Err(PhysicsError::InvalidConfig(
                "cannot step from inside a collision handler".into(),
            ));
        }
        if !(frame_time.is_finite() && frame_time > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "frame time {frame_time} must be positive"
            )));
        }
        let substeps = self.config.substeps;
        let dt = frame_time / substeps as f32;
        let mut report = StepReport {
            substeps,
            ..Default::default()
        };
        for _ in 0..substeps {
            self.substep(dt, &mut report)?;
        }
        Ok(report)
    }

    fn substep(&mut self, dt: f32, report: &mut StepReport) -> Result<(), PhysicsError> {
        self.integrate(dt);
        self.constraints.solve(&mut self.store, dt)?;

        let events = self.detect();
        log::trace!("Substep {}: {} contacts", self.ticks, events.len());
        report.contacts += events.len();

        let to_resolve = self.dispatch(events, report)?;
        for (event, material) in &to_resolve {
            self.resolve(event, *material)?;
        }

        self.ticks += 1;
        Ok(())
    }

    /// Gravity, then velocity-first (symplectic) Euler
    fn integrate(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        for (_, body) in self.store.bodies_mut() {
            if body.kind == BodyKind::Static {
                continue;
            }
            if body.mass.is_finite() {
                body.velocity += gravity * dt;
            }
            body.position += body.velocity * dt;
            body.angle += body.angular_velocity * dt;
        }
    }

    /// Every overlapping shape pair, in deterministic slot order
    fn detect(&self) -> Vec<(CollisionEvent, Material)> {
        let candidates: Vec<Candidate> = self
            .store
            .shapes()
            .filter_map(|view| {
                let immovable = self.store.body(view.body).ok()?.is_immovable();
                let aabb = view.world.aabb();
                Some(Candidate {
                    handle: view.handle,
                    body: view.body,
                    category: view.category(),
                    material: view.material(),
                    immovable,
                    world: view.world,
                    aabb,
                })
            })
            .collect();

        let mut events = Vec::new();
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                if a.body == b.body || (a.immovable && b.immovable) {
                    continue;
                }
                if !a.aabb.overlaps(&b.aabb) {
                    continue;
                }
                let result = collide(&a.world, &b.world);
                if !result.hit {
                    continue;
                }
                events.push((
                    CollisionEvent {
                        shapes: [a.handle, b.handle],
                        bodies: [a.body, b.body],
                        categories: [a.category, b.category],
                        point: result.point,
                        normal: result.normal,
                        penetration: result.penetration,
                    },
                    a.material.combine(b.material),
                ));
            }
        }
        events
    }

    /// Run handlers over the whole batch, then free removed bodies
    fn dispatch(
        &mut self,
        events: Vec<(CollisionEvent, Material)>,
        report: &mut StepReport,
    ) -> Result<Vec<(CollisionEvent, Material)>, PhysicsError> {
        let mut registry = std::mem::take(&mut self.handlers);
        self.in_batch = true;

        let mut to_resolve = Vec::with_capacity(events.len());
        let mut outcome = Ok(());
        for (event, material) in events {
            // A handler earlier in this batch may have removed one of the bodies
            if !(self.store.is_live(event.bodies[0]) && self.store.is_live(event.bodies[1])) {
                continue;
            }
            match registry.dispatch(self, &event) {
                Ok(ContactResponse::Resolve) => to_resolve.push((event, material)),
                Ok(ContactResponse::Ignore) => report.ignored += 1,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.in_batch = false;
        // Handlers registered from inside a handler take precedence
        registry.absorb(std::mem::take(&mut self.handlers));
        self.handlers = registry;

        let removed = self.store.flush();
        for handle in &removed {
            log::debug!("Removed body {:?} during collision batch", handle);
        }
        report.removed.extend(removed);
        outcome?;

        to_resolve.retain(|(event, _)| {
            self.store.is_live(event.bodies[0]) && self.store.is_live(event.bodies[1])
        });
        Ok(to_resolve)
    }

    /// Impulse bounce with friction, then positional correction
    fn resolve(&mut self, event: &CollisionEvent, material: Material) -> Result<(), PhysicsError> {
        let slop = self.config.contact_slop;
        let correction = self.config.contact_correction;
        let (a, b) = self.store.pair_mut(event.bodies[0], event.bodies[1])?;
        let n = event.normal;
        let p = event.point;
        let ra = p - a.position;
        let rb = p - b.position;
        let (ma, ia) = (a.inv_mass(), a.inv_moment());
        let (mb, ib) = (b.inv_mass(), b.inv_moment());

        let relative = b.velocity_at_world_point(p) - a.velocity_at_world_point(p);
        let approach = relative.dot(n);
        if approach < 0.0 {
            let rn_a = cross(ra, n);
            let rn_b = cross(rb, n);
            let k_normal = ma + mb + ia * rn_a * rn_a + ib * rn_b * rn_b;
            if k_normal > 0.0 {
                let jn = -(1.0 + material.elasticity) * approach / k_normal;
                a.apply_impulse(-n * jn, p);
                b.apply_impulse(n * jn, p);

                if material.friction > 0.0 {
                    let relative = b.velocity_at_world_point(p) - a.velocity_at_world_point(p);
                    let tangent = (relative - n * relative.dot(n)).normalize_or_zero();
                    let rt_a = cross(ra, tangent);
                    let rt_b = cross(rb, tangent);
                    let k_tangent = ma + mb + ia * rt_a * rt_a + ib * rt_b * rt_b;
                    if tangent != Vec2::ZERO && k_tangent > 0.0 {
                        let limit = material.friction * jn;
                        let jt = (-relative.dot(tangent) / k_tangent).clamp(-limit, limit);
                        a.apply_impulse(-tangent * jt, p);
                        b.apply_impulse(tangent * jt, p);
                    }
                }
            }
        }

        let linear = ma + mb;
        if linear > 0.0 {
            let push = (event.penetration - slop).max(0.0) * correction / linear;
            a.position -= n * (push * ma);
            b.position += n * (push * mb);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::{Mass, Moment};
    use crate::physics::constraint::{DampedRotarySpring, PinJoint};

    const FRAME: f32 = 1.0 / 60.0;

    fn ball_body(at: Vec2) -> RigidBody {
        RigidBody::dynamic(Mass::Finite(1.0), Moment::Infinite)
            .unwrap()
            .with_position(at)
    }

    fn ball_shape() -> Shape {
        Shape::circle(13.0)
            .unwrap()
            .with_elasticity(0.4)
            .unwrap()
            .with_category(Category::Ball)
    }

    #[test]
    fn test_rejects_bad_config_and_frame_time() {
        let config = WorldConfig {
            substeps: 0,
            ..Default::default()
        };
        assert!(matches!(World::new(config), Err(PhysicsError::InvalidConfig(_))));

        let mut world = World::new(WorldConfig::default()).unwrap();
        assert!(world.step(0.0).is_err());
        assert!(world.step(f32::NAN).is_err());
    }

    #[test]
    fn test_free_fall_matches_semi_implicit_euler() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let ball = world.add_body(ball_body(Vec2::new(300.0, 750.0)), vec![ball_shape()]);

        for _ in 0..60 {
            world.step(FRAME).unwrap();
        }

        // 300 substeps of 1/300 s: drop = g dt² n(n+1)/2 = 451.5, analytic ½gt² = 450
        let y = world.body(ball).unwrap().position.y;
        let drop = 750.0 - y;
        assert!((drop - 450.0).abs() < 3.0, "drop was {drop}");
        assert!((world.body(ball).unwrap().velocity.y + 900.0).abs() < 1.0);
        assert_eq!(world.ticks(), 300);
    }

    #[test]
    fn test_static_and_infinite_mass_bodies_ignore_gravity() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let anchor = world.add_body(RigidBody::fixed().with_position(Vec2::new(5.0, 5.0)), Vec::new());
        let spinner = world.add_body(
            RigidBody::dynamic(Mass::Infinite, Moment::Finite(2.0))
                .unwrap()
                .with_position(Vec2::new(1.0, 1.0)),
            Vec::new(),
        );
        world.body_mut(spinner).unwrap().angular_velocity = 1.0;
        world.step(FRAME).unwrap();

        assert_eq!(world.body(anchor).unwrap().position, Vec2::new(5.0, 5.0));
        let spinner = world.body(spinner).unwrap();
        assert_eq!(spinner.position, Vec2::new(1.0, 1.0));
        assert!((spinner.angle - FRAME).abs() < 1e-6);
    }

    #[test]
    fn test_ball_bounces_off_floor_with_product_elasticity() {
        let mut world = World::new(WorldConfig {
            gravity: Vec2::ZERO,
            ..Default::default()
        })
        .unwrap();
        let floor = world.static_body();
        world
            .attach_shape(
                floor,
                Shape::segment(Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0), 5.0)
                    .unwrap()
                    .with_elasticity(0.5)
                    .unwrap(),
            )
            .unwrap();
        let ball = world.add_body(
            ball_body(Vec2::new(0.0, 18.5)).with_velocity(Vec2::new(0.0, -100.0)),
            vec![ball_shape()],
        );

        let report = world.step(FRAME).unwrap();
        assert!(report.contacts >= 1);
        let body = world.body(ball).unwrap();
        // 0.4 * 0.5 = 0.2 restitution
        assert!((body.velocity.y - 20.0).abs() < 1e-3, "vy = {}", body.velocity.y);
        assert!(body.position.y > 17.0);
    }

    #[test]
    fn test_handler_removes_body_and_suppresses_bounce() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let floor = world.static_body();
        world
            .attach_shape(
                floor,
                Shape::segment(Vec2::new(0.0, -20.0), Vec2::new(700.0, -20.0), 5.0)
                    .unwrap()
                    .with_category(Category::Boundary),
            )
            .unwrap();
        world.register_handler(
            Category::Ball,
            Category::Boundary,
            |world: &mut World, event: &CollisionEvent| -> Result<ContactResponse, PhysicsError> {
                world.remove_body(event.bodies[0])?;
                Ok(ContactResponse::Ignore)
            },
        );

        // Two balls touching each other and the boundary in the same substep
        let first = world.add_body(ball_body(Vec2::new(300.0, -5.0)), vec![ball_shape()]);
        let second = world.add_body(ball_body(Vec2::new(320.0, -5.0)), vec![ball_shape()]);
        let survivor = world.add_body(ball_body(Vec2::new(300.0, 400.0)), vec![ball_shape()]);

        let report = world.step(FRAME).unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(report.removed.contains(&first) && report.removed.contains(&second));
        assert!(matches!(
            world.body(first),
            Err(PhysicsError::StaleHandle { kind: "body" })
        ));
        assert!(world.is_live(survivor));
        assert!(world.has_handler(Category::Boundary, Category::Ball));

        let balls = world
            .snapshot()
            .into_iter()
            .filter(|s| s.category == Category::Ball)
            .count();
        assert_eq!(balls, 1);
    }

    #[test]
    fn test_handler_errors_propagate() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let floor = world.static_body();
        world
            .attach_shape(
                floor,
                Shape::segment(Vec2::new(-50.0, 0.0), Vec2::new(50.0, 0.0), 5.0)
                    .unwrap()
                    .with_category(Category::Boundary),
            )
            .unwrap();
        let ball = world.add_body(ball_body(Vec2::new(0.0, 10.0)), vec![ball_shape()]);
        world.register_handler(
            Category::Ball,
            Category::Boundary,
            move |world: &mut World, _: &CollisionEvent| -> Result<ContactResponse, PhysicsError> {
                // Double removal is an invariant violation, not a no-op
                world.remove_body(ball)?;
                world.remove_body(ball)?;
                Ok(ContactResponse::Ignore)
            },
        );
        assert!(matches!(
            world.step(FRAME),
            Err(PhysicsError::StaleHandle { .. })
        ));
        // The registry survives the failed batch
        assert!(world.has_handler(Category::Ball, Category::Boundary));
    }

    #[test]
    fn test_step_inside_handler_is_rejected() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let floor = world.static_body();
        world
            .attach_shape(
                floor,
                Shape::segment(Vec2::new(-50.0, 0.0), Vec2::new(50.0, 0.0), 5.0)
                    .unwrap()
                    .with_category(Category::Boundary),
            )
            .unwrap();
        world.add_body(ball_body(Vec2::new(0.0, 10.0)), vec![ball_shape()]);
        world.register_handler(
            Category::Ball,
            Category::Boundary,
            |world: &mut World, _: &CollisionEvent| -> Result<ContactResponse, PhysicsError> {
                world.step(FRAME)?;
                Ok(ContactResponse::Resolve)
            },
        );

        assert!(matches!(
            world.step(FRAME),
            Err(PhysicsError::InvalidConfig(_))
        ));
        // Neither the nested nor the outer substep completed
        assert_eq!(world.ticks(), 0);
    }

    #[test]
    fn test_friction_stops_sliding_ball() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let floor = world.static_body();
        world
            .attach_shape(
                floor,
                Shape::segment(Vec2::new(-500.0, 0.0), Vec2::new(500.0, 0.0), 5.0)
                    .unwrap()
                    .with_friction(1.0)
                    .unwrap(),
            )
            .unwrap();
        let ball = world.add_body(
            ball_body(Vec2::new(0.0, 17.9)).with_velocity(Vec2::new(100.0, 0.0)),
            vec![
                Shape::circle(13.0)
                    .unwrap()
                    .with_friction(0.5)
                    .unwrap()
                    .with_category(Category::Ball),
            ],
        );

        for _ in 0..30 {
            world.step(FRAME).unwrap();
        }

        let body = world.body(ball).unwrap();
        assert!(body.velocity.x.abs() < 1e-3, "still sliding at {}", body.velocity.x);
        assert!(body.velocity.x >= 0.0, "friction reversed the ball");
        // Deceleration is μg = 0.5 * 900, so it stops after about v² / 2μg = 11.1
        assert!((9.0..13.0).contains(&body.position.x), "slid {}", body.position.x);
        assert!((body.position.y - 17.9).abs() < 0.5);
    }

    #[test]
    fn test_removing_body_drops_its_constraints() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let anchor = world.add_body(RigidBody::fixed(), Vec::new());
        let body = world.add_body(
            RigidBody::dynamic(Mass::Finite(1.0), Moment::Finite(1.0)).unwrap(),
            Vec::new(),
        );
        world
            .add_constraint(PinJoint::new(anchor, body, Vec2::ZERO, Vec2::ZERO))
            .unwrap();
        world
            .add_constraint(DampedRotarySpring::new(body, anchor, 0.0, 10.0, 1.0).unwrap())
            .unwrap();
        assert_eq!(world.constraints().len(), 2);

        world.remove_body(body).unwrap();
        assert!(world.constraints().is_empty());
        world.step(FRAME).unwrap();
    }

    #[test]
    fn test_debug_draw_sees_world_space_shapes() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        world.add_body(ball_body(Vec2::new(10.0, 20.0)), vec![ball_shape()]);
        let mut drawn: Vec<ShapeSnapshot> = Vec::new();
        world.debug_draw(&mut drawn);
        assert_eq!(drawn.len(), 1);
        assert_eq!(
            drawn[0].geometry,
            WorldGeometry::Circle {
                center: Vec2::new(10.0, 20.0),
                radius: 13.0
            }
        );
    }
}
