//! The pinball table: boundaries, spring flippers and ball spawning

use std::collections::HashSet;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::config::{PaddleConfig, SceneConfig};
use crate::error::PhysicsError;
use crate::physics::body::moment_for_poly;
use crate::physics::{
    BodyHandle, Category, CollisionEvent, CollisionHandler, ConstraintId, ContactResponse,
    DampedRotarySpring, Mass, Material, Moment, PinJoint, RigidBody, Shape, ShapeSnapshot,
    StepReport, World,
};

/// Index of a flipper in the table's actuator list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorId(pub usize);

/// Removes a ball as soon as it touches the out-of-bounds line
struct DrainBall;

impl CollisionHandler for DrainBall {
    fn begin(
        &mut self,
        world: &mut World,
        event: &CollisionEvent,
    ) -> Result<ContactResponse, PhysicsError> {
        // Registered as (Ball, Boundary): the ball is always first
        let ball = event.bodies[0];
        world.remove_body(ball)?;
        log::debug!("Ball {:?} drained at {}", ball, event.point);
        Ok(ContactResponse::Ignore)
    }
}

/// A flipper: paddle body pinned to a static anchor, driven by a rotary spring
#[derive(Debug, Clone)]
struct Actuator {
    name: String,
    paddle: BodyHandle,
    anchor: BodyHandle,
    pin: ConstraintId,
    spring: ConstraintId,
    rest_angle: f32,
    engaged_angle: f32,
}

/// Scene setup plus the runtime command surface
#[derive(Debug)]
pub struct Table {
    world: World,
    config: SceneConfig,
    actuators: Vec<Actuator>,
    rng: Pcg32,
}

impl Table {
    /// Build the whole scene, or fail without a partial table
    pub fn new(config: SceneConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        let mut world = World::new(config.world.clone())?;

        let walls = &config.walls;
        let wall_material = Material::new(walls.elasticity, walls.friction)?;
        let ground = world.static_body();
        for [a, b] in &walls.segments {
            let wall = Shape::segment(*a, *b, walls.radius)?
                .with_material(wall_material)
                .with_category(Category::Wall);
            world.attach_shape(ground, wall)?;
        }
        let [a, b] = walls.out_of_bounds;
        world.attach_shape(
            ground,
            Shape::segment(a, b, walls.radius)?.with_category(Category::Boundary),
        )?;
        world.register_handler(Category::Ball, Category::Boundary, DrainBall);

        let mut actuators = Vec::with_capacity(config.paddles.len());
        for paddle in &config.paddles {
            actuators.push(build_actuator(&mut world, paddle)?);
        }

        log::info!(
            "Table built: {} walls, {} flippers, seed {}",
            walls.segments.len(),
            actuators.len(),
            config.seed
        );
        Ok(Self {
            world,
            rng: Pcg32::seed_from_u64(config.seed),
            config,
            actuators,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Drop a ball at a random x along the spawn line
    pub fn spawn_ball(&mut self) -> Result<BodyHandle, PhysicsError> {
        let ball = &self.config.ball;
        let x = self.rng.random_range(ball.spawn_x_min..ball.spawn_x_max);
        self.spawn_ball_at(x as f32)
    }

    /// Drop a ball at a chosen x along the spawn line
    pub fn spawn_ball_at(&mut self, x: f32) -> Result<BodyHandle, PhysicsError> {
        if !x.is_finite() {
            return Err(PhysicsError::InvalidConfig(format!(
                "spawn x {x} is not finite"
            )));
        }
        let ball = &self.config.ball;
        let position = Vec2::new(x, ball.spawn_y);
        let body = RigidBody::dynamic(Mass::Finite(ball.mass), Moment::Infinite)?
            .with_position(position);
        let shape = Shape::circle(ball.radius)?
            .with_material(Material::new(ball.elasticity, ball.friction)?)
            .with_category(Category::Ball);
        let handle = self.world.add_body(body, vec![shape]);
        log::debug!("Spawned ball {:?} at {}", handle, position);
        Ok(handle)
    }

    fn actuator(&self, id: ActuatorId) -> Result<&Actuator, PhysicsError> {
        self.actuators
            .get(id.0)
            .ok_or(PhysicsError::StaleHandle { kind: "actuator" })
    }

    /// Retarget a flipper's spring; the paddle swings there over the next substeps
    pub fn set_actuator_target(&mut self, id: ActuatorId, angle: f32) -> Result<(), PhysicsError> {
        let spring = self.actuator(id)?.spring;
        self.world.set_spring_rest_angle(spring, angle)?;
        log::debug!("Actuator {} target -> {:.3}", id.0, angle);
        Ok(())
    }

    /// Flipper button pressed
    pub fn engage(&mut self, id: ActuatorId) -> Result<(), PhysicsError> {
        let angle = self.actuator(id)?.engaged_angle;
        self.set_actuator_target(id, angle)
    }

    /// Flipper button released
    pub fn release(&mut self, id: ActuatorId) -> Result<(), PhysicsError> {
        let angle = self.actuator(id)?.rest_angle;
        self.set_actuator_target(id, angle)
    }

    /// Current paddle orientation
    pub fn actuator_angle(&self, id: ActuatorId) -> Result<f32, PhysicsError> {
        Ok(self.world.body(self.actuator(id)?.paddle)?.angle)
    }

    /// Angle the spring is currently pulling toward
    pub fn actuator_target(&self, id: ActuatorId) -> Result<f32, PhysicsError> {
        self.world.constraints().rest_angle(self.actuator(id)?.spring)
    }

    /// Distance between a paddle's hinge and its anchor
    pub fn actuator_pin_error(&self, id: ActuatorId) -> Result<f32, PhysicsError> {
        self.world
            .constraints()
            .pin_error(self.actuator(id)?.pin, self.world.store())
    }

    pub fn actuator_by_name(&self, name: &str) -> Option<ActuatorId> {
        self.actuators
            .iter()
            .position(|a| a.name == name)
            .map(ActuatorId)
    }

    pub fn actuator_ids(&self) -> impl Iterator<Item = ActuatorId> + '_ {
        (0..self.actuators.len()).map(ActuatorId)
    }

    /// Moving paddle body of a flipper
    pub fn actuator_paddle(&self, id: ActuatorId) -> Result<BodyHandle, PhysicsError> {
        Ok(self.actuator(id)?.paddle)
    }

    /// Static hinge body of a flipper
    pub fn actuator_anchor(&self, id: ActuatorId) -> Result<BodyHandle, PhysicsError> {
        Ok(self.actuator(id)?.anchor)
    }

    /// Live balls, each listed once, in order of their first ball shape
    pub fn balls(&self) -> Vec<BodyHandle> {
        let mut seen = HashSet::new();
        self.world
            .shapes()
            .filter(|view| view.category() == Category::Ball)
            .map(|view| view.body)
            .filter(|body| seen.insert(*body))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<ShapeSnapshot> {
        self.world.snapshot()
    }

    pub fn step(&mut self, frame_time: f32) -> Result<StepReport, PhysicsError> {
        self.world.step(frame_time)
    }
}

fn build_actuator(world: &mut World, config: &PaddleConfig) -> Result<Actuator, PhysicsError> {
    let shape = Shape::polygon(&config.vertices)?
        .with_material(Material::new(config.elasticity, config.friction)?)
        .with_category(Category::Paddle);
    let moment = moment_for_poly(config.mass, &config.vertices);
    let body = RigidBody::dynamic(Mass::Finite(config.mass), Moment::Finite(moment))?
        .with_position(config.pivot)
        .with_angle(config.rest_angle);
    let paddle = world.add_body(body, vec![shape]);
    let anchor = world.add_body(RigidBody::fixed().with_position(config.pivot), Vec::new());

    let pin = world.add_constraint(PinJoint::new(anchor, paddle, Vec2::ZERO, Vec2::ZERO))?;
    let spring = world.add_constraint(DampedRotarySpring::new(
        paddle,
        anchor,
        config.rest_angle,
        config.stiffness,
        config.damping,
    )?)?;

    log::info!(
        "Flipper '{}' at {} (rest {:.3}, engaged {:.3})",
        config.name,
        config.pivot,
        config.rest_angle,
        config.engaged_angle
    );
    Ok(Actuator {
        name: config.name.clone(),
        paddle,
        anchor,
        pin,
        spring,
        rest_angle: config.rest_angle,
        engaged_angle: config.engaged_angle,
    })
}
