//! Table configuration
//!
//! Everything the table needs at startup. Defaults reproduce the classic
//! two-flipper table; `single_paddle` is the one-flipper variant.

use std::f32::consts::PI;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::PhysicsError;
use crate::physics::{Material, WorldConfig};

/// Static boundary geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    /// Playfield wall segments, hung on the world-static body
    pub segments: Vec<[Vec2; 2]>,
    /// Rounding radius shared by every wall and the out-of-bounds line
    pub radius: f32,
    pub elasticity: f32,
    pub friction: f32,
    /// Balls touching this segment are removed
    pub out_of_bounds: [Vec2; 2],
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            segments: vec![
                [Vec2::new(50.0, 160.0), Vec2::new(190.0, 85.0)],
                [Vec2::new(550.0, 160.0), Vec2::new(410.0, 85.0)],
                [Vec2::new(50.0, 160.0), Vec2::new(50.0, 800.0)],
                [Vec2::new(550.0, 800.0), Vec2::new(550.0, 160.0)],
                [Vec2::new(50.0, 800.0), Vec2::new(550.0, 800.0)],
            ],
            radius: WALL_RADIUS,
            elasticity: WALL_ELASTICITY,
            friction: 0.0,
            out_of_bounds: [
                Vec2::new(0.0, OUT_OF_BOUNDS_Y),
                Vec2::new(700.0, OUT_OF_BOUNDS_Y),
            ],
        }
    }
}

/// Spawned balls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallConfig {
    pub radius: f32,
    pub mass: f32,
    pub elasticity: f32,
    pub friction: f32,
    /// Height of the spawn line
    pub spawn_y: f32,
    /// Spawn x is drawn from `spawn_x_min..spawn_x_max` (whole units)
    pub spawn_x_min: i32,
    pub spawn_x_max: i32,
}

impl Default for BallConfig {
    fn default() -> Self {
        Self {
            radius: BALL_RADIUS,
            mass: BALL_MASS,
            elasticity: BALL_ELASTICITY,
            friction: 0.0,
            spawn_y: BALL_SPAWN_Y,
            spawn_x_min: BALL_SPAWN_X_MIN,
            spawn_x_max: BALL_SPAWN_X_MAX,
        }
    }
}

/// One spring-driven flipper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddleConfig {
    pub name: String,
    /// World position of the hinge; the paddle body's origin sits here
    pub pivot: Vec2,
    /// Paddle outline relative to the pivot, either winding
    pub vertices: Vec<Vec2>,
    pub mass: f32,
    pub stiffness: f32,
    pub damping: f32,
    /// Spring target while the flipper is released
    pub rest_angle: f32,
    /// Spring target while the flipper is held
    pub engaged_angle: f32,
    #[serde(default)]
    pub elasticity: f32,
    #[serde(default)]
    pub friction: f32,
}

impl PaddleConfig {
    /// Flipper on the left of the drain, swinging up counter-clockwise
    pub fn left() -> Self {
        Self {
            name: "left".into(),
            pivot: Vec2::new(200.0, 60.0),
            vertices: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(PADDLE_LENGTH, 0.0),
                Vec2::new(PADDLE_LENGTH, PADDLE_WIDTH),
                Vec2::new(0.0, PADDLE_WIDTH),
            ],
            mass: PADDLE_MASS,
            stiffness: PADDLE_STIFFNESS,
            damping: PADDLE_DAMPING,
            rest_angle: -PI / 6.0,
            engaged_angle: PI / 4.0,
            elasticity: 0.0,
            friction: 0.0,
        }
    }

    /// Mirror image of `left`, swinging up clockwise
    pub fn right() -> Self {
        Self {
            name: "right".into(),
            pivot: Vec2::new(400.0, 60.0),
            vertices: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(-PADDLE_LENGTH, 0.0),
                Vec2::new(-PADDLE_LENGTH, PADDLE_WIDTH),
                Vec2::new(0.0, PADDLE_WIDTH),
            ],
            rest_angle: PI / 6.0,
            engaged_angle: -PI / 4.0,
            ..Self::left()
        }
    }
}

/// Complete table description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub world: WorldConfig,
    /// Seed for spawn positions
    pub seed: u64,
    pub walls: WallConfig,
    pub ball: BallConfig,
    pub paddles: Vec<PaddleConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            seed: 0,
            walls: WallConfig::default(),
            ball: BallConfig::default(),
            paddles: vec![PaddleConfig::left(), PaddleConfig::right()],
        }
    }
}

fn non_physical(quantity: &'static str, value: f32) -> Result<(), PhysicsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::NonPhysical { quantity, value })
    }
}

impl SceneConfig {
    /// The one-flipper table
    pub fn single_paddle() -> Self {
        Self {
            paddles: vec![PaddleConfig::right()],
            ..Self::default()
        }
    }

    /// Check everything that can be checked before bodies are created
    ///
    /// Geometry and material ranges are checked again by the shape
    /// constructors while the table is built.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        self.world.validate()?;

        if !(self.walls.radius.is_finite() && self.walls.radius >= 0.0) {
            return Err(PhysicsError::DegenerateGeometry(format!(
                "wall radius {} must be >= 0",
                self.walls.radius
            )));
        }

        Material::new(self.walls.elasticity, self.walls.friction)?;
        Material::new(self.ball.elasticity, self.ball.friction)?;
        non_physical("ball mass", self.ball.mass)?;
        if !(self.ball.radius.is_finite() && self.ball.radius > 0.0) {
            return Err(PhysicsError::DegenerateGeometry(format!(
                "ball radius {} must be positive",
                self.ball.radius
            )));
        }
        if self.ball.spawn_x_min >= self.ball.spawn_x_max {
            return Err(PhysicsError::InvalidConfig(format!(
                "empty spawn range {}..{}",
                self.ball.spawn_x_min, self.ball.spawn_x_max
            )));
        }
        if !self.ball.spawn_y.is_finite() {
            return Err(PhysicsError::InvalidConfig("spawn height is not finite".into()));
        }

        for paddle in &self.paddles {
            non_physical("paddle mass", paddle.mass)?;
            if !paddle.pivot.is_finite() {
                return Err(PhysicsError::InvalidConfig(format!(
                    "paddle '{}' pivot is not finite",
                    paddle.name
                )));
            }
            if !(paddle.rest_angle.is_finite() && paddle.engaged_angle.is_finite()) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "paddle '{}' angles must be finite",
                    paddle.name
                )));
            }
        }
        if self.paddles.is_empty() {
            log::warn!("Scene has no paddles");
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, PhysicsError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PhysicsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("Loaded scene config from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, PhysicsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
