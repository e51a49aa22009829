//! Rigid body state and mass properties
//!
//! Mass and moment of inertia are tagged as finite or infinite instead of
//! using an `f32::INFINITY` sentinel, so inverse quantities are always a
//! plain 0 for immovable axes.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;
use crate::{cross, rotation};

/// Linear mass of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Mass {
    Finite(f32),
    /// Immovable under linear forces and impulses
    Infinite,
}

impl Mass {
    #[inline]
    pub fn inverse(self) -> f32 {
        match self {
            Mass::Finite(m) => 1.0 / m,
            Mass::Infinite => 0.0,
        }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        matches!(self, Mass::Finite(_))
    }

    fn validate(self) -> Result<(), PhysicsError> {
        match self {
            Mass::Finite(m) if !(m.is_finite() && m > 0.0) => Err(PhysicsError::NonPhysical {
                quantity: "mass",
                value: m,
            }),
            _ => Ok(()),
        }
    }
}

/// Rotational inertia of a body about its origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Moment {
    Finite(f32),
    /// Never rotates
    Infinite,
}

impl Moment {
    #[inline]
    pub fn inverse(self) -> f32 {
        match self {
            Moment::Finite(i) => 1.0 / i,
            Moment::Infinite => 0.0,
        }
    }

    fn validate(self) -> Result<(), PhysicsError> {
        match self {
            Moment::Finite(i) if !(i.is_finite() && i > 0.0) => Err(PhysicsError::NonPhysical {
                quantity: "moment of inertia",
                value: i,
            }),
            _ => Ok(()),
        }
    }
}

/// Whether a body takes part in integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Integrated every substep, moved by impulses on finite axes
    Dynamic,
    /// Fixed in place: infinite mass and moment, never integrated
    Static,
}

/// A rigid body. The body origin is its center of rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub kind: BodyKind,
    pub mass: Mass,
    pub moment: Moment,
    pub position: Vec2,
    /// Orientation (radians, counter-clockwise)
    pub angle: f32,
    pub velocity: Vec2,
    pub angular_velocity: f32,
}

impl RigidBody {
    /// Create a dynamic body, rejecting non-positive or non-finite mass properties
    pub fn dynamic(mass: Mass, moment: Moment) -> Result<Self, PhysicsError> {
        mass.validate()?;
        moment.validate()?;
        Ok(Self {
            kind: BodyKind::Dynamic,
            mass,
            moment,
            position: Vec2::ZERO,
            angle: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
        })
    }

    /// Create an immovable body (boundary anchor, flipper pivot)
    pub fn fixed() -> Self {
        Self {
            kind: BodyKind::Static,
            mass: Mass::Infinite,
            moment: Moment::Infinite,
            position: Vec2::ZERO,
            angle: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    #[inline]
    pub fn inv_mass(&self) -> f32 {
        match self.kind {
            BodyKind::Static => 0.0,
            BodyKind::Dynamic => self.mass.inverse(),
        }
    }

    #[inline]
    pub fn inv_moment(&self) -> f32 {
        match self.kind {
            BodyKind::Static => 0.0,
            BodyKind::Dynamic => self.moment.inverse(),
        }
    }

    /// True when neither impulses nor torques can move this body
    pub fn is_immovable(&self) -> bool {
        self.inv_mass() == 0.0 && self.inv_moment() == 0.0
    }

    /// Rotate a local-frame offset into world orientation (no translation)
    #[inline]
    pub fn rotate(&self, local: Vec2) -> Vec2 {
        rotation(self.angle).rotate(local)
    }

    /// Transform a point from body-local space to world space
    #[inline]
    pub fn local_to_world(&self, local: Vec2) -> Vec2 {
        self.position + self.rotate(local)
    }

    /// Transform a world-space point into this body's local frame
    #[inline]
    pub fn world_to_local(&self, world: Vec2) -> Vec2 {
        rotation(-self.angle).rotate(world - self.position)
    }

    /// Velocity of the material point at `world_point`
    #[inline]
    pub fn velocity_at_world_point(&self, world_point: Vec2) -> Vec2 {
        let r = world_point - self.position;
        self.velocity + r.perp() * self.angular_velocity
    }

    /// Apply a linear impulse at a world-space point (affects spin via the lever arm)
    pub fn apply_impulse(&mut self, impulse: Vec2, world_point: Vec2) {
        let r = world_point - self.position;
        self.velocity += impulse * self.inv_mass();
        self.angular_velocity += cross(r, impulse) * self.inv_moment();
    }

    /// Apply a pure angular impulse
    #[inline]
    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        self.angular_velocity += impulse * self.inv_moment();
    }
}

/// Moment of inertia of a hollow/solid circle about the body origin
pub fn moment_for_circle(mass: f32, inner_radius: f32, outer_radius: f32, offset: Vec2) -> f32 {
    mass * (0.5 * (inner_radius * inner_radius + outer_radius * outer_radius)
        + offset.length_squared())
}

/// Moment of inertia of a rounded segment about the body origin
pub fn moment_for_segment(mass: f32, a: Vec2, b: Vec2, radius: f32) -> f32 {
    let offset = a.lerp(b, 0.5);
    let length = b.distance(a) + 2.0 * radius;
    mass * ((length * length + 4.0 * radius * radius) / 12.0 + offset.length_squared())
}

/// Moment of inertia of a solid polygon about the body origin
///
/// The origin need not lie inside the polygon; flippers pivot on a corner.
/// Winding order does not matter.
pub fn moment_for_poly(mass: f32, vertices: &[Vec2]) -> f32 {
    let n = vertices.len();
    let mut sum1 = 0.0;
    let mut sum2 = 0.0;
    for i in 0..n {
        let v1 = vertices[i];
        let v2 = vertices[(i + 1) % n];
        let a = cross(v2, v1);
        let b = v1.dot(v1) + v1.dot(v2) + v2.dot(v2);
        sum1 += a * b;
        sum2 += a;
    }
    mass * sum1 / (6.0 * sum2)
}
