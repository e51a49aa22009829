//! Flipper Sim - spring-actuated pinball physics
//!
//! Core modules:
//! - `physics`: Rigid bodies, shapes, constraints, collisions and the fixed-substep stepper
//! - `sim`: The pinball table (boundaries, flippers, ball spawning) and per-frame commands
//! - `error`: Error taxonomy shared by both

pub mod error;
pub mod physics;
pub mod sim;

pub use error::PhysicsError;

use glam::Vec2;

/// Simulation configuration constants
pub mod consts {
    /// Frame rate the frame driver targets
    pub const FRAME_RATE: f32 = 60.0;
    /// Duration of one rendered frame
    pub const FRAME_DT: f32 = 1.0 / FRAME_RATE;
    /// Substeps per frame (each substep is FRAME_DT / SUBSTEPS)
    pub const SUBSTEPS: u32 = 5;

    /// Uniform gravity, pixels/s² (y up)
    pub const GRAVITY: [f32; 2] = [0.0, -900.0];

    /// Fraction of pin joint error corrected per substep
    pub const PIN_JOINT_BIAS: f32 = 0.2;
    /// Penetration allowed before positional correction kicks in
    pub const CONTACT_SLOP: f32 = 0.1;
    /// Fraction of penetration (beyond slop) removed per substep
    pub const CONTACT_CORRECTION: f32 = 0.8;

    /// Ball defaults
    pub const BALL_RADIUS: f32 = 13.0;
    pub const BALL_MASS: f32 = 1.0;
    pub const BALL_ELASTICITY: f32 = 0.4;
    pub const BALL_SPAWN_Y: f32 = 750.0;
    pub const BALL_SPAWN_X_MIN: i32 = 100;
    pub const BALL_SPAWN_X_MAX: i32 = 500;

    /// Wall defaults
    pub const WALL_RADIUS: f32 = 5.0;
    pub const WALL_ELASTICITY: f32 = 0.5;
    /// Height of the out-of-bounds segment below the playfield
    pub const OUT_OF_BOUNDS_Y: f32 = -20.0;

    /// Paddle defaults
    pub const PADDLE_MASS: f32 = 10_000.0;
    pub const PADDLE_LENGTH: f32 = 80.0;
    pub const PADDLE_WIDTH: f32 = 20.0;
    pub const PADDLE_STIFFNESS: f32 = 5.0e10;
    pub const PADDLE_DAMPING: f32 = 2.0e9;
}

/// Wrap an orientation into one turn centered on zero
///
/// Exactly ±π may come back as either sign after rounding.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    (angle + PI).rem_euclid(TAU) - PI
}

/// Unit vector for an angle (x = cos, y = sin)
#[inline]
pub fn rotation(angle: f32) -> Vec2 {
    Vec2::from_angle(angle)
}

/// 2D cross product of two vectors (z component of the 3D cross)
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI + 0.5) - (-PI + 0.5)).abs() < 1e-5);
        assert!((wrap_angle(-PI / 2.0) + PI / 2.0).abs() < 1e-6);
        assert!((wrap_angle(2.5 * PI) - PI / 2.0).abs() < 1e-5);
        assert!((wrap_angle(-7.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        // On the seam either sign is acceptable
        assert!((wrap_angle(3.0 * PI).abs() - PI).abs() < 1e-5);
        assert!((wrap_angle(-PI).abs() - PI).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_and_cross() {
        let r = rotation(PI / 2.0);
        assert!(r.x.abs() < 1e-6);
        assert!((r.y - 1.0).abs() < 1e-6);
        assert_eq!(cross(Vec2::X, Vec2::Y), 1.0);
        assert_eq!(cross(Vec2::Y, Vec2::X), -1.0);
    }
}
