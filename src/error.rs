//! Error types for the physics core and the table built on it

use thiserror::Error;

/// Errors raised by world construction, handle lookups and configuration
#[derive(Error, Debug)]
pub enum PhysicsError {
    /// A body, shape, constraint or actuator handle that is no longer (or never was) live
    #[error("stale {kind} handle")]
    StaleHandle { kind: &'static str },

    /// Zero-radius circle, zero-length segment, non-convex polygon, ...
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Non-positive or non-finite mass / moment of inertia on a finite body
    #[error("non-physical {quantity}: {value}")]
    NonPhysical { quantity: &'static str, value: f32 },

    /// Elasticity outside [0, 1] or negative friction
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// Configuration or step parameters that cannot produce a valid simulation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation applied to the wrong constraint kind
    #[error("constraint mismatch: {0}")]
    ConstraintMismatch(String),

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration JSON could not be parsed or written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PhysicsError {
    pub(crate) fn stale(kind: &'static str) -> Self {
        Self::StaleHandle { kind }
    }
}
