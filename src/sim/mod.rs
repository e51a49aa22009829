//! Pinball table built on the physics core
//!
//! Deterministic: fixed frame time, seeded spawn RNG, commands applied
//! between frames only.

pub mod config;
pub mod table;
pub mod tick;

pub use config::{BallConfig, PaddleConfig, SceneConfig, WallConfig};
pub use table::{ActuatorId, Table};
pub use tick::{Command, FrameInput, FrameReport, advance};
