//! Per-frame command application and stepping
//!
//! Commands are applied between frames, never mid-substep, so every frame
//! steps against a stable, command-applied table.

use serde::{Deserialize, Serialize};

use super::table::{ActuatorId, Table};
use crate::error::PhysicsError;
use crate::physics::{BodyHandle, StepReport};

/// A single input command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Spawn a ball at a seeded random x
    SpawnBall,
    /// Spawn a ball at a fixed x
    SpawnBallAt { x: f32 },
    SetActuatorTarget { actuator: ActuatorId, angle: f32 },
    /// Flipper key down
    Engage(ActuatorId),
    /// Flipper key up
    Release(ActuatorId),
}

/// Input commands for a single frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    pub commands: Vec<Command>,
}

impl FrameInput {
    pub fn new(commands: impl IntoIterator<Item = Command>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
        }
    }
}

/// What happened during one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub spawned: Vec<BodyHandle>,
    pub step: StepReport,
}

/// Apply this frame's commands in order, then step the table by `dt`
pub fn advance(
    table: &mut Table,
    input: &FrameInput,
    dt: f32,
) -> Result<FrameReport, PhysicsError> {
    let mut spawned = Vec::new();
    for command in &input.commands {
        match *command {
            Command::SpawnBall => spawned.push(table.spawn_ball()?),
            Command::SpawnBallAt { x } => spawned.push(table.spawn_ball_at(x)?),
            Command::SetActuatorTarget { actuator, angle } => {
                table.set_actuator_target(actuator, angle)?
            }
            Command::Engage(actuator) => table.engage(actuator)?,
            Command::Release(actuator) => table.release(actuator)?,
        }
    }

    let step = table.step(dt)?;
    Ok(FrameReport { spawned, step })
}
