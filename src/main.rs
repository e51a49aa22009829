//! Flipper Sim entry point
//!
//! Headless frame driver: builds the table from an optional JSON config,
//! plays a scripted input timeline at 60 Hz and prints the final shapes as
//! JSON for an external renderer.

use flipper_sim::PhysicsError;
use flipper_sim::consts::{FRAME_DT, FRAME_RATE};
use flipper_sim::sim::{ActuatorId, Command, FrameInput, SceneConfig, Table, advance};

/// Ten seconds of play
const FRAMES: usize = 600;

/// Spawn a ball every second and pulse each flipper in turn
fn scripted_input(frame: usize, actuators: usize) -> FrameInput {
    let mut commands = Vec::new();
    if frame % FRAME_RATE as usize == 0 {
        commands.push(Command::SpawnBall);
    }
    for id in 0..actuators {
        let phase = (frame + id * 45) % 90;
        if phase == 30 {
            commands.push(Command::Engage(ActuatorId(id)));
        } else if phase == 42 {
            commands.push(Command::Release(ActuatorId(id)));
        }
    }
    FrameInput::new(commands)
}

fn main() -> Result<(), PhysicsError> {
    env_logger::init();
    log::info!("Flipper Sim starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };
    let mut table = Table::new(config)?;
    let actuators = table.actuator_ids().count();

    let mut spawned = 0;
    let mut drained = 0;
    let mut contacts = 0;
    for frame in 0..FRAMES {
        let report = advance(&mut table, &scripted_input(frame, actuators), FRAME_DT)?;
        spawned += report.spawned.len();
        drained += report.step.removed.len();
        contacts += report.step.contacts;
    }

    log::info!(
        "Simulated {} frames: {} balls spawned, {} drained, {} in play, {} contacts",
        FRAMES,
        spawned,
        drained,
        table.balls().len(),
        contacts
    );
    for id in table.actuator_ids() {
        log::info!("Flipper {} at {:.3} rad", id.0, table.actuator_angle(id)?);
    }

    println!("{}", serde_json::to_string_pretty(&table.snapshot())?);
    Ok(())
}
