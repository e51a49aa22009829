//! 2D rigid-body physics core
//!
//! Contains:
//! - Bodies, shapes and their generation-checked store
//! - Pin joints and damped rotary springs
//! - Narrow-phase collision tests and category-pair handlers
//! - The world and its fixed-substep stepper

pub mod body;
pub mod collision;
pub mod constraint;
pub mod handler;
pub mod shape;
pub mod store;
pub mod world;

pub use body::{BodyKind, Mass, Moment, RigidBody};
pub use constraint::{Constraint, ConstraintId, DampedRotarySpring, PinJoint};
pub use handler::{CollisionEvent, CollisionHandler, ContactResponse, HandlerRegistry};
pub use shape::{Category, Geometry, Material, Shape, WorldGeometry};
pub use store::{BodyHandle, BodyStore, ShapeHandle, ShapeView};
pub use world::{DebugDraw, ShapeSnapshot, StepReport, World, WorldConfig};
