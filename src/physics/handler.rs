//! Collision events and the category-pair handler registry
//!
//! Handlers are looked up by unordered category pair. The event a handler
//! receives is oriented so its first shape carries the first category the
//! handler was registered with.

use std::collections::HashMap;

use glam::Vec2;

use super::shape::Category;
use super::store::{BodyHandle, ShapeHandle};
use super::world::World;
use crate::error::PhysicsError;

/// Two overlapping shapes found during a substep's detection pass
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEvent {
    pub shapes: [ShapeHandle; 2],
    pub bodies: [BodyHandle; 2],
    pub categories: [Category; 2],
    /// Contact point on the first shape's surface
    pub point: Vec2,
    /// Unit normal from the first shape toward the second
    pub normal: Vec2,
    pub penetration: f32,
}

impl CollisionEvent {
    /// The same contact with the two shapes exchanged
    pub fn swapped(&self) -> Self {
        Self {
            shapes: [self.shapes[1], self.shapes[0]],
            bodies: [self.bodies[1], self.bodies[0]],
            categories: [self.categories[1], self.categories[0]],
            point: self.point - self.normal * self.penetration,
            normal: -self.normal,
            penetration: self.penetration,
        }
    }
}

/// What the stepper should do with a contact after its handler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactResponse {
    /// Apply the bounce / separation response
    Resolve,
    /// Skip the physical response for this pair this substep
    Ignore,
}

/// Reaction to contacts between two categories
///
/// Handlers may remove bodies through `world`; removal takes effect for
/// lookups immediately and storage is freed once the batch is done.
pub trait CollisionHandler {
    fn begin(
        &mut self,
        world: &mut World,
        event: &CollisionEvent,
    ) -> Result<ContactResponse, PhysicsError>;
}

impl<F> CollisionHandler for F
where
    F: FnMut(&mut World, &CollisionEvent) -> Result<ContactResponse, PhysicsError>,
{
    fn begin(
        &mut self,
        world: &mut World,
        event: &CollisionEvent,
    ) -> Result<ContactResponse, PhysicsError> {
        self(world, event)
    }
}

struct Registration {
    first: Category,
    handler: Box<dyn CollisionHandler>,
}

/// Handlers keyed by unordered category pair
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(Category, Category), Registration>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("pairs", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[inline]
fn pair_key(a: Category, b: Category) -> (Category, Category) {
    if a <= b { (a, b) } else { (b, a) }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for a category pair
    pub fn register(
        &mut self,
        first: Category,
        second: Category,
        handler: impl CollisionHandler + 'static,
    ) {
        self.handlers.insert(
            pair_key(first, second),
            Registration {
                first,
                handler: Box::new(handler),
            },
        );
    }

    pub fn contains(&self, a: Category, b: Category) -> bool {
        self.handlers.contains_key(&pair_key(a, b))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Move every registration from `other` into `self`, `other` winning on conflicts
    pub fn absorb(&mut self, other: HandlerRegistry) {
        self.handlers.extend(other.handlers);
    }

    /// Run the handler for this event's pair, if any; unhandled pairs resolve
    pub fn dispatch(
        &mut self,
        world: &mut World,
        event: &CollisionEvent,
    ) -> Result<ContactResponse, PhysicsError> {
        let [a, b] = event.categories;
        let Some(registration) = self.handlers.get_mut(&pair_key(a, b)) else {
            return Ok(ContactResponse::Resolve);
        };
        if a == registration.first {
            registration.handler.begin(world, event)
        } else {
            registration.handler.begin(world, &event.swapped())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::{Mass, Moment, RigidBody};
    use crate::physics::shape::Shape;
    use crate::physics::world::WorldConfig;

    fn event(world: &mut World) -> CollisionEvent {
        let wall = world.add_body(
            RigidBody::fixed(),
            vec![Shape::segment(Vec2::ZERO, Vec2::X, 1.0).unwrap().with_category(Category::Boundary)],
        );
        let ball = world.add_body(
            RigidBody::dynamic(Mass::Finite(1.0), Moment::Infinite).unwrap(),
            vec![Shape::circle(1.0).unwrap().with_category(Category::Ball)],
        );
        let wall_shape = world.store().shapes_of(wall).unwrap()[0];
        let ball_shape = world.store().shapes_of(ball).unwrap()[0];
        CollisionEvent {
            shapes: [wall_shape, ball_shape],
            bodies: [wall, ball],
            categories: [Category::Boundary, Category::Ball],
            point: Vec2::new(0.5, 1.0),
            normal: Vec2::Y,
            penetration: 0.5,
        }
    }

    #[test]
    fn test_swapped_event_reverses_orientation() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let original = event(&mut world);
        let swapped = original.swapped();
        assert_eq!(swapped.categories, [Category::Ball, Category::Boundary]);
        assert_eq!(swapped.normal, -Vec2::Y);
        assert!((swapped.point - Vec2::new(0.5, 0.5)).length() < 1e-6);
        assert_eq!(swapped.swapped().shapes, original.shapes);
    }

    #[test]
    fn test_dispatch_orients_event_to_registration() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let event = event(&mut world);
        let mut registry = HandlerRegistry::new();
        registry.register(
            Category::Ball,
            Category::Boundary,
            |_: &mut World, e: &CollisionEvent| -> Result<ContactResponse, PhysicsError> {
                assert_eq!(e.categories[0], Category::Ball);
                Ok(ContactResponse::Ignore)
            },
        );
        assert!(registry.contains(Category::Boundary, Category::Ball));
        assert_eq!(
            registry.dispatch(&mut world, &event).unwrap(),
            ContactResponse::Ignore
        );
    }

    #[test]
    fn test_unhandled_pairs_resolve() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let mut event = event(&mut world);
        event.categories = [Category::Wall, Category::Ball];
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.dispatch(&mut world, &event).unwrap(),
            ContactResponse::Resolve
        );
    }
}
