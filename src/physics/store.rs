//! Geometry & body store
//!
//! Bodies and shapes live in generation-checked slot maps. A handle from a
//! removed body never compares equal to a later one, so lookups through a
//! stale handle fail with `PhysicsError::StaleHandle` instead of aliasing
//! whatever reused the slot.
//!
//! Removal is two-phase: `remove_body` retires the body at once (every
//! lookup now fails) and `flush` frees the storage. The world flushes after
//! each substep's collision batch so in-flight events never observe a
//! half-removed body.

use slotmap::{SlotMap, new_key_type};

use super::body::RigidBody;
use super::shape::{Category, Material, Shape, WorldGeometry};
use crate::error::PhysicsError;

new_key_type! {
    /// Handle to a rigid body
    pub struct BodyHandle;
    /// Handle to a shape attached to a body
    pub struct ShapeHandle;
}

#[derive(Debug)]
struct BodyEntry {
    body: RigidBody,
    shapes: Vec<ShapeHandle>,
    retired: bool,
}

#[derive(Debug)]
struct ShapeEntry {
    body: BodyHandle,
    shape: Shape,
}

/// A live shape as seen by renderers and the broad phase
#[derive(Debug, Clone)]
pub struct ShapeView<'a> {
    pub handle: ShapeHandle,
    pub body: BodyHandle,
    pub shape: &'a Shape,
    /// Geometry transformed by the owning body's current pose
    pub world: WorldGeometry,
}

impl ShapeView<'_> {
    #[inline]
    pub fn category(&self) -> Category {
        self.shape.category
    }

    #[inline]
    pub fn material(&self) -> Material {
        self.shape.material
    }
}

/// Owns every body and shape in a world
#[derive(Debug)]
pub struct BodyStore {
    bodies: SlotMap<BodyHandle, BodyEntry>,
    shapes: SlotMap<ShapeHandle, ShapeEntry>,
    static_body: BodyHandle,
    retired: Vec<BodyHandle>,
}

impl Default for BodyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyStore {
    /// Create a store holding only the world-static body at the origin
    pub fn new() -> Self {
        let mut bodies = SlotMap::with_key();
        let static_body = bodies.insert(BodyEntry {
            body: RigidBody::fixed(),
            shapes: Vec::new(),
            retired: false,
        });
        Self {
            bodies,
            shapes: SlotMap::with_key(),
            static_body,
            retired: Vec::new(),
        }
    }

    /// The implicit immovable body anchoring boundary geometry
    #[inline]
    pub fn static_body(&self) -> BodyHandle {
        self.static_body
    }

    /// Register a body together with its shapes
    pub fn insert(&mut self, body: RigidBody, shapes: Vec<Shape>) -> BodyHandle {
        let handle = self.bodies.insert(BodyEntry {
            body,
            shapes: Vec::with_capacity(shapes.len()),
            retired: false,
        });
        for shape in shapes {
            let shape_handle = self.shapes.insert(ShapeEntry {
                body: handle,
                shape,
            });
            self.bodies[handle].shapes.push(shape_handle);
        }
        handle
    }

    /// Attach another shape to an existing body
    pub fn attach_shape(
        &mut self,
        body: BodyHandle,
        shape: Shape,
    ) -> Result<ShapeHandle, PhysicsError> {
        self.entry(body)?;
        let handle = self.shapes.insert(ShapeEntry { body, shape });
        self.bodies[body].shapes.push(handle);
        Ok(handle)
    }

    /// Retire a body and its shapes. Storage is freed by the next `flush`.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        if handle == self.static_body {
            return Err(PhysicsError::InvalidConfig(
                "the world static body cannot be removed".into(),
            ));
        }
        let entry = self
            .bodies
            .get_mut(handle)
            .filter(|e| !e.retired)
            .ok_or(PhysicsError::stale("body"))?;
        entry.retired = true;
        self.retired.push(handle);
        Ok(())
    }

    /// Free every retired body and its shapes, returning their handles
    pub fn flush(&mut self) -> Vec<BodyHandle> {
        let retired = std::mem::take(&mut self.retired);
        for handle in &retired {
            if let Some(entry) = self.bodies.remove(*handle) {
                for shape in entry.shapes {
                    self.shapes.remove(shape);
                }
            }
        }
        retired
    }

    /// Whether the handle refers to a body that has not been removed
    #[inline]
    pub fn is_live(&self, handle: BodyHandle) -> bool {
        self.entry(handle).is_ok()
    }

    fn entry(&self, handle: BodyHandle) -> Result<&BodyEntry, PhysicsError> {
        self.bodies
            .get(handle)
            .filter(|e| !e.retired)
            .ok_or(PhysicsError::stale("body"))
    }

    pub fn body(&self, handle: BodyHandle) -> Result<&RigidBody, PhysicsError> {
        self.entry(handle).map(|e| &e.body)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody, PhysicsError> {
        self.bodies
            .get_mut(handle)
            .filter(|e| !e.retired)
            .map(|e| &mut e.body)
            .ok_or(PhysicsError::stale("body"))
    }

    /// Mutable access to two distinct live bodies at once
    pub fn pair_mut(
        &mut self,
        a: BodyHandle,
        b: BodyHandle,
    ) -> Result<(&mut RigidBody, &mut RigidBody), PhysicsError> {
        self.entry(a)?;
        self.entry(b)?;
        match self.bodies.get_disjoint_mut([a, b]) {
            Some([ea, eb]) => Ok((&mut ea.body, &mut eb.body)),
            None => Err(PhysicsError::InvalidConfig(
                "a body cannot be paired with itself".into(),
            )),
        }
    }

    /// Shapes attached to a live body
    pub fn shapes_of(&self, handle: BodyHandle) -> Result<&[ShapeHandle], PhysicsError> {
        self.entry(handle).map(|e| e.shapes.as_slice())
    }

    /// The body a live shape is attached to
    pub fn shape_body(&self, handle: ShapeHandle) -> Result<BodyHandle, PhysicsError> {
        let entry = self.shapes.get(handle).ok_or(PhysicsError::stale("shape"))?;
        self.entry(entry.body)?;
        Ok(entry.body)
    }

    pub fn shape(&self, handle: ShapeHandle) -> Result<ShapeView<'_>, PhysicsError> {
        let entry = self.shapes.get(handle).ok_or(PhysicsError::stale("shape"))?;
        let body = self.body(entry.body)?;
        Ok(ShapeView {
            handle,
            body: entry.body,
            shape: &entry.shape,
            world: entry.shape.geometry.to_world(body),
        })
    }

    /// Lazy traversal of every live shape; call again to restart
    pub fn shapes(&self) -> impl Iterator<Item = ShapeView<'_>> + '_ {
        self.shapes.iter().filter_map(move |(handle, entry)| {
            let body = self.body(entry.body).ok()?;
            Some(ShapeView {
                handle,
                body: entry.body,
                shape: &entry.shape,
                world: entry.shape.geometry.to_world(body),
            })
        })
    }

    pub fn for_each_shape(&self, mut visitor: impl FnMut(ShapeView<'_>)) {
        for view in self.shapes() {
            visitor(view);
        }
    }

    /// Live bodies in deterministic slot order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.bodies
            .iter()
            .filter(|(_, e)| !e.retired)
            .map(|(h, e)| (h, &e.body))
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = (BodyHandle, &mut RigidBody)> + '_ {
        self.bodies
            .iter_mut()
            .filter(|(_, e)| !e.retired)
            .map(|(h, e)| (h, &mut e.body))
    }

    /// Number of live bodies, including the world-static body
    pub fn body_count(&self) -> usize {
        self.bodies.values().filter(|e| !e.retired).count()
    }

    /// Number of live shapes
    pub fn shape_count(&self) -> usize {
        self.shapes().count()
    }
}
