//! Collision shapes attached to rigid bodies
//!
//! Geometry is stored in the owning body's local frame and transformed into
//! world space (`WorldGeometry`) whenever the collision pass or a renderer
//! needs it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::body::RigidBody;
use crate::cross;
use crate::error::PhysicsError;

const EPSILON: f32 = 1e-6;

/// Collision category used to route contacts to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    /// Playfield walls and anything without a special rule
    #[default]
    Wall,
    Ball,
    /// Out-of-bounds line below the playfield
    Boundary,
    Bumper,
    Paddle,
}

/// Surface properties combined pairwise at contact time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Material {
    /// Bounciness in [0, 1]
    pub elasticity: f32,
    /// Coulomb friction coefficient (>= 0)
    pub friction: f32,
}

impl Material {
    pub fn new(elasticity: f32, friction: f32) -> Result<Self, PhysicsError> {
        if !(0.0..=1.0).contains(&elasticity) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "elasticity {elasticity} outside [0, 1]"
            )));
        }
        if !(friction.is_finite() && friction >= 0.0) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "friction {friction} must be finite and >= 0"
            )));
        }
        Ok(Self {
            elasticity,
            friction,
        })
    }

    /// Combined elasticity and friction for a contact (product rule)
    #[inline]
    pub fn combine(self, other: Material) -> Material {
        Material {
            elasticity: self.elasticity * other.elasticity,
            friction: self.friction * other.friction,
        }
    }
}

/// Shape geometry in body-local coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Circle { radius: f32, offset: Vec2 },
    /// Capsule between `a` and `b`, rounded by `radius`
    Segment { a: Vec2, b: Vec2, radius: f32 },
    /// Convex polygon, counter-clockwise
    Polygon { vertices: Vec<Vec2> },
}

/// Geometry transformed into world space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldGeometry {
    Circle { center: Vec2, radius: f32 },
    Segment { a: Vec2, b: Vec2, radius: f32 },
    Polygon { vertices: Vec<Vec2> },
}

impl Geometry {
    /// Transform into world space using the owning body's pose
    pub fn to_world(&self, body: &RigidBody) -> WorldGeometry {
        match self {
            Geometry::Circle { radius, offset } => WorldGeometry::Circle {
                center: body.local_to_world(*offset),
                radius: *radius,
            },
            Geometry::Segment { a, b, radius } => WorldGeometry::Segment {
                a: body.local_to_world(*a),
                b: body.local_to_world(*b),
                radius: *radius,
            },
            Geometry::Polygon { vertices } => WorldGeometry::Polygon {
                vertices: vertices.iter().map(|v| body.local_to_world(*v)).collect(),
            },
        }
    }
}

impl WorldGeometry {
    pub fn aabb(&self) -> Aabb {
        match self {
            WorldGeometry::Circle { center, radius } => Aabb {
                min: *center - Vec2::splat(*radius),
                max: *center + Vec2::splat(*radius),
            },
            WorldGeometry::Segment { a, b, radius } => Aabb {
                min: a.min(*b) - Vec2::splat(*radius),
                max: a.max(*b) + Vec2::splat(*radius),
            },
            WorldGeometry::Polygon { vertices } => {
                let (min, max) = vertices.iter().fold(
                    (Vec2::splat(f32::MAX), Vec2::splat(f32::MIN)),
                    |(min, max), v| (min.min(*v), max.max(*v)),
                );
                Aabb { min, max }
            }
        }
    }
}

/// Axis-aligned bounding box used as the broad phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// A collidable shape before it is attached to a body
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub geometry: Geometry,
    pub material: Material,
    pub category: Category,
}

impl Shape {
    fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            material: Material::default(),
            category: Category::default(),
        }
    }

    /// Circle centered on the body origin
    pub fn circle(radius: f32) -> Result<Self, PhysicsError> {
        Self::circle_with_offset(radius, Vec2::ZERO)
    }

    pub fn circle_with_offset(radius: f32, offset: Vec2) -> Result<Self, PhysicsError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(PhysicsError::DegenerateGeometry(format!(
                "circle radius {radius} must be positive"
            )));
        }
        if !offset.is_finite() {
            return Err(PhysicsError::DegenerateGeometry(
                "circle offset is not finite".into(),
            ));
        }
        Ok(Self::new(Geometry::Circle { radius, offset }))
    }

    pub fn segment(a: Vec2, b: Vec2, radius: f32) -> Result<Self, PhysicsError> {
        if !(a.is_finite() && b.is_finite()) {
            return Err(PhysicsError::DegenerateGeometry(
                "segment endpoint is not finite".into(),
            ));
        }
        if a.distance_squared(b) < EPSILON {
            return Err(PhysicsError::DegenerateGeometry(format!(
                "segment {a} -> {b} has zero length"
            )));
        }
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(PhysicsError::DegenerateGeometry(format!(
                "segment radius {radius} must be >= 0"
            )));
        }
        Ok(Self::new(Geometry::Segment { a, b, radius }))
    }

    /// Convex polygon; clockwise input is reordered counter-clockwise
    pub fn polygon(vertices: &[Vec2]) -> Result<Self, PhysicsError> {
        let vertices = convex_ccw(vertices)?;
        Ok(Self::new(Geometry::Polygon { vertices }))
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_elasticity(mut self, elasticity: f32) -> Result<Self, PhysicsError> {
        self.material = Material::new(elasticity, self.material.friction)?;
        Ok(self)
    }

    pub fn with_friction(mut self, friction: f32) -> Result<Self, PhysicsError> {
        self.material = Material::new(self.material.elasticity, friction)?;
        Ok(self)
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

/// Validate a convex, simple polygon and return it wound counter-clockwise
fn convex_ccw(vertices: &[Vec2]) -> Result<Vec<Vec2>, PhysicsError> {
    let n = vertices.len();
    if n < 3 {
        return Err(PhysicsError::DegenerateGeometry(format!(
            "polygon needs at least 3 vertices, got {n}"
        )));
    }
    if vertices.iter().any(|v| !v.is_finite()) {
        return Err(PhysicsError::DegenerateGeometry(
            "polygon vertex is not finite".into(),
        ));
    }

    let twice_area: f32 = (0..n)
        .map(|i| cross(vertices[i], vertices[(i + 1) % n]))
        .sum();
    if twice_area.abs() < EPSILON {
        return Err(PhysicsError::DegenerateGeometry(
            "polygon has zero area".into(),
        ));
    }

    let mut ccw = vertices.to_vec();
    if twice_area < 0.0 {
        ccw.reverse();
    }

    // Every turn must be left, and the turns must add up to exactly one revolution
    let mut turning = 0.0;
    for i in 0..n {
        let e1 = ccw[(i + 1) % n] - ccw[i];
        let e2 = ccw[(i + 2) % n] - ccw[(i + 1) % n];
        if e1.length_squared() < EPSILON {
            return Err(PhysicsError::DegenerateGeometry(
                "polygon has a repeated vertex".into(),
            ));
        }
        let turn = cross(e1, e2);
        if turn <= 0.0 {
            return Err(PhysicsError::DegenerateGeometry(
                "polygon is not convex".into(),
            ));
        }
        turning += turn.atan2(e1.dot(e2));
    }
    if (turning - std::f32::consts::TAU).abs() > 1e-3 {
        return Err(PhysicsError::DegenerateGeometry(
            "polygon is self-intersecting".into(),
        ));
    }

    Ok(ccw)
}
