//! Narrow-phase collision detection
//!
//! Every test returns a `CollisionResult` whose normal points from the first
//! shape toward the second. Primitive tests take the circle last, so their
//! normals point toward the ball center like a reflection normal.

use glam::Vec2;

use super::shape::WorldGeometry;

/// Result of a collision check
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Contact point on the first shape's surface (if hit)
    pub point: Vec2,
    /// Unit normal from the first shape toward the second
    pub normal: Vec2,
    /// Overlap depth along the normal
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            point: Vec2::ZERO,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }

    /// Same contact seen from the other shape
    fn flipped(self) -> Self {
        if !self.hit {
            return self;
        }
        Self {
            hit: true,
            point: self.point - self.normal * self.penetration,
            normal: -self.normal,
            penetration: self.penetration,
        }
    }
}

/// Closest point to `p` on segment `a`-`b`
#[inline]
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Circle against circle
pub fn circle_circle(
    center: Vec2,
    radius: f32,
    ball_pos: Vec2,
    ball_radius: f32,
) -> CollisionResult {
    let delta = ball_pos - center;
    let dist = delta.length();
    let reach = radius + ball_radius;
    if dist >= reach {
        return CollisionResult::miss();
    }
    // Coincident centers: push the ball straight up
    let normal = if dist > 1e-6 { delta / dist } else { Vec2::Y };
    CollisionResult {
        hit: true,
        point: center + normal * radius,
        normal,
        penetration: reach - dist,
    }
}

/// Rounded segment against a circle
pub fn segment_circle(
    a: Vec2,
    b: Vec2,
    radius: f32,
    ball_pos: Vec2,
    ball_radius: f32,
) -> CollisionResult {
    let closest = closest_point_on_segment(ball_pos, a, b);
    let delta = ball_pos - closest;
    let dist = delta.length();
    let reach = radius + ball_radius;
    if dist >= reach {
        return CollisionResult::miss();
    }
    let normal = if dist > 1e-6 {
        delta / dist
    } else {
        // Ball center on the segment core - use the segment's left-hand perpendicular
        (b - a).perp().normalize_or(Vec2::Y)
    };
    CollisionResult {
        hit: true,
        point: closest + normal * radius,
        normal,
        penetration: reach - dist,
    }
}

/// Convex counter-clockwise polygon against a circle
pub fn polygon_circle(vertices: &[Vec2], ball_pos: Vec2, ball_radius: f32) -> CollisionResult {
    let n = vertices.len();
    if n < 3 {
        return CollisionResult::miss();
    }

    // Deepest-separating edge
    let mut max_separation = f32::MIN;
    let mut best_normal = Vec2::ZERO;
    for i in 0..n {
        let v = vertices[i];
        let edge = vertices[(i + 1) % n] - v;
        let outward = Vec2::new(edge.y, -edge.x).normalize_or_zero();
        let separation = (ball_pos - v).dot(outward);
        if separation > max_separation {
            max_separation = separation;
            best_normal = outward;
        }
    }

    if max_separation > ball_radius {
        return CollisionResult::miss();
    }

    if max_separation <= 0.0 {
        // Center inside the polygon: exit through the nearest face
        return CollisionResult {
            hit: true,
            point: ball_pos - best_normal * max_separation,
            normal: best_normal,
            penetration: ball_radius - max_separation,
        };
    }

    // Center outside: nearest point on the boundary
    let closest = (0..n)
        .map(|i| closest_point_on_segment(ball_pos, vertices[i], vertices[(i + 1) % n]))
        .min_by(|p, q| {
            p.distance_squared(ball_pos)
                .partial_cmp(&q.distance_squared(ball_pos))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(ball_pos);
    let delta = ball_pos - closest;
    let dist = delta.length();
    if dist >= ball_radius {
        return CollisionResult::miss();
    }
    CollisionResult {
        hit: true,
        point: closest,
        normal: if dist > 1e-6 { delta / dist } else { best_normal },
        penetration: ball_radius - dist,
    }
}

/// Test two world-space geometries; the normal points from `a` toward `b`
///
/// Only pairs involving at least one circle are tested.
pub fn collide(a: &WorldGeometry, b: &WorldGeometry) -> CollisionResult {
    use WorldGeometry::*;
    match (a, b) {
        (Circle { center, radius }, Circle { center: c2, radius: r2 }) => {
            circle_circle(*center, *radius, *c2, *r2)
        }
        (Segment { a, b, radius }, Circle { center, radius: r }) => {
            segment_circle(*a, *b, *radius, *center, *r)
        }
        (Circle { .. }, Segment { .. }) => collide(b, a).flipped(),
        (Polygon { vertices }, Circle { center, radius }) => {
            polygon_circle(vertices, *center, *radius)
        }
        (Circle { .. }, Polygon { .. }) => collide(b, a).flipped(),
        _ => CollisionResult::miss(),
    }
}
