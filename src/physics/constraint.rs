//! Pin joints and damped rotary springs
//!
//! Constraints act on velocities once per substep, after integration and
//! before collisions, in insertion order.

use glam::{Mat2, Vec2};
use slotmap::{SlotMap, new_key_type};

use super::store::{BodyHandle, BodyStore};
use crate::consts::PIN_JOINT_BIAS;
use crate::error::PhysicsError;

new_key_type! {
    /// Handle to a constraint
    pub struct ConstraintId;
}

/// Holds an anchor point on each body coincident in world space
///
/// Soft: each substep removes `bias` of the remaining positional error, so
/// displacement decays over several substeps instead of snapping.
#[derive(Debug, Clone, PartialEq)]
pub struct PinJoint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor in body A's local frame
    pub anchor_a: Vec2,
    /// Anchor in body B's local frame
    pub anchor_b: Vec2,
    /// Fraction of positional error corrected per substep, in (0, 1]
    pub bias: f32,
    /// Upper bound on the correction velocity
    pub max_bias: f32,
}

impl PinJoint {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            bias: PIN_JOINT_BIAS,
            max_bias: f32::INFINITY,
        }
    }

    pub fn with_bias(mut self, bias: f32) -> Result<Self, PhysicsError> {
        if !(bias > 0.0 && bias <= 1.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "pin joint bias {bias} outside (0, 1]"
            )));
        }
        self.bias = bias;
        Ok(self)
    }

    pub fn with_max_bias(mut self, max_bias: f32) -> Result<Self, PhysicsError> {
        if !(max_bias > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "pin joint max bias {max_bias} must be positive"
            )));
        }
        self.max_bias = max_bias;
        Ok(self)
    }

    /// World-space separation between the two anchors
    pub fn error(&self, store: &BodyStore) -> Result<Vec2, PhysicsError> {
        let a = store.body(self.body_a)?;
        let b = store.body(self.body_b)?;
        Ok(b.local_to_world(self.anchor_b) - a.local_to_world(self.anchor_a))
    }

    fn solve(&self, store: &mut BodyStore, dt: f32) -> Result<(), PhysicsError> {
        let (a, b) = store.pair_mut(self.body_a, self.body_b)?;
        let ra = a.rotate(self.anchor_a);
        let rb = b.rotate(self.anchor_b);
        let pa = a.position + ra;
        let pb = b.position + rb;

        let (ma, ia) = (a.inv_mass(), a.inv_moment());
        let (mb, ib) = (b.inv_mass(), b.inv_moment());
        let off_diagonal = -ia * ra.x * ra.y - ib * rb.x * rb.y;
        let k = Mat2::from_cols(
            Vec2::new(ma + mb + ia * ra.y * ra.y + ib * rb.y * rb.y, off_diagonal),
            Vec2::new(off_diagonal, ma + mb + ia * ra.x * ra.x + ib * rb.x * rb.x),
        );
        let trace = k.x_axis.x + k.y_axis.y;
        if k.determinant().abs() <= 1e-6 * trace * trace {
            // Both ends immovable, or no linear freedom to correct with
            return Ok(());
        }

        let target = (-(pb - pa) * self.bias / dt).clamp_length_max(self.max_bias);
        let relative = b.velocity_at_world_point(pb) - a.velocity_at_world_point(pa);
        let impulse = k.inverse() * (target - relative);

        a.apply_impulse(-impulse, pa);
        b.apply_impulse(impulse, pb);
        Ok(())
    }
}

/// Restoring torque toward a relative rest angle, plus angular damping
///
/// torque = -stiffness * (angle_a - angle_b - rest_angle) - damping * (w_a - w_b),
/// applied to A and the opposite to B. Never touches linear motion.
#[derive(Debug, Clone, PartialEq)]
pub struct DampedRotarySpring {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub rest_angle: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl DampedRotarySpring {
    pub fn new(
        body_a: BodyHandle,
        body_b: BodyHandle,
        rest_angle: f32,
        stiffness: f32,
        damping: f32,
    ) -> Result<Self, PhysicsError> {
        if !(stiffness.is_finite() && stiffness >= 0.0) {
            return Err(PhysicsError::NonPhysical {
                quantity: "spring stiffness",
                value: stiffness,
            });
        }
        if !(damping.is_finite() && damping >= 0.0) {
            return Err(PhysicsError::NonPhysical {
                quantity: "spring damping",
                value: damping,
            });
        }
        if !rest_angle.is_finite() {
            return Err(PhysicsError::InvalidConfig(format!(
                "spring rest angle {rest_angle} is not finite"
            )));
        }
        Ok(Self {
            body_a,
            body_b,
            rest_angle,
            stiffness,
            damping,
        })
    }

    /// Angle of A relative to B
    pub fn relative_angle(&self, store: &BodyStore) -> Result<f32, PhysicsError> {
        Ok(store.body(self.body_a)?.angle - store.body(self.body_b)?.angle)
    }

    fn solve(&self, store: &mut BodyStore, dt: f32) -> Result<(), PhysicsError> {
        let (a, b) = store.pair_mut(self.body_a, self.body_b)?;
        let displacement = a.angle - b.angle - self.rest_angle;
        let relative_velocity = a.angular_velocity - b.angular_velocity;
        let torque = -self.stiffness * displacement - self.damping * relative_velocity;
        let impulse = torque * dt;
        a.apply_angular_impulse(impulse);
        b.apply_angular_impulse(-impulse);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Pin(PinJoint),
    RotarySpring(DampedRotarySpring),
}

impl Constraint {
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match self {
            Constraint::Pin(j) => (j.body_a, j.body_b),
            Constraint::RotarySpring(s) => (s.body_a, s.body_b),
        }
    }

    fn solve(&self, store: &mut BodyStore, dt: f32) -> Result<(), PhysicsError> {
        match self {
            Constraint::Pin(j) => j.solve(store, dt),
            Constraint::RotarySpring(s) => s.solve(store, dt),
        }
    }
}

impl From<PinJoint> for Constraint {
    fn from(joint: PinJoint) -> Self {
        Constraint::Pin(joint)
    }
}

impl From<DampedRotarySpring> for Constraint {
    fn from(spring: DampedRotarySpring) -> Self {
        Constraint::RotarySpring(spring)
    }
}

/// Every constraint in a world, solved in insertion order
#[derive(Debug, Default)]
pub struct ConstraintSet {
    constraints: SlotMap<ConstraintId, Constraint>,
    order: Vec<ConstraintId>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint between two distinct live bodies
    pub fn insert(
        &mut self,
        constraint: Constraint,
        store: &BodyStore,
    ) -> Result<ConstraintId, PhysicsError> {
        let (a, b) = constraint.bodies();
        store.body(a)?;
        store.body(b)?;
        if a == b {
            return Err(PhysicsError::InvalidConfig(
                "a constraint needs two distinct bodies".into(),
            ));
        }
        let id = self.constraints.insert(constraint);
        self.order.push(id);
        Ok(id)
    }

    pub fn get(&self, id: ConstraintId) -> Result<&Constraint, PhysicsError> {
        self.constraints
            .get(id)
            .ok_or(PhysicsError::stale("constraint"))
    }

    /// Change a rotary spring's rest angle
    pub fn set_rest_angle(&mut self, id: ConstraintId, angle: f32) -> Result<(), PhysicsError> {
        if !angle.is_finite() {
            return Err(PhysicsError::InvalidConfig(format!(
                "rest angle {angle} is not finite"
            )));
        }
        match self.constraints.get_mut(id) {
            Some(Constraint::RotarySpring(spring)) => {
                spring.rest_angle = angle;
                Ok(())
            }
            Some(Constraint::Pin(_)) => Err(PhysicsError::ConstraintMismatch(
                "rest angle belongs to rotary springs, not pin joints".into(),
            )),
            None => Err(PhysicsError::stale("constraint")),
        }
    }

    pub fn rest_angle(&self, id: ConstraintId) -> Result<f32, PhysicsError> {
        match self.get(id)? {
            Constraint::RotarySpring(spring) => Ok(spring.rest_angle),
            Constraint::Pin(_) => Err(PhysicsError::ConstraintMismatch(
                "pin joints have no rest angle".into(),
            )),
        }
    }

    /// Distance between a pin joint's world-space anchors
    pub fn pin_error(&self, id: ConstraintId, store: &BodyStore) -> Result<f32, PhysicsError> {
        match self.get(id)? {
            Constraint::Pin(joint) => Ok(joint.error(store)?.length()),
            Constraint::RotarySpring(_) => Err(PhysicsError::ConstraintMismatch(
                "rotary springs have no anchor points".into(),
            )),
        }
    }

    /// Drop every constraint that references `body`
    pub fn remove_attached(&mut self, body: BodyHandle) -> Vec<ConstraintId> {
        let constraints = &mut self.constraints;
        let mut removed = Vec::new();
        self.order.retain(|id| {
            let attached = constraints.get(*id).is_some_and(|c| {
                let (a, b) = c.bodies();
                a == body || b == body
            });
            if attached {
                constraints.remove(*id);
                removed.push(*id);
            }
            !attached
        });
        removed
    }

    /// Apply every constraint once for a substep of length `dt`
    pub fn solve(&self, store: &mut BodyStore, dt: f32) -> Result<(), PhysicsError> {
        for id in &self.order {
            self.constraints[*id].solve(store, dt)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> + '_ {
        self.order.iter().map(|id| (*id, &self.constraints[*id]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::{Mass, Moment, RigidBody, moment_for_poly};
    use crate::physics::shape::Shape;
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 300.0;

    fn paddle_vertices() -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(80.0, 0.0),
            Vec2::new(80.0, 20.0),
            Vec2::new(0.0, 20.0),
        ]
    }

    /// Flipper body on a fixed pivot, returned as (store, paddle, anchor)
    fn flipper(at: Vec2, angle: f32) -> (BodyStore, BodyHandle, BodyHandle) {
        let mut store = BodyStore::new();
        let verts = paddle_vertices();
        let moment = moment_for_poly(10_000.0, &verts);
        let body = RigidBody::dynamic(Mass::Finite(10_000.0), Moment::Finite(moment))
            .unwrap()
            .with_position(at)
            .with_angle(angle);
        let paddle = store.insert(body, vec![Shape::polygon(&verts).unwrap()]);
        let anchor = store.insert(
            RigidBody::fixed().with_position(Vec2::new(200.0, 60.0)),
            Vec::new(),
        );
        (store, paddle, anchor)
    }

    /// Integrate angle then apply constraints, as the stepper does
    fn substep(store: &mut BodyStore, set: &ConstraintSet) {
        for (_, body) in store.bodies_mut() {
            if body.inv_mass() > 0.0 || body.inv_moment() > 0.0 {
                body.position += body.velocity * DT;
                body.angle += body.angular_velocity * DT;
            }
        }
        set.solve(store, DT).unwrap();
    }

    #[test]
    fn test_spring_settles_without_oscillation_growth() {
        let (mut store, paddle, anchor) = flipper(Vec2::new(200.0, 60.0), 1.0);
        let mut set = ConstraintSet::new();
        set.insert(
            DampedRotarySpring::new(paddle, anchor, 0.0, 5.0e10, 2.0e9)
                .unwrap()
                .into(),
            &store,
        )
        .unwrap();

        let mut previous = 1.0f32;
        for _ in 0..150 {
            substep(&mut store, &set);
            let error = store.body(paddle).unwrap().angle.abs();
            assert!(error <= previous + 1e-6, "error grew: {previous} -> {error}");
            previous = error;
        }
        assert!(previous < 1e-3, "spring did not converge: {previous}");
    }

    #[test]
    fn test_spring_leaves_linear_motion_alone() {
        let (mut store, paddle, anchor) = flipper(Vec2::new(200.0, 60.0), 0.5);
        let spring = DampedRotarySpring::new(paddle, anchor, 0.0, 5.0e10, 2.0e9).unwrap();
        spring.solve(&mut store, DT).unwrap();
        let body = store.body(paddle).unwrap();
        assert_eq!(body.velocity, Vec2::ZERO);
        assert!(body.angular_velocity < 0.0);
    }

    #[test]
    fn test_pin_joint_error_decays_monotonically() {
        let (mut store, paddle, anchor) = flipper(Vec2::new(230.0, 45.0), 0.0);
        let mut set = ConstraintSet::new();
        let pin = set
            .insert(
                PinJoint::new(anchor, paddle, Vec2::ZERO, Vec2::ZERO).into(),
                &store,
            )
            .unwrap();

        let mut previous = set.pin_error(pin, &store).unwrap();
        assert!((previous - (30.0f32 * 30.0 + 15.0 * 15.0).sqrt()).abs() < 1e-3);
        for _ in 0..60 {
            substep(&mut store, &set);
            let error = set.pin_error(pin, &store).unwrap();
            assert!(error <= previous, "pin error grew: {previous} -> {error}");
            previous = error;
        }
        assert!(previous < 0.01, "pin joint did not converge: {previous}");
        // The paddle carries no spin from a pivot-centered anchor
        assert_eq!(store.body(paddle).unwrap().angular_velocity, 0.0);
    }

    #[test]
    fn test_pin_joint_off_center_anchor_couples_rotation() {
        let (mut store, paddle, anchor) = flipper(Vec2::new(160.0, 60.0), 0.0);
        let mut set = ConstraintSet::new();
        // Paddle tip (80, 0) pinned to the anchor: (240, 60) must move to (200, 60)
        let pin = set
            .insert(
                PinJoint::new(anchor, paddle, Vec2::ZERO, Vec2::new(80.0, 0.0))
                    .with_bias(0.5)
                    .unwrap()
                    .into(),
                &store,
            )
            .unwrap();
        let start = set.pin_error(pin, &store).unwrap();
        for _ in 0..200 {
            substep(&mut store, &set);
        }
        assert!(set.pin_error(pin, &store).unwrap() < start * 0.01);
    }

    #[test]
    fn test_rest_angle_only_on_springs() {
        let (store, paddle, anchor) = flipper(Vec2::new(200.0, 60.0), 0.0);
        let mut set = ConstraintSet::new();
        let pin = set
            .insert(PinJoint::new(anchor, paddle, Vec2::ZERO, Vec2::ZERO).into(), &store)
            .unwrap();
        let spring = set
            .insert(
                DampedRotarySpring::new(paddle, anchor, 0.3, 1.0, 1.0)
                    .unwrap()
                    .into(),
                &store,
            )
            .unwrap();

        set.set_rest_angle(spring, -0.7).unwrap();
        assert_eq!(set.rest_angle(spring).unwrap(), -0.7);
        assert!(matches!(
            set.set_rest_angle(pin, 1.0),
            Err(PhysicsError::ConstraintMismatch(_))
        ));
        assert!(set.set_rest_angle(spring, f32::NAN).is_err());
        assert_eq!(set.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![pin, spring]);
    }

    #[test]
    fn test_remove_attached() {
        let (store, paddle, anchor) = flipper(Vec2::new(200.0, 60.0), 0.0);
        let mut set = ConstraintSet::new();
        let pin = set
            .insert(PinJoint::new(anchor, paddle, Vec2::ZERO, Vec2::ZERO).into(), &store)
            .unwrap();
        assert_eq!(set.remove_attached(paddle), vec![pin]);
        assert!(set.is_empty());
        assert!(matches!(
            set.get(pin),
            Err(PhysicsError::StaleHandle { kind: "constraint" })
        ));
    }

    #[test]
    fn test_rejects_self_constraint_and_bad_parameters() {
        let (store, paddle, anchor) = flipper(Vec2::new(200.0, 60.0), 0.0);
        let mut set = ConstraintSet::new();
        assert!(
            set.insert(PinJoint::new(paddle, paddle, Vec2::ZERO, Vec2::ZERO).into(), &store)
                .is_err()
        );
        assert!(DampedRotarySpring::new(paddle, anchor, 0.0, -1.0, 0.0).is_err());
        assert!(DampedRotarySpring::new(paddle, anchor, 0.0, 1.0, f32::NAN).is_err());
        assert!(
            PinJoint::new(anchor, paddle, Vec2::ZERO, Vec2::ZERO)
                .with_bias(0.0)
                .is_err()
        );
    }

    proptest! {
        #[test]
        fn prop_spring_error_never_grows(start in -1.5f32..1.5, rest in -0.8f32..0.8) {
            let (mut store, paddle, anchor) = flipper(Vec2::new(200.0, 60.0), start);
            let mut set = ConstraintSet::new();
            set.insert(
                DampedRotarySpring::new(paddle, anchor, rest, 5.0e10, 2.0e9).unwrap().into(),
                &store,
            ).unwrap();
            let mut previous = (start - rest).abs();
            for _ in 0..100 {
                substep(&mut store, &set);
                let error = (store.body(paddle).unwrap().angle - rest).abs();
                prop_assert!(error <= previous + 1e-5);
                previous = error;
            }
        }
    }
}
