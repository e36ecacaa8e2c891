//! The physics service seam.
//!
//! The engine never integrates motion or detects collisions. It asks a
//! [`PhysicsService`] for bodies and joints, reads their state, and applies
//! impulses. [`SimplePhysics`] is an in-memory implementation for headless
//! hosts and tests: it stores bodies and joints and answers velocity queries,
//! but does not step.

use attach_types::{BodyId, JointId, MassProperties, Point3, Pose, RigidBodyState, Vector3};
use hashbrown::HashMap;
use tracing::debug;

/// Rigid bodies, joints and impulses, provided by the host simulation.
pub trait PhysicsService {
    /// Create a dynamic body.
    fn create_body(&mut self, state: RigidBodyState, mass: MassProperties) -> BodyId;

    /// Remove a body. Unknown ids are ignored.
    fn remove_body(&mut self, body: BodyId);

    /// Enable or disable simulation of a body.
    ///
    /// Disabled bodies keep their state but do not move or collide; welded
    /// members are disabled while their group body stands in for them.
    fn set_body_enabled(&mut self, body: BodyId, enabled: bool);

    /// Current state of a body.
    fn body_state(&self, body: BodyId) -> Option<RigidBodyState>;

    /// Overwrite the state of a body.
    fn set_body_state(&mut self, body: BodyId, state: RigidBodyState);

    /// Current mass properties of a body.
    fn mass_properties(&self, body: BodyId) -> Option<MassProperties>;

    /// Replace the mass properties of a body.
    fn set_mass_properties(&mut self, body: BodyId, mass: MassProperties);

    /// Velocity of a world-space point rigidly attached to a body.
    fn point_velocity(&self, body: BodyId, point: &Point3<f64>) -> Option<Vector3<f64>> {
        let state = self.body_state(body)?;
        let mass = self.mass_properties(body)?;
        let center = mass.world_center(&state.pose);
        Some(state.twist.velocity_at_point(&(point - center)))
    }

    /// Apply an impulse at a world-space point.
    fn apply_impulse_at_point(&mut self, body: BodyId, impulse: Vector3<f64>, point: Point3<f64>);

    /// Create a fixed joint between two bodies at a world-space anchor frame.
    fn create_joint(&mut self, parent: BodyId, child: BodyId, anchor: Pose) -> JointId;

    /// Remove a joint. Unknown ids are ignored.
    fn remove_joint(&mut self, joint: JointId);
}

/// A body stored by [`SimplePhysics`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimBody {
    /// Pose and velocity.
    pub state: RigidBodyState,
    /// Mass properties.
    pub mass: MassProperties,
    /// Whether the body takes part in simulation.
    pub enabled: bool,
}

/// A joint stored by [`SimplePhysics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimJoint {
    /// Parent body.
    pub parent: BodyId,
    /// Child body.
    pub child: BodyId,
    /// Anchor frame in world coordinates at creation.
    pub anchor: Pose,
}

/// In-memory physics service.
///
/// Ids are allocated monotonically and never reused, so a stale handle
/// always misses instead of aliasing a newer body.
///
/// # Example
///
/// ```
/// use attach_core::{PhysicsService, SimplePhysics};
/// use attach_types::{MassProperties, Point3, Pose, RigidBodyState, Vector3};
///
/// let mut physics = SimplePhysics::new();
/// let body = physics.create_body(
///     RigidBodyState::at_rest(Pose::identity()),
///     MassProperties::point_mass(2.0),
/// );
///
/// physics.apply_impulse_at_point(body, Vector3::new(4.0, 0.0, 0.0), Point3::origin());
/// let v = physics.point_velocity(body, &Point3::origin()).unwrap_or_default();
/// assert!((v.x - 2.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimplePhysics {
    bodies: HashMap<BodyId, SimBody>,
    joints: HashMap<JointId, SimJoint>,
    next_body_id: u64,
    next_joint_id: u64,
}

impl SimplePhysics {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            joints: HashMap::new(),
            next_body_id: 1,
            next_joint_id: 1,
        }
    }

    /// Get a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&SimBody> {
        self.bodies.get(&id)
    }

    /// Get a joint.
    #[must_use]
    pub fn joint(&self, id: JointId) -> Option<&SimJoint> {
        self.joints.get(&id)
    }

    /// Number of live bodies, enabled or not.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of enabled bodies.
    #[must_use]
    pub fn enabled_body_count(&self) -> usize {
        self.bodies.values().filter(|b| b.enabled).count()
    }

    /// Number of live joints.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Iterate over joints.
    pub fn joints(&self) -> impl Iterator<Item = (JointId, &SimJoint)> {
        self.joints.iter().map(|(id, joint)| (*id, joint))
    }
}

impl PhysicsService for SimplePhysics {
    fn create_body(&mut self, state: RigidBodyState, mass: MassProperties) -> BodyId {
        let id = BodyId::new(self.next_body_id);
        self.next_body_id += 1;
        self.bodies.insert(
            id,
            SimBody {
                state,
                mass,
                enabled: true,
            },
        );
        debug!(body = %id, mass = mass.mass, "Created body");
        id
    }

    fn remove_body(&mut self, body: BodyId) {
        if self.bodies.remove(&body).is_some() {
            self.joints
                .retain(|_, joint| joint.parent != body && joint.child != body);
            debug!(body = %body, "Removed body");
        }
    }

    fn set_body_enabled(&mut self, body: BodyId, enabled: bool) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.enabled = enabled;
        }
    }

    fn body_state(&self, body: BodyId) -> Option<RigidBodyState> {
        self.bodies.get(&body).map(|b| b.state)
    }

    fn set_body_state(&mut self, body: BodyId, state: RigidBodyState) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.state = state;
        }
    }

    fn mass_properties(&self, body: BodyId) -> Option<MassProperties> {
        self.bodies.get(&body).map(|b| b.mass)
    }

    fn set_mass_properties(&mut self, body: BodyId, mass: MassProperties) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.mass = mass;
        }
    }

    fn apply_impulse_at_point(&mut self, body: BodyId, impulse: Vector3<f64>, point: Point3<f64>) {
        let Some(b) = self.bodies.get_mut(&body) else {
            return;
        };
        let inv_mass = b.mass.inverse_mass();
        if inv_mass == 0.0 {
            return;
        }
        b.state.twist.linear += impulse * inv_mass;

        let center = b.mass.world_center(&b.state.pose);
        let angular_impulse = (point - center).cross(&impulse);
        if let Some(inv_inertia) = b.mass.world_inertia(&b.state.pose).try_inverse() {
            b.state.twist.angular += inv_inertia * angular_impulse;
        }
    }

    fn create_joint(&mut self, parent: BodyId, child: BodyId, anchor: Pose) -> JointId {
        let id = JointId::new(self.next_joint_id);
        self.next_joint_id += 1;
        self.joints.insert(
            id,
            SimJoint {
                parent,
                child,
                anchor,
            },
        );
        debug!(joint = %id, parent = %parent, child = %child, "Created joint");
        id
    }

    fn remove_joint(&mut self, joint: JointId) {
        if self.joints.remove(&joint).is_some() {
            debug!(joint = %joint, "Removed joint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use attach_types::Twist;

    #[test]
    fn test_ids_not_reused() {
        let mut physics = SimplePhysics::new();
        let a = physics.create_body(RigidBodyState::default(), MassProperties::default());
        physics.remove_body(a);
        let b = physics.create_body(RigidBodyState::default(), MassProperties::default());
        assert_ne!(a, b);
        assert!(physics.body(a).is_none());
        assert_eq!(physics.body_count(), 1);
    }

    #[test]
    fn test_point_velocity_with_spin() {
        let mut physics = SimplePhysics::new();
        let body = physics.create_body(
            RigidBodyState::new(Pose::identity(), Twist::new(Vector3::zeros(), Vector3::z())),
            MassProperties::sphere(1.0, 1.0),
        );
        let v = physics
            .point_velocity(body, &Point3::new(1.0, 0.0, 0.0))
            .unwrap_or_default();
        assert_relative_eq!(v, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_off_center_impulse_spins() {
        let mut physics = SimplePhysics::new();
        let body = physics.create_body(
            RigidBodyState::at_rest(Pose::identity()),
            MassProperties::sphere(1.0, 1.0),
        );
        physics.apply_impulse_at_point(body, Vector3::y(), Point3::new(1.0, 0.0, 0.0));

        let state = physics.body_state(body).unwrap_or_default();
        assert_relative_eq!(state.twist.linear, Vector3::y(), epsilon = 1e-12);
        // r × J = (1,0,0) × (0,1,0) = (0,0,1); I = 0.4
        assert_relative_eq!(state.twist.angular.z, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_removing_body_drops_its_joints() {
        let mut physics = SimplePhysics::new();
        let a = physics.create_body(RigidBodyState::default(), MassProperties::default());
        let b = physics.create_body(RigidBodyState::default(), MassProperties::default());
        let joint = physics.create_joint(a, b, Pose::identity());
        assert_eq!(physics.joint_count(), 1);

        physics.remove_body(b);
        assert!(physics.joint(joint).is_none());
    }

    #[test]
    fn test_disabled_bodies_counted_separately() {
        let mut physics = SimplePhysics::new();
        let a = physics.create_body(RigidBodyState::default(), MassProperties::default());
        physics.create_body(RigidBodyState::default(), MassProperties::default());
        physics.set_body_enabled(a, false);
        assert_eq!(physics.body_count(), 2);
        assert_eq!(physics.enabled_body_count(), 1);
    }
}
