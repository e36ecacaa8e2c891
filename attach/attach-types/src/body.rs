//! Pose, velocity and mass types shared with the physics service.
//!
//! Welding needs to combine the mass properties of many parts into one body
//! and split them again; [`CombinedMass`] does the bookkeeping in world
//! coordinates.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position and orientation in 3D space.
///
/// # Example
///
/// ```
/// use attach_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position.
    pub position: Point3<f64>,
    /// Orientation.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position only.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Local +Z in world coordinates.
    ///
    /// Connector frames point +Z away from their owning node.
    #[must_use]
    pub fn up(&self) -> Vector3<f64> {
        self.transform_vector(&Vector3::z())
    }

    /// Inverse pose.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            position: Point3::from(-(inv_rotation * self.position.coords)),
            rotation: inv_rotation,
        }
    }

    /// Compose two poses: `self * other`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// This pose expressed in the frame of `frame`.
    #[must_use]
    pub fn relative_to(&self, frame: &Self) -> Self {
        frame.inverse().compose(self)
    }

    /// Check for `NaN` or `Inf`.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity.
///
/// `linear` is the velocity of the body's center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity in world coordinates (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Twist with the given linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// At rest.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Velocity at a point offset from the center of mass.
    ///
    /// `v_point` = `v_linear` + omega × r
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }
}

/// Pose plus twist of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBodyState {
    /// Pose of the body origin.
    pub pose: Pose,
    /// Velocity of the center of mass.
    pub twist: Twist,
}

impl RigidBodyState {
    /// State from pose and twist.
    #[must_use]
    pub const fn new(pose: Pose, twist: Twist) -> Self {
        Self { pose, twist }
    }

    /// State at rest at the given pose.
    #[must_use]
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            pose,
            twist: Twist::zero(),
        }
    }
}

/// Mass, center of mass and inertia of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass in kg.
    pub mass: f64,
    /// Center of mass offset from the body origin, local coordinates.
    pub center_of_mass: Vector3<f64>,
    /// Inertia tensor about the center of mass, local coordinates (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self::point_mass(1.0)
    }
}

impl MassProperties {
    /// Mass properties with explicit values.
    #[must_use]
    pub const fn new(mass: f64, center_of_mass: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    /// Point mass at the origin.
    #[must_use]
    pub fn point_mass(mass: f64) -> Self {
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::zeros(),
        }
    }

    /// Uniform solid sphere: I = (2/5) m r².
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(i, i, i)),
        }
    }

    /// Set the center of mass offset (builder pattern).
    #[must_use]
    pub fn with_center_of_mass(mut self, offset: Vector3<f64>) -> Self {
        self.center_of_mass = offset;
        self
    }

    /// Inverse mass, 0 for non-positive or infinite mass.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.mass <= 0.0 || self.mass.is_infinite() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Center of mass in world coordinates for a body at `pose`.
    #[must_use]
    pub fn world_center(&self, pose: &Pose) -> Point3<f64> {
        pose.transform_point(&Point3::from(self.center_of_mass))
    }

    /// Inertia about the center of mass, rotated into world axes.
    #[must_use]
    pub fn world_inertia(&self, pose: &Pose) -> Matrix3<f64> {
        let r = pose.rotation.to_rotation_matrix();
        r.matrix() * self.inertia * r.matrix().transpose()
    }

    /// Validate that the properties are physically meaningful.
    pub fn validate(&self) -> crate::AttachResult<()> {
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(crate::AttachError::invalid_mass(format!(
                "mass must be finite and non-negative, got {}",
                self.mass
            )));
        }
        if !self.center_of_mass.iter().all(|x| x.is_finite()) {
            return Err(crate::AttachError::invalid_mass(
                "center of mass must be finite",
            ));
        }
        let eigenvalues = self.inertia.symmetric_eigenvalues();
        if eigenvalues.iter().any(|&e| e < -1e-10) {
            return Err(crate::AttachError::invalid_mass(
                "inertia tensor must be positive semi-definite",
            ));
        }
        Ok(())
    }
}

/// Mass properties of several bodies merged into one, in world coordinates.
///
/// The merged center of mass is the mass-weighted mean of member centers and
/// the merged inertia is the sum of member inertias shifted to that center
/// with the parallel axis theorem.
///
/// # Example
///
/// ```
/// use attach_types::{CombinedMass, MassProperties, Pose};
/// use nalgebra::Point3;
///
/// let parts = [
///     (MassProperties::point_mass(1.0), Pose::from_position(Point3::new(-1.0, 0.0, 0.0))),
///     (MassProperties::point_mass(3.0), Pose::from_position(Point3::new(1.0, 0.0, 0.0))),
/// ];
/// let combined = CombinedMass::from_parts(parts);
///
/// assert_eq!(combined.mass, 4.0);
/// assert!((combined.center.x - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedMass {
    /// Sum of member masses.
    pub mass: f64,
    /// Merged center of mass, world coordinates.
    pub center: Point3<f64>,
    /// Merged inertia about `center`, world axes.
    pub inertia: Matrix3<f64>,
}

impl CombinedMass {
    /// Combine `(mass properties, body pose)` pairs.
    ///
    /// With zero total mass the center falls back to the unweighted mean of
    /// member centers.
    #[must_use]
    pub fn from_parts(parts: impl IntoIterator<Item = (MassProperties, Pose)>) -> Self {
        let members: Vec<(f64, Point3<f64>, Matrix3<f64>)> = parts
            .into_iter()
            .map(|(props, pose)| {
                (
                    props.mass,
                    props.world_center(&pose),
                    props.world_inertia(&pose),
                )
            })
            .collect();

        let mass: f64 = members.iter().map(|(m, _, _)| m).sum();
        let center = if members.is_empty() {
            Point3::origin()
        } else if mass > 0.0 {
            let weighted: Vector3<f64> = members.iter().map(|(m, c, _)| c.coords * *m).sum();
            Point3::from(weighted / mass)
        } else {
            let sum: Vector3<f64> = members.iter().map(|(_, c, _)| c.coords).sum();
            Point3::from(sum / members.len() as f64)
        };

        let inertia = members
            .iter()
            .fold(Matrix3::zeros(), |acc, (m, c, local)| {
                let d = *c - center;
                let shift = (Matrix3::identity() * d.norm_squared() - d * d.transpose()) * *m;
                acc + *local + shift
            });

        Self {
            mass,
            center,
            inertia,
        }
    }

    /// Pose of a body placed at the merged center with world-aligned axes.
    #[must_use]
    pub fn body_pose(&self) -> Pose {
        Pose::from_position(self.center)
    }

    /// Mass properties for a body at [`Self::body_pose`].
    #[must_use]
    pub fn body_mass(&self) -> MassProperties {
        MassProperties::new(self.mass, Vector3::zeros(), self.inertia)
    }
}
