//! Symmetry groups and symmetric placement.
//!
//! A symmetry group is a fixed-size ring of sibling nodes. When one member
//! attaches or detaches, the same operation is replayed on every other
//! member. Replays are independent: a failing sibling is reported and
//! the others are kept.

use std::f64::consts::TAU;

use attach_types::{
    AttachError, AttachResult, AttachmentInfo, ConnectorId, Matrix3, NodeId, NotAcceptingReason,
    Point3, Pose, Rejection, SymmetryGroupId, UnitQuaternion, Vector3,
};
use hashbrown::HashMap;
use nalgebra::{Rotation3, Unit};
use tracing::{debug, info};

use crate::graph::AttachmentGraph;

/// How symmetric placements are generated around a connector.
///
/// Axes and normals are given in the connector frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymmetryPlan {
    /// Copies rotated evenly around an axis through the connector.
    Radial {
        /// Rotation axis.
        axis: Vector3<f64>,
    },
    /// One reflected copy across a plane through the connector.
    Mirror {
        /// Plane normal.
        normal: Vector3<f64>,
    },
}

impl SymmetryPlan {
    /// Radial symmetry around the connector's +Z.
    #[must_use]
    pub fn radial() -> Self {
        Self::Radial {
            axis: Vector3::z(),
        }
    }

    /// Mirror symmetry across the connector's YZ plane.
    #[must_use]
    pub fn mirror() -> Self {
        Self::Mirror {
            normal: Vector3::x(),
        }
    }

    /// Largest number of placements (original included) the plan produces.
    #[must_use]
    pub const fn max_count(self) -> Option<usize> {
        match self {
            Self::Radial { .. } => None,
            Self::Mirror { .. } => Some(2),
        }
    }
}

/// A ring of symmetric sibling nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetryGroup {
    id: SymmetryGroupId,
    members: Vec<NodeId>,
}

impl SymmetryGroup {
    /// Handle.
    #[must_use]
    pub fn id(&self) -> SymmetryGroupId {
        self.id
    }

    /// Members in declaration order.
    #[must_use]
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Group size, fixed at declaration.
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Position of a node in the ring.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.members.iter().position(|&m| m == node)
    }

    /// Member `offset` places after `node` around the ring.
    #[must_use]
    pub fn member_after(&self, node: NodeId, offset: usize) -> Option<NodeId> {
        let start = self.position(node)?;
        self.members.get((start + offset) % self.members.len()).copied()
    }
}

/// One sibling whose replay failed.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryFailure {
    /// Sibling node.
    pub node: NodeId,
    /// Connector the replay would have attached from, if any.
    pub initiator: Option<ConnectorId>,
    /// Connector the replay would have attached to, if any.
    pub target: Option<ConnectorId>,
    /// Why it failed.
    pub error: AttachError,
}

/// Outcome of replaying an operation on symmetry siblings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymmetryReport {
    /// Sibling attachments committed, from the initiator's side.
    pub attached: Vec<AttachmentInfo>,
    /// Sibling nodes whose parent edge was removed.
    pub detached: Vec<NodeId>,
    /// Siblings whose replay failed; nothing was changed for them.
    pub failures: Vec<SymmetryFailure>,
}

impl SymmetryReport {
    /// Number of successful replays.
    #[must_use]
    pub fn replayed(&self) -> usize {
        self.attached.len() + self.detached.len()
    }

    /// Whether every replay succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reflection of `p` across the plane through `origin` with unit `normal`.
fn reflect_point(p: &Point3<f64>, origin: &Point3<f64>, normal: &Vector3<f64>) -> Point3<f64> {
    *p - *normal * (2.0 * (*p - *origin).dot(normal))
}

/// Mirror image of an orientation: `M R M` with `M` the plane reflection.
///
/// The result is a proper rotation; a mirrored part keeps its handedness
/// and is flipped across the plane.
fn reflect_rotation(rotation: &UnitQuaternion<f64>, normal: &Vector3<f64>) -> UnitQuaternion<f64> {
    let m = Matrix3::identity() - *normal * normal.transpose() * 2.0;
    let r = rotation.to_rotation_matrix().into_inner();
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m * r * m))
}

impl AttachmentGraph {
    // ========================================================================
    // Groups
    // ========================================================================

    /// Declare a symmetry group over `nodes`, in ring order.
    ///
    /// Needs at least two distinct live nodes, none already in a group.
    pub fn declare_symmetry(&mut self, nodes: &[NodeId]) -> AttachResult<SymmetryGroupId> {
        if nodes.len() < 2 {
            return Err(AttachError::invalid_config(
                "symmetry group needs at least two nodes",
            ));
        }
        for (i, &node) in nodes.iter().enumerate() {
            let n = self.node_ref(node)?;
            if let Some(existing) = n.symmetry {
                return Err(AttachError::invalid_config(format!(
                    "{node} already belongs to {existing}"
                )));
            }
            if nodes[..i].contains(&node) {
                return Err(AttachError::invalid_config(format!(
                    "{node} listed twice in symmetry group"
                )));
            }
        }

        let id = SymmetryGroupId::new(self.next_symmetry_id);
        self.next_symmetry_id += 1;
        for &node in nodes {
            self.node_mut(node)?.symmetry = Some(id);
        }
        self.symmetry.insert(
            id,
            SymmetryGroup {
                id,
                members: nodes.to_vec(),
            },
        );
        info!(group = %id, size = nodes.len(), "Declared symmetry group");
        Ok(id)
    }

    /// Dissolve a symmetry group. Returns false if it did not exist.
    pub fn dissolve_symmetry(&mut self, id: SymmetryGroupId) -> bool {
        let Some(group) = self.symmetry.remove(&id) else {
            return false;
        };
        for node in group.members {
            if let Some(n) = self.nodes.get_mut(&node) {
                n.symmetry = None;
            }
        }
        debug!(group = %id, "Dissolved symmetry group");
        true
    }

    /// Get a symmetry group.
    #[must_use]
    pub fn symmetry_group(&self, id: SymmetryGroupId) -> Option<&SymmetryGroup> {
        self.symmetry.get(&id)
    }

    /// The symmetry group a node belongs to.
    #[must_use]
    pub fn symmetry_group_of(&self, node: NodeId) -> Option<&SymmetryGroup> {
        self.symmetry.get(&self.nodes.get(&node)?.symmetry?)
    }

    /// Other members of a node's group, in ring order starting after it.
    #[must_use]
    pub fn symmetry_siblings(&self, node: NodeId) -> Vec<NodeId> {
        let Some(group) = self.symmetry_group_of(node) else {
            return Vec::new();
        };
        (1..group.size())
            .filter_map(|offset| group.member_after(node, offset))
            .collect()
    }

    /// Number of symmetric copies achievable for `desired`.
    ///
    /// Zero when the node has no group or `desired` differs from the group
    /// size; the group size otherwise.
    #[must_use]
    pub fn achievable_symmetry_count(&self, node: NodeId, desired: usize) -> usize {
        match self.symmetry_group_of(node) {
            Some(group) if group.size() == desired => desired.min(group.size()),
            _ => 0,
        }
    }

    // ========================================================================
    // Placement geometry
    // ========================================================================

    /// World poses for `count` symmetric placements around a connector,
    /// starting with the original.
    ///
    /// Radial plans rotate by `TAU / count` around the connector axis.
    /// Mirror plans yield at most two poses. A connector without a plan
    /// yields only the original.
    pub fn symmetry_positions(
        &self,
        connector: ConnectorId,
        count: usize,
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> AttachResult<Vec<Pose>> {
        let plan = self.connector_ref(connector)?.symmetry();
        let frame = self
            .node_ref(connector.node)?
            .connector_frame(connector.index)
            .ok_or(AttachError::UnknownConnector(connector))?;
        let original = Pose::from_position_rotation(position, rotation);
        if count == 0 {
            return Ok(Vec::new());
        }

        let poses = match plan {
            None => vec![original],
            Some(SymmetryPlan::Radial { axis }) => {
                let Some(axis) = Unit::try_new(frame.rotation * axis, 1e-12) else {
                    return Err(AttachError::invalid_config("radial axis has zero length"));
                };
                (0..count)
                    .map(|k| {
                        let step = UnitQuaternion::from_axis_angle(
                            &axis,
                            TAU * k as f64 / count as f64,
                        );
                        Pose::from_position_rotation(
                            frame.position + step * (position - frame.position),
                            step * rotation,
                        )
                    })
                    .collect()
            }
            Some(SymmetryPlan::Mirror { normal }) => {
                let world = frame.rotation * normal;
                let norm = world.norm();
                if norm < 1e-12 {
                    return Err(AttachError::invalid_config("mirror normal has zero length"));
                }
                let n = world / norm;
                let mirrored = Pose::from_position_rotation(
                    reflect_point(&position, &frame.position, &n),
                    reflect_rotation(&rotation, &n),
                );
                std::iter::once(original)
                    .chain(std::iter::once(mirrored))
                    .take(count)
                    .collect()
            }
        };
        Ok(poses)
    }

    // ========================================================================
    // Replay
    // ========================================================================

    /// Connector pairs a symmetric attach of `initiator` to `target` replays
    /// onto, one per sibling, excluding the original.
    ///
    /// A sibling uses the connector with the initiator's index. If the
    /// target's node is in a symmetry group of the same size, the sibling at
    /// ring offset `k` targets the member at the same offset from the target
    /// node; otherwise every sibling targets the same connector.
    #[must_use]
    pub fn symmetric_pairs(
        &self,
        initiator: ConnectorId,
        target: ConnectorId,
    ) -> Vec<(ConnectorId, ConnectorId)> {
        let Some(group) = self.symmetry_group_of(initiator.node) else {
            return Vec::new();
        };
        let target_group = self
            .symmetry_group_of(target.node)
            .filter(|g| g.size() == group.size() && g.id() != group.id());

        (1..group.size())
            .filter_map(|offset| {
                let sibling = group.member_after(initiator.node, offset)?;
                let sibling_target = match target_group {
                    Some(g) => target.on(g.member_after(target.node, offset)?),
                    None => target,
                };
                Some((initiator.on(sibling), sibling_target))
            })
            .collect()
    }

    /// Check that the original attach and every sibling replay would
    /// succeed, counting slots consumed by earlier pairs on shared targets.
    ///
    /// Returns all pairs, original first. Nothing is mutated.
    pub fn prevalidate_symmetric(
        &self,
        initiator: ConnectorId,
        target: ConnectorId,
    ) -> AttachResult<Vec<(ConnectorId, ConnectorId)>> {
        let mut pairs = vec![(initiator, target)];
        pairs.extend(self.symmetric_pairs(initiator, target));

        let mut planned: HashMap<ConnectorId, usize> = HashMap::new();
        for &(a, b) in &pairs {
            self.check_pair(a, b)?;
            let used = planned.entry(b).or_insert(0);
            let connector = self.connector_ref(b)?;
            if connector.attachments().len() + *used >= connector.capacity() {
                return Err(Rejection::NotAccepting(NotAcceptingReason::Occupied).into());
            }
            *used += 1;
        }
        Ok(pairs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::connector::ConnectorSpec;
    use crate::node::NodeSpec;
    use crate::physics::SimplePhysics;
    use approx::assert_relative_eq;
    use attach_types::Layer;

    fn graph_with(plan: Option<SymmetryPlan>, count: usize) -> (AttachmentGraph, Vec<NodeId>) {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let mut connector = ConnectorSpec::surface(Layer::wrapping(0), 8);
        if let Some(plan) = plan {
            connector = connector.with_symmetry(plan);
        }
        let ids = (0..count)
            .map(|i| {
                graph
                    .add_node(
                        NodeSpec::new(format!("n{i}")).with_connector(connector.clone()),
                        &mut physics,
                    )
                    .unwrap()
            })
            .collect();
        (graph, ids)
    }

    #[test]
    fn test_declare_rules() {
        let (mut graph, ids) = graph_with(None, 4);
        assert!(graph.declare_symmetry(&ids[..1]).is_err());
        assert!(graph.declare_symmetry(&[ids[0], ids[0]]).is_err());

        let group = graph.declare_symmetry(&ids[..3]).unwrap();
        assert!(graph.declare_symmetry(&[ids[2], ids[3]]).is_err());
        assert_eq!(graph.symmetry_group(group).unwrap().size(), 3);

        assert!(graph.dissolve_symmetry(group));
        assert!(graph.symmetry_group_of(ids[0]).is_none());
        assert!(!graph.dissolve_symmetry(group));
    }

    #[test]
    fn test_siblings_in_ring_order() {
        let (mut graph, ids) = graph_with(None, 3);
        graph.declare_symmetry(&ids).unwrap();
        assert_eq!(graph.symmetry_siblings(ids[1]), vec![ids[2], ids[0]]);
    }

    #[test]
    fn test_achievable_count() {
        let (mut graph, ids) = graph_with(None, 4);
        assert_eq!(graph.achievable_symmetry_count(ids[0], 4), 0);

        graph.declare_symmetry(&ids).unwrap();
        assert_eq!(graph.achievable_symmetry_count(ids[0], 4), 4);
        assert_eq!(graph.achievable_symmetry_count(ids[0], 3), 0);
        assert_eq!(graph.achievable_symmetry_count(ids[0], 6), 0);
    }

    #[test]
    fn test_radial_positions() {
        let (graph, ids) = graph_with(Some(SymmetryPlan::radial()), 1);
        let connector = ConnectorId::new(ids[0], 0);
        let poses = graph
            .symmetry_positions(connector, 4, Point3::new(1.0, 0.0, 0.0), UnitQuaternion::identity())
            .unwrap();

        assert_eq!(poses.len(), 4);
        assert_relative_eq!(poses[0].position, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(poses[1].position, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(poses[2].position, Point3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
        // Each copy faces outward the same way the original does.
        assert_relative_eq!(
            poses[1].transform_vector(&Vector3::x()),
            Vector3::y(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_mirror_positions() {
        let (graph, ids) = graph_with(Some(SymmetryPlan::mirror()), 1);
        let connector = ConnectorId::new(ids[0], 0);
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        let poses = graph
            .symmetry_positions(connector, 5, Point3::new(2.0, 1.0, 0.0), rotation)
            .unwrap();

        assert_eq!(poses.len(), 2);
        assert_relative_eq!(poses[1].position, Point3::new(-2.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(
            poses[1].rotation.angle(),
            rotation.angle(),
            epsilon = 1e-12
        );
        // The yaw flips sign across the YZ plane.
        assert_relative_eq!(
            poses[1].rotation.scaled_axis().z,
            -0.3,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_positions_without_plan() {
        let (graph, ids) = graph_with(None, 1);
        let poses = graph
            .symmetry_positions(
                ConnectorId::new(ids[0], 0),
                3,
                Point3::origin(),
                UnitQuaternion::identity(),
            )
            .unwrap();
        assert_eq!(poses.len(), 1);
    }

    #[test]
    fn test_pairs_follow_target_ring() {
        let (mut graph, ids) = graph_with(None, 4);
        graph.declare_symmetry(&ids[..2]).unwrap();
        graph.declare_symmetry(&ids[2..]).unwrap();

        let pairs = graph.symmetric_pairs(ConnectorId::new(ids[0], 0), ConnectorId::new(ids[3], 0));
        assert_eq!(
            pairs,
            vec![(ConnectorId::new(ids[1], 0), ConnectorId::new(ids[2], 0))]
        );
    }

    #[test]
    fn test_pairs_share_plain_target() {
        let (mut graph, ids) = graph_with(None, 4);
        graph.declare_symmetry(&ids[..3]).unwrap();

        let target = ConnectorId::new(ids[3], 0);
        let pairs = graph.symmetric_pairs(ConnectorId::new(ids[0], 0), target);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(_, t)| *t == target));
    }
}
