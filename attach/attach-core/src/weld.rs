//! Rigid-body welding.
//!
//! Nodes connected through weld edges share one body owned by a
//! [`WeldGroup`]. Merging combines mass and inertia of every member; a split
//! partitions members into the connected components of the remaining weld
//! edges. Each member keeps a direct reference to the group body, so
//! resolving the body a force acts on is a field read.
//!
//! Member bodies are disabled while grouped, not destroyed, and are
//! re-enabled with the velocity of the group at their center of mass when
//! released. New group bodies take the combined linear and angular momentum
//! of their members.

use attach_types::{
    AttachResult, BodyId, Bond, CombinedMass, MassProperties, NodeId, Point3, Pose,
    RigidBodyState, Twist, Vector3, WeldGroupId,
};
use hashbrown::HashSet;
use tracing::{debug, info};

use crate::graph::AttachmentGraph;
use crate::physics::PhysicsService;

/// A set of nodes sharing one merged rigid body.
#[derive(Debug, Clone, PartialEq)]
pub struct WeldGroup {
    id: WeldGroupId,
    members: Vec<NodeId>,
    body: BodyId,
    combined: CombinedMass,
}

impl WeldGroup {
    /// Handle.
    #[must_use]
    pub fn id(&self) -> WeldGroupId {
        self.id
    }

    /// Members, ascending.
    #[must_use]
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Whether `node` is a member.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.members.binary_search(&node).is_ok()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The shared body.
    #[must_use]
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Total mass.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.combined.mass
    }

    /// Merged center of mass at formation, world coordinates.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        self.combined.center
    }

    /// Merged mass properties at formation.
    #[must_use]
    pub fn combined(&self) -> &CombinedMass {
        &self.combined
    }
}

/// Per-member kinematics sampled before a merge.
struct Sample {
    mass: MassProperties,
    pose: Pose,
    center: Point3<f64>,
    velocity: Vector3<f64>,
    angular: Vector3<f64>,
}

/// Twist of a body at `combined.center` carrying the members' momentum.
fn merged_twist(combined: &CombinedMass, samples: &[Sample]) -> Twist {
    if combined.mass <= 0.0 {
        return Twist::zero();
    }
    let momentum: Vector3<f64> = samples.iter().map(|s| s.velocity * s.mass.mass).sum();
    let linear = momentum / combined.mass;

    let angular_momentum: Vector3<f64> = samples
        .iter()
        .map(|s| {
            let spin = s.mass.world_inertia(&s.pose) * s.angular;
            let orbit = (s.center - combined.center).cross(&(s.velocity * s.mass.mass));
            spin + orbit
        })
        .sum();
    let angular = combined
        .inertia
        .try_inverse()
        .map_or(Vector3::zeros(), |inv| inv * angular_momentum);

    Twist::new(linear, angular)
}

impl AttachmentGraph {
    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a welded group.
    #[must_use]
    pub fn weld_group(&self, id: WeldGroupId) -> Option<&WeldGroup> {
        self.groups.get(&id)
    }

    /// The group a node belongs to.
    #[must_use]
    pub fn weld_group_of(&self, node: NodeId) -> Option<&WeldGroup> {
        self.groups.get(&self.nodes.get(&node)?.group?)
    }

    /// Iterate over welded groups in arbitrary order.
    pub fn weld_groups(&self) -> impl Iterator<Item = &WeldGroup> {
        self.groups.values()
    }

    /// Number of welded groups.
    #[must_use]
    pub fn weld_group_count(&self) -> usize {
        self.groups.len()
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Put two nodes joined by a new weld edge into one group.
    pub(crate) fn weld_attach(
        &mut self,
        a: NodeId,
        b: NodeId,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<WeldGroupId> {
        let ga = self.node_ref(a)?.group;
        let gb = self.node_ref(b)?.group;

        let (members, reuse, retired) = match (ga, gb) {
            (None, None) => (vec![a, b], None, None),
            (Some(g), None) => (self.members_plus(g, b), Some(g), None),
            (None, Some(g)) => (self.members_plus(g, a), Some(g), None),
            (Some(x), Some(y)) if x == y => {
                let err = attach_types::AttachError::invariant(format!(
                    "{a} and {b} are already welded in {x}"
                ));
                return Err(self.violation(Some(a), err));
            }
            (Some(x), Some(y)) => {
                let len = |g| self.groups.get(&g).map_or(0, WeldGroup::len);
                let rank = |g| (len(g), std::cmp::Reverse(g));
                let (survivor, loser) = if rank(y) > rank(x) {
                    (y, x)
                } else {
                    (x, y)
                };
                let mut members = self.members_plus(survivor, a);
                if let Some(group) = self.groups.get(&loser) {
                    members.extend(group.members.iter().copied());
                }
                members.push(b);
                (members, Some(survivor), Some(loser))
            }
        };

        let group = self.form_group(members.clone(), reuse, physics)?;
        if let Some(loser) = retired
            && let Some(old) = self.groups.remove(&loser)
        {
            physics.remove_body(old.body);
            debug!(group = %loser, into = %group, "Retired merged group");
        }
        self.refresh_joints(&members, physics)?;

        if let Some(g) = self.groups.get(&group) {
            info!(group = %group, members = g.len(), mass = g.mass(), "Weld group merged");
        }
        Ok(group)
    }

    fn members_plus(&self, group: WeldGroupId, node: NodeId) -> Vec<NodeId> {
        let mut members = self
            .groups
            .get(&group)
            .map(|g| g.members.clone())
            .unwrap_or_default();
        members.push(node);
        members
    }

    /// Create or rebuild a group over `members`.
    ///
    /// With `reuse`, the existing group keeps its id and body and has its
    /// mass and state overwritten. All member state is sampled before any
    /// body is written.
    fn form_group(
        &mut self,
        mut members: Vec<NodeId>,
        reuse: Option<WeldGroupId>,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<WeldGroupId> {
        members.sort_unstable();
        members.dedup();

        let mut samples = Vec::with_capacity(members.len());
        for &member in &members {
            let node = self.node_ref(member)?;
            let pose = self.pose_in(node, &*physics);
            let center = node.mass.world_center(&pose);
            let (velocity, angular) = node
                .effective_body
                .and_then(|body| {
                    let v = physics.point_velocity(body, &center)?;
                    let w = physics.body_state(body)?.twist.angular;
                    Some((v, w))
                })
                .unwrap_or_default();
            samples.push(Sample {
                mass: node.mass,
                pose,
                center,
                velocity,
                angular,
            });
        }

        let combined = CombinedMass::from_parts(samples.iter().map(|s| (s.mass, s.pose)));
        let state = RigidBodyState::new(combined.body_pose(), merged_twist(&combined, &samples));
        let body_pose = state.pose;

        let reused = reuse.and_then(|id| self.groups.get(&id).map(|g| (id, g.body)));
        let (id, body) = match reused {
            Some((id, body)) => {
                physics.set_mass_properties(body, combined.body_mass());
                physics.set_body_state(body, state);
                (id, body)
            }
            None => {
                let id = WeldGroupId::new(self.next_group_id);
                self.next_group_id += 1;
                (id, physics.create_body(state, combined.body_mass()))
            }
        };

        for (member, sample) in members.iter().zip(&samples) {
            let node = self.node_mut(*member)?;
            if let Some(own) = node.body
                && own != body
            {
                physics.set_body_enabled(own, false);
            }
            node.group = Some(id);
            node.effective_body = Some(body);
            node.body_offset = sample.pose.relative_to(&body_pose);
            node.pose = sample.pose;
        }

        debug!(group = %id, members = members.len(), mass = combined.mass, "Formed weld group");
        self.groups.insert(
            id,
            WeldGroup {
                id,
                members,
                body,
                combined,
            },
        );
        Ok(id)
    }

    // ========================================================================
    // Split
    // ========================================================================

    /// Connected components of `members` under weld edges, largest first,
    /// ties broken by smallest node id. Each component is sorted.
    fn weld_components(&self, members: &[NodeId]) -> Vec<Vec<NodeId>> {
        let in_group: HashSet<NodeId> = members.iter().copied().collect();
        let mut visited: HashSet<NodeId> = HashSet::with_capacity(members.len());
        let mut components = Vec::new();

        for &start in members {
            if !visited.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut stack = vec![start];
            while let Some(current) = stack.pop() {
                for next in self.weld_neighbours(current) {
                    if in_group.contains(&next) && visited.insert(next) {
                        component.push(next);
                        stack.push(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }

        components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
        components
    }

    fn weld_neighbours(&self, node: NodeId) -> Vec<NodeId> {
        let Some(n) = self.nodes.get(&node) else {
            return Vec::new();
        };
        n.parent
            .iter()
            .chain(n.children.iter())
            .filter(|edge| {
                n.connector(edge.local.index)
                    .is_some_and(|c| c.attachment_info(edge.remote).bond.is_weld())
            })
            .map(|edge| edge.remote_node())
            .collect()
    }

    /// Recompute a group after weld edges were removed.
    ///
    /// The largest component keeps the group id and body; other components
    /// of two or more nodes get new groups; single nodes are released to
    /// their own bodies. Returns the groups that exist afterwards.
    pub(crate) fn split_group(
        &mut self,
        group: WeldGroupId,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<Vec<WeldGroupId>> {
        let Some((members, old_body)) = self.groups.get(&group).map(|g| (g.members.clone(), g.body))
        else {
            return Ok(Vec::new());
        };

        let components = self.weld_components(&members);
        if components.len() <= 1 && members.len() >= 2 {
            return Ok(vec![group]);
        }

        let mut result = Vec::with_capacity(components.len());
        let Some((survivor, rest)) = components.split_first() else {
            return Ok(result);
        };

        for component in rest {
            if component.len() >= 2 {
                result.push(self.form_group(component.clone(), None, physics)?);
            } else {
                self.release_node(component[0], physics)?;
            }
        }

        if survivor.len() >= 2 {
            self.form_group(survivor.clone(), Some(group), physics)?;
            result.insert(0, group);
        } else {
            self.release_node(survivor[0], physics)?;
            self.groups.remove(&group);
            physics.remove_body(old_body);
        }

        self.refresh_joints(&members, physics)?;
        info!(
            group = %group,
            components = components.len(),
            groups = result.len(),
            "Weld group split"
        );
        Ok(result)
    }

    /// Detach a node from its group body and hand it back its own body,
    /// moving with the group's velocity at the node's center of mass.
    fn release_node(&mut self, node: NodeId, physics: &mut dyn PhysicsService) -> AttachResult<()> {
        let n = self.node_ref(node)?;
        let pose = self.pose_in(n, &*physics);
        let center = n.mass.world_center(&pose);
        let twist = n
            .effective_body
            .and_then(|body| {
                let linear = physics.point_velocity(body, &center)?;
                let angular = physics.body_state(body)?.twist.angular;
                Some(Twist::new(linear, angular))
            })
            .unwrap_or_default();

        let n = self.node_mut(node)?;
        if let Some(own) = n.body {
            physics.set_body_state(own, RigidBodyState::new(pose, twist));
            physics.set_body_enabled(own, true);
        }
        n.group = None;
        n.effective_body = n.body;
        n.body_offset = Pose::identity();
        n.pose = pose;
        debug!(node = %node, "Released from weld group");
        Ok(())
    }

    // ========================================================================
    // Joints
    // ========================================================================

    /// Re-anchor joint edges touching `nodes` to the current effective
    /// bodies, updating both attachment records.
    pub(crate) fn refresh_joints(
        &mut self,
        nodes: &[NodeId],
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<()> {
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        for &node in nodes {
            let Some(n) = self.nodes.get(&node) else {
                continue;
            };
            for edge in n.parent.iter().chain(n.children.iter()) {
                let info = self.connector_ref(edge.local)?.attachment_info(edge.remote);
                if let Some(joint) = info.bond.joint()
                    && seen.insert(joint)
                {
                    edges.push((info.child_connector(), info.parent_connector(), joint));
                }
            }
        }

        for (child, parent, joint) in edges {
            physics.remove_joint(joint);
            let child_body = self.node_ref(child.node)?.effective_body;
            let parent_body = self.node_ref(parent.node)?.effective_body;
            let bond = match (parent_body, child_body) {
                (Some(p), Some(c)) if p != c => {
                    let anchor = self.connector_pose(parent, &*physics)?;
                    Bond::Joint(physics.create_joint(p, c, anchor))
                }
                _ => Bond::Logical,
            };

            let child_info = self.connector_ref(child)?.attachment_info(parent).with_bond(bond);
            let parent_info = self.connector_ref(parent)?.attachment_info(child).with_bond(bond);
            self.connector_mut(child)?.replace_attachment(child_info)?;
            self.connector_mut(parent)?.replace_attachment(parent_info)?;
            debug!(child = %child, parent = %parent, bond = ?bond, "Refreshed joint");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(mass: f64, x: f64, vy: f64) -> Sample {
        let props = MassProperties::point_mass(mass);
        let pose = Pose::from_position(Point3::new(x, 0.0, 0.0));
        Sample {
            mass: props,
            pose,
            center: props.world_center(&pose),
            velocity: Vector3::new(0.0, vy, 0.0),
            angular: Vector3::zeros(),
        }
    }

    #[test]
    fn test_merged_twist_conserves_momentum() {
        let samples = [sample(1.0, -1.0, 2.0), sample(3.0, 1.0, 0.0)];
        let combined = CombinedMass::from_parts(samples.iter().map(|s| (s.mass, s.pose)));
        let twist = merged_twist(&combined, &samples);

        assert_relative_eq!(twist.linear.y * combined.mass, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_merged_twist_recovers_rigid_spin() {
        // Two points on one body spinning about +Z through the origin.
        let omega = 0.5;
        let mut a = sample(2.0, -1.0, -omega);
        let mut b = sample(2.0, 1.0, omega);
        a.angular = Vector3::z() * omega;
        b.angular = Vector3::z() * omega;
        // Point masses have no inertia of their own, so add a little.
        a.mass = MassProperties::sphere(2.0, 0.1);
        b.mass = MassProperties::sphere(2.0, 0.1);

        let samples = [a, b];
        let combined = CombinedMass::from_parts(samples.iter().map(|s| (s.mass, s.pose)));
        let twist = merged_twist(&combined, &samples);

        assert_relative_eq!(twist.linear, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(twist.angular, Vector3::z() * omega, epsilon = 1e-9);
    }

    #[test]
    fn test_merged_twist_massless() {
        let samples = [sample(0.0, 0.0, 3.0)];
        let combined = CombinedMass::from_parts(samples.iter().map(|s| (s.mass, s.pose)));
        assert_eq!(merged_twist(&combined, &samples), Twist::zero());
    }
}
