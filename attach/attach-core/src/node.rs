//! Nodes: part instances living in the graph arena.

use attach_types::{
    BodyId, ConnectorId, LifecycleMode, MassProperties, NodeId, Pose, SymmetryGroupId,
    WeldGroupId,
};

use crate::connector::{Connector, ConnectorSpec};

/// One tree edge seen from a node.
///
/// `local` is the connector on the node holding the edge, `remote` the
/// connector on the other node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Connector on this node.
    pub local: ConnectorId,
    /// Connector on the other node.
    pub remote: ConnectorId,
}

impl Edge {
    /// Node on the other side.
    #[must_use]
    pub const fn remote_node(&self) -> NodeId {
        self.remote.node
    }
}

/// Where a node's rigid body comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodySource {
    /// Ask the physics service for a new body at the node pose.
    #[default]
    Create,
    /// Use a body the host already created.
    Existing(BodyId),
    /// Purely logical node without a body.
    None,
}

/// Description of a node to insert into the graph.
///
/// # Example
///
/// ```
/// use attach_core::{ConnectorSpec, NodeSpec};
/// use attach_types::{Layer, MassProperties};
///
/// let spec = NodeSpec::new("tank")
///     .with_mass(MassProperties::sphere(2.0, 0.5))
///     .with_connector(ConnectorSpec::port(Layer::wrapping(0)))
///     .with_connector(ConnectorSpec::surface(Layer::wrapping(0), 4));
/// assert_eq!(spec.connectors.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// Human-readable name for diagnostics.
    pub name: String,
    /// World pose.
    pub pose: Pose,
    /// Mass properties in the node frame.
    pub mass: MassProperties,
    /// Connectors, in index order.
    pub connectors: Vec<ConnectorSpec>,
    /// Rigid body source.
    pub body: BodySource,
    /// Whether the node may merge its body with welded neighbours.
    pub weld: bool,
    /// Initial lifecycle mode.
    pub mode: LifecycleMode,
}

impl NodeSpec {
    /// Create a description with defaults: identity pose, unit point mass,
    /// a created body, welding enabled.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pose: Pose::identity(),
            mass: MassProperties::default(),
            connectors: Vec::new(),
            body: BodySource::Create,
            weld: true,
            mode: LifecycleMode::FreeConnections,
        }
    }

    /// Set the world pose (builder pattern).
    #[must_use]
    pub fn at(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// Set mass properties (builder pattern).
    #[must_use]
    pub fn with_mass(mut self, mass: MassProperties) -> Self {
        self.mass = mass;
        self
    }

    /// Append a connector (builder pattern).
    #[must_use]
    pub fn with_connector(mut self, connector: ConnectorSpec) -> Self {
        self.connectors.push(connector);
        self
    }

    /// Set the body source (builder pattern).
    #[must_use]
    pub fn with_body(mut self, body: BodySource) -> Self {
        self.body = body;
        self
    }

    /// Disable welding (builder pattern).
    #[must_use]
    pub fn without_weld(mut self) -> Self {
        self.weld = false;
        self
    }

    /// Set the initial lifecycle mode (builder pattern).
    #[must_use]
    pub fn with_mode(mut self, mode: LifecycleMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A part instance.
///
/// Nodes own their connectors. Relations to other nodes are stored as
/// connector handles, never as references.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) mode: LifecycleMode,
    pub(crate) pose: Pose,
    pub(crate) mass: MassProperties,
    pub(crate) connectors: Vec<Connector>,
    pub(crate) parent: Option<Edge>,
    pub(crate) children: Vec<Edge>,
    pub(crate) symmetry: Option<SymmetryGroupId>,
    pub(crate) body: Option<BodyId>,
    pub(crate) weld: bool,
    pub(crate) group: Option<WeldGroupId>,
    pub(crate) effective_body: Option<BodyId>,
    pub(crate) body_offset: Pose,
}

impl Node {
    /// Handle.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Name given at insertion.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle mode.
    #[must_use]
    pub fn mode(&self) -> LifecycleMode {
        self.mode
    }

    /// World pose as of the last commit, detach or [`sync_poses`].
    ///
    /// [`sync_poses`]: crate::AttachmentGraph::sync_poses
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Mass properties in the node frame.
    #[must_use]
    pub fn mass(&self) -> &MassProperties {
        &self.mass
    }

    /// Connectors in index order.
    #[must_use]
    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    /// Connector by index.
    #[must_use]
    pub fn connector(&self, index: usize) -> Option<&Connector> {
        self.connectors.get(index)
    }

    /// Parent edge, if attached.
    #[must_use]
    pub fn parent_edge(&self) -> Option<Edge> {
        self.parent
    }

    /// Child edges in attachment order.
    #[must_use]
    pub fn child_edges(&self) -> &[Edge] {
        &self.children
    }

    /// Symmetry group membership.
    #[must_use]
    pub fn symmetry_group(&self) -> Option<SymmetryGroupId> {
        self.symmetry
    }

    /// The node's own rigid body.
    #[must_use]
    pub fn own_body(&self) -> Option<BodyId> {
        self.body
    }

    /// Whether the node merges its body with welded neighbours.
    #[must_use]
    pub fn weld_enabled(&self) -> bool {
        self.weld
    }

    /// Welded group membership.
    #[must_use]
    pub fn weld_group(&self) -> Option<WeldGroupId> {
        self.group
    }

    /// The body forces on this node act on: the group body when welded,
    /// the own body otherwise.
    #[must_use]
    pub fn effective_body(&self) -> Option<BodyId> {
        self.effective_body
    }

    /// Node frame relative to its effective body.
    #[must_use]
    pub fn body_offset(&self) -> Pose {
        self.body_offset
    }

    /// World frame of a connector at the stored node pose.
    #[must_use]
    pub fn connector_frame(&self, index: usize) -> Option<Pose> {
        self.connectors
            .get(index)
            .map(|c| self.pose.compose(&c.local_pose()))
    }

    pub(crate) fn connector_mut(&mut self, index: usize) -> Option<&mut Connector> {
        self.connectors.get_mut(index)
    }

    pub(crate) fn can_weld(&self) -> bool {
        self.weld && self.body.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use attach_types::{Layer, LayerOptions, Point3, Vector3};

    fn node_with_connector(offset: Vector3<f64>) -> Node {
        let id = NodeId::new(1);
        let spec = ConnectorSpec::port(Layer::wrapping(0)).at(Pose::from_position(Point3::from(offset)));
        Node {
            id,
            name: "strut".to_string(),
            mode: LifecycleMode::default(),
            pose: Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
            mass: MassProperties::default(),
            connectors: vec![Connector::from_spec(
                ConnectorId::new(id, 0),
                &spec,
                LayerOptions::default(),
            )],
            parent: None,
            children: Vec::new(),
            symmetry: None,
            body: None,
            weld: true,
            group: None,
            effective_body: None,
            body_offset: Pose::identity(),
        }
    }

    #[test]
    fn test_connector_frame() {
        let node = node_with_connector(Vector3::new(0.0, 0.0, 2.0));
        let frame = node.connector_frame(0).unwrap();
        assert_relative_eq!(frame.position, Point3::new(1.0, 0.0, 2.0), epsilon = 1e-12);
        assert!(node.connector_frame(1).is_none());
    }

    #[test]
    fn test_weld_requires_body() {
        let mut node = node_with_connector(Vector3::zeros());
        assert!(!node.can_weld());
        node.body = Some(BodyId::new(4));
        assert!(node.can_weld());
        node.weld = false;
        assert!(!node.can_weld());
    }

    #[test]
    fn test_spec_builder() {
        let spec = NodeSpec::new("strut")
            .with_body(BodySource::None)
            .without_weld()
            .with_mode(LifecycleMode::Inactive);
        assert_eq!(spec.name, "strut");
        assert_eq!(spec.body, BodySource::None);
        assert!(!spec.weld);
        assert_eq!(spec.mode, LifecycleMode::Inactive);
    }
}
