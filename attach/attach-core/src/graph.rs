//! The attachment graph: node arena, registry, listeners and groups.
//!
//! Attach, detach, welding and symmetry live in their own modules as
//! further `impl AttachmentGraph` blocks.

use attach_types::{
    AttachError, AttachResult, AttachmentInfo, ConnectorId, LayerSettings, LifecycleMode,
    ListenerId, NodeId, Point3, Pose, RigidBodyState, SettingsStore, SymmetryGroupId, Vector3,
    WeldGroupId,
};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

use crate::connector::Connector;
use crate::listener::{AttachmentObserver, LifecycleEvent, ListenerScope, Listeners};
use crate::node::{BodySource, Node, NodeSpec};
use crate::physics::PhysicsService;
use crate::registry::{Candidate, ConnectorRegistry, ProximityQuery};
use crate::symmetry::SymmetryGroup;
use crate::weld::WeldGroup;

/// Category of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A node asked to weld without a body; it was inserted without welding.
    MissingBody,
    /// An operation aborted on an inconsistent graph or a bypassed check.
    InvariantViolation,
}

/// A problem reported to the host instead of being repaired silently.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Node involved, if any.
    pub node: Option<NodeId>,
    /// Category.
    pub kind: DiagnosticKind,
    /// Human-readable description.
    pub message: String,
}

/// The connector attachment graph.
///
/// Nodes live in an arena keyed by [`NodeId`]; every relation between nodes
/// is a connector handle. The graph is single-threaded: each operation runs
/// to completion before the next starts.
///
/// Operations that touch bodies take the physics service as an argument.
///
/// # Example
///
/// ```
/// use attach_core::{AttachmentGraph, ConnectorSpec, NodeSpec, SimplePhysics};
/// use attach_types::{ConnectorId, Layer};
///
/// # fn main() -> attach_types::AttachResult<()> {
/// let mut physics = SimplePhysics::new();
/// let mut graph = AttachmentGraph::new();
/// let layer = Layer::wrapping(0);
///
/// let hull = graph.add_node(
///     NodeSpec::new("hull").with_connector(ConnectorSpec::port(layer)),
///     &mut physics,
/// )?;
/// let fin = graph.add_node(
///     NodeSpec::new("fin").with_connector(ConnectorSpec::port(layer)),
///     &mut physics,
/// )?;
///
/// graph.attach(ConnectorId::new(fin, 0), ConnectorId::new(hull, 0), &mut physics)?;
/// assert_eq!(graph.parent(fin), Some(hull));
/// assert!(graph.check_integrity().is_valid());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AttachmentGraph {
    pub(crate) nodes: HashMap<NodeId, Node>,
    next_node_id: u64,
    settings: Box<dyn SettingsStore>,
    pub(crate) registry: ConnectorRegistry,
    pub(crate) groups: HashMap<WeldGroupId, WeldGroup>,
    pub(crate) next_group_id: u64,
    pub(crate) listeners: Listeners,
    pub(crate) symmetry: HashMap<SymmetryGroupId, SymmetryGroup>,
    pub(crate) next_symmetry_id: u64,
    diagnostics: Vec<Diagnostic>,
}

impl Default for AttachmentGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentGraph {
    /// Create an empty graph with default layer settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Box::new(LayerSettings::default()))
    }

    /// Create an empty graph reading layer defaults from `settings`.
    #[must_use]
    pub fn with_settings(settings: Box<dyn SettingsStore>) -> Self {
        Self {
            nodes: HashMap::new(),
            next_node_id: 1,
            settings,
            registry: ConnectorRegistry::new(),
            groups: HashMap::new(),
            next_group_id: 1,
            listeners: Listeners::new(),
            symmetry: HashMap::new(),
            next_symmetry_id: 1,
            diagnostics: Vec::new(),
        }
    }

    // ========================================================================
    // Node management
    // ========================================================================

    /// Insert a node.
    ///
    /// Connector options are resolved against the settings store and
    /// validated before anything is created. A node that asks to weld
    /// without a body is inserted with welding disabled and a
    /// [`DiagnosticKind::MissingBody`] diagnostic.
    pub fn add_node(
        &mut self,
        spec: NodeSpec,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<NodeId> {
        spec.mass.validate()?;
        if !spec.pose.is_finite() {
            return Err(AttachError::invalid_config(format!(
                "node '{}' has a non-finite pose",
                spec.name
            )));
        }

        let id = NodeId::new(self.next_node_id);
        let mut connectors = Vec::with_capacity(spec.connectors.len());
        for (index, connector) in spec.connectors.iter().enumerate() {
            let defaults = self.settings.layer_options(connector.layer);
            let resolved = connector.options.resolve(defaults);
            resolved.validate()?;
            connectors.push(Connector::from_spec(
                ConnectorId::new(id, index),
                connector,
                defaults,
            ));
        }
        self.next_node_id += 1;

        let body = match spec.body {
            BodySource::Create => {
                Some(physics.create_body(RigidBodyState::at_rest(spec.pose), spec.mass))
            }
            BodySource::Existing(body) if physics.body_state(body).is_some() => Some(body),
            BodySource::Existing(body) => {
                warn!(node = %id, body = %body, "Body unknown to physics service");
                None
            }
            BodySource::None => None,
        };

        let mut weld = spec.weld;
        if weld && body.is_none() {
            warn!(node = %id, name = %spec.name, "Weld requested without a body, welding disabled");
            self.diagnostics.push(Diagnostic {
                node: Some(id),
                kind: DiagnosticKind::MissingBody,
                message: format!("node '{}' is configured to weld but has no body", spec.name),
            });
            weld = false;
        }

        for connector in connectors.iter().filter(|c| c.is_active()) {
            self.registry.register(connector.layer(), connector.id());
        }

        self.nodes.insert(
            id,
            Node {
                id,
                name: spec.name,
                mode: spec.mode,
                pose: spec.pose,
                mass: spec.mass,
                connectors,
                parent: None,
                children: Vec::new(),
                symmetry: None,
                body,
                weld,
                group: None,
                effective_body: body,
                body_offset: Pose::identity(),
            },
        );

        debug!(node = %id, body = ?body, weld, "Added node");
        Ok(id)
    }

    /// Get a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Whether a node is live.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Live node ids in ascending order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over nodes in arbitrary order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get a connector.
    #[must_use]
    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.nodes.get(&id.node)?.connector(id.index)
    }

    /// The settings store.
    #[must_use]
    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    /// The connector registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> AttachResult<&Node> {
        self.nodes.get(&id).ok_or(AttachError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> AttachResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(AttachError::UnknownNode(id))
    }

    pub(crate) fn connector_ref(&self, id: ConnectorId) -> AttachResult<&Connector> {
        self.node_ref(id.node)?
            .connector(id.index)
            .ok_or(AttachError::UnknownConnector(id))
    }

    pub(crate) fn connector_mut(&mut self, id: ConnectorId) -> AttachResult<&mut Connector> {
        self.node_mut(id.node)?
            .connector_mut(id.index)
            .ok_or(AttachError::UnknownConnector(id))
    }

    // ========================================================================
    // Lifecycle modes
    // ========================================================================

    /// Set a node's lifecycle mode.
    ///
    /// Used by the placement process to mark targets
    /// (`AcceptingAttachments`), lock nodes (`BeingAttached`) or park them
    /// (`Inactive`).
    pub fn set_mode(&mut self, node: NodeId, mode: LifecycleMode) -> AttachResult<()> {
        let n = self.node_mut(node)?;
        if n.mode != mode {
            debug!(node = %node, from = %n.mode, to = %mode, "Mode changed");
            n.mode = mode;
        }
        Ok(())
    }

    /// Return a node to its steady mode: `Attached` with a parent,
    /// `FreeConnections` without. `Inactive` is kept.
    pub fn settle(&mut self, node: NodeId) -> AttachResult<LifecycleMode> {
        let n = self.node_mut(node)?;
        n.mode = n.mode.settled(n.parent.is_some());
        Ok(n.mode)
    }

    // ========================================================================
    // Connector activation and configuration
    // ========================================================================

    /// Activate or deactivate a connector.
    ///
    /// Activation re-reads the layer defaults and registers the connector;
    /// deactivation unregisters it. Existing attachments are kept either way.
    pub fn set_connector_active(&mut self, id: ConnectorId, active: bool) -> AttachResult<()> {
        let was_active = self.connector_ref(id)?.is_active();
        if was_active == active {
            return Ok(());
        }
        if active {
            self.reinitialize_connector(id)?;
        }

        let connector = self.connector_mut(id)?;
        connector.set_active(active);
        let layer = connector.layer();
        if active {
            self.registry.register(layer, id);
        } else {
            self.registry.unregister(layer, id);
        }
        self.refresh_connector_listeners(id)?;
        debug!(connector = %id, active, "Connector activation changed");
        Ok(())
    }

    /// Re-read a connector's layer defaults from the settings store.
    pub fn reinitialize_connector(&mut self, id: ConnectorId) -> AttachResult<()> {
        let connector = self.connector_ref(id)?;
        let defaults = self.settings.layer_options(connector.layer());
        connector.overrides().resolve(defaults).validate()?;
        self.connector_mut(id)?.reinitialize(defaults);
        Ok(())
    }

    /// Replace the settings store and reinitialize every connector.
    ///
    /// Fails without changing anything if the new defaults are invalid for
    /// any connector.
    pub fn replace_settings(&mut self, settings: Box<dyn SettingsStore>) -> AttachResult<()> {
        for node in self.nodes.values() {
            for connector in &node.connectors {
                let defaults = settings.layer_options(connector.layer());
                connector.overrides().resolve(defaults).validate()?;
            }
        }
        self.settings = settings;
        for node in self.nodes.values_mut() {
            for connector in &mut node.connectors {
                connector.reinitialize(self.settings.layer_options(connector.layer()));
            }
        }
        info!(nodes = self.nodes.len(), "Settings replaced");
        Ok(())
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a listener on a node.
    ///
    /// Connector snapshots on the node are refreshed, so the listener hears
    /// the next operation.
    pub fn register_listener(
        &mut self,
        node: NodeId,
        scope: ListenerScope,
        observer: impl AttachmentObserver + 'static,
    ) -> AttachResult<ListenerId> {
        if let ListenerScope::Connector(index) = scope {
            self.connector_ref(ConnectorId::new(node, index))?;
        } else {
            self.node_ref(node)?;
        }
        let id = self.listeners.insert(node, scope, Box::new(observer));
        self.refresh_listeners(node)?;
        debug!(node = %node, listener = %id, "Registered listener");
        Ok(id)
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let Some(node) = self.listeners.remove(id) else {
            return false;
        };
        if self.nodes.contains_key(&node)
            && let Err(err) = self.refresh_listeners(node)
        {
            warn!(node = %node, listener = %id, error = %err, "Listener snapshot refresh failed");
        }
        true
    }

    /// Number of listeners registered on a node.
    #[must_use]
    pub fn listener_count(&self, node: NodeId) -> usize {
        self.listeners.count(node)
    }

    /// Rebuild the listener snapshots of every connector on a node.
    pub fn refresh_listeners(&mut self, node: NodeId) -> AttachResult<()> {
        let count = self.node_ref(node)?.connectors.len();
        for index in 0..count {
            self.refresh_connector_listeners(ConnectorId::new(node, index))?;
        }
        Ok(())
    }

    fn refresh_connector_listeners(&mut self, id: ConnectorId) -> AttachResult<()> {
        let snapshot = self.listeners.snapshot_for(id);
        self.connector_mut(id)?.set_listener_snapshot(snapshot);
        Ok(())
    }

    /// Deliver an event to the listeners snapshotted on `info.self_connector`.
    pub(crate) fn dispatch(&mut self, event: LifecycleEvent, info: &AttachmentInfo) {
        let connector = info.self_connector;
        let snapshot = match self.connector(connector) {
            Some(c) if !c.listener_snapshot().is_empty() => c.listener_snapshot().to_vec(),
            _ => return,
        };

        let mut entries = self.listeners.take(connector.node);
        let graph: &Self = self;
        for id in snapshot {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                debug!(listener = %id, connector = %connector, event = event.as_str(), "Dispatch");
                entry.deliver(event, graph, info);
            }
        }
        self.listeners.restore(connector.node, entries);
    }

    // ========================================================================
    // Tree queries
    // ========================================================================

    /// Parent node.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node)?.parent.map(|e| e.remote_node())
    }

    /// Child nodes in attachment order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|n| n.children.iter().map(|e| e.remote_node()).collect())
            .unwrap_or_default()
    }

    /// Root of the tree containing `node`.
    ///
    /// The walk is bounded by the node count; exceeding it means the parent
    /// links form a cycle.
    pub fn tree_root(&self, node: NodeId) -> AttachResult<NodeId> {
        let mut current = self.node_ref(node)?;
        for _ in 0..=self.nodes.len() {
            match current.parent {
                None => return Ok(current.id),
                Some(edge) => current = self.node_ref(edge.remote_node())?,
            }
        }
        error!(node = %node, "Parent chain does not terminate");
        Err(AttachError::invariant(format!(
            "parent chain from {node} does not terminate"
        )))
    }

    /// Number of parent edges between `node` and its root.
    pub fn depth(&self, node: NodeId) -> AttachResult<usize> {
        let mut current = self.node_ref(node)?;
        let mut depth = 0;
        while let Some(edge) = current.parent {
            depth += 1;
            if depth > self.nodes.len() {
                return Err(AttachError::invariant(format!(
                    "parent chain from {node} does not terminate"
                )));
            }
            current = self.node_ref(edge.remote_node())?;
        }
        Ok(depth)
    }

    /// Whether `node` is a strict descendant of `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(node);
        for _ in 0..self.nodes.len() {
            match current {
                Some(p) if p == ancestor => return true,
                Some(p) => current = self.parent(p),
                None => return false,
            }
        }
        false
    }

    /// All strict descendants of `node`, breadth first.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(node);
        let mut frontier = self.children(node);
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for child in frontier {
                if seen.insert(child) {
                    out.push(child);
                    next.extend(self.children(child));
                }
            }
            frontier = next;
        }
        out
    }

    /// Nodes without a parent, ascending.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.id)
            .collect();
        roots.sort_unstable();
        roots
    }

    // ========================================================================
    // Poses and forces
    // ========================================================================

    pub(crate) fn pose_in(&self, node: &Node, physics: &dyn PhysicsService) -> Pose {
        node.effective_body
            .and_then(|body| physics.body_state(body))
            .map_or(node.pose, |state| state.pose.compose(&node.body_offset))
    }

    /// World pose of a node read from its effective body.
    pub fn current_pose(&self, node: NodeId, physics: &dyn PhysicsService) -> AttachResult<Pose> {
        Ok(self.pose_in(self.node_ref(node)?, physics))
    }

    /// World frame of a connector read from its node's effective body.
    pub fn connector_pose(
        &self,
        id: ConnectorId,
        physics: &dyn PhysicsService,
    ) -> AttachResult<Pose> {
        let local = self.connector_ref(id)?.local_pose();
        Ok(self.current_pose(id.node, physics)?.compose(&local))
    }

    /// Refresh every stored node pose from the physics service.
    pub fn sync_poses(&mut self, physics: &dyn PhysicsService) {
        let poses: Vec<(NodeId, Pose)> = self
            .nodes
            .values()
            .map(|n| (n.id, self.pose_in(n, physics)))
            .collect();
        for (id, pose) in poses {
            if let Some(n) = self.nodes.get_mut(&id) {
                n.pose = pose;
            }
        }
    }

    /// Move a node.
    ///
    /// A welded node moves its whole group; every member's stored pose is
    /// updated. Velocities are kept.
    pub fn set_node_pose(
        &mut self,
        node: NodeId,
        pose: Pose,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<()> {
        if !pose.is_finite() {
            return Err(AttachError::invalid_config(format!(
                "non-finite pose for {node}"
            )));
        }
        let n = self.node_ref(node)?;
        let moved: Vec<NodeId> = match n.group {
            Some(group) => self
                .groups
                .get(&group)
                .map(|g| g.members().to_vec())
                .unwrap_or_default(),
            None => vec![node],
        };

        if let Some(body) = n.effective_body
            && let Some(mut state) = physics.body_state(body)
        {
            state.pose = pose.compose(&n.body_offset.inverse());
            physics.set_body_state(body, state);
        }
        self.node_mut(node)?.pose = pose;

        for member in moved {
            let member_pose = self.current_pose(member, &*physics)?;
            self.node_mut(member)?.pose = member_pose;
        }
        Ok(())
    }

    /// Apply an impulse at a point given in the node frame.
    ///
    /// The impulse goes to the node's effective body, so a force on any
    /// welded member acts on the whole group.
    pub fn apply_impulse_at(
        &self,
        node: NodeId,
        local_point: Point3<f64>,
        impulse: Vector3<f64>,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<()> {
        let n = self.node_ref(node)?;
        let body = n.effective_body.ok_or(AttachError::MissingBody(node))?;
        let point = self.pose_in(n, &*physics).transform_point(&local_point);
        physics.apply_impulse_at_point(body, impulse, point);
        Ok(())
    }

    // ========================================================================
    // Proximity
    // ========================================================================

    /// Registered attachable connectors near a point, nearest first.
    ///
    /// Positions come from stored node poses; call [`Self::sync_poses`]
    /// first if bodies have moved.
    #[must_use]
    pub fn candidates_near(&self, query: &ProximityQuery) -> Vec<Candidate> {
        let mut found: Vec<Candidate> = self
            .registry
            .in_layers(query.layers)
            .filter_map(|id| {
                let node = self.nodes.get(&id.node)?;
                let connector = node.connector(id.index)?;
                if !connector.is_attachable() {
                    return None;
                }
                let frame = node.connector_frame(id.index)?;
                let distance = (frame.position - query.point).norm();
                let radius = query.radius.unwrap_or(connector.options().influence_radius);
                if distance > radius {
                    return None;
                }
                let accepting = connector.is_accepting(node.mode);
                if query.accepting_only && !accepting {
                    return None;
                }
                Some(Candidate {
                    connector: id,
                    distance,
                    accepting,
                })
            })
            .collect();
        found.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.connector.cmp(&b.connector))
        });
        found
    }

    // ========================================================================
    // Diagnostics and accounting
    // ========================================================================

    /// Diagnostics collected so far.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Take and clear collected diagnostics.
    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Log and record an invariant violation, then hand the error back.
    pub(crate) fn violation(&mut self, node: Option<NodeId>, err: AttachError) -> AttachError {
        error!(node = ?node, error = %err, "Invariant violation");
        self.diagnostics.push(Diagnostic {
            node,
            kind: DiagnosticKind::InvariantViolation,
            message: err.to_string(),
        });
        err
    }

    /// Mass simulated by the graph: every welded group plus every node
    /// outside a group.
    #[must_use]
    pub fn total_simulated_mass(&self) -> f64 {
        let grouped: f64 = self.groups.values().map(WeldGroup::mass).sum();
        let loose: f64 = self
            .nodes
            .values()
            .filter(|n| n.group.is_none())
            .map(|n| n.mass.mass)
            .sum();
        grouped + loose
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::connector::ConnectorSpec;
    use crate::physics::SimplePhysics;
    use approx::assert_relative_eq;
    use attach_types::{Layer, LayerMask, LayerOptions, MassProperties};

    fn layer() -> Layer {
        Layer::wrapping(0)
    }

    fn spec(name: &str, x: f64) -> NodeSpec {
        NodeSpec::new(name)
            .at(Pose::from_position(Point3::new(x, 0.0, 0.0)))
            .with_connector(ConnectorSpec::port(layer()))
    }

    #[test]
    fn test_add_node_creates_body_and_registers() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let id = graph.add_node(spec("a", 0.0), &mut physics).unwrap();

        let node = graph.node(id).unwrap();
        assert!(node.own_body().is_some());
        assert_eq!(node.effective_body(), node.own_body());
        assert!(graph.registry().contains(layer(), ConnectorId::new(id, 0)));
        assert_eq!(physics.body_count(), 1);
    }

    #[test]
    fn test_missing_body_disables_weld() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let id = graph
            .add_node(spec("ghost", 0.0).with_body(BodySource::None), &mut physics)
            .unwrap();

        assert!(!graph.node(id).unwrap().weld_enabled());
        assert_eq!(graph.diagnostics().len(), 1);
        assert_eq!(graph.diagnostics()[0].kind, DiagnosticKind::MissingBody);
        assert_eq!(graph.drain_diagnostics().len(), 1);
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn test_invalid_mass_rejected_before_body_created() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let result = graph.add_node(
            spec("bad", 0.0).with_mass(MassProperties::point_mass(-1.0)),
            &mut physics,
        );
        assert!(result.is_err());
        assert_eq!(physics.body_count(), 0);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_invalid_layer_settings_rejected() {
        let mut physics = SimplePhysics::new();
        let settings = LayerSettings::default()
            .with_layer(layer(), LayerOptions::default().with_influence_radius(-1.0));
        let mut graph = AttachmentGraph::with_settings(Box::new(settings));
        let result = graph.add_node(spec("a", 0.0), &mut physics);
        assert!(matches!(result, Err(AttachError::InvalidConfig { .. })));
    }

    #[test]
    fn test_connector_activation_toggles_registry() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let id = graph.add_node(spec("a", 0.0), &mut physics).unwrap();
        let c = ConnectorId::new(id, 0);

        graph.set_connector_active(c, false).unwrap();
        assert!(!graph.registry().contains(layer(), c));
        assert!(!graph.connector(c).unwrap().is_active());

        graph.set_connector_active(c, true).unwrap();
        assert!(graph.registry().contains(layer(), c));
    }

    #[test]
    fn test_replace_settings_rereads_defaults() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let id = graph.add_node(spec("a", 0.0), &mut physics).unwrap();
        let c = ConnectorId::new(id, 0);

        let wide = LayerSettings::new(LayerOptions::default().with_influence_radius(5.0));
        graph.replace_settings(Box::new(wide)).unwrap();
        assert_eq!(graph.connector(c).unwrap().options().influence_radius, 5.0);

        let broken = LayerSettings::new(LayerOptions::default().with_separation_impulse(f64::NAN));
        assert!(graph.replace_settings(Box::new(broken)).is_err());
        assert_eq!(graph.connector(c).unwrap().options().influence_radius, 5.0);
    }

    #[test]
    fn test_candidates_sorted_and_filtered() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let near = graph.add_node(spec("near", 0.1), &mut physics).unwrap();
        let far = graph.add_node(spec("far", 0.2), &mut physics).unwrap();
        graph.add_node(spec("out", 3.0), &mut physics).unwrap();
        let other = graph
            .add_node(
                NodeSpec::new("other").with_connector(ConnectorSpec::port(Layer::wrapping(5))),
                &mut physics,
            )
            .unwrap();

        let query = ProximityQuery::around(Point3::origin()).in_layers(LayerMask::only(layer()));
        let found = graph.candidates_near(&query);
        let ids: Vec<NodeId> = found.iter().map(|c| c.connector.node).collect();
        assert_eq!(ids, vec![near, far]);
        assert_relative_eq!(found[0].distance, 0.1, epsilon = 1e-12);
        assert!(!ids.contains(&other));

        graph.set_mode(near, LifecycleMode::Attached).unwrap();
        let accepting = graph.candidates_near(&query.accepting());
        assert_eq!(accepting.len(), 1);
        assert_eq!(accepting[0].connector.node, far);

        let wide = graph.candidates_near(&ProximityQuery::around(Point3::origin()).within(10.0));
        assert_eq!(wide.len(), 4);
    }

    #[test]
    fn test_settle_keeps_inactive() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let id = graph.add_node(spec("a", 0.0), &mut physics).unwrap();

        graph.set_mode(id, LifecycleMode::AcceptingAttachments).unwrap();
        assert_eq!(graph.settle(id).unwrap(), LifecycleMode::FreeConnections);

        graph.set_mode(id, LifecycleMode::Inactive).unwrap();
        assert_eq!(graph.settle(id).unwrap(), LifecycleMode::Inactive);
    }

    #[test]
    fn test_impulse_routes_to_body() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let id = graph
            .add_node(spec("a", 0.0).with_mass(MassProperties::sphere(2.0, 0.5)), &mut physics)
            .unwrap();

        graph
            .apply_impulse_at(id, Point3::origin(), Vector3::new(0.0, 0.0, 4.0), &mut physics)
            .unwrap();
        let body = graph.node(id).unwrap().own_body().unwrap();
        let state = physics.body_state(body).unwrap();
        assert_relative_eq!(state.twist.linear.z, 2.0, epsilon = 1e-12);

        let ghost = graph
            .add_node(spec("ghost", 0.0).with_body(BodySource::None).without_weld(), &mut physics)
            .unwrap();
        let err = graph.apply_impulse_at(ghost, Point3::origin(), Vector3::z(), &mut physics);
        assert_eq!(err, Err(AttachError::MissingBody(ghost)));
    }

    #[test]
    fn test_set_node_pose_moves_body() {
        let mut physics = SimplePhysics::new();
        let mut graph = AttachmentGraph::new();
        let id = graph.add_node(spec("a", 0.0), &mut physics).unwrap();
        let target = Pose::from_position(Point3::new(0.0, 5.0, 0.0));

        graph.set_node_pose(id, target, &mut physics).unwrap();
        let pose = graph.current_pose(id, &physics).unwrap();
        assert_relative_eq!(pose.position, target.position, epsilon = 1e-12);
        assert_relative_eq!(graph.node(id).unwrap().pose().position, target.position, epsilon = 1e-12);
    }
}
