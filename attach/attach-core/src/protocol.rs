//! Attach and detach.
//!
//! A proposal names an initiator connector and a target connector. The
//! initiator's node becomes the child. Validation never mutates; a commit
//! either applies both sides of an edge or neither.
//!
//! Event order within one commit:
//!
//! 1. before-events on the initiator side, then the target side
//! 2. records registered on both connectors, tree edges updated
//! 3. welded groups recomputed
//! 4. after-events on the initiator side, then the target side
//!
//! Symmetry replays run after the original commit, one independent commit
//! per sibling.

use attach_types::{
    AttachError, AttachResult, AttachmentInfo, AttachmentKind, BodyId, Bond, BondPolicy,
    ConnectorId, LifecycleMode, NodeId, Rejection, WeldGroupId,
};
use hashbrown::HashSet;
use tracing::{debug, info, warn};

use crate::graph::AttachmentGraph;
use crate::listener::LifecycleEvent;
use crate::node::Edge;
use crate::physics::PhysicsService;
use crate::symmetry::{SymmetryFailure, SymmetryReport};

/// Where a proposal stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProposalState {
    /// Created, not yet checked.
    #[default]
    Proposed,
    /// Passed validation against the graph as it was then.
    Validated,
    /// Applied.
    Committed,
    /// Failed validation.
    Rejected(Rejection),
}

/// A pending attachment of `initiator` to `target`.
///
/// Proposals hold no resources: abandoning one needs no cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    initiator: ConnectorId,
    target: ConnectorId,
    state: ProposalState,
    replicate: bool,
}

impl Proposal {
    /// Propose attaching `initiator` (child side) to `target` (parent side).
    #[must_use]
    pub fn new(initiator: ConnectorId, target: ConnectorId) -> Self {
        Self {
            initiator,
            target,
            state: ProposalState::Proposed,
            replicate: true,
        }
    }

    /// Skip symmetry replay on commit (builder pattern).
    #[must_use]
    pub fn without_replication(mut self) -> Self {
        self.replicate = false;
        self
    }

    /// Initiating connector.
    #[must_use]
    pub fn initiator(&self) -> ConnectorId {
        self.initiator
    }

    /// Target connector.
    #[must_use]
    pub fn target(&self) -> ConnectorId {
        self.target
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProposalState {
        self.state
    }

    /// Whether commit replays onto symmetry siblings.
    #[must_use]
    pub fn replicates(&self) -> bool {
        self.replicate
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    /// The new edge, from the initiator's side.
    pub attachment: AttachmentInfo,
    /// Symmetry replays.
    pub symmetry: SymmetryReport,
}

impl CommitReport {
    /// Original plus successful replays.
    #[must_use]
    pub fn total_committed(&self) -> usize {
        1 + self.symmetry.attached.len()
    }
}

/// How much a detach removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetachMode {
    /// Only the node's parent edge; its subtree comes along.
    #[default]
    SingleEdge,
    /// Every edge below the node as well; each descendant ends up free.
    Subtree,
}

/// Result of a detach.
#[derive(Debug, Clone, PartialEq)]
pub enum DetachOutcome {
    /// The node had no parent.
    NothingToDo,
    /// Edges were removed.
    Detached {
        /// Nodes whose parent edge was removed, deepest first.
        nodes: Vec<NodeId>,
        /// Welded groups that exist after the splits.
        groups: Vec<WeldGroupId>,
        /// Symmetry replays.
        symmetry: SymmetryReport,
    },
}

impl DetachOutcome {
    /// Whether anything was removed.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached { .. })
    }

    /// Nodes whose parent edge was removed.
    #[must_use]
    pub fn detached_nodes(&self) -> &[NodeId] {
        match self {
            Self::NothingToDo => &[],
            Self::Detached { nodes, .. } => nodes,
        }
    }
}

#[derive(Clone, Copy)]
enum PlannedBond {
    Weld,
    Joint { parent: BodyId, child: BodyId },
    Logical,
}

#[derive(Debug, Default)]
struct DetachLog {
    nodes: Vec<NodeId>,
    groups: Vec<WeldGroupId>,
}

impl AttachmentGraph {
    // ========================================================================
    // Validation
    // ========================================================================

    /// Apply the validation rules in order and return the kind of the edge
    /// that would be created.
    pub(crate) fn check_pair(
        &self,
        initiator: ConnectorId,
        target: ConnectorId,
    ) -> AttachResult<AttachmentKind> {
        let node_a = self.node_ref(initiator.node)?;
        let node_b = self.node_ref(target.node)?;
        let a = node_a
            .connector(initiator.index)
            .ok_or(AttachError::UnknownConnector(initiator))?;
        let b = node_b
            .connector(target.index)
            .ok_or(AttachError::UnknownConnector(target))?;

        if !a.is_attachable() || !b.is_attachable() {
            return Err(Rejection::NotAttachable.into());
        }
        let kind = AttachmentKind::between(a.kind(), b.kind()).ok_or(Rejection::IncompatibleKinds)?;
        if let Some(reason) = b.not_accepting_reason(node_b.mode) {
            return Err(Rejection::NotAccepting(reason).into());
        }
        if !b.options().accepted_layers.contains(a.layer()) {
            return Err(Rejection::LayerNotAccepted.into());
        }
        if initiator.node == target.node || self.is_descendant_of(target.node, initiator.node) {
            return Err(Rejection::WouldCreateCycle.into());
        }
        let released = node_a.parent.is_some_and(|edge| edge.local == initiator);
        if a.attachments().len().saturating_sub(usize::from(released)) >= a.capacity() {
            return Err(Rejection::InitiatorOccupied.into());
        }
        Ok(kind)
    }

    /// Start a proposal.
    #[must_use]
    pub fn propose(&self, initiator: ConnectorId, target: ConnectorId) -> Proposal {
        Proposal::new(initiator, target)
    }

    /// Validate a proposal against the current graph, updating its state.
    ///
    /// Stale handles are reported as errors and leave the state unchanged.
    pub fn validate(&self, proposal: &mut Proposal) -> AttachResult<()> {
        match self.check_pair(proposal.initiator, proposal.target) {
            Ok(_) => {
                proposal.state = ProposalState::Validated;
                Ok(())
            }
            Err(AttachError::Rejected(rejection)) => {
                debug!(
                    initiator = %proposal.initiator,
                    target = %proposal.target,
                    reason = %rejection,
                    "Attachment rejected"
                );
                proposal.state = ProposalState::Rejected(rejection);
                Err(rejection.into())
            }
            Err(err) => Err(err),
        }
    }

    /// Whether attaching `initiator` to `target` would pass validation.
    #[must_use]
    pub fn can_attach(&self, initiator: ConnectorId, target: ConnectorId) -> bool {
        self.check_pair(initiator, target).is_ok()
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Commit a proposal.
    ///
    /// The proposal is validated again against the current graph. On
    /// success the edge exists on both connectors, and if the initiator's
    /// node is in a symmetry group the attach is replayed on each sibling.
    /// A rejected original is not replayed.
    pub fn commit(
        &mut self,
        proposal: &mut Proposal,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<CommitReport> {
        self.validate(proposal)?;
        let attachment = self.commit_edge(proposal.initiator, proposal.target, physics)?;
        proposal.state = ProposalState::Committed;

        let mut symmetry = SymmetryReport::default();
        let mut targets = vec![proposal.target.node];
        if proposal.replicate {
            for (initiator, target) in self.symmetric_pairs(proposal.initiator, proposal.target) {
                match self.commit_edge(initiator, target, physics) {
                    Ok(info) => {
                        targets.push(target.node);
                        symmetry.attached.push(info);
                    }
                    Err(error) => {
                        warn!(
                            initiator = %initiator,
                            target = %target,
                            error = %error,
                            "Symmetric attach failed"
                        );
                        symmetry.failures.push(SymmetryFailure {
                            node: initiator.node,
                            initiator: Some(initiator),
                            target: Some(target),
                            error,
                        });
                    }
                }
            }
        }

        for node in targets {
            if self.contains_node(node) {
                self.settle(node)?;
            }
        }

        Ok(CommitReport {
            attachment,
            symmetry,
        })
    }

    /// Propose and commit in one call.
    pub fn attach(
        &mut self,
        initiator: ConnectorId,
        target: ConnectorId,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<CommitReport> {
        let mut proposal = self.propose(initiator, target);
        self.commit(&mut proposal, physics)
    }

    /// Bond for a new edge: weld when the target layer asks for it and
    /// both nodes can weld, a joint when both have bodies, logical
    /// otherwise.
    fn plan_bond(&self, initiator: ConnectorId, target: ConnectorId) -> AttachResult<PlannedBond> {
        let a = self.node_ref(initiator.node)?;
        let b = self.node_ref(target.node)?;
        let policy = self.connector_ref(target)?.options().policy;

        Ok(match (a.effective_body, b.effective_body) {
            _ if policy == BondPolicy::Weld && a.can_weld() && b.can_weld() => PlannedBond::Weld,
            (Some(child), Some(parent)) if child != parent => PlannedBond::Joint { parent, child },
            _ => PlannedBond::Logical,
        })
    }

    /// Validate and apply one edge. No symmetry replay; the target's mode is
    /// left for the caller to settle.
    fn commit_edge(
        &mut self,
        initiator: ConnectorId,
        target: ConnectorId,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<AttachmentInfo> {
        self.check_pair(initiator, target)?;

        // Reparent: drop the old parent edge first.
        if self.node_ref(initiator.node)?.parent.is_some() {
            let mut log = DetachLog::default();
            self.detach_edge(initiator.node, DetachMode::SingleEdge, physics, &mut log)?;
        }
        let kind = self.check_pair(initiator, target)?;

        let frame_a = self.connector_pose(initiator, &*physics)?;
        let frame_b = self.connector_pose(target, &*physics)?;
        let planned = self.plan_bond(initiator, target)?;
        let mut record = AttachmentInfo {
            self_connector: initiator,
            other_connector: target,
            kind,
            initiator,
            relative: frame_b.relative_to(&frame_a),
            bond: match planned {
                PlannedBond::Weld => Bond::Weld,
                PlannedBond::Joint { .. } | PlannedBond::Logical => Bond::Logical,
            },
        };

        let previous_mode = self.node_ref(initiator.node)?.mode;
        self.node_mut(initiator.node)?.mode = LifecycleMode::BeingAttached;

        self.dispatch(LifecycleEvent::BeforeAttachment, &record);
        self.dispatch(LifecycleEvent::BeforeAttachment, &record.mirrored());

        // Joints are created after the before-events.
        if let PlannedBond::Joint { parent, child } = planned {
            record.bond = Bond::Joint(physics.create_joint(parent, child, frame_b));
        }
        let bond = record.bond;
        let mirrored = record.mirrored();

        if let Err(err) = self.register_both(&record, &mirrored) {
            if let Some(joint) = bond.joint() {
                physics.remove_joint(joint);
            }
            if let Ok(node) = self.node_mut(initiator.node) {
                node.mode = previous_mode;
            }
            return Err(self.violation(Some(initiator.node), err));
        }

        self.node_mut(initiator.node)?.parent = Some(Edge {
            local: initiator,
            remote: target,
        });
        self.node_mut(target.node)?.children.push(Edge {
            local: target,
            remote: initiator,
        });

        let group = if bond.is_weld() {
            Some(self.weld_attach(initiator.node, target.node, physics)?)
        } else {
            None
        };

        self.node_mut(initiator.node)?.mode = previous_mode.settled(true);

        self.dispatch(LifecycleEvent::AfterAttachment, &record);
        self.dispatch(LifecycleEvent::AfterAttachment, &mirrored);

        info!(
            initiator = %initiator,
            target = %target,
            kind = ?kind,
            bond = ?bond,
            group = ?group,
            "Attached"
        );
        Ok(record)
    }

    fn register_both(
        &mut self,
        record: &AttachmentInfo,
        mirrored: &AttachmentInfo,
    ) -> AttachResult<()> {
        self.connector_mut(record.self_connector)?
            .register_attachment(*record)?;
        if let Err(err) = self
            .connector_mut(mirrored.self_connector)
            .and_then(|c| c.register_attachment(*mirrored))
        {
            self.connector_mut(record.self_connector)?
                .register_detachment(record.other_connector)?;
            return Err(err);
        }
        Ok(())
    }

    // ========================================================================
    // Detach
    // ========================================================================

    /// Detach a node from its parent and replay on symmetry siblings.
    ///
    /// A node without a parent yields [`DetachOutcome::NothingToDo`].
    pub fn detach(
        &mut self,
        node: NodeId,
        mode: DetachMode,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<DetachOutcome> {
        self.detach_with(node, mode, true, physics)
    }

    /// Detach a node from its parent without symmetry replay.
    pub fn detach_single(
        &mut self,
        node: NodeId,
        mode: DetachMode,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<DetachOutcome> {
        self.detach_with(node, mode, false, physics)
    }

    fn detach_with(
        &mut self,
        node: NodeId,
        mode: DetachMode,
        replicate: bool,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<DetachOutcome> {
        let mut log = DetachLog::default();
        if !self.detach_edge(node, mode, physics, &mut log)? {
            debug!(node = %node, "Detach without parent");
            return Ok(DetachOutcome::NothingToDo);
        }

        let mut symmetry = SymmetryReport::default();
        if replicate {
            for sibling in self.symmetry_siblings(node) {
                let mut sibling_log = DetachLog::default();
                match self.detach_edge(sibling, mode, physics, &mut sibling_log) {
                    Ok(true) => {
                        symmetry.detached.push(sibling);
                        log.groups.extend(sibling_log.groups);
                    }
                    Ok(false) => {}
                    Err(error) => {
                        warn!(node = %sibling, error = %error, "Symmetric detach failed");
                        symmetry.failures.push(SymmetryFailure {
                            node: sibling,
                            initiator: None,
                            target: None,
                            error,
                        });
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        log.groups
            .retain(|g| self.groups.contains_key(g) && seen.insert(*g));
        Ok(DetachOutcome::Detached {
            nodes: log.nodes,
            groups: log.groups,
            symmetry,
        })
    }

    /// Remove a node's parent edge. Returns false if there was none.
    fn detach_edge(
        &mut self,
        node: NodeId,
        mode: DetachMode,
        physics: &mut dyn PhysicsService,
        log: &mut DetachLog,
    ) -> AttachResult<bool> {
        let Some(edge) = self.node_ref(node)?.parent else {
            return Ok(false);
        };
        let (child, parent) = (edge.local, edge.remote);

        let record = self.connector_ref(child)?.attachment_info(parent);
        let mirrored = self.connector_ref(parent)?.attachment_info(child);
        if record.is_none() || mirrored.is_none() {
            let err = AttachError::invariant(format!(
                "edge {child} -> {parent} is missing an attachment record"
            ));
            return Err(self.violation(Some(node), err));
        }

        self.dispatch(LifecycleEvent::BeforeDetachment, &record);
        self.dispatch(LifecycleEvent::BeforeDetachment, &mirrored);

        if mode == DetachMode::Subtree {
            for grandchild in self.children(node) {
                self.detach_edge(grandchild, DetachMode::Subtree, physics, log)?;
            }
        }

        self.connector_mut(child)?.register_detachment(parent)?;
        self.connector_mut(parent)?.register_detachment(child)?;
        self.node_mut(node)?.parent = None;
        self.node_mut(parent.node)?
            .children
            .retain(|e| !(e.local == parent && e.remote == child));

        if let Some(joint) = record.bond.joint() {
            physics.remove_joint(joint);
        }
        if record.bond.is_weld()
            && let Some(group) = self.node_ref(node)?.group
        {
            let groups = self.split_group(group, physics)?;
            log.groups.extend(groups);
        }

        self.settle(node)?;

        self.dispatch(LifecycleEvent::AfterDetachment, &record);
        self.dispatch(LifecycleEvent::AfterDetachment, &mirrored);

        self.apply_separation(child, parent, physics)?;
        log.nodes.push(node);

        info!(child = %child, parent = %parent, bond = ?record.bond, "Detached");
        Ok(true)
    }

    /// Push the two sides of a removed edge apart along the parent
    /// connector's +Z.
    fn apply_separation(
        &mut self,
        child: ConnectorId,
        parent: ConnectorId,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<()> {
        let magnitude = self.connector_ref(parent)?.options().separation_impulse;
        let child_body = self.node_ref(child.node)?.effective_body;
        let parent_body = self.node_ref(parent.node)?.effective_body;
        let (Some(child_body), Some(parent_body)) = (child_body, parent_body) else {
            return Ok(());
        };
        if magnitude <= 0.0 || child_body == parent_body {
            return Ok(());
        }

        let frame = self.connector_pose(parent, &*physics)?;
        let impulse = frame.up() * magnitude;
        physics.apply_impulse_at_point(child_body, impulse, frame.position);
        physics.apply_impulse_at_point(parent_body, -impulse, frame.position);
        Ok(())
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Destroy a node.
    ///
    /// The parent edge and every child edge are detached first, the node's
    /// symmetry group is dissolved, its connectors and listeners are
    /// unregistered and its own body is returned to the physics service.
    pub fn remove_node(
        &mut self,
        node: NodeId,
        physics: &mut dyn PhysicsService,
    ) -> AttachResult<()> {
        self.node_ref(node)?;
        let mut log = DetachLog::default();
        self.detach_edge(node, DetachMode::SingleEdge, physics, &mut log)?;
        for child in self.children(node) {
            self.detach_edge(child, DetachMode::SingleEdge, physics, &mut log)?;
        }

        if let Some(group) = self.node_ref(node)?.symmetry {
            self.dissolve_symmetry(group);
        }
        self.listeners.remove_node(node);

        if let Some(group) = self.node_ref(node)?.group {
            let err = AttachError::invariant(format!("{node} still in {group} after detaching"));
            return Err(self.violation(Some(node), err));
        }
        let Some(removed) = self.nodes.remove(&node) else {
            return Err(AttachError::UnknownNode(node));
        };
        for connector in &removed.connectors {
            self.registry.unregister(connector.layer(), connector.id());
        }
        if let Some(body) = removed.body {
            physics.remove_body(body);
        }

        info!(node = %node, detached = log.nodes.len(), "Removed node");
        Ok(())
    }
}
