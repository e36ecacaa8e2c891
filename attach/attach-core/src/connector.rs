//! Connector runtime state.

use attach_types::{
    AttachError, AttachResult, AttachmentInfo, ConnectorId, ConnectorKind, ConnectorOptions,
    Layer, LayerOptions, LifecycleMode, ListenerId, NotAcceptingReason, Pose,
};
use smallvec::SmallVec;

use crate::symmetry::SymmetryPlan;

/// Description of a connector, used when building a node.
///
/// # Example
///
/// ```
/// use attach_core::ConnectorSpec;
/// use attach_types::{Layer, Point3, Pose};
///
/// let socket = ConnectorSpec::surface(Layer::wrapping(0), 4)
///     .at(Pose::from_position(Point3::new(0.0, 0.0, 0.5)));
/// assert!(socket.active);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSpec {
    /// Port, surface or fixed.
    pub kind: ConnectorKind,
    /// Layer the connector lives in.
    pub layer: Layer,
    /// Frame relative to the owning node; +Z points away from the node.
    pub local_pose: Pose,
    /// Whether the connector starts active.
    pub active: bool,
    /// Per-connector overrides of the layer defaults.
    pub options: ConnectorOptions,
    /// How symmetric placements are generated around this connector.
    pub symmetry: Option<SymmetryPlan>,
}

impl ConnectorSpec {
    /// A single-slot connector.
    #[must_use]
    pub fn port(layer: Layer) -> Self {
        Self::new(ConnectorKind::Port, layer)
    }

    /// A multi-slot connector.
    #[must_use]
    pub fn surface(layer: Layer, capacity: usize) -> Self {
        Self::new(ConnectorKind::surface(capacity), layer)
    }

    /// A structural connector that never attaches.
    #[must_use]
    pub fn fixed(layer: Layer) -> Self {
        Self::new(ConnectorKind::Fixed, layer)
    }

    fn new(kind: ConnectorKind, layer: Layer) -> Self {
        Self {
            kind,
            layer,
            local_pose: Pose::identity(),
            active: true,
            options: ConnectorOptions::default(),
            symmetry: None,
        }
    }

    /// Place the connector on the node (builder pattern).
    #[must_use]
    pub fn at(mut self, local_pose: Pose) -> Self {
        self.local_pose = local_pose;
        self
    }

    /// Override layer defaults (builder pattern).
    #[must_use]
    pub fn with_options(mut self, options: ConnectorOptions) -> Self {
        self.options = options;
        self
    }

    /// Start deactivated (builder pattern).
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Generate symmetric placements with `plan` (builder pattern).
    #[must_use]
    pub fn with_symmetry(mut self, plan: SymmetryPlan) -> Self {
        self.symmetry = Some(plan);
        self
    }
}

/// A typed attachment point owned by a node.
///
/// Connectors hold the attachment records of their edges, bounded by
/// capacity. The record mutators never touch the other side of an edge;
/// the graph updates both sides.
#[derive(Debug, Clone)]
pub struct Connector {
    id: ConnectorId,
    kind: ConnectorKind,
    layer: Layer,
    local_pose: Pose,
    active: bool,
    overrides: ConnectorOptions,
    options: LayerOptions,
    symmetry: Option<SymmetryPlan>,
    attachments: SmallVec<[AttachmentInfo; 2]>,
    listeners: Vec<ListenerId>,
}

impl Connector {
    /// Build a connector from its description and the layer defaults.
    #[must_use]
    pub(crate) fn from_spec(id: ConnectorId, spec: &ConnectorSpec, defaults: LayerOptions) -> Self {
        Self {
            id,
            kind: spec.kind,
            layer: spec.layer,
            local_pose: spec.local_pose,
            active: spec.active,
            overrides: spec.options,
            options: spec.options.resolve(defaults),
            symmetry: spec.symmetry,
            attachments: SmallVec::new(),
            listeners: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Handle of this connector.
    #[must_use]
    pub fn id(&self) -> ConnectorId {
        self.id
    }

    /// Connector variant.
    #[must_use]
    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    /// Layer.
    #[must_use]
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Frame relative to the owning node.
    #[must_use]
    pub fn local_pose(&self) -> Pose {
        self.local_pose
    }

    /// Whether the connector is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Resolved options: per-connector overrides applied to layer defaults.
    #[must_use]
    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    /// Per-connector overrides as declared.
    #[must_use]
    pub fn overrides(&self) -> &ConnectorOptions {
        &self.overrides
    }

    /// Symmetric placement plan, if any.
    #[must_use]
    pub fn symmetry(&self) -> Option<SymmetryPlan> {
        self.symmetry
    }

    /// Current attachment records.
    #[must_use]
    pub fn attachments(&self) -> &[AttachmentInfo] {
        &self.attachments
    }

    /// Listeners snapshotted for this connector.
    #[must_use]
    pub fn listener_snapshot(&self) -> &[ListenerId] {
        &self.listeners
    }

    // ========================================================================
    // Capability queries
    // ========================================================================

    /// Maximum number of simultaneous attachments.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.kind.capacity()
    }

    /// Whether this connector can take part in a new edge.
    #[must_use]
    pub fn is_attachable(&self) -> bool {
        self.kind.is_attachable()
    }

    /// Whether every slot is taken.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.attachments.len() >= self.capacity()
    }

    /// Whether the connector accepts a new attachment while its node is in
    /// `owner_mode`.
    #[must_use]
    pub fn is_accepting(&self, owner_mode: LifecycleMode) -> bool {
        self.not_accepting_reason(owner_mode).is_none()
    }

    /// Why the connector does not accept a new attachment, if it doesn't.
    #[must_use]
    pub fn not_accepting_reason(&self, owner_mode: LifecycleMode) -> Option<NotAcceptingReason> {
        if !self.active {
            Some(NotAcceptingReason::Inactive)
        } else if self.is_occupied() {
            Some(NotAcceptingReason::Occupied)
        } else if !owner_mode.accepts_proposals() {
            Some(NotAcceptingReason::Mode(owner_mode))
        } else {
            None
        }
    }

    /// The record of the edge to `other`, or a none record.
    #[must_use]
    pub fn attachment_info(&self, other: ConnectorId) -> AttachmentInfo {
        self.attachments
            .iter()
            .find(|info| info.other_connector == other)
            .copied()
            .unwrap_or_else(|| AttachmentInfo::none(self.id))
    }

    /// Whether an edge to `other` exists.
    #[must_use]
    pub fn is_attached_to(&self, other: ConnectorId) -> bool {
        self.attachments.iter().any(|info| info.other_connector == other)
    }

    // ========================================================================
    // Mutators (graph only)
    // ========================================================================

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn reinitialize(&mut self, defaults: LayerOptions) {
        self.options = self.overrides.resolve(defaults);
    }

    pub(crate) fn set_listener_snapshot(&mut self, listeners: Vec<ListenerId>) {
        self.listeners = listeners;
    }

    /// Append a record. Fails when full, on a foreign record, or on a
    /// duplicate edge.
    pub(crate) fn register_attachment(&mut self, info: AttachmentInfo) -> AttachResult<()> {
        if info.is_none() || info.self_connector != self.id {
            return Err(AttachError::invariant(format!(
                "record for {} registered on {}",
                info.self_connector, self.id
            )));
        }
        if self.is_occupied() {
            return Err(AttachError::invariant(format!(
                "{} is full ({} of {})",
                self.id,
                self.attachments.len(),
                self.capacity()
            )));
        }
        if self.is_attached_to(info.other_connector) {
            return Err(AttachError::invariant(format!(
                "{} already attached to {}",
                self.id, info.other_connector
            )));
        }
        self.attachments.push(info);
        Ok(())
    }

    /// Remove the record of the edge to `other` and return it.
    pub(crate) fn register_detachment(
        &mut self,
        other: ConnectorId,
    ) -> AttachResult<AttachmentInfo> {
        let index = self
            .attachments
            .iter()
            .position(|info| info.other_connector == other)
            .ok_or_else(|| {
                AttachError::invariant(format!("{} has no edge to {other}", self.id))
            })?;
        Ok(self.attachments.remove(index))
    }

    /// Replace the record of the edge to `other` in place.
    pub(crate) fn replace_attachment(&mut self, info: AttachmentInfo) -> AttachResult<()> {
        let slot = self
            .attachments
            .iter_mut()
            .find(|existing| existing.other_connector == info.other_connector)
            .ok_or_else(|| {
                AttachError::invariant(format!(
                    "{} has no edge to {}",
                    self.id, info.other_connector
                ))
            })?;
        *slot = info;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use attach_types::{AttachmentKind, Bond, NodeId};

    fn port(node: u64) -> Connector {
        let spec = ConnectorSpec::port(Layer::wrapping(0));
        Connector::from_spec(
            ConnectorId::new(NodeId::new(node), 0),
            &spec,
            LayerOptions::default(),
        )
    }

    fn record(from: ConnectorId, to: ConnectorId) -> AttachmentInfo {
        AttachmentInfo {
            self_connector: from,
            other_connector: to,
            kind: AttachmentKind::PortToPort,
            initiator: from,
            relative: Pose::identity(),
            bond: Bond::Logical,
        }
    }

    #[test]
    fn test_port_capacity() {
        let mut a = port(1);
        let b = port(2);
        assert!(a.is_accepting(LifecycleMode::FreeConnections));

        a.register_attachment(record(a.id(), b.id())).unwrap();
        assert!(a.is_occupied());
        assert_eq!(
            a.not_accepting_reason(LifecycleMode::FreeConnections),
            Some(NotAcceptingReason::Occupied)
        );

        let err = a
            .register_attachment(record(a.id(), ConnectorId::new(NodeId::new(3), 0)))
            .err();
        assert!(err.is_some_and(|e| e.is_invariant_violation()));
        assert_eq!(a.attachments().len(), 1);
    }

    #[test]
    fn test_accepting_reasons_in_order() {
        let mut a = port(1);
        assert_eq!(
            a.not_accepting_reason(LifecycleMode::Attached),
            Some(NotAcceptingReason::Mode(LifecycleMode::Attached))
        );
        a.set_active(false);
        assert_eq!(
            a.not_accepting_reason(LifecycleMode::Attached),
            Some(NotAcceptingReason::Inactive)
        );
    }

    #[test]
    fn test_attachment_info_lookup() {
        let mut a = port(1);
        let b = port(2);
        assert!(a.attachment_info(b.id()).is_none());

        a.register_attachment(record(a.id(), b.id())).unwrap();
        let info = a.attachment_info(b.id());
        assert_eq!(info.other_connector, b.id());

        let removed = a.register_detachment(b.id());
        assert!(removed.is_ok());
        assert!(a.attachment_info(b.id()).is_none());
        assert!(a.register_detachment(b.id()).is_err());
    }

    #[test]
    fn test_foreign_record_rejected() {
        let mut a = port(1);
        let b = port(2);
        let result = a.register_attachment(record(b.id(), a.id()));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_survive_reinitialize() {
        let spec = ConnectorSpec::surface(Layer::wrapping(1), 3)
            .with_options(ConnectorOptions::new().with_influence_radius(2.0));
        let mut c = Connector::from_spec(
            ConnectorId::new(NodeId::new(1), 0),
            &spec,
            LayerOptions::default(),
        );
        assert_eq!(c.options().influence_radius, 2.0);

        c.reinitialize(LayerOptions::default().with_influence_radius(9.0).with_separation_impulse(1.0));
        assert_eq!(c.options().influence_radius, 2.0);
        assert_eq!(c.options().separation_impulse, 1.0);
    }

    #[test]
    fn test_fixed_never_attachable() {
        let spec = ConnectorSpec::fixed(Layer::wrapping(0));
        let c = Connector::from_spec(
            ConnectorId::new(NodeId::new(1), 0),
            &spec,
            LayerOptions::default(),
        );
        assert!(!c.is_attachable());
        assert!(c.is_occupied());
    }
}
