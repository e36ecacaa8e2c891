//! Attachment records: one committed edge of the attachment graph, as seen
//! from one of its two connectors.

use crate::body::Pose;
use crate::ids::{ConnectorId, JointId};
use crate::kind::AttachmentKind;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How an edge is realized in the physics service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Bond {
    /// Both nodes share one welded body.
    Weld,
    /// Separate bodies linked by a physics joint.
    Joint(JointId),
    /// No physical link (a node has no body).
    #[default]
    Logical,
}

impl Bond {
    /// Whether this edge merges bodies.
    #[must_use]
    pub const fn is_weld(self) -> bool {
        matches!(self, Self::Weld)
    }

    /// The joint handle, if jointed.
    #[must_use]
    pub const fn joint(self) -> Option<JointId> {
        match self {
            Self::Joint(id) => Some(id),
            _ => None,
        }
    }
}

/// One edge of the attachment graph from the perspective of `self_connector`.
///
/// Both connectors of an edge hold a record; the two records are mirror
/// images of each other (see [`AttachmentInfo::mirrored`]). The initiator is
/// the connector that proposed the attachment; its node is the child in the
/// tree.
///
/// A record of kind [`AttachmentKind::None`] means "no attachment" and all
/// such records compare equal.
///
/// # Example
///
/// ```
/// use attach_types::{AttachmentInfo, AttachmentKind, ConnectorId, NodeId};
///
/// let a = ConnectorId::new(NodeId::new(1), 0);
/// let b = ConnectorId::new(NodeId::new(2), 0);
///
/// assert!(AttachmentInfo::none(a).is_none());
/// assert_eq!(AttachmentInfo::none(a), AttachmentInfo::none(b));
/// ```
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttachmentInfo {
    /// Connector holding this record.
    pub self_connector: ConnectorId,
    /// Connector on the other side of the edge.
    pub other_connector: ConnectorId,
    /// Relationship kind.
    pub kind: AttachmentKind,
    /// Connector that initiated the attachment.
    pub initiator: ConnectorId,
    /// Other connector's frame expressed in this connector's frame, at commit.
    pub relative: Pose,
    /// Physical realization.
    pub bond: Bond,
}

impl AttachmentInfo {
    /// The "no attachment" record for a connector.
    #[must_use]
    pub fn none(self_connector: ConnectorId) -> Self {
        Self {
            self_connector,
            other_connector: self_connector,
            kind: AttachmentKind::None,
            initiator: self_connector,
            relative: Pose::identity(),
            bond: Bond::Logical,
        }
    }

    /// Whether this record denotes "no attachment".
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.kind.is_none()
    }

    /// Whether the holding connector initiated the attachment.
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        !self.is_none() && self.initiator == self.self_connector
    }

    /// The initiating (child-side) connector.
    #[must_use]
    pub const fn child_connector(&self) -> ConnectorId {
        self.initiator
    }

    /// The non-initiating (parent-side) connector.
    #[must_use]
    pub fn parent_connector(&self) -> ConnectorId {
        if self.initiator == self.self_connector {
            self.other_connector
        } else {
            self.self_connector
        }
    }

    /// Whether the edge touches `connector`.
    #[must_use]
    pub fn involves(&self, connector: ConnectorId) -> bool {
        !self.is_none() && (self.self_connector == connector || self.other_connector == connector)
    }

    /// The same edge from the other connector's perspective.
    #[must_use]
    pub fn mirrored(&self) -> Self {
        if self.is_none() {
            return *self;
        }
        Self {
            self_connector: self.other_connector,
            other_connector: self.self_connector,
            kind: self.kind,
            initiator: self.initiator,
            relative: self.relative.inverse(),
            bond: self.bond,
        }
    }

    /// Replace the bond (builder pattern).
    #[must_use]
    pub fn with_bond(mut self, bond: Bond) -> Self {
        self.bond = bond;
        self
    }
}

impl PartialEq for AttachmentInfo {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_none(), other.is_none()) {
            (true, true) => true,
            (false, false) => {
                self.self_connector == other.self_connector
                    && self.other_connector == other.other_connector
                    && self.kind == other.kind
                    && self.initiator == other.initiator
                    && self.relative == other.relative
                    && self.bond == other.bond
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeId;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn edge() -> AttachmentInfo {
        let child = ConnectorId::new(NodeId::new(1), 0);
        let parent = ConnectorId::new(NodeId::new(2), 3);
        AttachmentInfo {
            self_connector: child,
            other_connector: parent,
            kind: AttachmentKind::PortToSurface,
            initiator: child,
            relative: Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
            bond: Bond::Weld,
        }
    }

    #[test]
    fn test_initiator_sides() {
        let info = edge();
        assert!(info.is_initiator());
        assert_eq!(info.child_connector(), info.self_connector);
        assert_eq!(info.parent_connector(), info.other_connector);

        let mirror = info.mirrored();
        assert!(!mirror.is_initiator());
        assert_eq!(mirror.child_connector(), info.self_connector);
        assert_eq!(mirror.parent_connector(), info.other_connector);
    }

    #[test]
    fn test_mirrored_geometry() {
        let info = edge();
        let mirror = info.mirrored();
        assert_relative_eq!(
            mirror.relative.position.coords,
            Vector3::new(0.0, 0.0, -1.0),
            epsilon = 1e-12
        );
        assert_eq!(mirror.mirrored(), info);
    }

    #[test]
    fn test_none_equality() {
        let info = edge();
        let none = AttachmentInfo::none(info.self_connector);
        assert_ne!(info, none);
        assert!(!none.involves(info.self_connector));
    }

    #[test]
    fn test_bond_queries() {
        assert!(Bond::Weld.is_weld());
        assert_eq!(Bond::Joint(JointId::new(4)).joint(), Some(JointId::new(4)));
        assert_eq!(Bond::Logical.joint(), None);
    }
}
