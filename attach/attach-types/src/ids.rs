//! Identifier types.
//!
//! Every handle in the attachment graph is a small `Copy` id. Nodes live in an
//! arena keyed by [`NodeId`]; connectors are addressed by their owning node and
//! their position in that node's connector list, so a [`ConnectorId`] stays
//! valid for as long as the node does.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! raw_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new id from its raw value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw id value.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }
    };
}

raw_id!(
    /// Unique identifier for a node (one part instance) in the attachment graph.
    NodeId,
    "Node"
);

raw_id!(
    /// Handle to a rigid body owned by the physics service.
    BodyId,
    "Body"
);

raw_id!(
    /// Handle to a joint owned by the physics service.
    JointId,
    "Joint"
);

raw_id!(
    /// Identifier of a welded group (nodes sharing one merged rigid body).
    WeldGroupId,
    "WeldGroup"
);

raw_id!(
    /// Identifier of a symmetry group (nodes whose operations are mirrored).
    SymmetryGroupId,
    "SymmetryGroup"
);

raw_id!(
    /// Identifier of a registered lifecycle listener.
    ListenerId,
    "Listener"
);

/// Address of a connector: its owning node plus its index in that node's
/// connector list.
///
/// The index is part of the external reference, so connector lists are
/// append-only for the lifetime of a node.
///
/// # Example
///
/// ```
/// use attach_types::{ConnectorId, NodeId};
///
/// let id = ConnectorId::new(NodeId::new(3), 1);
/// assert_eq!(id.node, NodeId::new(3));
/// assert_eq!(id.to_string(), "Node(3)#1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectorId {
    /// Owning node.
    pub node: NodeId,
    /// Position in the owning node's connector list.
    pub index: usize,
}

impl ConnectorId {
    /// Create a connector address.
    #[must_use]
    pub const fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }

    /// The connector at the same index on another node.
    ///
    /// Used when replaying an operation onto a symmetric sibling.
    #[must_use]
    pub const fn on(self, node: NodeId) -> Self {
        Self {
            node,
            index: self.index,
        }
    }
}

impl std::fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.node, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_ids() {
        let id = NodeId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.to_string(), "Node(42)");

        let body: BodyId = 7.into();
        assert_eq!(body, BodyId(7));
        assert_eq!(body.to_string(), "Body(7)");
        assert_eq!(WeldGroupId::new(2).to_string(), "WeldGroup(2)");
    }

    #[test]
    fn test_connector_on_sibling() {
        let id = ConnectorId::new(NodeId::new(1), 4);
        let sibling = id.on(NodeId::new(9));
        assert_eq!(sibling.node, NodeId::new(9));
        assert_eq!(sibling.index, 4);
    }

    #[test]
    fn test_connector_ordering() {
        let a = ConnectorId::new(NodeId::new(1), 2);
        let b = ConnectorId::new(NodeId::new(2), 0);
        assert!(a < b);
    }
}
