//! Error types for attachment operations.

use thiserror::Error;

use crate::ids::{ConnectorId, NodeId};
use crate::mode::LifecycleMode;

/// Result type for attachment operations.
pub type AttachResult<T> = Result<T, AttachError>;

/// Why a proposed attachment was rejected.
///
/// Variants are listed in the order the rules are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// One of the connectors is a structural variant that never attaches.
    NotAttachable,
    /// The two variants cannot form an edge (surface to surface).
    IncompatibleKinds,
    /// The target is not accepting new attachments.
    NotAccepting(NotAcceptingReason),
    /// The target does not accept the initiator's layer.
    LayerNotAccepted,
    /// The target's node is the initiator's node or one of its descendants.
    WouldCreateCycle,
    /// The initiator has no free slot, even after releasing its current parent.
    InitiatorOccupied,
}

/// Detail for [`Rejection::NotAccepting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotAcceptingReason {
    /// Connector is deactivated.
    Inactive,
    /// Connector holds as many attachments as its capacity allows.
    Occupied,
    /// The owning node's lifecycle mode does not accept proposals.
    Mode(LifecycleMode),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAttachable => f.write_str("connector is not attachable"),
            Self::IncompatibleKinds => f.write_str("connector kinds cannot form an edge"),
            Self::NotAccepting(NotAcceptingReason::Inactive) => {
                f.write_str("target connector is inactive")
            }
            Self::NotAccepting(NotAcceptingReason::Occupied) => {
                f.write_str("target connector is occupied")
            }
            Self::NotAccepting(NotAcceptingReason::Mode(mode)) => {
                write!(f, "target node is in mode {mode}")
            }
            Self::LayerNotAccepted => f.write_str("target does not accept the initiator's layer"),
            Self::WouldCreateCycle => f.write_str("attachment would create a cycle"),
            Self::InitiatorOccupied => f.write_str("initiator connector has no free slot"),
        }
    }
}

/// Errors that can occur during attachment operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttachError {
    /// A proposal failed validation. Nothing was mutated.
    #[error("attachment rejected: {0}")]
    Rejected(Rejection),

    /// Node handle does not refer to a live node.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Connector handle does not refer to a live connector.
    #[error("unknown connector: {0}")]
    UnknownConnector(ConnectorId),

    /// The node has no rigid body to act on.
    #[error("{0} has no rigid body")]
    MissingBody(NodeId),

    /// A caller bypassed validation or the graph is inconsistent.
    #[error("invariant violation: {reason}")]
    InvariantViolation {
        /// Description of the violated invariant.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },
}

impl AttachError {
    /// Create an invariant violation error.
    #[must_use]
    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// The rejection, if this is a validation failure.
    #[must_use]
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Rejected(rejection) => Some(*rejection),
            _ => None,
        }
    }

    /// Check if this is a validation failure.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Check if this is an invariant violation.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

impl From<Rejection> for AttachError {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AttachError::Rejected(Rejection::WouldCreateCycle);
        assert!(err.to_string().contains("cycle"));

        let err = AttachError::Rejected(Rejection::NotAccepting(NotAcceptingReason::Mode(
            LifecycleMode::Attached,
        )));
        assert!(err.to_string().contains("attached"));

        let err = AttachError::UnknownNode(NodeId::new(9));
        assert!(err.to_string().contains("Node(9)"));
    }

    #[test]
    fn test_error_predicates() {
        let err: AttachError = Rejection::LayerNotAccepted.into();
        assert!(err.is_rejection());
        assert_eq!(err.rejection(), Some(Rejection::LayerNotAccepted));
        assert!(!err.is_invariant_violation());

        let err = AttachError::invariant("record missing");
        assert!(err.is_invariant_violation());
        assert_eq!(err.rejection(), None);
    }
}
