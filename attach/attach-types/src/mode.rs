//! Node lifecycle modes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a node is in its attachment lifecycle.
///
/// `FreeConnections` and `Attached` are the steady states: a node settles into
/// `Attached` when it has a parent edge and `FreeConnections` when it does not.
/// The other modes are set by the placement process (or transiently by a
/// commit) and are cleared when the operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LifecycleMode {
    /// Unattached; connectors open for proposals.
    #[default]
    FreeConnections,
    /// Targeted by an in-progress placement.
    AcceptingAttachments,
    /// Mid-transition; connectors temporarily locked.
    BeingAttached,
    /// Spawned but not yet part of any live simulation.
    Inactive,
    /// Part of a tree with a parent.
    Attached,
}

impl LifecycleMode {
    /// Whether connectors on a node in this mode accept new attachments.
    #[must_use]
    pub const fn accepts_proposals(self) -> bool {
        matches!(self, Self::FreeConnections | Self::AcceptingAttachments)
    }

    /// Whether this mode is transient (owned by an in-flight operation).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::AcceptingAttachments | Self::BeingAttached)
    }

    /// The steady mode for a node that does or does not have a parent.
    ///
    /// `Inactive` is sticky: only an explicit mode change leaves it.
    #[must_use]
    pub const fn settled(self, has_parent: bool) -> Self {
        match self {
            Self::Inactive => Self::Inactive,
            _ if has_parent => Self::Attached,
            _ => Self::FreeConnections,
        }
    }

    /// Get a human-readable name for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FreeConnections => "free_connections",
            Self::AcceptingAttachments => "accepting_attachments",
            Self::BeingAttached => "being_attached",
            Self::Inactive => "inactive",
            Self::Attached => "attached",
        }
    }
}

impl std::fmt::Display for LifecycleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_proposals() {
        assert!(LifecycleMode::FreeConnections.accepts_proposals());
        assert!(LifecycleMode::AcceptingAttachments.accepts_proposals());
        assert!(!LifecycleMode::BeingAttached.accepts_proposals());
        assert!(!LifecycleMode::Inactive.accepts_proposals());
        assert!(!LifecycleMode::Attached.accepts_proposals());
    }

    #[test]
    fn test_settled() {
        assert_eq!(
            LifecycleMode::AcceptingAttachments.settled(true),
            LifecycleMode::Attached
        );
        assert_eq!(
            LifecycleMode::BeingAttached.settled(false),
            LifecycleMode::FreeConnections
        );
        assert_eq!(LifecycleMode::Inactive.settled(true), LifecycleMode::Inactive);
    }
}
