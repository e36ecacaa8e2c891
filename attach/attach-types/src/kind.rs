//! Connector and attachment kinds.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The closed set of connector variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectorKind {
    /// Single-slot attachment point.
    Port,
    /// Multi-slot attachment area.
    Surface {
        /// Maximum number of simultaneous attachments.
        capacity: usize,
    },
    /// Structural point used for rendering only; never attachable.
    Fixed,
}

impl ConnectorKind {
    /// Create a surface with the given capacity.
    #[must_use]
    pub const fn surface(capacity: usize) -> Self {
        Self::Surface { capacity }
    }

    /// Maximum number of attachment records this connector can hold.
    #[must_use]
    pub const fn capacity(self) -> usize {
        match self {
            Self::Port => 1,
            Self::Surface { capacity } => capacity,
            Self::Fixed => 0,
        }
    }

    /// Whether this variant can take part in a new edge.
    #[must_use]
    pub const fn is_attachable(self) -> bool {
        matches!(self, Self::Port | Self::Surface { .. })
    }

    /// Get a human-readable name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Port => "port",
            Self::Surface { .. } => "surface",
            Self::Fixed => "fixed",
        }
    }
}

/// Relationship kind recorded on an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttachmentKind {
    /// No attachment exists.
    #[default]
    None,
    /// Port attached to port.
    PortToPort,
    /// Port attached to surface (either side may be the initiator).
    PortToSurface,
}

impl AttachmentKind {
    /// The kind of edge two connector variants would form, if any.
    ///
    /// Surfaces only attach to ports; fixed connectors never attach.
    #[must_use]
    pub const fn between(a: ConnectorKind, b: ConnectorKind) -> Option<Self> {
        match (a, b) {
            (ConnectorKind::Port, ConnectorKind::Port) => Some(Self::PortToPort),
            (ConnectorKind::Port, ConnectorKind::Surface { .. })
            | (ConnectorKind::Surface { .. }, ConnectorKind::Port) => Some(Self::PortToSurface),
            _ => None,
        }
    }

    /// Whether this denotes "no attachment".
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity() {
        assert_eq!(ConnectorKind::Port.capacity(), 1);
        assert_eq!(ConnectorKind::surface(4).capacity(), 4);
        assert_eq!(ConnectorKind::Fixed.capacity(), 0);
    }

    #[test]
    fn test_attachable() {
        assert!(ConnectorKind::Port.is_attachable());
        assert!(ConnectorKind::surface(2).is_attachable());
        assert!(!ConnectorKind::Fixed.is_attachable());
    }

    #[test]
    fn test_kind_between() {
        let port = ConnectorKind::Port;
        let surface = ConnectorKind::surface(3);
        assert_eq!(
            AttachmentKind::between(port, port),
            Some(AttachmentKind::PortToPort)
        );
        assert_eq!(
            AttachmentKind::between(surface, port),
            Some(AttachmentKind::PortToSurface)
        );
        assert_eq!(AttachmentKind::between(surface, surface), None);
        assert_eq!(AttachmentKind::between(port, ConnectorKind::Fixed), None);
    }
}
