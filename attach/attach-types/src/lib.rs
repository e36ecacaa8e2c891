//! Core types for the connector attachment graph.
//!
//! This crate provides the pure-data vocabulary shared by the attachment
//! engine and the systems around it:
//!
//! - [`NodeId`], [`ConnectorId`], [`BodyId`], [`JointId`] - handles
//! - [`Layer`] and [`LayerMask`] - which connectors may interact
//! - [`ConnectorKind`] and [`AttachmentKind`] - port, surface, fixed
//! - [`AttachmentInfo`] - one committed edge seen from one connector
//! - [`LifecycleMode`] - where a node is in its attachment lifecycle
//! - [`LayerOptions`] and [`SettingsStore`] - per-layer defaults
//! - [`Pose`], [`Twist`], [`MassProperties`], [`CombinedMass`] - body data
//!
//! # Layer 0
//!
//! These types are **pure data**. They have no graph behaviour and no
//! physics. The engine that validates, commits and welds attachments lives
//! in `attach-core`.
//!
//! # Coordinate System
//!
//! Right-handed, Z up. Connector frames point local +Z away from the node
//! that owns them.
//!
//! # Example
//!
//! ```
//! use attach_types::{AttachmentKind, ConnectorKind, Layer, LayerMask, LayerOptions};
//!
//! let structural = Layer::wrapping(0);
//! let options = LayerOptions::default()
//!     .with_accepted_layers(LayerMask::only(structural));
//!
//! assert!(options.accepted_layers.contains(structural));
//! assert_eq!(
//!     AttachmentKind::between(ConnectorKind::Port, ConnectorKind::surface(4)),
//!     Some(AttachmentKind::PortToSurface),
//! );
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
)]

mod attachment;
mod body;
mod config;
mod error;
mod ids;
mod kind;
mod layer;
mod mode;

pub use attachment::{AttachmentInfo, Bond};
pub use body::{CombinedMass, MassProperties, Pose, RigidBodyState, Twist};
pub use config::{BondPolicy, ConnectorOptions, LayerOptions, LayerSettings, SettingsStore};
pub use error::{AttachError, AttachResult, NotAcceptingReason, Rejection};
pub use ids::{BodyId, ConnectorId, JointId, ListenerId, NodeId, SymmetryGroupId, WeldGroupId};
pub use kind::{AttachmentKind, ConnectorKind};
pub use layer::{Layer, LayerMask};
pub use mode::LifecycleMode;

// Re-export math types for convenience
pub use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
