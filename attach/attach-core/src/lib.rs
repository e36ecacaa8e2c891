//! Connector attachment graph engine.
//!
//! Joins independently modeled parts into composite rigid objects through
//! typed connectors, and takes them apart again:
//!
//! - [`AttachmentGraph`] - node arena, tree queries, proximity queries
//! - [`Proposal`] - validate, then commit, an attachment
//! - [`WeldGroup`] - nodes sharing one merged rigid body
//! - [`SymmetryGroup`] - siblings that replay each other's operations
//! - [`AttachmentObserver`] - before/after lifecycle events per node
//! - [`PhysicsService`] - the rigid-body seam, with [`SimplePhysics`]
//!
//! # Layer 1
//!
//! Built on the pure data types of `attach-types`. The engine owns no
//! simulation loop: hosts drive it between physics steps and pass their
//! physics service to every operation that touches bodies.
//!
//! # Example
//!
//! ```
//! use attach_core::{AttachmentGraph, ConnectorSpec, DetachMode, NodeSpec, SimplePhysics};
//! use attach_types::{ConnectorId, Layer, MassProperties};
//!
//! # fn main() -> attach_types::AttachResult<()> {
//! let mut physics = SimplePhysics::new();
//! let mut graph = AttachmentGraph::new();
//! let layer = Layer::wrapping(0);
//!
//! let core = graph.add_node(
//!     NodeSpec::new("core")
//!         .with_mass(MassProperties::point_mass(4.0))
//!         .with_connector(ConnectorSpec::surface(layer, 4)),
//!     &mut physics,
//! )?;
//! let pod = graph.add_node(
//!     NodeSpec::new("pod").with_connector(ConnectorSpec::port(layer)),
//!     &mut physics,
//! )?;
//!
//! graph.attach(ConnectorId::new(pod, 0), ConnectorId::new(core, 0), &mut physics)?;
//! assert_eq!(graph.weld_group_count(), 1);
//! assert!((graph.total_simulated_mass() - 5.0).abs() < 1e-12);
//!
//! let outcome = graph.detach(pod, DetachMode::SingleEdge, &mut physics)?;
//! assert!(outcome.is_detached());
//! assert_eq!(graph.weld_group_count(), 0);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
)]

mod connector;
mod graph;
mod integrity;
mod listener;
mod node;
mod physics;
mod protocol;
mod registry;
mod symmetry;
mod weld;

pub use connector::{Connector, ConnectorSpec};
pub use graph::{AttachmentGraph, Diagnostic, DiagnosticKind};
pub use integrity::IntegrityReport;
pub use listener::{AttachmentObserver, LifecycleEvent, ListenerScope};
pub use node::{BodySource, Edge, Node, NodeSpec};
pub use physics::{PhysicsService, SimBody, SimJoint, SimplePhysics};
pub use protocol::{CommitReport, DetachMode, DetachOutcome, Proposal, ProposalState};
pub use registry::{Candidate, ConnectorRegistry, ProximityQuery};
pub use symmetry::{SymmetryFailure, SymmetryGroup, SymmetryPlan, SymmetryReport};
pub use weld::WeldGroup;

// Re-export key types from attach-types for convenience
pub use attach_types::{
    AttachError, AttachResult, AttachmentInfo, AttachmentKind, BodyId, Bond, BondPolicy,
    ConnectorId, ConnectorKind, ConnectorOptions, JointId, Layer, LayerMask, LayerOptions,
    LayerSettings, LifecycleMode, ListenerId, MassProperties, NodeId, NotAcceptingReason, Pose,
    Rejection, RigidBodyState, SettingsStore, SymmetryGroupId, Twist, WeldGroupId,
};
