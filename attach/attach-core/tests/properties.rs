//! Property-based tests for the attachment graph.
//!
//! Random sequences of attach, detach and remove operations are applied to
//! a small population of parts; after every step the graph must stay a
//! consistent forest with conserved mass.
//!
//! Run with: cargo test -p attach-core -- properties

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use attach_core::{
    AttachmentGraph, ConnectorId, ConnectorSpec, DetachMode, Layer, LifecycleMode,
    MassProperties, NodeId, NodeSpec, Pose, SimplePhysics,
};
use nalgebra::Point3;
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    /// Attach part `child`'s port (or surface) to part `parent`'s surface
    /// (or port).
    Attach {
        child: usize,
        parent: usize,
        from_surface: bool,
        to_port: bool,
    },
    Detach {
        node: usize,
        subtree: bool,
    },
    Remove {
        node: usize,
    },
}

fn arb_op(parts: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..parts, 0..parts, any::<bool>(), any::<bool>()).prop_map(
            |(child, parent, from_surface, to_port)| Op::Attach {
                child,
                parent,
                from_surface,
                to_port,
            }
        ),
        3 => (0..parts, any::<bool>()).prop_map(|(node, subtree)| Op::Detach { node, subtree }),
        1 => (0..parts).prop_map(|node| Op::Remove { node }),
    ]
}

/// Part masses and whether each part welds.
fn arb_parts() -> impl Strategy<Value = Vec<(f64, bool)>> {
    prop::collection::vec((0.1..10.0f64, prop::bool::weighted(0.8)), 2..8)
}

fn build(parts: &[(f64, bool)]) -> (AttachmentGraph, SimplePhysics, Vec<NodeId>) {
    let mut physics = SimplePhysics::new();
    let mut graph = AttachmentGraph::new();
    let layer = Layer::wrapping(0);
    let ids = parts
        .iter()
        .enumerate()
        .map(|(i, &(mass, weld))| {
            let mut spec = NodeSpec::new(format!("part{i}"))
                .at(Pose::from_position(Point3::new(i as f64, 0.0, 0.0)))
                .with_mass(MassProperties::sphere(mass, 0.2))
                .with_connector(ConnectorSpec::port(layer))
                .with_connector(ConnectorSpec::surface(layer, 2));
            if !weld {
                spec = spec.without_weld();
            }
            graph.add_node(spec, &mut physics).unwrap()
        })
        .collect();
    (graph, physics, ids)
}

fn apply(graph: &mut AttachmentGraph, physics: &mut SimplePhysics, ids: &[NodeId], op: Op) {
    let result = match op {
        Op::Attach {
            child,
            parent,
            from_surface,
            to_port,
        } => {
            let (child, parent) = (ids[child], ids[parent]);
            if !graph.contains_node(child) || !graph.contains_node(parent) {
                return;
            }
            let initiator = ConnectorId::new(child, usize::from(from_surface));
            let target = ConnectorId::new(parent, usize::from(!to_port));
            graph
                .set_mode(parent, LifecycleMode::AcceptingAttachments)
                .unwrap();
            graph.attach(initiator, target, physics).map(|_| ())
        }
        Op::Detach { node, subtree } => {
            if !graph.contains_node(ids[node]) {
                return;
            }
            let mode = if subtree {
                DetachMode::Subtree
            } else {
                DetachMode::SingleEdge
            };
            graph.detach(ids[node], mode, physics).map(|_| ())
        }
        Op::Remove { node } => {
            if !graph.contains_node(ids[node]) {
                return;
            }
            graph.remove_node(ids[node], physics)
        }
    };

    if let Err(err) = result {
        assert!(err.is_rejection(), "unexpected error for {op:?}: {err}");
    }
}

fn total_node_mass(graph: &AttachmentGraph) -> f64 {
    graph.nodes().map(|n| n.mass().mass).sum()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The graph stays a consistent forest under any operation sequence.
    #[test]
    fn properties_graph_stays_consistent(
        parts in arb_parts(),
        ops in prop::collection::vec(arb_op(8), 1..40),
    ) {
        let (mut graph, mut physics, ids) = build(&parts);

        for op in ops {
            let op = match op {
                Op::Attach { child, parent, from_surface, to_port } => Op::Attach {
                    child: child % ids.len(),
                    parent: parent % ids.len(),
                    from_surface,
                    to_port,
                },
                Op::Detach { node, subtree } => Op::Detach { node: node % ids.len(), subtree },
                Op::Remove { node } => Op::Remove { node: node % ids.len() },
            };
            apply(&mut graph, &mut physics, &ids, op);

            let report = graph.check_integrity();
            prop_assert!(report.is_valid(), "{} after {:?}: {:?}", report.summary(), op, report);

            // Every parent chain ends at a root.
            for id in graph.node_ids() {
                prop_assert!(graph.tree_root(id).is_ok());
                prop_assert!(!graph.is_descendant_of(id, id));
            }

            // Every record has its mirror and no connector overflows.
            for node in graph.nodes() {
                for connector in node.connectors() {
                    prop_assert!(connector.attachments().len() <= connector.capacity());
                    for info in connector.attachments() {
                        let other = graph.connector(info.other_connector).unwrap();
                        prop_assert!(other.is_attached_to(info.self_connector));
                    }
                }
            }

            let expected = total_node_mass(&graph);
            let simulated = graph.total_simulated_mass();
            prop_assert!(
                (simulated - expected).abs() <= 1e-9 * expected.max(1.0),
                "simulated {} vs nodes {}", simulated, expected
            );
        }
    }

    /// Detaching every node leaves no edges and no weld groups behind.
    #[test]
    fn properties_full_teardown(
        parts in arb_parts(),
        ops in prop::collection::vec(arb_op(8), 1..30),
    ) {
        let (mut graph, mut physics, ids) = build(&parts);
        for op in ops {
            if let Op::Attach { child, parent, from_surface, to_port } = op {
                apply(&mut graph, &mut physics, &ids, Op::Attach {
                    child: child % ids.len(),
                    parent: parent % ids.len(),
                    from_surface,
                    to_port,
                });
            }
        }

        for &id in &ids {
            graph.detach_single(id, DetachMode::SingleEdge, &mut physics).unwrap();
        }

        prop_assert_eq!(graph.weld_group_count(), 0);
        prop_assert_eq!(graph.roots().len(), ids.len());
        prop_assert_eq!(physics.joint_count(), 0);
        prop_assert_eq!(physics.enabled_body_count(), ids.len());
        prop_assert!(graph.check_integrity().is_valid());
    }
}
