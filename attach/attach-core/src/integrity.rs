//! Graph integrity checking.
//!
//! Walks the whole arena and reports every structural inconsistency it
//! finds. A graph only mutated through the public operations always
//! checks clean.

use attach_types::{ConnectorId, NodeId, WeldGroupId};
use hashbrown::HashSet;

use crate::graph::AttachmentGraph;

/// Tolerance for comparing a group's cached mass with its members' sum.
const MASS_TOLERANCE: f64 = 1e-9;

/// Result of [`AttachmentGraph::check_integrity`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    /// Records without a matching record on the other connector
    /// (holder, other).
    pub asymmetric_edges: Vec<(ConnectorId, ConnectorId)>,

    /// Connectors holding more records than their capacity (connector, count).
    pub capacity_overflows: Vec<(ConnectorId, usize)>,

    /// Parent or child edges that disagree with the records (node, detail).
    pub tree_mismatches: Vec<(NodeId, String)>,

    /// Nodes whose parent chain does not terminate.
    pub cycles: Vec<NodeId>,

    /// Welded group inconsistencies (node or group, detail).
    pub weld_mismatches: Vec<(Option<WeldGroupId>, String)>,

    /// Active connectors missing from the registry, or inactive ones in it.
    pub registry_mismatches: Vec<ConnectorId>,
}

impl IntegrityReport {
    /// Create a new empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the graph is consistent (no issues found).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issue_count() == 0
    }

    /// Get the total number of issues found.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.asymmetric_edges.len()
            + self.capacity_overflows.len()
            + self.tree_mismatches.len()
            + self.cycles.len()
            + self.weld_mismatches.len()
            + self.registry_mismatches.len()
    }

    /// Get a summary of issues as a string.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return "Graph is consistent".to_string();
        }

        let counts = [
            (self.asymmetric_edges.len(), "asymmetric edge(s)"),
            (self.capacity_overflows.len(), "capacity overflow(s)"),
            (self.tree_mismatches.len(), "tree mismatch(es)"),
            (self.cycles.len(), "cycle(s)"),
            (self.weld_mismatches.len(), "weld mismatch(es)"),
            (self.registry_mismatches.len(), "registry mismatch(es)"),
        ];
        let issues: Vec<String> = counts
            .iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, label)| format!("{n} {label}"))
            .collect();

        format!("Integrity check failed: {}", issues.join(", "))
    }
}

impl AttachmentGraph {
    /// Check every structural invariant of the graph.
    #[must_use]
    pub fn check_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::new();
        self.check_edges(&mut report);
        self.check_tree(&mut report);
        self.check_welds(&mut report);
        self.check_registry(&mut report);
        report
    }

    fn check_edges(&self, report: &mut IntegrityReport) {
        for node in self.nodes.values() {
            for connector in node.connectors() {
                let count = connector.attachments().len();
                if count > connector.capacity() {
                    report.capacity_overflows.push((connector.id(), count));
                }
                for info in connector.attachments() {
                    let symmetric = self.connector(info.other_connector).is_some_and(|other| {
                        let back = other.attachment_info(connector.id());
                        !back.is_none()
                            && back.kind == info.kind
                            && back.initiator == info.initiator
                            && back.bond == info.bond
                    });
                    if !symmetric {
                        report
                            .asymmetric_edges
                            .push((connector.id(), info.other_connector));
                    }
                }
            }
        }
    }

    fn check_tree(&self, report: &mut IntegrityReport) {
        for node in self.nodes.values() {
            if self.tree_root(node.id()).is_err() {
                report.cycles.push(node.id());
            }

            if let Some(edge) = node.parent_edge() {
                let info = self
                    .connector(edge.local)
                    .map(|c| c.attachment_info(edge.remote));
                if !info.is_some_and(|i| i.is_initiator()) {
                    report.tree_mismatches.push((
                        node.id(),
                        format!(
                            "parent edge {} -> {} has no initiator record",
                            edge.local, edge.remote
                        ),
                    ));
                }
                let listed = self
                    .node(edge.remote_node())
                    .is_some_and(|p| p.child_edges().iter().any(|e| e.remote == edge.local));
                if !listed {
                    report.tree_mismatches.push((
                        node.id(),
                        format!("parent {} does not list it as a child", edge.remote_node()),
                    ));
                }
            }

            for edge in node.child_edges() {
                let back = self
                    .node(edge.remote_node())
                    .and_then(|c| c.parent_edge());
                if back.is_none_or(|b| b.local != edge.remote || b.remote != edge.local) {
                    report.tree_mismatches.push((
                        node.id(),
                        format!("child {} does not point back", edge.remote_node()),
                    ));
                }
            }

            let records: usize = node.connectors().iter().map(|c| c.attachments().len()).sum();
            let edges = node.child_edges().len() + usize::from(node.parent_edge().is_some());
            if records != edges {
                report.tree_mismatches.push((
                    node.id(),
                    format!("{records} record(s) but {edges} tree edge(s)"),
                ));
            }
        }
    }

    fn check_welds(&self, report: &mut IntegrityReport) {
        for group in self.groups.values() {
            let mut mass = 0.0_f64;
            for &member in group.members() {
                match self.node(member) {
                    Some(n) if n.weld_group() == Some(group.id()) => {
                        mass += n.mass().mass;
                        if n.effective_body() != Some(group.body()) {
                            report.weld_mismatches.push((
                                Some(group.id()),
                                format!("{member} does not resolve to the group body"),
                            ));
                        }
                    }
                    _ => report.weld_mismatches.push((
                        Some(group.id()),
                        format!("member {member} is missing or points elsewhere"),
                    )),
                }
            }
            if (mass - group.mass()).abs() > MASS_TOLERANCE * mass.abs().max(1.0) {
                report.weld_mismatches.push((
                    Some(group.id()),
                    format!("cached mass {} but members sum to {mass}", group.mass()),
                ));
            }
            if group.len() < 2 {
                report
                    .weld_mismatches
                    .push((Some(group.id()), "group with fewer than two members".to_string()));
            }
        }

        for node in self.nodes.values() {
            match node.weld_group() {
                Some(id) => {
                    if !self.groups.get(&id).is_some_and(|g| g.contains(node.id())) {
                        report
                            .weld_mismatches
                            .push((Some(id), format!("{} not listed by its group", node.id())));
                    }
                }
                None if node.effective_body() != node.own_body() => {
                    report.weld_mismatches.push((
                        None,
                        format!("{} ungrouped but not on its own body", node.id()),
                    ));
                }
                None => {}
            }

            let weld_edges = node
                .parent_edge()
                .into_iter()
                .chain(node.child_edges().iter().copied());
            for edge in weld_edges {
                let welded = node
                    .connector(edge.local.index)
                    .is_some_and(|c| c.attachment_info(edge.remote).bond.is_weld());
                let other_group = self.node(edge.remote_node()).and_then(|n| n.weld_group());
                if welded && (node.weld_group().is_none() || node.weld_group() != other_group) {
                    report.weld_mismatches.push((
                        node.weld_group(),
                        format!("weld edge {} -> {} crosses groups", edge.local, edge.remote),
                    ));
                }
            }
        }
    }

    fn check_registry(&self, report: &mut IntegrityReport) {
        let mut active = HashSet::new();
        for node in self.nodes.values() {
            for connector in node.connectors() {
                let registered = self.registry.contains(connector.layer(), connector.id());
                if connector.is_active() {
                    active.insert(connector.id());
                }
                if registered != connector.is_active() {
                    report.registry_mismatches.push(connector.id());
                }
            }
        }
        if self.registry.len() != active.len() {
            let stale = self
                .registry
                .in_layers(attach_types::LayerMask::all())
                .filter(|id| !active.contains(id));
            report.registry_mismatches.extend(stale);
        }
    }
}
