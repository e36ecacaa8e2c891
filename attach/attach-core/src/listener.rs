//! Lifecycle listeners.
//!
//! Components that care about attachment changes on a node implement
//! [`AttachmentObserver`] and register with
//! [`AttachmentGraph::register_listener`](crate::AttachmentGraph::register_listener).
//! Each connector keeps a snapshot of the listener ids interested in it, so
//! dispatch touches only those listeners.

use std::fmt;

use attach_types::{AttachmentInfo, ConnectorId, ListenerId, NodeId};
use hashbrown::HashMap;

use crate::graph::AttachmentGraph;

/// The four lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Before any structural change of an attach.
    BeforeAttachment,
    /// After an attach, welded groups included.
    AfterAttachment,
    /// Before any structural change of a detach.
    BeforeDetachment,
    /// After a detach, welded groups included.
    AfterDetachment,
}

impl LifecycleEvent {
    /// Get a human-readable name for the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeAttachment => "before_attachment",
            Self::AfterAttachment => "after_attachment",
            Self::BeforeDetachment => "before_detachment",
            Self::AfterDetachment => "after_detachment",
        }
    }
}

/// Receives attachment lifecycle events for one node.
///
/// `info` is the edge seen from the connector on the listener's node.
/// Listeners get read access to the graph: before-events see the state
/// prior to the change, after-events the fully updated state.
pub trait AttachmentObserver {
    /// An edge on this node is about to be created.
    ///
    /// A jointed edge reports [`Bond::Logical`](attach_types::Bond::Logical) here; its
    /// joint is created after the before-events.
    fn before_attachment(&mut self, graph: &AttachmentGraph, info: &AttachmentInfo) {
        let _ = (graph, info);
    }

    /// An edge on this node was created.
    fn after_attachment(&mut self, graph: &AttachmentGraph, info: &AttachmentInfo) {
        let _ = (graph, info);
    }

    /// An edge on this node is about to be removed.
    fn before_detachment(&mut self, graph: &AttachmentGraph, info: &AttachmentInfo) {
        let _ = (graph, info);
    }

    /// An edge on this node was removed.
    fn after_detachment(&mut self, graph: &AttachmentGraph, info: &AttachmentInfo) {
        let _ = (graph, info);
    }
}

/// Which connectors of its node a listener hears about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerScope {
    /// Every connector of the node.
    #[default]
    Node,
    /// A single connector.
    Connector(usize),
}

impl ListenerScope {
    /// Whether a connector index falls in scope.
    #[must_use]
    pub const fn covers(self, index: usize) -> bool {
        match self {
            Self::Node => true,
            Self::Connector(i) => i == index,
        }
    }
}

pub(crate) struct ListenerEntry {
    pub(crate) id: ListenerId,
    pub(crate) scope: ListenerScope,
    pub(crate) observer: Box<dyn AttachmentObserver>,
}

impl ListenerEntry {
    pub(crate) fn deliver(
        &mut self,
        event: LifecycleEvent,
        graph: &AttachmentGraph,
        info: &AttachmentInfo,
    ) {
        match event {
            LifecycleEvent::BeforeAttachment => self.observer.before_attachment(graph, info),
            LifecycleEvent::AfterAttachment => self.observer.after_attachment(graph, info),
            LifecycleEvent::BeforeDetachment => self.observer.before_detachment(graph, info),
            LifecycleEvent::AfterDetachment => self.observer.after_detachment(graph, info),
        }
    }
}

/// Per-node listener lists.
pub(crate) struct Listeners {
    by_node: HashMap<NodeId, Vec<ListenerEntry>>,
    next_listener_id: u64,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        Self {
            by_node: HashMap::new(),
            next_listener_id: 1,
        }
    }

    pub(crate) fn insert(
        &mut self,
        node: NodeId,
        scope: ListenerScope,
        observer: Box<dyn AttachmentObserver>,
    ) -> ListenerId {
        let id = ListenerId::new(self.next_listener_id);
        self.next_listener_id += 1;
        self.by_node.entry(node).or_default().push(ListenerEntry {
            id,
            scope,
            observer,
        });
        id
    }

    /// Remove a listener; returns its node.
    pub(crate) fn remove(&mut self, id: ListenerId) -> Option<NodeId> {
        let (node, entries) = self
            .by_node
            .iter_mut()
            .find(|(_, entries)| entries.iter().any(|e| e.id == id))?;
        let node = *node;
        entries.retain(|e| e.id != id);
        if entries.is_empty() {
            self.by_node.remove(&node);
        }
        Some(node)
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> usize {
        self.by_node.remove(&node).map_or(0, |entries| entries.len())
    }

    /// Listener ids interested in a connector, in registration order.
    pub(crate) fn snapshot_for(&self, connector: ConnectorId) -> Vec<ListenerId> {
        self.by_node
            .get(&connector.node)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.scope.covers(connector.index))
                    .map(|e| e.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, node: NodeId) -> usize {
        self.by_node.get(&node).map_or(0, Vec::len)
    }

    pub(crate) fn take(&mut self, node: NodeId) -> Vec<ListenerEntry> {
        self.by_node.remove(&node).unwrap_or_default()
    }

    /// Put entries back after dispatch, ahead of any added meanwhile.
    pub(crate) fn restore(&mut self, node: NodeId, mut entries: Vec<ListenerEntry>) {
        if entries.is_empty() {
            return;
        }
        if let Some(added) = self.by_node.remove(&node) {
            entries.extend(added);
        }
        self.by_node.insert(node, entries);
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("nodes", &self.by_node.len())
            .field(
                "listeners",
                &self.by_node.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;
    impl AttachmentObserver for Silent {}

    #[test]
    fn test_scope_snapshot() {
        let mut listeners = Listeners::new();
        let node = NodeId::new(1);
        let all = listeners.insert(node, ListenerScope::Node, Box::new(Silent));
        let second = listeners.insert(node, ListenerScope::Connector(1), Box::new(Silent));

        assert_eq!(
            listeners.snapshot_for(ConnectorId::new(node, 0)),
            vec![all]
        );
        assert_eq!(
            listeners.snapshot_for(ConnectorId::new(node, 1)),
            vec![all, second]
        );
        assert!(listeners.snapshot_for(ConnectorId::new(NodeId::new(2), 0)).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut listeners = Listeners::new();
        let node = NodeId::new(1);
        let id = listeners.insert(node, ListenerScope::Node, Box::new(Silent));
        assert_eq!(listeners.count(node), 1);
        assert_eq!(listeners.remove(id), Some(node));
        assert_eq!(listeners.remove(id), None);
        assert_eq!(listeners.count(node), 0);
    }

    #[test]
    fn test_restore_keeps_order() {
        let mut listeners = Listeners::new();
        let node = NodeId::new(1);
        let first = listeners.insert(node, ListenerScope::Node, Box::new(Silent));
        let taken = listeners.take(node);
        let late = listeners.insert(node, ListenerScope::Node, Box::new(Silent));
        listeners.restore(node, taken);

        assert_eq!(
            listeners.snapshot_for(ConnectorId::new(node, 0)),
            vec![first, late]
        );
    }
}
