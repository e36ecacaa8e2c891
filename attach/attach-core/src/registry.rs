//! Layer-keyed index of active connectors.

use attach_types::{ConnectorId, Layer, LayerMask, Point3};
use hashbrown::{HashMap, HashSet};

/// Index of active connectors by layer.
///
/// Owned by the graph and kept in step with connector activation, node
/// insertion and node removal. Proximity queries go through
/// [`AttachmentGraph::candidates_near`](crate::AttachmentGraph::candidates_near),
/// which resolves positions from the arena.
#[derive(Debug, Clone, Default)]
pub struct ConnectorRegistry {
    by_layer: HashMap<Layer, HashSet<ConnectorId>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connector. Returns false if it was already present.
    pub fn register(&mut self, layer: Layer, connector: ConnectorId) -> bool {
        self.by_layer.entry(layer).or_default().insert(connector)
    }

    /// Remove a connector. Returns false if it was not present.
    pub fn unregister(&mut self, layer: Layer, connector: ConnectorId) -> bool {
        let Some(set) = self.by_layer.get_mut(&layer) else {
            return false;
        };
        let removed = set.remove(&connector);
        if set.is_empty() {
            self.by_layer.remove(&layer);
        }
        removed
    }

    /// Whether a connector is registered.
    #[must_use]
    pub fn contains(&self, layer: Layer, connector: ConnectorId) -> bool {
        self.by_layer
            .get(&layer)
            .is_some_and(|set| set.contains(&connector))
    }

    /// Connectors registered in any layer of `layers`.
    pub fn in_layers(&self, layers: LayerMask) -> impl Iterator<Item = ConnectorId> + '_ {
        self.by_layer
            .iter()
            .filter(move |(layer, _)| layers.contains(**layer))
            .flat_map(|(_, set)| set.iter().copied())
    }

    /// Total registered connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_layer.values().map(HashSet::len).sum()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_layer.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.by_layer.clear();
    }
}

/// A proximity query for placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityQuery {
    /// World point to search around.
    pub point: Point3<f64>,
    /// Layers to search.
    pub layers: LayerMask,
    /// Search radius; `None` uses each candidate's influence radius.
    pub radius: Option<f64>,
    /// Only return connectors that accept a new attachment.
    pub accepting_only: bool,
}

impl ProximityQuery {
    /// Search all layers around `point` using influence radii.
    #[must_use]
    pub fn around(point: Point3<f64>) -> Self {
        Self {
            point,
            layers: LayerMask::all(),
            radius: None,
            accepting_only: false,
        }
    }

    /// Restrict to layers (builder pattern).
    #[must_use]
    pub fn in_layers(mut self, layers: LayerMask) -> Self {
        self.layers = layers;
        self
    }

    /// Use a fixed radius (builder pattern).
    #[must_use]
    pub fn within(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Skip connectors that would reject a proposal (builder pattern).
    #[must_use]
    pub fn accepting(mut self) -> Self {
        self.accepting_only = true;
        self
    }
}

/// A connector found by a proximity query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// The connector.
    pub connector: ConnectorId,
    /// Distance from the query point to the connector frame origin.
    pub distance: f64,
    /// Whether the connector currently accepts a new attachment.
    pub accepting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use attach_types::NodeId;

    fn c(node: u64, index: usize) -> ConnectorId {
        ConnectorId::new(NodeId::new(node), index)
    }

    #[test]
    fn test_register_unregister() {
        let mut registry = ConnectorRegistry::new();
        let layer = Layer::wrapping(3);
        assert!(registry.register(layer, c(1, 0)));
        assert!(!registry.register(layer, c(1, 0)));
        assert!(registry.contains(layer, c(1, 0)));
        assert!(!registry.contains(Layer::wrapping(4), c(1, 0)));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(layer, c(1, 0)));
        assert!(!registry.unregister(layer, c(1, 0)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_layer_filter() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Layer::wrapping(0), c(1, 0));
        registry.register(Layer::wrapping(1), c(2, 0));
        registry.register(Layer::wrapping(1), c(3, 0));

        let found: Vec<_> = registry
            .in_layers(LayerMask::only(Layer::wrapping(1)))
            .collect();
        assert_eq!(found.len(), 2);
        assert!(!found.contains(&c(1, 0)));
        assert_eq!(registry.in_layers(LayerMask::all()).count(), 3);
    }
}
