//! Connector layers and layer masks.
//!
//! A layer is a small integer namespace, independent of any rendering or
//! collision layer, that decides which connectors may interact and which
//! default options apply to them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A connector layer in `0..32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Layer(u8);

impl Layer {
    /// Number of distinct layers.
    pub const COUNT: u8 = 32;

    /// Create a layer, returning `None` if the index is out of range.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Create a layer, wrapping the index into range.
    #[must_use]
    pub const fn wrapping(index: u8) -> Self {
        Self(index % Self::COUNT)
    }

    /// The layer index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// The single-bit mask for this layer.
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << self.0
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Layer({})", self.0)
    }
}

/// A set of layers.
///
/// # Example
///
/// ```
/// use attach_types::{Layer, LayerMask};
///
/// let a = Layer::wrapping(0);
/// let b = Layer::wrapping(3);
///
/// let mask = LayerMask::only(a).with(b);
/// assert!(mask.contains(a));
/// assert!(mask.contains(b));
/// assert!(!mask.contains(Layer::wrapping(1)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerMask(pub u32);

impl Default for LayerMask {
    fn default() -> Self {
        Self::all()
    }
}

impl LayerMask {
    /// Mask accepting every layer.
    #[must_use]
    pub const fn all() -> Self {
        Self(u32::MAX)
    }

    /// Mask accepting no layer.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// Mask accepting exactly one layer.
    #[must_use]
    pub const fn only(layer: Layer) -> Self {
        Self(layer.bit())
    }

    /// Add a layer (builder pattern).
    #[must_use]
    pub const fn with(self, layer: Layer) -> Self {
        Self(self.0 | layer.bit())
    }

    /// Remove a layer (builder pattern).
    #[must_use]
    pub const fn without(self, layer: Layer) -> Self {
        Self(self.0 & !layer.bit())
    }

    /// Check whether a layer is in the mask.
    #[must_use]
    pub const fn contains(self, layer: Layer) -> bool {
        self.0 & layer.bit() != 0
    }

    /// Check whether the mask is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Layer> for LayerMask {
    fn from_iter<I: IntoIterator<Item = Layer>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_range() {
        assert!(Layer::new(0).is_some());
        assert!(Layer::new(31).is_some());
        assert!(Layer::new(32).is_none());
        assert_eq!(Layer::wrapping(33).index(), 1);
    }

    #[test]
    fn test_mask_membership() {
        let mask = LayerMask::all().without(Layer::wrapping(5));
        assert!(!mask.contains(Layer::wrapping(5)));
        assert!(mask.contains(Layer::wrapping(6)));
        assert!(LayerMask::none().is_empty());
    }

    #[test]
    fn test_mask_from_iter() {
        let mask: LayerMask = [Layer::wrapping(1), Layer::wrapping(2)].into_iter().collect();
        assert_eq!(mask.0, 0b110);
    }
}
