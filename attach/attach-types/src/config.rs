//! Per-layer connector options and the settings store they come from.
//!
//! Options are resolved when a connector is (re)initialized: per-connector
//! overrides win, anything not overridden falls back to the layer default
//! looked up in a [`SettingsStore`].

use std::collections::BTreeMap;

use crate::layer::{Layer, LayerMask};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How an attachment on a layer is realized physically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BondPolicy {
    /// Merge both nodes into one welded rigid body.
    #[default]
    Weld,
    /// Keep separate bodies linked by a physics joint.
    Joint,
}

/// Default options for connectors on one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerOptions {
    /// Radius within which placement considers this connector a candidate.
    pub influence_radius: f64,
    /// Layers whose connectors may attach to this one.
    pub accepted_layers: LayerMask,
    /// Weld or joint.
    pub policy: BondPolicy,
    /// Magnitude of the impulse pushing the two sides apart on detach (N·s).
    pub separation_impulse: f64,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            influence_radius: 0.25,
            accepted_layers: LayerMask::all(),
            policy: BondPolicy::Weld,
            separation_impulse: 0.1,
        }
    }
}

impl LayerOptions {
    /// Set the influence radius.
    #[must_use]
    pub fn with_influence_radius(mut self, radius: f64) -> Self {
        self.influence_radius = radius;
        self
    }

    /// Set the accepted layers.
    #[must_use]
    pub fn with_accepted_layers(mut self, layers: LayerMask) -> Self {
        self.accepted_layers = layers;
        self
    }

    /// Set the bond policy.
    #[must_use]
    pub fn with_policy(mut self, policy: BondPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the separation impulse applied on detach.
    #[must_use]
    pub fn with_separation_impulse(mut self, impulse: f64) -> Self {
        self.separation_impulse = impulse;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> crate::AttachResult<()> {
        if !self.influence_radius.is_finite() || self.influence_radius < 0.0 {
            return Err(crate::AttachError::invalid_config(format!(
                "influence radius must be finite and non-negative, got {}",
                self.influence_radius
            )));
        }
        if !self.separation_impulse.is_finite() || self.separation_impulse < 0.0 {
            return Err(crate::AttachError::invalid_config(format!(
                "separation impulse must be finite and non-negative, got {}",
                self.separation_impulse
            )));
        }
        Ok(())
    }
}

/// Per-connector overrides of the layer defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectorOptions {
    /// Override of the influence radius.
    pub influence_radius: Option<f64>,
    /// Override of the accepted layers.
    pub accepted_layers: Option<LayerMask>,
}

impl ConnectorOptions {
    /// Create empty overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the influence radius.
    #[must_use]
    pub fn with_influence_radius(mut self, radius: f64) -> Self {
        self.influence_radius = Some(radius);
        self
    }

    /// Override the accepted layers.
    #[must_use]
    pub fn with_accepted_layers(mut self, layers: LayerMask) -> Self {
        self.accepted_layers = Some(layers);
        self
    }

    /// Apply these overrides on top of layer defaults.
    #[must_use]
    pub fn resolve(&self, defaults: LayerOptions) -> LayerOptions {
        LayerOptions {
            influence_radius: self.influence_radius.unwrap_or(defaults.influence_radius),
            accepted_layers: self.accepted_layers.unwrap_or(defaults.accepted_layers),
            ..defaults
        }
    }
}

/// Read-only source of per-layer defaults.
///
/// The engine looks options up by layer index whenever a connector is
/// initialized or reinitialized and never writes back.
pub trait SettingsStore: std::fmt::Debug {
    /// Default options for a layer.
    fn layer_options(&self, layer: Layer) -> LayerOptions;
}

/// Table of layer options with a fallback for unlisted layers.
///
/// # Example
///
/// ```
/// use attach_types::{BondPolicy, Layer, LayerOptions, LayerSettings, SettingsStore};
///
/// let hinges = Layer::wrapping(2);
/// let settings = LayerSettings::default()
///     .with_layer(hinges, LayerOptions::default().with_policy(BondPolicy::Joint));
///
/// assert_eq!(settings.layer_options(hinges).policy, BondPolicy::Joint);
/// assert_eq!(settings.layer_options(Layer::wrapping(0)).policy, BondPolicy::Weld);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerSettings {
    /// Options for layers without an explicit entry.
    pub fallback: LayerOptions,
    /// Explicit per-layer entries.
    pub layers: BTreeMap<Layer, LayerOptions>,
}

impl LayerSettings {
    /// Create settings where every layer uses `fallback`.
    #[must_use]
    pub fn new(fallback: LayerOptions) -> Self {
        Self {
            fallback,
            layers: BTreeMap::new(),
        }
    }

    /// Add or replace the entry for one layer (builder pattern).
    #[must_use]
    pub fn with_layer(mut self, layer: Layer, options: LayerOptions) -> Self {
        self.layers.insert(layer, options);
        self
    }

    /// Add or replace the entry for one layer.
    pub fn set_layer(&mut self, layer: Layer, options: LayerOptions) {
        self.layers.insert(layer, options);
    }

    /// Validate the fallback and every entry.
    pub fn validate(&self) -> crate::AttachResult<()> {
        self.fallback.validate()?;
        for options in self.layers.values() {
            options.validate()?;
        }
        Ok(())
    }
}

impl SettingsStore for LayerSettings {
    fn layer_options(&self, layer: Layer) -> LayerOptions {
        self.layers.get(&layer).copied().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_overrides() {
        let defaults = LayerOptions::default().with_policy(BondPolicy::Joint);
        let resolved = ConnectorOptions::new()
            .with_influence_radius(2.0)
            .resolve(defaults);

        assert_eq!(resolved.influence_radius, 2.0);
        assert_eq!(resolved.accepted_layers, LayerMask::all());
        assert_eq!(resolved.policy, BondPolicy::Joint);
    }

    #[test]
    fn test_layer_options_validation() {
        assert!(LayerOptions::default().validate().is_ok());
        assert!(
            LayerOptions::default()
                .with_influence_radius(-1.0)
                .validate()
                .is_err()
        );
        assert!(
            LayerOptions::default()
                .with_separation_impulse(f64::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_settings_fallback() {
        let layer = Layer::wrapping(4);
        let mut settings = LayerSettings::new(LayerOptions::default().with_influence_radius(1.0));
        assert_eq!(settings.layer_options(layer).influence_radius, 1.0);

        settings.set_layer(layer, LayerOptions::default().with_influence_radius(3.0));
        assert_eq!(settings.layer_options(layer).influence_radius, 3.0);
        assert!(settings.validate().is_ok());

        settings.set_layer(layer, LayerOptions::default().with_influence_radius(f64::INFINITY));
        assert!(settings.validate().is_err());
    }
}
