//! Registry for all carrier plugins and their ports.

use std::sync::Arc;

use crate::model::CarrierMeta;
use crate::ports::CarrierPort;

/// Port implementing a provider for a single carrier.
pub struct CarrierPlugin {
    /// Static metadata describing the carrier.
    pub meta: CarrierMeta,
    /// Implementation for loading parcels.
    pub port: Arc<dyn CarrierPort>,
}

/// Registry of carrier plugins in query order.
///
/// Carriers are queried one after another in registration order, so the
/// order given to [`CarrierRegistry::new`] decides output order for ties.
pub struct CarrierRegistry {
    plugins: Vec<CarrierPlugin>,
}

impl CarrierRegistry {
    /// Build a registry from the provided plugin list.
    ///
    /// A later plugin with an already registered id is ignored.
    #[must_use]
    pub fn new(plugins: Vec<CarrierPlugin>) -> Self {
        let mut unique: Vec<CarrierPlugin> = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            if unique.iter().all(|known| known.meta.id != plugin.meta.id) {
                unique.push(plugin);
            }
        }
        Self { plugins: unique }
    }

    /// Return metadata for all registered carriers.
    #[must_use]
    pub fn carriers(&self) -> Vec<CarrierMeta> {
        self.plugins
            .iter()
            .map(|plugin| plugin.meta.clone())
            .collect()
    }

    /// Iterator over plugins in query order.
    pub fn iter(&self) -> impl Iterator<Item = &CarrierPlugin> {
        self.plugins.iter()
    }
}
