use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::PluginError;

use super::builtin::{
    DescriptiveMetadataValidationPlugin, FixityCheckPlugin, PremisSkeletonPlugin,
    ProducerAuthorizationPlugin,
};
use super::{Plugin, PluginDescriptor};

type PluginFactory = Box<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Maps plugin ids to factories producing a fresh template per job.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, (PluginDescriptor, PluginFactory)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DescriptiveMetadataValidationPlugin::new);
        registry.register(ProducerAuthorizationPlugin::new);
        registry.register(FixityCheckPlugin::new);
        registry.register(PremisSkeletonPlugin::new);
        registry
    }

    /// Registers a factory under the id its plugins report. A later
    /// registration with the same id replaces the earlier one.
    pub fn register<P, F>(&mut self, factory: F)
    where
        P: Plugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let descriptor = factory().descriptor();
        let id = descriptor.id.to_string();
        let factory: PluginFactory = Box::new(move || Arc::new(factory()) as Arc<dyn Plugin>);
        if self.factories.insert(id.clone(), (descriptor, factory)).is_some() {
            log::warn!("Plugin '{}' registered twice, keeping the latest", id);
        }
    }

    pub fn create(&self, plugin_id: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        self.factories
            .get(plugin_id)
            .map(|(_, factory)| factory())
            .ok_or_else(|| PluginError::UnknownPlugin(plugin_id.to_string()))
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.factories.contains_key(plugin_id)
    }

    /// Descriptors of every registered plugin, ordered by id.
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.factories
            .values()
            .map(|(descriptor, _)| descriptor.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = PluginRegistry::with_builtins();
        let ids: Vec<_> = registry.descriptors().iter().map(|d| d.id).collect();
        assert_eq!(
            ids,
            vec![
                "descriptive-metadata-validation",
                "fixity-check",
                "premis-skeleton",
                "producer-authorization-check",
            ]
        );
    }

    #[test]
    fn test_create_returns_fresh_template() {
        let registry = PluginRegistry::with_builtins();
        let plugin = registry.create("fixity-check").unwrap();
        assert_eq!(plugin.descriptor().version, "1.0");
        assert!(registry.contains("premis-skeleton"));
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.create("nope"),
            Err(PluginError::UnknownPlugin(ref id)) if id == "nope"
        ));
    }
}
