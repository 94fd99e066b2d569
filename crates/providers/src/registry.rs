//! Named provider factories.
//!
//! Providers are rebuilt on every lookup so the freshest stored API key is
//! always used.

use std::collections::BTreeMap;
use std::sync::Arc;

use multiuploader_settings::SettingsStore;
use multiuploader_transport::Transports;

use crate::akirabox::AkiraBox;
use crate::datavaults::DataVaults;
use crate::error::ProviderError;
use crate::filekeeper::FileKeeper;
use crate::mock::MockProvider;
use crate::provider::Provider;
use crate::rootz::Rootz;

/// Builds a provider from an API key and the shared transports.
pub type ProviderFactory = Arc<dyn Fn(&str, &Transports) -> Arc<dyn Provider> + Send + Sync>;

pub struct ProviderRegistry {
    transports: Transports,
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new(transports: Transports) -> Self {
        Self {
            transports,
            factories: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Transports) -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn transports(&self) -> &Transports {
        &self.transports
    }

    /// Builds `name` with the API key currently stored in `settings`.
    pub fn provider(
        &self,
        name: &str,
        settings: &dyn SettingsStore,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))?;
        Ok(factory(&settings.provider_api_key(name), &self.transports))
    }

    /// Builds every enabled provider, sorted by name.
    pub fn enabled(&self, settings: &dyn SettingsStore) -> Vec<Arc<dyn Provider>> {
        self.factories
            .iter()
            .filter(|(name, _)| settings.is_provider_enabled(name))
            .map(|(name, factory)| factory(&settings.provider_api_key(name), &self.transports))
            .collect()
    }

    /// Adds simulated providers for demos.
    pub fn register_mocks(&mut self) {
        for (name, rate) in [("Mock Fast (10 MB/s)", 10), ("Mock Slow (1 MB/s)", 1)] {
            self.register(name, move |_, _| {
                Arc::new(MockProvider::new(name, rate)) as Arc<dyn Provider>
            });
        }
        self.register("Mock Failing", |_, _| {
            Arc::new(MockProvider::failing("Mock Failing")) as Arc<dyn Provider>
        });
    }
}

/// Registry with every real backend.
pub fn default_registry(transports: Transports) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(transports);
    registry.register("DataVaults", |key, t| {
        Arc::new(DataVaults::new(key, t.clone())) as Arc<dyn Provider>
    });
    registry.register("Rootz", |key, t| {
        Arc::new(Rootz::new(key, t.clone())) as Arc<dyn Provider>
    });
    registry.register("AkiraBox", |key, t| {
        Arc::new(AkiraBox::new(key, t.clone())) as Arc<dyn Provider>
    });
    registry.register("FileKeeper", |key, t| {
        Arc::new(FileKeeper::new(key, t.clone())) as Arc<dyn Provider>
    });
    registry
}
