//! Provider registry - resolves provider names to backends.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use inframan_core::{ProviderConfig, ProviderKind};

use crate::{CommandProvider, DryRunProvider, Provider};

/// Named collection of providers.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build backends for every enabled provider in `config`.
    pub fn from_config(config: &BTreeMap<String, ProviderConfig>) -> Self {
        let mut registry = Self::new();
        for (name, provider) in config.iter().filter(|(_, p)| p.enabled) {
            let backend: Arc<dyn Provider> = match provider.kind {
                ProviderKind::DryRun => Arc::new(DryRunProvider::new(name.as_str())),
                ProviderKind::Command => Arc::new(CommandProvider::from_config(name.as_str(), provider)),
            };
            registry.register_as(name.as_str(), backend);
        }
        registry
    }

    /// Dry-run stand-ins for every enabled provider in `config`.
    pub fn dry_run(config: &BTreeMap<String, ProviderConfig>) -> Self {
        let mut registry = Self::new();
        for name in config.iter().filter(|(_, p)| p.enabled).map(|(n, _)| n) {
            registry.register(Arc::new(DryRunProvider::new(name.as_str())));
        }
        registry
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Register a provider under `name`.
    pub fn register_as(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Look up a provider.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inframan_core::OrchestratorConfig;

    #[test]
    fn test_from_config_skips_disabled() {
        let config = OrchestratorConfig::default();
        let registry = ProviderRegistry::from_config(&config.providers);
        assert_eq!(registry.names(), vec!["aws", "vmware"]);
        assert!(registry.get("azure").is_none());
    }

    #[test]
    fn test_command_kind() {
        let mut providers = BTreeMap::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig::command(vec!["true".into()], vec![]),
        );
        let registry = ProviderRegistry::from_config(&providers);
        let local = registry.get("local").unwrap();
        assert_eq!(local.name(), "local");
        assert!(local.description().contains("external commands"));
    }

    #[test]
    fn test_dry_run_replaces_backends() {
        let mut providers = BTreeMap::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig::command(vec!["true".into()], vec![]),
        );
        let registry = ProviderRegistry::dry_run(&providers);
        assert!(registry.get("local").unwrap().description().contains("dry run"));
    }
}
