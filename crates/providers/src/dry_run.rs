//! Dry-run provider.
//!
//! Accepts every request without contacting any backend and remembers what
//! it was asked to do. Used for `--dry-run` and as the default backend.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use inframan_core::Resource;
use tracing::info;

use crate::{Provider, ProviderError, ProviderOutput};

/// A call received by a [`DryRunProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `deploy` for a resource id
    Deploy(String),
    /// `destroy` for a resource id
    Destroy(String),
}

/// Provider that performs no external work.
pub struct DryRunProvider {
    name: String,
    calls: Mutex<Vec<ProviderCall>>,
}

impl DryRunProvider {
    /// Create a dry run standing in for provider `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: ProviderCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl Provider for DryRunProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "dry run, no external changes"
    }

    async fn deploy(&self, resource: &Resource) -> Result<ProviderOutput, ProviderError> {
        info!("[dry-run] {}: would create {} {} in {}",
            self.name, resource.resource_type, resource.id, resource.region);
        self.record(ProviderCall::Deploy(resource.id.clone()));

        let mut attributes = BTreeMap::new();
        attributes.insert("region".to_string(), resource.region.clone());
        Ok(ProviderOutput {
            provider_id: format!("dryrun-{}-{}", self.name, resource.id),
            attributes,
        })
    }

    async fn destroy(&self, resource: &Resource) -> Result<(), ProviderError> {
        info!("[dry-run] {}: would destroy {}", self.name, resource.id);
        self.record(ProviderCall::Destroy(resource.id.clone()));
        Ok(())
    }
}
