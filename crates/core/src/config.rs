//! Orchestrator configuration.
//!
//! Every field has a default so partial configuration files merge cleanly
//! over [`OrchestratorConfig::default`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Providers by name
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Execution settings
    pub deployment: DeploymentConfig,

    /// State directory settings
    pub storage: StorageConfig,

    /// Log settings
    pub logging: LoggingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "aws".to_string(),
            ProviderConfig::dry_run(true, &["us-east-1", "us-west-2", "eu-west-1"]),
        );
        providers.insert(
            "azure".to_string(),
            ProviderConfig::dry_run(false, &["eastus", "westus2", "westeurope"]),
        );
        providers.insert(
            "gcp".to_string(),
            ProviderConfig::dry_run(false, &["us-central1", "us-east1", "europe-west1"]),
        );
        providers.insert("vmware".to_string(), ProviderConfig::dry_run(true, &["datacenter1"]));

        Self {
            providers,
            deployment: DeploymentConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Look up a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

/// How a provider performs its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Record the call, touch nothing
    DryRun,
    /// Run the configured `apply`/`destroy` commands
    Command,
}

/// Per-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Whether plans may target this provider
    pub enabled: bool,

    /// Backend kind
    pub kind: ProviderKind,

    /// Allowed regions (empty = any)
    pub regions: Vec<String>,

    /// Region used when a resource names none
    pub default_region: Option<String>,

    /// argv template run to create a resource
    pub apply: Vec<String>,

    /// argv template run to destroy a resource
    pub destroy: Vec<String>,

    /// Extra environment for commands
    pub env: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// A dry-run provider restricted to `regions`, defaulting to the first.
    pub fn dry_run(enabled: bool, regions: &[&str]) -> Self {
        Self {
            enabled,
            kind: ProviderKind::DryRun,
            regions: regions.iter().map(|r| r.to_string()).collect(),
            default_region: regions.first().map(|r| r.to_string()),
            apply: Vec::new(),
            destroy: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// A command provider with no region restriction.
    pub fn command(apply: Vec<String>, destroy: Vec<String>) -> Self {
        Self {
            enabled: true,
            kind: ProviderKind::Command,
            regions: Vec::new(),
            default_region: None,
            apply,
            destroy,
            env: BTreeMap::new(),
        }
    }

    /// Whether `region` is allowed.
    pub fn allows_region(&self, region: &str) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r == region)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::dry_run(true, &[])
    }
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Run independent resources concurrently
    pub parallel_execution: bool,

    /// Max concurrent provider calls
    pub max_workers: usize,

    /// Timeout per provider attempt, in seconds
    pub timeout_secs: u64,

    /// Retries after the first failed attempt
    pub retry_attempts: u32,

    /// Initial retry delay; doubles per retry
    pub retry_delay_ms: u64,

    /// Tear down deployed resources when a deployment fails
    pub rollback_on_failure: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            parallel_execution: true,
            max_workers: 10,
            timeout_secs: 3600,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            rollback_on_failure: true,
        }
    }
}

/// State directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for plans, deployments and inventory
    pub path: std::path::PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: ".inframan".into() }
    }
}

/// Log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers() {
        let config = OrchestratorConfig::default();
        let aws = config.provider("aws").unwrap();
        assert!(aws.enabled);
        assert_eq!(aws.default_region.as_deref(), Some("us-east-1"));
        assert!(!config.provider("azure").unwrap().enabled);
        assert!(config.provider("openstack").is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"deployment": {"max_workers": 2}}"#).unwrap();
        assert_eq!(config.deployment.max_workers, 2);
        assert_eq!(config.deployment.retry_attempts, 3);
        assert!(config.providers.contains_key("vmware"));
    }

    #[test]
    fn test_allows_region() {
        let aws = ProviderConfig::dry_run(true, &["us-east-1"]);
        assert!(aws.allows_region("us-east-1"));
        assert!(!aws.allows_region("eu-west-1"));

        let any = ProviderConfig::command(vec!["true".into()], vec![]);
        assert!(any.allows_region("anywhere"));
    }
}
