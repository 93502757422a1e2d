//! Resource model - the unit of infrastructure the orchestrator manages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::id::DeploymentId;
use crate::Time;

/// Kind of infrastructure a resource represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Virtual machine or bare compute
    Compute,
    /// Block or object storage
    Storage,
    /// VPC, subnet, route table
    Network,
    /// Managed database
    Database,
    /// Load balancer
    LoadBalancer,
    /// Firewall rules
    SecurityGroup,
    /// Single container workload
    Container,
    /// Kubernetes cluster
    Kubernetes,
}

impl ResourceType {
    /// All resource types, in declaration order.
    pub const ALL: [ResourceType; 8] = [
        Self::Compute,
        Self::Storage,
        Self::Network,
        Self::Database,
        Self::LoadBalancer,
        Self::SecurityGroup,
        Self::Container,
        Self::Kubernetes,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Database => "database",
            Self::LoadBalancer => "load_balancer",
            Self::SecurityGroup => "security_group",
            Self::Container => "container",
            Self::Kubernetes => "kubernetes",
        }
    }

    /// Typical provisioning time in seconds.
    pub fn base_deploy_secs(&self) -> u64 {
        match self {
            Self::Compute => 300,
            Self::Storage => 120,
            Self::Network => 60,
            Self::Database => 600,
            Self::LoadBalancer => 180,
            Self::SecurityGroup => 30,
            Self::Container => 90,
            Self::Kubernetes => 480,
        }
    }

    /// Baseline monthly cost in USD.
    pub fn base_monthly_cost(&self) -> f64 {
        match self {
            Self::Compute => 50.0,
            Self::Storage => 10.0,
            Self::Network => 5.0,
            Self::Database => 100.0,
            Self::LoadBalancer => 25.0,
            Self::SecurityGroup => 0.0,
            Self::Container => 30.0,
            Self::Kubernetes => 75.0,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown resource type: {}", s))
    }
}

/// Lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Planned, not yet touched
    Pending,
    /// Provider call in flight
    Creating,
    /// Deployed and live
    Running,
    /// Teardown in flight
    Stopping,
    /// Deployed but halted
    Stopped,
    /// Gone for good
    Terminated,
    /// Last provider call failed
    Error,
}

impl ResourceState {
    /// All states, in declaration order.
    pub const ALL: [ResourceState; 7] = [
        Self::Pending,
        Self::Creating,
        Self::Running,
        Self::Stopping,
        Self::Stopped,
        Self::Terminated,
        Self::Error,
    ];

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Error => "error",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, next),
            (Pending, Creating)
                | (Creating, Running)
                | (Creating, Error)
                | (Error, Creating)
                | (Error, Stopping)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Stopped, Running)
                | (Stopped, Stopping)
                | (Stopping, Terminated)
                | (Stopping, Error)
        )
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown resource state: {}", s))
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("resource {resource_id}: illegal transition {from} -> {to}")]
pub struct InvalidTransition {
    /// Resource that was asked to move
    pub resource_id: String,
    /// Current state
    pub from: ResourceState,
    /// Requested state
    pub to: ResourceState,
}

/// A resource as declared in an infrastructure spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Unique id within the spec
    pub id: String,

    /// Human-readable name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,

    /// Resource kind
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Provider name, must be configured
    pub provider: String,

    /// Region (defaults to the provider's default region)
    #[serde(default)]
    pub region: Option<String>,

    /// Provider-specific settings
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Free-form labels
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Ids of resources that must exist first
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResourceSpec {
    /// Create a spec with no config, tags or dependencies.
    pub fn new(
        id: impl Into<String>,
        resource_type: ResourceType,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: None,
            resource_type,
            provider: provider.into(),
            region: None,
            config: Map::new(),
            tags: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Add a dependency.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Set the region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set a config entry.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// A declarative description of the infrastructure to deploy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfrastructureSpec {
    /// Deployment name
    #[serde(default)]
    pub name: Option<String>,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Declared resources
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

/// A managed infrastructure resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Unique id (from the spec)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Resource kind
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Lifecycle state
    pub state: ResourceState,

    /// Provider name
    pub provider: String,

    /// Region
    pub region: String,

    /// Provider-specific settings
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Labels
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Ids of resources this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Identifier assigned by the provider once deployed
    #[serde(default)]
    pub provider_id: Option<String>,

    /// Attributes reported by the provider
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Deployment that created the live instance
    #[serde(default)]
    pub deployment: Option<DeploymentId>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Resource {
    /// Materialize a pending resource from its spec.
    pub fn from_spec(spec: ResourceSpec, region: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            name: spec.name.unwrap_or_else(|| spec.id.clone()),
            id: spec.id,
            resource_type: spec.resource_type,
            state: ResourceState::Pending,
            provider: spec.provider,
            region,
            config: spec.config,
            tags: spec.tags,
            dependencies: spec.dependencies,
            provider_id: None,
            outputs: BTreeMap::new(),
            deployment: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, enforcing the lifecycle.
    pub fn transition(&mut self, next: ResourceState) -> Result<ResourceState, InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                resource_id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = chrono::Utc::now();
        Ok(previous)
    }

    /// Monthly cost estimate, scaled by instance size.
    pub fn monthly_cost(&self) -> f64 {
        let factor = match self.config.get("instance_type").and_then(Value::as_str) {
            Some(t) if t.contains("xlarge") => 4.0,
            Some(t) if t.contains("large") => 2.0,
            _ => 1.0,
        };
        self.resource_type.base_monthly_cost() * factor
    }

    /// Whether a config entry is set to a truthy value.
    pub fn config_flag(&self, key: &str) -> bool {
        match self.config.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty() && s != "false",
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            _ => false,
        }
    }
}
