//! Deployment plan - a validated, ordered view of an infrastructure spec.

use serde::{Deserialize, Serialize};
use crate::id::PlanId;
use crate::{Resource, Time};

/// An executable deployment plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPlan {
    /// Unique identifier
    pub id: PlanId,

    /// Plan name
    pub name: String,

    /// Description
    pub description: String,

    /// Resources, in declaration order
    pub resources: Vec<Resource>,

    /// Linear topological order
    pub execution_order: Vec<String>,

    /// Dependency levels; members of a level may deploy concurrently
    pub levels: Vec<Vec<String>>,

    /// Teardown order (reverse of `execution_order`)
    pub rollback_order: Vec<String>,

    /// Estimated wall-clock duration in seconds
    pub estimated_duration_secs: u64,

    /// Estimated monthly cost in USD
    pub cost_estimate: f64,

    /// Creation timestamp
    pub created_at: Time,
}

impl DeploymentPlan {
    /// Look up a resource by id.
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Number of resources in the plan.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the plan deploys nothing.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
