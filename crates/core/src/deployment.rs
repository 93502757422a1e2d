//! Deployment record - what happened when a plan was executed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use crate::id::{DeploymentId, PlanId};
use crate::{DeploymentPlan, ResourceState, Time};

/// How a plan is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Level by level, members of a level concurrently
    Parallel,
    /// One resource at a time in execution order
    Sequential,
}

/// Overall status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Still executing
    Running,
    /// Every resource deployed
    Completed,
    /// A resource failed; deployed resources may remain
    Failed,
    /// A resource failed and everything deployed was torn down
    RolledBack,
    /// Torn down on request
    Destroyed,
}

impl DeploymentStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Provider reported success
    Deployed,
    /// Every attempt failed
    Failed,
    /// Never attempted because an earlier step failed
    Skipped,
}

/// Result of deploying one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOutcome {
    /// Resource id
    pub resource_id: String,

    /// Result
    pub status: OutcomeStatus,

    /// Provider calls made
    pub attempts: u32,

    /// Provider-assigned identifier
    pub provider_id: Option<String>,

    /// Provider-reported attributes
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Last error, if failed
    pub error: Option<String>,

    /// Time spent, including retries
    pub duration_ms: u64,
}

impl ResourceOutcome {
    /// Outcome for a resource that never ran.
    pub fn skipped(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: OutcomeStatus::Skipped,
            attempts: 0,
            provider_id: None,
            outputs: BTreeMap::new(),
            error: None,
            duration_ms: 0,
        }
    }
}

/// Result of a teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Provider destroyed the resource
    Destroyed,
    /// Destroy failed; the resource may still exist
    Failed,
}

/// One teardown step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEntry {
    /// Resource id
    pub resource_id: String,
    /// Result
    pub status: RollbackStatus,
    /// Error, if failed
    pub error: Option<String>,
}

/// A recorded lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    /// Resource id
    pub resource_id: String,
    /// Previous state
    pub from: ResourceState,
    /// New state
    pub to: ResourceState,
    /// When it happened
    pub at: Time,
    /// Context
    #[serde(default)]
    pub message: String,
}

impl StateChange {
    /// Record a transition that just happened.
    pub fn new(
        resource_id: impl Into<String>,
        from: ResourceState,
        to: ResourceState,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            from,
            to,
            at: chrono::Utc::now(),
            message: message.into(),
        }
    }
}

/// The record of one plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Unique identifier
    pub id: DeploymentId,

    /// Executed plan
    pub plan_id: PlanId,

    /// Plan name at execution time
    pub plan_name: String,

    /// Execution mode
    pub mode: ExecutionMode,

    /// Overall status
    pub status: DeploymentStatus,

    /// Start timestamp
    pub started_at: Time,

    /// End timestamp
    pub finished_at: Option<Time>,

    /// Per-resource results
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceOutcome>,

    /// Error messages, in occurrence order
    #[serde(default)]
    pub errors: Vec<String>,

    /// Teardown steps taken when the deployment failed
    #[serde(default)]
    pub rollback: Vec<RollbackEntry>,

    /// Teardown steps taken by later destroy requests
    #[serde(default)]
    pub teardown: Vec<RollbackEntry>,

    /// Lifecycle transitions
    #[serde(default)]
    pub events: Vec<StateChange>,
}

impl DeploymentRecord {
    /// Start a record for `plan`.
    pub fn start(plan: &DeploymentPlan, mode: ExecutionMode) -> Self {
        Self {
            id: DeploymentId::new(),
            plan_id: plan.id,
            plan_name: plan.name.clone(),
            mode,
            status: DeploymentStatus::Running,
            started_at: chrono::Utc::now(),
            finished_at: None,
            resources: BTreeMap::new(),
            errors: Vec::new(),
            rollback: Vec::new(),
            teardown: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Close the record with `status`.
    pub fn finish(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.finished_at = Some(chrono::Utc::now());
    }

    /// Elapsed seconds (until now if still running).
    pub fn duration_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(chrono::Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Whether the deployment completed.
    pub fn is_success(&self) -> bool {
        self.status == DeploymentStatus::Completed
    }

    /// Ids of resources the provider reported as deployed.
    pub fn deployed(&self) -> impl Iterator<Item = &str> {
        self.resources
            .values()
            .filter(|o| o.status == OutcomeStatus::Deployed)
            .map(|o| o.resource_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_plan() -> DeploymentPlan {
        DeploymentPlan {
            id: PlanId::new(),
            name: "empty".into(),
            description: String::new(),
            resources: vec![],
            execution_order: vec![],
            levels: vec![],
            rollback_order: vec![],
            estimated_duration_secs: 0,
            cost_estimate: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_record_lifecycle() {
        let plan = empty_plan();
        let mut record = DeploymentRecord::start(&plan, ExecutionMode::Parallel);
        assert_eq!(record.status, DeploymentStatus::Running);
        assert!(record.finished_at.is_none());

        record.finish(DeploymentStatus::Completed);
        assert!(record.is_success());
        assert!(record.finished_at.is_some());
        assert!(record.duration_secs() >= 0.0);
    }

    #[test]
    fn test_deployed_iter_skips_failures() {
        let plan = empty_plan();
        let mut record = DeploymentRecord::start(&plan, ExecutionMode::Sequential);
        let mut ok = ResourceOutcome::skipped("a");
        ok.status = OutcomeStatus::Deployed;
        record.resources.insert("a".into(), ok);
        record.resources.insert("b".into(), ResourceOutcome::skipped("b"));

        assert_eq!(record.deployed().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_status_wire_name() {
        let json = serde_json::to_string(&DeploymentStatus::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
        assert_eq!(DeploymentStatus::RolledBack.to_string(), "rolled_back");
    }
}
