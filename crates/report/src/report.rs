//! Report data model.

use std::collections::BTreeMap;

use inframan_core::Time;
use serde::Serialize;

/// A full inventory report.
#[derive(Debug, Clone, Serialize)]
pub struct InfrastructureReport {
    /// When the report was generated
    pub generated_at: Time,
    /// Resource counts
    pub summary: InventorySummary,
    /// Deployment history counts
    pub deployments: DeploymentSummary,
    /// Monthly cost breakdown
    pub cost: CostReport,
    /// Security compliance checks
    pub compliance: ComplianceReport,
    /// Suggested actions
    pub recommendations: Vec<Recommendation>,
}

/// Resource counts by dimension.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InventorySummary {
    /// Resources in the inventory
    pub total_resources: usize,
    /// Count per provider
    pub by_provider: BTreeMap<String, usize>,
    /// Count per resource type
    pub by_type: BTreeMap<String, usize>,
    /// Count per lifecycle state
    pub by_state: BTreeMap<String, usize>,
}

/// Deployment history counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeploymentSummary {
    /// All recorded deployments
    pub total: usize,
    /// Deployments that completed
    pub successful: usize,
    /// Deployments that failed or were rolled back
    pub failed: usize,
}

/// Monthly cost breakdown in USD.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostReport {
    /// Sum over all resources
    pub total_monthly: f64,
    /// Cost per provider
    pub by_provider: BTreeMap<String, f64>,
    /// Cost per resource type
    pub by_type: BTreeMap<String, f64>,
    /// Twelve times the monthly total
    pub projected_annual: f64,
}

/// Security compliance over the inventory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComplianceReport {
    /// Resources passing each check
    pub checks: BTreeMap<String, usize>,
    /// Share of resources passing each check, 0-100
    pub percentages: BTreeMap<String, f64>,
    /// Mean of the percentages
    pub overall_score: f64,
}

/// Area a recommendation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Spend
    CostOptimization,
    /// Exposure
    Security,
    /// Scale
    Performance,
}

/// Recommendation urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait
    Medium,
    /// Should be addressed soon
    High,
    /// Address before the next deployment
    Critical,
}

/// A suggested action.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    /// Area
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    /// Urgency
    pub priority: Priority,
    /// Short headline
    pub title: String,
    /// What was found
    pub description: String,
    /// What to do about it
    pub action: String,
    /// Resources concerned
    pub resources: Vec<String>,
}
