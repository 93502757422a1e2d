//! Inventory reporting - summaries, cost analysis, compliance checks and
//! recommendations over stored resources and deployments.

#![warn(missing_docs)]

pub mod report;
pub mod generator;

pub use report::{
    ComplianceReport, CostReport, DeploymentSummary, InfrastructureReport, InventorySummary,
    Priority, Recommendation, RecommendationKind,
};
pub use generator::ReportGenerator;
