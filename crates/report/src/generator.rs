//! Builds inventory reports.

use inframan_core::{DeploymentRecord, DeploymentStatus, Resource, ResourceFilter};
use inframan_storage::Storage;
use tracing::debug;

use crate::report::*;

/// Monthly cost above which a resource is flagged.
const HIGH_COST_THRESHOLD: f64 = 100.0;

/// Inventory size above which monitoring is recommended.
const LARGE_INVENTORY: usize = 50;

/// Compliance checks as `(name, predicate)` pairs.
const CHECKS: [(&str, fn(&Resource) -> bool); 5] = [
    ("encryption_at_rest", |r| r.config_flag("encryption")),
    ("encryption_in_transit", |r| r.config_flag("ssl_enabled")),
    ("access_logging", |r| r.config_flag("logging_enabled")),
    ("network_isolation", |r| r.config_flag("vpc_id") || r.config_flag("subnet_id")),
    ("backup_configured", |r| r.config_flag("backup_enabled")),
];

/// Generates [`InfrastructureReport`]s.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self
    }

    /// Load the inventory and deployment history from `storage` and report
    /// on them.
    pub async fn from_storage<S: Storage + ?Sized>(
        &self,
        storage: &S,
    ) -> inframan_storage::Result<InfrastructureReport> {
        let resources = storage.list_resources(&ResourceFilter::default()).await?;
        let deployments = storage.list_deployments().await?;
        Ok(self.generate(&resources, &deployments))
    }

    /// Report on `resources` and `deployments`.
    pub fn generate(&self, resources: &[Resource], deployments: &[DeploymentRecord]) -> InfrastructureReport {
        debug!(
            "Generating report over {} resources and {} deployments",
            resources.len(),
            deployments.len()
        );

        InfrastructureReport {
            generated_at: chrono::Utc::now(),
            summary: summarize(resources),
            deployments: summarize_deployments(deployments),
            cost: analyze_cost(resources),
            compliance: check_compliance(resources),
            recommendations: recommend(resources),
        }
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(resources: &[Resource]) -> InventorySummary {
    let mut summary = InventorySummary {
        total_resources: resources.len(),
        ..Default::default()
    };
    for resource in resources {
        *summary.by_provider.entry(resource.provider.clone()).or_default() += 1;
        *summary.by_type.entry(resource.resource_type.to_string()).or_default() += 1;
        *summary.by_state.entry(resource.state.to_string()).or_default() += 1;
    }
    summary
}

fn summarize_deployments(deployments: &[DeploymentRecord]) -> DeploymentSummary {
    DeploymentSummary {
        total: deployments.len(),
        successful: deployments
            .iter()
            .filter(|d| d.status == DeploymentStatus::Completed)
            .count(),
        failed: deployments
            .iter()
            .filter(|d| matches!(d.status, DeploymentStatus::Failed | DeploymentStatus::RolledBack))
            .count(),
    }
}

fn analyze_cost(resources: &[Resource]) -> CostReport {
    let mut cost = CostReport::default();
    for resource in resources {
        let monthly = resource.monthly_cost();
        cost.total_monthly += monthly;
        *cost.by_provider.entry(resource.provider.clone()).or_default() += monthly;
        *cost.by_type.entry(resource.resource_type.to_string()).or_default() += monthly;
    }
    cost.projected_annual = round2(cost.total_monthly * 12.0);
    cost.total_monthly = round2(cost.total_monthly);
    cost
}

fn check_compliance(resources: &[Resource]) -> ComplianceReport {
    let mut report = ComplianceReport::default();
    for (name, passes) in CHECKS {
        let count = resources.iter().filter(|r| passes(r)).count();
        let percentage = if resources.is_empty() {
            0.0
        } else {
            round2(count as f64 / resources.len() as f64 * 100.0)
        };
        report.checks.insert(name.to_string(), count);
        report.percentages.insert(name.to_string(), percentage);
    }
    report.overall_score = round2(report.percentages.values().sum::<f64>() / CHECKS.len() as f64);
    report
}

fn recommend(resources: &[Resource]) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let expensive = ids_where(resources, |r| r.monthly_cost() > HIGH_COST_THRESHOLD);
    if !expensive.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::CostOptimization,
            priority: Priority::High,
            title: "High-cost resources detected".into(),
            description: format!(
                "{} resources cost more than {} per month",
                expensive.len(),
                HIGH_COST_THRESHOLD
            ),
            action: "Review resource sizing".into(),
            resources: expensive,
        });
    }

    let unencrypted = ids_where(resources, |r| !r.config_flag("encryption"));
    if !unencrypted.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Security,
            priority: Priority::Critical,
            title: "Unencrypted resources found".into(),
            description: format!("{} resources have encryption disabled", unencrypted.len()),
            action: "Enable encryption for all sensitive resources".into(),
            resources: unencrypted,
        });
    }

    if resources.len() > LARGE_INVENTORY {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Performance,
            priority: Priority::Medium,
            title: "Large infrastructure detected".into(),
            description: format!("{} resources are deployed", resources.len()),
            action: "Tag resources and add monitoring and alerting".into(),
            resources: Vec::new(),
        });
    }

    recommendations
}

fn ids_where(resources: &[Resource], predicate: impl Fn(&Resource) -> bool) -> Vec<String> {
    resources.iter().filter(|r| predicate(r)).map(|r| r.id.clone()).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use inframan_core::{
        DeploymentPlan, ExecutionMode, PlanId, ResourceSpec, ResourceState, ResourceType,
    };
    use inframan_storage::JsonStorage;
    use tempfile::TempDir;

    fn resource(id: &str, rt: ResourceType, provider: &str) -> Resource {
        Resource::from_spec(ResourceSpec::new(id, rt, provider), "r1".into())
    }

    fn record(status: DeploymentStatus) -> DeploymentRecord {
        let plan = DeploymentPlan {
            id: PlanId::new(),
            name: "p".into(),
            description: String::new(),
            resources: vec![],
            execution_order: vec![],
            levels: vec![],
            rollback_order: vec![],
            estimated_duration_secs: 0,
            cost_estimate: 0.0,
            created_at: chrono::Utc::now(),
        };
        let mut record = DeploymentRecord::start(&plan, ExecutionMode::Parallel);
        record.finish(status);
        record
    }

    #[test]
    fn test_empty_inventory() {
        let report = ReportGenerator::new().generate(&[], &[]);
        assert_eq!(report.summary.total_resources, 0);
        assert_eq!(report.cost.total_monthly, 0.0);
        assert_eq!(report.compliance.overall_score, 0.0);
        assert!(report.compliance.percentages.values().all(|p| *p == 0.0));
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_summary_and_cost() {
        let mut vm = resource("vm", ResourceType::Compute, "aws");
        vm.config.insert("instance_type".into(), "m5.large".into());
        let mut db = resource("db", ResourceType::Database, "aws");
        db.state = ResourceState::Error;
        let net = resource("net", ResourceType::Network, "gcp");

        let report = ReportGenerator::new().generate(&[vm, db, net], &[]);

        assert_eq!(report.summary.total_resources, 3);
        assert_eq!(report.summary.by_provider["aws"], 2);
        assert_eq!(report.summary.by_type["database"], 1);
        assert_eq!(report.summary.by_state["error"], 1);
        assert_eq!(report.summary.by_state["pending"], 2);

        assert_eq!(report.cost.total_monthly, 205.0);
        assert_eq!(report.cost.by_provider["aws"], 200.0);
        assert_eq!(report.cost.by_type["network"], 5.0);
        assert_eq!(report.cost.projected_annual, 2460.0);
    }

    #[test]
    fn test_compliance_percentages() {
        let mut a = resource("a", ResourceType::Storage, "aws");
        a.config.insert("encryption".into(), true.into());
        a.config.insert("subnet_id".into(), "subnet-1".into());
        let mut b = resource("b", ResourceType::Storage, "aws");
        b.config.insert("backup_enabled".into(), true.into());
        let c = resource("c", ResourceType::Storage, "aws");

        let report = ReportGenerator::new().generate(&[a, b, c], &[]);
        let compliance = &report.compliance;

        assert_eq!(compliance.checks["encryption_at_rest"], 1);
        assert_eq!(compliance.checks["network_isolation"], 1);
        assert_eq!(compliance.checks["access_logging"], 0);
        assert_eq!(compliance.percentages["backup_configured"], 33.33);
        // (33.33 * 3 + 0 + 0) / 5
        assert_eq!(compliance.overall_score, 20.0);
    }

    #[test]
    fn test_recommendations() {
        let mut db = resource("db", ResourceType::Database, "aws");
        db.config.insert("instance_type".into(), "r5.xlarge".into());
        let mut bucket = resource("bucket", ResourceType::Storage, "aws");
        bucket.config.insert("encryption".into(), true.into());

        let report = ReportGenerator::new().generate(&[db, bucket], &[]);
        let kinds: Vec<RecommendationKind> = report.recommendations.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RecommendationKind::CostOptimization, RecommendationKind::Security]);
        assert_eq!(report.recommendations[0].resources, vec!["db"]);
        assert_eq!(report.recommendations[1].priority, Priority::Critical);
        assert_eq!(report.recommendations[1].resources, vec!["db"]);

        let many: Vec<Resource> = (0..51)
            .map(|i| {
                let mut r = resource(&format!("n{}", i), ResourceType::Network, "aws");
                r.config.insert("encryption".into(), true.into());
                r
            })
            .collect();
        let report = ReportGenerator::new().generate(&many, &[]);
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].kind, RecommendationKind::Performance);
    }

    #[test]
    fn test_deployment_counts() {
        let deployments = vec![
            record(DeploymentStatus::Completed),
            record(DeploymentStatus::Failed),
            record(DeploymentStatus::RolledBack),
            record(DeploymentStatus::Destroyed),
        ];
        let report = ReportGenerator::new().generate(&[], &deployments);
        assert_eq!(report.deployments.total, 4);
        assert_eq!(report.deployments.successful, 1);
        assert_eq!(report.deployments.failed, 2);
    }

    #[tokio::test]
    async fn test_from_storage() {
        let dir = TempDir::new().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        storage.save_resource(&resource("vm", ResourceType::Compute, "aws")).await.unwrap();
        storage.save_deployment(&record(DeploymentStatus::Completed)).await.unwrap();

        let report = ReportGenerator::new().from_storage(&storage).await.unwrap();
        assert_eq!(report.summary.total_resources, 1);
        assert_eq!(report.deployments.successful, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["recommendations"][0]["type"], "security");
    }
}
