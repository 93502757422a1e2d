//! Deployment planning - turns an infrastructure spec into an executable plan.

use std::collections::HashSet;
use std::sync::OnceLock;

use inframan_core::{DeploymentPlan, InfrastructureSpec, OrchestratorConfig, PlanId, Resource};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::dependency::DependencyGraph;
use crate::estimator;

/// Reasons a spec cannot be planned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Id contains characters outside the allowed set
    #[error("invalid resource id {0:?}: use letters, digits, '.', '_' or '-'")]
    InvalidId(String),

    /// Two resources share an id
    #[error("duplicate resource id: {0}")]
    DuplicateResource(String),

    /// Provider is not configured
    #[error("resource {resource}: unknown provider {provider}")]
    UnknownProvider { resource: String, provider: String },

    /// Provider is configured but disabled
    #[error("resource {resource}: provider {provider} is disabled")]
    ProviderDisabled { resource: String, provider: String },

    /// Neither the resource nor the provider names a region
    #[error("resource {resource}: no region given and provider {provider} has no default")]
    MissingRegion { resource: String, provider: String },

    /// Region is not in the provider's list
    #[error("resource {resource}: provider {provider} does not serve region {region}")]
    UnsupportedRegion { resource: String, provider: String, region: String },

    /// Dependency names an id not in the spec
    #[error("resource {resource} depends on unknown resource {dependency}")]
    UnknownDependency { resource: String, dependency: String },

    /// Dependencies form a cycle; the path repeats its first id
    #[error("dependency cycle: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid id pattern"))
}

/// Builds deployment plans against a configuration.
pub struct Planner {
    config: OrchestratorConfig,
}

impl Planner {
    /// Create a planner.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Validate `spec` and produce a plan.
    pub fn create_plan(&self, spec: InfrastructureSpec) -> Result<DeploymentPlan, PlanError> {
        let plan_id = PlanId::new();
        info!("Creating deployment plan {}", plan_id);

        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(spec.resources.len());

        for resource_spec in spec.resources {
            if !id_pattern().is_match(&resource_spec.id) {
                return Err(PlanError::InvalidId(resource_spec.id));
            }
            if !seen.insert(resource_spec.id.clone()) {
                return Err(PlanError::DuplicateResource(resource_spec.id));
            }

            let region = self.resolve_region(
                &resource_spec.id,
                &resource_spec.provider,
                resource_spec.region.as_deref(),
            )?;
            resources.push(Resource::from_spec(resource_spec, region));
        }

        let graph = DependencyGraph::from_resources(&resources);
        if let Some((resource, dependency)) = graph.unknown_dependencies().into_iter().next() {
            return Err(PlanError::UnknownDependency { resource, dependency });
        }
        if let Some(cycle) = graph.find_cycle() {
            return Err(PlanError::CyclicDependency(cycle));
        }

        let execution_order = graph.execution_order();
        let levels = graph.levels();
        let rollback_order: Vec<String> = execution_order.iter().rev().cloned().collect();
        debug!("Plan {} levels: {:?}", plan_id, levels);

        let estimated_duration_secs = estimator::estimate_duration(
            &resources,
            &levels,
            self.config.deployment.parallel_execution,
        );
        let cost_estimate = estimator::estimate_cost(&resources);

        let plan = DeploymentPlan {
            id: plan_id,
            name: spec.name.unwrap_or_else(|| format!("Deployment {}", plan_id)),
            description: spec.description,
            resources,
            execution_order,
            levels,
            rollback_order,
            estimated_duration_secs,
            cost_estimate,
            created_at: chrono::Utc::now(),
        };

        info!(
            "Created deployment plan {} with {} resources in {} levels",
            plan.id,
            plan.resources.len(),
            plan.levels.len()
        );
        Ok(plan)
    }

    fn resolve_region(
        &self,
        resource: &str,
        provider: &str,
        region: Option<&str>,
    ) -> Result<String, PlanError> {
        let Some(provider_config) = self.config.provider(provider) else {
            return Err(PlanError::UnknownProvider {
                resource: resource.to_string(),
                provider: provider.to_string(),
            });
        };
        if !provider_config.enabled {
            return Err(PlanError::ProviderDisabled {
                resource: resource.to_string(),
                provider: provider.to_string(),
            });
        }

        let Some(region) = region.map(str::to_string).or_else(|| provider_config.default_region.clone())
        else {
            return Err(PlanError::MissingRegion {
                resource: resource.to_string(),
                provider: provider.to_string(),
            });
        };

        if !provider_config.allows_region(&region) {
            return Err(PlanError::UnsupportedRegion {
                resource: resource.to_string(),
                provider: provider.to_string(),
                region,
            });
        }
        Ok(region)
    }
}
