//! The deployment engine - executes plans against providers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use inframan_core::{
    DeploymentConfig, DeploymentId, DeploymentPlan, DeploymentRecord, DeploymentStatus,
    ExecutionMode, OutcomeStatus, PlanId, Resource, ResourceOutcome, ResourceState,
    RollbackEntry, RollbackStatus, StateChange,
};
use inframan_providers::{Provider, ProviderRegistry};
use inframan_storage::{Storage, StorageError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::scheduler::{Budget, ResourceScheduler};

/// Configuration for the deployment engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parallel (by level) or sequential execution
    pub mode: ExecutionMode,
    /// Concurrency, timeout and retry budget
    pub budget: Budget,
    /// Tear down deployed resources when a deployment fails
    pub rollback_on_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            budget: Budget::default(),
            rollback_on_failure: true,
        }
    }
}

impl EngineConfig {
    /// Derive engine settings from deployment configuration.
    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self {
            mode: if config.parallel_execution {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            },
            budget: Budget::from_config(config),
            rollback_on_failure: config.rollback_on_failure,
        }
    }
}

/// Errors that abort engine operations. Provider failures are not errors;
/// they are recorded in the deployment record.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persisting the plan, record or inventory failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A resource names a provider with no registered backend
    #[error("resource {resource}: provider {provider} is not registered")]
    ProviderNotRegistered { resource: String, provider: String },

    /// A plan level or order lists an id the plan does not contain
    #[error("plan {plan} references unknown resource {resource}")]
    UnknownResource { plan: PlanId, resource: String },

    /// No such deployment record
    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    /// The deployment's plan is missing from storage
    #[error("plan not found: {0}")]
    PlanNotFound(PlanId),
}

/// Executes deployment plans and tears deployments down.
pub struct DeploymentEngine<S: Storage> {
    storage: S,
    providers: ProviderRegistry,
    config: EngineConfig,
}

impl<S: Storage> DeploymentEngine<S> {
    /// Create a new engine.
    pub fn new(storage: S, providers: ProviderRegistry) -> Self {
        Self {
            storage,
            providers,
            config: EngineConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute `plan`, returning the final deployment record.
    ///
    /// A storage failure mid-run is treated like a resource failure: the
    /// record is rolled back (if configured) and closed before the error is
    /// returned.
    pub async fn execute(&mut self, plan: &DeploymentPlan) -> Result<DeploymentRecord, EngineError> {
        let providers = self.resolve_providers(plan, plan.resources.iter())?;
        let batches = self.batches(plan)?;

        let mut record = DeploymentRecord::start(plan, self.config.mode);
        self.storage.save_plan(plan).await?;
        self.storage.save_deployment(&record).await?;
        info!(
            "Starting deployment {} of plan {} ({} resources, {:?})",
            record.id,
            plan.id,
            plan.resources.len(),
            self.config.mode
        );

        let mut deployed: HashMap<String, Resource> = HashMap::new();
        let run = self
            .deploy_batches(plan, &batches, &providers, &mut record, &mut deployed)
            .await;
        let failed = match &run {
            Ok(failed) => *failed,
            Err(e) => {
                error!("Deployment {} aborted: {}", record.id, e);
                record.errors.push(format!("Deployment aborted: {}", e));
                for resource in &plan.resources {
                    record
                        .resources
                        .entry(resource.id.clone())
                        .or_insert_with(|| ResourceOutcome::skipped(resource.id.as_str()));
                }
                true
            }
        };

        let status = if !failed {
            DeploymentStatus::Completed
        } else if self.config.rollback_on_failure {
            info!("Starting rollback for deployment {}", record.id);
            let resources: Vec<Resource> = teardown_order(plan, &deployed)
                .into_iter()
                .filter_map(|id| deployed.remove(&id))
                .collect();
            let mut entries = Vec::new();
            let result = self
                .teardown(resources, &providers, &mut entries, &mut record.events)
                .await;
            record.rollback.extend(entries);
            match result {
                Ok(true) => DeploymentStatus::RolledBack,
                Ok(false) => DeploymentStatus::Failed,
                Err(e) => {
                    error!("Rollback of deployment {} aborted: {}", record.id, e);
                    record.errors.push(format!("Rollback aborted: {}", e));
                    DeploymentStatus::Failed
                }
            }
        } else {
            DeploymentStatus::Failed
        };

        record.finish(status);
        let saved = self.storage.save_deployment(&record).await;
        run?;
        saved?;
        info!("Deployment {} finished: {} in {:.1}s", record.id, status, record.duration_secs());
        Ok(record)
    }

    /// Destroy the resources of a finished deployment that are still in the
    /// inventory, in rollback order. Inventory entries a later deployment
    /// has taken over are left alone.
    ///
    /// The record becomes `Destroyed` only when something was torn down and
    /// every destroy succeeded; otherwise its status is kept.
    pub async fn destroy(&mut self, id: DeploymentId) -> Result<DeploymentRecord, EngineError> {
        let mut record = self
            .storage
            .load_deployment(id)
            .await?
            .ok_or(EngineError::DeploymentNotFound(id))?;
        let plan = self
            .storage
            .load_plan(record.plan_id)
            .await?
            .ok_or(EngineError::PlanNotFound(record.plan_id))?;

        let mut live = HashMap::new();
        let mut superseded = Vec::new();
        for resource_id in record.deployed() {
            let Some(resource) = self.storage.load_resource(resource_id).await? else {
                continue;
            };
            match resource.deployment {
                Some(owner) if owner == id => {
                    live.insert(resource_id.to_string(), resource);
                }
                owner => superseded.push((resource_id.to_string(), owner)),
            }
        }
        for (resource_id, owner) in superseded {
            let owner = owner.map_or_else(|| "an unknown deployment".to_string(), |o| o.to_string());
            warn!("Resource {} now belongs to {}; leaving it in place", resource_id, owner);
            record
                .errors
                .push(format!("Resource {} now belongs to {}; not destroyed", resource_id, owner));
        }

        if live.is_empty() {
            info!("Deployment {} has no live resources to destroy", id);
            self.storage.save_deployment(&record).await?;
            return Ok(record);
        }
        info!("Destroying deployment {} ({} live resources)", id, live.len());

        let providers = self.resolve_providers(&plan, live.values())?;
        let resources: Vec<Resource> = teardown_order(&plan, &live)
            .into_iter()
            .filter_map(|rid| live.remove(&rid))
            .collect();

        let mut entries = Vec::new();
        let result = self
            .teardown(resources, &providers, &mut entries, &mut record.events)
            .await;
        record.teardown.extend(entries);
        match result {
            Ok(true) => record.finish(DeploymentStatus::Destroyed),
            Ok(false) => record.errors.push("destroy incomplete; see teardown entries".to_string()),
            Err(e) => {
                record.errors.push(format!("destroy aborted: {}", e));
                let _ = self.storage.save_deployment(&record).await;
                return Err(e);
            }
        }
        self.storage.save_deployment(&record).await?;
        Ok(record)
    }

    /// Find a deployment by deployment id, or the latest deployment of a
    /// plan id.
    pub async fn status(&self, id: &str) -> Result<Option<DeploymentRecord>, EngineError> {
        if let Ok(deployment_id) = id.parse::<DeploymentId>() {
            if let Some(record) = self.storage.load_deployment(deployment_id).await? {
                return Ok(Some(record));
            }
        }
        let Ok(plan_id) = id.parse::<PlanId>() else {
            return Ok(None);
        };
        let deployments = self.storage.list_deployments().await?;
        Ok(deployments.into_iter().filter(|d| d.plan_id == plan_id).last())
    }

    /// Get a reference to the storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Get a mutable reference to the storage.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn resolve_providers<'a>(
        &self,
        plan: &DeploymentPlan,
        resources: impl Iterator<Item = &'a Resource>,
    ) -> Result<HashMap<String, Arc<dyn Provider>>, EngineError> {
        let mut providers = HashMap::new();
        for resource in resources {
            let provider = self.providers.get(&resource.provider).ok_or_else(|| {
                EngineError::ProviderNotRegistered {
                    resource: resource.id.clone(),
                    provider: resource.provider.clone(),
                }
            })?;
            providers.insert(resource.id.clone(), provider);
        }
        debug!("Resolved {} providers for plan {}", providers.len(), plan.id);
        Ok(providers)
    }

    /// Units of work: dependency levels, or single resources in execution
    /// order.
    fn batches(&self, plan: &DeploymentPlan) -> Result<Vec<Vec<String>>, EngineError> {
        let batches: Vec<Vec<String>> = match self.config.mode {
            ExecutionMode::Parallel => plan.levels.clone(),
            ExecutionMode::Sequential => {
                plan.execution_order.iter().map(|id| vec![id.clone()]).collect()
            }
        };
        for id in batches.iter().flatten() {
            if plan.resource(id).is_none() {
                return Err(EngineError::UnknownResource {
                    plan: plan.id,
                    resource: id.clone(),
                });
            }
        }
        Ok(batches)
    }

    /// Deploy `batches` in order, recording outcomes in `record` and
    /// collecting successes in `deployed`. Returns whether any resource
    /// failed; once one has, later batches are skipped.
    async fn deploy_batches(
        &mut self,
        plan: &DeploymentPlan,
        batches: &[Vec<String>],
        providers: &HashMap<String, Arc<dyn Provider>>,
        record: &mut DeploymentRecord,
        deployed: &mut HashMap<String, Resource>,
    ) -> Result<bool, EngineError> {
        let scheduler = ResourceScheduler::new(self.config.budget);
        let mut failed = false;

        for (index, batch) in batches.iter().enumerate() {
            if failed {
                for id in batch {
                    record.resources.insert(id.clone(), ResourceOutcome::skipped(id.as_str()));
                }
                continue;
            }

            if self.config.mode == ExecutionMode::Parallel {
                info!("Executing dependency level {} with {} resources", index, batch.len());
            }

            let members: Vec<Resource> =
                batch.iter().filter_map(|id| plan.resource(id)).cloned().collect();
            let handles = members.iter().map(|resource| {
                let provider = providers[resource.id.as_str()].clone();
                let resource = resource.clone();
                let scheduler = scheduler.clone();
                let budget = self.config.budget;
                tokio::spawn(async move {
                    match scheduler.acquire().await {
                        Ok(_permit) => deploy_resource(provider, resource, budget).await,
                        Err(e) => Attempt::crashed(resource, e.to_string()),
                    }
                })
            });

            let results = futures::future::join_all(handles).await;
            for (member, joined) in members.into_iter().zip(results) {
                let id = member.id.clone();
                let attempt = match joined {
                    Ok(attempt) => attempt,
                    Err(e) => Attempt::crashed(member, e.to_string()),
                };
                record.events.extend(attempt.events);
                let deployed_ok = attempt.outcome.status == OutcomeStatus::Deployed;
                if !deployed_ok {
                    failed = true;
                    let msg = format!(
                        "Failed to deploy resource {}: {}",
                        id,
                        attempt.outcome.error.as_deref().unwrap_or("unknown error")
                    );
                    error!("{}", msg);
                    record.errors.push(msg);
                }
                record.resources.insert(id.clone(), attempt.outcome);

                if deployed_ok {
                    info!("Successfully deployed resource {}", id);
                    let mut resource = attempt.resource;
                    resource.deployment = Some(record.id);
                    // Tracked before saving so a failed save still rolls it back.
                    deployed.insert(id.clone(), resource.clone());
                    self.storage.save_resource(&resource).await?;
                }
            }

            self.storage.save_deployment(record).await?;
        }

        Ok(failed)
    }

    /// Destroy `resources` in order, appending one entry per resource.
    /// Returns whether every destroy succeeded.
    async fn teardown(
        &mut self,
        resources: Vec<Resource>,
        providers: &HashMap<String, Arc<dyn Provider>>,
        entries: &mut Vec<RollbackEntry>,
        events: &mut Vec<StateChange>,
    ) -> Result<bool, EngineError> {
        let mut clean = true;
        for mut resource in resources {
            let Some(provider) = providers.get(&resource.id) else {
                continue;
            };
            let result =
                destroy_resource(provider.as_ref(), &mut resource, self.config.budget, events).await;

            match result {
                Ok(()) => {
                    info!("Destroyed resource {}", resource.id);
                    entries.push(RollbackEntry {
                        resource_id: resource.id.clone(),
                        status: RollbackStatus::Destroyed,
                        error: None,
                    });
                    self.storage.delete_resource(&resource.id).await?;
                }
                Err(e) => {
                    error!("Failed to destroy resource {}: {}", resource.id, e);
                    clean = false;
                    entries.push(RollbackEntry {
                        resource_id: resource.id.clone(),
                        status: RollbackStatus::Failed,
                        error: Some(e),
                    });
                    self.storage.save_resource(&resource).await?;
                }
            }
        }
        Ok(clean)
    }
}

/// Resource ids of `live` in the plan's rollback order; ids the order does
/// not mention go last.
fn teardown_order(plan: &DeploymentPlan, live: &HashMap<String, Resource>) -> Vec<String> {
    let mut order: Vec<String> = plan
        .rollback_order
        .iter()
        .filter(|id| live.contains_key(id.as_str()))
        .cloned()
        .collect();
    let listed: HashSet<String> = order.iter().cloned().collect();
    let mut rest: Vec<String> = live.keys().filter(|id| !listed.contains(*id)).cloned().collect();
    rest.sort();
    order.extend(rest);
    order
}

/// Result of deploying one resource, including every retry.
struct Attempt {
    resource: Resource,
    outcome: ResourceOutcome,
    events: Vec<StateChange>,
}

impl Attempt {
    fn crashed(resource: Resource, error: String) -> Self {
        let mut outcome = ResourceOutcome::skipped(resource.id.as_str());
        outcome.status = OutcomeStatus::Failed;
        outcome.error = Some(format!("deployment task crashed: {}", error));
        Self {
            resource,
            outcome,
            events: Vec::new(),
        }
    }
}

fn advance(
    resource: &mut Resource,
    next: ResourceState,
    message: impl Into<String>,
    events: &mut Vec<StateChange>,
) -> Result<(), String> {
    let from = resource.transition(next).map_err(|e| e.to_string())?;
    events.push(StateChange::new(resource.id.as_str(), from, next, message));
    Ok(())
}

async fn deploy_resource(
    provider: Arc<dyn Provider>,
    mut resource: Resource,
    budget: Budget,
) -> Attempt {
    let start = Instant::now();
    let mut events = Vec::new();
    let mut attempts = 0u32;

    let result = deploy_with_retry(provider.as_ref(), &mut resource, budget, &mut attempts, &mut events).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let outcome = match result {
        Ok(()) => ResourceOutcome {
            resource_id: resource.id.clone(),
            status: OutcomeStatus::Deployed,
            attempts,
            provider_id: resource.provider_id.clone(),
            outputs: resource.outputs.clone(),
            error: None,
            duration_ms,
        },
        Err(error) => ResourceOutcome {
            resource_id: resource.id.clone(),
            status: OutcomeStatus::Failed,
            attempts,
            provider_id: None,
            outputs: Default::default(),
            error: Some(error),
            duration_ms,
        },
    };

    Attempt { resource, outcome, events }
}

async fn deploy_with_retry(
    provider: &dyn Provider,
    resource: &mut Resource,
    budget: Budget,
    attempts: &mut u32,
    events: &mut Vec<StateChange>,
) -> Result<(), String> {
    loop {
        *attempts += 1;
        advance(resource, ResourceState::Creating, format!("attempt {}", attempts), events)?;
        info!("Deploying resource {} ({}) attempt {}", resource.id, resource.resource_type, attempts);

        let result = match tokio::time::timeout(budget.timeout_per_resource, provider.deploy(resource)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", budget.timeout_per_resource)),
        };

        match result {
            Ok(output) => {
                resource.provider_id = Some(output.provider_id);
                resource.outputs = output.attributes;
                advance(resource, ResourceState::Running, "deployed", events)?;
                return Ok(());
            }
            Err(e) => {
                advance(resource, ResourceState::Error, e.as_str(), events)?;
                if *attempts > budget.retry.max_retries {
                    return Err(e);
                }
                let delay = budget.retry.delay_for(*attempts);
                warn!("Resource {} failed ({}); retrying in {:?}", resource.id, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn destroy_resource(
    provider: &dyn Provider,
    resource: &mut Resource,
    budget: Budget,
    events: &mut Vec<StateChange>,
) -> Result<(), String> {
    advance(resource, ResourceState::Stopping, "destroy", events)?;

    let result = match tokio::time::timeout(budget.timeout_per_resource, provider.destroy(resource)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", budget.timeout_per_resource)),
    };

    match result {
        Ok(()) => advance(resource, ResourceState::Terminated, "destroyed", events),
        Err(e) => {
            advance(resource, ResourceState::Error, e.as_str(), events)?;
            Err(e)
        }
    }
}
