//! inframan CLI - plan, deploy and tear down infrastructure.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use inframan_core::{
    DeploymentPlan, InfrastructureSpec, OrchestratorConfig, ResourceFilter, ResourceState,
    ResourceType,
};
use inframan_execution::{DeploymentEngine, EngineConfig, Planner};
use inframan_providers::ProviderRegistry;
use inframan_report::ReportGenerator;
use inframan_storage::{JsonStorage, Storage};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inframan")]
#[command(about = "Dependency-ordered infrastructure deployment", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory (overrides storage.path)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a spec and print the deployment plan
    Plan {
        /// Infrastructure spec (JSON)
        spec: PathBuf,
        /// Persist the plan
        #[arg(long)]
        save: bool,
    },
    /// Deploy a spec or a saved plan
    Deploy {
        /// Infrastructure spec (JSON)
        #[arg(required_unless_present = "plan", conflicts_with = "plan")]
        spec: Option<PathBuf>,
        /// Saved plan id
        #[arg(long)]
        plan: Option<String>,
        /// One resource at a time
        #[arg(long)]
        sequential: bool,
        /// Leave deployed resources in place on failure
        #[arg(long)]
        no_rollback: bool,
        /// Use dry-run providers
        #[arg(long)]
        dry_run: bool,
    },
    /// Show a deployment, or list all deployments
    Status {
        /// Deployment or plan id
        id: Option<String>,
    },
    /// List the resource inventory
    Resources {
        /// Filter by provider
        #[arg(long)]
        provider: Option<String>,
        /// Filter by resource type
        #[arg(long = "type")]
        resource_type: Option<ResourceType>,
        /// Filter by state
        #[arg(long)]
        state: Option<ResourceState>,
    },
    /// Destroy the resources of a deployment
    Destroy {
        /// Deployment id
        id: String,
        /// Use dry-run providers
        #[arg(long)]
        dry_run: bool,
    },
    /// Print an inventory report
    Report,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.state_dir {
        config.storage.path = dir.clone();
    }
    init_logging(&config.logging.level, cli.verbose);
    debug!("Using state directory {}", config.storage.path.display());

    match cli.command {
        Commands::Plan { spec, save } => {
            let plan = Planner::new(config.clone()).create_plan(read_spec(&spec).await?)?;
            if save {
                let mut storage = JsonStorage::new(&config.storage.path).await?;
                storage.save_plan(&plan).await?;
                info!("Saved plan {}", plan.id);
            }
            print_json(&plan)?;
        }
        Commands::Deploy { spec, plan, sequential, no_rollback, dry_run } => {
            apply_deploy_flags(&mut config, sequential, no_rollback);
            let storage = JsonStorage::new(&config.storage.path).await?;
            let plan = match (spec, plan) {
                (Some(spec), _) => Planner::new(config.clone()).create_plan(read_spec(&spec).await?)?,
                (None, Some(id)) => load_plan(&storage, &id).await?,
                (None, None) => return Err(anyhow!("a spec file or --plan is required")),
            };

            let mut engine = DeploymentEngine::new(storage, registry(&config, dry_run))
                .with_config(EngineConfig::from_config(&config.deployment));
            let record = engine.execute(&plan).await?;
            print_json(&record)?;

            if !record.is_success() {
                return Err(anyhow!("deployment {} finished with status {}", record.id, record.status));
            }
        }
        Commands::Status { id } => {
            let storage = JsonStorage::new(&config.storage.path).await?;
            match id {
                Some(id) => {
                    let engine = DeploymentEngine::new(storage, ProviderRegistry::new());
                    let record = engine
                        .status(&id)
                        .await?
                        .ok_or_else(|| anyhow!("no deployment found for {}", id))?;
                    print_json(&record)?;
                }
                None => {
                    let deployments = storage.list_deployments().await?;
                    println!("Deployments ({})", deployments.len());
                    for d in deployments {
                        println!(
                            "  {} | {:<11} | {} | {} resources | {}",
                            d.id,
                            d.status.as_str(),
                            d.started_at.format("%Y-%m-%d %H:%M:%S"),
                            d.resources.len(),
                            d.plan_name,
                        );
                    }
                }
            }
        }
        Commands::Resources { provider, resource_type, state } => {
            let storage = JsonStorage::new(&config.storage.path).await?;
            let filter = ResourceFilter {
                provider,
                resource_type,
                state: state.map(|s| vec![s]),
            };
            let resources = storage.list_resources(&filter).await?;

            println!("Resources ({})", resources.len());
            for r in resources {
                println!(
                    "  {} | {} | {} | {} | {} | {}",
                    r.id,
                    r.resource_type,
                    r.state,
                    r.provider,
                    r.region,
                    r.provider_id.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Destroy { id, dry_run } => {
            let deployment_id = id.parse().map_err(|_| anyhow!("invalid deployment id: {}", id))?;
            let storage = JsonStorage::new(&config.storage.path).await?;
            let mut engine = DeploymentEngine::new(storage, registry(&config, dry_run))
                .with_config(EngineConfig::from_config(&config.deployment));
            let record = engine.destroy(deployment_id).await?;
            print_json(&record)?;
        }
        Commands::Report => {
            let storage = JsonStorage::new(&config.storage.path).await?;
            let report = ReportGenerator::new().from_storage(&storage).await?;
            print_json(&report)?;
        }
        Commands::Config => print_json(&config)?,
    }

    Ok(())
}

/// `RUST_LOG` wins, then `--verbose`, then the configured level. Logs go to
/// stderr so stdout stays machine-readable.
fn init_logging(level: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { level }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Fold deploy flags into the configuration so planning and execution agree.
fn apply_deploy_flags(config: &mut OrchestratorConfig, sequential: bool, no_rollback: bool) {
    if sequential {
        config.deployment.parallel_execution = false;
    }
    if no_rollback {
        config.deployment.rollback_on_failure = false;
    }
}

fn registry(config: &OrchestratorConfig, dry_run: bool) -> ProviderRegistry {
    if dry_run {
        ProviderRegistry::dry_run(&config.providers)
    } else {
        ProviderRegistry::from_config(&config.providers)
    }
}

async fn read_spec(path: &Path) -> Result<InfrastructureSpec> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_spec(&content).with_context(|| format!("invalid spec {}", path.display()))
}

fn parse_spec(content: &str) -> Result<InfrastructureSpec> {
    Ok(serde_json::from_str(content)?)
}

async fn load_plan(storage: &JsonStorage, id: &str) -> Result<DeploymentPlan> {
    let plan_id = id.parse().map_err(|_| anyhow!("invalid plan id: {}", id))?;
    storage
        .load_plan(plan_id)
        .await?
        .ok_or_else(|| anyhow!("plan not found: {}", id))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inframan_core::ExecutionMode;

    #[test]
    fn test_parse_deploy_flags() {
        let cli = Cli::try_parse_from([
            "inframan",
            "--state-dir",
            "/tmp/state",
            "deploy",
            "stack.json",
            "--sequential",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.state_dir.as_deref(), Some(Path::new("/tmp/state")));
        let Commands::Deploy { spec, plan, sequential, no_rollback, dry_run } = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(spec.as_deref(), Some(Path::new("stack.json")));
        assert!(plan.is_none());
        assert!(sequential && dry_run && !no_rollback);
    }

    #[test]
    fn test_deploy_requires_spec_or_plan() {
        assert!(Cli::try_parse_from(["inframan", "deploy"]).is_err());
        assert!(Cli::try_parse_from(["inframan", "deploy", "s.json", "--plan", "x"]).is_err());
        assert!(Cli::try_parse_from(["inframan", "deploy", "--plan", "x"]).is_ok());
    }

    #[test]
    fn test_resource_filters_parse() {
        let cli = Cli::try_parse_from([
            "inframan", "resources", "--type", "load_balancer", "--state", "running",
        ])
        .unwrap();
        let Commands::Resources { resource_type, state, .. } = cli.command else {
            panic!("expected resources");
        };
        assert_eq!(resource_type, Some(ResourceType::LoadBalancer));
        assert_eq!(state, Some(ResourceState::Running));

        assert!(Cli::try_parse_from(["inframan", "resources", "--type", "mainframe"]).is_err());
    }

    #[test]
    fn test_sample_spec_plans() {
        let spec = parse_spec(include_str!("../../../specs/web-stack.json")).unwrap();
        let plan = Planner::new(OrchestratorConfig::default()).create_plan(spec).unwrap();
        assert_eq!(plan.execution_order.first().map(String::as_str), Some("vpc"));
        assert_eq!(plan.rollback_order.first().map(String::as_str), Some("web-lb"));
    }

    #[test]
    fn test_sequential_flag_applies_to_plan_and_engine() {
        let spec = parse_spec(
            r#"{"resources": [
                {"id": "db", "type": "database", "provider": "aws"},
                {"id": "cache", "type": "storage", "provider": "aws"}
            ]}"#,
        )
        .unwrap();
        let parallel = Planner::new(OrchestratorConfig::default())
            .create_plan(spec.clone())
            .unwrap();

        let mut config = OrchestratorConfig::default();
        apply_deploy_flags(&mut config, true, true);
        let sequential = Planner::new(config.clone()).create_plan(spec).unwrap();

        assert!(sequential.estimated_duration_secs > parallel.estimated_duration_secs);
        let engine_config = EngineConfig::from_config(&config.deployment);
        assert_eq!(engine_config.mode, ExecutionMode::Sequential);
        assert!(!engine_config.rollback_on_failure);
    }

    #[test]
    fn test_registry_selection() {
        let config = OrchestratorConfig::default();
        assert_eq!(registry(&config, true).names(), vec!["aws", "vmware"]);
        assert_eq!(registry(&config, false).names(), vec!["aws", "vmware"]);
    }
}
