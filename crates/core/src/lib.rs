//! inframan core data models.
//!
//! This crate defines the data structures shared by the planner, the
//! deployment engine, storage backends and reporting: resources and their
//! lifecycle, deployment plans, deployment records and configuration.

#![warn(missing_docs)]

// Core identities
mod id;

// Resources and their lifecycle
mod resource;
mod filter;

// Planning and execution records
mod plan;
mod deployment;

// Configuration
mod config;

// Re-exports
pub use id::*;

pub use resource::{
    Resource, ResourceSpec, InfrastructureSpec, ResourceType, ResourceState,
    InvalidTransition,
};
pub use filter::ResourceFilter;
pub use plan::DeploymentPlan;
pub use deployment::{
    DeploymentRecord, DeploymentStatus, ExecutionMode, ResourceOutcome, OutcomeStatus,
    RollbackEntry, RollbackStatus, StateChange,
};
pub use config::{
    OrchestratorConfig, ProviderConfig, ProviderKind, DeploymentConfig, StorageConfig,
    LoggingConfig,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
