//! Execution layer - dependency analysis, planning, scheduling and the
//! deployment engine.

#![warn(missing_docs)]

pub mod dependency;
pub mod estimator;
pub mod planner;
pub mod scheduler;
pub mod engine;

pub use dependency::DependencyGraph;
pub use planner::{PlanError, Planner};
pub use scheduler::{Budget, ResourceScheduler, RetryPolicy};
pub use engine::{DeploymentEngine, EngineConfig, EngineError};
