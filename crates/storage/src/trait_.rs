//! Storage trait abstraction.

use async_trait::async_trait;
use inframan_core::{
    DeploymentId, DeploymentPlan, DeploymentRecord, PlanId, Resource, ResourceFilter,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage abstraction for plans, deployment records and the resource
/// inventory.
///
/// This trait allows different storage backends to be plugged in.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Plan operations ===

    /// Save a plan (create or update).
    async fn save_plan(&mut self, plan: &DeploymentPlan) -> Result<()>;

    /// Load a plan by ID.
    async fn load_plan(&self, id: PlanId) -> Result<Option<DeploymentPlan>>;

    /// List all plans, oldest first.
    async fn list_plans(&self) -> Result<Vec<DeploymentPlan>>;

    // === Deployment operations ===

    /// Save a deployment record (create or update).
    async fn save_deployment(&mut self, record: &DeploymentRecord) -> Result<()>;

    /// Load a deployment record by ID.
    async fn load_deployment(&self, id: DeploymentId) -> Result<Option<DeploymentRecord>>;

    /// List all deployment records, oldest first.
    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>>;

    // === Inventory operations ===

    /// Save a live resource (create or update).
    async fn save_resource(&mut self, resource: &Resource) -> Result<()>;

    /// Load a live resource by id.
    async fn load_resource(&self, id: &str) -> Result<Option<Resource>>;

    /// List live resources matching the filter.
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>>;

    /// Remove a resource from the inventory. Missing ids are not an error.
    async fn delete_resource(&mut self, id: &str) -> Result<()>;
}
