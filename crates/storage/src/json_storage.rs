//! JSON file storage implementation.
//!
//! Stores data as pretty-printed JSON files under a state directory
//! (`.inframan` by default), one file per plan, deployment record and live
//! resource.

use std::path::{Path, PathBuf};

use inframan_core::{
    DeploymentId, DeploymentPlan, DeploymentRecord, PlanId, Resource, ResourceFilter,
};
use super::{Storage, StorageError, Result};
use tokio::fs;
use tracing::{debug, warn};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    /// Create storage, creating the `plans/`, `deployments/` and `resources/`
    /// subdirectories if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("plans")).await?;
        fs::create_dir_all(root.join("deployments")).await?;
        fs::create_dir_all(root.join("resources")).await?;

        debug!("Opened JSON storage at {}", root.display());
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plan_path(&self, id: PlanId) -> PathBuf {
        self.root.join("plans").join(format!("{}.json", id))
    }

    fn deployment_path(&self, id: DeploymentId) -> PathBuf {
        self.root.join("deployments").join(format!("{}.json", id))
    }

    fn resource_path(&self, id: &str) -> Result<PathBuf> {
        // Resource ids come from user input; keep them inside resources/.
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(StorageError::Other(format!("invalid resource id: {:?}", id)));
        }
        Ok(self.root.join("resources").join(format!("{}.json", id)))
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_plan(&mut self, plan: &DeploymentPlan) -> Result<()> {
        write_json(&self.plan_path(plan.id), plan).await
    }

    async fn load_plan(&self, id: PlanId) -> Result<Option<DeploymentPlan>> {
        read_json(&self.plan_path(id)).await
    }

    async fn list_plans(&self) -> Result<Vec<DeploymentPlan>> {
        let mut plans = list_dir(&self.root.join("plans")).await?;
        plans.sort_by(|a: &DeploymentPlan, b| a.created_at.cmp(&b.created_at));
        Ok(plans)
    }

    async fn save_deployment(&mut self, record: &DeploymentRecord) -> Result<()> {
        write_json(&self.deployment_path(record.id), record).await
    }

    async fn load_deployment(&self, id: DeploymentId) -> Result<Option<DeploymentRecord>> {
        read_json(&self.deployment_path(id)).await
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>> {
        let mut records = list_dir(&self.root.join("deployments")).await?;
        records.sort_by(|a: &DeploymentRecord, b| a.started_at.cmp(&b.started_at));
        Ok(records)
    }

    async fn save_resource(&mut self, resource: &Resource) -> Result<()> {
        write_json(&self.resource_path(&resource.id)?, resource).await
    }

    async fn load_resource(&self, id: &str) -> Result<Option<Resource>> {
        read_json(&self.resource_path(id)?).await
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        let mut all: Vec<Resource> = list_dir(&self.root.join("resources")).await?;
        all.retain(|r| filter.matches(r));
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn delete_resource(&mut self, id: &str) -> Result<()> {
        fs::remove_file(self.resource_path(id)?).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
        })?;
        Ok(())
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    // Write-then-rename so readers never see a half-written file.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable {}: {}", path.display(), e),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inframan_core::{
        DeploymentStatus, ExecutionMode, ResourceSpec, ResourceState, ResourceType,
    };
    use tempfile::TempDir;

    fn resource(id: &str, provider: &str, rt: ResourceType) -> Resource {
        Resource::from_spec(ResourceSpec::new(id, rt, provider), "r1".into())
    }

    fn plan(resources: Vec<Resource>) -> DeploymentPlan {
        let order: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();
        DeploymentPlan {
            id: PlanId::new(),
            name: "test".into(),
            description: String::new(),
            levels: vec![order.clone()],
            rollback_order: order.iter().rev().cloned().collect(),
            execution_order: order,
            resources,
            estimated_duration_secs: 0,
            cost_estimate: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_plan_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();

        let p = plan(vec![resource("net", "aws", ResourceType::Network)]);
        storage.save_plan(&p).await.unwrap();

        let loaded = storage.load_plan(p.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, p.id);
        assert_eq!(loaded.execution_order, vec!["net"]);
        assert_eq!(storage.list_plans().await.unwrap().len(), 1);
        assert!(storage.load_plan(PlanId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deployment_update_overwrites() {
        let dir = TempDir::new().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();

        let p = plan(vec![]);
        let mut record = DeploymentRecord::start(&p, ExecutionMode::Parallel);
        storage.save_deployment(&record).await.unwrap();
        record.finish(DeploymentStatus::Completed);
        storage.save_deployment(&record).await.unwrap();

        let all = storage.list_deployments().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, DeploymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_inventory_filter_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();

        let mut web = resource("web", "aws", ResourceType::Compute);
        web.transition(ResourceState::Creating).unwrap();
        web.transition(ResourceState::Running).unwrap();
        storage.save_resource(&web).await.unwrap();
        storage.save_resource(&resource("db", "gcp", ResourceType::Database)).await.unwrap();

        let aws = storage
            .list_resources(&ResourceFilter { provider: Some("aws".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(aws.len(), 1);
        assert_eq!(aws[0].state, ResourceState::Running);

        storage.delete_resource("web").await.unwrap();
        storage.delete_resource("web").await.unwrap();
        assert!(storage.load_resource("web").await.unwrap().is_none());
        assert_eq!(storage.list_resources(&ResourceFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_path_escape() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.load_resource("../plans/x").await.is_err());
    }

    #[tokio::test]
    async fn test_listing_skips_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        storage.save_resource(&resource("ok", "aws", ResourceType::Storage)).await.unwrap();
        std::fs::write(dir.path().join("resources").join("bad.json"), "{not json").unwrap();

        let all = storage.list_resources(&ResourceFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "ok");
    }
}
