//! Inventory query filter.

use serde::{Deserialize, Serialize};
use crate::{Resource, ResourceState, ResourceType};

/// Filter for resource queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceFilter {
    /// Filter by provider name
    pub provider: Option<String>,

    /// Filter by resource type
    pub resource_type: Option<ResourceType>,

    /// Filter by state
    pub state: Option<Vec<ResourceState>>,
}

impl ResourceFilter {
    /// Whether `resource` passes every set criterion.
    pub fn matches(&self, resource: &Resource) -> bool {
        if let Some(provider) = &self.provider {
            if &resource.provider != provider {
                return false;
            }
        }
        if let Some(rt) = self.resource_type {
            if resource.resource_type != rt {
                return false;
            }
        }
        if let Some(states) = &self.state {
            if !states.contains(&resource.state) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceSpec;

    #[test]
    fn test_filter_matches() {
        let r = Resource::from_spec(
            ResourceSpec::new("db", ResourceType::Database, "gcp"),
            "us-central1".into(),
        );

        assert!(ResourceFilter::default().matches(&r));
        assert!(ResourceFilter { provider: Some("gcp".into()), ..Default::default() }.matches(&r));
        assert!(!ResourceFilter { provider: Some("aws".into()), ..Default::default() }.matches(&r));
        assert!(!ResourceFilter {
            resource_type: Some(ResourceType::Compute),
            ..Default::default()
        }
        .matches(&r));
        assert!(ResourceFilter {
            state: Some(vec![ResourceState::Pending, ResourceState::Running]),
            ..Default::default()
        }
        .matches(&r));
    }
}
