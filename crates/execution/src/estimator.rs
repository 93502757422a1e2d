//! Duration and cost estimates for deployment plans.

use std::collections::HashMap;

use inframan_core::Resource;

/// Estimated provisioning time of one resource, in seconds.
///
/// Each configuration entry adds 10% to the type's base time.
pub fn resource_duration_secs(resource: &Resource) -> u64 {
    let base = resource.resource_type.base_deploy_secs();
    base * (10 + resource.config.len() as u64) / 10
}

/// Estimated wall-clock duration of a plan, in seconds.
///
/// Sequential execution sums every resource. Parallel execution sums the
/// slowest member of each level.
pub fn estimate_duration(resources: &[Resource], levels: &[Vec<String>], parallel: bool) -> u64 {
    if !parallel {
        return resources.iter().map(resource_duration_secs).sum();
    }

    let by_id: HashMap<&str, &Resource> = resources.iter().map(|r| (r.id.as_str(), r)).collect();
    levels
        .iter()
        .map(|level| {
            level
                .iter()
                .filter_map(|id| by_id.get(id.as_str()))
                .map(|r| resource_duration_secs(r))
                .max()
                .unwrap_or(0)
        })
        .sum()
}

/// Estimated monthly cost of a plan in USD, rounded to cents.
pub fn estimate_cost(resources: &[Resource]) -> f64 {
    round_cents(resources.iter().map(Resource::monthly_cost).sum())
}

/// Round to two decimal places.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use inframan_core::{ResourceSpec, ResourceType};

    fn resource(id: &str, rt: ResourceType, config: usize) -> Resource {
        let mut spec = ResourceSpec::new(id, rt, "aws");
        for i in 0..config {
            spec = spec.config(format!("k{}", i), i);
        }
        Resource::from_spec(spec, "us-east-1".into())
    }

    #[test]
    fn test_resource_duration_complexity() {
        assert_eq!(resource_duration_secs(&resource("a", ResourceType::Compute, 0)), 300);
        assert_eq!(resource_duration_secs(&resource("b", ResourceType::Compute, 2)), 360);
        assert_eq!(resource_duration_secs(&resource("c", ResourceType::SecurityGroup, 1)), 33);
    }

    #[test]
    fn test_sequential_vs_parallel() {
        let resources = vec![
            resource("net", ResourceType::Network, 0),
            resource("db", ResourceType::Database, 0),
            resource("vm", ResourceType::Compute, 0),
        ];
        let levels = vec![vec!["net".to_string()], vec!["db".to_string(), "vm".to_string()]];

        assert_eq!(estimate_duration(&resources, &levels, false), 60 + 600 + 300);
        assert_eq!(estimate_duration(&resources, &levels, true), 60 + 600);
    }

    #[test]
    fn test_cost_estimate() {
        let mut big = resource("vm", ResourceType::Compute, 0);
        big.config.insert("instance_type".into(), "c5.xlarge".into());
        let resources = vec![big, resource("db", ResourceType::Database, 0)];
        assert_eq!(estimate_cost(&resources), 300.0);
        assert_eq!(estimate_cost(&[]), 0.0);
        assert_eq!(round_cents(2.345678), 2.35);
    }
}
