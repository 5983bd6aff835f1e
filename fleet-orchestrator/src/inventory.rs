use crate::cluster::Cluster;
use crate::collate::collate_errors;
use crate::error::FleetError;
use crate::provider_manager::ProviderRegistry;
use fleet_common::{parse_instance_name, ErrorKind, Instance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time snapshot of every instance across all registered providers.
///
/// Each listed instance is either a member of exactly one cluster or sits in
/// `bad_instances`; every bad instance carries at least one error.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Inventory {
    pub clusters: BTreeMap<String, Cluster>,
    pub bad_instances: Vec<Instance>,
}

impl Inventory {
    /// List every provider and classify the results.
    ///
    /// A failing `list()` aborts the whole build: acting on a partial
    /// inventory could destroy or miss clusters.
    pub async fn build(registry: &ProviderRegistry) -> Result<Self, FleetError> {
        let mut all = Vec::new();
        for provider in registry.providers() {
            let instances = provider.list().await.map_err(|error| FleetError::Listing {
                provider: provider.name().to_string(),
                error,
            })?;
            tracing::debug!(provider = provider.name(), count = instances.len(), "listed provider");
            all.extend(instances);
        }

        let inventory = Self::from_instances(all);
        tracing::info!(
            clusters = inventory.clusters.len(),
            bad_instances = inventory.bad_instances.len(),
            "inventory built"
        );
        Ok(inventory)
    }

    /// Fold raw instances into clusters, quarantining anything with errors.
    pub fn from_instances(instances: impl IntoIterator<Item = Instance>) -> Self {
        let mut inventory = Self::default();

        for mut vm in instances {
            let names = match parse_instance_name(&vm.name, vm.is_local()) {
                Ok(names) => Some(names),
                Err(err) => {
                    vm.errors.push(err);
                    None
                }
            };

            let names = match names {
                Some(names) if !vm.has_errors() => names,
                _ => {
                    inventory.bad_instances.push(vm);
                    continue;
                }
            };

            match inventory.clusters.get_mut(&names.cluster) {
                Some(cluster) => cluster.fold(vm),
                None => {
                    let cluster = Cluster::new(names.cluster.clone(), names.owner, vm);
                    inventory.clusters.insert(names.cluster, cluster);
                }
            }
        }

        for cluster in inventory.clusters.values_mut() {
            cluster.sort_members();
        }
        inventory
    }

    pub fn find(&self, name: &str) -> Result<&Cluster, FleetError> {
        self.clusters
            .get(name)
            .ok_or_else(|| FleetError::ClusterNotFound(name.to_string()))
    }

    /// Clusters whose name contains `pattern`, in name order.
    pub fn matching<'a>(&'a self, pattern: &'a str) -> impl Iterator<Item = &'a Cluster> + 'a {
        self.clusters
            .values()
            .filter(move |c| c.name.contains(pattern))
    }

    pub fn clusters_owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Cluster> + 'a {
        self.clusters.values().filter(move |c| c.owner == owner)
    }

    pub fn bad_instance_errors(&self) -> BTreeMap<ErrorKind, Vec<Instance>> {
        collate_errors(&self.bad_instances)
    }

    pub fn instance_count(&self) -> usize {
        self.clusters.values().map(|c| c.members.len()).sum::<usize>() + self.bad_instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use fleet_common::{InstanceError, LOCAL};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    fn vm(name: &str, created: u32, lifetime_h: i64) -> Instance {
        Instance::new(name, "gce", at(created), Duration::hours(lifetime_h))
    }

    #[test]
    fn groups_by_cluster_prefix() {
        let inv = Inventory::from_instances(vec![
            vm("alice-test-0002", 3, 12),
            vm("bob-big-one-0001", 1, 24),
            vm("alice-test-0001", 2, 6),
        ]);
        assert_eq!(inv.clusters.len(), 2);

        let alice = inv.find("alice-test").unwrap();
        assert_eq!(alice.owner, "alice");
        assert_eq!(alice.created_at, at(2));
        assert_eq!(alice.lifetime, Duration::hours(6));
        let members: Vec<&str> = alice.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(members, vec!["alice-test-0001", "alice-test-0002"]);

        let bob = inv.find("bob-big-one").unwrap();
        assert_eq!(bob.owner, "bob");
        assert!(inv.bad_instances.is_empty());
    }

    #[test]
    fn invalid_names_and_provider_errors_are_quarantined() {
        let mut broken = vm("carol-x-0001", 0, 1);
        broken
            .errors
            .push(InstanceError::new(ErrorKind::BadNetwork, "no nic"));

        let inv = Inventory::from_instances(vec![vm("badname", 0, 1), broken, vm("dan-y-0001", 0, 1)]);

        assert_eq!(inv.clusters.len(), 1);
        assert_eq!(inv.bad_instances.len(), 2);
        assert!(inv.bad_instances.iter().all(|i| !i.errors.is_empty()));
        assert_eq!(inv.bad_instances[0].errors[0].kind, ErrorKind::InvalidName);
        assert!(inv.find("carol-x").is_err());
    }

    #[test]
    fn invalid_name_is_appended_to_existing_errors() {
        let mut vm = vm("nope", 0, 1);
        vm.errors
            .push(InstanceError::new(ErrorKind::NoExpiration, "missing"));
        let inv = Inventory::from_instances(vec![vm]);
        let kinds: Vec<ErrorKind> = inv.bad_instances[0].errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::NoExpiration, ErrorKind::InvalidName]);
        assert_eq!(inv.bad_instance_errors().len(), 2);
    }

    #[test]
    fn local_instances_form_the_local_cluster() {
        let local = Instance::new("local-0001", LOCAL, at(0), Duration::zero());
        let inv = Inventory::from_instances(vec![local]);
        let c = inv.find(LOCAL).unwrap();
        assert!(c.is_local());
        assert_eq!(c.owner, LOCAL);
    }

    #[test]
    fn every_instance_lands_exactly_once() {
        let input = vec![
            vm("a-b-0001", 0, 1),
            vm("a-b-0002", 0, 1),
            vm("junk", 0, 1),
            vm("c-d-e-0001", 0, 1),
            vm("x-0001", 0, 1),
        ];
        let inv = Inventory::from_instances(input.clone());
        assert_eq!(inv.instance_count(), input.len());

        for original in &input {
            let in_clusters = inv
                .clusters
                .values()
                .flat_map(|c| c.members.iter())
                .filter(|m| m.name == original.name)
                .count();
            let in_bad = inv
                .bad_instances
                .iter()
                .filter(|m| m.name == original.name)
                .count();
            assert_eq!(in_clusters + in_bad, 1, "{}", original.name);
        }
    }

    #[test]
    fn filters() {
        let inv = Inventory::from_instances(vec![
            vm("alice-test-0001", 0, 1),
            vm("alice-perf-0001", 0, 1),
            vm("bob-test-0001", 0, 1),
        ]);
        let tests: Vec<&str> = inv.matching("test").map(|c| c.name.as_str()).collect();
        assert_eq!(tests, vec!["alice-test", "bob-test"]);
        let alice: Vec<&str> = inv.clusters_owned_by("alice").map(|c| c.name.as_str()).collect();
        assert_eq!(alice, vec!["alice-perf", "alice-test"]);
    }

    #[test]
    fn snapshot_json_layout() {
        let inv = Inventory::from_instances(vec![vm("alice-test-0001", 0, 1), vm("junk", 0, 1)]);
        let json = serde_json::to_value(&inv).unwrap();
        assert!(json["clusters"]["alice-test"]["vms"].is_array());
        assert_eq!(json["clusters"]["alice-test"]["user"], "alice");
        assert_eq!(json["bad_instances"][0]["errors"][0]["kind"], "invalid_name");

        let back: Inventory = serde_json::from_value(json).unwrap();
        assert_eq!(back, inv);
    }
}
