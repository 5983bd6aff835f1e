use crate::cluster::Cluster;
use crate::error::{FleetError, Operation};
use crate::fanout::{fan_out, providers_parallel};
use crate::provider_manager::ProviderRegistry;
use chrono::Duration;
use fleet_common::naming::{cluster_owner, node_name};
use fleet_common::CreateOpts;
use fleet_providers::CloudProvider;
use std::sync::Arc;

/// Node names for a new cluster: `<name>-0001` .. `<name>-<nodes>`.
pub fn plan_node_names(name: &str, nodes: usize) -> Vec<String> {
    (1..=nodes).map(|i| node_name(name, i)).collect()
}

/// Create `nodes` instances named after `name`, dealt round-robin over
/// `opts.providers` in order.
pub async fn create_cluster(
    registry: &ProviderRegistry,
    name: &str,
    nodes: usize,
    opts: &CreateOpts,
) -> Result<(), FleetError> {
    if opts.providers.is_empty() {
        return Err(FleetError::NoProviders);
    }
    let Some(owner) = cluster_owner(name) else {
        return Err(FleetError::InvalidClusterName(name.to_string()));
    };
    if nodes == 0 {
        return Err(FleetError::InvalidNodeCount(nodes));
    }

    let providers = registry.select(&opts.providers)?;
    check_owner(&providers, name, owner).await?;
    tracing::info!(
        cluster = name,
        nodes,
        providers = ?opts.providers,
        lifetime = %fleet_common::duration::format(opts.lifetime),
        "creating cluster"
    );

    let shared = Arc::new(opts.clone());
    providers_parallel(
        Operation::Create,
        name,
        providers,
        plan_node_names(name, nodes),
        move |p: Arc<dyn CloudProvider>, names: Vec<String>| {
            let opts = shared.clone();
            async move { p.create(&names, &opts).await }
        },
    )
    .await
}

/// Every provider that knows its authenticated account must agree with the
/// owner prefix of `cluster`.
async fn check_owner(
    providers: &[Arc<dyn CloudProvider>],
    cluster: &str,
    owner: &str,
) -> Result<(), FleetError> {
    for p in providers {
        let account = p.active_account().await.map_err(|error| FleetError::Account {
            provider: p.name().to_string(),
            error,
        })?;
        match account {
            Some(account) if account != owner => {
                return Err(FleetError::OwnerMismatch {
                    cluster: cluster.to_string(),
                    owner: owner.to_string(),
                    provider: p.name().to_string(),
                    account,
                });
            }
            _ => {}
        }
    }
    Ok(())
}

pub async fn destroy_cluster(registry: &ProviderRegistry, cluster: &Cluster) -> Result<(), FleetError> {
    tracing::info!(cluster = %cluster.name, nodes = cluster.members.len(), "destroying cluster");
    fan_out(
        registry,
        Operation::Delete,
        &cluster.name,
        &cluster.members,
        |p: Arc<dyn CloudProvider>, vms| async move { p.delete(&vms).await },
    )
    .await
}

/// Push the cluster's GC time out by `extension`: every member gets
/// `cluster.lifetime + extension` as its new lifetime.
pub async fn extend_cluster(
    registry: &ProviderRegistry,
    cluster: &Cluster,
    extension: Duration,
) -> Result<Duration, FleetError> {
    let new_lifetime = cluster.lifetime + extension;
    tracing::info!(
        cluster = %cluster.name,
        lifetime = %fleet_common::duration::format(new_lifetime),
        "extending cluster"
    );
    fan_out(
        registry,
        Operation::Extend,
        &cluster.name,
        &cluster.members,
        move |p: Arc<dyn CloudProvider>, vms| async move { p.extend(&vms, new_lifetime).await },
    )
    .await?;
    Ok(new_lifetime)
}
