use crate::error::{FanOutError, FleetError, Operation, ProviderFailure};
use crate::logger;
use crate::provider_manager::ProviderRegistry;
use fleet_common::Instance;
use fleet_providers::CloudProvider;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Deal `items` over `buckets`: item i (0-based) goes to bucket `i % buckets`.
pub fn partition_round_robin<T>(items: Vec<T>, buckets: usize) -> Vec<Vec<T>> {
    let mut out: Vec<Vec<T>> = (0..buckets).map(|_| Vec::new()).collect();
    if buckets == 0 {
        return out;
    }
    for (i, item) in items.into_iter().enumerate() {
        out[i % buckets].push(item);
    }
    out
}

/// Group instances by owning provider, preserving their relative order.
pub fn group_by_provider(instances: &[Instance]) -> BTreeMap<String, Vec<Instance>> {
    let mut out: BTreeMap<String, Vec<Instance>> = BTreeMap::new();
    for vm in instances {
        out.entry(vm.provider.clone()).or_default().push(vm.clone());
    }
    out
}

/// Run `f` once per job, all jobs concurrently, and wait for every one of them.
///
/// Nothing is cancelled when a task fails; all failures are returned together.
pub async fn run_parallel<T, F, Fut>(
    op: Operation,
    target: &str,
    jobs: Vec<(Arc<dyn CloudProvider>, Vec<T>)>,
    f: F,
) -> Result<(), FanOutError>
where
    T: Send + 'static,
    F: Fn(Arc<dyn CloudProvider>, Vec<T>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut names = Vec::with_capacity(jobs.len());
    let mut handles = Vec::with_capacity(jobs.len());

    for (provider, work) in jobs {
        let name = provider.name().to_string();
        let started = logger::log_event(op, target, &name, work.len());
        let fut = f(provider, work);

        let task_name = name.clone();
        let task_target = target.to_string();
        handles.push(tokio::spawn(async move {
            let result = fut.await;
            logger::log_event_complete(op, &task_target, &task_name, started, result.as_ref().err());
            result
        }));
        names.push(name);
    }

    let failures: Vec<ProviderFailure> = names
        .into_iter()
        .zip(join_all(handles).await)
        .filter_map(|(provider, joined)| match joined {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(ProviderFailure { provider, error }),
            Err(e) => Some(ProviderFailure {
                provider,
                error: anyhow::anyhow!("provider task did not complete: {}", e),
            }),
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(FanOutError {
            op,
            target: target.to_string(),
            failures,
        })
    }
}

/// Partitioned fan-out: deal `items` round-robin over `providers` and invoke
/// each provider exactly once with its share (possibly empty).
pub async fn providers_parallel<T, F, Fut>(
    op: Operation,
    target: &str,
    providers: Vec<Arc<dyn CloudProvider>>,
    items: Vec<T>,
    f: F,
) -> Result<(), FleetError>
where
    T: Send + 'static,
    F: Fn(Arc<dyn CloudProvider>, Vec<T>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    if providers.is_empty() {
        return Err(FleetError::NoProviders);
    }
    let parts = partition_round_robin(items, providers.len());
    let jobs = providers.into_iter().zip(parts).collect();
    run_parallel(op, target, jobs, f).await?;
    Ok(())
}

/// Membership fan-out: group `instances` by provider and invoke only the
/// providers present, each with exactly its own instances.
///
/// Every provider must be registered; otherwise nothing is dispatched.
pub async fn fan_out<F, Fut>(
    registry: &ProviderRegistry,
    op: Operation,
    target: &str,
    instances: &[Instance],
    f: F,
) -> Result<(), FleetError>
where
    F: Fn(Arc<dyn CloudProvider>, Vec<Instance>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut jobs = Vec::new();
    for (name, vms) in group_by_provider(instances) {
        let provider = registry
            .get(&name)
            .ok_or_else(|| FleetError::UnknownProvider(name.clone()))?;
        jobs.push((provider, vms));
    }
    run_parallel(op, target, jobs, f).await?;
    Ok(())
}
