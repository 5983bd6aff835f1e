use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use fleet_common::{CreateOpts, Instance};

/// Capability every cloud backend implements.
///
/// The orchestrator never talks to a cloud directly: listing, creation,
/// deletion and lifetime extension all go through this trait.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Registration key, also stamped on every listed `Instance::provider`.
    fn name(&self) -> &str;

    /// Full snapshot of the instances this provider owns under its configured scope.
    /// Per-instance problems are reported in `Instance::errors`, not as an `Err`.
    async fn list(&self) -> Result<Vec<Instance>>;

    async fn create(&self, names: &[String], opts: &CreateOpts) -> Result<()>;

    /// Destroy `instances`. Every instance must belong to this provider.
    async fn delete(&self, instances: &[Instance]) -> Result<()>;

    /// Rewrite the declared lifetime of `instances` to `lifetime`.
    async fn extend(&self, instances: &[Instance], lifetime: Duration) -> Result<()>;

    // Optional: username of the account the provider is authenticated as.
    // None means the provider has no notion of one and create skips the owner check.
    async fn active_account(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Reject instances owned by another provider before touching anything.
pub fn ensure_owned(provider: &str, instances: &[Instance]) -> Result<()> {
    if let Some(foreign) = instances.iter().find(|i| i.provider != provider) {
        anyhow::bail!(
            "{} received instance {} from {}",
            provider,
            foreign.name,
            foreign.provider
        );
    }
    Ok(())
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "gce")]
pub mod gce;
