use crate::{ensure_owned, CloudProvider};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use fleet_common::{CreateOpts, Instance};
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Operations a `MockProvider` can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    List,
    Create,
    Delete,
    Extend,
}

impl MockOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MockOp::List => "list",
            MockOp::Create => "create",
            MockOp::Delete => "delete",
            MockOp::Extend => "extend",
        }
    }
}

/// Every call the provider received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    List,
    Create(Vec<String>),
    Delete(Vec<String>),
    Extend(Vec<String>, Duration),
}

/// In-memory provider used for local runs and tests.
pub struct MockProvider {
    name: String,
    failing: HashSet<MockOp>,
    latency: Option<std::time::Duration>,
    account: Option<String>,
    instances: Mutex<Vec<Instance>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failing: HashSet::new(),
            latency: None,
            account: None,
            instances: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed the listing. Instances are re-stamped with this provider's name.
    pub fn with_instances(mut self, instances: Vec<Instance>) -> Self {
        let name = self.name.clone();
        let seeded = instances
            .into_iter()
            .map(|mut i| {
                i.provider = name.clone();
                i
            })
            .collect();
        self.instances = Mutex::new(seeded);
        self
    }

    pub fn failing(mut self, op: MockOp) -> Self {
        self.failing.insert(op);
        self
    }

    /// Simulated provider call latency, applied to every operation.
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Username reported by `active_account`.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    pub async fn instances(&self) -> Vec<Instance> {
        self.instances.lock().await.clone()
    }

    async fn enter(&self, call: MockCall, op: MockOp) -> Result<()> {
        self.calls.lock().await.push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(&op) {
            anyhow::bail!("mock provider {}: {} failed", self.name, op.as_str());
        }
        Ok(())
    }
}

fn names_of(instances: &[Instance]) -> Vec<String> {
    instances.iter().map(|i| i.name.clone()).collect()
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        self.enter(MockCall::List, MockOp::List).await?;
        Ok(self.instances.lock().await.clone())
    }

    async fn create(&self, names: &[String], opts: &CreateOpts) -> Result<()> {
        self.enter(MockCall::Create(names.to_vec()), MockOp::Create)
            .await?;

        let now = Utc::now();
        let mut instances = self.instances.lock().await;
        for (idx, name) in names.iter().enumerate() {
            let mut vm = Instance::new(name.clone(), self.name.clone(), now, opts.lifetime);
            vm.dns = format!("{}.{}.mock", name, self.name);
            vm.private_ip = format!("10.0.0.{}", idx + 1);
            vm.public_ip = format!("192.0.2.{}", idx + 1);
            vm.zone = "mock-zone-1".to_string();
            instances.push(vm);
        }
        Ok(())
    }

    async fn delete(&self, instances: &[Instance]) -> Result<()> {
        ensure_owned(&self.name, instances)?;
        self.enter(MockCall::Delete(names_of(instances)), MockOp::Delete)
            .await?;

        let doomed: HashSet<&str> = instances.iter().map(|i| i.name.as_str()).collect();
        self.instances
            .lock()
            .await
            .retain(|i| !doomed.contains(i.name.as_str()));
        Ok(())
    }

    async fn extend(&self, instances: &[Instance], lifetime: Duration) -> Result<()> {
        ensure_owned(&self.name, instances)?;
        self.enter(
            MockCall::Extend(names_of(instances), lifetime),
            MockOp::Extend,
        )
        .await?;

        let targets: HashSet<&str> = instances.iter().map(|i| i.name.as_str()).collect();
        for vm in self.instances.lock().await.iter_mut() {
            if targets.contains(vm.name.as_str()) {
                vm.lifetime = lifetime;
            }
        }
        Ok(())
    }

    async fn active_account(&self) -> Result<Option<String>> {
        Ok(self.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_delete_round_trip() {
        let p = MockProvider::new("mock");
        let opts = CreateOpts::default();
        p.create(&["alice-t-0001".to_string(), "alice-t-0002".to_string()], &opts)
            .await
            .unwrap();

        let listed = p.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|i| i.provider == "mock"));
        assert!(listed.iter().all(|i| i.lifetime == opts.lifetime));

        p.delete(&listed[..1]).await.unwrap();
        let left = p.instances().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name, "alice-t-0002");
    }

    #[tokio::test]
    async fn scripted_failures_are_still_recorded() {
        let p = MockProvider::new("flaky").failing(MockOp::List);
        let err = p.list().await.unwrap_err();
        assert!(err.to_string().contains("list failed"));
        assert_eq!(p.calls().await, vec![MockCall::List]);
    }

    #[tokio::test]
    async fn extend_rewrites_lifetime() {
        let vm = Instance::new("bob-x-0001", "ignored", Utc::now(), Duration::hours(1));
        let p = MockProvider::new("mock").with_instances(vec![vm]);
        let listed = p.list().await.unwrap();

        p.extend(&listed, Duration::hours(5)).await.unwrap();
        assert_eq!(p.instances().await[0].lifetime, Duration::hours(5));
    }
}
