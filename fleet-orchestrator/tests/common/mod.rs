// Common test utilities and fixtures
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use fleet_common::Instance;
use fleet_orchestrator::ProviderRegistry;
use fleet_providers::mock::MockProvider;
use std::sync::Arc;

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
}

/// Healthy instance created at `h:00` with a lifetime of `lifetime_h` hours.
pub fn vm(name: &str, h: u32, lifetime_h: i64) -> Instance {
    let mut vm = Instance::new(name, "unset", at(h, 0), Duration::hours(lifetime_h));
    vm.zone = "zone-a".to_string();
    vm
}

/// Registry over the given mocks, registered in order.
pub fn registry(providers: &[Arc<MockProvider>]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for p in providers {
        registry.register(p.clone());
    }
    registry
}
