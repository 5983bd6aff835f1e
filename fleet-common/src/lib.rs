use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub mod duration;
pub mod naming;

pub use naming::{node_name, parse_instance_name, ClusterNames, LOCAL};

// --- Enums ---

/// Classification tag for per-instance problems found while listing.
/// Bad instances are collated by this tag, never by message text.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidName,   // Name does not follow <owner>-<cluster>-<node>
    NoExpiration,  // Missing or unparseable lifetime label
    BadNetwork,    // No usable network interface / access config
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidName => "invalid instance name",
            ErrorKind::NoExpiration => "could not determine expiration",
            ErrorKind::BadNetwork => "could not determine network information",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Entities ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct InstanceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl InstanceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A single compute instance as reported by a provider's listing call.
/// Snapshot-scoped: never mutated after the inventory is built.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub provider: String,
    pub provider_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(with = "duration::nanos")]
    pub lifetime: Duration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<InstanceError>,

    // Connection metadata (provider specific, may be empty)
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub remote_user: String,
    #[serde(default)]
    pub vpc: String,
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub zone: String,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        created_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        let name = name.into();
        Self {
            provider_id: name.clone(),
            name,
            provider: provider.into(),
            created_at,
            lifetime,
            errors: Vec::new(),
            dns: String::new(),
            public_ip: String::new(),
            private_ip: String::new(),
            remote_user: String::new(),
            vpc: String::new(),
            machine_type: String::new(),
            zone: String::new(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.provider == LOCAL
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Canonical ordering used wherever output must be stable:
    /// by name, then provider, then provider id.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.provider.cmp(&other.provider))
            .then_with(|| self.provider_id.cmp(&other.provider_id))
    }
}

pub fn sort_instances(instances: &mut [Instance]) {
    instances.sort_by(Instance::canonical_cmp);
}

// --- Requests ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CreateOpts {
    #[serde(with = "duration::nanos")]
    pub lifetime: Duration,
    pub geo_distributed: bool,
    pub use_local_ssd: bool,
    /// Ordered provider ids; nodes are assigned round-robin in this order.
    pub providers: Vec<String>,
}

pub const DEFAULT_LIFETIME_HOURS: i64 = 12;

impl Default for CreateOpts {
    fn default() -> Self {
        Self {
            lifetime: Duration::hours(DEFAULT_LIFETIME_HOURS),
            geo_distributed: false,
            use_local_ssd: false,
            providers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn canonical_order_is_by_name_then_provider() {
        let mut list = vec![
            Instance::new("bob-x-0002", "gce", at(0, 0), Duration::hours(1)),
            Instance::new("bob-x-0001", "mock", at(0, 0), Duration::hours(1)),
            Instance::new("bob-x-0001", "gce", at(0, 0), Duration::hours(1)),
        ];
        sort_instances(&mut list);
        let keys: Vec<_> = list
            .iter()
            .map(|i| (i.name.as_str(), i.provider.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("bob-x-0001", "gce"), ("bob-x-0001", "mock"), ("bob-x-0002", "gce")]
        );
    }

    #[test]
    fn instance_json_uses_nanosecond_lifetime() {
        let vm = Instance::new("alice-test-0001", "gce", at(3, 0), Duration::minutes(30));
        let json = serde_json::to_value(&vm).unwrap();
        assert_eq!(json["lifetime"], serde_json::json!(1_800_000_000_000i64));
        assert_eq!(json["created_at"], serde_json::json!("2024-01-01T03:00:00Z"));
        // Healthy instances carry no error list on the wire.
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn errors_serialize_with_kind_tag() {
        let mut vm = Instance::new("x", "gce", at(0, 0), Duration::zero());
        vm.errors.push(InstanceError::new(ErrorKind::NoExpiration, "missing lifetime label"));
        let json = serde_json::to_value(&vm).unwrap();
        assert_eq!(json["errors"][0]["kind"], "no_expiration");

        let back: Instance = serde_json::from_value(json).unwrap();
        assert_eq!(back, vm);
    }

    #[test]
    fn local_instances_are_detected_by_provider() {
        let vm = Instance::new("local", LOCAL, at(0, 0), Duration::zero());
        assert!(vm.is_local());
        let vm = Instance::new("local", "gce", at(0, 0), Duration::zero());
        assert!(!vm.is_local());
    }
}
