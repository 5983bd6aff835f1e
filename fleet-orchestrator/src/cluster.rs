use chrono::{DateTime, Duration, Utc};
use fleet_common::{duration, sort_instances, Instance, LOCAL};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// GC sweeps run on every hour boundary.
pub const GC_INTERVAL_SECS: i64 = 3600;

/// A named group of instances sharing the `<owner>-<cluster-id>` prefix.
///
/// `created_at` is the earliest and `lifetime` the shortest across members, so
/// the derived GC time is the most conservative one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "user")]
    pub owner: String,
    pub created_at: DateTime<Utc>,
    #[serde(with = "fleet_common::duration::nanos")]
    pub lifetime: Duration,
    #[serde(rename = "vms")]
    pub members: Vec<Instance>,
}

/// Remaining time before the sweep collects a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NoExpiration,
    /// Negative once the GC boundary has passed but the sweep has not run yet.
    Remaining(Duration),
}

/// Smallest hour boundary at or after `t`.
pub fn ceil_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let shifted = t + (Duration::seconds(GC_INTERVAL_SECS) - Duration::nanoseconds(1));
    let into_hour = Duration::seconds(shifted.timestamp().rem_euclid(GC_INTERVAL_SECS))
        + Duration::nanoseconds(i64::from(shifted.timestamp_subsec_nanos()));
    shifted - into_hour
}

impl Cluster {
    /// Seed a cluster from its first healthy member.
    pub fn new(name: impl Into<String>, owner: impl Into<String>, first: Instance) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            created_at: first.created_at,
            lifetime: first.lifetime,
            members: vec![first],
        }
    }

    /// Add a member, keeping `created_at` and `lifetime` at their running minimum.
    pub fn fold(&mut self, vm: Instance) {
        if vm.created_at < self.created_at {
            self.created_at = vm.created_at;
        }
        if vm.lifetime < self.lifetime {
            self.lifetime = vm.lifetime;
        }
        self.members.push(vm);
    }

    pub fn sort_members(&mut self) {
        sort_instances(&mut self.members);
    }

    pub fn is_local(&self) -> bool {
        self.name == LOCAL
    }

    /// Distinct provider ids present in the cluster, sorted.
    pub fn clouds(&self) -> Vec<String> {
        let mut clouds: Vec<String> = self.members.iter().map(|m| m.provider.clone()).collect();
        clouds.sort();
        clouds.dedup();
        clouds
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + self.lifetime
    }

    pub fn gc_at(&self) -> DateTime<Utc> {
        ceil_to_hour(self.expires_at())
    }

    pub fn lifetime_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.gc_at() - now
    }

    pub fn lifecycle(&self, now: DateTime<Utc>) -> Lifecycle {
        if self.is_local() {
            Lifecycle::NoExpiration
        } else {
            Lifecycle::Remaining(self.lifetime_remaining(now))
        }
    }

    /// One-line summary: `name: <nodes> (<remaining>)`.
    pub fn summary(&self, now: DateTime<Utc>) -> String {
        let mut out = format!("{}: {}", self.name, self.members.len());
        if let Lifecycle::Remaining(left) = self.lifecycle(now) {
            let _ = write!(out, " ({})", duration::format(duration::round_to_seconds(left)));
        }
        out
    }

    /// Multi-line rendering with one tab-separated row per member.
    pub fn details(&self, now: DateTime<Utc>) -> String {
        let mut out = format!("{}: [{}] ", self.name, self.clouds().join(" "));
        match self.lifecycle(now) {
            Lifecycle::NoExpiration => out.push_str("(no expiration)"),
            Lifecycle::Remaining(left) => {
                let left = duration::round_to_seconds(left);
                if left <= Duration::zero() {
                    let _ = write!(out, "expired {} ago", duration::format(-left));
                } else {
                    let _ = write!(out, "{} remaining", duration::format(left));
                }
            }
        }
        for vm in &self.members {
            let _ = write!(
                out,
                "\n  {}\t{}\t{}\t{}",
                vm.name, vm.dns, vm.private_ip, vm.public_ip
            );
        }
        out
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary(Utc::now()))
    }
}
