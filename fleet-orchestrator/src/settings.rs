use anyhow::{Context, Result};
use chrono::Duration;
use fleet_common::{duration, DEFAULT_LIFETIME_HOURS};

pub const DEFAULT_GCE_PROJECT: &str = "ephemeral-clusters";
pub const DEFAULT_GCE_MACHINE_TYPE: &str = "n1-standard-4";
pub const DEFAULT_GCE_ZONES: &str = "us-east1-b,us-west1-b,europe-west2-b";

/// Process configuration, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Enabled provider ids, in creation order. Empty means every available provider.
    pub providers: Vec<String>,
    pub default_lifetime: Duration,
    pub ssh_user: String,
    pub email_domain: Option<String>,

    pub gce_project: String,
    pub gce_service_account: Option<String>,
    pub gce_machine_type: String,
    pub gce_zones: Vec<String>,
}

/// Split a comma-separated list, trimming whitespace and dropping empty entries.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| non_empty(lookup(key));

        let default_lifetime = match get("FLEET_LIFETIME") {
            Some(raw) => duration::parse(&raw).with_context(|| format!("FLEET_LIFETIME={}", raw))?,
            None => Duration::hours(DEFAULT_LIFETIME_HOURS),
        };

        let ssh_user = get("FLEET_SSH_USER")
            .or_else(|| get("USER"))
            .unwrap_or_else(|| "root".to_string());

        Ok(Self {
            providers: get("FLEET_PROVIDERS").map(|s| parse_list(&s)).unwrap_or_default(),
            default_lifetime,
            ssh_user,
            email_domain: get("FLEET_EMAIL_DOMAIN"),
            gce_project: get("GCE_PROJECT").unwrap_or_else(|| DEFAULT_GCE_PROJECT.to_string()),
            gce_service_account: get("GCE_SERVICE_ACCOUNT"),
            gce_machine_type: get("GCE_MACHINE_TYPE")
                .unwrap_or_else(|| DEFAULT_GCE_MACHINE_TYPE.to_string()),
            gce_zones: parse_list(&get("GCE_ZONES").unwrap_or_else(|| DEFAULT_GCE_ZONES.to_string())),
        })
    }
}
