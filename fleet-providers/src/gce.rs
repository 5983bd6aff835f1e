use crate::{ensure_owned, CloudProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fleet_common::{duration, CreateOpts, ErrorKind, Instance, InstanceError};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const PROVIDER_NAME: &str = "gce";
pub const DEFAULT_PROJECT: &str = "ephemeral-clusters";
const GCLOUD: &str = "gcloud";

/// User-configurable, provider-specific options.
#[derive(Debug, Clone)]
pub struct GceOptions {
    pub project: String,
    pub service_account: Option<String>,
    pub machine_type: String,
    pub zones: Vec<String>,
    pub remote_user: String,
    /// Accounts outside this domain are refused by `active_account`.
    pub email_domain: Option<String>,
}

impl Default for GceOptions {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            service_account: None,
            machine_type: "n1-standard-4".to_string(),
            zones: vec![
                "us-east1-b".to_string(),
                "us-west1-b".to_string(),
                "europe-west2-b".to_string(),
            ],
            remote_user: String::new(),
            email_domain: None,
        }
    }
}

pub struct GceProvider {
    opts: GceOptions,
    gcloud: PathBuf,
}

/// Returns a provider only when the `gcloud` CLI is on `PATH`.
pub fn probe(opts: GceOptions) -> Option<GceProvider> {
    let path = std::env::var_os("PATH")?;
    let found = std::env::split_paths(&path)
        .map(|dir| Path::new(&dir).join(GCLOUD))
        .find(|candidate| candidate.is_file());
    let Some(gcloud) = found else {
        tracing::warn!("gcloud CLI not found on PATH, GCE provider disabled (https://cloud.google.com/sdk/downloads)");
        return None;
    };
    Some(GceProvider::with_cli(opts, gcloud))
}

impl GceProvider {
    pub fn new(opts: GceOptions) -> Self {
        Self::with_cli(opts, GCLOUD)
    }

    /// Provider driving the `gcloud` binary at `gcloud`.
    pub fn with_cli(opts: GceOptions, gcloud: impl Into<PathBuf>) -> Self {
        Self {
            opts,
            gcloud: gcloud.into(),
        }
    }
}

async fn run_command(gcloud: &Path, args: &[String]) -> Result<()> {
    let output = Command::new(gcloud)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to spawn: gcloud {}", args.join(" ")))?;

    if !output.status.success() {
        anyhow::bail!(
            "Command: gcloud {}\nOutput: {}{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

async fn run_json_command<T: DeserializeOwned>(gcloud: &Path, args: &[String]) -> Result<T> {
    let output = Command::new(gcloud)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to spawn: gcloud {}", args.join(" ")))?;

    if !output.status.success() {
        anyhow::bail!(
            "failed to run: gcloud {}: {}\nstdout: {}\nstderr: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stdout).trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    serde_json::from_slice(&output.stdout).with_context(|| {
        format!(
            "failed to parse json {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// Wait for every per-zone command, then report all failures at once.
fn zone_results(results: Vec<Result<()>>) -> Result<()> {
    let mut failures: Vec<anyhow::Error> = results.into_iter().filter_map(Result::err).collect();
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        n => {
            let joined: Vec<String> = failures.iter().map(|e| format!("{:#}", e)).collect();
            anyhow::bail!("{} zone commands failed: {}", n, joined.join("; "))
        }
    }
}

/// `lifetime=<duration>` label; GCE label values cannot hold the `.` of fractional seconds.
fn lifetime_label(lifetime: Duration) -> String {
    format!("lifetime={}", duration::format(duration::round_to_seconds(lifetime)))
}

/// Username part of the active `account`, refused when outside `domain`.
fn account_username(account: &str, domain: Option<&str>) -> Result<String> {
    if let Some(domain) = domain {
        if !account.ends_with(domain) {
            anyhow::bail!(
                "active account {:?} does not belong to domain {}",
                account,
                domain
            );
        }
    }
    let user = account.split('@').next().unwrap_or(account);
    Ok(user.to_string())
}

// --- gcloud JSON payloads ---

#[derive(Debug, Deserialize)]
struct JsonAccessConfig {
    #[serde(rename = "natIP", default)]
    nat_ip: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonNetworkInterface {
    #[serde(default)]
    network: String,
    #[serde(rename = "networkIP", default)]
    network_ip: String,
    #[serde(default)]
    access_configs: Vec<JsonAccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonVm {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    network_interfaces: Vec<JsonNetworkInterface>,
    #[serde(default)]
    machine_type: String,
    #[serde(default)]
    zone: String,
}

#[derive(Debug, Deserialize)]
struct JsonAuth {
    account: String,
}

// Fields like machineType and zone are full resource URLs; keep the last path segment.
fn last_component(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

impl JsonVm {
    fn into_instance(self, project: &str, remote_user: &str) -> Instance {
        let mut errors = Vec::new();

        let lifetime = match self.labels.get("lifetime") {
            Some(raw) => match duration::parse(raw) {
                Ok(d) => d,
                Err(e) => {
                    errors.push(InstanceError::new(ErrorKind::NoExpiration, e.to_string()));
                    Duration::zero()
                }
            },
            None => {
                errors.push(InstanceError::new(
                    ErrorKind::NoExpiration,
                    "missing lifetime label",
                ));
                Duration::zero()
            }
        };

        let (mut public_ip, mut private_ip, mut vpc) = (String::new(), String::new(), String::new());
        match self.network_interfaces.first() {
            None => errors.push(InstanceError::new(
                ErrorKind::BadNetwork,
                "no network interfaces",
            )),
            Some(nic) => {
                private_ip = nic.network_ip.clone();
                match nic.access_configs.first() {
                    None => errors.push(InstanceError::new(
                        ErrorKind::BadNetwork,
                        "no access configs on primary interface",
                    )),
                    Some(ac) => {
                        public_ip = ac.nat_ip.clone();
                        vpc = last_component(&nic.network).to_string();
                    }
                }
            }
        }

        let zone = last_component(&self.zone).to_string();
        let mut vm = Instance::new(self.name, PROVIDER_NAME, self.creation_timestamp, lifetime);
        vm.errors = errors;
        vm.dns = format!("{}.{}.{}", vm.name, zone, project);
        vm.public_ip = public_ip;
        vm.private_ip = private_ip;
        vm.vpc = vpc;
        vm.machine_type = last_component(&self.machine_type).to_string();
        vm.zone = zone;
        // gcloud logs in with the local username, not the Google account.
        vm.remote_user = remote_user.to_string();
        vm
    }
}

/// Split `names` across `zones`: each zone takes ceil(remaining / zones_left),
/// so leftovers go one per zone to the first zones.
fn allocate_zones<'a>(names: &'a [String], zones: &'a [String]) -> Vec<(&'a str, &'a [String])> {
    let mut out = Vec::new();
    let mut remaining = names;
    for (i, zone) in zones.iter().enumerate() {
        if remaining.is_empty() {
            break;
        }
        let zones_left = zones.len() - i;
        let take = (remaining.len() + zones_left - 1) / zones_left;
        let (chunk, rest) = remaining.split_at(take);
        out.push((zone.as_str(), chunk));
        remaining = rest;
    }
    out
}

#[async_trait]
impl CloudProvider for GceProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        let args: Vec<String> = [
            "compute", "instances", "list", "--project", self.opts.project.as_str(), "--format", "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let vms: Vec<JsonVm> = run_json_command(&self.gcloud, &args).await?;
        tracing::debug!(provider = PROVIDER_NAME, count = vms.len(), "listed instances");
        Ok(vms
            .into_iter()
            .map(|vm| vm.into_instance(&self.opts.project, &self.opts.remote_user))
            .collect())
    }

    async fn create(&self, names: &[String], opts: &CreateOpts) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        if self.opts.project != DEFAULT_PROJECT {
            tracing::warn!(
                project = %self.opts.project,
                "lifetime enforcement requires a gc job running against this project"
            );
        }
        if self.opts.zones.is_empty() {
            anyhow::bail!("{}: no zones configured", PROVIDER_NAME);
        }

        let zones: &[String] = if opts.geo_distributed {
            &self.opts.zones
        } else {
            &self.opts.zones[..1]
        };

        let mut args: Vec<String> = [
            "compute", "instances", "create",
            "--subnet", "default",
            "--maintenance-policy", "MIGRATE",
            "--scopes", "default,storage-rw",
            "--image-family", "ubuntu-2204-lts",
            "--image-project", "ubuntu-os-cloud",
            "--boot-disk-size", "10",
            "--boot-disk-type", "pd-ssd",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(sa) = self.opts.service_account.as_deref().filter(|s| !s.is_empty()) {
            args.extend(["--service-account".to_string(), sa.to_string()]);
        }
        if opts.use_local_ssd {
            args.extend(["--local-ssd".to_string(), "interface=SCSI".to_string()]);
        }
        args.extend([
            "--machine-type".to_string(),
            self.opts.machine_type.clone(),
            "--labels".to_string(),
            lifetime_label(opts.lifetime),
            "--project".to_string(),
            self.opts.project.clone(),
        ]);

        let calls = allocate_zones(names, zones).into_iter().map(|(zone, chunk)| {
            let mut zone_args = args.clone();
            zone_args.extend(["--zone".to_string(), zone.to_string()]);
            zone_args.extend(chunk.iter().cloned());
            async move { run_command(&self.gcloud, &zone_args).await }
        });
        zone_results(join_all(calls).await)
    }

    async fn delete(&self, instances: &[Instance]) -> Result<()> {
        ensure_owned(PROVIDER_NAME, instances)?;

        let mut by_zone: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for vm in instances {
            by_zone.entry(vm.zone.as_str()).or_default().push(vm.name.clone());
        }

        let calls = by_zone.into_iter().map(|(zone, names)| {
            let mut args: Vec<String> = ["compute", "instances", "delete", "--delete-disks", "all"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            args.extend([
                "--project".to_string(),
                self.opts.project.clone(),
                "--zone".to_string(),
                zone.to_string(),
                "--quiet".to_string(),
            ]);
            args.extend(names);
            async move { run_command(&self.gcloud, &args).await }
        });
        zone_results(join_all(calls).await)
    }

    async fn extend(&self, instances: &[Instance], lifetime: Duration) -> Result<()> {
        ensure_owned(PROVIDER_NAME, instances)?;

        // add-labels only takes a single instance.
        for vm in instances {
            let args = vec![
                "compute".to_string(),
                "instances".to_string(),
                "add-labels".to_string(),
                "--project".to_string(),
                self.opts.project.clone(),
                "--zone".to_string(),
                vm.zone.clone(),
                "--labels".to_string(),
                lifetime_label(lifetime),
                vm.name.clone(),
            ];
            run_command(&self.gcloud, &args).await?;
        }
        Ok(())
    }

    async fn active_account(&self) -> Result<Option<String>> {
        let args: Vec<String> = ["auth", "list", "--format", "json", "--filter", "status~ACTIVE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let accounts: Vec<JsonAuth> = run_json_command(&self.gcloud, &args).await?;

        let [account] = accounts.as_slice() else {
            anyhow::bail!("no active accounts found, please configure gcloud");
        };
        account_username(&account.account, self.opts.email_domain.as_deref()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
      {
        "name": "alice-test-0001",
        "labels": {"lifetime": "12h0m0s"},
        "creationTimestamp": "2024-03-01T08:03:09.580-07:00",
        "networkInterfaces": [{
          "network": "https://www.googleapis.com/compute/v1/projects/p/global/networks/default",
          "networkIP": "10.142.0.2",
          "accessConfigs": [{"name": "external-nat", "natIP": "35.1.2.3"}]
        }],
        "machineType": "https://www.googleapis.com/compute/v1/projects/p/zones/us-east1-b/machineTypes/n1-standard-4",
        "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-east1-b"
      },
      {
        "name": "bob-x-0001",
        "labels": {"lifetime": "forever"},
        "creationTimestamp": "2024-03-01T10:00:00Z",
        "networkInterfaces": [],
        "machineType": "n1-standard-4",
        "zone": "us-west1-b"
      }
    ]"#;

    fn parse_listing() -> Vec<Instance> {
        let vms: Vec<JsonVm> = serde_json::from_str(LISTING).unwrap();
        vms.into_iter()
            .map(|vm| vm.into_instance("p", "ubuntu"))
            .collect()
    }

    #[test]
    fn healthy_vm_conversion() {
        let vms = parse_listing();
        let vm = &vms[0];
        assert!(vm.errors.is_empty());
        assert_eq!(vm.provider, PROVIDER_NAME);
        assert_eq!(vm.lifetime, Duration::hours(12));
        assert_eq!(vm.zone, "us-east1-b");
        assert_eq!(vm.machine_type, "n1-standard-4");
        assert_eq!(vm.vpc, "default");
        assert_eq!(vm.private_ip, "10.142.0.2");
        assert_eq!(vm.public_ip, "35.1.2.3");
        assert_eq!(vm.dns, "alice-test-0001.us-east1-b.p");
        assert_eq!(vm.remote_user, "ubuntu");
        assert_eq!(vm.created_at.to_rfc3339(), "2024-03-01T15:03:09.580+00:00");
    }

    #[test]
    fn bad_labels_and_network_are_reported_per_instance() {
        let vms = parse_listing();
        let kinds: Vec<ErrorKind> = vms[1].errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::NoExpiration, ErrorKind::BadNetwork]);
    }

    #[test]
    fn zone_allocation_spreads_leftovers() {
        let names: Vec<String> = (1..=5).map(|i| format!("n{}", i)).collect();
        let zones: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let alloc = allocate_zones(&names, &zones);
        let sizes: Vec<(&str, usize)> = alloc.iter().map(|(z, c)| (*z, c.len())).collect();
        assert_eq!(sizes, vec![("a", 2), ("b", 2), ("c", 1)]);

        let single = allocate_zones(&names, &zones[..1]);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].1.len(), 5);
    }

    #[test]
    fn lifetime_labels_hold_whole_seconds() {
        assert_eq!(lifetime_label(Duration::hours(12)), "lifetime=12h0m0s");
        assert_eq!(lifetime_label(Duration::milliseconds(1500)), "lifetime=2s");
        assert_eq!(
            lifetime_label(Duration::minutes(90) + Duration::milliseconds(200)),
            "lifetime=1h30m0s"
        );
    }

    #[test]
    fn account_username_checks_the_domain() {
        assert_eq!(account_username("alice@example.com", None).unwrap(), "alice");
        assert_eq!(
            account_username("alice@example.com", Some("@example.com")).unwrap(),
            "alice"
        );
        let err = account_username("alice@gmail.com", Some("@example.com")).unwrap_err();
        assert!(err.to_string().contains("does not belong to domain @example.com"));
    }

    #[test]
    fn zone_failures_are_all_reported() {
        assert!(zone_results(vec![Ok(()), Ok(())]).is_ok());

        let one = zone_results(vec![Ok(()), Err(anyhow::anyhow!("zone-b down"))]).unwrap_err();
        assert_eq!(one.to_string(), "zone-b down");

        let two = zone_results(vec![
            Err(anyhow::anyhow!("zone-a down")),
            Err(anyhow::anyhow!("zone-b down")),
        ])
        .unwrap_err();
        assert_eq!(two.to_string(), "2 zone commands failed: zone-a down; zone-b down");
    }

    /// Fake `gcloud` that fails at once for zone-a and touches `marker`
    /// after a delay for any other zone.
    #[cfg(unix)]
    fn fake_gcloud(test: &str) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("fleet-gce-{}-{}", test, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let marker = dir.join("slow-zone-done");
        let _ = std::fs::remove_file(&marker);
        let script = dir.join("gcloud");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ncase \"$*\" in\n  *\"--zone zone-a \"*) echo 'quota exceeded' >&2; exit 1 ;;\nesac\nsleep 1\ntouch '{}'\n",
                marker.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, marker)
    }

    #[cfg(unix)]
    fn two_zone_provider(gcloud: PathBuf) -> GceProvider {
        let opts = GceOptions {
            zones: vec!["zone-a".to_string(), "zone-b".to_string()],
            ..GceOptions::default()
        };
        GceProvider::with_cli(opts, gcloud)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn create_waits_for_every_zone_before_failing() {
        let (gcloud, marker) = fake_gcloud("create");
        let provider = two_zone_provider(gcloud);
        let opts = CreateOpts {
            geo_distributed: true,
            ..CreateOpts::default()
        };

        let names = vec!["alice-t-0001".to_string(), "alice-t-0002".to_string()];
        let err = provider.create(&names, &opts).await.unwrap_err();
        assert!(format!("{:#}", err).contains("quota exceeded"));
        assert!(marker.exists(), "zone-b command still running after create returned");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delete_waits_for_every_zone_before_failing() {
        let (gcloud, marker) = fake_gcloud("delete");
        let provider = two_zone_provider(gcloud);

        let now = chrono::Utc::now();
        let mut a = Instance::new("alice-t-0001", PROVIDER_NAME, now, Duration::hours(1));
        a.zone = "zone-a".to_string();
        let mut b = Instance::new("alice-t-0002", PROVIDER_NAME, now, Duration::hours(1));
        b.zone = "zone-b".to_string();

        let err = provider.delete(&[a, b]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("quota exceeded"));
        assert!(marker.exists(), "zone-b command still running after delete returned");
    }
}
