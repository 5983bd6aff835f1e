/// Instance naming helpers shared by the providers and the orchestrator.
///
/// Non-local instances are named `<owner>-<cluster-id>-<node-index>`. The
/// cluster is everything except the trailing node index, so owners and
/// cluster ids may themselves contain `-`.
use crate::{ErrorKind, InstanceError};

/// Sentinel used as owner, cluster and provider id for the local pseudo-cluster.
pub const LOCAL: &str = "local";

pub const NAME_FORMAT: &str = "user-<clusterid>-<nodeid>";

const DELIMITER: char = '-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNames {
    pub owner: String,
    pub cluster: String,
}

/// Decode `(owner, cluster)` from a raw instance name.
///
/// - Local instances short-circuit to the local sentinel
/// - Fewer than three `-` separated parts is an `InvalidName` error
/// - `owner` is the first part, `cluster` is all parts but the last
pub fn parse_instance_name(name: &str, is_local: bool) -> Result<ClusterNames, InstanceError> {
    if is_local {
        return Ok(ClusterNames {
            owner: LOCAL.to_string(),
            cluster: LOCAL.to_string(),
        });
    }

    let parts: Vec<&str> = name.split(DELIMITER).collect();
    if parts.len() < 3 {
        return Err(InstanceError::new(
            ErrorKind::InvalidName,
            format!("expected instance name in the form {}, got {}", NAME_FORMAT, name),
        ));
    }

    Ok(ClusterNames {
        owner: parts[0].to_string(),
        cluster: parts[..parts.len() - 1].join("-"),
    })
}

/// Name of the `index`-th (1-based) node of `cluster`, e.g. `alice-test-0001`.
pub fn node_name(cluster: &str, index: usize) -> String {
    format!("{}-{:04}", cluster, index)
}

/// Owner prefix of a cluster name about to be created.
///
/// Returns None when the name could never round-trip through
/// [`parse_instance_name`] once a node index is appended. The bare local
/// sentinel is one of those: `local-0001` has no cluster id.
pub fn cluster_owner(cluster: &str) -> Option<&str> {
    let cluster = cluster.trim();
    let (owner, rest) = cluster.split_once(DELIMITER)?;
    if owner.is_empty() || rest.is_empty() {
        return None;
    }
    Some(owner)
}
