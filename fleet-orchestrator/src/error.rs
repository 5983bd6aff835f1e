use std::fmt;

/// Mutation dispatched to providers by the fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Delete,
    Extend,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Delete => "delete",
            Operation::Extend => "extend",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: anyhow::Error,
}

/// Every provider task that failed in one fan-out, in dispatch order.
/// Successful siblings are not rolled back.
#[derive(Debug)]
pub struct FanOutError {
    pub op: Operation,
    pub target: String,
    pub failures: Vec<ProviderFailure>,
}

impl FanOutError {
    pub fn first(&self) -> Option<&ProviderFailure> {
        self.failures.first()
    }
}

impl fmt::Display for FanOutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} failed", self.op, self.target)?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}: {:#}", sep, failure.provider, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for FanOutError {}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("no providers configured")]
    NoProviders,
    #[error("unknown provider {0:?}")]
    UnknownProvider(String),
    #[error("invalid cluster name {0:?}, expected <user>-<clusterid>")]
    InvalidClusterName(String),
    #[error("invalid node count {0}, must be at least 1")]
    InvalidNodeCount(usize),
    #[error("cluster {cluster:?} must be prefixed with the account {account:?} active on {provider}, not {owner:?}")]
    OwnerMismatch {
        cluster: String,
        owner: String,
        provider: String,
        account: String,
    },
    #[error("resolving the active account on {provider} failed: {error:#}")]
    Account {
        provider: String,
        error: anyhow::Error,
    },
    #[error("cluster {0:?} not found")]
    ClusterNotFound(String),
    #[error("listing instances from {provider} failed: {error:#}")]
    Listing {
        provider: String,
        error: anyhow::Error,
    },
    #[error(transparent)]
    FanOut(#[from] FanOutError),
}
