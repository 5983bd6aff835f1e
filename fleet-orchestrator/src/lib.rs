//! Cluster inventory and lifecycle orchestration across cloud providers.
//!
//! Instances listed by every registered [`fleet_providers::CloudProvider`] are
//! grouped into clusters by name, lifetimes are derived against the hourly GC
//! sweep, and create/destroy/extend run as concurrent per-provider fan-outs.

pub mod cluster;
pub mod collate;
pub mod error;
pub mod fanout;
pub mod inventory;
pub mod logger;
pub mod ops;
pub mod provider_manager;
pub mod settings;

pub use cluster::{Cluster, Lifecycle};
pub use error::{FanOutError, FleetError, Operation, ProviderFailure};
pub use inventory::Inventory;
pub use provider_manager::{ProviderManager, ProviderRegistry};
pub use settings::Settings;
