//! Declarative provisioning
//!
//! A desired state is a list of [`Resource`]s. The [`Manager`] observes each
//! one against Kibana and creates or updates it when it differs, in order.

mod desired;
mod fleet_package;
mod fleet_policy;
mod manager;

pub use desired::{DesiredState, PackagePolicySpec, PackageSpec, PolicySpec};
pub use fleet_package::FleetPackage;
pub use fleet_policy::{FleetAgentPolicy, FleetPackagePolicy};
pub use manager::{Action, ApplyError, Applied, Context, DEFAULT_PROVIDER, Manager};

use async_trait::async_trait;
use eyre::Result;
use std::fmt;

/// What the manager learned about a resource before applying it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    /// The resource is in its expected presence state; `false` means it
    /// must be created.
    pub found: bool,
    pub needs_update: bool,
}

/// A remote resource with a desired state.
#[async_trait]
pub trait Resource: fmt::Display + Send + Sync {
    async fn observe(&self, ctx: &Context) -> Result<Observation>;

    async fn create(&mut self, ctx: &Context) -> Result<()>;

    async fn update(&mut self, ctx: &Context) -> Result<()>;
}
