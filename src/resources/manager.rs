//! Applies a list of resources against named Kibana providers

use super::Resource;
use crate::client::{KibanaClient, KibanaError};

use eyre::{Report, Result, WrapErr};
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Provider used by resources that do not name one.
pub const DEFAULT_PROVIDER: &str = "kibana";

/// Providers and cancellation shared by the resources of one apply.
pub struct Context {
    providers: HashMap<String, KibanaClient>,
    cancel: CancellationToken,
}

impl Context {
    /// Client registered under `name`, or under the default name when empty.
    pub fn provider(&self, name: &str) -> Result<&KibanaClient> {
        let name = if name.is_empty() { DEFAULT_PROVIDER } else { name };
        self.providers
            .get(name)
            .ok_or_else(|| eyre::eyre!("provider {:?} must be explicitly defined", name))
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        })
    }
}

/// Outcome for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub resource: String,
    pub action: Action,
}

/// An apply that stopped early, with the resources handled before the failure.
#[derive(Debug)]
pub struct ApplyError {
    pub applied: Vec<Applied>,
    pub source: Report,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "apply failed after {} resource(s): {:#}",
            self.applied.len(),
            self.source
        )
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + Send + Sync + 'static) = self.source.as_ref();
        Some(source)
    }
}

pub struct Manager {
    context: Context,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Manager whose applies stop when `cancel` fires.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            context: Context {
                providers: HashMap::new(),
                cancel,
            },
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, client: KibanaClient) {
        self.context.providers.insert(name.into(), client);
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Bring every resource to its desired state, in order.
    ///
    /// Stops at the first failure; resources after it are not touched.
    pub async fn apply(
        &self,
        resources: &mut [Box<dyn Resource>],
    ) -> std::result::Result<Vec<Applied>, ApplyError> {
        let mut applied = Vec::with_capacity(resources.len());
        for resource in resources.iter_mut() {
            let name = resource.to_string();
            match self.apply_one(resource.as_mut(), &name).await {
                Ok(action) => {
                    log::info!("{} {}", name.cyan(), action);
                    applied.push(Applied {
                        resource: name,
                        action,
                    });
                }
                Err(source) => return Err(ApplyError { applied, source }),
            }
        }
        Ok(applied)
    }

    async fn apply_one(&self, resource: &mut dyn Resource, name: &str) -> Result<Action> {
        let ctx = &self.context;
        if ctx.cancel.is_cancelled() {
            return Err(KibanaError::Cancelled {
                operation: format!("apply {}", name),
            }
            .into());
        }

        let observation = resource
            .observe(ctx)
            .await
            .wrap_err_with(|| format!("failed to get state of {}", name))?;
        log::debug!("{} observed: {:?}", name, observation);

        if !observation.found {
            resource
                .create(ctx)
                .await
                .wrap_err_with(|| format!("failed to create {}", name))?;
            Ok(Action::Created)
        } else if observation.needs_update {
            resource
                .update(ctx)
                .await
                .wrap_err_with(|| format!("failed to update {}", name))?;
            Ok(Action::Updated)
        } else {
            Ok(Action::Unchanged)
        }
    }
}
