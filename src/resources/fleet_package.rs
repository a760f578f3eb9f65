//! Fleet package presence

use super::{Context, DEFAULT_PROVIDER, Observation, Resource};
use crate::client::{KibanaClient, KibanaError, Result as KibanaResult};
use crate::packages::Asset;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use semver::Version;
use std::fmt;
use std::path::PathBuf;

const NOT_INSTALLED: &str = "not_installed";

/// A package that must be installed (or absent) in Fleet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetPackage {
    /// Provider name, [`DEFAULT_PROVIDER`] when empty
    pub provider: String,
    pub name: String,
    pub version: String,
    /// Zip archive to upload instead of installing from the registry
    pub archive: Option<PathBuf>,
    pub absent: bool,
    /// Reinstall or remove even when the state already matches
    pub force: bool,
}

impl fmt::Display for FleetPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider = if self.provider.is_empty() {
            DEFAULT_PROVIDER
        } else {
            &self.provider
        };
        write!(f, "[FleetPackage:{}:{}-{}]", provider, self.name, self.version)
    }
}

impl FleetPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    fn observation(
        &self,
        status: &str,
        installed_version: &str,
        kibana: Option<&Version>,
    ) -> Observation {
        let installed = status != NOT_INSTALLED;
        let found = self.absent || installed;
        let needs_update = if self.absent {
            if !installed {
                self.force
            } else if self.name == "system" && kibana.is_some_and(|v| v.major < 8) {
                // Installed in the default policy of 7.x stacks and cannot be removed.
                false
            } else {
                // Always in use by the agent running Fleet Server.
                self.name != "fleet_server"
            }
        } else if status == "installed" && installed_version == self.version {
            self.force
        } else {
            true
        };
        Observation {
            found,
            needs_update,
        }
    }

    async fn install(&self, client: &KibanaClient) -> KibanaResult<Vec<Asset>> {
        match &self.archive {
            Some(archive) => {
                client.ensure_zip_package_can_be_installed().await?;
                client.install_zip_package(archive).await
            }
            None => client.install_package(&self.name, &self.version).await,
        }
    }

    async fn uninstall(&self, client: &KibanaClient) -> Result<()> {
        client
            .remove_package(&self.name, &self.version)
            .await
            .wrap_err("can't remove the package")?;
        Ok(())
    }
}

#[async_trait]
impl Resource for FleetPackage {
    async fn observe(&self, ctx: &Context) -> Result<Observation> {
        let client = ctx.provider(&self.provider)?;
        let (status, version) = match client.get_package(&self.name).await {
            Ok(package) => (package.status, package.version),
            Err(e) if e.is_not_found() => (NOT_INSTALLED.to_string(), String::new()),
            Err(e) => {
                return Err(e).wrap_err_with(|| {
                    format!("failed to get current installation state for package {:?}", self.name)
                });
            }
        };
        let kibana = client
            .semver()
            .await
            .wrap_err("failed to get current kibana version")?;
        Ok(self.observation(&status, &version, kibana.as_ref()))
    }

    async fn create(&mut self, ctx: &Context) -> Result<()> {
        let client = ctx.provider(&self.provider)?;
        let cancel = ctx.cancellation();

        let installed = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(KibanaError::Cancelled {
                operation: format!("install package {}", self.name),
            }),
            result = self.install(client) => result,
        };

        match installed {
            Ok(assets) => {
                log::debug!("Package {} installed {} asset(s)", self.name, assets.len());
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                // Not bound to the cancelled token, so it runs to completion.
                if let Err(uninstall) = self.uninstall(client).await {
                    return Err(eyre::eyre!(
                        "failed to uninstall package ({:#}) after installation failed: {}",
                        uninstall,
                        e
                    ));
                }
                Err(e).wrap_err("installation failed")
            }
            Err(e) => Err(e).wrap_err("installation failed"),
        }
    }

    async fn update(&mut self, ctx: &Context) -> Result<()> {
        if self.absent {
            let client = ctx.provider(&self.provider)?;
            return self.uninstall(client).await;
        }
        self.create(ctx).await
    }
}
