//! EPM packages
//!
//! Install, remove and inspect packages through the Fleet EPM API.

use crate::client::{
    Body, FLEET_API, KibanaClient, KibanaError, RawResponse, ResourceKind, Result, decode_json,
};
use crate::packages::Asset;
use crate::pagination::{Cursor, CursorStyle, ListEnvelope, PageRequest};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;

const INSTALLED_PACKAGES_PER_PAGE: usize = 100;

/// Package as returned by `GET /api/fleet/epm/packages/{name}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetPackage {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default)]
    pub package_type: String,
    /// `installed`, `not_installed`, `installing`...
    #[serde(default)]
    pub status: String,
    #[serde(rename = "savedObject", default)]
    saved_object: Option<SavedObjectInfo>,
    #[serde(rename = "installationInfo", default)]
    installation_info: Option<InstalledAssets>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SavedObjectInfo {
    #[serde(default)]
    attributes: InstalledAssets,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InstalledAssets {
    #[serde(default)]
    installed_es: Vec<Asset>,
    #[serde(default)]
    installed_kibana: Vec<Asset>,
}

impl FleetPackage {
    /// Installed Elasticsearch and Kibana assets.
    ///
    /// Older servers report them in the package saved object, newer ones in
    /// `installationInfo`.
    pub fn assets(&self) -> Vec<Asset> {
        let installed = self
            .saved_object
            .as_ref()
            .map(|so| &so.attributes)
            .or(self.installation_info.as_ref());
        match installed {
            Some(i) => i
                .installed_es
                .iter()
                .chain(i.installed_kibana.iter())
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.status == "installed"
    }
}

/// Entry of the installed packages listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for InstalledPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetAttributes {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Asset details from the bulk assets API.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageAsset {
    pub id: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub attributes: AssetAttributes,
}

impl std::fmt::Display for PackageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (ID: {}, Type: {})",
            self.attributes.title, self.id, self.asset_type
        )
    }
}

#[derive(Deserialize)]
struct PackageEnvelope {
    #[serde(default)]
    response: Option<FleetPackage>,
    #[serde(default)]
    item: Option<FleetPackage>,
}

#[derive(Deserialize)]
struct ErrorMessage {
    #[serde(default)]
    message: String,
}

/// Assets reported by an install or remove call.
fn package_results(action: &str, path: &str, response: RawResponse) -> Result<Vec<Asset>> {
    let operation = format!("{} package", action);
    let body = response.expect_ok(&operation, path)?;
    let envelope: ListEnvelope<Asset> = decode_json(&operation, &body)?;
    Ok(envelope.into_page().items)
}

impl KibanaClient {
    /// Install a package version, reinstalling or downgrading as needed.
    pub async fn install_package(&self, name: &str, version: &str) -> Result<Vec<Asset>> {
        let path = self.wire_format().await?.package_url(name, Some(version));
        let response = self.post_json(&path, &json!({ "force": true })).await?;
        let assets = package_results("install", &path, response)?;
        log::info!("Installed package {}-{} ({} assets)", name, version, assets.len());
        Ok(assets)
    }

    /// Check whether zip archives can be uploaded.
    ///
    /// An empty upload is answered with 400 when the API is usable.
    ///
    /// # Errors
    /// [`KibanaError::NotSupported`] when the license does not allow uploads.
    pub async fn ensure_zip_package_can_be_installed(&self) -> Result<()> {
        let path = format!("{}/epm/packages", FLEET_API);
        let response = self
            .send(Method::POST, &HashMap::new(), &path, &[], Body::Zip(Vec::new()))
            .await?;
        match response.status {
            StatusCode::BAD_REQUEST => Ok(()),
            StatusCode::FORBIDDEN => {
                let resp: ErrorMessage = decode_json("check zip package upload", &response.body)?;
                if resp.message == "Requires Enterprise license" {
                    Err(KibanaError::not_supported("zip package upload"))
                } else {
                    Err(KibanaError::api(
                        "check zip package upload",
                        path,
                        403,
                        &response.body,
                    ))
                }
            }
            status => Err(KibanaError::api(
                "check zip package upload",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    /// Upload and install a package zip archive.
    pub async fn install_zip_package(&self, zip_file: &Path) -> Result<Vec<Asset>> {
        let archive = tokio::fs::read(zip_file).await?;
        let path = format!("{}/epm/packages", FLEET_API);
        let response = self
            .send(Method::POST, &HashMap::new(), &path, &[], Body::Zip(archive))
            .await?;
        let assets = package_results("zip-install", &path, response)?;
        log::info!("Installed package from {} ({} assets)", zip_file.display(), assets.len());
        Ok(assets)
    }

    /// Uninstall a package version.
    pub async fn remove_package(&self, name: &str, version: &str) -> Result<Vec<Asset>> {
        let path = self.wire_format().await?.package_url(name, Some(version));
        let response = self.delete(&path).await?;
        let assets = package_results("remove", &path, response)?;
        log::info!("Removed package {}-{}", name, version);
        Ok(assets)
    }

    /// Fetch package details, whether installed or not.
    pub async fn get_package(&self, name: &str) -> Result<FleetPackage> {
        let path = self.wire_format().await?.package_url(name, None);
        let response = self.get(&path).await?;
        match response.status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(KibanaError::not_found(ResourceKind::Package, name));
            }
            status => {
                return Err(KibanaError::api(
                    "get package",
                    path,
                    status.as_u16(),
                    &response.body,
                ));
            }
        }
        let envelope: PackageEnvelope = decode_json("get package", &response.body)?;
        envelope
            .response
            .or(envelope.item)
            .ok_or_else(|| {
                KibanaError::api(
                    format!("get package {}: package missing from response", name),
                    path,
                    200,
                    &response.body,
                )
            })
    }

    /// Every installed package, sorted by name.
    pub async fn find_installed_packages(&self) -> Result<Vec<InstalledPackage>> {
        let mut installed: Vec<InstalledPackage> = self
            .drain_list("find installed packages", CursorStyle::SearchAfter, |cursor| {
                let request = PageRequest::new(format!("{}/epm/packages/installed", FLEET_API))
                    .param("perPage", INSTALLED_PACKAGES_PER_PAGE);
                match cursor {
                    Cursor::SearchAfter(Some(after)) => request.param("searchAfter", after),
                    _ => request,
                }
            })
            .await?;
        installed.sort_by_key(|p| p.name.to_lowercase());
        Ok(installed)
    }

    /// Titles and descriptions of installed assets, sorted by title.
    pub async fn get_data_from_package_asset_ids(
        &self,
        assets: &[Asset],
    ) -> Result<Vec<PackageAsset>> {
        #[derive(Deserialize)]
        struct BulkAssets {
            #[serde(default)]
            items: Vec<PackageAsset>,
        }

        let path = format!("{}/epm/bulk_assets", FLEET_API);
        let response = self.post_json(&path, &json!({ "assetIds": assets })).await?;
        let body = response.expect_ok("get assets", &path)?;
        let mut resp: BulkAssets = decode_json("get assets", &body)?;
        resp.items
            .sort_by_key(|a| a.attributes.title.to_lowercase());
        Ok(resp.items)
    }
}
