//! Package policies

use super::ItemResponse;
use crate::client::{FLEET_API, KibanaClient, KibanaError, ResourceKind, Result, decode_json};
use crate::codec::{Legacy, PackagePolicy, WireFormat, select_wire_format};
use crate::pagination::{Cursor, CursorStyle, PageRequest};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
struct CreatedId {
    id: String,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

impl KibanaClient {
    /// Wire format matching the server version.
    pub async fn wire_format(&self) -> Result<Box<dyn WireFormat>> {
        let version = self.semver().await?;
        Ok(select_wire_format(version.as_ref()))
    }

    /// Create a package policy and return it with the id Fleet assigned.
    ///
    /// Only the id is taken from the response; the submitted policy is
    /// otherwise kept as is.
    pub async fn create_package_policy(&self, policy: &PackagePolicy) -> Result<PackagePolicy> {
        let format = self.wire_format().await?;
        let body = format.encode_package_policy(policy)?;
        let path = format!("{}/package_policies", FLEET_API);
        log::debug!(
            "Creating package policy {} ({} format)",
            policy.name,
            format.name()
        );

        let response = self.post_json(&path, &body).await?;
        match response.status {
            StatusCode::OK => {}
            StatusCode::CONFLICT => {
                return Err(KibanaError::conflict(ResourceKind::PackagePolicy, &policy.name));
            }
            status => {
                return Err(KibanaError::api(
                    format!("create package policy (req {})", body),
                    path,
                    status.as_u16(),
                    &response.body,
                ));
            }
        }

        let created: ItemResponse<CreatedId> =
            decode_json("create package policy", &response.body)?;
        log::info!("Created package policy {} ({})", policy.name, created.item.id);

        let mut policy = policy.clone();
        policy.id = Some(created.item.id);
        Ok(policy)
    }

    /// Fetch a package policy.
    pub async fn get_package_policy(&self, id: &str) -> Result<PackagePolicy> {
        let item = self.get_raw_package_policy(id).await?;
        // Reads return the array-based shape unless the simplified one was asked for.
        if item.get("inputs").is_some_and(Value::is_array) {
            Legacy.decode_package_policy(&item)
        } else {
            self.wire_format().await?.decode_package_policy(&item)
        }
    }

    pub async fn get_raw_package_policy(&self, id: &str) -> Result<Value> {
        let path = format!("{}/package_policies/{}", FLEET_API, id);
        let response = self.get(&path).await?;
        match response.status {
            StatusCode::OK => {
                let resp: ItemResponse<Value> = decode_json("get package policy", &response.body)?;
                Ok(resp.item)
            }
            StatusCode::NOT_FOUND => Err(KibanaError::not_found(ResourceKind::PackagePolicy, id)),
            status => Err(KibanaError::api(
                "get package policy",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    /// List every package policy, including upgrade availability.
    pub async fn list_raw_package_policies(&self) -> Result<Vec<Value>> {
        self.drain_list(
            "list package policies",
            CursorStyle::Counted,
            |cursor| {
                let request = PageRequest::new(format!("{}/package_policies", FLEET_API))
                    .param("showUpgradeable", "true");
                match cursor {
                    Cursor::Page(n) => request.param("page", n),
                    Cursor::SearchAfter(_) => request,
                }
            },
        )
        .await
    }

    /// Upgrade package policies to the latest installed package version in one request.
    ///
    /// # Errors
    /// [`KibanaError::Rejected`] with Fleet's message when it refuses the upgrade.
    pub async fn upgrade_package_policies_to_latest(&self, ids: &[&str]) -> Result<()> {
        let path = format!("{}/package_policies/upgrade", FLEET_API);
        let response = self
            .post_json(&path, &json!({ "packagePolicyIds": ids }))
            .await?;
        match response.status {
            StatusCode::OK => Ok(()),
            StatusCode::BAD_REQUEST => {
                let message = serde_json::from_slice::<ErrorMessage>(&response.body)
                    .map(|m| m.message)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
                Err(KibanaError::Rejected {
                    operation: "upgrade package".to_string(),
                    message,
                })
            }
            status => Err(KibanaError::api(
                "upgrade package policies",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    /// Delete a package policy.
    pub async fn delete_package_policy(&self, id: &str) -> Result<()> {
        let path = format!("{}/package_policies/{}", FLEET_API, id);
        let response = self.delete(&path).await?;
        match response.status {
            StatusCode::OK => {
                log::info!("Deleted package policy {}", id);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(KibanaError::not_found(ResourceKind::PackagePolicy, id)),
            status => Err(KibanaError::api(
                "delete package policy",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }
}
