//! Fleet outputs, Fleet Server hosts and service tokens

use crate::client::{FLEET_API, KibanaClient, KibanaError, ResourceKind, Result, decode_json};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSsl {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_authorities: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub certificate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

/// Where agents ship their data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetOutput {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub output_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<AgentSsl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetServerHost {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "host_urls", default)]
    pub urls: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceToken {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize)]
struct HostList {
    #[serde(default)]
    items: Vec<FleetServerHost>,
}

impl KibanaClient {
    /// First URL of the default Fleet Server host.
    pub async fn default_fleet_server_url(&self) -> Result<String> {
        let path = format!("{}/fleet_server_hosts", FLEET_API);
        let body = self.get_ok("get fleet server hosts", &path, &[]).await?;
        let hosts: HostList = decode_json("get fleet server hosts", &body)?;
        hosts
            .items
            .into_iter()
            .filter(|h| h.is_default)
            .find_map(|h| h.urls.into_iter().next())
            .ok_or_else(|| KibanaError::not_found(ResourceKind::FleetServerHost, "default"))
    }

    pub async fn add_fleet_output(&self, output: &FleetOutput) -> Result<()> {
        let path = format!("{}/outputs", FLEET_API);
        let response = self.post_json(&path, output).await?;
        match response.status {
            StatusCode::OK => {
                log::info!("Added fleet output {}", output.name);
                Ok(())
            }
            StatusCode::CONFLICT => Err(KibanaError::conflict(ResourceKind::Output, &output.name)),
            status => Err(KibanaError::api(
                "add fleet output",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    pub async fn update_fleet_output(&self, output: &FleetOutput, id: &str) -> Result<()> {
        let path = format!("{}/outputs/{}", FLEET_API, id);
        let response = self.put_json(&path, output).await?;
        response.expect_ok("update fleet output", &path)?;
        log::info!("Updated fleet output {}", id);
        Ok(())
    }

    /// Delete an output; a missing output is not an error.
    pub async fn remove_fleet_output(&self, id: &str) -> Result<()> {
        let path = format!("{}/outputs/{}", FLEET_API, id);
        let response = self.delete(&path).await?;
        match response.status {
            StatusCode::OK => {
                log::info!("Removed fleet output {}", id);
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                log::debug!("Fleet output {} already removed", id);
                Ok(())
            }
            status => Err(KibanaError::api(
                "remove fleet output",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    pub async fn add_fleet_server_host(&self, host: &FleetServerHost) -> Result<()> {
        let path = format!("{}/fleet_server_hosts", FLEET_API);
        let response = self.post_json(&path, host).await?;
        match response.status {
            StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(KibanaError::conflict(
                ResourceKind::FleetServerHost,
                &host.name,
            )),
            status => Err(KibanaError::api(
                "add fleet server host",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    /// Update a Fleet Server host by its id; the id itself is not sent.
    pub async fn update_fleet_server_host(&self, host: &FleetServerHost) -> Result<()> {
        if host.id.is_empty() {
            return Err(KibanaError::InvalidRequest(
                "fleet server host id required for updates".to_string(),
            ));
        }
        let path = format!("{}/fleet_server_hosts/{}", FLEET_API, host.id);
        let payload = FleetServerHost {
            id: String::new(),
            ..host.clone()
        };
        let response = self.put_json(&path, &payload).await?;
        response.expect_ok("update fleet server host", &path)?;
        Ok(())
    }

    pub async fn create_fleet_service_token(&self) -> Result<ServiceToken> {
        let path = format!("{}/service_tokens", FLEET_API);
        let response = self.post_empty(&path).await?;
        let body = response.expect_ok("create fleet service token", &path)?;
        decode_json("create fleet service token", &body)
    }
}
