//! Agent policies

use super::ItemResponse;
use crate::client::{FLEET_API, KibanaClient, KibanaError, ResourceKind, Result, decode_json};
use crate::pagination::{Cursor, CursorStyle, PageRequest};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// An agent policy.
///
/// `revision` is owned by Fleet and bumped on every change; it is only read
/// back, never sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing)]
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monitoring_enabled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_output_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_output_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_default_fleet_server: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Map<String, Value>>,
}

impl Policy {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

impl KibanaClient {
    /// Create an agent policy.
    ///
    /// # Errors
    /// [`KibanaError::Conflict`] when a policy with the same name exists.
    pub async fn create_policy(&self, policy: &Policy) -> Result<Policy> {
        let path = format!("{}/agent_policies", FLEET_API);
        let response = self.post_json(&path, policy).await?;
        match response.status {
            StatusCode::OK => {}
            StatusCode::CONFLICT => {
                return Err(KibanaError::conflict(ResourceKind::AgentPolicy, &policy.name));
            }
            status => {
                return Err(KibanaError::api(
                    "create policy",
                    path,
                    status.as_u16(),
                    &response.body,
                ));
            }
        }
        let created: ItemResponse<Policy> = decode_json("create policy", &response.body)?;
        log::info!("Created agent policy {} ({})", created.item.name, created.item.id);
        Ok(created.item)
    }

    /// Fetch an agent policy.
    pub async fn get_policy(&self, id: &str) -> Result<Policy> {
        let body = self.get_policy_body(id, "").await?;
        let resp: ItemResponse<Policy> = decode_json("get policy", &body)?;
        Ok(resp.item)
    }

    /// Fetch an agent policy as undecoded JSON.
    pub async fn get_raw_policy(&self, id: &str) -> Result<Value> {
        let body = self.get_policy_body(id, "").await?;
        let resp: ItemResponse<Value> = decode_json("get policy", &body)?;
        Ok(resp.item)
    }

    /// Download the policy as agents receive it.
    pub async fn download_policy(&self, id: &str) -> Result<Vec<u8>> {
        self.get_policy_body(id, "/download").await
    }

    async fn get_policy_body(&self, id: &str, suffix: &str) -> Result<Vec<u8>> {
        let path = format!("{}/agent_policies/{}{}", FLEET_API, id, suffix);
        let response = self.get(&path).await?;
        match response.status {
            StatusCode::OK => Ok(response.body),
            StatusCode::NOT_FOUND => Err(KibanaError::not_found(ResourceKind::AgentPolicy, id)),
            status => Err(KibanaError::api(
                "get policy",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    /// List every agent policy with its package policies.
    pub async fn list_raw_policies(&self) -> Result<Vec<Value>> {
        self.drain_list("list policies", CursorStyle::Counted, |cursor| match cursor {
            Cursor::Page(n) => PageRequest::new(format!("{}/agent_policies", FLEET_API))
                .param("full", "true")
                .param("page", n),
            Cursor::SearchAfter(_) => {
                PageRequest::new(format!("{}/agent_policies", FLEET_API)).param("full", "true")
            }
        })
        .await
    }

    /// Delete an agent policy.
    pub async fn delete_policy(&self, id: &str) -> Result<()> {
        let path = format!("{}/agent_policies/delete", FLEET_API);
        let response = self.post_json(&path, &json!({ "agentPolicyId": id })).await?;
        match response.status {
            StatusCode::OK => {
                log::info!("Deleted agent policy {}", id);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(KibanaError::not_found(ResourceKind::AgentPolicy, id)),
            status => Err(KibanaError::api(
                "delete policy",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }
}
