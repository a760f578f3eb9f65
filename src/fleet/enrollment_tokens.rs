//! Enrollment API keys

use super::ItemResponse;
use crate::client::{FLEET_API, KibanaClient, KibanaError, Result, decode_json};
use crate::pagination::{Cursor, CursorStyle, PageRequest};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnrollmentToken {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub policy_id: String,
}

impl KibanaClient {
    /// API key for enrolling agents into a policy.
    ///
    /// Reuses the newest active token of the policy and only creates one when
    /// there is none.
    pub async fn get_enrollment_token_for_policy(&self, policy_id: &str) -> Result<String> {
        let kuery = format!("active:true and policy_id:{}", policy_id);
        let tokens = self.list_enrollment_tokens(&kuery).await?;
        // Fleet lists the newest token first.
        if let Some(token) = tokens.into_iter().next() {
            return Ok(token.api_key);
        }

        log::debug!("No active enrollment token for policy {}, requesting one", policy_id);
        let token = self.request_enrollment_token(policy_id).await?;
        if !token.active {
            return Err(KibanaError::InvalidRequest(format!(
                "requested enrollment token {} is not active",
                token.id
            )));
        }
        Ok(token.api_key)
    }

    /// Enrollment tokens matching a KQL query.
    pub async fn list_enrollment_tokens(&self, kuery: &str) -> Result<Vec<EnrollmentToken>> {
        self.drain_list("get enrollment tokens", CursorStyle::Counted, |cursor| {
            let page = match cursor {
                Cursor::Page(n) => *n,
                Cursor::SearchAfter(_) => 1,
            };
            PageRequest::new(format!("{}/enrollment_api_keys", FLEET_API))
                .param("page", page)
                .param("kuery", kuery)
        })
        .await
    }

    async fn request_enrollment_token(&self, policy_id: &str) -> Result<EnrollmentToken> {
        let path = format!("{}/enrollment_api_keys", FLEET_API);
        let response = self
            .post_json(&path, &json!({ "policy_id": policy_id }))
            .await?;
        let body = response.expect_ok("request enrollment token", &path)?;
        let resp: ItemResponse<EnrollmentToken> = decode_json("request enrollment token", &body)?;
        log::info!("Created enrollment token {} for policy {}", resp.item.id, policy_id);
        Ok(resp.item)
    }
}
