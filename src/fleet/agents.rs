//! Fleet agents
//!
//! Agents enroll on their own; here they are listed, reassigned, unenrolled
//! and reconfigured, and waited on until they pick up a policy.

use super::ItemResponse;
use super::policies::Policy;
use crate::client::{FLEET_API, KibanaClient, KibanaError, ResourceKind, Result, decode_json};
use crate::wait::wait_until;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    #[serde(default)]
    pub log_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticMetadata {
    #[serde(default)]
    pub agent: AgentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalMetadata {
    #[serde(default)]
    pub host: HostMetadata,
    #[serde(default)]
    pub elastic: ElasticMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub policy_id: String,
    #[serde(default)]
    pub policy_revision: u64,
    #[serde(default)]
    pub local_metadata: LocalMetadata,
    #[serde(default)]
    pub status: String,
}

impl Agent {
    pub fn hostname(&self) -> &str {
        &self.local_metadata.host.name
    }

    pub fn log_level(&self) -> &str {
        &self.local_metadata.elastic.agent.log_level
    }

    /// Whether the agent runs `policy` at its current revision or newer.
    pub fn has_policy(&self, policy: &Policy) -> bool {
        self.policy_id == policy.id && self.policy_revision >= policy.revision
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (host: {}, policy: {} rev {}, status: {})",
            self.id,
            self.hostname(),
            self.policy_id,
            self.policy_revision,
            self.status
        )
    }
}

#[derive(Deserialize)]
struct AgentList {
    #[serde(default)]
    list: Vec<Agent>,
    #[serde(default)]
    items: Vec<Agent>,
}

impl KibanaClient {
    /// List agents, optionally filtered by a KQL query.
    pub async fn list_agents(&self, kuery: Option<&str>) -> Result<Vec<Agent>> {
        let path = format!("{}/agents", FLEET_API);
        let query: Vec<(&str, &str)> = kuery.map(|k| ("kuery", k)).into_iter().collect();
        let body = self.get_ok("list agents", &path, &query).await?;
        let resp: AgentList = decode_json("list agents", &body)?;
        Ok(if resp.list.is_empty() { resp.items } else { resp.list })
    }

    pub async fn get_agent(&self, id: &str) -> Result<Agent> {
        let path = format!("{}/agents/{}", FLEET_API, id);
        let response = self.get(&path).await?;
        match response.status {
            StatusCode::OK => {
                let resp: ItemResponse<Agent> = decode_json("get agent", &response.body)?;
                Ok(resp.item)
            }
            StatusCode::NOT_FOUND => Err(KibanaError::not_found(ResourceKind::Agent, id)),
            status => Err(KibanaError::api(
                "get agent",
                path,
                status.as_u16(),
                &response.body,
            )),
        }
    }

    /// Reassign an agent to a policy and wait until it runs that policy.
    ///
    /// The agent counts as converged once it reports the policy at
    /// `policy.revision` or later.
    pub async fn assign_policy_to_agent(
        &self,
        agent: &Agent,
        policy: &Policy,
        cancel: &CancellationToken,
    ) -> Result<Agent> {
        let path = format!("{}/agents/{}/reassign", FLEET_API, agent.id);
        let response = self
            .put_json(&path, &json!({ "policy_id": policy.id }))
            .await?;
        response.expect_ok("assign policy to agent", &path)?;
        log::info!("Reassigned agent {} to policy {}", agent.id, policy.id);

        let operation = format!(
            "assignment of policy {} (revision {}) to agent {}",
            policy.id, policy.revision, agent.id
        );
        wait_until(
            &operation,
            self.wait_config(),
            cancel,
            || self.get_agent(&agent.id),
            |current| {
                log::debug!("Agent data: {}", current);
                current.has_policy(policy)
            },
        )
        .await
    }

    /// Wait until an agent with the given policy (and hostname, if set) is online.
    pub async fn wait_for_agent_online(
        &self,
        policy_id: &str,
        hostname: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Agent> {
        let kuery = format!("policy_id:{}", policy_id);
        let operation = format!("agent with policy {} coming online", policy_id);
        let agents = wait_until(
            &operation,
            self.wait_config(),
            cancel,
            || self.list_agents(Some(&kuery)),
            |agents| {
                agents
                    .iter()
                    .any(|a| is_online_match(a, policy_id, hostname))
            },
        )
        .await?;
        agents
            .into_iter()
            .find(|a| is_online_match(a, policy_id, hostname))
            .ok_or_else(|| KibanaError::not_found(ResourceKind::Agent, policy_id))
    }

    /// Unenroll an agent, revoking its API key.
    pub async fn remove_agent(&self, agent: &Agent) -> Result<()> {
        let path = format!("{}/agents/{}/unenroll", FLEET_API, agent.id);
        let response = self
            .post_json(&path, &json!({ "revoke": true, "force": true }))
            .await?;
        response.expect_ok("unenroll agent", &path)?;
        log::info!("Unenrolled agent {}", agent.id);
        Ok(())
    }

    /// Change an agent's log level through a settings action.
    pub async fn set_agent_log_level(&self, agent_id: &str, level: &str) -> Result<()> {
        let path = format!("{}/agents/{}/actions", FLEET_API, agent_id);
        let action = json!({
            "action": {
                "type": "SETTINGS",
                "data": { "log_level": level }
            }
        });
        let response = self.post_json(&path, &action).await?;
        response.expect_ok("set agent log level", &path)?;
        log::info!("Set log level of agent {} to {}", agent_id, level);
        Ok(())
    }
}

fn is_online_match(agent: &Agent, policy_id: &str, hostname: Option<&str>) -> bool {
    agent.status == "online"
        && agent.policy_id == policy_id
        && hostname.is_none_or(|h| agent.hostname() == h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Auth, ClientOptions, VersionInfo};
    use crate::fleet::test_support::client_for;
    use crate::wait::WaitConfig;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_client(server: &MockServer) -> KibanaClient {
        let options = ClientOptions::new(Url::parse(&server.uri()).unwrap(), Auth::None)
            .with_version(VersionInfo::from_number("8.15.3"))
            .with_wait(WaitConfig::new(
                Duration::from_millis(500),
                Duration::from_millis(10),
            ));
        KibanaClient::with_options(options).unwrap()
    }

    fn agent_json(policy_id: &str, revision: u64) -> serde_json::Value {
        json!({"item": {
            "id": "agent-1",
            "policy_id": policy_id,
            "policy_revision": revision,
            "status": "online",
            "local_metadata": {
                "host": {"name": "docker-fleet-agent"},
                "elastic": {"agent": {"log_level": "info"}}
            }
        }})
    }

    fn policy(id: &str, revision: u64) -> Policy {
        Policy {
            id: id.to_string(),
            revision,
            ..Policy::new("p", "default")
        }
    }

    #[tokio::test]
    async fn test_list_agents_reads_list_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fleet/agents"))
            .and(query_param("kuery", "policy_id:p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [
                    {"id": "a1", "policy_id": "p-1", "local_metadata": {"host": {"name": "h1"}}}
                ],
                "items": []
            })))
            .mount(&server)
            .await;

        let agents = client_for(&server)
            .list_agents(Some("policy_id:p-1"))
            .await
            .unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].hostname(), "h1");
    }

    #[tokio::test]
    async fn test_kuery_with_reserved_characters_is_sent_whole() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fleet/agents"))
            .and(query_param("kuery", "tags:\"R&D\" and status:online"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "a2", "policy_id": "p-2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let agents = client
            .list_agents(Some("tags:\"R&D\" and status:online"))
            .await
            .unwrap();
        assert_eq!(agents[0].id, "a2");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query_pairs().count(), 1);
    }

    #[tokio::test]
    async fn test_list_agents_without_kuery_has_no_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fleet/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        client_for(&server).list_agents(None).await.unwrap();
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn test_assign_waits_for_revision() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/fleet/agents/agent-1/reassign"))
            .and(body_json(json!({"policy_id": "p-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        // Old policy first, then the new policy at a newer revision.
        Mock::given(method("GET"))
            .and(path("/api/fleet/agents/agent-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("p-1", 1)))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/fleet/agents/agent-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("p-2", 4)))
            .mount(&server)
            .await;

        let agent = Agent {
            id: "agent-1".to_string(),
            ..Default::default()
        };
        let assigned = quick_client(&server)
            .assign_policy_to_agent(&agent, &policy("p-2", 3), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(assigned.policy_id, "p-2");
        assert_eq!(assigned.policy_revision, 4);
    }

    #[tokio::test]
    async fn test_assign_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/fleet/agents/agent-1/reassign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/fleet/agents/agent-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("p-2", 1)))
            .mount(&server)
            .await;

        let agent = Agent {
            id: "agent-1".to_string(),
            ..Default::default()
        };
        let err = quick_client(&server)
            .assign_policy_to_agent(&agent, &policy("p-2", 2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_wait_for_agent_online_filters_hostname() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fleet/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list": [
                {
                    "id": "a1", "policy_id": "p-1", "status": "online",
                    "local_metadata": {"host": {"name": "other"}}
                },
                {
                    "id": "a2", "policy_id": "p-1", "status": "online",
                    "local_metadata": {"host": {"name": "wanted"}}
                }
            ]})))
            .mount(&server)
            .await;

        let agent = quick_client(&server)
            .wait_for_agent_online("p-1", Some("wanted"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(agent.id, "a2");
    }

    #[tokio::test]
    async fn test_unenroll_and_log_level_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fleet/agents/a1/unenroll"))
            .and(body_json(json!({"revoke": true, "force": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/fleet/agents/a1/actions"))
            .and(body_json(json!({"action": {"type": "SETTINGS", "data": {"log_level": "debug"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let agent = Agent {
            id: "a1".to_string(),
            ..Default::default()
        };
        client.remove_agent(&agent).await.unwrap();
        client.set_agent_log_level("a1", "debug").await.unwrap();
    }
}
