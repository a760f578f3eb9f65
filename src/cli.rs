//! CLI helper functions

use crate::{
    client::{Auth, AuthType, ClientOptions, KibanaClient, VersionInfo},
    etl::{IdentityTransformer, Pipeline},
    fleet::Policy,
    kibana::saved_objects::SavedObjectsExtractor,
    packages::Asset,
    resources::{DEFAULT_PROVIDER, DesiredState, Manager},
    storage::NdjsonWriter,
    wait::WaitConfig,
};
use eyre::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Load Kibana client from environment variables
///
/// Expected environment variables:
/// - KIBANA_URL: Kibana base URL (required)
/// - KIBANA_USERNAME / KIBANA_PASSWORD: Basic auth (optional)
/// - KIBANA_APIKEY: API key auth (optional, takes precedence)
/// - KIBANA_CA_CERT: PEM file with the CA to trust (optional)
/// - KIBANA_INSECURE: `true` to skip TLS verification (optional)
/// - KIBANA_VERSION: Known stack version, skips the version probe (optional)
/// - FLEET_WAIT_TIMEOUT_SECS / FLEET_WAIT_INTERVAL_SECS: Waits on Fleet state
pub fn load_kibana_client() -> Result<KibanaClient> {
    let url_str = std::env::var("KIBANA_URL").context("KIBANA_URL environment variable not set")?;
    let url = Url::parse(&url_str).with_context(|| format!("Invalid KIBANA_URL: {}", url_str))?;

    let apikey = std::env::var("KIBANA_APIKEY").ok();
    let username = std::env::var("KIBANA_USERNAME").ok();
    let password = std::env::var("KIBANA_PASSWORD").ok();
    let auth_type = match (&apikey, &username, &password) {
        (Some(_), _, _) => AuthType::Apikey,
        (None, Some(_), Some(_)) => AuthType::Basic,
        _ => AuthType::None,
    };
    let auth = Auth::new(&auth_type, username, password, apikey);

    let defaults = WaitConfig::default();
    let wait = WaitConfig::new(
        env_duration("FLEET_WAIT_TIMEOUT_SECS")?.unwrap_or(defaults.timeout),
        env_duration("FLEET_WAIT_INTERVAL_SECS")?.unwrap_or(defaults.interval),
    );

    let mut options = ClientOptions::new(url, auth)
        .with_insecure(env_flag("KIBANA_INSECURE"))
        .with_wait(wait);
    if let Ok(ca) = std::env::var("KIBANA_CA_CERT") {
        options = options.with_certificate_authority(ca);
    }
    if let Ok(version) = std::env::var("KIBANA_VERSION") {
        let info = VersionInfo::from_number(version);
        info.semver().context("Invalid KIBANA_VERSION")?;
        options = options.with_version(info);
    }

    KibanaClient::with_options(options).context("Failed to create Kibana client")
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_duration(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(v) => {
            let secs: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", name, v))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

/// Print the stack version
pub async fn show_status(client: &KibanaClient) -> Result<()> {
    let (version, snapshot) = client.version().await.context("Failed to get Kibana version")?;
    log::info!(
        "Connected to {} (Kibana {}{})",
        client.url().as_str().bright_black(),
        version.green(),
        if snapshot { ", snapshot build" } else { "" }
    );
    Ok(())
}

/// Install a package from the registry or from a zip archive
pub async fn install_package(
    client: &KibanaClient,
    name: &str,
    version: &str,
    zip: Option<&Path>,
) -> Result<Vec<Asset>> {
    let assets = match zip {
        Some(archive) => {
            client
                .ensure_zip_package_can_be_installed()
                .await
                .context("Zip package upload is unavailable")?;
            client.install_zip_package(archive).await
        }
        None => client.install_package(name, version).await,
    }
    .with_context(|| format!("Failed to install {}-{}", name, version))?;

    log::info!("✓ Installed {}-{} with {} asset(s)", name.cyan(), version, assets.len());
    Ok(assets)
}

pub async fn remove_package(client: &KibanaClient, name: &str, version: &str) -> Result<()> {
    client
        .remove_package(name, version)
        .await
        .with_context(|| format!("Failed to remove {}-{}", name, version))?;
    log::info!("✓ Removed {}-{}", name.cyan(), version);
    Ok(())
}

pub async fn list_packages(client: &KibanaClient) -> Result<()> {
    let packages = client
        .find_installed_packages()
        .await
        .context("Failed to list installed packages")?;
    for package in &packages {
        println!("{}", package);
    }
    log::info!("{} installed package(s)", packages.len());
    Ok(())
}

/// List the Kibana assets a package installed, with their titles
pub async fn package_assets(client: &KibanaClient, name: &str) -> Result<()> {
    let package = client
        .get_package(name)
        .await
        .with_context(|| format!("Failed to get package {}", name))?;
    let assets = client
        .get_data_from_package_asset_ids(&package.assets())
        .await
        .context("Failed to get asset details")?;
    for asset in &assets {
        println!("{}", asset);
    }
    Ok(())
}

pub async fn list_policies(client: &KibanaClient) -> Result<()> {
    let policies = client.list_raw_policies().await.context("Failed to list policies")?;
    for policy in &policies {
        println!(
            "{}\t{}\trevision {}",
            policy["id"].as_str().unwrap_or_default(),
            policy["name"].as_str().unwrap_or_default(),
            policy["revision"]
        );
    }
    Ok(())
}

pub async fn create_policy(
    client: &KibanaClient,
    name: &str,
    namespace: &str,
    description: Option<String>,
) -> Result<Policy> {
    let mut request = Policy::new(name, namespace);
    request.description = description.unwrap_or_default();
    let policy = client
        .create_policy(&request)
        .await
        .with_context(|| format!("Failed to create policy {}", name))?;
    log::info!("✓ Created policy {} ({})", policy.name.cyan(), policy.id);
    Ok(policy)
}

/// Delete a policy; a policy that is already gone only logs a warning
pub async fn delete_policy(client: &KibanaClient, id: &str) -> Result<()> {
    match client.delete_policy(id).await {
        Ok(()) => log::info!("✓ Deleted policy {}", id.cyan()),
        Err(e) if e.is_not_found() => log::warn!("Policy {} not found", id),
        Err(e) => return Err(e).with_context(|| format!("Failed to delete policy {}", id)),
    }
    Ok(())
}

pub async fn list_agents(client: &KibanaClient, kuery: Option<&str>) -> Result<()> {
    let agents = client.list_agents(kuery).await.context("Failed to list agents")?;
    for agent in &agents {
        println!(
            "{}\t{}\t{}\t{}@{}",
            agent.id,
            agent.hostname(),
            agent.status,
            agent.policy_id,
            agent.policy_revision
        );
    }
    Ok(())
}

/// Reassign an agent and wait until it runs the policy
pub async fn assign_policy(
    client: &KibanaClient,
    agent_id: &str,
    policy_id: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let agent = client
        .get_agent(agent_id)
        .await
        .with_context(|| format!("Failed to get agent {}", agent_id))?;
    let policy = client
        .get_policy(policy_id)
        .await
        .with_context(|| format!("Failed to get policy {}", policy_id))?;
    let agent = client
        .assign_policy_to_agent(&agent, &policy, cancel)
        .await
        .with_context(|| format!("Failed to assign policy {} to agent {}", policy_id, agent_id))?;
    log::info!(
        "✓ Agent {} runs policy {} revision {}",
        agent.id.cyan(),
        agent.policy_id,
        agent.policy_revision
    );
    Ok(())
}

pub async fn unenroll_agent(client: &KibanaClient, agent_id: &str) -> Result<()> {
    let agent = client
        .get_agent(agent_id)
        .await
        .with_context(|| format!("Failed to get agent {}", agent_id))?;
    client
        .remove_agent(&agent)
        .await
        .with_context(|| format!("Failed to unenroll agent {}", agent_id))?;
    Ok(())
}

pub async fn set_log_level(client: &KibanaClient, agent_id: &str, level: &str) -> Result<()> {
    client
        .set_agent_log_level(agent_id, level)
        .await
        .with_context(|| format!("Failed to set log level of agent {}", agent_id))?;
    log::info!("✓ Agent {} log level set to {}", agent_id.cyan(), level);
    Ok(())
}

/// Print an enrollment API key for the policy
pub async fn enrollment_token(client: &KibanaClient, policy_id: &str) -> Result<()> {
    let token = client
        .get_enrollment_token_for_policy(policy_id)
        .await
        .with_context(|| format!("Failed to get enrollment token for policy {}", policy_id))?;
    println!("{}", token);
    Ok(())
}

pub async fn list_dashboards(client: &KibanaClient) -> Result<()> {
    let dashboards = client.find_dashboards().await.context("Failed to find dashboards")?;
    for dashboard in &dashboards {
        println!("{}", dashboard);
    }
    Ok(())
}

/// Export dashboards with their references to an NDJSON file
///
/// Pipeline: SavedObjectsExtractor → IdentityTransformer → NdjsonWriter
pub async fn export_dashboards(
    client: &KibanaClient,
    ids: Vec<String>,
    output: impl AsRef<Path>,
) -> Result<usize> {
    let output = output.as_ref();
    let pipeline = Pipeline::new(
        SavedObjectsExtractor::dashboards(client.clone(), ids),
        IdentityTransformer::new(),
        NdjsonWriter::new(output),
    );
    let count = pipeline.run().await?;
    log::info!("✓ Exported {} object(s) to {}", count, output.display());
    Ok(count)
}

pub async fn set_managed(
    client: &KibanaClient,
    object_type: &str,
    id: &str,
    managed: bool,
) -> Result<()> {
    client.set_managed_saved_object(object_type, id, managed).await
}

/// Apply a desired state document
pub async fn apply(
    client: KibanaClient,
    path: impl AsRef<Path>,
    cancel: CancellationToken,
) -> Result<()> {
    let path = path.as_ref();
    let state = DesiredState::read(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut resources = state.into_resources(base)?;
    log::info!("Applying {} resource(s) from {}", resources.len(), path.display());

    let mut manager = Manager::with_cancellation(cancel);
    manager.register_provider(DEFAULT_PROVIDER, client);
    match manager.apply(&mut resources).await {
        Ok(applied) => {
            let changed = applied
                .iter()
                .filter(|a| a.action != crate::resources::Action::Unchanged)
                .count();
            log::info!("✓ Applied {} resource(s), {} changed", applied.len(), changed);
            Ok(())
        }
        Err(e) => {
            for applied in &e.applied {
                log::info!("{} {}", applied.resource, applied.action);
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VARS: [&str; 9] = [
        "KIBANA_URL",
        "KIBANA_USERNAME",
        "KIBANA_PASSWORD",
        "KIBANA_APIKEY",
        "KIBANA_CA_CERT",
        "KIBANA_INSECURE",
        "KIBANA_VERSION",
        "FLEET_WAIT_TIMEOUT_SECS",
        "FLEET_WAIT_INTERVAL_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_load_kibana_client_no_url() {
        clear_env();

        let result = load_kibana_client();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("KIBANA_URL"));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_kibana_client_with_url() {
        clear_env();
        unsafe {
            std::env::set_var("KIBANA_URL", "http://localhost:5601");
        }

        let client = load_kibana_client().unwrap();
        assert_eq!(client.url().as_str(), "http://localhost:5601/");
        assert_eq!(*client.wait_config(), WaitConfig::default());

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_load_kibana_client_invalid_url() {
        clear_env();
        unsafe {
            std::env::set_var("KIBANA_URL", "not-a-valid-url");
        }

        let result = load_kibana_client();
        assert!(result.unwrap_err().to_string().contains("Invalid KIBANA_URL"));

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_wait_settings_from_env() {
        clear_env();
        unsafe {
            std::env::set_var("KIBANA_URL", "http://localhost:5601");
            std::env::set_var("FLEET_WAIT_TIMEOUT_SECS", "30");
            std::env::set_var("FLEET_WAIT_INTERVAL_SECS", "1");
        }

        let client = load_kibana_client().unwrap();
        assert_eq!(
            *client.wait_config(),
            WaitConfig::new(Duration::from_secs(30), Duration::from_secs(1))
        );

        unsafe {
            std::env::set_var("FLEET_WAIT_INTERVAL_SECS", "soon");
        }
        let err = load_kibana_client().unwrap_err();
        assert!(err.to_string().contains("FLEET_WAIT_INTERVAL_SECS"));

        clear_env();
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_preset_version_skips_probe() {
        clear_env();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        unsafe {
            std::env::set_var("KIBANA_URL", server.uri());
            std::env::set_var("KIBANA_VERSION", "7.17.9");
        }

        let client = load_kibana_client().unwrap();
        assert_eq!(client.version().await.unwrap().0, "7.17.9");

        unsafe {
            std::env::set_var("KIBANA_VERSION", "latest");
        }
        assert!(load_kibana_client().is_err());

        clear_env();
    }

    #[tokio::test]
    async fn test_export_dashboards_writes_ndjson() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/saved_objects/_export"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"id\":\"d-1\",\"type\":\"dashboard\"}\n{\"id\":\"v-1\",\"type\":\"visualization\"}\n",
            ))
            .mount(&server)
            .await;
        let client = crate::fleet::test_support::client_for(&server);
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("export.ndjson");

        let count = export_dashboards(&client, vec!["d-1".to_string()], &output)
            .await
            .unwrap();
        assert_eq!(count, 2);
        let written = crate::storage::NdjsonReader::new(&output).read().unwrap();
        assert_eq!(written[1], json!({"id": "v-1", "type": "visualization"}));
    }

    #[tokio::test]
    async fn test_delete_missing_policy_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fleet/agent_policies/delete"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = crate::fleet::test_support::client_for(&server);

        delete_policy(&client, "gone").await.unwrap();
    }
}
