//! End-to-end provisioning against a mocked Kibana

use kibana_fleet_manager::client::{Auth, ClientOptions, KibanaClient, KibanaError, VersionInfo};
use kibana_fleet_manager::resources::{Action, DesiredState, Manager};
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> KibanaClient {
    let options = ClientOptions::new(Url::parse(&server.uri()).unwrap(), Auth::None)
        .with_version(VersionInfo::from_number("8.15.3"));
    KibanaClient::with_options(options).unwrap()
}

/// Writes an apache package tree with two log streams and one metrics stream.
fn write_apache_package(root: &Path) {
    let write = |relative: &str, content: &str| {
        let file = root.join(relative);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    };
    write(
        "manifest.yml",
        r#"
name: apache
version: 1.0.0
type: integration
policy_templates:
  - name: apache
    inputs:
      - type: logfile
      - type: apache/metrics
"#,
    );
    write(
        "data_stream/access/manifest.yml",
        "type: logs\nstreams:\n  - input: logfile\n    vars:\n      - name: paths\n        type: text\n",
    );
    write(
        "data_stream/error/manifest.yml",
        "type: logs\nstreams:\n  - input: logfile\n",
    );
    write(
        "data_stream/status/manifest.yml",
        "type: metrics\nstreams:\n  - input: apache/metrics\n",
    );
}

const DESIRED: &str = r#"
packages:
  - name: apache
    version: 1.0.0
policies:
  - name: apache-test
    namespace: ep
    package_policies:
      - name: apache-access
        package: packages/apache
        data_stream: access
        data_stream_vars:
          paths: ["/var/log/apache2/access.log*"]
"#;

async fn mount_package_install(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/fleet/epm/packages/apache"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/fleet/epm/packages/apache/1.0.0"))
        .and(header_exists("kbn-xsrf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "apache-dashboard", "type": "dashboard"}]
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/fleet/agent_policies"))
        .and(body_json(json!({"name": "apache-test", "description": "", "namespace": "ep"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "item": {"id": "p-1", "name": "apache-test", "namespace": "ep", "revision": 1}
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn resources_for(dir: &TempDir) -> Vec<Box<dyn kibana_fleet_manager::Resource>> {
    write_apache_package(&dir.path().join("packages").join("apache"));
    DesiredState::from_yaml(DESIRED)
        .unwrap()
        .into_resources(dir.path())
        .unwrap()
}

#[tokio::test]
async fn test_apache_is_provisioned_with_one_enabled_stream() {
    let server = MockServer::start().await;
    mount_package_install(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/fleet/package_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"item": {"id": "pp-1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut resources = resources_for(&dir);
    let mut manager = Manager::new();
    manager.register_provider("kibana", client_for(&server));

    let applied = manager.apply(&mut resources).await.unwrap();
    assert_eq!(applied.len(), 2);
    assert!(applied.iter().all(|a| a.action == Action::Created));

    let requests = server.received_requests().await.unwrap();
    let request = requests
        .iter()
        .find(|r| r.url.path() == "/api/fleet/package_policies")
        .unwrap();
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["policy_id"], "p-1");
    assert_eq!(body["namespace"], "ep");
    assert_eq!(body["package"]["name"], "apache");
    assert_eq!(body["package"]["version"], "1.0.0");

    let logs = &body["inputs"]["apache-logfile"];
    assert_eq!(logs["enabled"], true);
    assert_eq!(logs["streams"]["apache.access"]["enabled"], true);
    assert_eq!(
        logs["streams"]["apache.access"]["vars"]["paths"],
        json!(["/var/log/apache2/access.log*"])
    );
    assert_eq!(logs["streams"]["apache.error"]["enabled"], false);
    assert_eq!(body["inputs"]["apache-apache/metrics"]["enabled"], false);
}

#[tokio::test]
async fn test_package_policy_conflict_rolls_back_agent_policy() {
    let server = MockServer::start().await;
    mount_package_install(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/fleet/package_policies"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "statusCode": 409,
            "message": "An integration policy with the name apache-access already exists"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/fleet/agent_policies/delete"))
        .and(body_json(json!({"agentPolicyId": "p-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut resources = resources_for(&dir);
    let mut manager = Manager::new();
    manager.register_provider("kibana", client_for(&server));

    let err = manager.apply(&mut resources).await.unwrap_err();
    assert_eq!(err.applied.len(), 1);
    assert_eq!(err.applied[0].resource, "[FleetPackage:kibana:apache-1.0.0]");

    let kibana = err.source.downcast_ref::<KibanaError>().unwrap();
    assert!(kibana.is_conflict());
    assert!(!kibana.is_not_found());
}

#[tokio::test]
async fn test_missing_policy_is_typed_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/fleet/agent_policies/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "statusCode": 404,
            "message": "Agent policy gone not found"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).get_policy("gone").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_conflict());
}
