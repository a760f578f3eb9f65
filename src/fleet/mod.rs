//! Fleet resource operations.
//!
//! Each submodule adds the operations for one Fleet resource to
//! [`KibanaClient`](crate::client::KibanaClient). Missing resources and
//! conflicting creates are reported as typed [`KibanaError`](crate::client::KibanaError)s.

mod agents;
mod builder;
mod enrollment_tokens;
mod outputs;
mod package_policies;
mod packages;
mod policies;

pub use agents::{Agent, AgentMetadata, ElasticMetadata, HostMetadata, LocalMetadata};
pub use builder::{
    IntegrationPolicyOptions, build_input_package_policy, build_integration_package_policy,
    set_kibana_variables,
};
pub use enrollment_tokens::EnrollmentToken;
pub use outputs::{AgentSsl, FleetOutput, FleetServerHost, ServiceToken};
pub use packages::{AssetAttributes, FleetPackage, InstalledPackage, PackageAsset};
pub use policies::Policy;

use serde::Deserialize;

/// `{"item": ...}` response envelope.
#[derive(Deserialize)]
pub(crate) struct ItemResponse<T> {
    pub item: T,
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::client::{Auth, ClientOptions, KibanaClient, VersionInfo};
    use url::Url;
    use wiremock::MockServer;

    /// Client for a mock server, pinned to a recent version.
    pub fn client_for(server: &MockServer) -> KibanaClient {
        client_with_version(server, "8.15.3")
    }

    pub fn client_with_version(server: &MockServer, version: &str) -> KibanaClient {
        let options = ClientOptions::new(Url::parse(&server.uri()).unwrap(), Auth::None)
            .with_version(VersionInfo::from_number(version));
        KibanaClient::with_options(options).unwrap()
    }
}
