//! Kibana API client, authentication, error types and version gating.
//!
//! This module provides the [`KibanaClient`] for interacting with the Kibana API,
//! along with authentication types ([`Auth`], [`AuthType`]) and the typed
//! [`KibanaError`] every operation reports.

mod auth;
mod error;
mod kibana;
mod version;

pub use auth::{Auth, AuthType};
pub use error::{KibanaError, ResourceKind, Result};
pub use kibana::{
    Body, CORE_API, ClientOptions, FLEET_API, KibanaClient, RawResponse, SAVED_OBJECTS_API,
};
pub use version::{
    VersionInfo, supports_simplified_package_policy_api, uses_legacy_epm_urls,
    uses_saved_objects_export, version_from_login_html,
};

/// Decode a JSON response body, keeping the body in the error for diagnosis.
pub fn decode_json<T: serde::de::DeserializeOwned>(operation: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| KibanaError::decode(operation, body, e))
}
