//! Package policy model and its two wire formats.
//!
//! Fleet accepts package policies either in the simplified format, where
//! inputs and streams are maps keyed by `{template}-{input type}` and
//! `{package}.{data stream}`, or in the legacy array format used before
//! 7.16.0, where every input and stream spells out its type and data stream.
//! [`select_wire_format`] picks the right one for a server version.

use super::vars::{Var, Vars};
use crate::client::{
    FLEET_API, KibanaError, Result, supports_simplified_package_policy_api, uses_legacy_epm_urls,
};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Package a policy refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

/// A package policy in its format-independent form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackagePolicy {
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub policy_id: String,
    pub package: PackageRef,
    pub inputs: BTreeMap<String, PackagePolicyInput>,
    pub vars: Vars,
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackagePolicyInput {
    pub enabled: bool,
    pub vars: Vars,
    pub streams: BTreeMap<String, PackagePolicyStream>,
    /// Input type, e.g. `logfile`; explicit in the legacy format
    pub input_type: String,
    /// Policy template name; explicit in the legacy format
    pub policy_template: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackagePolicyStream {
    pub enabled: bool,
    pub vars: Vars,
    pub data_stream_type: String,
    pub data_stream_dataset: String,
}

/// Wire format strategy for version-dependent package endpoints.
pub trait WireFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Request body for creating the package policy.
    fn encode_package_policy(&self, policy: &PackagePolicy) -> Result<Value>;

    /// Package policy from a response `item`.
    fn decode_package_policy(&self, item: &Value) -> Result<PackagePolicy>;

    /// EPM path of a package, optionally pinned to a version.
    fn package_url(&self, name: &str, version: Option<&str>) -> String;
}

/// Choose the wire format for a server version; unknown means latest.
pub fn select_wire_format(version: Option<&Version>) -> Box<dyn WireFormat> {
    if supports_simplified_package_policy_api(version) {
        Box::new(Simplified {
            legacy_epm_urls: uses_legacy_epm_urls(version),
        })
    } else {
        Box::new(Legacy)
    }
}

fn epm_package_url(name: &str, version: Option<&str>, hyphenated: bool) -> String {
    match version {
        None | Some("") => format!("{}/epm/packages/{}", FLEET_API, name),
        Some(v) if hyphenated => format!("{}/epm/packages/{}-{}", FLEET_API, name, v),
        Some(v) => format!("{}/epm/packages/{}/{}", FLEET_API, name, v),
    }
}

fn decode_item<T: serde::de::DeserializeOwned>(item: &Value) -> Result<T> {
    T::deserialize(item).map_err(|e| {
        KibanaError::decode(
            "package policy",
            item.to_string().as_bytes(),
            e,
        )
    })
}

/// Map-keyed format accepted since 7.16.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simplified {
    pub legacy_epm_urls: bool,
}

#[derive(Serialize, Deserialize)]
struct SimplifiedPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    policy_id: String,
    #[serde(default)]
    package: PackageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inputs: Option<BTreeMap<String, SimplifiedInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vars: Option<Map<String, Value>>,
    #[serde(default)]
    force: bool,
}

#[derive(Serialize, Deserialize)]
struct SimplifiedInput {
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vars: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    streams: Option<BTreeMap<String, SimplifiedStream>>,
}

#[derive(Serialize, Deserialize)]
struct SimplifiedStream {
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vars: Option<Map<String, Value>>,
}

fn non_empty<K, V>(map: BTreeMap<K, V>) -> Option<BTreeMap<K, V>> {
    if map.is_empty() { None } else { Some(map) }
}

impl WireFormat for Simplified {
    fn name(&self) -> &'static str {
        "simplified"
    }

    fn encode_package_policy(&self, policy: &PackagePolicy) -> Result<Value> {
        let inputs = policy
            .inputs
            .iter()
            .map(|(key, input)| {
                let streams = input
                    .streams
                    .iter()
                    .map(|(key, stream)| {
                        (
                            key.clone(),
                            SimplifiedStream {
                                enabled: stream.enabled,
                                vars: stream.vars.to_map(),
                            },
                        )
                    })
                    .collect();
                (
                    key.clone(),
                    SimplifiedInput {
                        enabled: input.enabled,
                        vars: input.vars.to_map(),
                        streams: non_empty(streams),
                    },
                )
            })
            .collect();

        let wire = SimplifiedPolicy {
            id: policy.id.clone(),
            name: policy.name.clone(),
            description: policy.description.clone(),
            namespace: policy.namespace.clone(),
            policy_id: policy.policy_id.clone(),
            package: policy.package.clone(),
            inputs: non_empty(inputs),
            vars: policy.vars.to_map(),
            force: policy.force,
        };
        serde_json::to_value(wire)
            .map_err(|e| KibanaError::InvalidRequest(format!("encoding package policy: {}", e)))
    }

    fn decode_package_policy(&self, item: &Value) -> Result<PackagePolicy> {
        let wire: SimplifiedPolicy = decode_item(item)?;
        let inputs = wire
            .inputs
            .unwrap_or_default()
            .into_iter()
            .map(|(key, input)| {
                let streams = input
                    .streams
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(key, stream)| {
                        let stream = PackagePolicyStream {
                            enabled: stream.enabled,
                            vars: stream.vars.as_ref().map(Vars::from_map).unwrap_or_default(),
                            data_stream_type: String::new(),
                            data_stream_dataset: key.clone(),
                        };
                        (key, stream)
                    })
                    .collect();
                let input = PackagePolicyInput {
                    enabled: input.enabled,
                    vars: input.vars.as_ref().map(Vars::from_map).unwrap_or_default(),
                    streams,
                    input_type: String::new(),
                    policy_template: String::new(),
                };
                (key, input)
            })
            .collect();

        Ok(PackagePolicy {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            namespace: wire.namespace,
            policy_id: wire.policy_id,
            package: wire.package,
            inputs,
            vars: wire.vars.as_ref().map(Vars::from_map).unwrap_or_default(),
            force: wire.force,
        })
    }

    fn package_url(&self, name: &str, version: Option<&str>) -> String {
        epm_package_url(name, version, self.legacy_epm_urls)
    }
}

/// Array-based format used before 7.16.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Legacy;

#[derive(Serialize, Deserialize)]
struct LegacyDataStream {
    #[serde(rename = "type", default)]
    ds_type: String,
    #[serde(default)]
    dataset: String,
}

#[derive(Serialize, Deserialize)]
struct LegacyStream {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    enabled: bool,
    data_stream: LegacyDataStream,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vars: Option<BTreeMap<String, Var>>,
}

#[derive(Serialize, Deserialize)]
struct LegacyInput {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    policy_template: String,
    #[serde(rename = "type")]
    input_type: String,
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vars: Option<BTreeMap<String, Var>>,
    #[serde(default)]
    streams: Vec<LegacyStream>,
}

#[derive(Serialize, Deserialize)]
struct LegacyPolicy {
    #[serde(default, skip_serializing)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    policy_id: String,
    enabled: bool,
    #[serde(default)]
    package: PackageRef,
    #[serde(default)]
    inputs: Vec<LegacyInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vars: Option<BTreeMap<String, Var>>,
    #[serde(default)]
    force: bool,
}

fn legacy_input_key(input: &LegacyInput) -> String {
    if input.policy_template.is_empty() {
        input.input_type.clone()
    } else {
        format!("{}-{}", input.policy_template, input.input_type)
    }
}

impl WireFormat for Legacy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn encode_package_policy(&self, policy: &PackagePolicy) -> Result<Value> {
        let inputs = policy
            .inputs
            .values()
            .map(|input| LegacyInput {
                policy_template: input.policy_template.clone(),
                input_type: input.input_type.clone(),
                enabled: input.enabled,
                vars: input.vars.to_legacy().cloned(),
                streams: input
                    .streams
                    .values()
                    .map(|stream| LegacyStream {
                        id: None,
                        enabled: stream.enabled,
                        data_stream: LegacyDataStream {
                            ds_type: stream.data_stream_type.clone(),
                            dataset: stream.data_stream_dataset.clone(),
                        },
                        vars: stream.vars.to_legacy().cloned(),
                    })
                    .collect(),
            })
            .collect();

        // Fleet rejects disabled legacy package policies even when every
        // stream is individually disabled.
        let wire = LegacyPolicy {
            id: None,
            name: policy.name.clone(),
            description: policy.description.clone(),
            namespace: policy.namespace.clone(),
            policy_id: policy.policy_id.clone(),
            enabled: true,
            package: policy.package.clone(),
            inputs,
            vars: policy.vars.to_legacy().cloned(),
            force: policy.force,
        };
        serde_json::to_value(wire)
            .map_err(|e| KibanaError::InvalidRequest(format!("encoding package policy: {}", e)))
    }

    fn decode_package_policy(&self, item: &Value) -> Result<PackagePolicy> {
        let wire: LegacyPolicy = decode_item(item)?;
        let inputs = wire
            .inputs
            .into_iter()
            .map(|input| {
                let key = legacy_input_key(&input);
                let streams = input
                    .streams
                    .into_iter()
                    .map(|stream| {
                        (
                            stream.data_stream.dataset.clone(),
                            PackagePolicyStream {
                                enabled: stream.enabled,
                                vars: Vars(stream.vars.unwrap_or_default()),
                                data_stream_type: stream.data_stream.ds_type,
                                data_stream_dataset: stream.data_stream.dataset,
                            },
                        )
                    })
                    .collect();
                (
                    key,
                    PackagePolicyInput {
                        enabled: input.enabled,
                        vars: Vars(input.vars.unwrap_or_default()),
                        streams,
                        input_type: input.input_type,
                        policy_template: input.policy_template,
                    },
                )
            })
            .collect();

        Ok(PackagePolicy {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            namespace: wire.namespace,
            policy_id: wire.policy_id,
            package: wire.package,
            inputs,
            vars: Vars(wire.vars.unwrap_or_default()),
            force: wire.force,
        })
    }

    fn package_url(&self, name: &str, version: Option<&str>) -> String {
        epm_package_url(name, version, true)
    }
}
