//! Package policy builders.
//!
//! Fleet enables every input and stream a package policy leaves out, so the
//! builders list all of them and disable everything except the one stream
//! being configured.

use crate::client::{KibanaError, Result};
use crate::codec::{
    PackagePolicy, PackagePolicyInput, PackagePolicyStream, PackageRef, Var, VarValue, Vars,
};
use crate::packages::{DataStreamManifest, PackageManifest, PolicyTemplate, Variable};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const DATASET_VAR: &str = "data_stream.dataset";

/// Look up a value by key, falling back to a dotted path through nested maps.
fn lookup<'a>(values: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(v) = values.get(key) {
        return Some(v);
    }
    let mut parts = key.split('.');
    let mut current = values.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Typed variables for the given definitions.
///
/// Values override defaults; definitions with neither are left out.
pub fn set_kibana_variables(definitions: &[Variable], values: &Map<String, Value>) -> Vars {
    let mut vars = Vars::new();
    for definition in definitions {
        let value = match (lookup(values, &definition.name), &definition.default) {
            (Some(v), _) => VarValue::unpack(v.clone()),
            (None, Some(default)) => default.clone(),
            (None, None) => continue,
        };
        vars.insert(definition.name.clone(), Var::new(definition.var_type.clone(), value));
    }
    vars
}

/// Inputs for building an integration package policy for one data stream.
#[derive(Debug, Clone)]
pub struct IntegrationPolicyOptions<'a> {
    pub policy_id: &'a str,
    pub namespace: &'a str,
    pub name: &'a str,
    pub manifest: &'a PackageManifest,
    pub policy_template: &'a PolicyTemplate,
    pub data_stream: &'a DataStreamManifest,
    /// Input type of the stream to configure
    pub input: &'a str,
    pub input_vars: &'a Map<String, Value>,
    pub data_stream_vars: &'a Map<String, Value>,
    pub enabled: bool,
    /// All data streams of the package
    pub data_streams: &'a [DataStreamManifest],
}

pub fn build_integration_package_policy(
    opts: &IntegrationPolicyOptions<'_>,
) -> Result<PackagePolicy> {
    let stream = opts.data_stream.find_stream(opts.input).ok_or_else(|| {
        KibanaError::InvalidRequest(format!(
            "could not find stream for input {:?} in data stream {}",
            opts.input, opts.data_stream.name
        ))
    })?;
    let package = &opts.manifest.name;

    let mut inputs = BTreeMap::new();
    for pt in &opts.manifest.policy_templates {
        for input in &pt.inputs {
            inputs.insert(
                format!("{}-{}", pt.name, input.input_type),
                PackagePolicyInput {
                    enabled: false,
                    input_type: input.input_type.clone(),
                    policy_template: pt.name.clone(),
                    ..Default::default()
                },
            );
        }
    }

    let target = opts.data_stream.dataset_for(package);
    let mut streams = BTreeMap::new();
    streams.insert(
        target.clone(),
        PackagePolicyStream {
            enabled: opts.enabled,
            vars: set_kibana_variables(&stream.vars, opts.data_stream_vars),
            data_stream_type: opts.data_stream.ds_type.clone(),
            data_stream_dataset: target,
        },
    );
    for ds in opts.data_streams {
        if ds.name == opts.data_stream.name || ds.find_stream(opts.input).is_none() {
            continue;
        }
        let dataset = ds.dataset_for(package);
        streams.insert(
            dataset.clone(),
            PackagePolicyStream {
                enabled: false,
                vars: Vars::new(),
                data_stream_type: ds.ds_type.clone(),
                data_stream_dataset: dataset,
            },
        );
    }

    let input_vars = opts
        .policy_template
        .find_input_by_type(opts.input)
        .map(|input| set_kibana_variables(&input.vars, opts.input_vars))
        .unwrap_or_default();

    inputs.insert(
        format!("{}-{}", opts.policy_template.name, opts.input),
        PackagePolicyInput {
            enabled: opts.enabled,
            vars: input_vars,
            streams,
            input_type: opts.input.to_string(),
            policy_template: opts.policy_template.name.clone(),
        },
    );

    Ok(PackagePolicy {
        id: None,
        name: opts.name.to_string(),
        description: String::new(),
        namespace: opts.namespace.to_string(),
        policy_id: opts.policy_id.to_string(),
        package: PackageRef {
            name: package.clone(),
            version: opts.manifest.version.clone(),
        },
        inputs,
        vars: set_kibana_variables(&opts.manifest.vars, opts.input_vars),
        force: false,
    })
}

/// Build the package policy of an input package.
///
/// The stream gets a `data_stream.dataset` variable defaulting to the policy
/// template name when neither the template nor the values set one.
pub fn build_input_package_policy(
    policy_id: &str,
    namespace: &str,
    name: &str,
    manifest: &PackageManifest,
    policy_template: &PolicyTemplate,
    values: &Map<String, Value>,
    enabled: bool,
) -> PackagePolicy {
    let mut inputs = BTreeMap::new();
    for pt in &manifest.policy_templates {
        inputs.insert(
            format!("{}-{}", pt.name, pt.input),
            PackagePolicyInput {
                enabled: false,
                input_type: pt.input.clone(),
                policy_template: pt.name.clone(),
                ..Default::default()
            },
        );
    }

    let mut vars = set_kibana_variables(&policy_template.vars, values);
    if !vars.contains(DATASET_VAR) {
        let dataset = lookup(values, DATASET_VAR)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(&policy_template.name);
        vars.insert(DATASET_VAR, Var::new("text", dataset));
    }

    let stream_key = format!("{}.{}", manifest.name, policy_template.name);
    let mut streams = BTreeMap::new();
    streams.insert(
        stream_key.clone(),
        PackagePolicyStream {
            enabled,
            vars,
            data_stream_type: policy_template.template_type.clone(),
            data_stream_dataset: stream_key,
        },
    );
    inputs.insert(
        format!("{}-{}", policy_template.name, policy_template.input),
        PackagePolicyInput {
            enabled,
            vars: Vars::new(),
            streams,
            input_type: policy_template.input.clone(),
            policy_template: policy_template.name.clone(),
        },
    );

    PackagePolicy {
        id: None,
        name: name.to_string(),
        description: String::new(),
        namespace: namespace.to_string(),
        policy_id: policy_id.to_string(),
        package: PackageRef {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
        },
        inputs,
        vars: Vars::new(),
        force: false,
    }
}
