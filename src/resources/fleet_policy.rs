//! Agent policies with their package policies

use super::{Context, DEFAULT_PROVIDER, Observation, Resource};
use crate::client::KibanaClient;
use crate::codec::PackagePolicy;
use crate::fleet::{
    IntegrationPolicyOptions, Policy, build_input_package_policy, build_integration_package_policy,
};
use crate::packages::{DataStreamManifest, LocalPackage, PackageManifest, PolicyTemplate, Stream};

use async_trait::async_trait;
use eyre::{Result, WrapErr, bail, eyre};
use serde_json::{Map, Value};
use std::fmt;

/// Configuration of one package inside an agent policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetPackagePolicy {
    pub name: String,
    pub disabled: bool,
    /// Policy template to use; derived from the data stream and input when empty
    pub template_name: String,
    pub package: LocalPackage,
    /// Data stream to configure, integration packages only
    pub data_stream_name: String,
    /// Input type to enable; the first stream's input when empty
    pub input_name: String,
    pub vars: Map<String, Value>,
    pub data_stream_vars: Map<String, Value>,
}

/// An agent policy that must exist (or not), created with its package policies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetAgentPolicy {
    pub provider: String,
    pub name: String,
    /// Fleet assigns one on creation when empty
    pub id: String,
    pub description: String,
    pub namespace: String,
    pub data_output_id: Option<String>,
    pub absent: bool,
    pub package_policies: Vec<FleetPackagePolicy>,
}

impl fmt::Display for FleetAgentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider = if self.provider.is_empty() {
            DEFAULT_PROVIDER
        } else {
            &self.provider
        };
        write!(f, "[FleetAgentPolicy:{}:{}]", provider, self.name)
    }
}

impl FleetAgentPolicy {
    async fn create_package_policies(&self, client: &KibanaClient, policy: &Policy) -> Result<()> {
        for package_policy in &self.package_policies {
            let body = package_policy
                .build(&policy.id, &policy.namespace)
                .wrap_err("could not prepare package policy")?;
            client.create_package_policy(&body).await.wrap_err_with(|| {
                format!(
                    "could not add package policy {:?} to agent policy {:?}",
                    package_policy.name, self.name
                )
            })?;
        }
        Ok(())
    }

    async fn delete(&self, client: &KibanaClient, id: &str) -> Result<()> {
        match client.delete_policy(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                log::warn!("Agent policy {} was already deleted", id);
                Ok(())
            }
            Err(e) => Err(e).wrap_err_with(|| format!("could not delete policy {:?}", self.name)),
        }
    }
}

#[async_trait]
impl Resource for FleetAgentPolicy {
    async fn observe(&self, ctx: &Context) -> Result<Observation> {
        let current = if self.id.is_empty() {
            None
        } else {
            let client = ctx.provider(&self.provider)?;
            match client.get_policy(&self.id).await {
                Ok(policy) => Some(policy),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    return Err(e).wrap_err_with(|| {
                        format!("could not get policy {:?} with id {:?}", self.name, self.id)
                    });
                }
            }
        };
        let exists = current.is_some();
        Ok(Observation {
            found: self.absent || exists,
            needs_update: self.absent == exists,
        })
    }

    /// Create the policy, then its package policies. The policy is deleted
    /// again when a package policy cannot be added.
    async fn create(&mut self, ctx: &Context) -> Result<()> {
        let client = ctx.provider(&self.provider)?;
        let mut request = Policy::new(&self.name, &self.namespace);
        request.id = self.id.clone();
        request.description = self.description.clone();
        request.data_output_id = self.data_output_id.clone();

        let policy = client
            .create_policy(&request)
            .await
            .wrap_err_with(|| format!("could not create policy {:?}", self.name))?;

        if let Err(err) = self.create_package_policies(client, &policy).await {
            log::warn!("Rolling back agent policy {} ({})", policy.name, policy.id);
            if let Err(rollback) = self.delete(client, &policy.id).await {
                return Err(eyre!("{:#} (rollback also failed: {:#})", err, rollback));
            }
            return Err(err);
        }

        self.id = policy.id;
        Ok(())
    }

    async fn update(&mut self, ctx: &Context) -> Result<()> {
        if self.absent {
            let client = ctx.provider(&self.provider)?;
            return self.delete(client, &self.id).await;
        }
        bail!("update of agent policy {:?} is not supported", self.name)
    }
}

impl FleetPackagePolicy {
    /// Package policy for the given agent policy.
    pub fn build(&self, policy_id: &str, namespace: &str) -> Result<PackagePolicy> {
        let manifest = &self.package.manifest;
        match manifest.package_type.as_str() {
            "integration" => self.build_integration(policy_id, namespace),
            "input" => self.build_input(policy_id, namespace),
            other => bail!("package type {:?} is not supported", other),
        }
    }

    fn build_integration(&self, policy_id: &str, namespace: &str) -> Result<PackagePolicy> {
        let manifest = &self.package.manifest;
        if self.data_stream_name.is_empty() {
            bail!("expected data stream for integration package policy {:?}", self.name);
        }
        let data_stream = self.package.data_stream(&self.data_stream_name).ok_or_else(|| {
            eyre!(
                "data stream {:?} not found in package {}",
                self.data_stream_name,
                manifest.name
            )
        })?;
        let stream = select_stream(data_stream, &self.input_name)?;

        let template_name = if self.template_name.is_empty() {
            find_policy_template_for_data_stream(manifest, data_stream, &stream.input)?
        } else {
            self.template_name.clone()
        };
        let policy_template = select_policy_template_by_name(manifest, &template_name)?;

        let policy = build_integration_package_policy(&IntegrationPolicyOptions {
            policy_id,
            namespace,
            name: &self.name,
            manifest,
            policy_template,
            data_stream,
            input: &stream.input,
            input_vars: &self.vars,
            data_stream_vars: &self.data_stream_vars,
            enabled: !self.disabled,
            data_streams: &self.package.data_streams,
        })?;
        Ok(policy)
    }

    fn build_input(&self, policy_id: &str, namespace: &str) -> Result<PackagePolicy> {
        let manifest = &self.package.manifest;
        if !self.data_stream_name.is_empty() {
            bail!(
                "no data stream expected for input package policy {:?}, found {:?}",
                self.name,
                self.data_stream_name
            );
        }
        let template_name = if self.template_name.is_empty() {
            find_policy_template_for_input_package(manifest, &self.input_name)?
        } else {
            self.template_name.clone()
        };
        let policy_template = select_policy_template_by_name(manifest, &template_name)?;

        Ok(build_input_package_policy(
            policy_id,
            namespace,
            &self.name,
            manifest,
            policy_template,
            &self.vars,
            !self.disabled,
        ))
    }
}

/// Stream for the input type, or the first stream when no input is given.
fn select_stream<'a>(data_stream: &'a DataStreamManifest, input: &str) -> Result<&'a Stream> {
    if input.is_empty() {
        return data_stream
            .streams
            .first()
            .ok_or_else(|| {
                eyre!("no streams declared in data stream manifest {}", data_stream.name)
            });
    }
    data_stream.find_stream(input).ok_or_else(|| {
        eyre!(
            "data stream {} has no stream for input {:?}",
            data_stream.name,
            input
        )
    })
}

fn find_policy_template_for_data_stream(
    manifest: &PackageManifest,
    data_stream: &DataStreamManifest,
    input: &str,
) -> Result<String> {
    let matched: Vec<&str> = manifest
        .policy_templates
        .iter()
        .filter(|pt| pt.find_input_by_type(input).is_some())
        .filter(|pt| pt.data_streams.is_empty() || pt.data_streams.contains(&data_stream.name))
        .map(|pt| pt.name.as_str())
        .collect();
    match matched.as_slice() {
        [name] => Ok(name.to_string()),
        [] => bail!(
            "no policy template was found for data stream {:?} with input type {:?}: verify that \
             the data stream and input are included in the package's policy_templates",
            data_stream.name,
            input
        ),
        many => bail!(
            "ambiguous result: multiple policy templates ([{}]) apply to data stream {:?} with \
             input type {:?}: set the policy template explicitly",
            many.join(", "),
            data_stream.name,
            input
        ),
    }
}

fn find_policy_template_for_input_package(
    manifest: &PackageManifest,
    input: &str,
) -> Result<String> {
    let input = if input.is_empty() {
        manifest
            .policy_templates
            .first()
            .map(|pt| pt.input.as_str())
            .ok_or_else(|| eyre!("no policy templates specified for input package"))?
    } else {
        input
    };
    let matched: Vec<&str> = manifest
        .policy_templates
        .iter()
        .filter(|pt| pt.input == input)
        .map(|pt| pt.name.as_str())
        .collect();
    match matched.as_slice() {
        [name] => Ok(name.to_string()),
        [] => bail!("no policy template was found with input type {:?}", input),
        many => bail!(
            "ambiguous result: multiple policy templates ([{}]) with input type {:?}: set the \
             policy template explicitly",
            many.join(", "),
            input
        ),
    }
}

fn select_policy_template_by_name<'a>(
    manifest: &'a PackageManifest,
    name: &str,
) -> Result<&'a PolicyTemplate> {
    manifest
        .policy_templates
        .iter()
        .find(|pt| pt.name == name)
        .ok_or_else(|| eyre!("policy template {:?} not found", name))
}
