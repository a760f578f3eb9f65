//! Desired state documents
//!
//! ```yaml
//! packages:
//!   - name: nginx
//!     version: 1.2.0
//! policies:
//!   - name: nginx-test
//!     namespace: ep
//!     package_policies:
//!       - name: nginx-access
//!         package: ./packages/nginx
//!         data_stream: access
//!         vars:
//!           paths: ["/var/log/nginx/access.log*"]
//! ```
//!
//! Package paths are relative to the document.

use super::{FleetAgentPolicy, FleetPackage, FleetPackagePolicy, Resource};
use crate::packages::LocalPackage;

use eyre::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredState {
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    #[serde(default)]
    pub provider: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub archive: Option<PathBuf>,
    #[serde(default)]
    pub absent: bool,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySpec {
    #[serde(default)]
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub data_output_id: Option<String>,
    #[serde(default)]
    pub absent: bool,
    #[serde(default)]
    pub package_policies: Vec<PackagePolicySpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackagePolicySpec {
    pub name: String,
    /// Package source directory
    pub package: PathBuf,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub policy_template: String,
    #[serde(default)]
    pub data_stream: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub vars: Map<String, Value>,
    #[serde(default)]
    pub data_stream_vars: Map<String, Value>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl DesiredState {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse desired state")
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read desired state: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid desired state: {}", path.display()))
    }

    /// Resources to apply, packages first, with paths resolved against `base`.
    pub fn into_resources(self, base: &Path) -> Result<Vec<Box<dyn Resource>>> {
        let mut resources: Vec<Box<dyn Resource>> = Vec::new();
        for spec in self.packages {
            resources.push(Box::new(FleetPackage {
                provider: spec.provider,
                name: spec.name,
                version: spec.version,
                archive: spec.archive.map(|a| base.join(a)),
                absent: spec.absent,
                force: spec.force,
            }));
        }
        for spec in self.policies {
            let package_policies = spec
                .package_policies
                .into_iter()
                .map(|pp| pp.resolve(base))
                .collect::<Result<Vec<_>>>()?;
            resources.push(Box::new(FleetAgentPolicy {
                provider: spec.provider,
                name: spec.name,
                id: spec.id,
                description: spec.description,
                namespace: spec.namespace,
                data_output_id: spec.data_output_id,
                absent: spec.absent,
                package_policies,
            }));
        }
        Ok(resources)
    }
}

impl PackagePolicySpec {
    fn resolve(self, base: &Path) -> Result<FleetPackagePolicy> {
        let root = base.join(&self.package);
        let package = LocalPackage::read(&root)
            .with_context(|| format!("could not read package for package policy {:?}", self.name))?;
        Ok(FleetPackagePolicy {
            name: self.name,
            disabled: self.disabled,
            template_name: self.policy_template,
            package,
            data_stream_name: self.data_stream,
            input_name: self.input,
            vars: self.vars,
            data_stream_vars: self.data_stream_vars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_desired_state() {
        let state = DesiredState::from_yaml(
            r#"
packages:
  - name: nginx
    version: 1.2.0
  - name: system
    version: 1.0.0
    absent: true
policies:
  - name: nginx-test
    package_policies:
      - name: nginx-access
        package: packages/nginx
        data_stream: access
        vars:
          paths: ["/var/log/nginx/access.log*"]
"#,
        )
        .unwrap();
        assert_eq!(state.packages.len(), 2);
        assert!(state.packages[1].absent);
        let policy = &state.policies[0];
        assert_eq!(policy.namespace, "default");
        assert_eq!(policy.package_policies[0].vars["paths"][0], "/var/log/nginx/access.log*");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let yaml = "packages:\n  - name: a\n    version: 1.0.0\n    forse: true\n";
        assert!(DesiredState::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_into_resources_reads_packages_relative_to_base() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("packages").join("nginx");
        std::fs::create_dir_all(root.join("data_stream").join("access")).unwrap();
        std::fs::write(
            root.join("manifest.yml"),
            "name: nginx\nversion: 1.2.0\ntype: integration\npolicy_templates:\n  - name: nginx\n    inputs:\n      - type: logfile\n",
        )
        .unwrap();
        std::fs::write(
            root.join("data_stream").join("access").join("manifest.yml"),
            "type: logs\nstreams:\n  - input: logfile\n",
        )
        .unwrap();

        let state = DesiredState::from_yaml(
            "packages:\n  - name: nginx\n    version: 1.2.0\npolicies:\n  - name: p\n    package_policies:\n      - name: pp\n        package: packages/nginx\n        data_stream: access\n",
        )
        .unwrap();
        let resources = state.into_resources(dir.path()).unwrap();
        let names: Vec<_> = resources.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            names,
            vec!["[FleetPackage:kibana:nginx-1.2.0]", "[FleetAgentPolicy:kibana:p]"]
        );
    }

    #[test]
    fn test_missing_package_directory() {
        let dir = TempDir::new().unwrap();
        let state = DesiredState::from_yaml(
            "policies:\n  - name: p\n    package_policies:\n      - name: pp\n        package: nowhere\n",
        )
        .unwrap();
        let err = state.into_resources(dir.path()).err().unwrap();
        assert!(format!("{err:#}").contains("package policy \"pp\""));
    }
}
