//! Package manifest structures.
//!
//! These are the already-parsed views of a package's `manifest.yml` and its
//! data stream manifests that the package policy builders consume.

use crate::codec::VarValue;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Variable declared by a package, policy template, input or stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: String,
    #[serde(default)]
    pub default: Option<VarValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Input {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub vars: Vec<Variable>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyTemplate {
    pub name: String,
    /// Inputs of an integration package template
    #[serde(default)]
    pub inputs: Vec<Input>,
    /// Input type of an input package template
    #[serde(default)]
    pub input: String,
    /// Data stream type of an input package template
    #[serde(rename = "type", default)]
    pub template_type: String,
    #[serde(default)]
    pub vars: Vec<Variable>,
    #[serde(default)]
    pub data_streams: Vec<String>,
}

impl PolicyTemplate {
    pub fn find_input_by_type(&self, input_type: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.input_type == input_type)
    }
}

/// Top level `manifest.yml` of a package.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(rename = "type", default)]
    pub package_type: String,
    #[serde(default)]
    pub policy_templates: Vec<PolicyTemplate>,
    #[serde(default)]
    pub vars: Vec<Variable>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Stream {
    pub input: String,
    #[serde(default)]
    pub vars: Vec<Variable>,
}

/// Data stream `manifest.yml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DataStreamManifest {
    /// Directory name of the data stream
    #[serde(default)]
    pub name: String,
    /// Explicit dataset, overriding `{package}.{name}`
    #[serde(default)]
    pub dataset: String,
    #[serde(rename = "type", default)]
    pub ds_type: String,
    #[serde(default)]
    pub streams: Vec<Stream>,
}

impl DataStreamManifest {
    pub fn find_stream(&self, input_type: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.input == input_type)
    }

    /// Dataset name, `{package}.{data stream}` unless declared.
    pub fn dataset_for(&self, package: &str) -> String {
        if self.dataset.is_empty() {
            format!("{}.{}", package, self.name)
        } else {
            self.dataset.clone()
        }
    }
}

/// Installed asset reference, as listed by the EPM API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    #[serde(rename = "type")]
    pub asset_type: String,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.asset_type)
    }
}

/// A package source tree: `manifest.yml` and `data_stream/*/manifest.yml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPackage {
    pub manifest: PackageManifest,
    pub data_streams: Vec<DataStreamManifest>,
}

impl LocalPackage {
    pub fn read(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let manifest: PackageManifest = read_yaml(&root.join("manifest.yml"))?;

        let mut data_streams = Vec::new();
        let ds_root = root.join("data_stream");
        if ds_root.is_dir() {
            let entries = std::fs::read_dir(&ds_root)
                .with_context(|| format!("Failed to list {}", ds_root.display()))?;
            for entry in entries {
                let entry = entry?;
                let manifest_path = entry.path().join("manifest.yml");
                if !manifest_path.is_file() {
                    continue;
                }
                let mut ds: DataStreamManifest = read_yaml(&manifest_path)?;
                ds.name = entry.file_name().to_string_lossy().into_owned();
                data_streams.push(ds);
            }
        }
        data_streams.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            manifest,
            data_streams,
        })
    }

    pub fn data_stream(&self, name: &str) -> Option<&DataStreamManifest> {
        self.data_streams.iter().find(|ds| ds.name == name)
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_from_yaml() {
        let yaml = r#"
name: apache
version: 1.0.0
type: integration
policy_templates:
  - name: apache
    inputs:
      - type: logfile
        vars:
          - name: preserve_original_event
            type: bool
            default: false
      - type: apache/metrics
vars:
  - name: ssl
    type: yaml
"#;
        let manifest: PackageManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.package_type, "integration");
        let template = &manifest.policy_templates[0];
        let logfile = template.find_input_by_type("logfile").unwrap();
        assert_eq!(logfile.vars[0].default, Some(VarValue::Scalar(false.into())));
        assert!(template.find_input_by_type("httpjson").is_none());
        assert_eq!(manifest.vars[0].default, None);
    }

    #[test]
    fn test_dataset_for() {
        let mut ds = DataStreamManifest {
            name: "access".to_string(),
            ..Default::default()
        };
        assert_eq!(ds.dataset_for("apache"), "apache.access");
        ds.dataset = "apache.custom".to_string();
        assert_eq!(ds.dataset_for("apache"), "apache.custom");
    }

    #[test]
    fn test_read_local_package() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(
            root.join("manifest.yml"),
            "name: apache\nversion: 1.0.0\ntype: integration\npolicy_templates:\n  - name: apache\n    inputs:\n      - type: logfile\n",
        )
        .unwrap();
        for (name, body) in [
            ("error", "type: logs\nstreams:\n  - input: logfile\n"),
            ("access", "type: logs\ndataset: apache.web\nstreams:\n  - input: logfile\n    vars:\n      - name: paths\n        type: text\n"),
        ] {
            let ds = root.join("data_stream").join(name);
            std::fs::create_dir_all(&ds).unwrap();
            std::fs::write(ds.join("manifest.yml"), body).unwrap();
        }

        let package = LocalPackage::read(root).unwrap();
        assert_eq!(package.manifest.version, "1.0.0");
        let names: Vec<_> = package.data_streams.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["access", "error"]);
        let access = package.data_stream("access").unwrap();
        assert_eq!(access.dataset_for("apache"), "apache.web");
        assert_eq!(access.find_stream("logfile").unwrap().vars[0].name, "paths");
    }

    #[test]
    fn test_read_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let err = LocalPackage::read(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("manifest.yml"));
    }
}
