//! Saved object and dashboard export
//!
//! Kibana 8.11 removed the dashboards export API. Dashboards are exported
//! through `_export` on newer stacks and through the old endpoint otherwise;
//! both yield the same list of saved objects.

use crate::client::{
    CORE_API, KibanaClient, KibanaError, Result, SAVED_OBJECTS_API, decode_json,
    uses_saved_objects_export,
};
use crate::storage::decode_ndjson;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A saved object reference (type + id)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SavedObjectRef {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: String,
}

impl SavedObjectRef {
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: id.into(),
        }
    }
}

/// Body of `POST /api/saved_objects/_export`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub exclude_export_details: bool,
    pub include_references_deep: bool,
    pub objects: Vec<SavedObjectRef>,
}

impl ExportRequest {
    /// Dashboards with everything they reference.
    pub fn dashboards<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude_export_details: true,
            include_references_deep: true,
            objects: ids
                .into_iter()
                .map(|id| SavedObjectRef::new("dashboard", id))
                .collect(),
        }
    }

    /// One object without its references.
    pub fn single(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            exclude_export_details: true,
            include_references_deep: false,
            objects: vec![SavedObjectRef::new(object_type, id)],
        }
    }
}

#[derive(Deserialize)]
struct LegacyExport {
    #[serde(default)]
    objects: Vec<Value>,
}

impl KibanaClient {
    /// Export dashboards and the objects they reference.
    ///
    /// Per-object failures reported by the pre-8.11 endpoint are collected
    /// into a single [`KibanaError::Aggregate`].
    pub async fn export_dashboards(&self, ids: &[String]) -> Result<Vec<Value>> {
        let version = self.semver().await?;
        if uses_saved_objects_export(version.as_ref()) {
            log::debug!("Export dashboards using the Kibana Saved Objects Export API");
            self.export_saved_objects(&ExportRequest::dashboards(ids.iter().cloned()))
                .await
        } else {
            log::debug!("Export dashboards using the Kibana Export API");
            self.export_with_dashboards_api(ids).await
        }
    }

    /// `POST /api/saved_objects/_export`, decoding the NDJSON response.
    pub async fn export_saved_objects(&self, request: &ExportRequest) -> Result<Vec<Value>> {
        let path = format!("{}/_export", SAVED_OBJECTS_API);
        let response = self.post_json(&path, request).await?;
        let body = response.expect_ok("export saved objects", &path)?;
        let objects = decode_ndjson(&body)
            .map_err(|e| KibanaError::decode("export saved objects", &body, e))?;
        log::debug!("Exported {} saved object(s)", objects.len());
        Ok(objects)
    }

    async fn export_with_dashboards_api(&self, ids: &[String]) -> Result<Vec<Value>> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("dashboard", id.as_str())).collect();
        let path = format!("{}/dashboards/export", CORE_API);
        let body = self.get_ok("export dashboards", &path, &query).await?;
        let exported: LegacyExport = decode_json("export dashboards", &body)?;

        let errors: Vec<String> = exported
            .objects
            .iter()
            .filter_map(|o| o.pointer("/error/message"))
            .map(|m| match m {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        if !errors.is_empty() {
            return Err(KibanaError::Aggregate {
                operation: "export dashboards".to_string(),
                errors,
            });
        }
        Ok(exported.objects)
    }
}
