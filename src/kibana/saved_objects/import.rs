//! Saved object import
//!
//! Objects are uploaded as an NDJSON file in a multipart form via
//! `POST /api/saved_objects/_import`.

use crate::client::{KibanaClient, KibanaError, Result, SAVED_OBJECTS_API, decode_json};
use crate::storage::encode_ndjson;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub success_count: usize,
    #[serde(default)]
    pub success_results: Vec<ImportResult>,
    #[serde(default)]
    pub errors: Vec<ImportResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportResult {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub error: Map<String, Value>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ImportResult {
    fn describe(&self) -> String {
        let reason = self
            .error
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        format!("{} {}: {}", self.object_type, self.id, reason)
    }
}

impl ImportResponse {
    /// Per-object failures as one error, if Kibana reported any.
    pub fn into_result(self) -> Result<Self> {
        if self.success && self.errors.is_empty() {
            return Ok(self);
        }
        Err(KibanaError::Aggregate {
            operation: "import saved objects".to_string(),
            errors: self.errors.iter().map(ImportResult::describe).collect(),
        })
    }
}

impl KibanaClient {
    /// Import saved objects, replacing existing ones when `overwrite` is set.
    ///
    /// The response is returned as is; use [`ImportResponse::into_result`] to
    /// turn per-object failures into an error.
    pub async fn import_saved_objects(
        &self,
        objects: &[Value],
        overwrite: bool,
    ) -> Result<ImportResponse> {
        let ndjson = encode_ndjson(objects)
            .map_err(|e| KibanaError::InvalidRequest(format!("failed to encode objects: {}", e)))?;
        let path = format!("{}/_import", SAVED_OBJECTS_API);
        let query: &[(&str, &str)] = if overwrite {
            &[("overwrite", "true")]
        } else {
            &[]
        };

        log::debug!("Importing {} object(s)", objects.len());
        let response = self.post_form(&path, query, ndjson).await?;
        let body = response.expect_ok("import saved objects", &path)?;
        decode_json("import saved objects", &body)
    }
}
