//! Saved objects as a pipeline source

use super::ExportRequest;
use crate::client::KibanaClient;
use crate::etl::Extractor;

use eyre::{Context, Result};
use serde_json::Value;

enum Source {
    Dashboards(Vec<String>),
    Objects(ExportRequest),
}

/// Exports saved objects from Kibana.
pub struct SavedObjectsExtractor {
    client: KibanaClient,
    source: Source,
}

impl SavedObjectsExtractor {
    /// Dashboards and their references, through whichever export API the
    /// stack supports.
    pub fn dashboards(client: KibanaClient, ids: Vec<String>) -> Self {
        Self {
            client,
            source: Source::Dashboards(ids),
        }
    }

    /// Arbitrary objects through the saved objects export API.
    pub fn new(client: KibanaClient, request: ExportRequest) -> Self {
        Self {
            client,
            source: Source::Objects(request),
        }
    }
}

impl Extractor for SavedObjectsExtractor {
    type Item = Value;

    async fn extract(&self) -> Result<Vec<Self::Item>> {
        let objects = match &self.source {
            Source::Dashboards(ids) => self
                .client
                .export_dashboards(ids)
                .await
                .wrap_err("Failed to export dashboards from Kibana")?,
            Source::Objects(request) => self
                .client
                .export_saved_objects(request)
                .await
                .wrap_err("Failed to export saved objects from Kibana")?,
        };
        log::debug!("Extracted {} saved object(s)", objects.len());
        Ok(objects)
    }
}
