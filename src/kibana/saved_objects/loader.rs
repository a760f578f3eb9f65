//! Saved objects as a pipeline destination

use crate::client::KibanaClient;
use crate::etl::Loader;

use eyre::{Context, Result};
use serde_json::Value;

/// Imports saved objects into Kibana.
pub struct SavedObjectsLoader {
    client: KibanaClient,
    overwrite: bool,
}

impl SavedObjectsLoader {
    /// Loader that overwrites existing objects.
    pub fn new(client: KibanaClient) -> Self {
        Self {
            client,
            overwrite: true,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl Loader for SavedObjectsLoader {
    type Item = Value;

    async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
        let response = self
            .client
            .import_saved_objects(&items, self.overwrite)
            .await
            .and_then(|r| r.into_result())
            .wrap_err("Failed to import saved objects to Kibana")?;
        log::info!("Imported {} object(s) to Kibana", response.success_count);
        Ok(response.success_count)
    }
}
