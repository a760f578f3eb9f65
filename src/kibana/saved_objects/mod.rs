//! Kibana saved objects API
//!
//! Export (version gated for dashboards), import, dashboard discovery and
//! the managed flag rewrite.

mod dashboards;
mod export;
mod extractor;
mod import;
mod loader;

pub use dashboards::DashboardSavedObject;
pub use export::{ExportRequest, SavedObjectRef};
pub use extractor::SavedObjectsExtractor;
pub use import::{ImportResponse, ImportResult};
pub use loader::SavedObjectsLoader;

use crate::client::{KibanaClient, KibanaError, ResourceKind};
use crate::etl::Pipeline;
use crate::transform::ManagedFlag;

use eyre::{Context, Result};

impl KibanaClient {
    /// Mark a saved object as managed or unmanaged.
    ///
    /// Kibana offers no update for this attribute, so the object is exported
    /// without references, rewritten and imported back with overwrite.
    pub async fn set_managed_saved_object(
        &self,
        object_type: &str,
        id: &str,
        managed: bool,
    ) -> Result<()> {
        let pipeline = Pipeline::new(
            SavedObjectsExtractor::new(self.clone(), ExportRequest::single(object_type, id)),
            ManagedFlag::new(managed),
            SavedObjectsLoader::new(self.clone()),
        );
        let count = pipeline
            .run()
            .await
            .wrap_err_with(|| {
                format!("Failed to set managed={} on {} {}", managed, object_type, id)
            })?;
        if count == 0 {
            return Err(KibanaError::not_found(
                ResourceKind::SavedObject,
                format!("{}/{}", object_type, id),
            )
            .into());
        }
        log::info!("Set managed={} on {} {}", managed, object_type, id);
        Ok(())
    }
}
