//! Pipeline orchestration

use super::{Extractor, Loader, Transformer};
use eyre::Result;

/// Runs an [`Extractor`], a [`Transformer`] and a [`Loader`] in sequence.
///
/// # Example
/// ```no_run
/// use kibana_fleet_manager::etl::{IdentityTransformer, Pipeline};
/// use kibana_fleet_manager::kibana::saved_objects::{ExportRequest, SavedObjectsExtractor};
/// use kibana_fleet_manager::storage::NdjsonWriter;
/// # use kibana_fleet_manager::client::KibanaClient;
/// # async fn example(client: KibanaClient) -> eyre::Result<()> {
/// let pipeline = Pipeline::new(
///     SavedObjectsExtractor::new(client, ExportRequest::dashboards(["d-1"])),
///     IdentityTransformer::new(),
///     NdjsonWriter::new("dashboards.ndjson"),
/// );
/// let count = pipeline.run().await?;
/// println!("Exported {} objects", count);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<E, T, L> {
    extractor: E,
    transformer: T,
    loader: L,
}

impl<E, T, L> Pipeline<E, T, L>
where
    E: Extractor,
    T: Transformer<Input = E::Item>,
    L: Loader<Item = T::Output>,
{
    pub fn new(extractor: E, transformer: T, loader: L) -> Self {
        Self {
            extractor,
            transformer,
            loader,
        }
    }

    /// Extract, transform and load; returns the number of items loaded.
    ///
    /// An empty extraction loads nothing and returns 0.
    ///
    /// # Errors
    /// Returns the first error of any stage.
    pub async fn run(&self) -> Result<usize> {
        log::debug!("Starting pipeline");

        let items = self.extractor.extract().await?;
        log::debug!("Extracted {} items", items.len());

        if items.is_empty() {
            log::warn!("No items extracted, nothing to load");
            return Ok(0);
        }

        let transformed = self.transformer.transform_many(items)?;
        log::debug!("Transformed {} items", transformed.len());

        let count = self.loader.load(transformed).await?;
        log::info!("Loaded {} items", count);

        Ok(count)
    }
}
