//! Loader trait

use eyre::Result;

/// Destination for the items of a [`Pipeline`](super::Pipeline).
///
/// # Example
/// ```no_run
/// use kibana_fleet_manager::etl::Loader;
/// use eyre::Result;
/// use serde_json::Value;
///
/// struct Discard;
///
/// impl Loader for Discard {
///     type Item = Value;
///
///     async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
///         Ok(items.len())
///     }
/// }
/// ```
pub trait Loader: Send + Sync {
    type Item: Send;

    /// Load items, returning how many the destination accepted.
    ///
    /// # Errors
    /// Returns an error if the destination rejects the batch.
    fn load(
        &self,
        items: Vec<Self::Item>,
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}
