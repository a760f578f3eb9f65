//! Extractor trait

use eyre::Result;

/// Source of items for a [`Pipeline`](super::Pipeline).
///
/// # Example
/// ```no_run
/// use kibana_fleet_manager::etl::Extractor;
/// use eyre::Result;
/// use serde_json::{Value, json};
///
/// struct Fixed;
///
/// impl Extractor for Fixed {
///     type Item = Value;
///
///     async fn extract(&self) -> Result<Vec<Self::Item>> {
///         Ok(vec![json!({"type": "dashboard", "id": "d-1"})])
///     }
/// }
/// ```
pub trait Extractor: Send + Sync {
    type Item: Send;

    /// Extract all items from the source.
    ///
    /// # Errors
    /// Returns an error if the source cannot be read or decoded.
    fn extract(&self) -> impl std::future::Future<Output = Result<Vec<Self::Item>>> + Send;
}
