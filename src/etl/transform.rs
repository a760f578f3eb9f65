//! Transformer trait

use eyre::Result;

/// Synchronous per-item rewrite between extraction and loading.
///
/// See [`ManagedFlag`](crate::transform::ManagedFlag) for the transformer
/// used when toggling the managed flag of saved objects.
pub trait Transformer: Send + Sync {
    type Input: Send;
    type Output: Send;

    /// Transform a single item
    ///
    /// # Errors
    /// Returns an error if the item cannot be converted.
    fn transform(&self, input: Self::Input) -> Result<Self::Output>;

    /// Transform a batch, stopping at the first failure
    fn transform_many(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>> {
        inputs.into_iter().map(|i| self.transform(i)).collect()
    }
}

/// Passes items through unchanged, e.g. when exporting straight to a file.
pub struct IdentityTransformer<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for IdentityTransformer<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> IdentityTransformer<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Send + Sync> Transformer for IdentityTransformer<T> {
    type Input = T;
    type Output = T;

    fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_identity_keeps_saved_objects() {
        let transformer = IdentityTransformer::<Value>::new();
        let input = vec![
            json!({"type": "dashboard", "id": "a"}),
            json!({"type": "visualization", "id": "b"}),
        ];
        let output = transformer.transform_many(input.clone()).unwrap();
        assert_eq!(input, output);
    }
}
