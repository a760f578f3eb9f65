//! Managed flag transformer
//!
//! Kibana has no update API for the `managed` attribute of a saved object.
//! The flag is changed by exporting the object, rewriting it with this
//! transformer and importing it back with overwrite enabled.

use crate::etl::Transformer;
use eyre::Result;
use serde_json::{Value, json};

/// Sets `managed` to a fixed value on every object.
///
/// Both values are written explicitly: an absent flag would leave Kibana's
/// stored value unchanged on overwrite.
///
/// # Example
/// ```
/// use kibana_fleet_manager::transform::ManagedFlag;
/// use kibana_fleet_manager::etl::Transformer;
/// use serde_json::json;
///
/// let flag = ManagedFlag::new(false);
/// let output = flag.transform(json!({"id": "d-1", "managed": true})).unwrap();
/// assert_eq!(output["managed"], false);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ManagedFlag {
    managed: bool,
}

impl ManagedFlag {
    pub fn new(managed: bool) -> Self {
        Self { managed }
    }
}

impl Transformer for ManagedFlag {
    type Input = Value;
    type Output = Value;

    fn transform(&self, mut input: Self::Input) -> Result<Self::Output> {
        match input.as_object_mut() {
            Some(obj) => {
                obj.insert("managed".to_string(), json!(self.managed));
                Ok(input)
            }
            None => eyre::bail!("saved object is not a JSON object: {}", input),
        }
    }
}
