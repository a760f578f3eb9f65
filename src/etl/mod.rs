//! Extract, transform, load abstractions
//!
//! Saved-object round trips (export from Kibana, rewrite, import back or
//! write to disk) are expressed as a [`Pipeline`] of these three stages.

mod extract;
mod load;
mod pipeline;
mod transform;

pub use extract::Extractor;
pub use load::Loader;
pub use pipeline::Pipeline;
pub use transform::{IdentityTransformer, Transformer};
