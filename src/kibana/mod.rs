//! Kibana (non-Fleet) APIs

pub mod saved_objects;

pub use saved_objects::{SavedObjectsExtractor, SavedObjectsLoader};
