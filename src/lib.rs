//! Kibana Fleet Manager
//!
//! Provisions Fleet packages, agent policies, package policies and saved
//! objects through the Kibana HTTP APIs, across stack versions.

pub mod cli;
pub mod client;
pub mod codec;
pub mod etl;
pub mod fleet;
pub mod kibana;
pub mod packages;
pub mod pagination;
pub mod resources;
pub mod storage;
pub mod transform;
pub mod wait;

// Re-exports for convenience
pub use client::{Auth, AuthType, ClientOptions, KibanaClient, KibanaError, ResourceKind};
pub use etl::{Extractor, IdentityTransformer, Loader, Pipeline, Transformer};
pub use resources::{Manager, Resource};
pub use storage::{NdjsonReader, NdjsonWriter};
pub use wait::WaitConfig;
