pub mod config;
pub mod entity;
pub mod error;
pub mod export;
pub mod ingest;
pub mod introspect;
pub mod persistence;
pub mod reconcile;
pub mod sbml;
pub mod schema;
pub mod store;
pub mod structure;

pub use entity::{Entity, Node, Properties, Relationship};
pub use error::{ConfigError, ExportError, ModelError, SchemaError, StoreError};
pub use sbml::SbmlDocument;
pub use schema::SchemaGraph;
pub use structure::StructureGraph;
