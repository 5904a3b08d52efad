use crate::introspect::ModelDocument;
use crate::persistence::GraphSnapshot;
use crate::sbml::SbmlDocument;
use crate::schema::SchemaGraph;
use crate::store::GraphStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub mod mapper;

pub use mapper::Mapper;

/// Map a parsed model through a schema into node and relationship records.
pub fn map_document<D: ModelDocument>(
    document: &D,
    schema: &SchemaGraph,
    tag: Option<String>,
) -> Result<GraphSnapshot> {
    let mut mapper = Mapper::new(document, tag)?;

    info!("Map schema to data - nodes");
    let nodes = mapper.format_nodes(schema.nodes());

    info!("Map schema to data - relationships");
    let relationships = mapper.format_relationships(schema.relationships());

    info!(
        "{} nodes and {} relationships mapped",
        nodes.len(),
        relationships.len()
    );
    Ok(GraphSnapshot::new(nodes, relationships))
}

/// Read both files from disk and map them.
pub fn map_files(model: &Path, schema: &Path, tag: Option<String>) -> Result<GraphSnapshot> {
    info!("Load SBML file");
    let document = SbmlDocument::from_file(model)
        .with_context(|| format!("Failed to read model: {:?}", model))?;

    info!("Load modelisation file");
    let schema = SchemaGraph::from_json(schema, true)
        .with_context(|| format!("Failed to read modelisation: {:?}", schema))?;

    map_document(&document, &schema, tag)
}

pub struct IngestionEngine {
    store: Arc<dyn GraphStore>,
}

impl IngestionEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Write mapped records, nodes first. Returns (nodes, relationships) sent.
    pub async fn load(&self, snapshot: &GraphSnapshot) -> Result<(usize, usize)> {
        info!("Import into neo4j - nodes");
        let nodes = self
            .store
            .create_nodes(&snapshot.nodes)
            .await
            .context("Failed to write nodes")?;

        if snapshot.relationships.is_empty() {
            info!("None relationship created");
            return Ok((nodes, 0));
        }
        info!("Import into neo4j - relationships");
        let relationships = self
            .store
            .create_relationships(&snapshot.relationships)
            .await
            .context("Failed to write relationships")?;
        Ok((nodes, relationships))
    }

    pub async fn ingest_files(&self, model: &Path, schema: &Path, tag: Option<String>) -> Result<GraphSnapshot> {
        let snapshot = map_files(model, schema, tag)?;
        self.load(&snapshot).await?;
        Ok(snapshot)
    }
}
