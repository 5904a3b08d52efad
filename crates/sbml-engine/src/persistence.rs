use crate::entity::{Node, Relationship};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Mapped records as written to, or read back from, a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl GraphSnapshot {
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Self {
        Self {
            nodes,
            relationships,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, data)?;
        info!(
            "Graph saved to {} ({} nodes, {} relationships)",
            path.display(),
            self.nodes.len(),
            self.relationships.len()
        );
        Ok(())
    }

    /// A missing file reads as an empty snapshot.
    pub fn load_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let snapshot: GraphSnapshot = serde_json::from_str(&data).map_err(std::io::Error::other)?;
        info!("Graph loaded from {}", path.display());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use serde_json::json;

    #[test]
    fn snapshot_survives_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let mut node = Node::new("c", vec!["Compartment".into()]);
        node.add_property("size", json!(1.0), true);
        let snapshot = GraphSnapshot::new(
            vec![node],
            vec![Relationship::new("Species", "Compartment", "S1", "c", "HAS_COMPARTMENT")],
        );
        snapshot.save_to_file(&path).unwrap();

        let loaded = GraphSnapshot::load_from_file(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = GraphSnapshot::load_from_file(dir.path().join("none.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(GraphSnapshot::load_from_file(&path).is_err());
    }
}
