//! Graph persistence behind one trait, so the mappers never see a driver.

use crate::entity::{Node, Properties, Relationship};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

pub mod memory;
pub mod neo4j;

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;

/// A node as read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    /// Store-internal identifier, stable for the lifetime of the store.
    pub element_id: String,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl StoredNode {
    /// The `id` property as text, whatever its stored type.
    pub fn id(&self) -> Option<String> {
        match self.properties.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRelationship {
    pub label: String,
    pub properties: Properties,
}

/// One node adjacent to a queried node, with the edge joining them.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub node: StoredNode,
    pub relationship: StoredRelationship,
}

/// Node count per label and relationship count per type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub nodes: BTreeMap<String, i64>,
    pub relationships: BTreeMap<String, i64>,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Merge nodes on their labels, `id` and `tag`. Returns how many were sent.
    async fn create_nodes(&self, nodes: &[Node]) -> Result<usize, StoreError>;

    /// Merge relationships between already stored nodes.
    async fn create_relationships(&self, relationships: &[Relationship]) -> Result<usize, StoreError>;

    async fn query_labels(&self) -> Result<Vec<String>, StoreError>;

    async fn query_nodes(&self, label: &str) -> Result<Vec<StoredNode>, StoreError>;

    /// Nodes adjacent to `element_id`, in both directions.
    async fn query_neighbors(&self, element_id: &str) -> Result<Vec<Neighbor>, StoreError>;

    /// Run raw Cypher, returning each row as a map.
    async fn query(&self, cypher: &str, params: Properties) -> Result<Vec<Properties>, StoreError>;

    async fn statistics(&self) -> Result<Statistics, StoreError>;

    /// Delete every node and relationship.
    async fn clean(&self) -> Result<(), StoreError>;
}
