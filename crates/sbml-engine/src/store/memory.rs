use super::{GraphStore, Neighbor, Statistics, StoredNode, StoredRelationship};
use crate::entity::{Entity, Node, Properties, Relationship, TAG_PROPERTY};
use crate::error::StoreError;
use crate::persistence::GraphSnapshot;
use async_trait::async_trait;
use serde_json::json;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

const ELEMENT_PREFIX: &str = "mem:";

#[derive(Debug)]
struct Edge {
    from: usize,
    to: usize,
    label: String,
    properties: Properties,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<StoredNode>,
    edges: Vec<Edge>,
}

impl State {
    fn matches(node: &StoredNode, labels: &[String], id: &str, tag: Option<&str>) -> bool {
        labels.iter().all(|l| node.has_label(l))
            && node.id().as_deref() == Some(id)
            && tag.map_or(true, |t| node.properties.get(TAG_PROPERTY) == Some(&json!(t)))
    }

    fn merge_node(&mut self, node: &Node) {
        let tag = node.tag();
        let existing = self
            .nodes
            .iter_mut()
            .find(|n| Self::matches(n, &node.labels, &node.id, tag));
        match existing {
            Some(stored) => {
                for (key, value) in &node.properties {
                    stored.properties.insert(key.clone(), value.clone());
                }
            }
            None => {
                let mut properties = Properties::new();
                properties.insert("id".to_string(), json!(node.id));
                properties.extend(node.properties.clone());
                let element_id = format!("{ELEMENT_PREFIX}{}", self.nodes.len());
                self.nodes.push(StoredNode {
                    element_id,
                    labels: node.labels.clone(),
                    properties,
                });
            }
        }
    }

    fn merge_relationship(&mut self, rel: &Relationship) {
        let tag = rel.tag();
        let endpoints = |label: &str, id: &str| -> Vec<usize> {
            self.nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| Self::matches(n, &[label.to_string()], id, tag))
                .map(|(ix, _)| ix)
                .collect()
        };
        let froms = endpoints(&rel.from_label, &rel.from_id);
        let tos = endpoints(&rel.to_label, &rel.to_id);
        for &from in &froms {
            for &to in &tos {
                let exists = self
                    .edges
                    .iter()
                    .any(|e| e.from == from && e.to == to && e.label == rel.label);
                if !exists {
                    self.edges.push(Edge {
                        from,
                        to,
                        label: rel.label.clone(),
                        properties: rel.properties.clone(),
                    });
                }
            }
        }
    }

    fn index(&self, element_id: &str) -> Option<usize> {
        element_id
            .strip_prefix(ELEMENT_PREFIX)?
            .parse::<usize>()
            .ok()
            .filter(|ix| *ix < self.nodes.len())
    }
}

/// In-process store with Neo4j MERGE semantics, used for dry runs, snapshots
/// and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let mut state = State::default();
        for node in &snapshot.nodes {
            state.merge_node(node);
        }
        for rel in &snapshot.relationships {
            state.merge_relationship(rel);
        }
        debug!(
            "Loaded {} nodes and {} relationships from snapshot",
            state.nodes.len(),
            state.edges.len()
        );
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn node_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).edges.len()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn create_nodes(&self, nodes: &[Node]) -> Result<usize, StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for node in nodes {
            state.merge_node(node);
        }
        Ok(nodes.len())
    }

    async fn create_relationships(&self, relationships: &[Relationship]) -> Result<usize, StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for rel in relationships {
            state.merge_relationship(rel);
        }
        Ok(relationships.len())
    }

    async fn query_labels(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut labels: Vec<String> = Vec::new();
        for label in state.nodes.iter().flat_map(|n| n.labels.iter()) {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        Ok(labels)
    }

    async fn query_nodes(&self, label: &str) -> Result<Vec<StoredNode>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.has_label(label))
            .cloned()
            .collect())
    }

    async fn query_neighbors(&self, element_id: &str) -> Result<Vec<Neighbor>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let Some(ix) = state.index(element_id) else {
            return Ok(Vec::new());
        };
        let mut res = Vec::new();
        for edge in &state.edges {
            let other = if edge.from == ix {
                edge.to
            } else if edge.to == ix {
                edge.from
            } else {
                continue;
            };
            res.push(Neighbor {
                node: state.nodes[other].clone(),
                relationship: StoredRelationship {
                    label: edge.label.clone(),
                    properties: edge.properties.clone(),
                },
            });
        }
        Ok(res)
    }

    async fn query(&self, cypher: &str, _params: Properties) -> Result<Vec<Properties>, StoreError> {
        Err(StoreError::Query(format!(
            "the in-memory store cannot run Cypher: {cypher}"
        )))
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = Statistics::default();
        for label in state.nodes.iter().flat_map(|n| n.labels.iter()) {
            *stats.nodes.entry(label.clone()).or_default() += 1;
        }
        for edge in &state.edges {
            *stats.relationships.entry(edge.label.clone()).or_default() += 1;
        }
        Ok(stats)
    }

    async fn clean(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = State::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, label: &str, tag: Option<&str>) -> Node {
        let mut node = Node::new(id, vec![label.to_string()]);
        node.add_property("name", json!(id), true);
        if let Some(tag) = tag {
            node.add_property(TAG_PROPERTY, json!(tag), true);
        }
        node
    }

    #[tokio::test]
    async fn nodes_merge_on_label_id_and_tag() {
        let store = MemoryStore::new();
        store
            .create_nodes(&[node("c", "Compartment", None), node("c", "Compartment", None)])
            .await
            .unwrap();
        assert_eq!(store.node_count(), 1);

        store
            .create_nodes(&[node("c", "Compartment", Some("a")), node("c", "Compartment", Some("b"))])
            .await
            .unwrap();
        assert_eq!(store.node_count(), 3);

        let found = store.query_nodes("Compartment").await.unwrap();
        assert_eq!(found[0].id().as_deref(), Some("c"));
        assert_eq!(found[0].element_id, "mem:0");
    }

    #[tokio::test]
    async fn relationships_are_visible_from_both_ends() {
        let store = MemoryStore::new();
        store
            .create_nodes(&[node("S1", "Species", None), node("c", "Compartment", None)])
            .await
            .unwrap();
        let rel = Relationship::new("Species", "Compartment", "S1", "c", "HAS_COMPARTMENT");
        store.create_relationships(&[rel.clone(), rel]).await.unwrap();
        assert_eq!(store.relationship_count(), 1);

        let from_compartment = store.query_neighbors("mem:1").await.unwrap();
        assert_eq!(from_compartment.len(), 1);
        assert_eq!(from_compartment[0].node.id().as_deref(), Some("S1"));
        assert_eq!(from_compartment[0].relationship.label, "HAS_COMPARTMENT");
        assert!(store.query_neighbors("mem:9").await.unwrap().is_empty());

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.nodes["Species"], 1);
        assert_eq!(stats.relationships["HAS_COMPARTMENT"], 1);

        assert!(store.query("RETURN 1", Properties::new()).await.is_err());
        store.clean().await.unwrap();
        assert!(store.query_labels().await.unwrap().is_empty());
    }
}
