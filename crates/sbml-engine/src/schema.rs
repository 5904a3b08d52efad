//! The user-drawn property-graph schema ("modelisation"), as exported by arrows.app.
//!
//! A schema is a set of typed nodes carrying the property names to extract and
//! typed relationships between them. Once loaded it is read-only; the
//! [`SchemaGraph`] keeps an adjacency index so the reconciliation engine can
//! walk it as a directed multigraph or as its undirected projection.

use crate::entity::{Entity, Properties};
use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl SchemaNode {
    pub fn new(id: &str, labels: &[&str], properties: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: properties
                .iter()
                .map(|p| (p.to_string(), Value::String("str".into())))
                .collect(),
        }
    }

    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

impl Entity for SchemaNode {
    fn id(&self) -> &str {
        &self.id
    }
    fn properties(&self) -> &Properties {
        &self.properties
    }
    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaRelationship {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub label: String,
    pub properties: Properties,
}

impl SchemaRelationship {
    pub fn new(id: &str, from_id: &str, to_id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            label: label.to_string(),
            properties: Properties::new(),
        }
    }

    /// Word chunks of a compound relationship type, e.g. `HAS_COMPARTMENT`.
    pub fn chunks(&self) -> impl Iterator<Item = &str> {
        self.label.split('_')
    }
}

impl Entity for SchemaRelationship {
    fn id(&self) -> &str {
        &self.id
    }
    fn properties(&self) -> &Properties {
        &self.properties
    }
    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}

#[derive(Deserialize)]
struct RawNode {
    id: Option<Value>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelationship {
    id: Option<Value>,
    from_id: Option<Value>,
    to_id: Option<Value>,
    #[serde(rename = "type", default)]
    label: Option<String>,
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
    graph: Option<Box<RawDocument>>,
}

fn opaque_id(value: Option<Value>, field: &'static str) -> Result<String, SchemaError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(SchemaError::MissingField(field)),
    }
}

/// Schema nodes and relationships plus an adjacency index, in source order.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    nodes: Vec<SchemaNode>,
    relationships: Vec<SchemaRelationship>,
    index: HashMap<String, usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl SchemaGraph {
    /// Build the graph. Relationships with an empty type, or whose ends are not
    /// declared nodes, are dropped with a warning.
    pub fn new(nodes: Vec<SchemaNode>, relationships: Vec<SchemaRelationship>) -> Self {
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(ix, n)| (n.id.clone(), ix))
            .collect();
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut kept = Vec::with_capacity(relationships.len());

        for rel in relationships {
            if rel.label.trim().is_empty() {
                warn!("Relationship {} has no type, it is ignored", rel.id);
                continue;
            }
            let (Some(&from), Some(&to)) = (index.get(&rel.from_id), index.get(&rel.to_id)) else {
                warn!(
                    "Relationship {} ({}) references an unknown node: {} - {}",
                    rel.id, rel.label, rel.from_id, rel.to_id
                );
                continue;
            };
            outgoing[from].push(kept.len());
            incoming[to].push(kept.len());
            kept.push(rel);
        }

        Self {
            nodes,
            relationships: kept,
            index,
            outgoing,
            incoming,
        }
    }

    /// Load an arrows.app export, either flat or nested under `graph`.
    /// With `add_id`, every node declares an `id` property.
    pub fn from_json(path: impl AsRef<Path>, add_id: bool) -> Result<Self, SchemaError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content, add_id)
    }

    pub fn from_json_str(content: &str, add_id: bool) -> Result<Self, SchemaError> {
        let mut raw: RawDocument = serde_json::from_str(content)?;
        if raw.nodes.is_empty() && raw.relationships.is_empty() {
            if let Some(inner) = raw.graph.take() {
                raw = *inner;
            }
        }

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        for node in raw.nodes {
            let mut properties = node.properties.unwrap_or_default();
            if add_id && !properties.keys().any(|k| k.eq_ignore_ascii_case("id")) {
                properties.insert("id".to_string(), Value::String("str".into()));
            }
            nodes.push(SchemaNode {
                id: opaque_id(node.id, "id")?,
                labels: node.labels,
                properties,
            });
        }

        let mut relationships = Vec::with_capacity(raw.relationships.len());
        for rel in raw.relationships {
            relationships.push(SchemaRelationship {
                id: opaque_id(rel.id, "id")?,
                from_id: opaque_id(rel.from_id, "fromId")?,
                to_id: opaque_id(rel.to_id, "toId")?,
                label: rel.label.unwrap_or_default(),
                properties: rel.properties.unwrap_or_default(),
            });
        }

        Ok(Self::new(nodes, relationships))
    }

    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    pub fn relationships(&self) -> &[SchemaRelationship] {
        &self.relationships
    }

    pub fn node(&self, id: &str) -> Option<&SchemaNode> {
        self.index.get(id).map(|&ix| &self.nodes[ix])
    }

    /// Relationships declared from `from` to `to`, in source order.
    pub fn edges_between(&self, from: &str, to: &str) -> Vec<&SchemaRelationship> {
        let Some(&from_ix) = self.index.get(from) else {
            return Vec::new();
        };
        self.outgoing[from_ix]
            .iter()
            .map(|&r| &self.relationships[r])
            .filter(|r| r.to_id == to)
            .collect()
    }

    /// Neighbours ignoring direction: predecessors first, then successors, without repeats.
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        let Some(&ix) = self.index.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let preds = self.incoming[ix].iter().map(|&r| self.relationships[r].from_id.as_str());
        let succs = self.outgoing[ix].iter().map(|&r| self.relationships[r].to_id.as_str());
        for other in preds.chain(succs) {
            if other != id && seen.insert(other) {
                out.push(other);
            }
        }
        out
    }

    /// Every (node, neighbour) ordered pair, both orientations included.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.nodes
            .iter()
            .flat_map(|n| {
                self.neighbors(&n.id)
                    .into_iter()
                    .map(move |other| (n.id.as_str(), other))
            })
            .collect()
    }

    /// Depth-first discovery order over the undirected projection, starting at
    /// `source` and descending at most `depth_limit` hops. The source comes first.
    pub fn dfs_order(&self, source: &str, depth_limit: usize) -> Vec<&str> {
        let Some(&start) = self.index.get(source) else {
            return Vec::new();
        };
        let start = self.nodes[start].id.as_str();
        let mut order = vec![start];
        if depth_limit == 0 {
            return order;
        }
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut stack: Vec<(usize, std::vec::IntoIter<&str>)> =
            vec![(depth_limit, self.neighbors(start).into_iter())];

        while let Some((depth, children)) = stack.last_mut() {
            let depth = *depth;
            match children.next() {
                Some(child) => {
                    if visited.insert(child) {
                        order.push(child);
                        if depth > 1 {
                            stack.push((depth - 1, self.neighbors(child).into_iter()));
                        }
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATHWAY: &str = r#"{
        "nodes": [
            {"id": "n0", "labels": ["Species"], "properties": {"id": "str", "name": "str", "initialAmount": "float"}},
            {"id": "n1", "labels": ["Reaction"], "properties": {"id": "str", "name": "str"}},
            {"id": "n2", "labels": ["Compartment"], "properties": {"id": "str", "size": "int"}},
            {"id": "n3", "labels": [], "properties": {}}
        ],
        "relationships": [
            {"id": "r0", "fromId": "n0", "toId": "n1", "type": "IS_REACTANT", "properties": {}},
            {"id": "r1", "fromId": "n1", "toId": "n0", "type": "HAS_PRODUCT", "properties": {}},
            {"id": "r2", "fromId": "n0", "toId": "n2", "type": "HAS_COMPARTMENT", "properties": {}},
            {"id": "r3", "fromId": "n1", "toId": "n2", "type": "", "properties": {}}
        ]
    }"#;

    #[test]
    fn load_drops_untyped_relationships() {
        let graph = SchemaGraph::from_json_str(PATHWAY, false).unwrap();
        assert_eq!(graph.nodes().len(), 4);
        assert_eq!(graph.relationships().len(), 3);
        assert_eq!(graph.relationships()[2].label, "HAS_COMPARTMENT");
        assert_eq!(graph.node("n2").unwrap().primary_label(), Some("Compartment"));
        assert_eq!(graph.node("n3").unwrap().primary_label(), None);
    }

    #[test]
    fn nested_graph_and_add_id() {
        let doc = r#"{"graph": {"nodes": [{"id": "a", "labels": ["Model"], "properties": {"name": "str"}}], "relationships": []}}"#;
        let graph = SchemaGraph::from_json_str(doc, true).unwrap();
        let node = graph.node("a").unwrap();
        assert!(node.has_property("id"));
        assert!(node.has_property("name"));

        let graph = SchemaGraph::from_json_str(doc, false).unwrap();
        assert!(!graph.node("a").unwrap().has_property("id"));
    }

    #[test]
    fn directed_edges_and_undirected_neighbours() {
        let graph = SchemaGraph::from_json_str(PATHWAY, false).unwrap();
        let forward: Vec<_> = graph.edges_between("n0", "n1").iter().map(|r| r.label.clone()).collect();
        assert_eq!(forward, vec!["IS_REACTANT"]);
        let backward: Vec<_> = graph.edges_between("n1", "n0").iter().map(|r| r.label.clone()).collect();
        assert_eq!(backward, vec!["HAS_PRODUCT"]);
        assert!(graph.edges_between("n2", "n0").is_empty());

        assert_eq!(graph.neighbors("n0"), vec!["n1", "n2"]);
        assert_eq!(graph.neighbors("n2"), vec!["n0"]);
        assert!(graph.pairs().contains(&("n2", "n0")));
        assert!(graph.pairs().contains(&("n0", "n2")));
    }

    #[test]
    fn dfs_order_respects_depth() {
        let graph = SchemaGraph::from_json_str(PATHWAY, false).unwrap();
        assert_eq!(graph.dfs_order("n2", 1), vec!["n2", "n0"]);
        assert_eq!(graph.dfs_order("n2", 2), vec!["n2", "n0", "n1"]);
        assert_eq!(graph.dfs_order("n2", 0), vec!["n2"]);
    }
}
