//! Taxonomy of element kinds, discovered by probing child creators.

use crate::entity::Properties;
use crate::error::ModelError;
use crate::introspect::{ModelBuilder, CREATE_PREFIX};
use crate::sbml::SbmlDocument;
use crate::schema::SchemaRelationship;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

pub type KindId = usize;

/// Label of the kind every walk starts from.
pub const ROOT_LABEL: &str = "Model";

/// Nesting is bounded in practice; recursive kinds (`and`/`or` associations)
/// would otherwise keep producing levels.
const MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindNode {
    pub label: String,
    pub level: usize,
    /// In scope for extraction. `None` until reconciliation has run.
    pub modelisation: Option<bool>,
    pub properties: Option<Properties>,
    /// Schema-side label when the kind was matched through a relationship name.
    pub labels_arrows: Option<String>,
    pub relationship: Option<SchemaRelationship>,
    /// Label actually present in the database.
    pub labels_neo4j: Option<String>,
}

impl KindNode {
    pub fn in_scope(&self) -> bool {
        self.modelisation == Some(true)
    }
}

/// Directed containment tree of kinds stored as an adjacency list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StructureGraph {
    nodes: Vec<KindNode>,
    children: Vec<Vec<KindId>>,
    parents: Vec<Option<KindId>>,
}

impl StructureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk a scratch document of the given level and version.
    pub fn from_specifications(level: u32, version: u32) -> Result<Self, ModelError> {
        let mut scratch = SbmlDocument::from_specifications(level, version);
        Self::discover(&mut scratch)
    }

    /// Build the taxonomy by creating one prototype child per creator, level by
    /// level, until a pass adds nothing. The prototypes are left in `document`.
    pub fn discover<B: ModelBuilder>(document: &mut B) -> Result<Self, ModelError> {
        let model = document
            .model()
            .ok_or_else(|| ModelError::Structural("No model found".into()))?;

        let mut graph = Self::new();
        let mut prototypes = vec![model];
        graph.add_node(ROOT_LABEL, 0);

        let mut level = 0;
        loop {
            let known = graph.len();
            for kind in 0..known {
                if graph.nodes[kind].level < level {
                    continue;
                }
                let prototype = prototypes[kind];
                for view in document.views(prototype) {
                    for creator in document.creator_names(view) {
                        let child = match document.create_child(view, &creator) {
                            Ok(child) => child,
                            Err(e) => {
                                debug!("Probe {} skipped: {}", creator, e);
                                continue;
                            }
                        };
                        let label = creator.strip_prefix(CREATE_PREFIX).unwrap_or(&creator);
                        let id = graph.add_node(label, level + 1);
                        graph.add_edge(kind, id);
                        prototypes.push(child);
                    }
                }
            }
            if graph.len() == known {
                break;
            }
            level += 1;
            if level >= MAX_DEPTH {
                warn!("Kind discovery stopped at depth {}", MAX_DEPTH);
                break;
            }
        }
        debug!("Discovered {} kinds over {} levels", graph.len(), level + 1);
        Ok(graph)
    }

    pub fn add_node(&mut self, label: &str, level: usize) -> KindId {
        let id = self.nodes.len();
        self.nodes.push(KindNode {
            label: label.to_string(),
            level,
            ..Default::default()
        });
        self.children.push(Vec::new());
        self.parents.push(None);
        id
    }

    pub fn add_edge(&mut self, parent: KindId, child: KindId) {
        if parent >= self.nodes.len() || child >= self.nodes.len() {
            return;
        }
        self.children[parent].push(child);
        self.parents[child] = Some(parent);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: KindId) -> &KindNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: KindId) -> &mut KindNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (KindId, &KindNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn children(&self, id: KindId) -> &[KindId] {
        &self.children[id]
    }

    pub fn parent(&self, id: KindId) -> Option<KindId> {
        self.parents[id]
    }

    /// The single kind carrying `label`, or `None` when absent or repeated.
    pub fn find_unique(&self, label: &str) -> Option<KindId> {
        let mut found = self.nodes().filter(|(_, n)| n.label == label).map(|(id, _)| id);
        let first = found.next()?;
        match found.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    pub fn root(&self) -> Option<KindId> {
        self.find_unique(ROOT_LABEL)
    }

    /// Labels with their number of kinds, in first-seen order.
    pub fn label_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for node in &self.nodes {
            match index.get(node.label.as_str()) {
                Some(&ix) => counts[ix].1 += 1,
                None => {
                    index.insert(&node.label, counts.len());
                    counts.push((node.label.clone(), 1));
                }
            }
        }
        counts
    }

    /// Parent first, then children.
    pub fn neighbors(&self, id: KindId) -> Vec<KindId> {
        self.parents[id]
            .into_iter()
            .chain(self.children[id].iter().copied())
            .filter(|&other| other != id)
            .collect()
    }

    /// Every (kind, neighbour) ordered pair.
    pub fn pairs(&self) -> Vec<(KindId, KindId)> {
        (0..self.len())
            .flat_map(|id| self.neighbors(id).into_iter().map(move |other| (id, other)))
            .collect()
    }

    /// Breadth-first shortest path ignoring edge direction, both ends included.
    pub fn shortest_path(&self, from: KindId, to: KindId) -> Option<Vec<KindId>> {
        if from >= self.len() || to >= self.len() {
            return None;
        }
        let mut previous: HashMap<KindId, KindId> = HashMap::new();
        let mut visited = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&prev) = previous.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.neighbors(current) {
                if visited.insert(next) {
                    previous.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    pub fn max_level(&self) -> usize {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l3v2() -> StructureGraph {
        StructureGraph::from_specifications(3, 2).unwrap()
    }

    fn labels_under(graph: &StructureGraph, parent: &str) -> Vec<String> {
        let id = graph.find_unique(parent).unwrap();
        graph
            .children(id)
            .iter()
            .map(|c| graph.node(*c).label.clone())
            .collect()
    }

    #[test]
    fn model_is_the_root() {
        let graph = l3v2();
        let root = graph.root().unwrap();
        assert_eq!(root, 0);
        assert_eq!(graph.node(root).level, 0);
        assert!(graph.parent(root).is_none());
        assert!(graph.nodes().all(|(_, n)| n.modelisation.is_none()));
    }

    #[test]
    fn reaction_children_come_from_creator_names() {
        let graph = l3v2();
        let children = labels_under(&graph, "Reaction");
        assert_eq!(children, vec!["Reactant", "Product", "Modifier", "KineticLaw"]);
        let reaction = graph.find_unique("Reaction").unwrap();
        assert_eq!(graph.node(reaction).level, 1);
        let law = graph.find_unique("KineticLaw").unwrap();
        assert_eq!(graph.node(law).level, 2);
    }

    #[test]
    fn parameter_appears_twice() {
        let graph = l3v2();
        let parameters: Vec<_> = graph
            .nodes()
            .filter(|(_, n)| n.label == "Parameter")
            .map(|(id, n)| (id, n.level))
            .collect();
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0].1, 1);
        assert_eq!(parameters[1].1, 3);
        assert!(graph.find_unique("Parameter").is_none());
        assert!(graph.find_unique("LocalParameter").is_some());
    }

    #[test]
    fn level_two_has_no_local_parameters() {
        let graph = StructureGraph::from_specifications(2, 4).unwrap();
        assert!(graph.nodes().all(|(_, n)| n.label != "LocalParameter"));
        assert!(graph.nodes().all(|(_, n)| n.label != "Priority"));
    }

    #[test]
    fn shortest_path_runs_from_the_root() {
        let graph = l3v2();
        let root = graph.root().unwrap();
        let deep = graph
            .nodes()
            .find(|(_, n)| n.label == "Parameter" && n.level == 3)
            .map(|(id, _)| id)
            .unwrap();
        let path = graph.shortest_path(root, deep).unwrap();
        let labels: Vec<_> = path.iter().map(|k| graph.node(*k).label.as_str()).collect();
        assert_eq!(labels, vec!["Model", "Reaction", "KineticLaw", "Parameter"]);
    }

    #[test]
    fn label_counts_flag_duplicates() {
        let graph = l3v2();
        let counts = graph.label_counts();
        assert_eq!(counts[0], ("Model".to_string(), 1));
        assert!(counts.contains(&("Parameter".to_string(), 2)));
    }
}
