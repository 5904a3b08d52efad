//! Reverse mapping: rebuild a model from what a graph store holds.

use crate::entity::TAG_PROPERTY;
use crate::error::{ExportError, ModelError, StoreError};
use crate::introspect::{find_setter, ModelBuilder, Value, CREATE_PREFIX};
use crate::reconcile;
use crate::sbml::SbmlDocument;
use crate::schema::SchemaGraph;
use crate::store::{GraphStore, Neighbor, StoredNode};
use crate::structure::{KindId, KindNode, StructureGraph};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct ReverseMapper<'s, B: ModelBuilder> {
    document: B,
    structure: StructureGraph,
    store: &'s dyn GraphStore,
}

impl<'s> ReverseMapper<'s, SbmlDocument> {
    /// Empty SBML document of the given level and version, with its taxonomy.
    pub fn from_specifications(level: u32, version: u32, store: &'s dyn GraphStore) -> Result<Self, ModelError> {
        let structure = StructureGraph::from_specifications(level, version)?;
        let document = SbmlDocument::from_specifications(level, version);
        Ok(Self::new(document, structure, store))
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        self.document.write_file(path.as_ref())?;
        info!("Model written to {}", path.as_ref().display());
        Ok(())
    }
}

impl<'s, B: ModelBuilder> ReverseMapper<'s, B> {
    pub fn new(document: B, structure: StructureGraph, store: &'s dyn GraphStore) -> Self {
        Self {
            document,
            structure,
            store,
        }
    }

    pub fn document(&self) -> &B {
        &self.document
    }

    pub fn into_document(self) -> B {
        self.document
    }

    pub fn structure(&self) -> &StructureGraph {
        &self.structure
    }

    /// Decide which kinds are extracted, from the schema.
    pub fn annotate(&mut self, schema: &SchemaGraph) {
        reconcile::annotate(&mut self.structure, schema);
    }

    /// Bind in-scope kinds to the labels present in the database. A kind is
    /// bound only when exactly one database label matches.
    pub async fn conciliate_labels(&mut self) -> Result<(), StoreError> {
        let live = self.store.query_labels().await?;
        for kind in 0..self.structure.len() {
            let node = self.structure.node(kind);
            if !node.in_scope() || node.labels_neo4j.is_some() {
                continue;
            }
            let wanted = node.labels_arrows.as_deref().unwrap_or(&node.label);
            let candidates: Vec<&String> = live
                .iter()
                .filter(|l| l.eq_ignore_ascii_case(wanted))
                .collect();
            match candidates.as_slice() {
                [label] => {
                    debug!("Kind {} reads label {}", node.label, label);
                    let label = (*label).clone();
                    self.structure.node_mut(kind).labels_neo4j = Some(label);
                }
                [] => debug!("No label in the database for {}", wanted),
                _ => warn!("Several labels in the database match {}", wanted),
            }
        }
        Ok(())
    }

    /// Walk the taxonomy depth-first from the root and create one element per
    /// matching database node. Returns the number of elements created.
    pub async fn extract_entities(&mut self) -> Result<usize, ExportError> {
        let root = self
            .structure
            .root()
            .ok_or_else(|| ModelError::Structural("No root kind".into()))?;
        let model = self
            .document
            .model()
            .ok_or_else(|| ModelError::Structural("No model found".into()))?;

        // database element id to the model elements created for it, per kind
        let mut instances: HashMap<KindId, HashMap<String, Vec<B::Element>>> = HashMap::new();
        let mut created = 0;

        let root_node = self.structure.node(root).clone();
        let mut root_instances = HashMap::new();
        if let (true, Some(label)) = (root_node.in_scope(), root_node.labels_neo4j.as_deref()) {
            let rows = self.store.query_nodes(label).await?;
            match rows.as_slice() {
                [row] => {
                    self.copy_properties(model, &root_node, row)?;
                    root_instances.insert(row.element_id.clone(), vec![model]);
                }
                _ => warn!("Expected one {} node in the database, found {}", label, rows.len()),
            }
        }
        instances.insert(root, root_instances);

        let mut stack: Vec<KindId> = self.structure.children(root).iter().rev().copied().collect();
        while let Some(kind) = stack.pop() {
            stack.extend(self.structure.children(kind).iter().rev().copied());

            let node = self.structure.node(kind).clone();
            if !node.in_scope() {
                continue;
            }
            let Some(db_label) = node.labels_neo4j.clone() else {
                warn!("No label in the database for kind {}", node.label);
                continue;
            };
            let Some(parent) = self.structure.parent(kind) else {
                continue;
            };
            let parent_node = self.structure.node(parent).clone();
            let child_labels: Vec<String> = self
                .structure
                .children(kind)
                .iter()
                .filter_map(|c| self.structure.node(*c).labels_neo4j.clone())
                .collect();

            let rows = self.store.query_nodes(&db_label).await?;
            let mut made: HashMap<String, Vec<B::Element>> = HashMap::new();

            if node.level <= 1 {
                for row in &rows {
                    let element = self.create(model, &node.label)?;
                    self.copy_properties(element, &node, row)?;
                    let neighbors = self.store.query_neighbors(&row.element_id).await?;
                    self.copy_foreign_keys(element, &neighbors, &child_labels, None)?;
                    made.insert(row.element_id.clone(), vec![element]);
                    created += 1;
                }
            } else {
                let parents = instances.get(&parent).filter(|p| !p.is_empty());
                let (Some(parents), Some(parent_label)) = (parents, parent_node.labels_neo4j.as_deref()) else {
                    warn!(
                        "Kind {} is skipped: its parent kind {} was not extracted",
                        node.label, parent_node.label
                    );
                    continue;
                };
                let parents = parents.clone();

                for row in &rows {
                    let neighbors = self.store.query_neighbors(&row.element_id).await?;
                    let owners = neighbors.iter().filter(|nb| {
                        nb.node.has_label(parent_label)
                            && node
                                .relationship
                                .as_ref()
                                .map_or(true, |rel| rel.label == nb.relationship.label)
                    });
                    for owner in owners {
                        let Some(parent_elements) = parents.get(&owner.node.element_id) else {
                            continue;
                        };
                        for &parent_element in parent_elements {
                            let element = self.create(parent_element, &node.label)?;
                            match node.labels_arrows.as_deref() {
                                Some(reference) => {
                                    self.set_reference(element, reference, row)?;
                                    for (key, value) in &owner.relationship.properties {
                                        self.set_property(element, key, value)?;
                                    }
                                }
                                None => {
                                    self.copy_properties(element, &node, row)?;
                                    self.copy_foreign_keys(element, &neighbors, &child_labels, Some(parent_label))?;
                                }
                            }
                            made.entry(row.element_id.clone()).or_default().push(element);
                            created += 1;
                        }
                        if node.labels_arrows.is_none() {
                            break;
                        }
                    }
                }
            }
            debug!(
                "Kind {}: {} element(s)",
                node.label,
                made.values().map(Vec::len).sum::<usize>()
            );
            instances.insert(kind, made);
        }
        info!("{} elements extracted", created);
        Ok(created)
    }

    fn create(&mut self, parent: B::Element, label: &str) -> Result<B::Element, ModelError> {
        let creator = format!("{CREATE_PREFIX}{label}");
        for view in self.document.views(parent) {
            if self.document.creator_names(view).contains(&creator) {
                return self.document.create_child(view, &creator);
            }
        }
        Err(ModelError::UnknownCreator {
            kind: self.document.kind_name(parent),
            creator,
        })
    }

    /// Copy the declared properties of the kind, or every stored property
    /// when the schema declares none.
    fn copy_properties(&mut self, element: B::Element, node: &KindNode, row: &StoredNode) -> Result<(), ModelError> {
        let keys: Vec<String> = match &node.properties {
            Some(declared) if !declared.is_empty() => declared.keys().cloned().collect(),
            _ => row.properties.keys().cloned().collect(),
        };
        for key in keys {
            if key == TAG_PROPERTY {
                continue;
            }
            if let Some(value) = row.properties.get(&key) {
                self.set_property(element, &key, value)?;
            }
        }
        Ok(())
    }

    /// Point a reference element at the node it stands for.
    fn set_reference(&mut self, element: B::Element, reference: &str, row: &StoredNode) -> Result<(), ModelError> {
        let Some(id) = row.id() else {
            return Ok(());
        };
        for view in self.document.views(element) {
            let setters = find_setter(&self.document.setter_names(view), reference, true);
            if let [setter] = setters.as_slice() {
                return self.document.set(view, setter, Value::Str(id));
            }
        }
        debug!("No setter for reference {} on {}", reference, self.document.kind_name(element));
        Ok(())
    }

    /// Neighbours that are neither children nor the parent become attributes
    /// named after their label (`setCompartment` for a Compartment neighbour).
    fn copy_foreign_keys(
        &mut self,
        element: B::Element,
        neighbors: &[Neighbor],
        child_labels: &[String],
        parent_label: Option<&str>,
    ) -> Result<(), ModelError> {
        for neighbor in neighbors {
            let labels = &neighbor.node.labels;
            if labels.iter().any(|l| child_labels.contains(l) || Some(l.as_str()) == parent_label) {
                continue;
            }
            let Some(id) = neighbor.node.id() else {
                continue;
            };
            'labels: for label in labels {
                for view in self.document.views(element) {
                    let setters = find_setter(&self.document.setter_names(view), label, true);
                    if let [setter] = setters.as_slice() {
                        self.document.set(view, setter, Value::Str(id.clone()))?;
                        break 'labels;
                    }
                }
            }
        }
        Ok(())
    }

    fn set_property(&mut self, element: B::Element, key: &str, value: &serde_json::Value) -> Result<(), ModelError> {
        for view in self.document.views(element) {
            let setters = find_setter(&self.document.setter_names(view), key, false);
            match setters.as_slice() {
                [] => continue,
                [setter] => {
                    let value = if setter.eq_ignore_ascii_case("setMath") {
                        formula(value)
                    } else {
                        cast(value)
                    };
                    if let Err(e) = self.document.set(view, setter, value) {
                        warn!("Property {} not set: {}", key, e);
                    }
                    return Ok(());
                }
                several => {
                    warn!("Several setters found for the property {}: {}", key, several.join(" "));
                    continue;
                }
            }
        }
        debug!("No setter found for the property {} on {}", key, self.document.kind_name(element));
        Ok(())
    }
}

/// Stored values come back as text more often than not; recover their type.
fn cast<E>(value: &serde_json::Value) -> Value<E> {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = trimmed.parse::<f64>() {
                Value::Float(f)
            } else if trimmed.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                Value::Str(s.clone())
            }
        }
        other => Value::Str(other.to_string()),
    }
}

fn formula<E>(value: &serde_json::Value) -> Value<E> {
    match value {
        serde_json::Value::String(s) => Value::Str(s.clone()),
        other => cast(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_text_is_cast_back() {
        assert_eq!(cast::<()>(&json!("12")), Value::Int(12));
        assert_eq!(cast::<()>(&json!("0.5")), Value::Float(0.5));
        assert_eq!(cast::<()>(&json!("True")), Value::Bool(true));
        assert_eq!(cast::<()>(&json!("S1")), Value::Str("S1".into()));
        assert_eq!(cast::<()>(&json!(2.5)), Value::Float(2.5));
        assert!(matches!(cast::<()>(&json!("INF")), Value::Float(f) if f.is_infinite()));
    }

    #[test]
    fn formulas_stay_text() {
        assert_eq!(formula::<()>(&json!("k1 * S1")), Value::Str("k1 * S1".into()));
        assert_eq!(formula::<()>(&json!("2")), Value::Str("2".into()));
    }
}
