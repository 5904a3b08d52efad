//! Bind kinds of the structure graph to the nodes of a user schema.
//!
//! Matching runs from the least to the most ambiguous evidence: unique labels,
//! then label paths for repeated labels, then relationship-name chunks. A kind
//! claimed by an earlier step keeps its binding. Every kind ends with
//! `modelisation` set.

use crate::schema::{SchemaGraph, SchemaNode, SchemaRelationship};
use crate::structure::{KindId, StructureGraph, ROOT_LABEL};
use tracing::{debug, info};

/// A label or an ordered label list.
#[derive(Debug, Clone, Copy)]
pub enum Labels<'a> {
    One(&'a str),
    Many(&'a [String]),
}

impl<'a> From<&'a str> for Labels<'a> {
    fn from(label: &'a str) -> Self {
        Labels::One(label)
    }
}

impl<'a> From<&'a String> for Labels<'a> {
    fn from(label: &'a String) -> Self {
        Labels::One(label)
    }
}

impl<'a> From<&'a [String]> for Labels<'a> {
    fn from(labels: &'a [String]) -> Self {
        Labels::Many(labels)
    }
}

impl<'a> From<&'a Vec<String>> for Labels<'a> {
    fn from(labels: &'a Vec<String>) -> Self {
        Labels::Many(labels)
    }
}

/// Case-insensitive comparison. A single label is compared to the first entry
/// of a list; two lists must agree entry by entry.
pub fn compare_labels<'a, 'b>(first: impl Into<Labels<'a>>, second: impl Into<Labels<'b>>) -> bool {
    match (first.into(), second.into()) {
        (Labels::One(a), Labels::One(b)) => a.eq_ignore_ascii_case(b),
        (Labels::One(a), Labels::Many(b)) | (Labels::Many(b), Labels::One(a)) => {
            b.first().is_some_and(|b| a.eq_ignore_ascii_case(b))
        }
        (Labels::Many(a), Labels::Many(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
        }
    }
}

/// Labels carried by exactly one kind (`uniq`) or by several.
pub fn select_labels(structure: &StructureGraph, uniq: bool) -> Vec<String> {
    structure
        .label_counts()
        .into_iter()
        .filter(|(_, count)| if uniq { *count < 2 } else { *count > 1 })
        .map(|(label, _)| label)
        .collect()
}

pub fn annotate(structure: &mut StructureGraph, schema: &SchemaGraph) {
    match_unique_labels(structure, schema);
    match_label_paths(structure, schema);
    match_relationship_names(structure, schema);

    let mut in_scope = 0;
    for id in 0..structure.len() {
        let node = structure.node_mut(id);
        if node.modelisation.is_none() {
            node.modelisation = Some(false);
        }
        if node.in_scope() {
            in_scope += 1;
        }
    }
    info!("{} of {} kinds are in scope", in_scope, structure.len());
}

fn match_unique_labels(structure: &mut StructureGraph, schema: &SchemaGraph) {
    for label in select_labels(structure, true) {
        let Some(kind) = structure.find_unique(&label) else {
            continue;
        };
        if let Some(candidate) = schema.nodes().iter().find(|n| compare_labels(&label, &n.labels)) {
            let node = structure.node_mut(kind);
            node.modelisation = Some(true);
            node.properties = Some(candidate.properties.clone());
            debug!("Kind {} bound to schema node {}", label, candidate.id);
        }
    }
}

/// Repeated labels are told apart by the labels met on the way to the root,
/// compared with a depth-first walk around each schema candidate.
fn match_label_paths(structure: &mut StructureGraph, schema: &SchemaGraph) {
    let duplicates = select_labels(structure, false);
    let Some(root) = structure.find_unique(ROOT_LABEL) else {
        return;
    };

    for kind in 0..structure.len() {
        let label = structure.node(kind).label.clone();
        if !duplicates.contains(&label) {
            continue;
        }
        let Some(mut path) = structure.shortest_path(root, kind) else {
            continue;
        };
        path.reverse();
        let path_labels: Vec<String> = path
            .iter()
            .map(|k| structure.node(*k).label.clone())
            .collect();

        for candidate in schema.nodes() {
            if !compare_labels(&label, &candidate.labels) {
                continue;
            }
            let mut walk = schema.dfs_order(&candidate.id, path.len());
            walk.truncate(path.len());
            let walk_labels: Vec<String> = walk
                .iter()
                .filter_map(|id| schema.node(id))
                .map(|n| n.primary_label().unwrap_or_default().to_string())
                .collect();

            if compare_labels(&path_labels, &walk_labels) {
                for k in &path {
                    structure.node_mut(*k).modelisation = Some(true);
                }
                structure.node_mut(kind).properties = Some(candidate.properties.clone());
                debug!("Kind {} (#{}) bound to schema node {} by path", label, kind, candidate.id);
                break;
            }
        }
    }
}

fn match_relationship_names(structure: &mut StructureGraph, schema: &SchemaGraph) {
    let schema_pairs = schema.pairs();
    for (first, second) in structure.pairs() {
        for &(a, b) in &schema_pairs {
            let (Some(node_a), Some(node_b)) = (schema.node(a), schema.node(b)) else {
                continue;
            };
            let first_matches = compare_labels(&structure.node(first).label, &node_a.labels);
            let second_matches = compare_labels(&structure.node(second).label, &node_b.labels);
            if first_matches && second_matches {
                continue;
            }
            let relationships = schema.edges_between(a, b);
            if relationships.is_empty() {
                continue;
            }
            if first_matches {
                claim(structure, first, second, node_b, &relationships);
            } else if second_matches {
                claim(structure, second, first, node_a, &relationships);
            }
        }
    }
}

/// Bind `target` to `sibling` when one relationship word names the target kind.
fn claim(
    structure: &mut StructureGraph,
    anchor: KindId,
    target: KindId,
    sibling: &SchemaNode,
    relationships: &[&SchemaRelationship],
) {
    if structure.node(target).modelisation.is_some() {
        return;
    }
    let target_label = structure.node(target).label.clone();
    let Some(relationship) = relationships
        .iter()
        .find(|r| r.chunks().any(|chunk| compare_labels(chunk, &target_label)))
    else {
        return;
    };

    structure.node_mut(anchor).modelisation = Some(true);
    let node = structure.node_mut(target);
    node.modelisation = Some(true);
    node.properties = Some(sibling.properties.clone());
    node.labels_arrows = sibling.primary_label().map(str::to_string);
    node.relationship = Some((*relationship).clone());
    debug!(
        "Kind {} bound to schema node {} through {}",
        target_label, sibling.id, relationship.label
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kind(structure: &StructureGraph, label: &str, level: usize) -> KindId {
        structure
            .nodes()
            .find(|(_, n)| n.label == label && n.level == level)
            .map(|(id, _)| id)
            .unwrap()
    }

    fn l3v2() -> StructureGraph {
        StructureGraph::from_specifications(3, 2).unwrap()
    }

    #[test]
    fn compare_labels_handles_scalars_and_lists() {
        let list = vec!["Species".to_string(), "Entity".to_string()];
        assert!(compare_labels("species", "SPECIES"));
        assert!(compare_labels("species", &list));
        assert!(compare_labels(&list, "Species"));
        assert!(!compare_labels("entity", &list));
        assert!(compare_labels(&list, &vec!["SPECIES".to_string(), "entity".to_string()]));
        assert!(!compare_labels(&list, &vec!["Entity".to_string(), "Species".to_string()]));
        assert!(!compare_labels("species", &Vec::<String>::new()));
    }

    #[test]
    fn select_labels_partitions_by_count() {
        let structure = l3v2();
        let unique = select_labels(&structure, true);
        let repeated = select_labels(&structure, false);
        assert!(unique.contains(&"Compartment".to_string()));
        assert_eq!(repeated, vec!["Parameter".to_string()]);
    }

    #[test]
    fn unique_label_copies_declared_properties() {
        let mut structure = l3v2();
        let schema = SchemaGraph::new(vec![SchemaNode::new("c", &["Compartment"], &["id", "name"])], vec![]);
        annotate(&mut structure, &schema);

        let compartment = structure.node(structure.find_unique("Compartment").unwrap());
        assert_eq!(compartment.modelisation, Some(true));
        let keys: Vec<_> = compartment.properties.as_ref().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn every_kind_ends_with_a_flag() {
        let mut structure = l3v2();
        let schema = SchemaGraph::new(
            vec![
                SchemaNode::new("s", &["Species"], &["id"]),
                SchemaNode::new("c", &["Compartment"], &["id"]),
            ],
            vec![SchemaRelationship::new("r", "s", "c", "HAS_COMPARTMENT")],
        );
        annotate(&mut structure, &schema);
        assert!(structure.nodes().all(|(_, n)| n.modelisation.is_some()));
        let event = structure.find_unique("Event").unwrap();
        assert_eq!(structure.node(event).modelisation, Some(false));
    }

    fn parameter_schema(local_first: bool) -> SchemaGraph {
        let global = SchemaNode::new("p1", &["Parameter"], &["id", "value"]);
        let local = SchemaNode::new("p2", &["Parameter"], &["id", "name"]);
        let mut nodes = vec![
            SchemaNode::new("m", &["Model"], &["id"]),
            SchemaNode::new("r", &["Reaction"], &["id"]),
            SchemaNode::new("k", &["KineticLaw"], &["math"]),
        ];
        if local_first {
            nodes.extend([local, global]);
        } else {
            nodes.extend([global, local]);
        }
        let mut relationships = vec![
            SchemaRelationship::new("e0", "m", "p1", "HAS_PARAMETER"),
            SchemaRelationship::new("e1", "m", "r", "HAS_REACTION"),
            SchemaRelationship::new("e2", "r", "k", "HAS_KINETICLAW"),
            SchemaRelationship::new("e3", "k", "p2", "HAS_PARAMETER"),
        ];
        if local_first {
            relationships.push(SchemaRelationship::new("e4", "p2", "m", "DECLARED_IN"));
        }
        SchemaGraph::new(nodes, relationships)
    }

    #[test]
    fn repeated_labels_follow_their_paths() {
        let mut structure = l3v2();
        annotate(&mut structure, &parameter_schema(false));

        let global = structure.node(kind(&structure, "Parameter", 1));
        assert_eq!(global.modelisation, Some(true));
        assert!(global.properties.as_ref().unwrap().contains_key("value"));

        let local = structure.node(kind(&structure, "Parameter", 3));
        assert_eq!(local.modelisation, Some(true));
        assert!(local.properties.as_ref().unwrap().contains_key("name"));

        let law = structure.node(kind(&structure, "KineticLaw", 2));
        assert_eq!(law.modelisation, Some(true));
    }

    #[test]
    fn dfs_walk_is_truncated_to_the_path_length() {
        // p2 is listed first and also touches Model directly, but the walk
        // reaches KineticLaw before Model, so it never binds the top-level kind.
        let mut structure = l3v2();
        annotate(&mut structure, &parameter_schema(true));

        let global = structure.node(kind(&structure, "Parameter", 1));
        let keys: Vec<_> = global.properties.as_ref().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "value"]);

        let local = structure.node(kind(&structure, "Parameter", 3));
        let keys: Vec<_> = local.properties.as_ref().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn relationship_words_bind_reference_kinds() {
        let mut structure = l3v2();
        let mut species = SchemaNode::new("s", &["Species"], &["id", "name"]);
        species.properties.insert("initialAmount".into(), json!("float"));
        let schema = SchemaGraph::new(
            vec![SchemaNode::new("r", &["Reaction"], &["id"]), species],
            vec![SchemaRelationship::new("e", "r", "s", "HAS_REACTANT")],
        );
        annotate(&mut structure, &schema);

        let reactant = structure.node(structure.find_unique("Reactant").unwrap());
        assert_eq!(reactant.modelisation, Some(true));
        assert_eq!(reactant.labels_arrows.as_deref(), Some("Species"));
        assert_eq!(reactant.relationship.as_ref().unwrap().label, "HAS_REACTANT");
        assert!(reactant.properties.as_ref().unwrap().contains_key("initialAmount"));

        let product = structure.node(structure.find_unique("Product").unwrap());
        assert_eq!(product.modelisation, Some(false));
    }

    #[test]
    fn earlier_bindings_are_kept() {
        let mut structure = l3v2();
        let schema = SchemaGraph::new(
            vec![
                SchemaNode::new("r", &["Reaction"], &["id"]),
                SchemaNode::new("k", &["KineticLaw"], &["math"]),
                SchemaNode::new("x", &["Other"], &["note"]),
            ],
            vec![SchemaRelationship::new("e", "r", "x", "HAS_KINETICLAW")],
        );
        annotate(&mut structure, &schema);
        let law = structure.node(structure.find_unique("KineticLaw").unwrap());
        assert!(law.labels_arrows.is_none());
        assert!(law.properties.as_ref().unwrap().contains_key("math"));
    }
}
