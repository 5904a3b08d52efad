use sbmlgraph_core::export::ReverseMapper;
use sbmlgraph_core::introspect::{Arg, ModelDocument, Value, View};
use sbmlgraph_core::persistence::GraphSnapshot;
use sbmlgraph_core::store::MemoryStore;
use sbmlgraph_core::{Node, Relationship, SbmlDocument, SchemaGraph};
use serde_json::json;

fn node(id: &str, label: &str, properties: serde_json::Value) -> Node {
    let mut node = Node::new(id, vec![label.to_string()]);
    if let serde_json::Value::Object(map) = properties {
        node.properties = map;
    }
    node
}

fn snapshot() -> GraphSnapshot {
    GraphSnapshot::new(
        vec![
            node("c", "Compartment", json!({"name": "cytosol", "size": 1.5})),
            node("S1", "Species", json!({"name": "glucose", "initialAmount": 10.0})),
            node("S2", "Species", json!({"name": "S2", "initialAmount": 0.0})),
            node("R1", "Reaction", json!({"name": "R1"})),
        ],
        vec![
            Relationship::new("Species", "Compartment", "S1", "c", "HAS_COMPARTMENT"),
            Relationship::new("Species", "Compartment", "S2", "c", "HAS_COMPARTMENT"),
            Relationship::new("Reaction", "Species", "R1", "S1", "HAS_REACTANT"),
            Relationship::new("Reaction", "Species", "R1", "S2", "HAS_PRODUCT"),
        ],
    )
}

const SCHEMA: &str = r#"{"nodes": [
      {"id": "c", "labels": ["Compartment"], "properties": {"id": "", "size": ""}},
      {"id": "s", "labels": ["Species"], "properties": {"id": "", "initialAmount": ""}},
      {"id": "r", "labels": ["Reaction"], "properties": {"id": ""}}
   ],
   "relationships": [
      {"id": "e0", "fromId": "s", "toId": "c", "type": "HAS_COMPARTMENT"},
      {"id": "e1", "fromId": "r", "toId": "s", "type": "HAS_REACTANT"},
      {"id": "e2", "fromId": "r", "toId": "s", "type": "HAS_PRODUCT"}
   ]}"#;

fn get<D: ModelDocument>(doc: &D, element: D::Element, accessor: &str) -> Value<D::Element> {
    doc.invoke(View::core(element), accessor, &Arg::None).unwrap()
}

fn find<D: ModelDocument>(doc: &D, kind: &str, id: &str) -> D::Element {
    doc.all_elements()
        .into_iter()
        .find(|e| doc.kind_name(*e) == kind && doc.native_id(*e) == id)
        .unwrap()
}

#[tokio::test]
async fn model_is_rebuilt_from_a_snapshot() {
    let store = MemoryStore::from_snapshot(&snapshot());
    assert_eq!(store.node_count(), 4);
    assert_eq!(store.relationship_count(), 4);

    let schema = SchemaGraph::from_json_str(SCHEMA, false).unwrap();
    let mut mapper = ReverseMapper::from_specifications(3, 2, &store).unwrap();
    mapper.annotate(&schema);
    mapper.conciliate_labels().await.unwrap();
    let created = mapper.extract_entities().await.unwrap();
    // compartment, two species, reaction, one reactant, one product
    assert_eq!(created, 6);

    let doc = mapper.document();
    let c = find(doc, "compartment", "c");
    assert_eq!(get(doc, c, "getSize"), Value::Float(1.5));

    let s1 = find(doc, "species", "S1");
    assert_eq!(get(doc, s1, "getCompartment"), Value::Str("c".into()));
    assert_eq!(get(doc, s1, "getInitialAmount"), Value::Float(10.0));

    let r1 = find(doc, "reaction", "R1");
    let view = View::core(r1);
    let Value::Element(reactant) = doc.invoke(view, "getReactant", &Arg::Int(0)).unwrap() else {
        panic!("R1 has no reactant");
    };
    assert_eq!(get(doc, reactant, "getSpecies"), Value::Str("S1".into()));
    let Value::Element(product) = doc.invoke(view, "getProduct", &Arg::Int(0)).unwrap() else {
        panic!("R1 has no product");
    };
    assert_eq!(get(doc, product, "getSpecies"), Value::Str("S2".into()));
    assert_eq!(doc.invoke(view, "getReactant", &Arg::Int(1)).unwrap(), Value::Null);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rebuilt.xml");
    mapper.write(&path).unwrap();

    let reparsed = SbmlDocument::from_file(&path).unwrap();
    assert_eq!(reparsed.level(), 3);
    assert_eq!(reparsed.version(), 2);
    let s2 = reparsed.element_by_sid("S2").unwrap();
    assert_eq!(get(&reparsed, s2, "getCompartment"), Value::Str("c".into()));
}

#[tokio::test]
async fn kind_without_extracted_parent_is_skipped() {
    let law = node("k0", "KineticLaw", json!({"math": "k1 * S1"}));
    let store = MemoryStore::from_snapshot(&GraphSnapshot::new(vec![law], Vec::new()));

    let schema = SchemaGraph::from_json_str(
        r#"{"nodes": [{"id": "k", "labels": ["KineticLaw"], "properties": {"math": ""}}],
            "relationships": []}"#,
        false,
    )
    .unwrap();
    let mut mapper = ReverseMapper::from_specifications(3, 2, &store).unwrap();
    mapper.annotate(&schema);
    mapper.conciliate_labels().await.unwrap();

    assert_eq!(mapper.extract_entities().await.unwrap(), 0);
    let doc = mapper.document();
    assert!(doc
        .all_elements()
        .into_iter()
        .all(|e| doc.kind_name(e) != "kineticLaw"));
}

#[tokio::test]
async fn shared_node_feeds_every_reaction_that_points_at_it() {
    let store = MemoryStore::from_snapshot(&GraphSnapshot::new(
        vec![
            node("R1", "Reaction", json!({"name": "R1"})),
            node("R2", "Reaction", json!({"name": "R2"})),
            node("mm", "RateLaw", json!({"math": "k1 * S1"})),
            node("k1", "LocalParameter", json!({"value": 0.5})),
        ],
        vec![
            Relationship::new("Reaction", "RateLaw", "R1", "mm", "HAS_KINETICLAW"),
            Relationship::new("Reaction", "RateLaw", "R2", "mm", "HAS_KINETICLAW"),
            Relationship::new("RateLaw", "LocalParameter", "mm", "k1", "HAS_LOCALPARAMETER"),
        ],
    ));
    let schema = SchemaGraph::from_json_str(
        r#"{"nodes": [
              {"id": "r", "labels": ["Reaction"], "properties": {"id": ""}},
              {"id": "law", "labels": ["RateLaw"], "properties": {"math": ""}},
              {"id": "lp", "labels": ["LocalParameter"], "properties": {"id": "", "value": ""}}
           ],
           "relationships": [
              {"id": "e0", "fromId": "r", "toId": "law", "type": "HAS_KINETICLAW"},
              {"id": "e1", "fromId": "law", "toId": "lp", "type": "HAS_LOCALPARAMETER"}
           ]}"#,
        false,
    )
    .unwrap();

    let mut mapper = ReverseMapper::from_specifications(3, 2, &store).unwrap();
    mapper.annotate(&schema);
    mapper.conciliate_labels().await.unwrap();
    // two reactions, one kinetic law and one local parameter under each
    assert_eq!(mapper.extract_entities().await.unwrap(), 6);

    let doc = mapper.document();
    for id in ["R1", "R2"] {
        let reaction = find(doc, "reaction", id);
        let Value::Element(law) = get(doc, reaction, "getKineticLaw") else {
            panic!("{id} has no kinetic law");
        };
        let Value::Element(parameter) = doc
            .invoke(View::core(law), "getLocalParameter", &Arg::Int(0))
            .unwrap()
        else {
            panic!("the kinetic law of {id} has no local parameter");
        };
        assert_eq!(doc.native_id(parameter), "k1");
        assert_eq!(get(doc, parameter, "getValue"), Value::Float(0.5));
    }
}
