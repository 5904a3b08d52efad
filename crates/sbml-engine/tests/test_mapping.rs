use sbmlgraph_core::entity::is_empty_value;
use sbmlgraph_core::ingest::{map_document, IngestionEngine};
use sbmlgraph_core::reconcile::annotate;
use sbmlgraph_core::store::{GraphStore, MemoryStore};
use sbmlgraph_core::{SbmlDocument, SchemaGraph, StructureGraph};
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

const MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sbml xmlns="http://www.sbml.org/sbml/level3/version2/core" level="3" version="2">
  <model id="glycolysis_toy" name="toy">
    <listOfCompartments>
      <compartment id="c" name="cytosol" size="1.5" spatialDimensions="3" constant="true"/>
    </listOfCompartments>
    <listOfSpecies>
      <species id="S1" name="glucose" compartment="c" initialAmount="10" hasOnlySubstanceUnits="false" boundaryCondition="false" constant="false"/>
      <species id="S2" compartment="c" initialAmount="0" hasOnlySubstanceUnits="false" boundaryCondition="false" constant="false"/>
    </listOfSpecies>
    <listOfParameters>
      <parameter id="k_global" value="0.1" constant="true"/>
    </listOfParameters>
    <listOfReactions>
      <reaction id="R1" reversible="false">
        <listOfReactants>
          <speciesReference species="S1" stoichiometry="1" constant="true"/>
        </listOfReactants>
        <listOfProducts>
          <speciesReference species="S2" stoichiometry="1" constant="true"/>
        </listOfProducts>
        <kineticLaw>
          <math xmlns="http://www.w3.org/1998/Math/MathML">
            <apply><times/><ci>k1</ci><ci>S1</ci></apply>
          </math>
          <listOfLocalParameters>
            <localParameter id="k1" value="0.5"/>
          </listOfLocalParameters>
        </kineticLaw>
      </reaction>
    </listOfReactions>
  </model>
</sbml>"#;

/// Records the target of every WARN event.
#[derive(Clone, Default)]
struct WarnTargets(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for WarnTargets {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.lock().unwrap().push(event.metadata().target().to_string());
        }
    }
}

fn schema(json: &str) -> SchemaGraph {
    SchemaGraph::from_json_str(json, true).unwrap()
}

#[test]
fn relationship_found_through_a_label_accessor() {
    let doc = SbmlDocument::parse(MODEL).unwrap();
    let schema = schema(
        r#"{"nodes": [
              {"id": "n0", "labels": ["Species"], "properties": {"name": ""}},
              {"id": "n1", "labels": ["Compartment"], "properties": {"name": "", "size": ""}}
           ],
           "relationships": [
              {"id": "r0", "fromId": "n0", "toId": "n1", "type": "HAS_COMPARTMENT", "properties": {}}
           ]}"#,
    );
    let snapshot = map_document(&doc, &schema, None).unwrap();

    let compartment = snapshot.nodes.iter().find(|n| n.labels == ["Compartment"]).unwrap();
    assert_eq!(compartment.id, "c");
    assert_eq!(compartment.properties["size"], 1.5);

    let rels: Vec<_> = snapshot
        .relationships
        .iter()
        .map(|r| (r.from_label.as_str(), r.from_id.as_str(), r.to_label.as_str(), r.to_id.as_str()))
        .collect();
    assert_eq!(
        rels,
        vec![("Species", "S1", "Compartment", "c"), ("Species", "S2", "Compartment", "c")]
    );
    assert!(snapshot.relationships.iter().all(|r| r.label == "HAS_COMPARTMENT"));
}

#[test]
fn reversed_arrow_keeps_the_drawn_direction() {
    let doc = SbmlDocument::parse(MODEL).unwrap();
    let schema = schema(
        r#"{"graph": {"nodes": [
              {"id": "n0", "labels": ["Compartment"], "properties": {}},
              {"id": "n1", "labels": ["Species"], "properties": {}}
           ],
           "relationships": [
              {"id": "r0", "fromId": "n0", "toId": "n1", "type": "IN_COMPARTMENT", "properties": {}}
           ]}}"#,
    );
    let snapshot = map_document(&doc, &schema, None).unwrap();

    assert_eq!(snapshot.relationships.len(), 2);
    for rel in &snapshot.relationships {
        assert_eq!(rel.from_label, "Compartment");
        assert_eq!(rel.from_id, "c");
        assert_eq!(rel.to_label, "Species");
        assert!(rel.to_id == "S1" || rel.to_id == "S2");
    }
}

#[test]
fn unknown_relationship_yields_nothing_and_the_rest_still_maps() {
    let doc = SbmlDocument::parse(MODEL).unwrap();
    let schema = schema(
        r#"{"nodes": [
              {"id": "s", "labels": ["Species"], "properties": {}},
              {"id": "p", "labels": ["Parameter"], "properties": {"value": ""}},
              {"id": "c", "labels": ["Compartment"], "properties": {}}
           ],
           "relationships": [
              {"id": "r0", "fromId": "s", "toId": "p", "type": "UNRELATED", "properties": {}},
              {"id": "r1", "fromId": "s", "toId": "c", "type": "HAS_COMPARTMENT", "properties": {}}
           ]}"#,
    );
    let warnings = WarnTargets::default();
    let subscriber = tracing_subscriber::registry().with(warnings.clone());
    let snapshot = tracing::subscriber::with_default(subscriber, || map_document(&doc, &schema, None)).unwrap();

    assert_eq!(*warnings.0.lock().unwrap(), vec!["sbmlgraph_core::ingest::mapper"]);
    assert_eq!(snapshot.nodes.len(), 4);
    assert!(snapshot.relationships.iter().all(|r| r.label == "HAS_COMPARTMENT"));
    assert_eq!(snapshot.relationships.len(), 2);
}

#[test]
fn ids_are_stable_across_runs_and_properties_are_clean() {
    let schema = schema(
        r#"{"nodes": [
              {"id": "n0", "labels": ["SpeciesReference"], "properties": {"stoichiometry": "", "sboTerm": ""}},
              {"id": "n1", "labels": ["KineticLaw"], "properties": {"math": "", "notes": ""}}
           ],
           "relationships": []}"#,
    );
    let first = map_document(&SbmlDocument::parse(MODEL).unwrap(), &schema, Some("v1".into())).unwrap();
    let second = map_document(&SbmlDocument::parse(MODEL).unwrap(), &schema, Some("v1".into())).unwrap();

    assert_eq!(first.nodes.len(), 3);
    let ids: Vec<_> = first.nodes.iter().map(|n| n.id.clone()).collect();
    let again: Vec<_> = second.nodes.iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids, again);
    assert!(ids.iter().all(|id| id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit())));
    assert_ne!(ids[0], ids[1]);

    let law = &first.nodes[2];
    assert_eq!(law.properties["math"], "k1 * S1");
    assert_eq!(law.properties["tag"], "v1");
    for node in &first.nodes {
        assert!(!node.properties.contains_key("sboTerm"));
        assert!(!node.properties.contains_key("notes"));
        assert!(node.properties.values().all(|v| !is_empty_value(v)));
    }
}

#[test]
fn duplicate_kinds_bind_by_their_position() {
    let schema = SchemaGraph::from_json_str(
        r#"{"nodes": [
              {"id": "m", "labels": ["Model"], "properties": {"id": ""}},
              {"id": "pl", "labels": ["Parameter"], "properties": {"units": ""}},
              {"id": "pg", "labels": ["Parameter"], "properties": {"value": ""}},
              {"id": "r", "labels": ["Reaction"], "properties": {"id": ""}},
              {"id": "k", "labels": ["KineticLaw"], "properties": {"math": ""}}
           ],
           "relationships": [
              {"id": "e0", "fromId": "m", "toId": "pg", "type": "HAS_PARAMETER"},
              {"id": "e1", "fromId": "m", "toId": "r", "type": "HAS_REACTION"},
              {"id": "e2", "fromId": "r", "toId": "k", "type": "HAS_KINETIC_LAW"},
              {"id": "e3", "fromId": "k", "toId": "pl", "type": "HAS_LOCAL"}
           ]}"#,
        false,
    )
    .unwrap();
    let mut structure = StructureGraph::from_specifications(3, 2).unwrap();
    annotate(&mut structure, &schema);

    let parameters: Vec<_> = structure
        .nodes()
        .filter(|(_, n)| n.label == "Parameter")
        .map(|(_, n)| n.clone())
        .collect();
    assert_eq!(parameters.len(), 2);
    let global = parameters.iter().find(|n| n.level == 1).unwrap();
    let local = parameters.iter().find(|n| n.level == 3).unwrap();
    assert!(global.in_scope() && local.in_scope());
    assert!(global.properties.as_ref().unwrap().contains_key("value"));
    assert!(local.properties.as_ref().unwrap().contains_key("units"));
    assert!(structure.nodes().all(|(_, n)| n.modelisation.is_some()));
}

#[tokio::test]
async fn dry_run_writes_into_memory() {
    let doc = SbmlDocument::parse(MODEL).unwrap();
    let schema = schema(
        r#"{"nodes": [
              {"id": "n0", "labels": ["Species"], "properties": {"name": ""}},
              {"id": "n1", "labels": ["Compartment"], "properties": {"name": ""}},
              {"id": "n2", "labels": ["Reaction"], "properties": {}}
           ],
           "relationships": [
              {"id": "r0", "fromId": "n0", "toId": "n1", "type": "HAS_COMPARTMENT"},
              {"id": "r1", "fromId": "n2", "toId": "n0", "type": "IS_REACTANT"}
           ]}"#,
    );
    let snapshot = map_document(&doc, &schema, None).unwrap();

    let store = Arc::new(MemoryStore::new());
    let engine = IngestionEngine::new(store.clone());
    engine.load(&snapshot).await.unwrap();
    // loading twice merges instead of duplicating
    engine.load(&snapshot).await.unwrap();

    let stats = store.statistics().await.unwrap();
    assert_eq!(stats.nodes["Species"], 2);
    assert_eq!(stats.nodes["Compartment"], 1);
    assert_eq!(stats.nodes["Reaction"], 1);
    assert_eq!(stats.relationships["HAS_COMPARTMENT"], 2);
    assert_eq!(stats.relationships["IS_REACTANT"], 1);
}
