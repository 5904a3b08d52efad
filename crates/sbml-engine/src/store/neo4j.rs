use super::{GraphStore, Neighbor, Statistics, StoredNode, StoredRelationship};
use crate::config::ConnectionConfig;
use crate::entity::{Entity, Node, Properties, Relationship};
use crate::error::StoreError;
use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, ConfigBuilder, Graph, Query, Row};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const MERGE_NODES: &str = "UNWIND $rows AS row \
     MERGE (n:$($labels) {id: row.id}) \
     SET n += row.properties";

const MERGE_TAGGED_NODES: &str = "UNWIND $rows AS row \
     MERGE (n:$($labels) {id: row.id, tag: row.tag}) \
     SET n += row.properties";

const MERGE_RELATIONSHIPS: &str = "UNWIND $rows AS row \
     MATCH (a:$($from) {id: row.from_id}) \
     MATCH (b:$($to) {id: row.to_id}) \
     MERGE (a)-[r:$($type)]->(b) \
     ON CREATE SET r += row.properties";

const MERGE_TAGGED_RELATIONSHIPS: &str = "UNWIND $rows AS row \
     MATCH (a:$($from) {id: row.from_id, tag: row.tag}) \
     MATCH (b:$($to) {id: row.to_id, tag: row.tag}) \
     MERGE (a)-[r:$($type)]->(b) \
     ON CREATE SET r += row.properties";

const NODES_BY_LABEL: &str = "MATCH (n:$($label)) \
     RETURN elementId(n) AS element_id, labels(n) AS labels, properties(n) AS properties";

const NEIGHBORS: &str = "MATCH (n)-[r]-(m) WHERE elementId(n) = $id \
     RETURN type(r) AS type, properties(r) AS relationship, \
     elementId(m) AS element_id, labels(m) AS labels, properties(m) AS properties";

/// Neo4j over Bolt. One instance holds the process' connection pool.
pub struct Neo4jStore {
    graph: Graph,
    batch_size: usize,
}

impl Neo4jStore {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, StoreError> {
        let neo_config = ConfigBuilder::default()
            .uri(config.uri())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .build()
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;
        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;
        info!("Connected to {}", config.uri());
        Ok(Self {
            graph,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn rows(&self, q: Query) -> Result<Vec<Row>, StoreError> {
        let mut result = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Send `rows` in sequential batches; the first failure aborts.
    async fn run_batches(
        &self,
        cypher: &str,
        bind: impl Fn(Query) -> Query,
        rows: Vec<BoltType>,
    ) -> Result<(), StoreError> {
        for (ix, batch) in rows.chunks(self.batch_size).enumerate() {
            let q = bind(query(cypher)).param("rows", batch.to_vec());
            self.graph.run(q).await?;
            debug!("Batch {} of {} rows written", ix + 1, batch.len());
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn is_connected(&self) -> bool {
        match self.graph.execute(query("RETURN 1 AS ok")).await {
            Ok(mut result) => result.next().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn create_nodes(&self, nodes: &[Node]) -> Result<usize, StoreError> {
        let mut groups: BTreeMap<(Vec<String>, bool), Vec<BoltType>> = BTreeMap::new();
        for node in nodes {
            let tag = node.tag().map(str::to_string);
            let row = HashMap::from([
                ("id".to_string(), BoltType::from(node.id.clone())),
                ("tag".to_string(), tag.clone().map_or(BoltType::Null(BoltNull), BoltType::from)),
                ("properties".to_string(), properties_to_bolt(&node.properties)),
            ]);
            groups
                .entry((node.labels.clone(), tag.is_some()))
                .or_default()
                .push(row.into());
        }
        for ((labels, tagged), rows) in groups {
            let cypher = if tagged { MERGE_TAGGED_NODES } else { MERGE_NODES };
            info!("Merging {} nodes labelled {}", rows.len(), labels.join(":"));
            self.run_batches(cypher, |q| q.param("labels", labels.clone()), rows)
                .await?;
        }
        Ok(nodes.len())
    }

    async fn create_relationships(&self, relationships: &[Relationship]) -> Result<usize, StoreError> {
        let mut groups: BTreeMap<(String, String, String, bool), Vec<BoltType>> = BTreeMap::new();
        for rel in relationships {
            let tag = rel.tag().map(str::to_string);
            let row = HashMap::from([
                ("from_id".to_string(), BoltType::from(rel.from_id.clone())),
                ("to_id".to_string(), BoltType::from(rel.to_id.clone())),
                ("tag".to_string(), tag.clone().map_or(BoltType::Null(BoltNull), BoltType::from)),
                ("properties".to_string(), properties_to_bolt(&rel.properties)),
            ]);
            groups
                .entry((rel.from_label.clone(), rel.to_label.clone(), rel.label.clone(), tag.is_some()))
                .or_default()
                .push(row.into());
        }
        for ((from, to, label, tagged), rows) in groups {
            let cypher = if tagged {
                MERGE_TAGGED_RELATIONSHIPS
            } else {
                MERGE_RELATIONSHIPS
            };
            info!("Merging {} relationships {} -[{}]-> {}", rows.len(), from, label, to);
            let bind = |q: Query| {
                q.param("from", from.clone())
                    .param("to", to.clone())
                    .param("type", label.clone())
            };
            self.run_batches(cypher, bind, rows).await?;
        }
        Ok(relationships.len())
    }

    async fn query_labels(&self) -> Result<Vec<String>, StoreError> {
        let rows = self
            .rows(query("CALL db.labels() YIELD label RETURN label"))
            .await?;
        rows.iter()
            .map(|row| row.get::<String>("label").map_err(StoreError::from))
            .collect()
    }

    async fn query_nodes(&self, label: &str) -> Result<Vec<StoredNode>, StoreError> {
        let rows = self.rows(query(NODES_BY_LABEL).param("label", label)).await?;
        rows.iter().map(stored_node).collect()
    }

    async fn query_neighbors(&self, element_id: &str) -> Result<Vec<Neighbor>, StoreError> {
        let rows = self.rows(query(NEIGHBORS).param("id", element_id)).await?;
        rows.iter()
            .map(|row| -> Result<Neighbor, StoreError> {
                Ok(Neighbor {
                    node: stored_node(row)?,
                    relationship: StoredRelationship {
                        label: row.get("type")?,
                        properties: object(row.get("relationship")?),
                    },
                })
            })
            .collect()
    }

    async fn query(&self, cypher: &str, params: Properties) -> Result<Vec<Properties>, StoreError> {
        let mut q = query(cypher);
        for (key, value) in &params {
            q = q.param(key, to_bolt(value));
        }
        let rows = self.rows(q).await?;
        rows.iter()
            .map(|row| row.to::<Properties>().map_err(StoreError::from))
            .collect()
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let mut stats = Statistics::default();
        let nodes = self
            .rows(query(
                "MATCH (n) UNWIND labels(n) AS label RETURN label, count(*) AS count",
            ))
            .await?;
        for row in nodes {
            stats.nodes.insert(row.get("label")?, row.get("count")?);
        }
        let relationships = self
            .rows(query(
                "MATCH ()-[r]->() RETURN type(r) AS type, count(r) AS count",
            ))
            .await?;
        for row in relationships {
            stats.relationships.insert(row.get("type")?, row.get("count")?);
        }
        Ok(stats)
    }

    async fn clean(&self) -> Result<(), StoreError> {
        self.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
        info!("Database cleaned");
        Ok(())
    }
}

fn stored_node(row: &Row) -> Result<StoredNode, StoreError> {
    Ok(StoredNode {
        element_id: row.get("element_id")?,
        labels: row.get("labels")?,
        properties: object(row.get("properties")?),
    })
}

fn object(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

fn properties_to_bolt(properties: &Properties) -> BoltType {
    let map: HashMap<String, BoltType> = properties
        .iter()
        .map(|(key, value)| (key.clone(), to_bolt(value)))
        .collect();
    map.into()
}

/// JSON to Bolt. Integers stay integers, other numbers become floats.
pub fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => BoltType::from(s.clone()),
        Value::Array(items) => items.iter().map(to_bolt).collect::<Vec<_>>().into(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), to_bolt(value)))
            .collect::<HashMap<String, BoltType>>()
            .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_and_floats_keep_their_type() {
        assert_eq!(to_bolt(&json!(3)), BoltType::from(3_i64));
        assert_eq!(to_bolt(&json!(0.5)), BoltType::from(0.5_f64));
        assert_eq!(to_bolt(&json!(null)), BoltType::Null(BoltNull));
        assert_eq!(to_bolt(&json!("c")), BoltType::from("c".to_string()));
    }

    #[test]
    fn non_object_properties_read_as_empty() {
        assert!(object(json!([1, 2])).is_empty());
        assert_eq!(object(json!({"id": "c"}))["id"], json!("c"));
    }

    #[test]
    fn label_lookup_matches_on_the_label() {
        assert!(NODES_BY_LABEL.starts_with("MATCH (n:$($label))"));
        assert!(!NODES_BY_LABEL.contains("IN labels(n)"));
    }
}
