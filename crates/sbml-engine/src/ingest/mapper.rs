//! Forward mapping: model elements to graph nodes and relationships.

use crate::entity::{is_empty_value, Entity, Node, Properties, Relationship, TAG_PROPERTY};
use crate::error::ModelError;
use crate::introspect::{find_method, Arg, ModelDocument, Value, View};
use crate::sbml::xml::local_name;
use crate::schema::{SchemaNode, SchemaRelationship};
use md5::{Digest, Md5};
use serde_json::{json, Number};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Attributes that never point at another element.
const SELF_ATTRIBUTES: [&str; 4] = ["id", "metaid", "name", "sboTerm"];

/// One schema relationship with both ends resolved to concrete ids.
#[derive(Debug, Clone, Copy)]
pub struct Candidates<'q> {
    pub label: &'q str,
    pub from_label: &'q str,
    pub to_label: &'q str,
    pub from_ids: &'q [String],
    pub to_ids: &'q [String],
}

impl<'q> Candidates<'q> {
    fn reversed(&self) -> Self {
        Self {
            label: self.label,
            from_label: self.to_label,
            to_label: self.from_label,
            from_ids: self.to_ids,
            to_ids: self.from_ids,
        }
    }

    fn record(&self, from_id: &str, to_id: &str) -> Relationship {
        Relationship::new(self.from_label, self.to_label, from_id, to_id, self.label)
    }
}

pub struct Mapper<'d, D: ModelDocument> {
    document: &'d D,
    tag: Option<String>,
    node_map_label: HashMap<String, String>,
    node_map_item: HashMap<String, Vec<String>>,
    elements: HashMap<String, D::Element>,
    element_alls: HashMap<String, D::Element>,
}

impl<'d, D: ModelDocument> Mapper<'d, D> {
    pub fn new(document: &'d D, tag: Option<String>) -> Result<Self, ModelError> {
        if document.model().is_none() {
            return Err(ModelError::Structural("No model found".into()));
        }
        Ok(Self {
            document,
            tag,
            node_map_label: HashMap::new(),
            node_map_item: HashMap::new(),
            elements: HashMap::new(),
            element_alls: HashMap::new(),
        })
    }

    /// Schema node id to primary label.
    pub fn node_map_label(&self) -> &HashMap<String, String> {
        &self.node_map_label
    }

    /// Schema node id to the ids of the elements it resolved to.
    pub fn node_map_item(&self) -> &HashMap<String, Vec<String>> {
        &self.node_map_item
    }

    pub fn format_nodes(&mut self, nodes: &[SchemaNode]) -> Vec<Node> {
        let all = self.document.all_elements();
        let mut res = Vec::new();

        for schema_node in nodes {
            let Some(label) = schema_node.primary_label() else {
                warn!("None label is found for a node: {}", schema_node.id);
                continue;
            };
            self.node_map_label
                .insert(schema_node.id.clone(), label.to_string());

            for &element in &all {
                if !self.document.kind_name(element).eq_ignore_ascii_case(label) {
                    continue;
                }
                let mut data = self.extract_properties(element, label, schema_node);
                if let Some(tag) = &self.tag {
                    data.insert(TAG_PROPERTY.to_string(), json!(tag));
                }
                let id = self.create_id(element);
                data.remove("id");
                if data.get("name").map_or(true, is_empty_value) {
                    data.insert("name".to_string(), json!(id));
                }
                self.node_map_item
                    .entry(schema_node.id.clone())
                    .or_default()
                    .push(id.clone());
                self.elements.insert(id.clone(), element);

                let mut node = Node::new(id, schema_node.labels.clone());
                node.properties = data;
                node.clean_properties();
                res.push(node);
            }
        }

        for element in all {
            self.element_alls.insert(self.create_id(element), element);
        }
        for record in &res {
            debug!("{:?}", record);
        }
        res
    }

    fn extract_properties(&self, element: D::Element, label: &str, schema_node: &SchemaNode) -> Properties {
        let views = self.document.views(element);
        let mut data = Properties::new();
        for prop in schema_node.properties.keys() {
            let mut found = false;
            let mut ambiguous = false;
            for view in &views {
                let names = self.document.accessor_names(*view);
                let methods = find_method(&names, prop, false);
                if methods.is_empty() {
                    continue;
                }
                if methods.len() > 1 {
                    let mut msg = format!(
                        "Several methods found for label: {} with the property: {}, {}",
                        label,
                        prop,
                        methods.join(" ")
                    );
                    if let Some(plugin) = view.plugin {
                        msg.push_str(&format!(", corresponding to the plugin: {}", plugin.name()));
                    }
                    warn!("{}", msg);
                    ambiguous = true;
                    continue;
                }
                let value = match self.document.invoke(*view, &methods[0], &Arg::None) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Property {} of {} is unreadable: {}", prop, label, e);
                        continue;
                    }
                };
                let key = if prop.eq_ignore_ascii_case("id") { "id" } else { prop.as_str() };
                data.insert(key.to_string(), self.to_json(value));
                found = true;
                break;
            }
            if !found && !ambiguous {
                warn!("No method found for label: {} with the property: {}", label, prop);
            }
        }
        data
    }

    fn to_json(&self, value: Value<D::Element>) -> serde_json::Value {
        match value {
            Value::Null | Value::List(_) => serde_json::Value::Null,
            Value::Str(s) | Value::Markup(s) => serde_json::Value::String(s),
            Value::Int(i) => json!(i),
            Value::Float(f) => match Number::from_f64(f) {
                Some(n) => serde_json::Value::Number(n),
                None if f.is_nan() => json!("NaN"),
                None if f > 0.0 => json!("INF"),
                None => json!("-INF"),
            },
            Value::Bool(b) => json!(b),
            Value::Math(expr) => json!(expr.to_formula()),
            Value::Element(e) => json!(self.create_id(e)),
        }
    }

    /// Stable identifier: the natural id, suffixed with the literal `id`
    /// attribute when that differs, else the MD5 of the element's XML.
    pub fn create_id(&self, element: D::Element) -> String {
        let native = self.document.native_id(element);
        let ident = match self.document.id_attribute(element) {
            Some(attr) if attr != native => format!("{native}-{attr}"),
            _ => native,
        };
        if !ident.is_empty() {
            return ident;
        }
        let text = self.document.canonical_text(element);
        hex::encode(Md5::digest(text.as_bytes()))
    }

    pub fn validate_id(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        self.elements.contains_key(value)
            || self.document.element_by_sid(value).is_some()
            || self.element_alls.contains_key(value)
    }

    pub fn get_element_by_id(&self, value: &str) -> Option<D::Element> {
        self.document
            .element_by_sid(value)
            .or_else(|| self.elements.get(value).copied())
            .or_else(|| self.element_alls.get(value).copied())
    }

    pub fn format_relationships(&self, relationships: &[SchemaRelationship]) -> Vec<Relationship> {
        let mut res = Vec::new();
        for schema_rel in relationships {
            let from_label = self
                .node_map_label
                .get(&schema_rel.from_id)
                .map(String::as_str)
                .unwrap_or(&schema_rel.from_id);
            let to_label = self
                .node_map_label
                .get(&schema_rel.to_id)
                .map(String::as_str)
                .unwrap_or(&schema_rel.to_id);

            let (Some(from_ids), Some(to_ids)) = (
                self.node_map_item.get(&schema_rel.from_id),
                self.node_map_item.get(&schema_rel.to_id),
            ) else {
                warn!("No relationship between: {} - {}", from_label, to_label);
                continue;
            };

            let candidates = Candidates {
                label: &schema_rel.label,
                from_label,
                to_label,
                from_ids,
                to_ids,
            };
            let found = self.resolve(&candidates);
            if found.is_empty() {
                warn!(
                    "No method was found for entities: {} and {}, belongs to the relationships: {}",
                    from_label, to_label, schema_rel.label
                );
            }
            res.extend(found);
        }

        if let Some(tag) = &self.tag {
            for record in &mut res {
                record.add_property(TAG_PROPERTY, json!(tag), true);
            }
        }
        for record in &res {
            debug!("{:?}", record);
        }
        res
    }

    /// First strategy producing at least one record wins.
    fn resolve(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        let found = self.find_by_label(c);
        if !found.is_empty() {
            info!("Map entities by their label: {} - {}", c.from_label, c.to_label);
            return found;
        }
        let found = self.find_by_relationships(c);
        if !found.is_empty() {
            info!("Map entities by the relationship's name: {} - {}", c.from_label, c.to_label);
            return found;
        }
        let found = self.find_by_relationships_listof(c);
        if !found.is_empty() {
            info!(
                "Map entities by the relationship's name (listOf): {} - {}",
                c.from_label, c.to_label
            );
            return found;
        }
        let found = self.find_by_all_elements(c);
        if !found.is_empty() {
            info!("Map entities by their id: {} - {}", c.from_label, c.to_label);
        }
        found
    }

    /// Run a one-way search, retrying with the roles swapped when it finds nothing.
    fn both_ways(
        &self,
        c: &Candidates<'_>,
        search: impl Fn(&Self, &Candidates<'_>) -> Vec<Relationship>,
    ) -> Vec<Relationship> {
        let res = search(self, c);
        if !res.is_empty() {
            return res;
        }
        let mut inverted = search(self, &c.reversed());
        for record in &mut inverted {
            record.swap();
        }
        inverted
    }

    fn core_names(&self, element: D::Element) -> Vec<String> {
        self.document.accessor_names(View::core(element))
    }

    /// Strategy 1: one accessor named after the opposite label, applied pairwise.
    pub fn find_by_label(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        let mut res = Vec::new();
        let mut is_forward = true;

        let mut methods: BTreeSet<String> = BTreeSet::new();
        for from_id in c.from_ids {
            if let Some(element) = self.get_element_by_id(from_id) {
                methods.extend(find_method(&self.core_names(element), c.to_label, false));
            }
        }
        if methods.is_empty() {
            for to_id in c.to_ids {
                if let Some(element) = self.get_element_by_id(to_id) {
                    methods.extend(find_method(&self.core_names(element), c.from_label, false));
                }
            }
            if methods.len() == 1 {
                is_forward = false;
            }
        }
        if methods.len() != 1 {
            return res;
        }
        let Some(method) = methods.into_iter().next() else {
            return res;
        };

        let (from_ids, to_ids) = if is_forward {
            (c.from_ids, c.to_ids)
        } else {
            (c.to_ids, c.from_ids)
        };
        for from_id in from_ids {
            let Some(from_el) = self.get_element_by_id(from_id) else {
                continue;
            };
            for to_id in to_ids {
                if self.get_element_by_id(to_id).is_none() {
                    continue;
                }
                let Some(target) = self.probe(from_el, &method, to_id) else {
                    continue;
                };
                if &target == to_id {
                    res.push(if is_forward {
                        c.record(from_id, to_id)
                    } else {
                        c.record(to_id, from_id)
                    });
                }
            }
        }
        res
    }

    /// Call `method` without argument, then with `to_id` as text, then as a
    /// number, stopping at the first call that succeeds.
    fn probe(&self, element: D::Element, method: &str, to_id: &str) -> Option<String> {
        let view = View::core(element);
        if let Ok(value) = self.document.invoke(view, method, &Arg::None) {
            return Some(match value {
                Value::Str(s) => s,
                Value::Element(e) => self.create_id(e),
                _ => String::new(),
            });
        }
        if let Ok(Value::Element(e)) = self.document.invoke(view, method, &Arg::Str(to_id.to_string())) {
            return Some(self.create_id(e));
        }
        let index = to_id.parse::<i64>().ok()?;
        match self.document.invoke(view, method, &Arg::Int(index)) {
            Ok(Value::Element(e)) => Some(self.create_id(e)),
            _ => None,
        }
    }

    /// Strategy 2: accessors named after the relationship type or its words.
    pub fn find_by_relationships(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        self.both_ways(c, Self::find_by_relationships_once)
    }

    fn find_by_relationships_once(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        let mut res = Vec::new();
        let labels: Vec<&str> = std::iter::once(c.label)
            .chain(c.label.split('_'))
            .filter(|l| !l.is_empty())
            .collect();

        for from_id in c.from_ids {
            let Some(element) = self.get_element_by_id(from_id) else {
                continue;
            };
            let mut to_id = String::new();
            'views: for view in self.document.views(element) {
                let names = self.document.accessor_names(view);
                for label in &labels {
                    let methods = find_method(&names, label, false);
                    if let Some(method) = methods.first() {
                        to_id = match self.document.invoke(view, method, &Arg::None) {
                            Ok(Value::Str(s)) => s,
                            _ => String::new(),
                        };
                    }
                    if !to_id.is_empty() {
                        break 'views;
                    }
                }
            }
            if self.validate_id(&to_id) {
                res.push(c.record(from_id, &to_id));
            }
        }
        res
    }

    /// Strategy 3: `getListOf*` accessors named after the relationship, looking
    /// through reference elements to the element they point at.
    pub fn find_by_relationships_listof(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        self.both_ways(c, Self::find_by_relationships_listof_once)
    }

    fn find_by_relationships_listof_once(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        let mut res = Vec::new();
        let labels: Vec<String> = std::iter::once(c.label)
            .chain(c.label.split('_'))
            .filter(|l| !l.is_empty())
            .map(|l| format!("listof{l}"))
            .collect();
        let to_reference = c.to_label.to_lowercase().ends_with("reference");

        for from_id in c.from_ids {
            let Some(element) = self.get_element_by_id(from_id) else {
                continue;
            };
            let names = self.core_names(element);
            let Some(method) = labels
                .iter()
                .map(|label| find_method(&names, label, false))
                .find(|methods| !methods.is_empty())
                .and_then(|methods| methods.into_iter().next())
            else {
                continue;
            };
            let Ok(Value::List(items)) = self.document.invoke(View::core(element), &method, &Arg::None)
            else {
                continue;
            };

            for item in items {
                let item_id = self.create_id(item);
                if self.document.kind_name(item).ends_with("Reference") && !to_reference {
                    let target = self
                        .document
                        .attributes(item)
                        .into_iter()
                        .filter(|(key, _)| !SELF_ATTRIBUTES.contains(&local_name(key)))
                        .map(|(_, value)| value)
                        .find(|value| self.validate_id(value));
                    if let Some(to_id) = target {
                        res.push(c.record(from_id, &to_id));
                    }
                } else if self.validate_id(&item_id) {
                    res.push(c.record(from_id, &item_id));
                }
            }
        }
        res
    }

    /// Strategy 4: every descendant of the from element, by exact accessor or
    /// by kind name.
    pub fn find_by_all_elements(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        self.both_ways(c, Self::find_by_all_elements_once)
    }

    fn find_by_all_elements_once(&self, c: &Candidates<'_>) -> Vec<Relationship> {
        let mut res = Vec::new();
        for from_id in c.from_ids {
            let Some(from_el) = self.get_element_by_id(from_id) else {
                continue;
            };
            for element in self.document.descendants(from_el) {
                let view = View::core(element);
                let methods = find_method(&self.document.accessor_names(view), c.to_label, true);
                let mut to_id = match methods.as_slice() {
                    [method] => match self.document.invoke(view, method, &Arg::None) {
                        Ok(Value::Null) | Err(_) => None,
                        Ok(Value::Str(s)) => Some(s),
                        Ok(Value::Bool(false)) | Ok(Value::Int(0)) => Some(String::new()),
                        Ok(Value::Float(f)) if f == 0.0 => Some(String::new()),
                        Ok(Value::List(items)) if items.is_empty() => Some(String::new()),
                        Ok(_) => Some(self.create_id(element)),
                    },
                    _ => None,
                };
                if to_id.is_none() && self.document.kind_name(element).eq_ignore_ascii_case(c.to_label) {
                    to_id = Some(self.create_id(element));
                }
                if let Some(to_id) = to_id.filter(|id| !id.is_empty()) {
                    res.push(c.record(from_id, &to_id));
                }
            }
        }
        res
    }
}
