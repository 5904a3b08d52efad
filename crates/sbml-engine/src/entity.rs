use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered property bag shared by schema declarations and mapped records.
pub type Properties = Map<String, Value>;

/// Property name reserved for distinguishing several imports of the same data.
pub const TAG_PROPERTY: &str = "tag";

/// Common behaviour of everything carrying an identifier and a property bag.
pub trait Entity {
    fn id(&self) -> &str;
    fn properties(&self) -> &Properties;
    fn properties_mut(&mut self) -> &mut Properties;

    fn has_property(&self, label: &str) -> bool {
        self.properties().contains_key(label)
    }

    /// Insert a property. An existing value is only replaced when `overwrite` is set.
    fn add_property(&mut self, label: &str, value: Value, overwrite: bool) {
        if overwrite || !self.has_property(label) {
            self.properties_mut().insert(label.to_string(), value);
        }
    }

    fn remove_property(&mut self, label: &str) -> Option<Value> {
        self.properties_mut().remove(label)
    }

    /// Drop every property whose value is null or the empty string.
    fn clean_properties(&mut self) {
        self.properties_mut().retain(|_, v| !is_empty_value(v));
    }

    fn tag(&self) -> Option<&str> {
        self.properties().get(TAG_PROPERTY).and_then(Value::as_str)
    }
}

pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A concrete model element resolved against a schema node, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Node {
    pub fn new(id: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            id: id.into(),
            labels,
            properties: Properties::new(),
        }
    }

    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

impl Entity for Node {
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

/// A confirmed connection between two mapped nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub id: String,
    pub from_label: String,
    pub to_label: String,
    pub from_id: String,
    pub to_id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn new(
        from_label: &str,
        to_label: &str,
        from_id: &str,
        to_id: &str,
        label: &str,
    ) -> Self {
        Self {
            id: String::new(),
            from_label: from_label.to_string(),
            to_label: to_label.to_string(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            label: label.to_string(),
            properties: Properties::new(),
        }
    }

    /// Invert the `from` and `to` ends.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.from_label, &mut self.to_label);
        std::mem::swap(&mut self.from_id, &mut self.to_id);
    }
}

impl Entity for Relationship {
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
