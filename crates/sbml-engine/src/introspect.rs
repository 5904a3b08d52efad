//! The introspection surface every model element exposes to the mapping engine.
//!
//! Accessors are discovered by name. [`find_method`] keeps the contract of a
//! case-insensitive exact `get<Label>` match first, then a partial `get*<Label>`
//! match, over whatever names a kind registers.

use crate::error::ModelError;
use crate::sbml::math::MathExpr;
use regex::RegexBuilder;
use std::fmt::Debug;
use std::hash::Hash;

/// Optional capability packages an element may be viewed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plugin {
    Fbc,
    Groups,
}

impl Plugin {
    pub const ALL: [Plugin; 2] = [Plugin::Fbc, Plugin::Groups];

    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Fbc => "fbc",
            Plugin::Groups => "groups",
        }
    }
}

/// An element seen either as itself (`plugin == None`) or through one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct View<E> {
    pub element: E,
    pub plugin: Option<Plugin>,
}

impl<E> View<E> {
    pub fn core(element: E) -> Self {
        Self {
            element,
            plugin: None,
        }
    }
}

/// Argument passed to an accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    Str(String),
    Int(i64),
}

/// What an accessor returns, or what a setter takes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<E> {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Math(MathExpr),
    /// Inline XML (notes, annotation, message), already serialised.
    Markup(String),
    Element(E),
    List(Vec<E>),
}

impl<E> Value<E> {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

pub trait ModelDocument {
    type Element: Copy + Eq + Hash + Debug;

    /// The root model element, if the document has one.
    fn model(&self) -> Option<Self::Element>;

    /// Every element of the document, model included, in document order.
    fn all_elements(&self) -> Vec<Self::Element>;

    /// Every element below `element`, in document order.
    fn descendants(&self, element: Self::Element) -> Vec<Self::Element>;

    fn kind_name(&self, element: Self::Element) -> String;

    /// The element's natural identifier, empty when it has none.
    fn native_id(&self, element: Self::Element) -> String;

    /// The literal `id` attribute when the natural identifier lives elsewhere.
    fn id_attribute(&self, element: Self::Element) -> Option<String>;

    /// Compact XML serialisation, used for hashing anonymous elements.
    fn canonical_text(&self, element: Self::Element) -> String;

    /// The element itself followed by one view per active plugin it supports.
    fn views(&self, element: Self::Element) -> Vec<View<Self::Element>>;

    fn accessor_names(&self, view: View<Self::Element>) -> Vec<String>;

    fn invoke(
        &self,
        view: View<Self::Element>,
        accessor: &str,
        arg: &Arg,
    ) -> Result<Value<Self::Element>, ModelError>;

    /// Raw attribute values, without going through accessors.
    fn attributes(&self, element: Self::Element) -> Vec<(String, String)>;

    fn element_by_sid(&self, sid: &str) -> Option<Self::Element>;
}

/// Write access, used when rebuilding a document.
pub trait ModelBuilder: ModelDocument {
    fn creator_names(&self, view: View<Self::Element>) -> Vec<String>;

    fn create_child(
        &mut self,
        view: View<Self::Element>,
        creator: &str,
    ) -> Result<Self::Element, ModelError>;

    fn setter_names(&self, view: View<Self::Element>) -> Vec<String>;

    fn set(
        &mut self,
        view: View<Self::Element>,
        setter: &str,
        value: Value<Self::Element>,
    ) -> Result<(), ModelError>;

    fn serialize(&self) -> Result<String, ModelError>;
}

/// Prefix reserved for child-creating operations.
pub const CREATE_PREFIX: &str = "create";

/// Search accessor `names` for a getter matching `label`, case-insensitively.
///
/// An exact `get<label>` wins when unique. Otherwise, unless `exact` is set,
/// every name containing `get` followed later by `label` is returned.
pub fn find_method(names: &[String], label: &str, exact: bool) -> Vec<String> {
    find_prefixed(names, "get", label, exact)
}

/// Same contract as [`find_method`] for setters.
pub fn find_setter(names: &[String], label: &str, exact: bool) -> Vec<String> {
    find_prefixed(names, "set", label, exact)
}

fn find_prefixed(names: &[String], prefix: &str, label: &str, exact: bool) -> Vec<String> {
    let escaped = regex::escape(label);
    let Ok(full) = RegexBuilder::new(&format!("^{prefix}{escaped}$"))
        .case_insensitive(true)
        .build()
    else {
        return Vec::new();
    };
    let candidates: Vec<String> = names.iter().filter(|n| full.is_match(n)).cloned().collect();
    if candidates.len() == 1 {
        return candidates;
    }
    if exact {
        return Vec::new();
    }
    let Ok(partial) = RegexBuilder::new(&format!("{prefix}.*{escaped}"))
        .case_insensitive(true)
        .build()
    else {
        return Vec::new();
    };
    names.iter().filter(|n| partial.is_match(n)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_wins() {
        let n = names(&["getId", "getIdAttribute", "getName", "getElementName"]);
        assert_eq!(find_method(&n, "id", false), vec!["getId"]);
        assert_eq!(find_method(&n, "NAME", false), vec!["getName"]);
    }

    #[test]
    fn partial_match_may_be_ambiguous() {
        let n = names(&["getInitialAmount", "getInitialConcentration", "getCompartment"]);
        assert_eq!(find_method(&n, "initial", false).len(), 2);
        assert_eq!(find_method(&n, "amount", false), vec!["getInitialAmount"]);
        assert!(find_method(&n, "amount", true).is_empty());
        assert!(find_method(&n, "charge", false).is_empty());
    }

    #[test]
    fn labels_are_escaped() {
        let n = names(&["getListOfSpecies"]);
        assert!(find_method(&n, "List.f", false).is_empty());
        assert_eq!(find_method(&n, "listofspecies", false), vec!["getListOfSpecies"]);
    }

    #[test]
    fn setters_use_the_same_rules() {
        let n = names(&["setId", "setIdAttribute", "setCompartment"]);
        assert_eq!(find_setter(&n, "id", true), vec!["setId"]);
        assert_eq!(find_setter(&n, "Compartment", true), vec!["setCompartment"]);
        assert!(find_setter(&n, "species", false).is_empty());
    }
}
