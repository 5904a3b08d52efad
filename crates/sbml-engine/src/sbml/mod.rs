//! SBML Level 2/3 documents held as an arena of typed elements.
//!
//! Reading validates the pieces the mapping engine relies on and aggregates
//! every problem into a single [`ModelError::Invalid`]. Unknown content is kept
//! verbatim so a read/write cycle does not drop it.

pub mod kinds;
pub mod math;
pub mod xml;

use crate::error::ModelError;
use crate::introspect::{Arg, ModelBuilder, ModelDocument, Plugin, Value, View, CREATE_PREFIX};
use kinds::{capitalize, Attr, AttrType, ChildSpec, Kind};
use math::MathExpr;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use xml::{local_name, XmlElement, XmlNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

#[derive(Debug, Clone)]
struct ElementData {
    kind: Kind,
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<ElementId>,
    math: Option<XmlElement>,
    notes: Option<XmlElement>,
    annotation: Option<XmlElement>,
    message: Option<XmlElement>,
    extra: Vec<XmlElement>,
}

#[derive(Debug, Clone)]
struct Package {
    plugin: Plugin,
    prefix: String,
}

#[derive(Debug, Clone, Copy)]
enum Getter {
    Id,
    IdAttribute,
    Name,
    MetaId,
    SboTerm,
    ElementName,
    Notes,
    Annotation,
    Math,
    Message,
    Attr(Attr),
    List(&'static str),
    Item(&'static ChildSpec),
    Single(&'static ChildSpec),
}

#[derive(Debug, Clone, Copy)]
enum Setter {
    Id,
    IdAttribute,
    Name,
    MetaId,
    SboTerm,
    Notes,
    Annotation,
    Math,
    Message,
    Attr(Attr, Option<Plugin>),
}

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

fn core_namespace(level: u32, version: u32) -> String {
    match (level, version) {
        (3, v) => format!("http://www.sbml.org/sbml/level3/version{v}/core"),
        (2, 1) => "http://www.sbml.org/sbml/level2".to_string(),
        (l, v) => format!("http://www.sbml.org/sbml/level{l}/version{v}"),
    }
}

fn package_namespace(plugin: Plugin) -> &'static str {
    match plugin {
        Plugin::Fbc => "http://www.sbml.org/sbml/level3/version1/fbc/version2",
        Plugin::Groups => "http://www.sbml.org/sbml/level3/version1/groups/version1",
    }
}

fn invoke_error(accessor: &str, reason: &str) -> ModelError {
    ModelError::Invoke {
        accessor: accessor.to_string(),
        reason: reason.to_string(),
    }
}

fn typed_value(attr: &Attr, raw: &str) -> Value<ElementId> {
    let trimmed = raw.trim();
    match attr.ty {
        AttrType::Str => Value::Str(raw.to_string()),
        AttrType::Double => trimmed
            .parse()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
        AttrType::Int => trimmed
            .parse()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
        AttrType::Bool => match trimmed {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::Str(raw.to_string()),
        },
    }
}

fn attribute_text(setter: &str, value: &Value<ElementId>) -> Result<Option<String>, ModelError> {
    Ok(Some(match value {
        Value::Null => return Ok(None),
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => "NaN".to_string(),
        Value::Float(f) if f.is_infinite() => {
            if *f > 0.0 { "INF".to_string() } else { "-INF".to_string() }
        }
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Math(_) | Value::Markup(_) | Value::Element(_) | Value::List(_) => {
            return Err(invoke_error(setter, "expects a scalar value"))
        }
    }))
}

fn sbo_term(value: &Value<ElementId>) -> Option<String> {
    match value {
        Value::Int(i) => Some(format!("SBO:{i:07}")),
        Value::Float(f) if f.fract() == 0.0 => Some(format!("SBO:{:07}", *f as i64)),
        Value::Str(s) => match s.trim().parse::<i64>() {
            Ok(i) => Some(format!("SBO:{i:07}")),
            Err(_) => Some(s.clone()),
        },
        _ => None,
    }
}

/// Parse markup handed to `setNotes` and friends, wrapping plain text.
fn markup(wrapper: &str, value: &Value<ElementId>) -> Option<XmlElement> {
    let text = match value {
        Value::Str(s) | Value::Markup(s) => s.trim(),
        _ => return None,
    };
    if text.starts_with('<') {
        if let Ok(parsed) = xml::parse(text) {
            if parsed.local_name() == wrapper {
                return Some(parsed);
            }
            return Some(XmlElement::new(wrapper).with_child(parsed));
        }
    }
    let body = XmlElement::new("body")
        .with_attribute("xmlns", XHTML_NS)
        .with_child(XmlElement::new("p").with_text(text));
    Some(XmlElement::new(wrapper).with_child(body))
}

/// A parsed SBML document.
#[derive(Debug, Clone)]
pub struct SbmlDocument {
    level: u32,
    version: u32,
    root_attributes: Vec<(String, String)>,
    packages: Vec<Package>,
    nodes: Vec<ElementData>,
    model: Option<ElementId>,
    sids: HashMap<String, ElementId>,
}

impl SbmlDocument {
    /// An empty document of the given level and version, without a model.
    pub fn new(level: u32, version: u32) -> Self {
        Self {
            level,
            version,
            root_attributes: vec![
                ("xmlns".to_string(), core_namespace(level, version)),
                ("level".to_string(), level.to_string()),
                ("version".to_string(), version.to_string()),
            ],
            packages: Vec::new(),
            nodes: Vec::new(),
            model: None,
            sids: HashMap::new(),
        }
    }

    /// A document holding a single empty model.
    pub fn from_specifications(level: u32, version: u32) -> Self {
        let mut doc = Self::new(level, version);
        let model = doc.push(Kind::Model, "model".to_string(), Vec::new(), None);
        doc.model = Some(model);
        doc
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ModelError> {
        let root = xml::parse(content)?;
        if root.local_name() != "sbml" {
            return Err(ModelError::Structural(format!(
                "expected an <sbml> root element, found <{}>",
                root.name
            )));
        }

        let mut errors = Vec::new();
        let mut number = |name: &str| match root.attribute(name).map(|v| v.trim().parse::<u32>()) {
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                errors.push(format!("<sbml> attribute '{name}' is not a number"));
                0
            }
            None => {
                errors.push(format!("<sbml> is missing the '{name}' attribute"));
                0
            }
        };
        let level = number("level");
        let version = number("version");

        let mut doc = Self::new(level, version);
        doc.root_attributes = root.attributes.clone();
        for (key, value) in &root.attributes {
            let Some(prefix) = key.strip_prefix("xmlns:") else {
                continue;
            };
            for plugin in Plugin::ALL {
                if value.contains(&format!("/{}/", plugin.name())) {
                    doc.packages.push(Package {
                        plugin,
                        prefix: prefix.to_string(),
                    });
                }
            }
        }

        let model = root
            .elements()
            .find(|e| e.local_name() == "model")
            .ok_or_else(|| ModelError::Structural("No model found".into()))?;
        let model_id = doc.build(model, Kind::Model, &mut errors);
        doc.model = Some(model_id);

        if !errors.is_empty() {
            return Err(ModelError::Invalid { errors });
        }
        debug!(
            "Parsed SBML level {} version {} with {} elements",
            doc.level,
            doc.version,
            doc.nodes.len()
        );
        Ok(doc)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        fs::write(path.as_ref(), self.serialize()?)?;
        Ok(())
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn active_plugins(&self) -> Vec<Plugin> {
        self.packages.iter().map(|p| p.plugin).collect()
    }

    pub fn is_active(&self, plugin: Plugin) -> bool {
        self.packages.iter().any(|p| p.plugin == plugin)
    }

    /// Declare a package on the root element so its views become available.
    pub fn enable_package(&mut self, plugin: Plugin) {
        if self.is_active(plugin) {
            return;
        }
        let prefix = plugin.name().to_string();
        self.root_attributes
            .push((format!("xmlns:{prefix}"), package_namespace(plugin).to_string()));
        self.root_attributes
            .push((format!("{prefix}:required"), "false".to_string()));
        self.packages.push(Package { plugin, prefix });
    }

    fn prefix(&self, plugin: Plugin) -> &str {
        self.packages
            .iter()
            .find(|p| p.plugin == plugin)
            .map(|p| p.prefix.as_str())
            .unwrap_or(plugin.name())
    }

    fn qualified(&self, local: &str, plugin: Option<Plugin>) -> String {
        match plugin {
            Some(p) => format!("{}:{}", self.prefix(p), local),
            None => local.to_string(),
        }
    }

    fn data(&self, el: ElementId) -> &ElementData {
        &self.nodes[el.0]
    }

    fn push(
        &mut self,
        kind: Kind,
        tag: String,
        attributes: Vec<(String, String)>,
        parent: Option<ElementId>,
    ) -> ElementId {
        let id = ElementId(self.nodes.len());
        let sid = attributes
            .iter()
            .find(|(k, _)| local_name(k) == "id")
            .map(|(_, v)| v.clone());
        self.nodes.push(ElementData {
            kind,
            tag,
            attributes,
            children: Vec::new(),
            math: None,
            notes: None,
            annotation: None,
            message: None,
            extra: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        if let Some(sid) = sid.filter(|s| !s.is_empty()) {
            self.sids.entry(sid).or_insert(id);
        }
        id
    }

    /// Child slots of a kind, restricted to the level and the enabled packages.
    fn slots(&self, kind: Kind) -> Vec<(Option<Plugin>, &'static ChildSpec)> {
        kind.spec()
            .all_children()
            .filter(|(plugin, spec)| {
                spec.min_level <= self.level.max(1) && plugin.map_or(true, |p| self.is_active(p))
            })
            .collect()
    }

    fn view_slots(&self, view: View<ElementId>) -> Vec<&'static ChildSpec> {
        let kind = self.data(view.element).kind;
        self.slots(kind)
            .into_iter()
            .filter(|(plugin, _)| *plugin == view.plugin)
            .map(|(_, spec)| spec)
            .collect()
    }

    fn build(&mut self, source: &XmlElement, kind: Kind, errors: &mut Vec<String>) -> ElementId {
        let id = self.push(kind, source.name.clone(), source.attributes.clone(), None);
        self.fill(id, source, errors);
        id
    }

    fn build_under(
        &mut self,
        source: &XmlElement,
        kind: Kind,
        parent: ElementId,
        errors: &mut Vec<String>,
    ) {
        let id = self.push(kind, source.name.clone(), source.attributes.clone(), Some(parent));
        self.fill(id, source, errors);
    }

    fn fill(&mut self, id: ElementId, source: &XmlElement, errors: &mut Vec<String>) {
        let kind = self.data(id).kind;
        let spec = kind.spec();
        if spec.requires_id && self.attr(id, "id").map_or(true, |v| v.trim().is_empty()) {
            errors.push(format!("<{}> is missing its required 'id' attribute", source.name));
        }
        let slots = self.slots(kind);

        for child in source.elements() {
            let local = child.local_name();
            match local {
                "notes" => self.nodes[id.0].notes = Some(child.clone()),
                "annotation" => self.nodes[id.0].annotation = Some(child.clone()),
                "math" if spec.math => self.nodes[id.0].math = Some(child.clone()),
                "message" if spec.message => self.nodes[id.0].message = Some(child.clone()),
                _ => {
                    if slots.iter().any(|(_, s)| s.container == Some(local)) {
                        let list = self.push(
                            Kind::ListOf,
                            child.name.clone(),
                            child.attributes.clone(),
                            Some(id),
                        );
                        for item in child.elements() {
                            let item_name = item.local_name();
                            let slot = slots.iter().find(|(_, s)| {
                                s.container == Some(local) && s.kind.spec().name == item_name
                            });
                            match (item_name, slot) {
                                ("notes", _) => self.nodes[list.0].notes = Some(item.clone()),
                                ("annotation", _) => {
                                    self.nodes[list.0].annotation = Some(item.clone())
                                }
                                (_, Some((_, s))) => self.build_under(item, s.kind, list, errors),
                                (_, None) => self.nodes[list.0].extra.push(item.clone()),
                            }
                        }
                    } else if let Some((_, s)) = slots
                        .iter()
                        .find(|(_, s)| s.container.is_none() && s.kind.spec().name == local)
                    {
                        self.build_under(child, s.kind, id, errors);
                    } else {
                        self.nodes[id.0].extra.push(child.clone());
                    }
                }
            }
        }
    }

    fn attr(&self, el: ElementId, local: &str) -> Option<&str> {
        self.data(el)
            .attributes
            .iter()
            .find(|(k, _)| local_name(k) == local)
            .map(|(_, v)| v.as_str())
    }

    fn set_attr(&mut self, el: ElementId, local: &str, plugin: Option<Plugin>, value: Option<String>) {
        let qualified = self.qualified(local, plugin);
        if local == "id" {
            if let Some(old) = self.attr(el, "id").map(str::to_string) {
                if self.sids.get(&old) == Some(&el) {
                    self.sids.remove(&old);
                }
            }
            if let Some(new) = value.as_ref().filter(|v| !v.is_empty()) {
                self.sids.entry(new.clone()).or_insert(el);
            }
        }
        let attributes = &mut self.nodes[el.0].attributes;
        let position = attributes.iter().position(|(k, _)| local_name(k) == local);
        match (position, value) {
            (Some(ix), Some(v)) => attributes[ix].1 = v,
            (Some(ix), None) => {
                attributes.remove(ix);
            }
            (None, Some(v)) => attributes.push((qualified, v)),
            (None, None) => {}
        }
    }

    /// Plugin owning an element's own attributes, for prefixing on write.
    fn attribute_plugin(&self, el: ElementId) -> Option<Plugin> {
        self.data(el).kind.spec().plugin
    }

    fn items(&self, el: ElementId, container: &str) -> Vec<ElementId> {
        self.data(el)
            .children
            .iter()
            .filter(|c| {
                let data = self.data(**c);
                data.kind == Kind::ListOf && local_name(&data.tag) == container
            })
            .flat_map(|c| self.data(*c).children.iter().copied())
            .collect()
    }

    fn getters(&self, view: View<ElementId>) -> Vec<(String, Getter)> {
        let data = self.data(view.element);
        let spec = data.kind.spec();
        let mut out: Vec<(String, Getter)> = Vec::new();
        if view.plugin.is_none() {
            out.extend([
                ("getId".to_string(), Getter::Id),
                ("getIdAttribute".to_string(), Getter::IdAttribute),
                ("getName".to_string(), Getter::Name),
                ("getMetaId".to_string(), Getter::MetaId),
                ("getSBOTerm".to_string(), Getter::SboTerm),
                ("getElementName".to_string(), Getter::ElementName),
                ("getNotes".to_string(), Getter::Notes),
                ("getAnnotation".to_string(), Getter::Annotation),
            ]);
            if spec.math {
                out.push(("getMath".to_string(), Getter::Math));
            }
            if spec.message {
                out.push(("getMessage".to_string(), Getter::Message));
            }
        }
        for attr in spec.view_attributes(view.plugin) {
            out.push((format!("get{}", capitalize(attr.name)), Getter::Attr(*attr)));
        }
        for slot in self.view_slots(view) {
            match slot.container {
                Some(container) => {
                    out.push((format!("get{}", capitalize(container)), Getter::List(container)));
                    out.push((format!("get{}", slot.getter), Getter::Item(slot)));
                }
                None => out.push((format!("get{}", slot.getter), Getter::Single(slot))),
            }
        }
        let mut seen = std::collections::HashSet::new();
        out.retain(|(name, _)| seen.insert(name.clone()));
        out
    }

    fn setters(&self, view: View<ElementId>) -> Vec<(String, Setter)> {
        let spec = self.data(view.element).kind.spec();
        let mut out: Vec<(String, Setter)> = Vec::new();
        if view.plugin.is_none() {
            out.extend([
                ("setId".to_string(), Setter::Id),
                ("setIdAttribute".to_string(), Setter::IdAttribute),
                ("setName".to_string(), Setter::Name),
                ("setMetaId".to_string(), Setter::MetaId),
                ("setSBOTerm".to_string(), Setter::SboTerm),
                ("setNotes".to_string(), Setter::Notes),
                ("setAnnotation".to_string(), Setter::Annotation),
            ]);
            if spec.math {
                out.push(("setMath".to_string(), Setter::Math));
            }
            if spec.message {
                out.push(("setMessage".to_string(), Setter::Message));
            }
        }
        let attr_plugin = view.plugin.or(spec.plugin);
        for attr in spec.view_attributes(view.plugin) {
            out.push((format!("set{}", capitalize(attr.name)), Setter::Attr(*attr, attr_plugin)));
        }
        out
    }

    fn item_key(&self, el: ElementId) -> String {
        match self.data(el).kind {
            Kind::SpeciesReference | Kind::ModifierSpeciesReference => {
                self.attr(el, "species").unwrap_or_default().to_string()
            }
            _ => self.native_id(el),
        }
    }

    fn markup_value(element: &Option<XmlElement>) -> Value<ElementId> {
        match element.as_ref().map(XmlElement::to_compact_string) {
            Some(Ok(text)) => Value::Markup(text),
            _ => Value::Null,
        }
    }

    fn to_xml(&self, el: ElementId) -> XmlElement {
        let data = self.data(el);
        let mut out = XmlElement::new(data.tag.clone());
        out.attributes = data.attributes.clone();
        for part in [&data.notes, &data.annotation, &data.math, &data.message]
            .into_iter()
            .flatten()
        {
            out.children.push(XmlNode::Element(part.clone()));
        }

        let mut children = data.children.clone();
        if data.kind != Kind::ListOf {
            let order: Vec<_> = data.kind.spec().all_children().map(|(_, s)| s).collect();
            let rank = |c: &ElementId| {
                let child = self.data(*c);
                let local = local_name(&child.tag);
                order
                    .iter()
                    .position(|s| match s.container {
                        Some(container) => child.kind == Kind::ListOf && container == local,
                        None => child.kind == s.kind,
                    })
                    .unwrap_or(usize::MAX)
            };
            children.sort_by_key(|c| rank(c));
        }
        for child in children {
            out.children.push(XmlNode::Element(self.to_xml(child)));
        }
        for extra in &data.extra {
            out.children.push(XmlNode::Element(extra.clone()));
        }
        out
    }
}

impl ModelDocument for SbmlDocument {
    type Element = ElementId;

    fn model(&self) -> Option<ElementId> {
        self.model
    }

    fn all_elements(&self) -> Vec<ElementId> {
        match self.model {
            Some(model) => {
                let mut out = vec![model];
                out.extend(self.descendants(model));
                out
            }
            None => Vec::new(),
        }
    }

    fn descendants(&self, element: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.data(element).children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.data(current).children.iter().rev().copied());
        }
        out
    }

    fn kind_name(&self, element: ElementId) -> String {
        local_name(&self.data(element).tag).to_string()
    }

    fn native_id(&self, element: ElementId) -> String {
        let source = self.data(element).kind.spec().id_source.attribute();
        self.attr(element, source).unwrap_or_default().to_string()
    }

    fn id_attribute(&self, element: ElementId) -> Option<String> {
        self.attr(element, "id")
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn canonical_text(&self, element: ElementId) -> String {
        self.to_xml(element).to_compact_string().unwrap_or_default()
    }

    fn views(&self, element: ElementId) -> Vec<View<ElementId>> {
        let spec = self.data(element).kind.spec();
        let mut out = vec![View::core(element)];
        for package in &self.packages {
            if spec.extension(package.plugin).is_some() {
                out.push(View {
                    element,
                    plugin: Some(package.plugin),
                });
            }
        }
        out
    }

    fn accessor_names(&self, view: View<ElementId>) -> Vec<String> {
        self.getters(view).into_iter().map(|(name, _)| name).collect()
    }

    fn invoke(
        &self,
        view: View<ElementId>,
        accessor: &str,
        arg: &Arg,
    ) -> Result<Value<ElementId>, ModelError> {
        let getter = self
            .getters(view)
            .into_iter()
            .find(|(name, _)| name == accessor)
            .map(|(_, g)| g)
            .ok_or_else(|| ModelError::UnknownAccessor {
                kind: self.kind_name(view.element),
                accessor: accessor.to_string(),
            })?;
        let el = view.element;
        let data = self.data(el);

        if let Getter::Item(slot) = getter {
            let container = slot.container.unwrap_or_default();
            let items = self.items(el, container);
            return Ok(match arg {
                Arg::None => return Err(invoke_error(accessor, "requires an identifier or an index")),
                Arg::Str(key) => items
                    .into_iter()
                    .find(|c| &self.item_key(*c) == key)
                    .map(Value::Element)
                    .unwrap_or(Value::Null),
                Arg::Int(ix) => usize::try_from(*ix)
                    .ok()
                    .and_then(|ix| items.get(ix).copied())
                    .map(Value::Element)
                    .unwrap_or(Value::Null),
            });
        }
        if *arg != Arg::None {
            return Err(invoke_error(accessor, "takes no argument"));
        }

        let text = |local: &str| Value::Str(self.attr(el, local).unwrap_or_default().to_string());
        Ok(match getter {
            Getter::Id => Value::Str(self.native_id(el)),
            Getter::IdAttribute => text("id"),
            Getter::Name => text("name"),
            Getter::MetaId => text("metaid"),
            Getter::ElementName => Value::Str(self.kind_name(el)),
            Getter::SboTerm => self
                .attr(el, "sboTerm")
                .map(|v| Value::Str(v.to_string()))
                .unwrap_or(Value::Null),
            Getter::Notes => Self::markup_value(&data.notes),
            Getter::Annotation => Self::markup_value(&data.annotation),
            Getter::Message => Self::markup_value(&data.message),
            Getter::Math => match &data.math {
                Some(math) => Value::Math(
                    MathExpr::from_mathml(math).map_err(|e| invoke_error(accessor, &e.to_string()))?,
                ),
                None => Value::Null,
            },
            Getter::Attr(attr) => self
                .attr(el, attr.name)
                .map(|raw| typed_value(&attr, raw))
                .unwrap_or(Value::Null),
            Getter::List(container) => Value::List(self.items(el, container)),
            Getter::Single(slot) => data
                .children
                .iter()
                .copied()
                .find(|c| self.data(*c).kind == slot.kind)
                .map(Value::Element)
                .unwrap_or(Value::Null),
            Getter::Item(_) => Value::Null,
        })
    }

    fn attributes(&self, element: ElementId) -> Vec<(String, String)> {
        self.data(element).attributes.clone()
    }

    fn element_by_sid(&self, sid: &str) -> Option<ElementId> {
        self.sids.get(sid).copied()
    }
}

impl ModelBuilder for SbmlDocument {
    fn creator_names(&self, view: View<ElementId>) -> Vec<String> {
        let mut out: Vec<String> = self
            .view_slots(view)
            .iter()
            .map(|s| format!("{CREATE_PREFIX}{}", s.creator))
            .collect();
        out.dedup();
        out
    }

    fn create_child(&mut self, view: View<ElementId>, creator: &str) -> Result<ElementId, ModelError> {
        let el = view.element;
        let slot = self
            .view_slots(view)
            .into_iter()
            .find(|s| format!("{CREATE_PREFIX}{}", s.creator) == creator)
            .ok_or_else(|| ModelError::UnknownCreator {
                kind: self.kind_name(el),
                creator: creator.to_string(),
            })?;

        let child_spec = slot.kind.spec();
        let tag = self.qualified(child_spec.name, child_spec.plugin);
        let parent = match slot.container {
            None => el,
            Some(container) => {
                let existing = self.data(el).children.iter().copied().find(|c| {
                    let data = self.data(*c);
                    data.kind == Kind::ListOf && local_name(&data.tag) == container
                });
                match existing {
                    Some(list) => list,
                    None => {
                        let owner = view.plugin.or(self.attribute_plugin(el));
                        let list_tag = self.qualified(container, owner);
                        self.push(Kind::ListOf, list_tag, Vec::new(), Some(el))
                    }
                }
            }
        };
        Ok(self.push(slot.kind, tag, Vec::new(), Some(parent)))
    }

    fn setter_names(&self, view: View<ElementId>) -> Vec<String> {
        self.setters(view).into_iter().map(|(name, _)| name).collect()
    }

    fn set(
        &mut self,
        view: View<ElementId>,
        setter: &str,
        value: Value<ElementId>,
    ) -> Result<(), ModelError> {
        let action = self
            .setters(view)
            .into_iter()
            .find(|(name, _)| name == setter)
            .map(|(_, s)| s)
            .ok_or_else(|| ModelError::UnknownAccessor {
                kind: self.kind_name(view.element),
                accessor: setter.to_string(),
            })?;
        let el = view.element;
        let own_plugin = self.attribute_plugin(el);

        match action {
            Setter::Id => {
                let source = self.data(el).kind.spec().id_source.attribute();
                let text = attribute_text(setter, &value)?;
                self.set_attr(el, source, own_plugin, text);
            }
            Setter::IdAttribute => {
                let text = attribute_text(setter, &value)?;
                self.set_attr(el, "id", own_plugin, text);
            }
            Setter::Name => {
                let text = attribute_text(setter, &value)?;
                self.set_attr(el, "name", own_plugin, text);
            }
            Setter::MetaId => {
                let text = attribute_text(setter, &value)?;
                self.set_attr(el, "metaid", None, text);
            }
            Setter::SboTerm => {
                let term = sbo_term(&value)
                    .ok_or_else(|| invoke_error(setter, "expects an SBO term"))?;
                self.set_attr(el, "sboTerm", None, Some(term));
            }
            Setter::Notes => self.nodes[el.0].notes = markup("notes", &value),
            Setter::Annotation => self.nodes[el.0].annotation = markup("annotation", &value),
            Setter::Message => self.nodes[el.0].message = markup("message", &value),
            Setter::Math => {
                let expr = match value {
                    Value::Math(expr) => expr,
                    Value::Str(formula) => MathExpr::parse_formula(&formula)?,
                    Value::Int(i) => MathExpr::Integer(i),
                    Value::Float(f) => MathExpr::Real(f),
                    _ => return Err(invoke_error(setter, "expects a formula")),
                };
                self.nodes[el.0].math = Some(expr.to_mathml());
            }
            Setter::Attr(attr, plugin) => {
                let text = attribute_text(setter, &value)?;
                self.set_attr(el, attr.name, plugin, text);
            }
        }
        Ok(())
    }

    fn serialize(&self) -> Result<String, ModelError> {
        let mut root = XmlElement::new("sbml");
        root.attributes = self.root_attributes.clone();
        if let Some(model) = self.model {
            root.children.push(XmlNode::Element(self.to_xml(model)));
        }
        xml::to_document_string(&root)
    }
}
