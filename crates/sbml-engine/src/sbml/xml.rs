//! Minimal owned XML tree on top of `quick-xml`, enough to keep notes,
//! annotations and MathML verbatim across a read/write cycle.

use crate::error::ModelError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `fbc:geneProduct`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Strip a namespace prefix: `fbc:charge` -> `charge`.
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.push((key.to_string(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Attribute lookup by local name, ignoring any prefix.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_name(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn first_element(&self) -> Option<&XmlElement> {
        self.elements().next()
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Single-line serialisation, no declaration.
    pub fn to_compact_string(&self) -> Result<String, ModelError> {
        let mut writer = Writer::new(Vec::new());
        self.write_into(&mut writer)?;
        bytes_to_string(writer.into_inner())
    }

    pub fn write_into<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), ModelError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_into(writer)?,
                XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

fn bytes_to_string(bytes: Vec<u8>) -> Result<String, ModelError> {
    String::from_utf8(bytes).map_err(|e| ModelError::Xml(e.to_string()))
}

fn open_element(start: &BytesStart<'_>) -> Result<XmlElement, ModelError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Parse a document and return its root element.
pub fn parse(xml: &str) -> Result<XmlElement, ModelError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => stack.push(open_element(e)?),
            Event::Empty(ref e) => {
                let element = open_element(e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ModelError::Xml("unbalanced end tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::Text(ref e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(e.unescape()?.to_string()));
                }
            }
            Event::CData(e) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                    parent.children.push(XmlNode::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ModelError::Xml("unexpected end of document".into()));
    }
    root.ok_or_else(|| ModelError::Xml("empty document".into()))
}

/// Indented document with an XML declaration.
pub fn to_document_string(root: &XmlElement) -> Result<String, ModelError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    root.write_into(&mut writer)?;
    let mut out = bytes_to_string(writer.into_inner())?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_prefixes_and_text() {
        let root = parse(
            r#"<?xml version="1.0"?>
            <sbml xmlns:fbc="urn:fbc" level="3">
              <model id="m"><notes><p>a &amp; b</p></notes></model>
              <fbc:geneProduct fbc:id="g1"/>
            </sbml>"#,
        )
        .unwrap();
        assert_eq!(root.name, "sbml");
        assert_eq!(root.attribute("level"), Some("3"));
        let children: Vec<_> = root.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(children, vec!["model", "fbc:geneProduct"]);
        let gene = root.elements().nth(1).unwrap();
        assert_eq!(gene.local_name(), "geneProduct");
        assert_eq!(gene.attribute("id"), Some("g1"));
        let p = root.first_element().unwrap().first_element().unwrap().first_element().unwrap();
        assert_eq!(p.text(), "a & b");
    }

    #[test]
    fn compact_output_is_stable() {
        let el = XmlElement::new("unit")
            .with_attribute("kind", "mole")
            .with_attribute("exponent", "1");
        assert_eq!(el.to_compact_string().unwrap(), r#"<unit kind="mole" exponent="1"/>"#);
        let reparsed = parse(&el.to_compact_string().unwrap()).unwrap();
        assert_eq!(reparsed, el);
    }

    #[test]
    fn unbalanced_document_is_rejected() {
        assert!(parse("<sbml><model>").is_err());
        assert!(parse("").is_err());
    }
}
