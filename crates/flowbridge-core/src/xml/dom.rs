//! Minimal owned XML tree.
//!
//! Parsing is namespace aware (every element knows its resolved namespace
//! URI) and whitespace preserving, so that a parsed fragment serializes back
//! to the same text.

use crate::CoreError;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// An attribute as written, including `xmlns` declarations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Qualified name
    pub name: String,
    /// Unescaped value
    pub value: String,
}

/// A node inside an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Child element
    Element(XmlElement),
    /// Character data (unescaped)
    Text(String),
    /// CDATA section content
    CData(String),
    /// Comment content
    Comment(String),
}

/// An element and its subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written
    pub name: String,
    /// Resolved namespace URI
    pub namespace: Option<String>,
    /// Attributes in document order
    pub attributes: Vec<XmlAttribute>,
    /// Child nodes in document order
    pub children: Vec<XmlNode>,
    self_closing: bool,
}

impl XmlElement {
    /// New empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: true,
        }
    }

    /// Name without prefix
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Prefix, if the name is qualified
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    /// Attribute value by qualified or local name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|a| a.name.rsplit(':').next() == Some(name) && !a.name.starts_with("xmlns"))
            })
            .map(|a| a.value.as_str())
    }

    /// Set or replace an attribute
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(XmlAttribute {
                name: name.to_string(),
                value,
            }),
        }
    }

    /// Child elements in document order
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Child elements with their index in `children`
    pub fn indexed_child_elements(&self) -> impl Iterator<Item = (usize, &XmlElement)> {
        self.children.iter().enumerate().filter_map(|(i, n)| match n {
            XmlNode::Element(e) => Some((i, e)),
            _ => None,
        })
    }

    /// First child element with the given local name
    pub fn find_child(&self, local_name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.local_name() == local_name)
    }

    /// Whether the element has element children
    pub fn has_child_elements(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Concatenated character data of the subtree
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
                XmlNode::Comment(_) => {}
            }
        }
    }

    /// Replace all children with a single text node
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text));
        }
    }

    /// Append a child element, returning its index in `children`
    pub fn append_child(&mut self, child: XmlElement) -> usize {
        self.children.push(XmlNode::Element(child));
        self.children.len() - 1
    }

    /// Append a text node
    pub fn append_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    /// Element at an index path below this element (empty path is `self`)
    pub fn element_at(&self, path: &[usize]) -> Option<&XmlElement> {
        let mut current = self;
        for &index in path {
            current = match current.children.get(index)? {
                XmlNode::Element(e) => e,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mutable element at an index path below this element
    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut current = self;
        for &index in path {
            current = match current.children.get_mut(index)? {
                XmlNode::Element(e) => e,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Namespace declarations made on this element, as `(prefix, uri)`;
    /// the default namespace has an empty prefix
    pub fn namespace_declarations(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .filter_map(|a| {
                if a.name == "xmlns" {
                    Some((String::new(), a.value.clone()))
                } else {
                    a.name
                        .strip_prefix("xmlns:")
                        .map(|p| (p.to_string(), a.value.clone()))
                }
            })
            .collect()
    }

    /// Copy of this subtree that declares every namespace prefix it uses but
    /// inherited from `in_scope` ancestors, so it can stand alone
    pub fn detached(&self, in_scope: &[(String, String)]) -> XmlElement {
        let mut used = Vec::new();
        let mut declared = Vec::new();
        self.collect_prefixes(&mut used, &mut declared);

        let mut copy = self.clone();
        for prefix in used {
            if declared.contains(&prefix) || prefix == "xml" {
                continue;
            }
            let Some((_, uri)) = in_scope.iter().rev().find(|(p, _)| *p == prefix) else {
                continue;
            };
            let name = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", prefix)
            };
            copy.attributes.push(XmlAttribute {
                name,
                value: uri.clone(),
            });
        }
        copy
    }

    fn collect_prefixes(&self, used: &mut Vec<String>, declared: &mut Vec<String>) {
        let element_prefix = self.prefix().unwrap_or("").to_string();
        if !used.contains(&element_prefix) {
            used.push(element_prefix);
        }
        for attr in &self.attributes {
            if attr.name == "xmlns" {
                declared.push(String::new());
            } else if let Some(p) = attr.name.strip_prefix("xmlns:") {
                declared.push(p.to_string());
            } else if let Some((p, _)) = attr.name.split_once(':') {
                if !used.iter().any(|u| u == p) {
                    used.push(p.to_string());
                }
            }
        }
        for child in self.child_elements() {
            child.collect_prefixes(used, declared);
        }
    }

    /// Serialize the subtree without an XML declaration
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&escape_attribute(&attr.value));
            out.push('"');
        }
        if self.children.is_empty() && self.self_closing {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_to(out),
                XmlNode::Text(t) => out.push_str(&partial_escape(t.as_str())),
                XmlNode::CData(t) => {
                    out.push_str("<![CDATA[");
                    out.push_str(t);
                    out.push_str("]]>");
                }
                XmlNode::Comment(t) => {
                    out.push_str("<!--");
                    out.push_str(t);
                    out.push_str("-->");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn escape_attribute(value: &str) -> String {
    partial_escape(value).replace('"', "&quot;")
}

/// A parsed XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// Document element
    pub root: XmlElement,
}

impl XmlDocument {
    /// Wrap an element as a document
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    /// Parse text into a document
    pub fn parse(xml: &str) -> Result<Self, CoreError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut scopes: Vec<Vec<(String, String)>> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = open_element(&start, &mut scopes)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = open_element(&start, &mut scopes)?;
                    scopes.pop();
                    attach(element, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| CoreError::XmlError("Unexpected closing tag".to_string()))?;
                    element.self_closing = false;
                    scopes.pop();
                    attach(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let text = text.unescape()?.into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Text(text)),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(CoreError::XmlError(
                                "Character data outside the document element".to_string(),
                            ))
                        }
                    }
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::CData(text));
                    }
                }
                Event::Comment(comment) => {
                    let text = String::from_utf8_lossy(&comment).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Comment(text));
                    }
                }
                Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(CoreError::XmlError(format!(
                "Unclosed element <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or_default()
            )));
        }
        root.map(Self::new)
            .ok_or_else(|| CoreError::XmlError("Document has no root element".to_string()))
    }

    /// Serialize without an XML declaration
    pub fn to_xml(&self) -> String {
        self.root.to_xml()
    }

    /// Serialize with an XML declaration
    pub fn to_xml_with_declaration(&self) -> String {
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", self.root.to_xml())
    }
}

/// Whether the text parses as a single XML document
pub fn is_well_formed(xml: &str) -> bool {
    XmlDocument::parse(xml).is_ok()
}

fn open_element(
    start: &BytesStart<'_>,
    scopes: &mut Vec<Vec<(String, String)>>,
) -> Result<XmlElement, CoreError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| CoreError::XmlError(e.to_string()))?;
        element.attributes.push(XmlAttribute {
            name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value: attr.unescape_value()?.into_owned(),
        });
    }

    scopes.push(element.namespace_declarations());
    let prefix = element.prefix().unwrap_or("").to_string();
    element.namespace = if prefix == "xml" {
        Some(XML_NS.to_string())
    } else {
        scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(p, _)| *p == prefix)
            .map(|(_, uri)| uri.clone())
            .filter(|uri| !uri.is_empty())
    };
    if element.namespace.is_none() && !prefix.is_empty() {
        return Err(CoreError::XmlError(format!(
            "Undeclared namespace prefix '{}'",
            prefix
        )));
    }
    Ok(element)
}

fn attach(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), CoreError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(CoreError::XmlError(
            "Document has more than one root element".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_and_serialize_preserves_text() {
        let xml = "<order id=\"7\">\n  <item qty=\"2\">Tea &amp; cake</item>\n  <note/>\n  <empty></empty>\n</order>";
        let doc = XmlDocument::parse(xml).unwrap();
        assert_eq!(doc.root.local_name(), "order");
        assert_eq!(doc.root.attribute("id"), Some("7"));
        assert_eq!(doc.root.find_child("item").unwrap().text(), "Tea & cake");
        assert_eq!(doc.to_xml(), xml);
    }

    #[test]
    fn test_namespaces_are_resolved() {
        let xml = r#"<s:Envelope xmlns:s="urn:a"><s:Body><m:Op xmlns:m="urn:m"><x>1</x></m:Op></s:Body></s:Envelope>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert_eq!(doc.root.namespace.as_deref(), Some("urn:a"));
        let body = doc.root.find_child("Body").unwrap();
        let op = body.find_child("Op").unwrap();
        assert_eq!(op.namespace.as_deref(), Some("urn:m"));
        assert_eq!(op.prefix(), Some("m"));
    }

    #[test]
    fn test_prefixed_elements_resolve_against_scope() {
        let doc = XmlDocument::parse(r#"<r xmlns:q="urn:q"><xml:lang/><q:v/></r>"#).unwrap();
        assert_eq!(doc.root.namespace, None);
        assert_eq!(doc.root.find_child("lang").unwrap().namespace.as_deref(), Some(XML_NS));
        assert_eq!(doc.root.find_child("v").unwrap().namespace.as_deref(), Some("urn:q"));

        let err = XmlDocument::parse(r#"<r><z:v/></r>"#).unwrap_err();
        assert!(matches!(err, CoreError::XmlError(msg) if msg.contains("prefix 'z'")));
    }

    #[test]
    fn test_detached_adds_inherited_declarations() {
        let xml = r#"<a:Root xmlns:a="urn:a" xmlns:b="urn:b"><b:Child><b:Leaf/></b:Child></a:Root>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let in_scope = doc.root.namespace_declarations();
        let child = doc.root.find_child("Child").unwrap().detached(&in_scope);
        assert_eq!(child.to_xml(), r#"<b:Child xmlns:b="urn:b"><b:Leaf/></b:Child>"#);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(XmlDocument::parse("<a><b></a>").is_err());
        assert!(XmlDocument::parse("<a>").is_err());
        assert!(XmlDocument::parse("not xml").is_err());
        assert!(XmlDocument::parse("<a/><b/>").is_err());
        assert!(XmlDocument::parse("<p:a/>").is_err());
    }

    #[test]
    fn test_set_text_and_attribute() {
        let mut element = XmlElement::new("Total");
        element.set_text("42");
        element.set_attribute("currency", "EUR");
        assert_eq!(element.to_xml(), r#"<Total currency="EUR">42</Total>"#);
    }
}
