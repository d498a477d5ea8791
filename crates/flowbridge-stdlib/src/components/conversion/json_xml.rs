//! JSON <-> XML mapping
//!
//! Objects become elements, arrays become repeated elements with the same
//! name and scalars become text. `@name` keys round-trip as attributes and
//! `#text` as mixed text content.

use flowbridge_core::xml::{XmlDocument, XmlElement};
use serde_json::{Map, Number, Value};

/// Root element used when the JSON document has no single top-level key
pub const DEFAULT_ROOT: &str = "root";

/// Element used for members of a top-level array
const ARRAY_ITEM: &str = "item";

/// Build an XML document from JSON. A single-key object whose value is an
/// object or array supplies the root name; anything else is wrapped in
/// `root_name`.
pub fn json_to_xml(value: &Value, root_name: &str) -> XmlDocument {
    if let Value::Object(map) = value {
        if map.len() == 1 {
            if let Some((key, inner @ Value::Object(_))) = map.iter().next() {
                let mut root = XmlElement::new(element_name(key));
                fill(&mut root, inner);
                return XmlDocument::new(root);
            }
        }
    }

    let mut root = XmlElement::new(element_name(root_name));
    match value {
        Value::Array(items) => {
            for item in items {
                let mut child = XmlElement::new(ARRAY_ITEM);
                fill(&mut child, item);
                root.append_child(child);
            }
        }
        other => fill(&mut root, other),
    }
    XmlDocument::new(root)
}

fn fill(element: &mut XmlElement, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if let Some(attr) = key.strip_prefix('@') {
                    element.set_attribute(attr, scalar_text(value));
                } else if key == "#text" {
                    element.append_text(scalar_text(value));
                } else if let Value::Array(items) = value {
                    for item in items {
                        let mut child = XmlElement::new(element_name(key));
                        fill(&mut child, item);
                        element.append_child(child);
                    }
                } else {
                    let mut child = XmlElement::new(element_name(key));
                    fill(&mut child, value);
                    element.append_child(child);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let mut child = XmlElement::new(ARRAY_ITEM);
                fill(&mut child, item);
                element.append_child(child);
            }
        }
        Value::Null => {}
        scalar => element.set_text(scalar_text(scalar)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn an arbitrary key into a valid XML element name
pub fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let valid_start = name
        .chars()
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_');
    if !valid_start {
        name.insert(0, '_');
    }
    name
}

/// JSON view of an element's content (without the element's own name).
/// With `infer_types`, leaf text that looks like a number or boolean is
/// typed accordingly.
pub fn element_to_json(element: &XmlElement, infer_types: bool) -> Value {
    let has_children = element.has_child_elements();
    if !has_children && element.attributes.iter().all(is_namespace_decl) {
        return leaf(element.text(), infer_types);
    }

    let mut map = Map::new();
    for attr in element.attributes.iter().filter(|a| !is_namespace_decl(a)) {
        map.insert(format!("@{}", attr.name), leaf(attr.value.clone(), infer_types));
    }
    for child in element.child_elements() {
        let key = child.local_name().to_string();
        let value = element_to_json(child, infer_types);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    if !has_children {
        let text = element.text();
        if !text.trim().is_empty() {
            map.insert("#text".to_string(), leaf(text, infer_types));
        }
    }
    Value::Object(map)
}

/// `{ "<root>": <content> }`
pub fn xml_to_json(doc: &XmlDocument, infer_types: bool) -> Value {
    let mut map = Map::new();
    map.insert(
        doc.root.local_name().to_string(),
        element_to_json(&doc.root, infer_types),
    );
    Value::Object(map)
}

fn is_namespace_decl(attr: &flowbridge_core::xml::XmlAttribute) -> bool {
    attr.name == "xmlns" || attr.name.starts_with("xmlns:")
}

fn leaf(text: String, infer_types: bool) -> Value {
    if infer_types {
        infer_scalar(&text)
    } else {
        Value::String(text)
    }
}

/// Typed view of a text value: booleans and numbers are recognized, anything
/// else (including zero-padded identifiers such as "007") stays a string
pub fn infer_scalar(text: &str) -> Value {
    let trimmed = text.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    let leading_zero = trimmed.len() > 1 && trimmed.starts_with('0') && !trimmed.starts_with("0.");
    if !trimmed.is_empty() && !leading_zero {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::Number(n.into());
        }
        if trimmed.contains('.') {
            if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
                return Value::Number(n);
            }
        }
    }
    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_single_key_object_names_the_root() {
        let doc = json_to_xml(&json!({"Order": {"id": 7, "lines": [{"sku": "A"}, {"sku": "B"}]}}), DEFAULT_ROOT);
        assert_eq!(
            doc.to_xml(),
            "<Order><id>7</id><lines><sku>A</sku></lines><lines><sku>B</sku></lines></Order>"
        );
    }

    #[test]
    fn test_flat_object_is_wrapped() {
        let doc = json_to_xml(&json!({"a": "x & y", "2b": null}), DEFAULT_ROOT);
        assert_eq!(doc.to_xml(), "<root><_2b/><a>x &amp; y</a></root>");
    }

    #[test]
    fn test_xml_to_json_groups_repeated_elements() {
        let doc = XmlDocument::parse(r#"<Out id="9"><Total>42</Total><Tag>a</Tag><Tag>b</Tag><Code>007</Code></Out>"#).unwrap();
        assert_eq!(
            xml_to_json(&doc, true),
            json!({"Out": {"@id": 9, "Total": 42, "Tag": ["a", "b"], "Code": "007"}})
        );
        assert_eq!(
            xml_to_json(&doc, false)["Out"]["Total"],
            json!("42")
        );
    }
}
