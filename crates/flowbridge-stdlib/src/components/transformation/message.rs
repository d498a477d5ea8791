//! Parsed view of the payload a step works on

use crate::components::conversion::json_xml::{element_to_json, infer_scalar};
use flowbridge_core::xml::{set_value, XPath, XmlDocument};
use flowbridge_core::CoreError;
use serde_json::{Map, Value};

/// A payload as seen by transformation steps.
///
/// Field references are XPath expressions for XML (a bare name matches the
/// element anywhere in the document) and JMESPath expressions for JSON (a
/// leading `/` path is accepted and read as a dotted path).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// XML document
    Xml(XmlDocument),
    /// JSON value
    Json(Value),
}

impl Message {
    /// Parse markup as XML and anything else as JSON
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        if text.trim_start().starts_with('<') {
            Ok(Message::Xml(XmlDocument::parse(text)?))
        } else {
            serde_json::from_str(text).map(Message::Json).map_err(|e| {
                CoreError::SerializationError(format!("Payload is neither XML nor JSON: {}", e))
            })
        }
    }

    /// Key/value view used as expression context. For XML the document
    /// element's fields are available directly and under the element name.
    pub fn context(&self) -> Value {
        match self {
            Message::Xml(doc) => {
                let content = element_to_json(&doc.root, true);
                let mut map = match &content {
                    Value::Object(fields) => fields.clone(),
                    _ => Map::new(),
                };
                map.insert(doc.root.local_name().to_string(), content);
                Value::Object(map)
            }
            Message::Json(value @ Value::Object(_)) => value.clone(),
            Message::Json(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                Value::Object(map)
            }
        }
    }

    /// Text value of a field, `None` when it does not resolve
    pub fn get(&self, field: &str) -> Result<Option<String>, CoreError> {
        match self {
            Message::Xml(doc) => xml_text(doc, field),
            Message::Json(_) => Ok(self.get_value(field)?.map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })),
        }
    }

    /// Typed value of a field; XML text is type-inferred
    pub fn get_value(&self, field: &str) -> Result<Option<Value>, CoreError> {
        match self {
            Message::Xml(doc) => Ok(xml_text(doc, field)?.map(|text| infer_scalar(&text))),
            Message::Json(value) => {
                let found = json_search(value, field)?;
                Ok(Some(found).filter(|v| !v.is_null()))
            }
        }
    }

    /// Write a field, creating missing elements or objects on the way
    pub fn set(&mut self, field: &str, value: &Value) -> Result<(), CoreError> {
        match self {
            Message::Xml(doc) => {
                let path = xml_target_path(doc, field)?;
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                set_value(doc, &path, &text)
            }
            Message::Json(root) => set_json_path(root, field, value.clone()),
        }
    }

    /// Serialize back to text
    pub fn render(&self) -> String {
        match self {
            Message::Xml(doc) => doc.to_xml(),
            Message::Json(value) => value.to_string(),
        }
    }
}

/// A plain element name rather than a path expression
pub fn is_bare_name(field: &str) -> bool {
    !field.contains('/') && !field.contains('[') && !field.starts_with('@')
}

fn xml_text(doc: &XmlDocument, field: &str) -> Result<Option<String>, CoreError> {
    let path = if is_bare_name(field) {
        format!("//{}", field)
    } else {
        field.to_string()
    };
    Ok(XPath::parse(&path)?
        .select(doc, None)
        .first()
        .and_then(|m| m.string_value(doc)))
}

/// Where a write to `field` lands: absolute paths as given, a bare name on
/// its existing element or else below the document element
pub fn xml_target_path(doc: &XmlDocument, field: &str) -> Result<String, CoreError> {
    if field.starts_with('/') {
        return Ok(field.to_string());
    }
    if is_bare_name(field) {
        let anywhere = format!("//{}", field);
        if !XPath::parse(&anywhere)?.select(doc, None).is_empty() {
            return Ok(anywhere);
        }
    }
    Ok(format!("/{}/{}", doc.root.name, field))
}

/// JMESPath expression for a field reference
pub fn jmespath_expr(field: &str) -> String {
    match field.strip_prefix('/') {
        Some(rest) => rest.replace('/', "."),
        None => field.to_string(),
    }
}

/// Evaluate a JMESPath expression against a JSON value
pub fn json_search(value: &Value, field: &str) -> Result<Value, CoreError> {
    let expr = jmespath::compile(&jmespath_expr(field)).map_err(|e| {
        CoreError::TransformationConfigError(format!("Invalid JMESPath expression '{}': {}", field, e))
    })?;
    let found = expr.search(value).map_err(|e| {
        CoreError::TransformationConfigError(format!("Failed to evaluate '{}': {}", field, e))
    })?;
    Ok(serde_json::to_value(&*found)?)
}

/// Write `value` at a dotted path, creating intermediate objects
pub fn set_json_path(root: &mut Value, field: &str, value: Value) -> Result<(), CoreError> {
    let path = jmespath_expr(field);
    let mut current = root;
    let mut segments = path.split('.').filter(|s| !s.is_empty()).peekable();
    while let Some(segment) = segments.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().ok_or_else(|| {
            CoreError::TransformationConfigError(format!(
                "Cannot write '{}': '{}' is not inside an object",
                field, segment
            ))
        })?;
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return Ok(());
        }
        current = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    Err(CoreError::TransformationConfigError(format!(
        "Empty target field '{}'",
        field
    )))
}
