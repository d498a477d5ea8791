//! Format conversion between adapter-native payloads and pipeline XML

pub mod delimited;
pub mod fixed_length;
pub mod json_xml;
pub mod sql;

use flowbridge_core::domain::adapter::{AdapterConfig, AdapterDescriptor};
use flowbridge_core::domain::conversion::{FileFormat, FlatFileOptions, TargetFormat};
use flowbridge_core::xml::{XmlDocument, XmlElement};
use flowbridge_core::{ConversionConfig, CoreError, FormatConverter};
use serde_json::Value;
use tracing::debug;

/// One flat record: leaf element names and their text, in document order
pub type Record = Vec<(String, String)>;

/// A flat-file column: where the value comes from and what it is called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Element name in the record
    pub source: String,
    /// Output name
    pub header: String,
}

/// Converter used by the orchestrator
#[derive(Debug, Default, Clone)]
pub struct DefaultFormatConverter;

impl DefaultFormatConverter {
    /// Create a new converter
    pub fn new() -> Self {
        Self
    }
}

impl FormatConverter for DefaultFormatConverter {
    fn to_xml(&self, payload: &str, source: &AdapterDescriptor) -> Result<String, CoreError> {
        if payload.trim_start().starts_with('<') {
            return Ok(payload.to_string());
        }

        let xml = match source.typed_config()? {
            AdapterConfig::Soap(_) => {
                return Err(CoreError::XmlError(format!(
                    "SOAP adapter '{}' delivered a non-XML payload",
                    source.name
                )))
            }
            AdapterConfig::Http(_) => json_text_to_xml(payload, &FlatFileOptions::default())?,
            AdapterConfig::File(config) => flat_to_xml(payload, config.file_format, &config.format)?,
            AdapterConfig::Ftp(config) => flat_to_xml(payload, config.file_format, &config.format)?,
        };
        debug!(adapter = %source.name, bytes = xml.len(), "Converted source payload to XML");
        Ok(xml)
    }

    fn from_xml(&self, xml: &str, config: &ConversionConfig) -> Result<String, CoreError> {
        if !xml.trim_start().starts_with('<') {
            return Ok(xml.to_string());
        }

        match config.format {
            TargetFormat::Xml => Ok(xml.to_string()),
            TargetFormat::Json => {
                let doc = XmlDocument::parse(xml)?;
                Ok(serde_json::to_string(&json_xml::xml_to_json(&doc, true))?)
            }
            TargetFormat::Csv => delimited::xml_to_csv(&XmlDocument::parse(xml)?, &config.options, &config.field_mappings),
            TargetFormat::FixedLength => {
                fixed_length::xml_to_fixed(&XmlDocument::parse(xml)?, &config.options, &config.field_mappings)
            }
            TargetFormat::Sql => sql::xml_to_sql(&XmlDocument::parse(xml)?, &config.options, &config.field_mappings),
        }
    }
}

fn flat_to_xml(payload: &str, format: FileFormat, options: &FlatFileOptions) -> Result<String, CoreError> {
    match format {
        FileFormat::Csv => delimited::csv_to_xml(payload, options),
        FileFormat::Fixed => fixed_length::fixed_to_xml(payload, options),
        FileFormat::Json => json_text_to_xml(payload, options),
        FileFormat::Xml => Err(CoreError::XmlError("File content is not XML".to_string())),
        FileFormat::Sql => Err(CoreError::UnsupportedOperation(
            "SQL files cannot be used as a source format".to_string(),
        )),
    }
}

fn json_text_to_xml(payload: &str, options: &FlatFileOptions) -> Result<String, CoreError> {
    let value: Value = serde_json::from_str(payload)?;
    let root = options.root_element.as_deref().unwrap_or(json_xml::DEFAULT_ROOT);
    Ok(json_xml::json_to_xml(&value, root).to_xml())
}

/// Flat records of a document: the document element's children when each
/// of them has element content, otherwise the document element itself
pub fn records(doc: &XmlDocument) -> Vec<Record> {
    let children: Vec<&XmlElement> = doc.root.child_elements().collect();
    if !children.is_empty() && children.iter().all(|c| c.has_child_elements()) {
        children.into_iter().map(record_of).collect()
    } else {
        vec![record_of(&doc.root)]
    }
}

fn record_of(element: &XmlElement) -> Record {
    let mut record = Vec::new();
    collect_leaves(element, &mut record);
    record
}

fn collect_leaves(element: &XmlElement, record: &mut Record) {
    for child in element.child_elements() {
        if child.has_child_elements() {
            collect_leaves(child, record);
        } else {
            record.push((child.local_name().to_string(), child.text()));
        }
    }
}

/// Value of a field in a record
pub fn field<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Output columns. Explicit `columnOrder` wins; otherwise conversion
/// mappings whose source appears in the data select and rename columns;
/// otherwise every field seen, in first-seen order.
pub fn columns(records: &[Record], column_order: &[String], mappings: &[(String, String)]) -> Vec<Column> {
    let seen: Vec<&str> = {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in records.iter().flatten() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    };

    let rename = |name: &str| {
        mappings
            .iter()
            .find(|(source, _)| source == name)
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| name.to_string())
    };

    if !column_order.is_empty() {
        return column_order
            .iter()
            .map(|name| Column {
                source: name.clone(),
                header: name.clone(),
            })
            .collect();
    }

    let mapped: Vec<Column> = mappings
        .iter()
        .filter(|(source, _)| seen.contains(&source.as_str()))
        .map(|(source, target)| Column {
            source: source.clone(),
            header: target.clone(),
        })
        .collect();
    if !mapped.is_empty() {
        return mapped;
    }

    seen.into_iter()
        .map(|name| Column {
            source: name.to_string(),
            header: rename(name),
        })
        .collect()
}
