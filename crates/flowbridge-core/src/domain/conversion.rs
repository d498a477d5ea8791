//! Conversion settings shared by the orchestrator and format converters.

use crate::domain::adapter::{AdapterConfig, AdapterDescriptor};
use crate::CoreError;
use serde::{Deserialize, Serialize};

/// Format of a flat file exchanged by FILE, FTP and SFTP adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    /// Delimited text
    #[default]
    Csv,
    /// Fixed-length records
    Fixed,
    /// XML document
    Xml,
    /// JSON document
    Json,
    /// SQL statements for JDBC-style sinks
    Sql,
}

/// One column of a fixed-length record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedField {
    /// Element name
    pub name: String,
    /// Width in characters
    pub length: usize,
}

/// SQL statement kind produced for JDBC-style sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlOperation {
    /// `INSERT INTO ... VALUES ...`
    #[default]
    Insert,
    /// `UPDATE ... SET ... WHERE ...`
    Update,
    /// `DELETE FROM ... WHERE ...`
    Delete,
}

/// Flat file options, read from the adapter configuration blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlatFileOptions {
    /// CSV field delimiter
    pub delimiter: String,
    /// Emit/expect a header row
    pub include_headers: bool,
    /// Quote every CSV field
    pub quote_all_fields: bool,
    /// Record separator
    pub line_terminator: String,
    /// CSV quote character
    pub quote_character: String,
    /// Explicit CSV column order
    pub column_order: Vec<String>,
    /// Fixed-length layout, in record order
    pub field_lengths: Vec<FixedField>,
    /// Fixed-length padding
    pub pad_character: String,
    /// SQL table
    pub table_name: String,
    /// SQL operation
    pub operation: SqlOperation,
    /// SQL `WHERE` clause for updates and deletes
    pub where_clause: Option<String>,
    /// One multi-row `INSERT` instead of one statement per record
    pub generate_batch: bool,
    /// Root element of XML produced from flat data
    pub root_element: Option<String>,
    /// Record element of XML produced from flat data
    pub record_element: Option<String>,
}

impl Default for FlatFileOptions {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            include_headers: true,
            quote_all_fields: false,
            line_terminator: "\n".to_string(),
            quote_character: "\"".to_string(),
            column_order: Vec::new(),
            field_lengths: Vec::new(),
            pad_character: " ".to_string(),
            table_name: "data".to_string(),
            operation: SqlOperation::Insert,
            where_clause: None,
            generate_batch: false,
            root_element: None,
            record_element: None,
        }
    }
}

/// Native format of the target side of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetFormat {
    /// XML as produced by the pipeline
    Xml,
    /// JSON document
    Json,
    /// Delimited text
    Csv,
    /// Fixed-length records
    FixedLength,
    /// SQL statements
    Sql,
}

impl From<FileFormat> for TargetFormat {
    fn from(format: FileFormat) -> Self {
        match format {
            FileFormat::Csv => TargetFormat::Csv,
            FileFormat::Fixed => TargetFormat::FixedLength,
            FileFormat::Xml => TargetFormat::Xml,
            FileFormat::Json => TargetFormat::Json,
            FileFormat::Sql => TargetFormat::Sql,
        }
    }
}

/// Everything a converter needs to turn pipeline XML into the target's native format
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionConfig {
    /// Output format
    pub format: TargetFormat,
    /// Flat file options
    pub options: FlatFileOptions,
    /// Element name to output column renames, in mapping order
    pub field_mappings: Vec<(String, String)>,
}

impl ConversionConfig {
    /// Derive the conversion settings from the target adapter
    pub fn for_target(target: &AdapterDescriptor) -> Result<Self, CoreError> {
        let (format, options) = match target.typed_config()? {
            AdapterConfig::Soap(_) => (TargetFormat::Xml, FlatFileOptions::default()),
            AdapterConfig::Http(config) => {
                let format = if config.content_type().to_ascii_lowercase().contains("json") {
                    TargetFormat::Json
                } else {
                    TargetFormat::Xml
                };
                (format, FlatFileOptions::default())
            }
            AdapterConfig::File(config) => (config.file_format.into(), config.format),
            AdapterConfig::Ftp(config) => (config.file_format.into(), config.format),
        };

        Ok(Self {
            format,
            options,
            field_mappings: Vec::new(),
        })
    }

    /// Builder: attach column renames
    pub fn with_field_mappings(mut self, mappings: Vec<(String, String)>) -> Self {
        self.field_mappings = mappings;
        self
    }
}
