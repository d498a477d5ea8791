//! Fixed-length records

use super::json_xml::element_name;
use super::{field, records};
use flowbridge_core::domain::conversion::FlatFileOptions;
use flowbridge_core::xml::{XmlDocument, XmlElement};
use flowbridge_core::CoreError;

fn layout(options: &FlatFileOptions) -> Result<(), CoreError> {
    if options.field_lengths.is_empty() {
        return Err(CoreError::ConfigurationError(
            "Fixed-length conversion requires fieldLengths".to_string(),
        ));
    }
    Ok(())
}

fn pad_char(options: &FlatFileOptions) -> char {
    options.pad_character.chars().next().unwrap_or(' ')
}

/// Fixed-length lines to `<records><record>...</record></records>`
pub fn fixed_to_xml(text: &str, options: &FlatFileOptions) -> Result<String, CoreError> {
    layout(options)?;
    let pad = pad_char(options);

    let mut root = XmlElement::new(options.root_element.as_deref().unwrap_or("records"));
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let chars: Vec<char> = line.chars().collect();
        let mut record = XmlElement::new(options.record_element.as_deref().unwrap_or("record"));
        let mut offset = 0;
        for column in &options.field_lengths {
            let end = (offset + column.length).min(chars.len());
            let raw: String = chars.get(offset..end).map(|c| c.iter().collect()).unwrap_or_default();
            offset += column.length;

            let mut cell = XmlElement::new(element_name(&column.name));
            cell.set_text(raw.trim_end_matches(pad).trim());
            record.append_child(cell);
        }
        root.append_child(record);
    }
    Ok(XmlDocument::new(root).to_xml())
}

/// XML records to fixed-length lines. Values are right-padded and
/// truncated to the field width.
pub fn xml_to_fixed(
    doc: &XmlDocument,
    options: &FlatFileOptions,
    mappings: &[(String, String)],
) -> Result<String, CoreError> {
    layout(options)?;
    let pad = pad_char(options);

    let mut out = String::new();
    for record in records(doc) {
        for column in &options.field_lengths {
            let value = field(&record, &column.name)
                .or_else(|| {
                    mappings
                        .iter()
                        .find(|(_, target)| *target == column.name)
                        .and_then(|(source, _)| field(&record, source))
                })
                .unwrap_or_default();
            let mut cell: String = value.chars().take(column.length).collect();
            let width = cell.chars().count();
            cell.extend(std::iter::repeat(pad).take(column.length - width));
            out.push_str(&cell);
        }
        out.push_str(&options.line_terminator);
    }
    Ok(out)
}
